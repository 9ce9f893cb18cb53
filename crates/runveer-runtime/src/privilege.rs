use std::io;
use std::net::{Ipv4Addr, TcpListener};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Whether another process already listens on `port` on the loopback
/// interface. Lacking permission to bind is not evidence of a conflict.
pub fn port_in_use(port: u16) -> bool {
    match TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
        Ok(_) => false,
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => true,
        Err(e) => {
            debug!("cannot probe port {port}: {e}");
            false
        }
    }
}

/// `sudo <interpreter> <script>`.
pub fn elevated_command(interpreter: &Path, script: &Path) -> Command {
    let mut cmd = Command::new("sudo");
    cmd.arg(interpreter).arg(script);
    cmd
}
