use crate::RuntimeError;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How a child's standard streams are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// stdout and stderr captured, stdin closed.
    Capture,
    /// stdin and stdout inherited; stderr streamed to the terminal and captured.
    TeeStderr,
    /// Everything inherited; nothing captured.
    Inherit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the child was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub fn run_captured(
    cmd: &mut Command,
    timeout: Option<Duration>,
) -> Result<ProcessOutput, RuntimeError> {
    run_with(cmd, StreamMode::Capture, timeout)
}

/// Run `cmd` to completion, killing it once `timeout` elapses.
///
/// Pipes are drained on reader threads while the child runs so large output
/// cannot block it.
pub fn run_with(
    cmd: &mut Command,
    mode: StreamMode,
    timeout: Option<Duration>,
) -> Result<ProcessOutput, RuntimeError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    match mode {
        StreamMode::Capture => {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }
        StreamMode::TeeStderr => {
            cmd.stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::piped());
        }
        StreamMode::Inherit => {
            cmd.stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        }
    }

    debug!("spawning {program} ({mode:?})");
    let mut child = cmd.spawn().map_err(|source| RuntimeError::Spawn {
        program: program.clone(),
        source,
    })?;

    let echo = mode == StreamMode::TeeStderr;
    let stdout_reader = child
        .stdout
        .take()
        .map(|out| thread::spawn(move || drain(out, false)));
    let stderr_reader = child
        .stderr
        .take()
        .map(|err| thread::spawn(move || drain(err, echo)));

    let Some(status) = wait(&mut child, timeout)? else {
        // Readers are left detached: grandchildren may still hold the pipes.
        let secs = timeout.map_or(0, |t| t.as_secs());
        debug!("{program} killed after {secs}s");
        return Err(RuntimeError::Timeout { program, secs });
    };

    let stdout = stdout_reader
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default();
    let stderr = stderr_reader
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default();
    debug!("{program} exited with {:?}", status.code());

    Ok(ProcessOutput {
        code: status.code(),
        stdout,
        stderr,
    })
}

/// `Ok(None)` when the child had to be killed.
fn wait(child: &mut Child, timeout: Option<Duration>) -> Result<Option<ExitStatus>, RuntimeError> {
    let Some(limit) = timeout else {
        return Ok(Some(child.wait()?));
    };
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= limit {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain(mut stream: impl Read, echo: bool) -> String {
    let mut collected = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                collected.extend_from_slice(&buf[..n]);
                if echo {
                    let mut err = std::io::stderr().lock();
                    let _ = err.write_all(&buf[..n]);
                    let _ = err.flush();
                }
            }
        }
    }
    String::from_utf8_lossy(&collected).into_owned()
}
