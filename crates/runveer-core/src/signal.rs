use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Serialises tests that touch the process-wide interrupt flag.
#[cfg(test)]
pub(crate) static FLAG_GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Record Ctrl-C instead of dying with the child; a second Ctrl-C exits.
pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!("\ninterrupt received, stopping...");
    });
}

/// Consume a pending interrupt, returning whether there was one.
pub fn take_interrupt() -> bool {
    INTERRUPTED.swap(false, Ordering::SeqCst)
}

#[cfg(test)]
pub(crate) fn raise_interrupt() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_clears_the_flag() {
        let _guard = FLAG_GUARD.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        raise_interrupt();
        assert!(take_interrupt());
        assert!(!take_interrupt());
    }
}
