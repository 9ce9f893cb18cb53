//! Environment store for runveer.
//!
//! This crate owns the on-disk lifecycle of an isolated dependency
//! environment: `EnvLayout` for the directory structure and fingerprint
//! stamp, `EnvLock` for the non-blocking advisory lock, forced removal with
//! a permission-fix retry, and `EnvironmentStore`, the state machine that
//! reuses, rebuilds, or relocates an environment. Environment creation and
//! the interpreter probe are delegated to an `EnvBackend`.

pub mod backend;
pub mod environment;
pub mod layout;
pub mod lock;
pub mod removal;

pub use backend::EnvBackend;
pub use environment::{
    fallback_name, validate_env_name, Environment, EnvironmentStore, SetupEvent, Staleness,
    DEFAULT_ENV_NAME, DEFAULT_PROBE_TIMEOUT,
};
pub use layout::{EnvLayout, FINGERPRINT_FILE, LOCK_FILE};
pub use lock::EnvLock;
pub use removal::make_tree_writable;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid environment name: {0}")]
    InvalidName(String),
    #[error("failed to create environment '{name}': {reason}")]
    CreationFailed { name: String, reason: String },
    #[error("failed to remove environment '{name}': {reason}")]
    RemoveFailed { name: String, reason: String },
    #[error("fallback environment '{0}' could not be prepared either")]
    FallbackExhausted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display_invalid_name() {
        let e = StoreError::InvalidName("bad".to_owned());
        assert!(e.to_string().contains("invalid environment name"));
    }

    #[test]
    fn store_error_display_creation_failed() {
        let e = StoreError::CreationFailed {
            name: "venv".to_owned(),
            reason: "disk full".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("venv"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn store_error_display_remove_failed() {
        let e = StoreError::RemoveFailed {
            name: "venv".to_owned(),
            reason: "permission denied".to_owned(),
        };
        assert!(e.to_string().contains("permission denied"));
    }

    #[test]
    fn store_error_display_fallback_exhausted() {
        let e = StoreError::FallbackExhausted("venv_1700000000".to_owned());
        assert!(e.to_string().contains("venv_1700000000"));
    }
}
