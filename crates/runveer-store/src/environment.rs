use crate::backend::EnvBackend;
use crate::layout::EnvLayout;
use crate::lock::EnvLock;
use crate::removal::make_tree_writable;
use crate::StoreError;
use runveer_schema::Fingerprint;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_ENV_NAME: &str = "venv";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_NAME_LEN: usize = 64;

/// Reject names that could escape the project directory or confuse the
/// fallback-sibling scheme.
pub fn validate_env_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(StoreError::InvalidName(format!(
            "'{name}' must be 1-{MAX_NAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(StoreError::InvalidName(format!(
            "'{name}' may only contain letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}

/// Like [`validate_env_name`], but also admits the `{name}_{digits}`
/// fallback of a valid name, which may run past the length limit.
fn validate_existing_name(name: &str) -> Result<(), StoreError> {
    match name.rsplit_once('_') {
        Some((base, stamp))
            if !stamp.is_empty()
                && stamp.bytes().all(|b| b.is_ascii_digit())
                && validate_env_name(base).is_ok() =>
        {
            Ok(())
        }
        _ => validate_env_name(name),
    }
}

/// Alternate name used when `name` cannot be repaired in place.
pub fn fallback_name(name: &str) -> String {
    format!("{name}_{}", chrono::Utc::now().timestamp())
}

/// Why an existing environment failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    FingerprintMismatch { stored: Option<Fingerprint> },
    MissingExecutables,
    ProbeFailed,
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Staleness::FingerprintMismatch { stored: Some(fp) } => {
                write!(f, "project changed since it was built (stamp {})", fp.short())
            }
            Staleness::FingerprintMismatch { stored: None } => f.write_str("no fingerprint stamp"),
            Staleness::MissingExecutables => f.write_str("interpreter or installer missing"),
            Staleness::ProbeFailed => f.write_str("interpreter did not answer a version query"),
        }
    }
}

/// Observable step of `EnvironmentStore::setup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupEvent {
    Locked { name: String },
    LockCleared { name: String, removed: usize },
    UnlockFailed { name: String, reason: String },
    ForeignOwner { name: String, owner: u32, current: u32 },
    Stale { name: String, reason: Staleness },
    Removing { name: String },
    PermissionRetry { name: String },
    Removed { name: String },
    RemoveFailed { name: String, reason: String },
    FallingBack { from: String, to: String },
    Creating { name: String },
    Created { name: String },
    Reused { name: String },
}

impl SetupEvent {
    /// Events describing a detected problem rather than progress.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            SetupEvent::Locked { .. }
                | SetupEvent::UnlockFailed { .. }
                | SetupEvent::ForeignOwner { .. }
                | SetupEvent::Stale { .. }
                | SetupEvent::PermissionRetry { .. }
                | SetupEvent::RemoveFailed { .. }
                | SetupEvent::FallingBack { .. }
        )
    }
}

impl fmt::Display for SetupEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupEvent::Locked { name } => {
                write!(f, "environment '{name}' is locked, clearing stale lock")
            }
            SetupEvent::LockCleared { name, removed } => {
                write!(f, "cleared {removed} lock file(s) in '{name}'")
            }
            SetupEvent::UnlockFailed { name, reason } => {
                write!(f, "could not unlock '{name}': {reason}")
            }
            SetupEvent::ForeignOwner {
                name,
                owner,
                current,
            } => write!(
                f,
                "environment '{name}' belongs to uid {owner} (running as {current}), recreating"
            ),
            SetupEvent::Stale { name, reason } => {
                write!(f, "environment '{name}' is stale: {reason}")
            }
            SetupEvent::Removing { name } => write!(f, "removing environment '{name}'"),
            SetupEvent::PermissionRetry { name } => {
                write!(f, "permission denied removing '{name}', fixing permissions")
            }
            SetupEvent::Removed { name } => write!(f, "removed environment '{name}'"),
            SetupEvent::RemoveFailed { name, reason } => {
                write!(f, "could not remove '{name}': {reason}")
            }
            SetupEvent::FallingBack { from, to } => {
                write!(f, "cannot repair '{from}', using '{to}' instead")
            }
            SetupEvent::Creating { name } => write!(f, "creating environment '{name}'"),
            SetupEvent::Created { name } => write!(f, "created environment '{name}'"),
            SetupEvent::Reused { name } => write!(f, "reusing environment '{name}'"),
        }
    }
}

/// A ready-to-use environment returned by `EnvironmentStore::setup`.
#[derive(Debug, Clone)]
pub struct Environment {
    name: String,
    layout: EnvLayout,
    owner_uid: Option<u32>,
    fingerprint: Fingerprint,
    reused: bool,
}

impl Environment {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn layout(&self) -> &EnvLayout {
        &self.layout
    }

    pub fn interpreter(&self) -> PathBuf {
        self.layout.interpreter()
    }

    pub fn installer(&self) -> PathBuf {
        self.layout.installer()
    }

    pub fn executable(&self, name: &str) -> PathBuf {
        self.layout.executable(name)
    }

    pub fn owner_uid(&self) -> Option<u32> {
        self.owner_uid
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// True when the environment already existed and passed validation.
    pub fn was_reused(&self) -> bool {
        self.reused
    }

    /// Take the advisory lock for the duration of an install or run.
    pub fn lock(&self) -> Result<Option<EnvLock>, StoreError> {
        EnvLock::try_acquire(&self.layout.lock_file())
    }
}

enum Step {
    Reuse(Environment),
    Rebuild,
    Blocked,
}

/// Creates, validates, repairs and relocates environments under a base
/// directory.
pub struct EnvironmentStore {
    base_dir: PathBuf,
    backend: Box<dyn EnvBackend>,
    probe_timeout: Duration,
}

impl EnvironmentStore {
    pub fn new(base_dir: impl Into<PathBuf>, backend: Box<dyn EnvBackend>) -> Self {
        Self {
            base_dir: base_dir.into(),
            backend,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn backend(&self) -> &dyn EnvBackend {
        self.backend.as_ref()
    }

    pub fn layout_for(&self, name: &str) -> EnvLayout {
        EnvLayout::new(self.base_dir.join(name))
    }

    pub fn setup(&self, name: &str, fingerprint: &Fingerprint) -> Result<Environment, StoreError> {
        self.setup_observed(name, fingerprint, &mut |_| {})
    }

    /// Return a ready environment for `fingerprint`, reporting every repair
    /// step to `observer`.
    ///
    /// Only a failed creation is fatal. A lock or removal that cannot be
    /// repaired redirects once to a fresh `"{name}_{timestamp}"` sibling.
    pub fn setup_observed(
        &self,
        name: &str,
        fingerprint: &Fingerprint,
        observer: &mut dyn FnMut(SetupEvent),
    ) -> Result<Environment, StoreError> {
        validate_env_name(name)?;
        debug!("setting up environment '{name}' for {}", fingerprint.short());

        match self.prepare(name, fingerprint, observer) {
            Step::Reuse(env) => return Ok(env),
            Step::Rebuild => return self.create(name, fingerprint, observer),
            Step::Blocked => {}
        }

        let fallback = fallback_name(name);
        warn!("environment '{name}' cannot be repaired, falling back to '{fallback}'");
        observer(SetupEvent::FallingBack {
            from: name.to_owned(),
            to: fallback.clone(),
        });
        match self.prepare(&fallback, fingerprint, observer) {
            Step::Reuse(env) => Ok(env),
            Step::Rebuild => self.create(&fallback, fingerprint, observer),
            Step::Blocked => Err(StoreError::FallbackExhausted(fallback)),
        }
    }

    /// Forcibly remove environment `name`. `Ok(false)` when it did not exist.
    pub fn destroy(
        &self,
        name: &str,
        observer: &mut dyn FnMut(SetupEvent),
    ) -> Result<bool, StoreError> {
        validate_existing_name(name)?;
        let layout = self.layout_for(name);
        if !layout.root().is_dir() {
            return Ok(false);
        }
        self.force_remove(name, layout.root(), observer)
            .map_err(|e| StoreError::RemoveFailed {
                name: name.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(true)
    }

    /// Fallback siblings of `name` (`{name}_{digits}`) present on disk, sorted.
    pub fn siblings(&self, name: &str) -> Result<Vec<String>, StoreError> {
        let prefix = format!("{name}_");
        let mut found = Vec::new();
        if !self.base_dir.is_dir() {
            return Ok(found);
        }
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let is_sibling = file_name.strip_prefix(&prefix).is_some_and(|rest| {
                !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
            });
            if is_sibling && entry.path().is_dir() {
                found.push(file_name);
            }
        }
        found.sort();
        Ok(found)
    }

    fn prepare(
        &self,
        name: &str,
        fingerprint: &Fingerprint,
        observer: &mut dyn FnMut(SetupEvent),
    ) -> Step {
        let layout = self.layout_for(name);
        let root = layout.root();
        if !root.is_dir() {
            debug!("environment '{name}' does not exist");
            return Step::Rebuild;
        }

        if !self.check_lock(name, &layout, observer) {
            return Step::Blocked;
        }

        let current = self.backend.current_uid();
        let owner = match self.backend.owner_uid(root) {
            Ok(owner) => owner,
            Err(e) => {
                debug!("cannot read owner of {}: {e}", root.display());
                None
            }
        };
        if let (Some(owner), Some(current)) = (owner, current) {
            if owner != current {
                observer(SetupEvent::ForeignOwner {
                    name: name.to_owned(),
                    owner,
                    current,
                });
                return match self.force_remove(name, root, observer) {
                    Ok(()) => Step::Rebuild,
                    Err(_) => Step::Blocked,
                };
            }
        }

        match self.staleness(&layout, fingerprint) {
            None => {
                info!("reusing environment '{name}'");
                observer(SetupEvent::Reused {
                    name: name.to_owned(),
                });
                Step::Reuse(Environment {
                    name: name.to_owned(),
                    layout,
                    owner_uid: owner,
                    fingerprint: fingerprint.clone(),
                    reused: true,
                })
            }
            Some(reason) => {
                info!("environment '{name}' is stale: {reason}");
                observer(SetupEvent::Stale {
                    name: name.to_owned(),
                    reason,
                });
                match self.force_remove(name, root, observer) {
                    Ok(()) => Step::Rebuild,
                    Err(_) => Step::Blocked,
                }
            }
        }
    }

    /// `false` when the environment is locked and the lock cannot be cleared.
    fn check_lock(
        &self,
        name: &str,
        layout: &EnvLayout,
        observer: &mut dyn FnMut(SetupEvent),
    ) -> bool {
        let lock_path = layout.lock_file();
        match EnvLock::try_acquire(&lock_path) {
            Ok(Some(lock)) => {
                drop(lock);
                let _ = self.backend.remove_file(&lock_path);
                return true;
            }
            Ok(None) => debug!("lock on '{name}' is held"),
            Err(e) => debug!("cannot open lock for '{name}': {e}"),
        }

        observer(SetupEvent::Locked {
            name: name.to_owned(),
        });
        let sentinel = match self.backend.remove_file(&lock_path) {
            Ok(()) => 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => {
                warn!("cannot remove lock sentinel for '{name}': {e}");
                observer(SetupEvent::UnlockFailed {
                    name: name.to_owned(),
                    reason: e.to_string(),
                });
                return false;
            }
        };
        let removed = sentinel + self.clear_stale_markers(layout.root());
        observer(SetupEvent::LockCleared {
            name: name.to_owned(),
            removed,
        });
        true
    }

    /// Best-effort removal of `*.lock` and `*.pid` files in `root`.
    fn clear_stale_markers(&self, root: &Path) -> usize {
        let Ok(entries) = std::fs::read_dir(root) else {
            return 0;
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_marker = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "lock" || e == "pid");
            if !is_marker || !path.is_file() {
                continue;
            }
            match self.backend.remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => debug!("leaving {}: {e}", path.display()),
            }
        }
        removed
    }

    fn staleness(&self, layout: &EnvLayout, fingerprint: &Fingerprint) -> Option<Staleness> {
        let stored = layout.read_fingerprint();
        if stored.as_ref() != Some(fingerprint) {
            return Some(Staleness::FingerprintMismatch { stored });
        }
        let interpreter = layout.interpreter();
        if !interpreter.is_file() || !layout.installer().is_file() {
            return Some(Staleness::MissingExecutables);
        }
        if !self.backend.probe(&interpreter, self.probe_timeout) {
            return Some(Staleness::ProbeFailed);
        }
        None
    }

    /// Recursive delete, retried once after making the tree writable when the
    /// first attempt is refused.
    fn force_remove(
        &self,
        name: &str,
        root: &Path,
        observer: &mut dyn FnMut(SetupEvent),
    ) -> io::Result<()> {
        observer(SetupEvent::Removing {
            name: name.to_owned(),
        });
        let result = match self.backend.remove_dir_all(root) {
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                observer(SetupEvent::PermissionRetry {
                    name: name.to_owned(),
                });
                if let Err(fix) = make_tree_writable(root) {
                    debug!("could not fix permissions under {}: {fix}", root.display());
                }
                self.backend.remove_dir_all(root)
            }
            other => other,
        };
        match result {
            Ok(()) => {
                observer(SetupEvent::Removed {
                    name: name.to_owned(),
                });
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                observer(SetupEvent::Removed {
                    name: name.to_owned(),
                });
                Ok(())
            }
            Err(e) => {
                warn!("failed to remove environment '{name}': {e}");
                observer(SetupEvent::RemoveFailed {
                    name: name.to_owned(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn create(
        &self,
        name: &str,
        fingerprint: &Fingerprint,
        observer: &mut dyn FnMut(SetupEvent),
    ) -> Result<Environment, StoreError> {
        let layout = self.layout_for(name);
        observer(SetupEvent::Creating {
            name: name.to_owned(),
        });
        info!(
            "creating environment '{name}' with backend '{}'",
            self.backend.name()
        );
        self.backend
            .create(layout.root())
            .and_then(|()| layout.stamp(fingerprint))
            .map_err(|e| match e {
                StoreError::CreationFailed { .. } => e,
                other => StoreError::CreationFailed {
                    name: name.to_owned(),
                    reason: other.to_string(),
                },
            })?;
        observer(SetupEvent::Created {
            name: name.to_owned(),
        });
        Ok(Environment {
            name: name.to_owned(),
            layout,
            owner_uid: self.backend.current_uid(),
            fingerprint: fingerprint.clone(),
            reused: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        assert!(validate_env_name("venv").is_ok());
        assert!(validate_env_name("venv_1700000000").is_ok());
        assert!(validate_env_name("my-env").is_ok());
    }

    #[test]
    fn rejects_bad_names() {
        assert!(validate_env_name("").is_err());
        assert!(validate_env_name("../escape").is_err());
        assert!(validate_env_name("a/b").is_err());
        assert!(validate_env_name(".").is_err());
        assert!(validate_env_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn existing_names_admit_long_fallbacks() {
        let long = "x".repeat(60);
        assert!(validate_existing_name(&format!("{long}_1700000000")).is_ok());
        assert!(validate_existing_name("venv").is_ok());
        assert!(validate_existing_name(&format!("{long}_abc")).is_err());
        assert!(validate_existing_name("../escape_1700000000").is_err());
        assert!(validate_existing_name(&format!("{}_1", "x".repeat(65))).is_err());
    }

    #[test]
    fn fallback_name_appends_timestamp() {
        let name = fallback_name("venv");
        let suffix = name.strip_prefix("venv_").unwrap();
        assert!(!suffix.is_empty());
        assert!(suffix.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn warning_events() {
        assert!(SetupEvent::Locked {
            name: "venv".into()
        }
        .is_warning());
        assert!(!SetupEvent::Created {
            name: "venv".into()
        }
        .is_warning());
    }

    #[test]
    fn event_display_names_the_environment() {
        let e = SetupEvent::FallingBack {
            from: "venv".into(),
            to: "venv_1".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("venv"));
        assert!(msg.contains("venv_1"));

        let stale = SetupEvent::Stale {
            name: "venv".into(),
            reason: Staleness::MissingExecutables,
        };
        assert!(stale.to_string().contains("interpreter or installer missing"));
    }

    #[test]
    fn staleness_display_uses_short_fingerprint() {
        let s = Staleness::FingerprintMismatch {
            stored: Some(Fingerprint::new("0123456789abcdef")),
        };
        assert!(s.to_string().contains("0123456789ab"));
        assert!(!s.to_string().contains("0123456789abc"));
    }
}
