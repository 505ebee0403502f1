//! Durable delivery-state persistence.
//!
//! One JSON state file per namespace, holding a single boolean: whether the
//! install referrer delivery has been attempted on this install. The flag is
//! crash-only — once true it is never reset by this crate. Reads default to
//! `false` on any failure; writes are best-effort and never surface errors
//! to callers (failures are logged at warn).

mod atomic;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct DeliveryState {
    /// The fixed key of the persistent storage boundary.
    #[serde(default)]
    install_referrer_delivered: bool,
    /// When the delivery attempt happened. Informational only; never read
    /// back by the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delivered_at: Option<DateTime<Utc>>,
}

/// Durable store for the single "already delivered" flag.
#[derive(Debug, Clone)]
pub struct FlagStore {
    path: PathBuf,
}

impl FlagStore {
    /// Open the store for `namespace` under `dir`.
    ///
    /// Recovers a dangling `.bak` left by an interrupted write. Never
    /// fails; a missing directory only matters at write time.
    #[must_use]
    pub fn open(dir: &Path, namespace: &str) -> Self {
        let path = dir.join(format!("{namespace}.json"));
        atomic::recover_bak_file(&path);
        Self { path }
    }

    /// Path of the backing state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the delivered flag. Defaults to `false` when the file is
    /// missing or unreadable.
    #[must_use]
    pub fn delivered(&self) -> bool {
        self.load().install_referrer_delivered
    }

    /// Persist the delivered flag as true. Fire-and-forget: failures are
    /// logged and swallowed, and the flag is never reset to false.
    pub fn mark_delivered(&self) {
        let mut state = self.load();
        if state.install_referrer_delivered {
            return;
        }
        state.install_referrer_delivered = true;
        state.delivered_at = Some(Utc::now());

        if let Some(parent) = self.path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            tracing::warn!(
                path = %parent.display(),
                "Failed to create state directory: {e}"
            );
            return;
        }

        match serde_json::to_vec_pretty(&state) {
            Ok(bytes) => {
                if let Err(e) = atomic::atomic_write(&self.path, &bytes) {
                    tracing::warn!(
                        path = %self.path.display(),
                        "Failed to persist delivery flag: {e}"
                    );
                }
            }
            Err(e) => {
                tracing::warn!("Failed to encode delivery state: {e}");
            }
        }
    }

    fn load(&self) -> DeliveryState {
        match std::fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        "Malformed delivery state file, treating as undelivered: {e}"
                    );
                    DeliveryState::default()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => DeliveryState::default(),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "Failed to read delivery state, treating as undelivered: {e}"
                );
                DeliveryState::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::FlagStore;

    #[test]
    fn defaults_to_undelivered() {
        let dir = tempdir().expect("tempdir");
        let store = FlagStore::open(dir.path(), "relay");
        assert!(!store.delivered());
    }

    #[test]
    fn mark_then_reopen_reads_true() {
        let dir = tempdir().expect("tempdir");
        let store = FlagStore::open(dir.path(), "relay");
        store.mark_delivered();
        assert!(store.delivered());

        let reopened = FlagStore::open(dir.path(), "relay");
        assert!(reopened.delivered());
    }

    #[test]
    fn mark_creates_missing_directories() {
        let dir = tempdir().expect("tempdir");
        let nested = dir.path().join("data").join("relay");
        let store = FlagStore::open(&nested, "relay");
        store.mark_delivered();
        assert!(store.delivered());
    }

    #[test]
    fn second_mark_does_not_rewrite_the_state_file() {
        let dir = tempdir().expect("tempdir");
        let store = FlagStore::open(dir.path(), "relay");
        store.mark_delivered();
        let first = fs::read_to_string(store.path()).expect("read");

        store.mark_delivered();
        let second = fs::read_to_string(store.path()).expect("read");
        assert_eq!(first, second);
    }

    #[test]
    fn malformed_state_file_reads_as_undelivered() {
        let dir = tempdir().expect("tempdir");
        let store = FlagStore::open(dir.path(), "relay");
        fs::write(store.path(), b"not json").expect("write");
        assert!(!store.delivered());
    }

    #[test]
    fn open_recovers_interrupted_write() {
        let dir = tempdir().expect("tempdir");
        let store = FlagStore::open(dir.path(), "relay");
        store.mark_delivered();

        // Simulate a crash between backup-rename and persist.
        let bak = store.path().with_extension("bak");
        fs::rename(store.path(), &bak).expect("rename");

        let recovered = FlagStore::open(dir.path(), "relay");
        assert!(recovered.delivered());
    }

    #[test]
    fn namespaces_are_isolated() {
        let dir = tempdir().expect("tempdir");
        let first = FlagStore::open(dir.path(), "alpha");
        let second = FlagStore::open(dir.path(), "beta");
        first.mark_delivered();
        assert!(first.delivered());
        assert!(!second.delivered());
    }
}
