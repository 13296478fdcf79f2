//! Snapshot persistence
//!
//! Snapshots live in a single JSON file. Writers take an exclusive lock file
//! next to it, write through a temp file plus rename, and refuse to save
//! over a snapshot whose serial moved since it was loaded.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stackgraph::StateSnapshot;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

// ============================================================================
// Lock
// ============================================================================

/// Contents of the lock file, shown when a lock is held
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub operation: String,
    pub created_at: DateTime<Utc>,
}

/// Held lock; the lock file is removed on drop
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Failed to release state lock {}: {e}", self.path.display());
        } else {
            log::debug!("Released state lock {}", self.path.display());
        }
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Load the snapshot, or an empty one if nothing was saved yet
    pub fn load(&self) -> Result<StateSnapshot> {
        if !self.path.exists() {
            log::debug!("No snapshot at {}, starting empty", self.path.display());
            return Ok(StateSnapshot::new());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file: {}", self.path.display()))?;
        let snapshot: StateSnapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", self.path.display()))?;

        log::debug!(
            "Loaded snapshot serial {} ({} resources) from {}",
            snapshot.serial,
            snapshot.len(),
            self.path.display()
        );
        Ok(snapshot)
    }

    /// Take the exclusive lock
    pub fn lock(&self, operation: &str) -> Result<StateLock> {
        self.ensure_parent()?;
        let lock_path = self.lock_path();

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = self
                    .lock_info()
                    .ok()
                    .flatten()
                    .map(|info| {
                        format!(
                            " by pid {} ({}) since {}",
                            info.pid,
                            info.operation,
                            info.created_at.format("%Y-%m-%d %H:%M:%S UTC")
                        )
                    })
                    .unwrap_or_default();
                anyhow::bail!(
                    "State is locked{holder}: {}\nIf no other stackplan is running, release it with `stackplan state unlock`",
                    lock_path.display()
                );
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to create lock file: {}", lock_path.display())
                });
            }
        };

        // The lock is ours from here; release it if writing the info fails
        let lock = StateLock {
            path: lock_path.clone(),
        };
        let info = LockInfo {
            pid: std::process::id(),
            operation: operation.to_string(),
            created_at: Utc::now(),
        };
        let content = serde_json::to_string(&info).context("Failed to serialize lock info")?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write lock file: {}", lock_path.display()))?;

        log::debug!("Acquired state lock {}", lock_path.display());
        Ok(lock)
    }

    /// Info about the current lock holder, if locked
    pub fn lock_info(&self) -> Result<Option<LockInfo>> {
        let lock_path = self.lock_path();
        if !lock_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&lock_path)
            .with_context(|| format!("Failed to read lock file: {}", lock_path.display()))?;
        let info = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse lock file: {}", lock_path.display()))?;
        Ok(Some(info))
    }

    /// Remove a stale lock; returns whether one existed
    pub fn force_unlock(&self) -> Result<bool> {
        let lock_path = self.lock_path();
        match fs::remove_file(&lock_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove lock file: {}", lock_path.display())),
        }
    }

    /// Persist a snapshot and bump its serial
    ///
    /// The snapshot's serial must still match the one on disk, i.e. nobody
    /// saved in between.
    pub fn save(&self, snapshot: &mut StateSnapshot, _lock: &StateLock) -> Result<()> {
        let on_disk = self.load()?.serial;
        if on_disk != snapshot.serial {
            anyhow::bail!(
                "State changed since it was loaded (serial {} on disk, {} in memory); re-run plan",
                on_disk,
                snapshot.serial
            );
        }

        let dir = self.ensure_parent()?;
        snapshot.serial += 1;

        let content =
            serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;
        let mut tmp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(content.as_bytes())
            .context("Failed to write snapshot")?;
        tmp.as_file().sync_all().context("Failed to sync snapshot")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to write state file: {}", self.path.display()))?;

        log::debug!(
            "Saved snapshot serial {} to {}",
            snapshot.serial,
            self.path.display()
        );
        Ok(())
    }

    fn ensure_parent(&self) -> Result<PathBuf> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackgraph::{AppliedResource, Attributes, RemovalPolicy};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> StateStore {
        StateStore::new(dir.path().join("nested").join("state.json"))
    }

    fn resource() -> AppliedResource {
        AppliedResource {
            kind: "database".into(),
            provider_id: "database-0a1b2c3d4e5f".into(),
            inputs: Attributes::new(),
            outputs: Attributes::new(),
            dependencies: Vec::new(),
            removal_policy: RemovalPolicy::Destroy,
            applied_at: Utc::now(),
        }
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        let snapshot = store(&dir).load().unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.serial, 0);
    }

    #[test]
    fn test_save_and_reload_bumps_serial() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let mut snapshot = store.load().unwrap();
        snapshot.insert("db", resource());
        {
            let lock = store.lock("apply").unwrap();
            store.save(&mut snapshot, &lock).unwrap();
        }
        assert_eq!(snapshot.serial, 1);

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded, snapshot);
        assert!(store.lock_info().unwrap().is_none());
    }

    #[test]
    fn test_second_lock_is_refused() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let _held = store.lock("apply").unwrap();
        let err = store.lock("destroy").unwrap_err();
        assert!(err.to_string().contains("State is locked"));

        let info = store.lock_info().unwrap().unwrap();
        assert_eq!(info.operation, "apply");
        assert_eq!(info.pid, std::process::id());
    }

    #[test]
    fn test_force_unlock() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let held = store.lock("apply").unwrap();
        // Simulate a crashed process leaving its lock behind
        std::mem::forget(held);

        assert!(store.force_unlock().unwrap());
        assert!(!store.force_unlock().unwrap());
        assert!(store.lock("apply").is_ok());
    }

    #[test]
    fn test_stale_serial_is_refused() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let mut first = store.load().unwrap();
        let mut second = store.load().unwrap();

        let lock = store.lock("apply").unwrap();
        first.insert("db", resource());
        store.save(&mut first, &lock).unwrap();

        second.insert("cache", resource());
        let err = store.save(&mut second, &lock).unwrap_err();
        assert!(err.to_string().contains("State changed"));
        assert_eq!(store.load().unwrap().ids().collect::<Vec<_>>(), vec!["db"]);
    }
}
