//! Advisory locking for the metadata file.
//!
//! The metadata store is a single file shared by every process invocation;
//! two racing invocations could otherwise read the same pool state and make
//! conflicting decisions (both claiming the same pooled workspace, or both
//! allocating the same pool name). An exclusive lock on a sidecar file is
//! held for the duration of one read-modify-write cycle.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

/// RAII guard over the store's sidecar lock file. The lock releases on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Acquire an exclusive advisory lock, blocking until it is available.
    ///
    /// `store_path` is the metadata file itself; the lock lives next to it
    /// as `<store_path>.lock`.
    pub fn acquire(store_path: &Path) -> io::Result<Self> {
        let path = lock_path(store_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        file.lock_exclusive()?;
        Ok(StoreLock { file, path })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release store lock");
        }
    }
}

fn lock_path(store_path: &Path) -> PathBuf {
    let mut name = store_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "store".to_string());
    name.push_str(".lock");
    store_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn lock_excludes_second_locker_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("store.json");

        let guard = StoreLock::acquire(&store_path).unwrap();

        let (tx, rx) = mpsc::channel();
        let path_clone = store_path.clone();
        let handle = std::thread::spawn(move || {
            let _second = StoreLock::acquire(&path_clone).unwrap();
            tx.send(()).unwrap();
        });

        // The second locker must still be blocked.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        drop(guard);
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        handle.join().unwrap();
    }

    #[test]
    fn lock_file_sits_next_to_store() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("store.json");
        let _guard = StoreLock::acquire(&store_path).unwrap();
        assert!(dir.path().join("store.json.lock").exists());
    }
}
