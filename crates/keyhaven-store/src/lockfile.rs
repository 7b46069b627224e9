//! Cross-process concurrency guard: a sidecar advisory lock plus atomic
//! whole-file replacement.
//!
//! The lock is cooperative and file-based, shared between independent OS
//! processes on one machine or a shared mount. It is held for a single
//! read-modify-write cycle, never across multiple API calls.

use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use fs2::FileExt;
use keyhaven_core::SecretError;
use tempfile::NamedTempFile;
use tracing::trace;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
pub const LOCK_TIMEOUT_ENV: &str = "KEYSTORE_LOCK_TIMEOUT";

const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Lock acquisition timeout, overridable in whole seconds via
/// `KEYSTORE_LOCK_TIMEOUT`.
pub fn lock_timeout_from_env() -> Duration {
    std::env::var(LOCK_TIMEOUT_ENV)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_LOCK_TIMEOUT)
}

/// Sidecar lock path for a keystore file (`app.v3keystore` →
/// `app.v3keystore.lock`). The sidecar has no semantic content and is never
/// encrypted or deleted.
pub fn lock_path_for(keystore_path: &Path) -> PathBuf {
    let mut name = keystore_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    keystore_path.with_file_name(name)
}

/// Scoped exclusive lock. Released on drop; the sidecar file itself stays.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
}

impl StoreLock {
    /// Acquire the exclusive lock for `keystore_path`, polling until
    /// `timeout` elapses. On timeout the caller gets a typed error and may
    /// retry; the guard itself does not.
    pub fn acquire(keystore_path: &Path, timeout: Duration) -> Result<Self, SecretError> {
        let lock_path = lock_path_for(keystore_path);
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(SecretError::storage)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(SecretError::storage)?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    trace!(path = %lock_path.display(), "acquired store lock");
                    return Ok(Self { file });
                }
                Err(err) if err.kind() == fs2::lock_contended_error().kind() => {}
                Err(err) => return Err(SecretError::storage(err)),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(SecretError::LockTimeout {
                    path: lock_path.display().to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }
            std::thread::sleep(RETRY_INTERVAL.min(deadline - now));
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Replace `path` with `bytes` atomically: write to a temp file in the same
/// directory, flush and fsync, then rename over the target. Readers only
/// ever observe the complete old file or the complete new file.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), SecretError> {
    let parent = path
        .parent()
        .ok_or_else(|| SecretError::storage("keystore path has no parent directory"))?;
    fs::create_dir_all(parent).map_err(SecretError::storage)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(SecretError::storage)?;
    tmp.write_all(bytes).map_err(SecretError::storage)?;
    tmp.flush().map_err(SecretError::storage)?;
    tmp.as_file().sync_all().map_err(SecretError::storage)?;
    tmp.persist(path).map_err(|e| SecretError::storage(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeout_env_override_and_fallback() {
        // Sole test touching this variable in the binary, so no guard needed.
        std::env::remove_var(LOCK_TIMEOUT_ENV);
        assert_eq!(lock_timeout_from_env(), DEFAULT_LOCK_TIMEOUT);

        std::env::set_var(LOCK_TIMEOUT_ENV, "5");
        assert_eq!(lock_timeout_from_env(), Duration::from_secs(5));

        // Unparsable values fall back to the 30 s default.
        std::env::set_var(LOCK_TIMEOUT_ENV, "soon");
        assert_eq!(lock_timeout_from_env(), DEFAULT_LOCK_TIMEOUT);

        std::env::remove_var(LOCK_TIMEOUT_ENV);
    }

    #[test]
    fn lock_path_appends_suffix() {
        let path = Path::new("/data/app.v3keystore");
        assert_eq!(
            lock_path_for(path),
            PathBuf::from("/data/app.v3keystore.lock")
        );
    }

    #[test]
    fn lock_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let keystore = dir.path().join("app.v3keystore");

        let held = StoreLock::acquire(&keystore, Duration::from_secs(1)).expect("first acquire");

        let err = StoreLock::acquire(&keystore, Duration::from_millis(150))
            .expect_err("second acquire should time out");
        assert!(matches!(err, SecretError::LockTimeout { .. }));

        drop(held);
        StoreLock::acquire(&keystore, Duration::from_secs(1)).expect("reacquire after drop");
    }

    #[test]
    fn waiting_acquire_succeeds_once_released() {
        let dir = tempfile::tempdir().expect("tempdir");
        let keystore = dir.path().join("app.v3keystore");

        let held = StoreLock::acquire(&keystore, Duration::from_secs(1)).expect("acquire");
        let path = keystore.clone();
        let waiter = std::thread::spawn(move || {
            StoreLock::acquire(&path, Duration::from_secs(5)).map(|_| ())
        });

        std::thread::sleep(Duration::from_millis(200));
        drop(held);
        waiter
            .join()
            .expect("join")
            .expect("waiter should acquire after release");
    }

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("app.v3keystore");

        atomic_write(&target, b"first").expect("write");
        assert_eq!(fs::read(&target).expect("read"), b"first");

        atomic_write(&target, b"second-longer-content").expect("overwrite");
        assert_eq!(fs::read(&target).expect("read"), b"second-longer-content");

        // No temp files left behind.
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read_dir")
            .flatten()
            .filter(|e| e.path() != target)
            .collect();
        assert!(leftovers.is_empty(), "stray files: {leftovers:?}");
    }
}
