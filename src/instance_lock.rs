use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Exclusive lock guaranteeing a single ingest writer per host.
///
/// The lock is an `flock` on `<runtime dir>/<name>.lock`, released and removed on drop.
pub struct InstanceLock {
    lock_file: File,
    lock_path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(name: &str) -> Result<Self> {
        Self::acquire_in(&Self::runtime_dir(), name)
    }

    /// Acquire a lock file inside `dir`
    pub fn acquire_in(dir: &Path, name: &str) -> Result<Self> {
        std::fs::create_dir_all(dir).context("Failed to create lock directory")?;
        let lock_path = dir.join(format!("{}.lock", name));

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = lock_file.as_raw_fd();
            let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
            if result != 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    anyhow::bail!(
                        "Another ingest worker is already running. Lock file: {}",
                        lock_path.display()
                    );
                }
                return Err(err).context("Failed to acquire lock");
            }
        }

        // Only the holder rewrites the PID
        lock_file.set_len(0).context("Failed to truncate lock file")?;
        let pid = std::process::id();
        (&lock_file)
            .write_all(format!("{}\n", pid).as_bytes())
            .context("Failed to write PID to lock file")?;

        info!("Acquired instance lock at {}", lock_path.display());
        debug!("Process ID: {}", pid);

        Ok(Self {
            lock_file,
            lock_path,
        })
    }

    /// XDG runtime directory on Linux, falling back to the temp directory
    fn runtime_dir() -> PathBuf {
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir())
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = self.lock_file.as_raw_fd();
            unsafe {
                libc::flock(fd, libc::LOCK_UN);
            }
        }

        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            eprintln!("Failed to remove lock file: {}", e);
        } else {
            debug!("Released instance lock at {}", self.lock_path.display());
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_released() {
        let dir = tempfile::tempdir().unwrap();

        let first = InstanceLock::acquire_in(dir.path(), "aircraft-digest-test").unwrap();
        assert!(first.path().exists());
        assert!(InstanceLock::acquire_in(dir.path(), "aircraft-digest-test").is_err());

        drop(first);
        let again = InstanceLock::acquire_in(dir.path(), "aircraft-digest-test").unwrap();
        assert!(again.path().exists());
    }
}
