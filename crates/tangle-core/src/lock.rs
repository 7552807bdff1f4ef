//! Advisory file locks around writes and replays.
//!
//! The player and the submit path do not lock anything themselves; callers
//! that write to a project database hold a [`WriterLock`] for the duration.
//! Readers that need a stable view may take a [`ReaderLock`], which is
//! compatible with other readers but not with a writer.

use crate::error::ErrorCode;
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub enum LockError {
    Timeout { path: PathBuf, waited: Duration },
    Io(io::Error),
}

impl From<io::Error> for LockError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl LockError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::LockContention,
            Self::Io(_) => ErrorCode::LockIoFailure,
        }
    }

    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { path, waited } => write!(
                f,
                "{}: lock on {} not acquired after {waited:?}",
                self.code().code(),
                path.display()
            ),
            Self::Io(err) => write!(f, "{}: {err}", self.code().code()),
        }
    }
}

impl std::error::Error for LockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Timeout { .. } => None,
        }
    }
}

#[derive(Clone, Copy)]
enum Mode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
struct FileGuard {
    file: File,
    path: PathBuf,
}

impl FileGuard {
    fn acquire(path: &Path, timeout: Duration, mode: Mode) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let start = Instant::now();
        loop {
            let attempt = match mode {
                Mode::Shared => FileExt::try_lock_shared(&file),
                Mode::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            match attempt {
                Ok(()) => {
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(err) if err.kind() != fs2::lock_contended_error().kind() => {
                    return Err(LockError::Io(err));
                }
                Err(_) => {}
            }

            let waited = start.elapsed();
            if waited >= timeout {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    waited,
                });
            }
            thread::sleep(RETRY_INTERVAL);
        }
    }
}

impl Drop for FileGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Exclusive lock held while appending to the log or replaying into stores.
#[derive(Debug)]
pub struct WriterLock {
    guard: FileGuard,
}

impl WriterLock {
    /// Block up to `timeout` for exclusive access to `path`.
    ///
    /// # Errors
    ///
    /// [`LockError::Timeout`] if another holder keeps the lock,
    /// [`LockError::Io`] if the lock file cannot be created.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let guard = FileGuard::acquire(path, timeout, Mode::Exclusive)?;
        tracing::debug!(path = %path.display(), "writer lock acquired");
        Ok(Self { guard })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.guard.path
    }
}

/// Shared lock for readers that must not observe a replay in progress.
#[derive(Debug)]
pub struct ReaderLock {
    guard: FileGuard,
}

impl ReaderLock {
    /// # Errors
    ///
    /// See [`WriterLock::acquire`].
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        Ok(Self {
            guard: FileGuard::acquire(path, timeout, Mode::Shared)?,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.guard.path
    }
}

#[cfg(test)]
mod tests {
    use super::{LockError, ReaderLock, WriterLock};
    use crate::error::ErrorCode;
    use std::{
        sync::{Arc, Barrier},
        thread,
        time::Duration,
    };

    #[test]
    fn writer_lock_creates_parent_and_releases_on_drop() -> Result<(), LockError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".tangle/write.lock");
        {
            let lock = WriterLock::acquire(&path, Duration::from_millis(50))?;
            assert_eq!(lock.path(), path.as_path());
        }
        let _again = WriterLock::acquire(&path, Duration::from_millis(50))?;
        Ok(())
    }

    #[test]
    fn second_writer_times_out() -> Result<(), LockError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("write.lock");
        let _held = WriterLock::acquire(&path, Duration::from_millis(50))?;
        let err = WriterLock::acquire(&path, Duration::from_millis(20)).expect_err("held");
        assert!(matches!(&err, LockError::Timeout { path: p, .. } if *p == path));
        assert_eq!(err.code(), ErrorCode::LockContention);
        assert!(err.hint().is_some());
        assert!(err.to_string().starts_with("E5001"));
        Ok(())
    }

    #[test]
    fn readers_share_but_exclude_writers() -> Result<(), LockError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("write.lock");
        let first = ReaderLock::acquire(&path, Duration::from_millis(50))?;
        let second = ReaderLock::acquire(&path, Duration::from_millis(50))?;
        assert!(matches!(
            WriterLock::acquire(&path, Duration::from_millis(20)),
            Err(LockError::Timeout { .. })
        ));
        drop(first);
        drop(second);
        let _writer = WriterLock::acquire(&path, Duration::from_millis(50))?;
        Ok(())
    }

    #[test]
    fn waiting_writer_gets_lock_after_release() -> Result<(), LockError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("write.lock");
        let held = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));

        let (held_t, release_t, path_t) = (Arc::clone(&held), Arc::clone(&release), path.clone());
        let handle = thread::spawn(move || {
            let _writer = WriterLock::acquire(&path_t, Duration::from_millis(200)).expect("lock");
            held_t.wait();
            release_t.wait();
        });

        held.wait();
        assert!(ReaderLock::acquire(&path, Duration::from_millis(20)).is_err());
        release.wait();
        handle.join().expect("holder thread");

        let _writer = WriterLock::acquire(&path, Duration::from_millis(200))?;
        Ok(())
    }
}
