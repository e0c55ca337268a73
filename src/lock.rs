use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use fs2::FileExt;
use crate::error::{Error, Result};

/// Advisory lock over a config directory, backed by a lock file.
///
/// In-process callers queue on a mutex for the length of one operation. Other
/// processes are kept out with a non-blocking exclusive file lock, so a busy
/// directory fails fast with [`Error::LockUnavailable`].
#[derive(Debug)]
pub struct DirLock {
    path: PathBuf,
    file: Mutex<File>,
}

/// Held for the duration of one store operation. Unlocks on drop.
#[derive(Debug)]
pub struct DirLockGuard<'a> {
    file: MutexGuard<'a, File>,
    path: &'a Path,
}

impl DirLock {
    /// Opens (creating if needed) the lock file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<DirLock> {
        let path = path.as_ref().to_path_buf();
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::io("error opening lock file", &path, e))?;
        Ok(DirLock {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Takes the lock without waiting on other processes.
    pub fn try_acquire(&self) -> Result<DirLockGuard<'_>> {
        // The guarded value is only the file handle, so a poisoned mutex is still usable.
        let file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Err(e) = FileExt::try_lock_exclusive(&*file) {
            return Err(if is_contended(&e) {
                Error::LockUnavailable { path: self.path.clone() }
            } else {
                Error::io("error while getting config directory lock", &self.path, e)
            });
        }

        tracing::trace!("acquired lock {}", self.path.display());
        Ok(DirLockGuard { file, path: &self.path })
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for DirLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&*self.file) {
            tracing::warn!("error unlocking config directory lock {}: {}", self.path.display(), e);
        }
    }
}
