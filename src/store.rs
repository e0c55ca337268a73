//! The local config directory: active shim scripts and cached manifests.
//!
//! ```text
//! <base>/lock               advisory lock file
//! <base>/bin/<name>         one executable script per active shim
//! <base>/registries/<hash>  one compressed manifest per cached registry
//! ```
//!
//! Every file follows a create-xor-update discipline: adding fails if the file
//! exists, updating fails if it doesn't.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;
use crate::error::{Error, Result};
use crate::lock::DirLock;
use crate::util::validate_file_name;

const LOCK_FILE: &str = "lock";
const BIN_DIR: &str = "bin";
const REGISTRIES_DIR: &str = "registries";

/// Handle to a config directory.
///
/// Construct one per process with [`Store::open`] and share it by reference.
#[derive(Debug)]
pub struct Store {
    lock: DirLock,
    bin_path: PathBuf,
    registry_path: PathBuf,
}

impl Store {
    /// Opens the config directory at `base`, creating `bin` and `registries` if needed.
    pub fn open<P: AsRef<Path>>(base: P) -> Result<Store> {
        let base = base.as_ref();
        let bin_path = base.join(BIN_DIR);
        let registry_path = base.join(REGISTRIES_DIR);

        create_private_dir(&bin_path)?;
        create_private_dir(&registry_path)?;
        let lock = DirLock::open(base.join(LOCK_FILE))?;

        tracing::debug!("opened config directory {}", base.display());
        Ok(Store {
            lock,
            bin_path,
            registry_path,
        })
    }

    /// Directory holding the shim scripts; this is what goes on `PATH`.
    pub fn bin_path(&self) -> &Path {
        &self.bin_path
    }

    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }

    /// Full path of the bin file `name`. Does not check that it exists.
    pub fn bin_file_path(&self, name: &str) -> PathBuf {
        self.bin_path.join(name)
    }

    /// Writes a new executable shim script.
    ///
    /// # Errors
    /// [`Error::AlreadyExists`] if `name` is already in the bin directory; its
    /// contents are left alone.
    pub fn add_bin_file(&self, name: &str, data: &[u8]) -> Result<()> {
        validate_file_name(name)?;
        let _guard = self.lock.try_acquire()?;

        let path = self.bin_path.join(name);
        let mut file = create_new(&path, BIN_FILE_MODE)?;
        if let Err(e) = file.write_all(data) {
            drop(file);
            discard_partial(&path);
            return Err(Error::io("error adding bin file", &path, e));
        }

        tracing::debug!("added bin file {}", path.display());
        Ok(())
    }

    /// Replaces an existing shim script. The new contents are written to a
    /// temporary file next to it and renamed over the old one, so a failed write
    /// leaves the previous script in place.
    ///
    /// # Errors
    /// [`Error::NotFound`] if `name` is not in the bin directory; nothing is created.
    pub fn update_bin_file(&self, name: &str, data: &[u8]) -> Result<()> {
        validate_file_name(name)?;
        let _guard = self.lock.try_acquire()?;

        let path = self.bin_path.join(name);
        fs::metadata(&path)
            .map_err(|e| not_found_or_io(e, "error opening file for update", path.clone()))?;
        replace_file(&self.bin_path, &path, data, BIN_FILE_MODE)?;

        tracing::debug!("updated bin file {}", path.display());
        Ok(())
    }

    /// Reads the contents of shim script `name`.
    pub fn read_bin_file(&self, name: &str) -> Result<Vec<u8>> {
        validate_file_name(name)?;
        let path = self.bin_path.join(name);
        fs::read(&path).map_err(|e| not_found_or_io(e, "error reading bin file", path))
    }

    /// Names of the files in the bin directory, in no particular order.
    pub fn list_bin_files(&self) -> Result<Vec<String>> {
        let _guard = self.lock.try_acquire()?;
        list_files(&self.bin_path)
    }

    /// Creates cache file `name` and returns it for writing. The caller closes it.
    ///
    /// # Errors
    /// [`Error::AlreadyExists`] if the file is already there.
    pub fn create_registry_file(&self, name: &str) -> Result<File> {
        validate_file_name(name)?;
        let _guard = self.lock.try_acquire()?;

        let path = self.registry_path.join(name);
        let file = create_new(&path, REGISTRY_FILE_MODE)?;
        tracing::debug!("created registry file {}", path.display());
        Ok(file)
    }

    /// Truncates existing cache file `name` and returns it for writing.
    ///
    /// # Errors
    /// [`Error::NotFound`] if there is no such file.
    pub fn update_registry_file(&self, name: &str) -> Result<File> {
        validate_file_name(name)?;
        let _guard = self.lock.try_acquire()?;

        let path = self.registry_path.join(name);
        let file = open_existing(&path)?;
        tracing::debug!("updating registry file {}", path.display());
        Ok(file)
    }

    /// Opens cache file `name` for reading.
    ///
    /// # Errors
    /// [`Error::NotFound`] if there is no such file.
    pub fn get_registry_file(&self, name: &str) -> Result<File> {
        validate_file_name(name)?;
        let _guard = self.lock.try_acquire()?;

        let path = self.registry_path.join(name);
        File::open(&path).map_err(|e| not_found_or_io(e, "error while opening registry file", path))
    }

    /// Deletes cache file `name`.
    ///
    /// # Errors
    /// [`Error::NotFound`] if there is no such file.
    pub fn remove_registry_file(&self, name: &str) -> Result<()> {
        validate_file_name(name)?;
        let _guard = self.lock.try_acquire()?;

        let path = self.registry_path.join(name);
        fs::remove_file(&path).map_err(|e| not_found_or_io(e, "error removing registry file", path.clone()))?;
        tracing::debug!("removed registry file {}", path.display());
        Ok(())
    }

    pub fn list_registry_files(&self) -> Result<Vec<String>> {
        let _guard = self.lock.try_acquire()?;
        list_files(&self.registry_path)
    }
}

#[cfg(unix)]
const BIN_FILE_MODE: u32 = 0o700;
#[cfg(unix)]
const REGISTRY_FILE_MODE: u32 = 0o600;
#[cfg(not(unix))]
const BIN_FILE_MODE: u32 = 0;
#[cfg(not(unix))]
const REGISTRY_FILE_MODE: u32 = 0;

fn create_private_dir(path: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(path)
        .map_err(|e| Error::io("error creating configuration directory", path, e))
}

#[cfg_attr(not(unix), allow(unused_variables))]
fn create_new(path: &Path, mode: u32) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    options.open(path).map_err(|e| match e.kind() {
        ErrorKind::AlreadyExists => Error::AlreadyExists { path: path.to_path_buf() },
        _ => Error::io("error creating file", path, e),
    })
}

#[cfg_attr(not(unix), allow(unused_variables))]
fn replace_file(dir: &Path, path: &Path, data: &[u8], mode: u32) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| Error::io("error creating temporary file", dir, e))?;
    tmp.write_all(data)
        .map_err(|e| Error::io("error writing temporary file", tmp.path(), e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))
            .map_err(|e| Error::io("error setting file mode", tmp.path(), e))?;
    }
    tmp.persist(path)
        .map_err(|e| Error::io("error replacing file", path, e.error))?;
    Ok(())
}

/// Removes a file left behind by a failed write; the write error is what gets reported.
fn discard_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!("could not remove partially written {}: {}", path.display(), e);
    }
}

fn open_existing(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| not_found_or_io(e, "error opening file for update", path.to_path_buf()))
}

fn not_found_or_io(e: std::io::Error, context: &'static str, path: PathBuf) -> Error {
    match e.kind() {
        ErrorKind::NotFound => Error::NotFound { path },
        _ => Error::io(context, path, e),
    }
}

fn list_files(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            Error::io("error while listing directory", path, e.into())
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}
