//! Manifests cached in the store's `registries` directory, one file per source.

use std::fs::File;
use std::io::Write;
use crate::error::{Error, Result};
use crate::manifest::{source_hash, Manifest};
use crate::store::Store;

/// Writes `manifest` as a new cache entry.
///
/// The manifest is encoded before the file is created, and a failed write
/// removes the entry again so the next lookup fetches afresh.
///
/// # Errors
/// [`crate::Error::AlreadyExists`] if this source is already cached.
pub fn write_manifest(store: &Store, manifest: &Manifest) -> Result<()> {
    let blob = encode(manifest)?;
    let name = manifest.source_hash();
    let file = store.create_registry_file(&name)?;
    write_or_discard(store, &name, file, &blob)
}

/// Replaces the cache entry for `manifest.source`.
///
/// # Errors
/// [`crate::Error::NotFound`] if this source was never cached.
pub fn update_manifest(store: &Store, manifest: &Manifest) -> Result<()> {
    let blob = encode(manifest)?;
    let name = manifest.source_hash();
    let file = store.update_registry_file(&name)?;
    write_or_discard(store, &name, file, &blob)
}

fn encode(manifest: &Manifest) -> Result<Vec<u8>> {
    let mut blob = Vec::new();
    manifest.write_manifest(&mut blob)?;
    Ok(blob)
}

fn write_or_discard(store: &Store, name: &str, mut file: File, blob: &[u8]) -> Result<()> {
    let written = file.write_all(blob).and_then(|()| file.sync_all());
    drop(file);
    if let Err(e) = written {
        if let Err(remove_err) = store.remove_registry_file(name) {
            tracing::warn!("could not remove partial registry file {}: {}", name, remove_err);
        }
        return Err(Error::io("error writing registry file", store.registry_path().join(name), e));
    }
    Ok(())
}

/// Reads the cached manifest for `source`.
pub fn read_manifest(store: &Store, source: &str) -> Result<Manifest> {
    read_manifest_file(store, &source_hash(source))
}

/// Reads a cached manifest by its file name in the registries directory.
pub fn read_manifest_file(store: &Store, file_name: &str) -> Result<Manifest> {
    let file = store.get_registry_file(file_name)?;
    Manifest::read_manifest(file)
}

/// File names of every cached manifest.
pub fn list_manifest_files(store: &Store) -> Result<Vec<String>> {
    store.list_registry_files()
}
