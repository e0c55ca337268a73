use std::collections::BTreeMap;
use std::io::{ErrorKind, Read, Write};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use crate::error::{Error, Result};
use crate::shims::{shims_list_to_string, Shim};

const READ_CHUNK_SIZE: usize = 1024;

/// A named, versioned collection of shim definitions.
///
/// On disk and over the wire a manifest is gzip-compressed JSON, see
/// [`Manifest::write_manifest`] and [`Manifest::read_manifest`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Identifier of the registry this manifest represents.
    pub source: String,
    #[serde(default)]
    pub version: String,
    /// Shims keyed by executable name.
    #[serde(default)]
    pub shims: BTreeMap<String, Shim>,
}

impl Manifest {
    /// Creates an empty manifest for `source`.
    pub fn new(source: &str) -> Manifest {
        Manifest {
            source: source.to_string(),
            version: String::new(),
            shims: BTreeMap::new(),
        }
    }

    /// Adds `shim` under `name`.
    ///
    /// # Errors
    /// [`Error::DuplicateKey`] if the name is taken, [`Error::InvalidName`] if it is empty.
    /// The manifest is left untouched on error.
    pub fn add_shim(&mut self, name: &str, shim: Shim) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidName { name: name.to_string() });
        }
        if self.shims.contains_key(name) {
            return Err(Error::DuplicateKey { name: name.to_string() });
        }
        self.shims.insert(name.to_string(), stored(shim));
        Ok(())
    }

    /// Returns a copy of shim `name` carrying this manifest's source and the lookup name.
    pub fn get_shim(&self, name: &str) -> Option<Shim> {
        self.shims.get(name).map(|shim| Shim {
            name: name.to_string(),
            source: self.source.clone(),
            ..shim.clone()
        })
    }

    /// Replaces shim `name` wholesale.
    ///
    /// # Errors
    /// [`Error::MissingKey`] if there is no such shim.
    pub fn update_shim(&mut self, name: &str, shim: Shim) -> Result<()> {
        match self.shims.get_mut(name) {
            Some(existing) => {
                *existing = stored(shim);
                Ok(())
            }
            None => Err(Error::MissingKey { name: name.to_string() }),
        }
    }

    /// # Errors
    /// [`Error::MissingKey`] if there is no such shim.
    pub fn remove_shim(&mut self, name: &str) -> Result<()> {
        self.shims
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::MissingKey { name: name.to_string() })
    }

    pub fn len(&self) -> usize {
        self.shims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shims.is_empty()
    }

    /// Iterates over all shims in name order, each with its name and source filled in.
    pub fn entries(&self) -> impl Iterator<Item = Shim> + '_ {
        self.shims.keys().filter_map(|name| self.get_shim(name))
    }

    /// File name of this manifest in the store's registry cache.
    pub fn source_hash(&self) -> String {
        source_hash(&self.source)
    }

    /// Human readable listing of every shim in the manifest.
    pub fn shims_to_string(&self) -> String {
        let shims: Vec<Shim> = self.entries().collect();
        shims_list_to_string(&shims)
    }

    /// Reads a compressed manifest from `src`.
    ///
    /// # Errors
    /// [`Error::Codec`] if the stream can't be decompressed or isn't a valid manifest.
    pub fn read_manifest<R: Read>(src: R) -> Result<Manifest> {
        let mut decoder = GzDecoder::new(src);
        let mut data = Vec::new();
        let mut buf = [0u8; READ_CHUNK_SIZE];
        loop {
            match decoder.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::codec("error decompressing manifest", e)),
            }
        }

        serde_json::from_slice(&data)
            .map_err(|e| Error::codec("error unmarshaling decompressed manifest", e))
    }

    /// Serializes and compresses the manifest into `dst`.
    ///
    /// # Errors
    /// [`Error::Codec`] if serialization or compression fails, including when the
    /// compressor accepts fewer bytes than were submitted.
    pub fn write_manifest<W: Write>(&self, dst: W) -> Result<()> {
        let data = serde_json::to_vec(self)
            .map_err(|e| Error::codec("error marshaling manifest", e))?;

        let mut encoder = GzEncoder::new(dst, Compression::default());
        let mut written = 0;
        while written < data.len() {
            match encoder.write(&data[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::codec("error compressing marshaled manifest", e)),
            }
        }

        if written != data.len() {
            let short = std::io::Error::new(
                ErrorKind::WriteZero,
                format!("{} bytes written, expected {}", written, data.len()),
            );
            return Err(Error::codec("short write during manifest compression", short));
        }

        encoder
            .finish()
            .map_err(|e| Error::codec("error finishing manifest compression", e))?;
        Ok(())
    }
}

/// Entries are stored without name and source; [`Manifest::get_shim`] restores both.
fn stored(shim: Shim) -> Shim {
    Shim {
        name: String::new(),
        source: String::new(),
        ..shim
    }
}

/// Deterministic cache file name for `source`: URL-safe base64 of its SHA-256 digest.
pub fn source_hash(source: &str) -> String {
    URL_SAFE.encode(Sha256::digest(source.as_bytes()))
}
