use std::sync::LazyLock;
use anyhow::{bail, Context, Result};
use regex::Regex;
use crate::error::Error;
use crate::global::cache;
use crate::manifest::Manifest;
use crate::store::Store;

/// Name of the manifest blob at the root of a registry.
pub const MANIFEST_FILENAME: &str = "manifest.gz";

static IS_SSH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][\w-]*\$?@.*$").expect("ssh pattern is valid")
});
static HAS_SCHEMA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]*://.*$").expect("schema pattern is valid")
});

/// Anything that can produce the manifest for a source identifier.
pub trait ManifestSource {
    fn fetch(&self, source: &str) -> Result<Manifest>;
}

/// Fetches `manifest.gz` from the root of a registry over HTTP(S).
///
/// `github.com/<owner>/<repo>` sources are read from the raw content host.
#[derive(Debug, Default)]
pub struct HttpRegistry {
    client: reqwest::blocking::Client,
}

impl HttpRegistry {
    pub fn new() -> HttpRegistry {
        HttpRegistry::default()
    }
}

impl ManifestSource for HttpRegistry {
    fn fetch(&self, source: &str) -> Result<Manifest> {
        let url = manifest_url(source)?;
        tracing::debug!("fetching manifest for '{}' from {}", source, url);

        let response = self
            .client
            .get(&url)
            .header("User-Agent", "conshim")
            .send()
            .with_context(|| format!("Failed to fetch manifest from {url}"))?;
        if !response.status().is_success() {
            bail!("Failed to fetch manifest from {}: {}", url, response.status());
        }
        let bytes = response.bytes()?;

        let mut manifest = Manifest::read_manifest(&bytes[..])
            .with_context(|| format!("Invalid manifest at {url}"))?;
        if manifest.source != source {
            tracing::debug!("manifest at {} names source '{}', using '{}'", url, manifest.source, source);
            manifest.source = source.to_string();
        }
        Ok(manifest)
    }
}

/// Prepends `https://` to sources that have neither a schema nor ssh form.
pub fn munge_url(url: &str) -> String {
    if IS_SSH.is_match(url) || HAS_SCHEMA.is_match(url) {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

/// URL of the manifest blob for `source`.
pub fn manifest_url(source: &str) -> Result<String> {
    if IS_SSH.is_match(source) {
        bail!("ssh registries are not supported: {}", source);
    }
    let url = munge_url(source);
    let url = url.trim_end_matches('/').trim_end_matches(".git");

    let github = ["https://github.com/", "http://github.com/"]
        .iter()
        .find_map(|prefix| url.strip_prefix(prefix));
    if let Some(repo) = github {
        let mut parts = repo.split('/');
        if let (Some(owner), Some(name)) = (parts.next(), parts.next()) {
            return Ok(format!(
                "https://raw.githubusercontent.com/{owner}/{name}/HEAD/{MANIFEST_FILENAME}"
            ));
        }
    }
    Ok(format!("{url}/{MANIFEST_FILENAME}"))
}

/// Returns the cached manifest for `source`, fetching and caching it on a miss.
/// An unreadable cache entry is replaced by a fresh fetch.
pub fn add_or_get_registry(store: &Store, registry: &dyn ManifestSource, source: &str) -> Result<Manifest> {
    match cache::read_manifest(store, source) {
        Ok(manifest) => Ok(manifest),
        Err(Error::NotFound { .. }) => {
            tracing::info!("No cached manifest for registry '{}', fetching it", source);
            let manifest = registry.fetch(source)?;
            cache::write_manifest(store, &manifest)
                .with_context(|| format!("Could not cache manifest for '{source}'"))?;
            Ok(manifest)
        }
        Err(e @ Error::Codec { .. }) => {
            tracing::warn!("Cached manifest for registry '{}' is unreadable ({}), fetching it again", source, e);
            refresh_registry(store, registry, source)
        }
        Err(e) => Err(e).with_context(|| format!("Could not read cached manifest for '{source}'")),
    }
}

/// Fetches `source` again and replaces (or creates) its cache entry.
pub fn refresh_registry(store: &Store, registry: &dyn ManifestSource, source: &str) -> Result<Manifest> {
    let manifest = registry.fetch(source)?;
    let cached = match cache::update_manifest(store, &manifest) {
        Err(Error::NotFound { .. }) => cache::write_manifest(store, &manifest),
        other => other,
    };
    cached.with_context(|| format!("Could not cache manifest for '{source}'"))?;
    Ok(manifest)
}
