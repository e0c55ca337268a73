use std::collections::HashMap;
use std::fmt;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::render::{parse_shim, render_shim, unreadable_shim};
use crate::store::Store;

/// Source recorded for shims created by hand rather than loaded from a manifest.
pub const USER_SOURCE: &str = "user";

/// Line placed between entries by [`shims_list_to_string`].
pub const ENTRY_DELIMITER: &str = "-------\n";

/// A shim definition: the metadata and command behind one generated script.
///
/// Inside a [`Manifest`] the `name` and `source` are not stored with the entry;
/// the map key and the manifest's own source take their place.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Shim {
    /// Executable name of the shim.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Registry or origin the shim came from.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    /// Free-form version string.
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Names that `{{name}}` placeholders in `command` may refer to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    /// Single line shell command the shim runs.
    #[serde(default)]
    pub command: String,
}

impl fmt::Display for Shim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "     Source: {}", self.source)?;
        writeln!(f, "       Name: {}", self.name)?;
        writeln!(f, "    Version: {}", self.version)?;
        writeln!(f, "Description: {}", self.description)?;
        if !self.parameters.is_empty() {
            writeln!(f, " Parameters: {}", self.parameters.join(","))?;
        }
        write!(f, "    Command: {}", self.command)
    }
}

/// Formats shims as blocks of `Key: value` lines separated by [`ENTRY_DELIMITER`].
///
/// Empty sources and descriptions are left out, as are empty parameter lists.
pub fn shims_list_to_string<'a, I>(shims: I) -> String
where
    I: IntoIterator<Item = &'a Shim>,
{
    let entries: Vec<String> = shims
        .into_iter()
        .map(|shim| {
            let mut entry = format!("       Name: {}\n", shim.name);
            if !shim.source.is_empty() {
                entry.push_str(&format!("     Source: {}\n", shim.source));
            }
            entry.push_str(&format!("    Version: {}\n", shim.version));
            if !shim.description.is_empty() {
                entry.push_str(&format!("Description: {}\n", shim.description));
            }
            if !shim.parameters.is_empty() {
                entry.push_str(&format!(" Parameters: {}\n", shim.parameters.join(",")));
            }
            entry.push_str(&format!("    Command: {}\n", shim.command));
            entry
        })
        .collect();
    entries.join(ENTRY_DELIMITER)
}

/// Whether [`load_shim`] may create a new bin file or must replace an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Add,
    Update,
}

fn user_shim(name: &str, version: &str, parameters: &[String], command: &str) -> Shim {
    Shim {
        name: name.to_string(),
        source: USER_SOURCE.to_string(),
        version: version.to_string(),
        description: String::new(),
        parameters: parameters.to_vec(),
        command: command.to_string(),
    }
}

/// Renders a hand-written shim and adds it to the store's bin directory.
///
/// # Errors
///
/// Fails with [`Error::AlreadyExists`] if a shim with this name is already active.
pub fn add_user_shim(
    store: &Store,
    name: &str,
    version: &str,
    parameters: &[String],
    command: &str,
) -> Result<()> {
    let rendered = render_shim(&user_shim(name, version, parameters, command), &HashMap::new())?;
    store.add_bin_file(name, rendered.as_bytes())
}

/// Re-renders a hand-written shim over an existing bin file.
///
/// # Errors
///
/// Fails with [`Error::NotFound`] if no shim with this name is active.
pub fn update_user_shim(
    store: &Store,
    name: &str,
    version: &str,
    parameters: &[String],
    command: &str,
) -> Result<()> {
    let rendered = render_shim(&user_shim(name, version, parameters, command), &HashMap::new())?;
    store.update_bin_file(name, rendered.as_bytes())
}

/// Lists every active shim with the metadata recovered from its script.
///
/// Unreadable or malformed scripts still produce an entry.
pub fn list_shims(store: &Store) -> Result<Vec<Shim>> {
    let names = store.list_bin_files()?;
    let shims = names
        .into_iter()
        .map(|name| match store.read_bin_file(&name) {
            Ok(contents) => parse_shim(&name, &contents),
            Err(e) => {
                tracing::debug!("error reading contents of shim '{}': {}", name, e);
                unreadable_shim(&name)
            }
        })
        .collect();
    Ok(shims)
}

/// Renders shim `name` from `manifest` with `values` and installs it into the bin directory.
///
/// # Errors
///
/// [`Error::MissingKey`] if the manifest has no such shim; otherwise whatever
/// rendering or the store reports.
pub fn load_shim(
    store: &Store,
    manifest: &Manifest,
    name: &str,
    values: &HashMap<String, String>,
    mode: LoadMode,
) -> Result<()> {
    let shim = manifest.get_shim(name).ok_or_else(|| Error::MissingKey {
        name: name.to_string(),
    })?;
    let rendered = render_shim(&shim, values)?;
    match mode {
        LoadMode::Add => store.add_bin_file(name, rendered.as_bytes()),
        LoadMode::Update => store.update_bin_file(name, rendered.as_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{COMMAND_MISSING, UNKNOWN};
    use tempfile::tempdir;

    fn sample_manifest() -> Manifest {
        let mut manifest = Manifest::new("github.com/example/shims");
        manifest
            .add_shim(
                "node",
                Shim {
                    version: "20".to_string(),
                    parameters: vec!["tag".to_string()],
                    command: "docker run --rm -it node:{{tag}} \"$@\"".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        manifest
    }

    #[test]
    fn test_display_lists_fields() {
        let shim = Shim {
            name: "node".to_string(),
            source: "user".to_string(),
            version: "1".to_string(),
            description: "js".to_string(),
            parameters: vec!["a".to_string(), "b".to_string()],
            command: "docker run node".to_string(),
        };
        assert_eq!(
            shim.to_string(),
            "     Source: user\n       Name: node\n    Version: 1\nDescription: js\n Parameters: a,b\n    Command: docker run node"
        );
    }

    #[test]
    fn test_list_to_string_skips_empty_fields() {
        let shims = vec![
            Shim { name: "a".to_string(), version: "1".to_string(), command: "x".to_string(), ..Default::default() },
            Shim {
                name: "b".to_string(),
                source: "s".to_string(),
                version: "2".to_string(),
                description: "d".to_string(),
                command: "y".to_string(),
                ..Default::default()
            },
        ];
        assert_eq!(
            shims_list_to_string(&shims),
            "       Name: a\n    Version: 1\n    Command: x\n-------\n       Name: b\n     Source: s\n    Version: 2\nDescription: d\n    Command: y\n"
        );
        assert_eq!(shims_list_to_string(&[]), "");
    }

    #[test]
    fn test_add_and_list_user_shims() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        add_user_shim(&store, "jq", "NONE", &[], "docker run -i stedolan/jq \"$@\"").unwrap();
        let shims = list_shims(&store).unwrap();

        assert_eq!(shims.len(), 1);
        assert_eq!(shims[0].name, "jq");
        assert_eq!(shims[0].source, USER_SOURCE);
        assert_eq!(shims[0].version, "NONE");
        assert_eq!(shims[0].command, "docker run -i stedolan/jq \"$@\"");
    }

    #[test]
    fn test_user_shim_add_then_update() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        let err = update_user_shim(&store, "jq", "NONE", &[], "jq").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        add_user_shim(&store, "jq", "NONE", &[], "jq").unwrap();
        let err = add_user_shim(&store, "jq", "NONE", &[], "jq2").unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));

        update_user_shim(&store, "jq", "2", &[], "docker run jq").unwrap();
        let shims = list_shims(&store).unwrap();
        assert_eq!(shims[0].version, "2");
        assert_eq!(shims[0].command, "docker run jq");
    }

    #[test]
    fn test_list_tolerates_malformed_files() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.add_bin_file("broken", b"#!/bin/sh\n# source: x version: 1").unwrap();

        let shims = list_shims(&store).unwrap();
        assert_eq!(shims[0].source, "x");
        assert_eq!(shims[0].command, COMMAND_MISSING);
        assert_ne!(shims[0].version, UNKNOWN);
    }

    #[test]
    fn test_load_shim_from_manifest() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let manifest = sample_manifest();
        let values = HashMap::from([("tag".to_string(), "20-alpine".to_string())]);

        load_shim(&store, &manifest, "node", &values, LoadMode::Add).unwrap();

        let script = String::from_utf8(store.read_bin_file("node").unwrap()).unwrap();
        assert!(script.contains("# source: github.com/example/shims version: 20 parameters: tag"));
        assert!(script.contains("node:20-alpine"));

        let err = load_shim(&store, &manifest, "node", &values, LoadMode::Add).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        load_shim(&store, &manifest, "node", &HashMap::new(), LoadMode::Update).unwrap();
        let script = String::from_utf8(store.read_bin_file("node").unwrap()).unwrap();
        assert!(script.contains("node:{{tag}}"));
    }

    #[test]
    fn test_load_missing_shim() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        let err = load_shim(&store, &sample_manifest(), "python", &HashMap::new(), LoadMode::Add).unwrap_err();
        assert!(matches!(err, Error::MissingKey { ref name } if name == "python"));
        assert!(store.list_bin_files().unwrap().is_empty());
    }
}
