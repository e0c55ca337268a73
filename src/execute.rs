use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use tempfile::NamedTempFile;
use conshim::global::cache;
use conshim::global::utils::resolve_config_dir;
use conshim::registry::{add_or_get_registry, refresh_registry, HttpRegistry, ManifestSource};
use conshim::shims::{add_user_shim, list_shims, load_shim, shims_list_to_string, update_user_shim, LoadMode, Shim};
use conshim::{parse_key_values, render_shim, Manifest, Store};
use crate::cli::{ConshimCommand, ManifestCommand, RegistryCommand, ShimArgs, ShimCommand, CLI};

/// Version recorded for shims added by hand.
const USER_SHIM_VERSION: &str = "NONE";

pub fn execute(cli: CLI) -> Result<()> {
    match cli.command {
        ConshimCommand::Binpath => {
            let store = open_store(cli.config_dir)?;
            println!("{}", store.bin_path().display());
            Ok(())
        }
        ConshimCommand::Shim(command) => {
            execute_shim(&open_store(cli.config_dir)?, command)
        }
        ConshimCommand::Manifest { manifest_file, command } => {
            execute_manifest(cli.config_dir, &manifest_file, command)
        }
        ConshimCommand::Registry(command) => {
            execute_registry(&open_store(cli.config_dir)?, command)
        }
    }
}

fn open_store(config_dir: Option<PathBuf>) -> Result<Store> {
    let config_dir = resolve_config_dir(config_dir)?;
    Store::open(&config_dir)
        .with_context(|| format!("Could not open config directory {}", config_dir.display()))
}

pub fn execute_shim(store: &Store, command: ShimCommand) -> Result<()> {
    match command {
        ShimCommand::Add { name, command } => {
            add_user_shim(store, &name, USER_SHIM_VERSION, &[], &command.join(" "))
                .with_context(|| format!("Could not add shim '{name}'"))?;
            println!("Added shim '{}'", name.bold());
        }
        ShimCommand::Update { name, command } => {
            update_user_shim(store, &name, USER_SHIM_VERSION, &[], &command.join(" "))
                .with_context(|| format!("Could not update shim '{name}'"))?;
            println!("Updated shim '{}'", name.bold());
        }
        ShimCommand::List => {
            let mut shims = list_shims(store)?;
            shims.sort_by(|a, b| a.name.cmp(&b.name));
            if shims.is_empty() {
                println!("No shims");
            } else {
                print!("{}", shims_list_to_string(&shims));
            }
        }
    }
    Ok(())
}

fn read_manifest_file(path: &Path) -> Result<Manifest> {
    let file = File::open(path)
        .with_context(|| format!("Could not open manifest file {}", path.display()))?;
    Manifest::read_manifest(file)
        .with_context(|| format!("Could not read manifest file {}", path.display()))
}

/// Encodes `manifest` into a temporary file beside `path` and moves it into place,
/// so the previous manifest survives a failed write. With `overwrite` unset an
/// existing file at `path` is an error.
fn write_manifest_file(path: &Path, manifest: &Manifest, overwrite: bool) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Could not create a temporary file in {}", dir.display()))?;
    manifest
        .write_manifest(&mut tmp)
        .with_context(|| format!("Could not write manifest file {}", path.display()))?;

    let persisted = if overwrite { tmp.persist(path) } else { tmp.persist_noclobber(path) };
    match persisted {
        Ok(_) => Ok(()),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
            Err(anyhow!("manifest file '{}' already exists", path.display()))
        }
        Err(e) => Err(e.error).with_context(|| format!("Could not save manifest file {}", path.display())),
    }
}

fn shim_from_args(args: &ShimArgs) -> Shim {
    Shim {
        name: String::new(),
        source: String::new(),
        version: args.version.clone(),
        description: args.description.clone(),
        parameters: args.parameters.clone(),
        command: args.command.clone(),
    }
}

fn parameter_values(pairs: &[String]) -> Result<std::collections::HashMap<String, String>> {
    parse_key_values(pairs).map_err(|e| anyhow!(e))
}

fn load_mode(update: bool) -> LoadMode {
    if update { LoadMode::Update } else { LoadMode::Add }
}

/// Commands on a manifest file. Only `load-shim` touches the config directory.
pub fn execute_manifest(config_dir: Option<PathBuf>, manifest_file: &Path, command: ManifestCommand) -> Result<()> {
    match command {
        ManifestCommand::Create { source, version } => {
            let mut manifest = Manifest::new(&source);
            manifest.version = version;
            write_manifest_file(manifest_file, &manifest, false)?;
            println!("Created manifest {} for {}", manifest_file.display(), source.bold());
        }
        ManifestCommand::Info => {
            let manifest = read_manifest_file(manifest_file)?;
            println!("Source: {}", manifest.source);
            println!("Version: {}", manifest.version);
            println!("Number of shims: {}", manifest.len());
        }
        ManifestCommand::AddShim(args) => {
            let mut manifest = read_manifest_file(manifest_file)?;
            manifest.add_shim(&args.name, shim_from_args(&args))?;
            write_manifest_file(manifest_file, &manifest, true)?;
            println!("Added shim '{}' to manifest {}", args.name.bold(), manifest.source);
        }
        ManifestCommand::UpdateShim(args) => {
            let mut manifest = read_manifest_file(manifest_file)?;
            manifest.update_shim(&args.name, shim_from_args(&args))?;
            write_manifest_file(manifest_file, &manifest, true)?;
            println!("Updated shim '{}' in manifest {}", args.name.bold(), manifest.source);
        }
        ManifestCommand::RemoveShim { name } => {
            let mut manifest = read_manifest_file(manifest_file)?;
            manifest.remove_shim(&name)?;
            write_manifest_file(manifest_file, &manifest, true)?;
            println!("Removed shim '{}' from manifest {}", name.bold(), manifest.source);
        }
        ManifestCommand::GetShim { name } => {
            let manifest = read_manifest_file(manifest_file)?;
            let shim = manifest
                .get_shim(&name)
                .ok_or_else(|| anyhow!("No shim '{}' was found in the manifest", name))?;
            println!("{shim}");
        }
        ManifestCommand::ListShims => {
            let manifest = read_manifest_file(manifest_file)?;
            print!("{}", manifest.shims_to_string());
        }
        ManifestCommand::RenderShim { name, parameters } => {
            let manifest = read_manifest_file(manifest_file)?;
            let values = parameter_values(&parameters)?;
            let shim = manifest
                .get_shim(&name)
                .ok_or_else(|| anyhow!("No shim '{}' was found in the manifest", name))?;
            print!("{}", render_shim(&shim, &values)?);
        }
        ManifestCommand::LoadShim { name, parameters, update } => {
            let manifest = read_manifest_file(manifest_file)?;
            let values = parameter_values(&parameters)?;
            let store = open_store(config_dir)?;
            load_shim(&store, &manifest, &name, &values, load_mode(update))
                .with_context(|| format!("Could not load shim '{name}'"))?;
            println!("Loaded shim '{}' into {}", name.bold(), store.bin_path().display());
        }
    }
    Ok(())
}

pub fn execute_registry(store: &Store, command: RegistryCommand) -> Result<()> {
    let registry = HttpRegistry::new();
    match command {
        RegistryCommand::Add { source } => {
            let manifest = registry_fetch_and_cache(store, &registry, &source)?;
            println!("Added registry {} ({} shims)", manifest.source.bold(), manifest.len());
        }
        RegistryCommand::Update { source } => {
            let manifest = refresh_registry(store, &registry, &source)?;
            println!("Updated registry {} ({} shims)", manifest.source.bold(), manifest.len());
        }
        RegistryCommand::List => {
            let files = cache::list_manifest_files(store)?;
            if files.is_empty() {
                println!("No registries");
            }
            for file in files {
                match cache::read_manifest_file(store, &file) {
                    Ok(manifest) => println!("{} ({})", manifest.source, manifest.version),
                    Err(e) => tracing::warn!("Skipping unreadable registry file {}: {}", file, e),
                }
            }
        }
        RegistryCommand::ListShims { source } => {
            let manifest = add_or_get_registry(store, &registry, &source)?;
            print!("{}", manifest.shims_to_string());
        }
        RegistryCommand::LoadShim { source, shim, parameters, update } => {
            let values = parameter_values(&parameters)?;
            let manifest = add_or_get_registry(store, &registry, &source)?;
            load_shim(store, &manifest, &shim, &values, load_mode(update))
                .with_context(|| format!("Could not load shim '{shim}' from registry {source}"))?;
            println!("Loaded shim '{}' into {}", shim.bold(), store.bin_path().display());
        }
    }
    Ok(())
}

fn registry_fetch_and_cache(store: &Store, registry: &HttpRegistry, source: &str) -> Result<Manifest> {
    let manifest = registry.fetch(source)?;
    cache::write_manifest(store, &manifest)
        .with_context(|| format!("Could not add registry '{source}', use `registry update` to refresh it"))?;
    Ok(manifest)
}
