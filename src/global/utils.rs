use std::path::PathBuf;
use anyhow::{anyhow, Result};
use directories::BaseDirs;

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "CONSHIM_CONFIG_DIRECTORY";

const CONFIG_DIR_NAME: &str = ".conshim";

/// Default config directory: `~/.conshim`.
pub fn default_config_dir() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new()
        .ok_or_else(|| anyhow!("Could not determine the home directory"))?;
    Ok(base_dirs.home_dir().join(CONFIG_DIR_NAME))
}

/// Picks the config directory: an explicit path if given, otherwise the default.
pub fn resolve_config_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir),
        None => default_config_dir(),
    }
}
