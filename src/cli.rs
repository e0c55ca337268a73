use std::path::PathBuf;
use clap::{Args, Parser, Subcommand};
use conshim::global::utils::CONFIG_DIR_ENV;

#[derive(Debug, Parser, Clone)]
#[clap(author, version, about = "Manage shims that redirect local commands to containers", long_about = None)]
pub struct CLI {
    /// Config directory holding shims and cached registries (default: ~/.conshim)
    #[clap(long, global = true, env = CONFIG_DIR_ENV)]
    pub(crate) config_dir: Option<PathBuf>,

    /// Print debug logs
    #[clap(short, long, global = true)]
    pub(crate) verbose: bool,

    #[command(subcommand)]
    pub(crate) command: ConshimCommand,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum ConshimCommand {
    /// Print the bin path where the shims are located. Put it on your `PATH`
    Binpath,
    /// Manage the shim files in the local config directory
    #[command(subcommand)]
    Shim(ShimCommand),
    /// Create and edit manifest files
    Manifest {
        /// Manifest file to operate on
        #[clap(short, long, default_value = "manifest.gz")]
        manifest_file: PathBuf,
        #[command(subcommand)]
        command: ManifestCommand,
    },
    /// Manage registries cached in the local config directory
    #[command(subcommand)]
    Registry(RegistryCommand),
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum ShimCommand {
    /// Add a shim that runs the given command
    Add {
        name: String,
        #[clap(required = true, num_args = 1.., allow_hyphen_values = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Replace the command of an existing shim
    Update {
        name: String,
        #[clap(required = true, num_args = 1.., allow_hyphen_values = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// List current shims and their commands
    List,
}

/// Fields of a shim entry as given on the command line.
#[derive(Debug, Args, Clone, PartialEq)]
pub struct ShimArgs {
    /// Name of the shim
    #[clap(short, long)]
    pub name: String,
    /// Version of the shim
    #[clap(long = "shim-version", default_value = "")]
    pub version: String,
    /// Description of the shim
    #[clap(short, long, default_value = "")]
    pub description: String,
    /// Parameter names the command may reference as {{name}}
    #[clap(short, long, value_delimiter = ',')]
    pub parameters: Vec<String>,
    /// Single line command the shim runs
    #[clap(short, long)]
    pub command: String,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum ManifestCommand {
    /// Create an empty manifest for the given source
    Create {
        source: String,
        /// Version of the manifest
        #[clap(long, default_value = "")]
        version: String,
    },
    /// Print general information about the manifest
    Info,
    /// Add a shim entry to the manifest
    AddShim(ShimArgs),
    /// Replace a shim entry in the manifest
    UpdateShim(ShimArgs),
    /// Remove a shim entry from the manifest
    RemoveShim {
        name: String,
    },
    /// Print a shim entry from the manifest
    GetShim {
        name: String,
    },
    /// List the shim entries in the manifest
    ListShims,
    /// Print the script a shim entry renders to
    RenderShim {
        name: String,
        /// Parameter values: <name>=<value>
        #[clap(short, long = "parameter")]
        parameters: Vec<String>,
    },
    /// Render a shim entry into the local bin directory
    LoadShim {
        name: String,
        /// Parameter values: <name>=<value>
        #[clap(short, long = "parameter")]
        parameters: Vec<String>,
        /// Overwrite an existing local shim instead of adding a new one
        #[clap(short, long)]
        update: bool,
    },
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum RegistryCommand {
    /// Fetch a registry's manifest into the local cache
    Add {
        source: String,
    },
    /// Fetch a registry's manifest again and replace the cached copy
    Update {
        source: String,
    },
    /// List cached registries
    List,
    /// List the shims of a registry, fetching it if needed
    ListShims {
        source: String,
    },
    /// Render a shim from a registry into the local bin directory
    LoadShim {
        source: String,
        shim: String,
        /// Parameter values: <name>=<value>
        #[clap(short, long = "parameter")]
        parameters: Vec<String>,
        /// Overwrite an existing local shim instead of adding a new one
        #[clap(short, long)]
        update: bool,
    },
}
