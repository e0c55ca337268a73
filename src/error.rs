use std::path::PathBuf;

/// Boxed cause carried by [`Error::Codec`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by the manifest, rendering and store layers.
///
/// Each variant names the operation's subject (path, shim name) so callers can tell
/// "retry later" ([`Error::LockUnavailable`]) apart from "this already exists".
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("can't create '{}' because it already exists", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("'{}' doesn't exist", path.display())]
    NotFound { path: PathBuf },

    #[error("config directory lock '{}' is held by another process", path.display())]
    LockUnavailable { path: PathBuf },

    #[error("{context}")]
    Codec {
        context: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("shim '{name}' already exists in the manifest")]
    DuplicateKey { name: String },

    #[error("shim '{name}' does not exist in the manifest")]
    MissingKey { name: String },

    #[error("invalid name '{name}'")]
    InvalidName { name: String },

    #[error("can't render shim '{name}': {reason}")]
    InvalidShim { name: String, reason: String },

    #[error("{context} '{}'", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn codec(context: &'static str, source: impl Into<BoxError>) -> Self {
        Error::Codec {
            context,
            source: source.into(),
        }
    }

    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            context,
            path: path.into(),
            source,
        }
    }

    /// True for errors that only mean "try again later".
    pub fn is_lock_unavailable(&self) -> bool {
        matches!(self, Error::LockUnavailable { .. })
    }
}
