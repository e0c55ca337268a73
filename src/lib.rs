//! # conshim Core Library
//!
//! This crate contains the core logic of the `conshim` tool – a manager for small
//! generated scripts ("shims") that redirect a local command name to a containerized
//! invocation, e.g. `node` → `docker run --rm -it node:20 "$@"`.
//!
//! Shim definitions are distributed in manifests: gzip-compressed JSON bundles
//! published by a registry. Active shims and cached manifests live in a
//! lock-guarded config directory (`~/.conshim` by default).
//!
//! ## Modules Overview
//! - [`shims`] – The shim entry type and operations on active shims
//! - [`render`] – Rendering shims into bash scripts and parsing them back
//! - [`manifest`] – Manifest CRUD and the compressed codec
//! - [`store`] – The config directory: bin files and registry files
//! - [`lock`] – Advisory locking of the config directory
//! - [`registry`] – Fetching manifests from remote registries
//! - [`global`] – Default locations and the manifest cache
//! - [`error`] – Error type shared by the modules above

pub mod error;
pub mod shims;
pub mod render;
pub mod manifest;
pub mod lock;
pub mod store;
pub mod registry;
pub mod util;
pub mod global;

pub use error::*;
pub use shims::*;
pub use render::*;
pub use manifest::*;
pub use store::*;
pub use registry::*;
pub use util::*;
