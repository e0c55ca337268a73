//! Process-wide locations: the config directory and the manifest cache inside it.

pub mod cache;
pub mod utils;
