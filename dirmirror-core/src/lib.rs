//! dirmirror core library: domain types, configuration, errors.
//!
//! - [`types`]: root pair, comparison strategy, validated settings
//! - [`config`]: config file model, flag merging, validation
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{probe_log_file, MirrorConfig};
pub use error::ConfigError;
pub use types::{CompareStrategy, DirectoryMode, RootPair, SyncSettings};
