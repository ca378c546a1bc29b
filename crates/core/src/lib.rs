//! Shared building blocks for the vault backup sidecar
//!
//! This crate provides:
//! - Settings loading and validation
//! - The durable State Store (change/commit/backup markers)
//! - Source identifier classification (git commit vs restic snapshot)
//! - Path normalization for user-supplied restore paths

pub mod config;
pub mod paths;
pub mod source;
pub mod state;

// Re-exports
pub use config::{
    validate_vault, ConfigError, IgnoreConfig, LlmSettings, NotifyLevel, NotifySettings,
    RetentionSettings, Settings, WRITE_PROBE_FILE,
};
pub use paths::{normalize_path, PathError};
pub use source::{classify_source, SourceKind};
pub use state::{ChangeState, StateError, StateStore};
