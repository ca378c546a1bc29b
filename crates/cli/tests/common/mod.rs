//! Common utilities for integration tests

pub mod cli;

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Temporary vault, state directory and config file
pub struct VaultFixture {
    root: TempDir,
    config: PathBuf,
}

impl VaultFixture {
    /// Fixture whose config holds `extra` after the generated paths
    ///
    /// The HTTP port points at a closed loopback port so client commands
    /// see "daemon not running" immediately.
    pub fn with_config(extra: &str) -> Self {
        let root = TempDir::new().unwrap();
        let vault = root.path().join("vault");
        let state = root.path().join("state");
        fs::create_dir_all(&vault).unwrap();

        let config = root.path().join("vault-backup.toml");
        let content = format!(
            "vault_path = {:?}\nstate_dir = {:?}\nhealth_bind = \"127.0.0.1\"\nhealth_port = 1\n{}",
            vault.display().to_string(),
            state.display().to_string(),
            extra
        );
        fs::write(&config, content).unwrap();

        Self { root, config }
    }

    pub fn new() -> Self {
        Self::with_config("")
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn vault(&self) -> PathBuf {
        self.root.path().join("vault")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.path().join("state")
    }

    pub fn config(&self) -> &str {
        self.config.to_str().unwrap()
    }
}
