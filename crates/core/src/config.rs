//! Sidecar configuration
//!
//! Settings are layered with the `config` crate:
//! 1. Serde defaults (every field has one)
//! 2. Optional TOML file (`--config <path>`, or `vault-backup.toml` if present)
//! 3. Environment variables (highest priority), e.g. `VAULT_PATH`,
//!    `DEBOUNCE_SECONDS`, `RESTIC_REPOSITORY`, `NOTIFY__WEBHOOK_URL`

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Probe file created and removed to check the vault is writable
pub const WRITE_PROBE_FILE: &str = ".backup-write-test";

/// External calls in the longest cycle: status, add, commit, rev-parse,
/// backup and forget
const CYCLE_TOOL_CALLS: u32 = 6;

/// Config file looked up in the working directory when none is given
const DEFAULT_CONFIG_NAME: &str = "vault-backup";

/// Configuration errors (fatal before the run loop starts)
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("vault directory does not exist: {0}")]
    VaultMissing(PathBuf),

    #[error("vault path is not a directory: {0}")]
    VaultNotDirectory(PathBuf),

    #[error("vault directory is not writable: {path} ({source}); remove ':ro' from the volume mount")]
    VaultReadOnly {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Top-level sidecar settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Vault root to watch and back up
    #[serde(default = "default_vault_path")]
    pub vault_path: PathBuf,

    /// Directory holding the persisted state markers and daemon lock
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Quiet period before a debounced backup cycle fires
    #[serde(default = "default_debounce_seconds")]
    pub debounce_seconds: u64,

    /// How often the periodic staleness check runs
    #[serde(default = "default_tick_interval_seconds")]
    pub tick_interval_seconds: u64,

    /// Upper bound on remote snapshot staleness while changes are pending
    #[serde(default = "default_backup_interval_seconds")]
    pub backup_interval_seconds: u64,

    /// Timeout for each external git/restic invocation
    #[serde(default = "default_command_timeout_seconds")]
    pub command_timeout_seconds: u64,

    /// How long shutdown waits for an in-flight cycle
    #[serde(default = "default_shutdown_timeout_seconds")]
    pub shutdown_timeout_seconds: u64,

    /// Bind address of the health/restore HTTP server
    #[serde(default = "default_health_bind")]
    pub health_bind: String,

    /// Port of the health/restore HTTP server
    #[serde(default = "default_health_port")]
    pub health_port: u16,

    /// Detect changes and report, but never commit or push
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default = "default_git_user_name")]
    pub git_user_name: String,

    #[serde(default = "default_git_user_email")]
    pub git_user_email: String,

    /// Restic repository URL (also read by restic from `RESTIC_REPOSITORY`)
    #[serde(default)]
    pub restic_repository: Option<String>,

    #[serde(default, skip_serializing)]
    pub restic_password: Option<String>,

    /// Tag applied to every snapshot and used to filter listings
    #[serde(default = "default_restic_tag")]
    pub restic_tag: String,

    #[serde(default)]
    pub retention: RetentionSettings,

    #[serde(default)]
    pub ignore: IgnoreConfig,

    #[serde(default)]
    pub notify: NotifySettings,

    #[serde(default)]
    pub llm: LlmSettings,

    /// Optional directory for a daily-rolling log file
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

/// Snapshot retention (`restic forget --prune`); disabled when all unset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionSettings {
    #[serde(default)]
    pub keep_daily: Option<u32>,
    #[serde(default)]
    pub keep_weekly: Option<u32>,
    #[serde(default)]
    pub keep_monthly: Option<u32>,
}

impl RetentionSettings {
    /// Whether any keep-policy is configured
    pub fn is_enabled(&self) -> bool {
        self.keep_daily.is_some() || self.keep_weekly.is_some() || self.keep_monthly.is_some()
    }
}

/// Ignore configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoreConfig {
    /// Use the vault's .gitignore patterns (default: true)
    #[serde(default = "default_true")]
    pub use_gitignore: bool,

    /// Additional patterns from config
    #[serde(default)]
    pub additional_patterns: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            use_gitignore: true,
            additional_patterns: vec![],
        }
    }
}

/// Which cycle outcomes produce notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    #[default]
    All,
    Errors,
    None,
}

impl NotifyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyLevel::All => "all",
            NotifyLevel::Errors => "errors",
            NotifyLevel::None => "none",
        }
    }
}

/// Notification providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifySettings {
    #[serde(default)]
    pub level: NotifyLevel,

    /// Generic JSON webhook endpoint
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// ntfy topic URL, e.g. `https://ntfy.sh/my-vault`
    #[serde(default)]
    pub ntfy_url: Option<String>,

    #[serde(default = "default_notify_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            level: NotifyLevel::default(),
            webhook_url: None,
            ntfy_url: None,
            timeout_seconds: default_notify_timeout_seconds(),
        }
    }
}

/// AI commit-message summarization (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_llm_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_llm_api_url(),
            api_key: None,
            model: default_llm_model(),
            timeout_seconds: default_llm_timeout_seconds(),
        }
    }
}

impl Settings {
    /// Load settings from the optional config file and the environment
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(config_file, true)
    }

    /// Load settings, optionally skipping the environment layer
    pub fn load_with(config_file: Option<&Path>, use_env: bool) -> Result<Self, ConfigError> {
        Self::build(config_file, use_env.then(environment))
    }

    fn build(
        config_file: Option<&Path>,
        env: Option<::config::Environment>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();

        builder = match config_file {
            Some(path) => builder.add_source(::config::File::from(path).required(true)),
            None => builder.add_source(::config::File::with_name(DEFAULT_CONFIG_NAME).required(false)),
        };

        if let Some(env) = env {
            builder = builder.add_source(env);
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Validate settings before entering the run loop
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("debounce_seconds", self.debounce_seconds),
            ("tick_interval_seconds", self.tick_interval_seconds),
            ("backup_interval_seconds", self.backup_interval_seconds),
            ("command_timeout_seconds", self.command_timeout_seconds),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.restic_tag.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "restic_tag",
                reason: "must not be empty".to_string(),
            });
        }

        // Dry runs never invoke restic, so credentials are optional there
        if !self.dry_run {
            let mut missing = Vec::new();
            if is_blank(&self.restic_repository) {
                missing.push("RESTIC_REPOSITORY");
            }
            if is_blank(&self.restic_password) {
                missing.push("RESTIC_PASSWORD");
            }
            if !missing.is_empty() {
                return Err(ConfigError::Missing(missing));
            }
        }

        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_seconds)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }

    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup_interval_seconds)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    /// Upper bound on one backup cycle
    ///
    /// Each external call is bounded by `command_timeout`; the commit
    /// summary request adds its own timeout when enabled.
    pub fn cycle_timeout(&self) -> Duration {
        let mut timeout = self.command_timeout() * CYCLE_TOOL_CALLS;
        if self.llm.enabled {
            timeout += Duration::from_secs(self.llm.timeout_seconds);
        }
        timeout
    }

    /// Repository location with credentials stripped, safe for logs
    pub fn redacted_repository(&self) -> Option<String> {
        self.restic_repository
            .as_deref()
            .map(|repo| match repo.split_once(':') {
                Some((scheme, _)) => format!("{}:***", scheme),
                None => "***".to_string(),
            })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            vault_path: default_vault_path(),
            state_dir: default_state_dir(),
            debounce_seconds: default_debounce_seconds(),
            tick_interval_seconds: default_tick_interval_seconds(),
            backup_interval_seconds: default_backup_interval_seconds(),
            command_timeout_seconds: default_command_timeout_seconds(),
            shutdown_timeout_seconds: default_shutdown_timeout_seconds(),
            health_bind: default_health_bind(),
            health_port: default_health_port(),
            dry_run: false,
            git_user_name: default_git_user_name(),
            git_user_email: default_git_user_email(),
            restic_repository: None,
            restic_password: None,
            restic_tag: default_restic_tag(),
            retention: RetentionSettings::default(),
            ignore: IgnoreConfig::default(),
            notify: NotifySettings::default(),
            llm: LlmSettings::default(),
            log_dir: None,
        }
    }
}

/// Validate the vault directory exists and is writable
pub fn validate_vault(vault_path: &Path) -> Result<(), ConfigError> {
    if !vault_path.exists() {
        return Err(ConfigError::VaultMissing(vault_path.to_path_buf()));
    }

    if !vault_path.is_dir() {
        return Err(ConfigError::VaultNotDirectory(vault_path.to_path_buf()));
    }

    let probe = vault_path.join(WRITE_PROBE_FILE);
    fs::write(&probe, b"")
        .and_then(|_| fs::remove_file(&probe))
        .map_err(|source| ConfigError::VaultReadOnly {
            path: vault_path.to_path_buf(),
            source,
        })
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn default_true() -> bool {
    true
}

/// Environment layer
///
/// Values stay strings: deserialization converts them for numeric and bool
/// fields, so secrets such as `RESTIC_PASSWORD=0070` arrive verbatim.
fn environment() -> ::config::Environment {
    ::config::Environment::default().separator("__")
}

fn default_vault_path() -> PathBuf {
    PathBuf::from("/vault")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/vault-backup")
}

fn default_debounce_seconds() -> u64 {
    30
}

fn default_tick_interval_seconds() -> u64 {
    300
}

fn default_backup_interval_seconds() -> u64 {
    3600
}

fn default_command_timeout_seconds() -> u64 {
    600
}

fn default_shutdown_timeout_seconds() -> u64 {
    120
}

fn default_health_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_health_port() -> u16 {
    8080
}

fn default_git_user_name() -> String {
    "Vault Backup".to_string()
}

fn default_git_user_email() -> String {
    "vault-backup@localhost".to_string()
}

fn default_restic_tag() -> String {
    "obsidian".to_string()
}

fn default_notify_timeout_seconds() -> u64 {
    10
}

fn default_llm_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout_seconds() -> u64 {
    20
}
