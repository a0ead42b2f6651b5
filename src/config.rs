//! Configuration for the kanban tool.
//!
//! Settings are read from `.kanban/kanban.toml` and layered
//! file → environment → CLI. Every field has a default, so a missing file
//! or an empty one is valid.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! db_path = ".kanban/kanban.db"
//! dev_mode = false
//!
//! [commit]
//! timeout_ms = 5000
//! max_attempts = 3
//! retry_backoff_ms = 100
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```
//!
//! Environment overrides: `KANBAN_PORT`, `KANBAN_DB_PATH`, `KANBAN_LOG`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::board::controller::CommitPolicy;
use crate::board::server::ServerConfig;

/// Directory holding the config file and, by default, the database.
pub const KANBAN_DIR: &str = ".kanban";
pub const CONFIG_FILE: &str = "kanban.toml";

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, colored when attached to a terminal
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {}. Use 'pretty' or 'json'", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Relative paths resolve against the project directory.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

fn default_db_path() -> PathBuf {
    PathBuf::from(KANBAN_DIR).join("kanban.db")
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            dev_mode: false,
        }
    }
}

/// Durable commit budget used by the drag controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSection {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

impl Default for CommitSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl CommitSection {
    pub fn to_commit_policy(&self) -> CommitPolicy {
        CommitPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            max_attempts: self.max_attempts,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Level or `EnvFilter` directive, e.g. `"info"` or `"kanban=debug"`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// The complete kanban.toml configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct KanbanToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub commit: CommitSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl KanbanToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse kanban.toml")
    }

    /// Load `kanban.toml` from `kanban_dir`, or defaults if it does not exist.
    pub fn load_or_default(kanban_dir: &Path) -> Result<Self> {
        let config_path = kanban_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize kanban.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides on top of the file values.
    pub fn apply_env(&mut self, env: &EnvOverrides) {
        if let Some(port) = env.port {
            self.server.port = port;
        }
        if let Some(ref db_path) = env.db_path {
            self.server.db_path = db_path.clone();
        }
        if let Some(ref level) = env.log {
            self.logging.level = level.clone();
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.commit.max_attempts == 0 {
            warnings.push("commit.max_attempts is 0; commits will be attempted once".to_string());
        }
        if self.commit.timeout_ms == 0 {
            warnings.push("commit.timeout_ms is 0; every commit will time out".to_string());
        }
        let level = self.logging.level.trim();
        if !level.contains('=') && !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
            warnings.push(format!(
                "Unknown logging.level '{}': expected one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }
        if self.server.dev_mode && self.server.host != default_host() {
            warnings.push(format!(
                "server.host '{}' is ignored in dev mode (binds 0.0.0.0)",
                self.server.host
            ));
        }

        warnings
    }
}

/// Values taken from `KANBAN_*` environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub log: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build overrides from any key lookup. Empty values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let port = get("KANBAN_PORT")
            .map(|v| {
                v.trim()
                    .parse::<u16>()
                    .with_context(|| format!("Invalid KANBAN_PORT: {}", v))
            })
            .transpose()?;
        Ok(Self {
            port,
            db_path: get("KANBAN_DB_PATH").map(PathBuf::from),
            log: get("KANBAN_LOG"),
        })
    }
}

/// Resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct KanbanConfig {
    pub project_dir: PathBuf,
    pub kanban_dir: PathBuf,
    pub toml: KanbanToml,
    /// CLI override: verbose logging
    pub verbose: bool,
}

impl KanbanConfig {
    /// Load file and environment layers for `project_dir`.
    pub fn load(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        Self::with_env(project_dir, &EnvOverrides::from_env()?, verbose)
    }

    pub fn with_env(project_dir: PathBuf, env: &EnvOverrides, verbose: bool) -> Result<Self> {
        let project_dir = if project_dir.exists() {
            project_dir
                .canonicalize()
                .context("Failed to resolve project directory")?
        } else {
            project_dir
        };
        let kanban_dir = project_dir.join(KANBAN_DIR);
        let mut toml = KanbanToml::load_or_default(&kanban_dir)?;
        toml.apply_env(env);

        Ok(Self {
            project_dir,
            kanban_dir,
            toml,
            verbose,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.kanban_dir.join(CONFIG_FILE)
    }

    /// Database path (file → env), resolved against the project directory.
    pub fn db_path(&self) -> PathBuf {
        self.resolve(&self.toml.server.db_path)
    }

    /// Server settings with CLI flags applied last.
    pub fn server_config(
        &self,
        port: Option<u16>,
        db_path: Option<PathBuf>,
        dev_mode: bool,
    ) -> ServerConfig {
        ServerConfig {
            host: self.toml.server.host.clone(),
            port: port.unwrap_or(self.toml.server.port),
            db_path: db_path
                .map(|p| self.resolve(&p))
                .unwrap_or_else(|| self.db_path()),
            dev_mode: dev_mode || self.toml.server.dev_mode,
        }
    }

    pub fn commit_policy(&self) -> CommitPolicy {
        self.toml.commit.to_commit_policy()
    }

    /// Log filter directive: `--verbose` beats the configured level.
    pub fn log_level(&self) -> String {
        if self.verbose {
            "debug".to_string()
        } else {
            self.toml.logging.level.clone()
        }
    }

    pub fn log_format(&self) -> LogFormat {
        self.toml.logging.format
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }
}
