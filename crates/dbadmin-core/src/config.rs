//! Configuration management for dbadmin
//!
//! The configuration lives in a YAML file. [`ConfigHandle`] keeps the current
//! parsed snapshot behind a read-write lock: readers clone an `Arc` under the
//! shared lock, a reload parses the file first and only takes the exclusive
//! lock to swap the pointer.

use crate::error::{AdminError, Result};
use crate::watcher::{is_target_file, WatchEvent, Watcher};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

/// Default location of the configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// Pause between a change notification and re-reading the file, so a writer
/// has a chance to finish.
pub const RELOAD_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:5173".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allowed_headers: ["Origin", "Content-Type", "Accept", "Authorization"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub driver: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub dbname: String,
    /// Extra connection parameters, `key=value` pairs joined with `&`
    pub params: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: "mysql".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            dbname: "app".to_string(),
            params: "charset=utf8mb4".to_string(),
            max_connections: 10,
        }
    }
}

impl DatabaseConfig {
    /// Connection parameters as ordered key/value pairs. Pairs without `=` get an
    /// empty value.
    pub fn params(&self) -> Vec<(String, String)> {
        self.params
            .split('&')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (k.trim().to_string(), v.trim().to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect()
    }

    /// Connection target for logs, without the password
    pub fn redacted_dsn(&self) -> String {
        format!(
            "{}://{}@{}:{}/{}",
            self.driver, self.username, self.host, self.port, self.dbname
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedisMode {
    #[default]
    Single,
    Cluster,
}

impl std::fmt::Display for RedisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RedisMode::Single => write!(f, "single"),
            RedisMode::Cluster => write!(f, "cluster"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub mode: RedisMode,
    pub single: SingleNodeConfig,
    pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleNodeConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub db: i64,
}

impl Default for SingleNodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: String::new(),
            db: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Seed node addresses, `host:port`
    pub addrs: Vec<String>,
    pub password: String,
    /// Allow reads to be served by replicas
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Validate a configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AdminError::InvalidConfig(
                "server.port must be greater than zero".to_string(),
            ));
        }
        if !self.database.driver.eq_ignore_ascii_case("mysql") {
            return Err(AdminError::InvalidConfig(format!(
                "unsupported database driver: {}",
                self.database.driver
            )));
        }
        if self.database.max_connections == 0 {
            return Err(AdminError::InvalidConfig(
                "database.max_connections must be greater than zero".to_string(),
            ));
        }
        if self.redis.mode == RedisMode::Cluster && self.redis.cluster.addrs.is_empty() {
            return Err(AdminError::InvalidConfig(
                "redis.cluster.addrs must list at least one node in cluster mode".to_string(),
            ));
        }
        Ok(())
    }

    /// Sections that differ from `other` and only take effect after a restart
    pub fn restart_required(&self, other: &AppConfig) -> Vec<&'static str> {
        let mut sections = Vec::new();
        if self.server != other.server {
            sections.push("server");
        }
        if self.database != other.database {
            sections.push("database");
        }
        if self.redis != other.redis {
            sections.push("redis");
        }
        if self.logging != other.logging {
            sections.push("logging");
        }
        sections
    }
}

/// Result of a reload attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    Unchanged,
    Applied { restart_required: Vec<&'static str> },
}

/// Shared, hot-reloadable configuration
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    path: PathBuf,
    current: Arc<RwLock<Arc<AppConfig>>>,
}

impl ConfigHandle {
    /// Load the file at `path` and wrap it
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = AppConfig::load(&path)?;
        Ok(Self::new(config, path))
    }

    pub fn new(config: AppConfig, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current configuration snapshot
    pub fn snapshot(&self) -> Arc<AppConfig> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Re-read the file and swap the snapshot when it changed. On error the
    /// previous snapshot stays in place.
    pub fn reload(&self) -> Result<ReloadOutcome> {
        let fresh = AppConfig::load(&self.path)?;
        let previous = self.snapshot();
        if *previous == fresh {
            return Ok(ReloadOutcome::Unchanged);
        }

        let restart_required = previous
            .restart_required(&fresh)
            .into_iter()
            .filter(|section| *section != "logging")
            .collect();

        let fresh = Arc::new(fresh);
        match self.current.write() {
            Ok(mut guard) => *guard = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }

        Ok(ReloadOutcome::Applied { restart_required })
    }

    /// Watch the configuration file and reload it on change.
    ///
    /// The watcher runs on a dedicated thread for the lifetime of the process.
    pub fn watch(&self) -> Result<std::thread::JoinHandle<()>> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = Watcher::new();
        watcher.watch(&dir)?;
        info!("Watching {} for changes", self.path.display());

        let handle = self.clone();
        let thread = std::thread::Builder::new()
            .name("config-watcher".to_string())
            .spawn(move || {
                while let Some(event) = watcher.next_event() {
                    match event {
                        WatchEvent::Changed(path) if is_target_file(&path, &handle.path) => {
                            std::thread::sleep(RELOAD_DELAY);
                            handle.reload_and_log();
                        }
                        WatchEvent::Changed(_) => {}
                        WatchEvent::Error(e) => warn!("Config watcher error: {}", e),
                    }
                }
            })?;

        Ok(thread)
    }

    fn reload_and_log(&self) {
        match self.reload() {
            Ok(ReloadOutcome::Unchanged) => {}
            Ok(ReloadOutcome::Applied { restart_required }) => {
                info!("Configuration reloaded from {}", self.path.display());
                if !restart_required.is_empty() {
                    warn!(
                        "Changes to [{}] take effect after a restart",
                        restart_required.join(", ")
                    );
                }
            }
            Err(e) => warn!("Failed to reload config, keeping previous: {}", e),
        }
    }
}
