/*!
 * Configuration types for the OMERO client
 */

use omero_gateway_interface::{Id, LoginCredentials};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default OMERO server port
pub const DEFAULT_PORT: u16 = 4064;

/// Number of times a delete completion handle is polled
pub const DEFAULT_DELETE_ATTEMPTS: u32 = 10;

/// Time each poll of a delete completion handle may block
pub const DEFAULT_DELETE_INTERVAL_MS: u64 = 500;

/// Bounded wait applied to every remote delete
///
/// The completion handle is always polled at least once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteWait {
    attempts: u32,
    interval: Duration,
}

impl DeleteWait {
    /// Poll up to `attempts` times, each poll blocking up to `interval`
    ///
    /// Zero attempts is raised to one.
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            interval,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Longest time a delete may block before it is reported as failed
    pub fn budget(&self) -> Duration {
        self.interval * self.attempts
    }
}

impl Default for DeleteWait {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_DELETE_ATTEMPTS,
            interval: Duration::from_millis(DEFAULT_DELETE_INTERVAL_MS),
        }
    }
}

/// Connection and diagnostics settings
///
/// The password is never part of the configuration; it is supplied when
/// building credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server host name
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// User to log in as
    pub username: String,

    /// Group to open the session in (None = the user's default group)
    #[serde(default)]
    pub group_id: Option<Id>,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Polls of a delete completion handle before giving up
    #[serde(default = "default_delete_attempts")]
    pub delete_attempts: u32,

    /// Milliseconds each poll may block
    #[serde(default = "default_delete_interval")]
    pub delete_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            username: String::new(),
            group_id: None,
            log_level: LogLevel::Info,
            log_file: None,
            delete_attempts: DEFAULT_DELETE_ATTEMPTS,
            delete_interval_ms: DEFAULT_DELETE_INTERVAL_MS,
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_delete_attempts() -> u32 {
    DEFAULT_DELETE_ATTEMPTS
}

fn default_delete_interval() -> u64 {
    DEFAULT_DELETE_INTERVAL_MS
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Delete-wait policy described by this configuration
    pub fn delete_wait(&self) -> DeleteWait {
        DeleteWait::new(
            self.delete_attempts,
            Duration::from_millis(self.delete_interval_ms),
        )
    }

    /// Password credentials for this configuration
    pub fn credentials(&self, password: impl Into<String>) -> LoginCredentials {
        let creds = LoginCredentials::password(&self.host, self.port, &self.username, password);
        match self.group_id {
            Some(group_id) => creds.with_group(group_id),
            None => creds,
        }
    }
}
