//! Dashboard configuration
//!
//! Resolved once at startup from, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. an optional YAML file (`F2B_CONFIG` or an explicit path)
//! 3. `F2B_*` environment variables
//!
//! Command-line flags on `serve` are applied on top by the binary.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use f2b_core::Mode;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8502;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_CLIENT: &str = "fail2ban-client";
pub const DEFAULT_SSH_USER: &str = "root";
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// `auto` probes for the client at startup; `true`/`false` force the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "DemoValue")]
pub enum DemoSetting {
    #[default]
    Auto,
    On,
    Off,
}

impl DemoSetting {
    /// The mode this setting forces, or `None` when it must be probed.
    pub fn forced_mode(self) -> Option<Mode> {
        match self {
            Self::Auto => None,
            Self::On => Some(Mode::Demo),
            Self::Off => Some(Mode::Live),
        }
    }
}

impl FromStr for DemoSetting {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "true" | "1" | "yes" | "on" => Ok(Self::On),
            "false" | "0" | "no" | "off" => Ok(Self::Off),
            _ => Err("expected auto, true or false".to_string()),
        }
    }
}

/// YAML accepts both `demo: true` and `demo: "auto"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum DemoValue {
    Flag(bool),
    Text(String),
}

impl TryFrom<DemoValue> for DemoSetting {
    type Error = String;

    fn try_from(v: DemoValue) -> std::result::Result<Self, Self::Error> {
        match v {
            DemoValue::Flag(true) => Ok(Self::On),
            DemoValue::Flag(false) => Ok(Self::Off),
            DemoValue::Text(s) => s.parse(),
        }
    }
}

impl fmt::Display for DemoSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::On => "true",
            Self::Off => "false",
        })
    }
}

/// Remote execution target; when present, commands go over SSH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub user: String,
    pub key: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub demo: DemoSetting,
    /// Path or name of `fail2ban-client`.
    pub client: String,
    pub use_sudo: bool,
    pub ssh: Option<SshTarget>,
    pub log_path: PathBuf,
    pub command_timeout: Duration,
    pub static_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            demo: DemoSetting::Auto,
            client: DEFAULT_CLIENT.to_string(),
            use_sudo: true,
            ssh: None,
            log_path: default_log_path(),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            static_dir: None,
        }
    }
}

/// On-disk shape; every field optional so a file can override just a few.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bind: Option<String>,
    port: Option<u16>,
    demo: Option<DemoSetting>,
    client: Option<String>,
    use_sudo: Option<bool>,
    ssh_host: Option<String>,
    ssh_user: Option<String>,
    ssh_key: Option<PathBuf>,
    log_path: Option<PathBuf>,
    command_timeout_secs: Option<u64>,
    static_dir: Option<PathBuf>,
}

/// `<data dir>/f2b-dashboard/actions.jsonl`, or the working directory when
/// the platform has no data dir.
pub fn default_log_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("f2b-dashboard")
        .join("actions.jsonl")
}

impl Config {
    /// Load from the process environment, reading `file` (or `$F2B_CONFIG`)
    /// first if given.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os("F2B_CONFIG").map(PathBuf::from);
        let path = file.map(Path::to_path_buf).or(from_env);

        let yaml = match &path {
            Some(p) => Some(std::fs::read_to_string(p).map_err(|source| ConfigError::Io {
                path: p.clone(),
                source,
            })?),
            None => None,
        };

        Self::from_sources(yaml.as_deref(), |key| std::env::var(key).ok())
    }

    /// Build from an optional YAML document and an environment lookup.
    pub fn from_sources<F>(yaml: Option<&str>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(doc) = yaml {
            let file: FileConfig = serde_yaml::from_str(doc)?;
            config.apply_file(file);
        }
        config.apply_env(|key| env(key).filter(|v| !v.trim().is_empty()))?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.bind {
            self.bind = v;
        }
        if let Some(v) = file.port {
            self.port = v;
        }
        if let Some(v) = file.demo {
            self.demo = v;
        }
        if let Some(v) = file.client {
            self.client = v;
        }
        if let Some(v) = file.use_sudo {
            self.use_sudo = v;
        }
        if let Some(host) = file.ssh_host.filter(|h| !h.is_empty()) {
            self.ssh = Some(SshTarget {
                host,
                user: file.ssh_user.unwrap_or_else(|| DEFAULT_SSH_USER.to_string()),
                key: file.ssh_key,
            });
        }
        if let Some(v) = file.log_path {
            self.log_path = v;
        }
        if let Some(v) = file.command_timeout_secs {
            self.command_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.static_dir {
            self.static_dir = Some(v);
        }
    }

    fn apply_env<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = env("F2B_BIND") {
            self.bind = v;
        }
        if let Some(v) = env("F2B_PORT") {
            self.port = parse_value("F2B_PORT", &v)?;
        }
        if let Some(v) = env("F2B_DEMO") {
            self.demo = parse_value("F2B_DEMO", &v)?;
        }
        if let Some(v) = env("F2B_CLIENT") {
            self.client = v;
        }
        if let Some(v) = env("F2B_USE_SUDO") {
            self.use_sudo = parse_bool("F2B_USE_SUDO", &v)?;
        }

        if let Some(host) = env("F2B_SSH_HOST") {
            let previous = self.ssh.take();
            self.ssh = Some(SshTarget {
                host,
                user: previous
                    .as_ref()
                    .map(|s| s.user.clone())
                    .unwrap_or_else(|| DEFAULT_SSH_USER.to_string()),
                key: previous.and_then(|s| s.key),
            });
        }
        if let Some(ssh) = self.ssh.as_mut() {
            if let Some(user) = env("F2B_SSH_USER") {
                ssh.user = user;
            }
            if let Some(key) = env("F2B_SSH_KEY") {
                ssh.key = Some(PathBuf::from(key));
            }
        }

        if let Some(v) = env("F2B_LOG_PATH").or_else(|| env("F2B_DB_PATH")) {
            self.log_path = PathBuf::from(v);
        }
        if let Some(v) = env("F2B_COMMAND_TIMEOUT") {
            let secs: u64 = parse_value("F2B_COMMAND_TIMEOUT", &v)?;
            self.command_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = env("F2B_STATIC_DIR") {
            self.static_dir = Some(PathBuf::from(v));
        }

        if self.command_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "command_timeout",
                value: "0".to_string(),
                reason: "must be at least one second".to_string(),
            });
        }
        Ok(())
    }

    /// `host:port` for the listener.
    pub fn listen_addr(&self) -> String {
        if self.bind.contains(':') && !self.bind.starts_with('[') {
            format!("[{}]:{}", self.bind, self.port)
        } else {
            format!("{}:{}", self.bind, self.port)
        }
    }

    pub fn is_remote(&self) -> bool {
        self.ssh.is_some()
    }
}

fn parse_value<T>(key: &'static str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}
