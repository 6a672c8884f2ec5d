use crate::search::{MatchOperator, SearchParams};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use super::client::DEFAULT_TIMEOUT;

/// Environment variable naming the appliance host
const ENV_HOST: &str = "NAMEAUDIT_HOST";

/// Environment variable overriding the config file location
const ENV_CONFIG_PATH: &str = "NAMEAUDIT_CONFIG";

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    appliance: Option<ApplianceSection>,
    search: Option<SearchSection>,
}

#[derive(Debug, Deserialize, Default)]
struct ApplianceSection {
    host: Option<String>,
    timeout_secs: Option<u64>,
    accept_invalid_certs: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct SearchSection {
    regex: Option<String>,
    days: Option<u32>,
    limit: Option<u32>,
    offset: Option<u32>,
    operator: Option<String>,
}

/// Runtime settings before command-line overrides are applied
#[derive(Debug, Clone)]
pub struct AuditSettings {
    pub host: Option<String>,
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
    pub search: SearchParams,
    /// Source of the host setting (for logging)
    pub host_source: ConfigSource,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            host: None,
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: false,
            search: SearchParams::default(),
            host_source: ConfigSource::Default,
        }
    }
}

/// Where a setting came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Using default hardcoded values
    Default,
    /// Loaded from environment variable
    Environment,
    /// Loaded from config file
    ConfigFile,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::ConfigFile => write!(f, "config file"),
        }
    }
}

/// Get the path to the configuration file
pub fn get_config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        let path = path.trim();
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("nameaudit").join("config.toml"))
}

fn load_config_file() -> Option<ConfigFile> {
    let path = get_config_file_path()?;

    if !path.exists() {
        return None;
    }

    match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!("Loaded config from {:?}", path);
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read config file {:?}: {}", path, e);
            None
        }
    }
}

/// Load settings with priority:
/// 1. Environment variable (NAMEAUDIT_HOST, host only)
/// 2. Config file (~/.config/nameaudit/config.toml)
/// 3. Default values
pub fn load_settings() -> AuditSettings {
    let env_host = std::env::var(ENV_HOST).ok();
    resolve_settings(load_config_file().unwrap_or_default(), env_host)
}

fn resolve_settings(config: ConfigFile, env_host: Option<String>) -> AuditSettings {
    let mut settings = AuditSettings::default();

    if let Some(appliance) = config.appliance {
        if let Some(host) = appliance.host.map(|h| h.trim().to_string()).filter(|h| !h.is_empty()) {
            settings.host = Some(host);
            settings.host_source = ConfigSource::ConfigFile;
        }
        if let Some(secs) = appliance.timeout_secs.filter(|s| *s > 0) {
            settings.timeout = Duration::from_secs(secs);
        }
        if let Some(insecure) = appliance.accept_invalid_certs {
            settings.accept_invalid_certs = insecure;
        }
    }

    if let Some(search) = config.search {
        if let Some(regex) = search.regex.filter(|r| !r.is_empty()) {
            settings.search.regex = regex;
        }
        if let Some(days) = search.days {
            settings.search.lookback_days = days;
        }
        if let Some(limit) = search.limit {
            settings.search.limit = limit;
        }
        if let Some(offset) = search.offset {
            settings.search.offset = offset;
        }
        if let Some(op) = search.operator {
            match op.parse::<MatchOperator>() {
                Ok(op) => settings.search.operator = op,
                Err(e) => tracing::warn!("Ignoring search operator from config file: {}", e),
            }
        }
    }

    if let Some(host) = env_host.map(|h| h.trim().to_string()).filter(|h| !h.is_empty()) {
        tracing::info!("Using appliance host from environment variable: {}", host);
        settings.host = Some(host);
        settings.host_source = ConfigSource::Environment;
    }

    settings
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/nameaudit/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# Nameaudit Configuration
# Place this file at: ~/.config/nameaudit/config.toml

[appliance]
# IP or hostname of the appliance (can also be set with NAMEAUDIT_HOST)
# host = "192.168.0.16"
# Per-request timeout in seconds
# timeout_secs = 10
# Accept self-signed certificates. Leave off unless the appliance uses one.
# accept_invalid_certs = false

[search]
# Naming convention devices are checked against
# regex = "^VMware"
# Lookback window in days
# days = 7
# Page size and starting offset
# limit = 100
# offset = 0
# "!=" reports devices that do NOT match the regex, "=" those that do
# operator = "!="
"#
    .to_string()
}
