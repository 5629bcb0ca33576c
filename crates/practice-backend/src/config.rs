use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::RwLock;

const APP_NAME: &str = "practice-client";
const CONFIG_FILE: &str = "config.json";

/// Paths of the authentication endpoints, relative to the API base URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthEndpoints {
    #[serde(default = "default_login_path")]
    pub login: String,
    #[serde(default = "default_register_path")]
    pub register: String,
    #[serde(default = "default_refresh_path")]
    pub refresh: String,
    #[serde(default = "default_logout_path")]
    pub logout: String,
}

fn default_login_path() -> String {
    "/auth/login".to_string()
}

fn default_register_path() -> String {
    "/auth/register".to_string()
}

fn default_refresh_path() -> String {
    "/auth/refresh".to_string()
}

fn default_logout_path() -> String {
    "/auth/logout".to_string()
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            login: default_login_path(),
            register: default_register_path(),
            refresh: default_refresh_path(),
            logout: default_logout_path(),
        }
    }
}

impl AuthEndpoints {
    /// Returns true for endpoints that must never trigger a credential renewal.
    ///
    /// A 401 from login, registration or the renewal call itself is an
    /// ordinary authentication failure, not an expired access credential.
    pub fn is_exempt(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or(path);
        [&self.login, &self.register, &self.refresh]
            .iter()
            .any(|endpoint| path == endpoint.as_str())
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Transport timeout applied to every request, the renewal exchange included
    #[serde(default = "default_request_timeout")]
    pub request_timeout_sec: u64,
    #[serde(default)]
    pub endpoints: AuthEndpoints,
    #[serde(default = "default_notify_on_error")]
    pub notify_on_error: bool,
    /// Use desktop notifications instead of log lines for failed requests
    #[serde(default)]
    pub desktop_notifications: bool,
    /// Page opened when the session ends and the user has to sign in again
    #[serde(default)]
    pub login_page_url: Option<String>,
}

fn default_api_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_notify_on_error() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_sec: default_request_timeout(),
            endpoints: AuthEndpoints::default(),
            notify_on_error: default_notify_on_error(),
            desktop_notifications: false,
            login_page_url: None,
        }
    }
}

/// Configuration manager
pub struct ConfigManager {
    config: RwLock<Config>,
}

impl ConfigManager {
    /// Creates a new configuration manager
    pub fn new() -> Result<Self> {
        let config_dir = Self::config_dir()?;
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        let config_file = config_dir.join(CONFIG_FILE);

        let config = if config_file.exists() {
            let data =
                std::fs::read_to_string(&config_file).context("Failed to read config file")?;
            serde_json::from_str(&data).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config file: {}", e);
                Config::default()
            })
        } else {
            Config::default()
        };

        Ok(Self {
            config: RwLock::new(config),
        })
    }

    /// Gets a copy of the current configuration
    pub fn get(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Updates and saves the configuration
    pub fn save(&self, config: Config) -> Result<()> {
        let config_dir = Self::config_dir()?;
        let config_file = config_dir.join(CONFIG_FILE);

        let json = serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
        std::fs::write(&config_file, json).context("Failed to write config file")?;

        *self
            .config
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = config;

        Ok(())
    }

    /// Returns the config directory path
    pub fn config_dir() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join(APP_NAME))
    }
}
