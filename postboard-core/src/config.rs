use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{redirect, Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Root of the backend API, e.g. `http://localhost:3000/api/`.
    pub api_url: String,
    pub request_timeout_seconds: u64,
    /// Buffered notifications per subscriber before it starts lagging.
    pub notification_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    pub posts_per_page: u32,
    pub page_size_options: Vec<u32>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000/api/".to_owned(),
            request_timeout_seconds: 10,
            notification_capacity: 32,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            posts_per_page: 2,
            page_size_options: vec![1, 2, 5, 10],
        }
    }
}

impl ApiConfig {
    /// API root, normalised to end with `/` so relative joins append.
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        let mut raw = self.api_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw)
    }

    pub fn posts_url(&self) -> Result<Url, url::ParseError> {
        self.base_url()?.join("posts/")
    }

    pub fn user_url(&self) -> Result<Url, url::ParseError> {
        self.base_url()?.join("user/")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn build_client(&self) -> Result<Client, ConfigError> {
        let client = ClientBuilder::new()
            .redirect(redirect::Policy::limited(5))
            .timeout(self.request_timeout())
            .user_agent(concat!("Postboard/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(client)
    }
}

impl AppConfig {
    /// Directory holding `config.json` and `session.json`.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("postboard"))
    }

    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Loads the configuration, writing defaults when none can be read.
    pub fn load() -> Self {
        let loaded = Self::config_file_path().and_then(|path| Self::load_from(&path));
        match loaded {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "could not load configuration, using defaults");
                let default_config = Self::default();
                if let Err(save_err) = default_config.save() {
                    warn!(error = %save_err, "could not save default configuration");
                }
                default_config
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config_content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&config_content)?;
        config.api.base_url()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let config_json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, config_json)?;
        Ok(())
    }
}
