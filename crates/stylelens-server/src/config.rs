//! Server configuration

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use stylelens_classifiers::ModelsConfig;
use stylelens_core::Gender;

use crate::cli::Cli;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listener settings
    #[serde(default)]
    pub server: ListenConfig,

    /// Response shape
    #[serde(default)]
    pub response: ResponseConfig,

    /// Image encoder and classifier heads
    #[serde(default)]
    pub models: ModelsConfig,
}

impl ServerConfig {
    /// Load configuration from file and CLI overrides.
    ///
    /// A missing file means defaults; an unreadable or invalid one is an error.
    pub fn load(config_path: &str, cli: &Cli) -> anyhow::Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)?;
            Self::from_yaml(&content)
                .map_err(|e| anyhow::anyhow!("Invalid config file {}: {}", config_path, e))?
        } else {
            tracing::info!("No config file at {}, using defaults", config_path);
            Self::default()
        };

        config.apply_overrides(cli);
        Ok(config)
    }

    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Apply command-line overrides on top of file values
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.server.listen = listen.clone();
        }

        if let Some(port) = cli.port {
            self.server.port = port;
        }

        if let Some(path) = &cli.male_weights {
            self.models.heads.get_mut(Gender::Male).weights = path.clone();
        }

        if let Some(path) = &cli.female_weights {
            self.models.heads.get_mut(Gender::Female).weights = path.clone();
        }
    }

    /// Address to bind the listener to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let ip: IpAddr = self
            .server
            .listen
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address '{}': {}", self.server.listen, e))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Response configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    /// Include `confidence` and `probabilities` alongside `result`
    #[serde(default = "default_true")]
    pub include_probabilities: bool,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            include_probabilities: true,
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_true() -> bool {
    true
}
