use std::{
    net::{Ipv4Addr, SocketAddr},
    path::Path,
};

use serde::Deserialize;

pub const DEFAULT_NOMAD_ADDRESS: &str = "http://localhost:4646";
pub const DEFAULT_PORT: u16 = 50051;
pub const DEFAULT_DRIVER: &str = "containerd-driver";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid Nomad address '{address}': {source}")]
    InvalidAddress {
        address: String,
        source: url::ParseError,
    },
    #[error("Invalid port '{0}'")]
    InvalidPort(String),
    #[error("Unsupported scheme '{scheme}' in Nomad address '{address}' (only http)")]
    UnsupportedScheme { address: String, scheme: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlPlaneConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub nomad: NomadConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NomadConfig {
    /// Base URL of the Nomad agent. Only plain `http://` is supported: the
    /// HTTP client is built without TLS, so put a local agent or a
    /// TLS-terminating sidecar in front of a TLS-only cluster.
    #[serde(default = "default_nomad_address")]
    pub address: String,
    /// ACL token sent with every request.
    #[serde(default)]
    pub token: Option<String>,
    /// Client-side timeout. When unset only the caller's deadline applies.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_datacenters")]
    pub datacenters: Vec<String>,
    /// Task driver that runs the container image.
    #[serde(default = "default_driver")]
    pub driver: String,
    /// Region used when a request does not name one.
    #[serde(default)]
    pub region: Option<String>,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT))
}

fn default_nomad_address() -> String {
    DEFAULT_NOMAD_ADDRESS.to_string()
}

fn default_datacenters() -> Vec<String> {
    vec!["dc1".to_string()]
}

fn default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

impl Default for NomadConfig {
    fn default() -> Self {
        Self {
            address: default_nomad_address(),
            token: None,
            timeout_secs: None,
            datacenters: default_datacenters(),
            driver: default_driver(),
            region: None,
        }
    }
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            nomad: NomadConfig::default(),
        }
    }
}

impl ControlPlaneConfig {
    fn try_init_from_string(val: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(val)?)
    }

    /// Reads the config file (a missing file yields the defaults), then applies
    /// environment overrides.
    pub fn try_init(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(contents) => Self::try_init_from_string(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config file at {path:?}, using defaults");
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(address) = var("NOMAD_ADDR").filter(|a| !a.is_empty()) {
            self.nomad.address = address;
        }
        if let Some(token) = var("NOMAD_TOKEN").filter(|t| !t.is_empty()) {
            self.nomad.token = Some(token);
        }
        if let Some(port) = var("GRPC_PORT").filter(|p| !p.is_empty()) {
            self.set_port(&port)?;
            log::info!("Using port from environment: {port}");
        }
        Ok(())
    }

    pub fn set_port(&mut self, port: &str) -> Result<(), ConfigError> {
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort(port.to_string()))?;
        self.listen.set_port(port);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let address =
            url::Url::parse(&self.nomad.address).map_err(|source| ConfigError::InvalidAddress {
                address: self.nomad.address.clone(),
                source,
            })?;
        if address.scheme() != "http" {
            return Err(ConfigError::UnsupportedScheme {
                address: self.nomad.address.clone(),
                scheme: address.scheme().to_string(),
            });
        }
        Ok(())
    }
}
