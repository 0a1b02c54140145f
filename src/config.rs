//! Configuration management

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener configuration
    pub server: ServerConfig,
    /// Serving certificate files
    pub tls: TlsFilesConfig,
    /// Watched resource files
    pub sources: SourcesConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Limit for a complete TLS handshake, in seconds
    pub handshake_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8443,
            handshake_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Handshake timeout as a `Duration`.
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

/// Serving certificate files (PEM)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsFilesConfig {
    /// Certificate chain, leaf first
    pub cert_file: PathBuf,
    /// Private key
    pub key_file: PathBuf,
}

impl Default for TlsFilesConfig {
    fn default() -> Self {
        Self {
            cert_file: PathBuf::from("/var/run/certs/tls.crt"),
            key_file: PathBuf::from("/var/run/certs/tls.key"),
        }
    }
}

/// Resource files followed at runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Authentication descriptor (YAML, `data:` map)
    pub auth_descriptor: PathBuf,
    /// TLS profile selector (YAML, `spec.tlsSecurityProfile`)
    pub tls_profile: PathBuf,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            auth_descriptor: PathBuf::from(
                "/var/run/config/extension-apiserver-authentication.yaml",
            ),
            tls_profile: PathBuf::from("/var/run/config/cdiconfig.yaml"),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or holds invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("CDI_APISERVER_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that cannot work.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(Error::Config("server.host must not be empty".to_string()));
        }
        if self.server.handshake_timeout_secs == 0 {
            return Err(Error::Config(
                "server.handshake_timeout_secs must be positive".to_string(),
            ));
        }
        for (field, path) in [
            ("tls.cert_file", &self.tls.cert_file),
            ("tls.key_file", &self.tls.key_file),
            ("sources.auth_descriptor", &self.sources.auth_descriptor),
            ("sources.tls_profile", &self.sources.tls_profile),
        ] {
            if path.as_os_str().is_empty() {
                return Err(Error::Config(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}
