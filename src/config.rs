//! Server configuration.
//!
//! Every field has a default so a minimal TOML file (or none at all) works.
//! `serde` handles syntax; [`ServerConfig::validate`] does the semantic checks
//! and reports every problem at once.
//!
//! ```toml
//! listen = "0.0.0.0:7777"
//! max_streams = 8192
//!
//! [tls]
//! private_key = "/etc/sbi/nrf.key"
//! cert = "/etc/sbi/nrf.crt"
//! verify_client_cacert = "/etc/sbi/ca.crt"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::h2_codec::FRAME_HEADER_LEN;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, `host:port`
    pub listen: String,
    /// Session pool capacity (concurrent connections)
    pub max_sessions: usize,
    /// Stream pool capacity, also advertised as SETTINGS_MAX_CONCURRENT_STREAMS
    pub max_streams: usize,
    /// Size of the per-read scratch buffer
    pub read_buffer_size: usize,
    /// Request bodies beyond this are dropped as overflow
    pub max_body_size: usize,
    /// Queued outbound bytes per session before the session is torn down
    pub max_write_queue_bytes: usize,
    /// Value of the `server` response header
    pub server_name: String,
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7777".to_string(),
            max_sessions: 1024,
            max_streams: 4096,
            read_buffer_size: 32 * 1024,
            max_body_size: 8 * 1024 * 1024,
            max_write_queue_bytes: 16 * 1024 * 1024,
            server_name: concat!("sbi-h2-server/", env!("CARGO_PKG_VERSION")).to_string(),
            tls: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TlsVersion {
    #[serde(rename = "tls1.2")]
    Tls12,
    #[serde(rename = "tls1.3")]
    Tls13,
}

impl std::fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsVersion::Tls12 => write!(f, "TLSv1.2"),
            TlsVersion::Tls13 => write!(f, "TLSv1.3"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub private_key: PathBuf,
    /// Certificate chain, leaf first
    pub cert: PathBuf,
    /// CA bundle for client certificates. Enables mutual TLS.
    pub verify_client_cacert: Option<PathBuf>,
    /// Require a client certificate when `verify_client_cacert` is set
    pub verify_client: bool,
    /// Accept client certificates that are otherwise valid but expired
    pub allow_expired_client_cert: bool,
    /// NSS key log output
    pub sslkeylog: Option<PathBuf>,
    pub min_version: TlsVersion,
    pub max_version: TlsVersion,
    /// rustls suite names, e.g. `TLS13_AES_256_GCM_SHA384`. Empty keeps the provider's list.
    pub cipher_suites: Vec<String>,
    /// Key exchange group names, e.g. `X25519`. Empty keeps the provider's list.
    pub kx_groups: Vec<String>,
    pub session_resumption: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            private_key: PathBuf::new(),
            cert: PathBuf::new(),
            verify_client_cacert: None,
            verify_client: true,
            allow_expired_client_cert: false,
            sslkeylog: None,
            min_version: TlsVersion::Tls13,
            max_version: TlsVersion::Tls13,
            cipher_suites: vec!["TLS13_AES_256_GCM_SHA384".to_string()],
            kx_groups: Vec::new(),
            session_resumption: false,
        }
    }
}

impl ServerConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic checks serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.listen.is_empty() {
            problems.push("listen address is empty".to_string());
        }
        if self.max_sessions == 0 {
            problems.push("max_sessions must be greater than 0".to_string());
        }
        if self.max_streams == 0 || self.max_streams > u32::MAX as usize {
            problems.push(format!("max_streams {} is out of range", self.max_streams));
        }
        if self.read_buffer_size < FRAME_HEADER_LEN {
            problems.push(format!(
                "read_buffer_size {} is smaller than a frame header",
                self.read_buffer_size
            ));
        }
        if self.max_write_queue_bytes == 0 {
            problems.push("max_write_queue_bytes must be greater than 0".to_string());
        }
        if let Some(tls) = &self.tls {
            if tls.private_key.as_os_str().is_empty() {
                problems.push("tls.private_key is required".to_string());
            }
            if tls.cert.as_os_str().is_empty() {
                problems.push("tls.cert is required".to_string());
            }
            if tls.min_version > tls.max_version {
                problems.push(format!(
                    "tls.min_version {} is above tls.max_version {}",
                    tls.min_version, tls.max_version
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join(", ")))
        }
    }
}
