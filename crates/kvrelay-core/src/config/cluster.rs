use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Connection settings handed to the storage driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Contact points
    pub hosts: Vec<String>,

    pub username: String,

    #[serde(skip_serializing)]
    pub password: String,

    /// Driver I/O threads (default: 2)
    pub io_threads: u32,

    /// Per-thread request queue size (default: 8192)
    pub queue_size: u32,

    /// Connections opened per host at startup (default: 1)
    pub core_connections_per_host: u32,

    /// Upper bound on connections per host (default: 2)
    pub max_connections_per_host: u32,

    pub max_concurrent_creation: u32,

    pub max_concurrent_requests: u32,

    /// TLS settings, `None` when TLS is disabled
    pub tls: Option<TlsConfig>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["127.0.0.1".to_string()],
            username: "username".to_string(),
            password: "password".to_string(),
            io_threads: 2,
            queue_size: 8192,
            core_connections_per_host: 1,
            max_connections_per_host: 2,
            max_concurrent_creation: 1,
            max_concurrent_requests: 100,
            tls: None,
        }
    }
}

/// How the client verifies the server certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMode {
    None,
    #[default]
    PeerCert,
    PeerIdentity,
    PeerIdentityDns,
}

impl VerifyMode {
    /// Map the numeric `server_verify_mode` option. Out-of-range values keep
    /// the default.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => VerifyMode::None,
            2 => VerifyMode::PeerIdentity,
            3 => VerifyMode::PeerIdentityDns,
            _ => VerifyMode::PeerCert,
        }
    }
}

/// TLS file locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Trusted server certificates (PEM)
    pub trusted_certs: Vec<PathBuf>,

    pub verify: VerifyMode,

    /// Client certificate for mutual authentication (PEM)
    pub client_cert: Option<PathBuf>,

    /// Client private key (PEM)
    pub client_key: Option<PathBuf>,

    #[serde(skip_serializing)]
    pub key_password: Option<String>,
}

/// PEM material read from the files named by a [`TlsConfig`]
#[derive(Debug, Clone, Default)]
pub struct TlsMaterial {
    pub trusted_certs: Vec<String>,
    pub verify: VerifyMode,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
    pub key_password: Option<String>,
}

impl TlsConfig {
    /// Read every configured PEM file.
    ///
    /// A client certificate without a key (or the reverse) is rejected.
    pub fn load(&self) -> Result<TlsMaterial> {
        let read = |path: &PathBuf| -> Result<String> {
            std::fs::read_to_string(path).map_err(|e| {
                RelayError::SessionFailed(format!(
                    "unable to read TLS file {}: {}",
                    path.display(),
                    e
                ))
            })
        };

        let trusted_certs = self
            .trusted_certs
            .iter()
            .map(read)
            .collect::<Result<Vec<_>>>()?;

        let (client_cert, client_key) = match (&self.client_cert, &self.client_key) {
            (Some(cert), Some(key)) => (Some(read(cert)?), Some(read(key)?)),
            (None, None) => (None, None),
            _ => {
                return Err(RelayError::SessionFailed(
                    "client certificate and key must be configured together".into(),
                ))
            }
        };

        Ok(TlsMaterial {
            trusted_certs,
            verify: self.verify,
            client_cert,
            client_key,
            key_password: self.key_password.clone(),
        })
    }
}
