use super::cluster::{ClusterConfig, TlsConfig, VerifyMode};
use crate::consistency::ConsistencyLevels;
use crate::types::BacklogMode;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::level_filters::LevelFilter;

/// Every recognized option with its default value.
pub const DEFAULTS: &[(&str, &str)] = &[
    ("table", "cache.values"),
    ("key_field", "key_field"),
    ("value_field", "value_field"),
    ("username", "username"),
    ("password", "password"),
    ("hosts", "127.0.0.1"),
    ("read_consistencies", "LOCAL_QUORUM, LOCAL_ONE, ONE"),
    ("write_consistencies", "LOCAL_ONE, ONE, ANY"),
    ("client_io_threads", "2"),
    ("client_queue_size", "8192"),
    ("client_server_connects_per_thread", "1"),
    ("client_max_connects_per_thread", "2"),
    ("client_max_conc_connect_creation", "1"),
    ("client_max_concurrent_requests", "100"),
    ("client_log_level", "2"),
    ("default_backlog_mode", "1"),
    ("server_trusted_cert", ""),
    ("server_verify_mode", "1"),
    ("client_ssl_cert", ""),
    ("client_ssl_key", ""),
    ("client_key_password", ""),
    ("connect_timeout_ms", "4000"),
    ("request_timeout_ms", "2000"),
    ("backlog_poll_interval_ms", "2000"),
    ("reconnect_backoff_ms", "1000"),
    ("shutdown_poll_interval_ms", "1000"),
];

/// Alternate option names accepted on input
const ALIASES: &[(&str, &str)] = &[("ip_addresses", "hosts")];

/// Cadence settings for the background backlog worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BacklogTiming {
    /// Time between drain passes (default: 2s)
    pub poll_interval: Duration,

    /// Time between initialize attempts while not connected (default: 1s)
    pub reconnect_backoff: Duration,

    /// Poll period while shutdown waits for an in-flight drain (default: 1s)
    pub shutdown_poll_interval: Duration,
}

impl Default for BacklogTiming {
    fn default() -> Self {
        StoreConfig::default().backlog()
    }
}

/// Resolved store configuration
///
/// Built once by overlaying user options onto [`DEFAULTS`]; never mutated
/// afterwards. Unknown options are ignored and resolution never fails.
#[derive(Debug, Clone, Serialize)]
pub struct StoreConfig {
    options: BTreeMap<String, String>,
    read_consistencies: ConsistencyLevels,
    write_consistencies: ConsistencyLevels,
    default_backlog_mode: BacklogMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::resolve(BTreeMap::new())
    }
}

impl StoreConfig {
    /// Resolve from `(option, value)` pairs. Later pairs win.
    pub fn from_options<I, K, V>(options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut supplied = BTreeMap::new();
        for (key, value) in options {
            match canonical_key(key.as_ref()) {
                Some(name) => {
                    supplied.insert(name.to_string(), value.as_ref().trim().to_string());
                }
                None => {
                    tracing::debug!("Ignoring unknown option '{}'", key.as_ref().trim());
                }
            }
        }
        Self::resolve(supplied)
    }

    /// Parse `key = value` lines; `#` starts a comment.
    pub fn parse_str(text: &str) -> Self {
        let pairs = text.lines().filter_map(|line| {
            let line = match line.find('#') {
                Some(idx) => &line[..idx],
                None => line,
            };
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        });
        Self::from_options(pairs)
    }

    /// Load a config file. An unreadable file yields the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse_str(&text),
            Err(e) => {
                tracing::warn!(
                    "Unable to read config file {}: {}; using defaults",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Return a copy with one option replaced. Unknown options are ignored.
    pub fn with_option(self, key: &str, value: impl Into<String>) -> Self {
        let mut options = self.options;
        if let Some(name) = canonical_key(key) {
            options.insert(name.to_string(), value.into().trim().to_string());
        }
        Self::resolve(options)
    }

    fn resolve(mut options: BTreeMap<String, String>) -> Self {
        for (name, default) in DEFAULTS {
            options
                .entry((*name).to_string())
                .or_insert_with(|| (*default).to_string());
        }

        let read_consistencies = ConsistencyLevels::parse(&options["read_consistencies"]);
        let write_consistencies = ConsistencyLevels::parse(&options["write_consistencies"]);
        let default_backlog_mode = BacklogMode::from_selector(&options["default_backlog_mode"]);

        Self {
            options,
            read_consistencies,
            write_consistencies,
            default_backlog_mode,
        }
    }

    /// Raw resolved value of a recognized option.
    pub fn get(&self, key: &str) -> Option<&str> {
        let name = canonical_key(key)?;
        self.options.get(name).map(String::as_str)
    }

    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    pub fn table(&self) -> &str {
        &self.options["table"]
    }

    /// Key column names in declared order. The count is the key arity.
    pub fn key_fields(&self) -> Vec<String> {
        split_list(&self.options["key_field"])
    }

    pub fn value_field(&self) -> &str {
        &self.options["value_field"]
    }

    pub fn read_consistencies(&self) -> &ConsistencyLevels {
        &self.read_consistencies
    }

    pub fn write_consistencies(&self) -> &ConsistencyLevels {
        &self.write_consistencies
    }

    pub fn default_backlog_mode(&self) -> BacklogMode {
        self.default_backlog_mode
    }

    /// Map `client_log_level` (0..6) onto a tracing filter.
    pub fn log_level(&self) -> LevelFilter {
        match self.number("client_log_level") {
            0 => LevelFilter::OFF,
            1 | 2 => LevelFilter::ERROR,
            3 => LevelFilter::WARN,
            4 => LevelFilter::INFO,
            5 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.number("connect_timeout_ms"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.number("request_timeout_ms"))
    }

    pub fn backlog(&self) -> BacklogTiming {
        BacklogTiming {
            poll_interval: Duration::from_millis(self.number("backlog_poll_interval_ms")),
            reconnect_backoff: Duration::from_millis(self.number("reconnect_backoff_ms")),
            shutdown_poll_interval: Duration::from_millis(
                self.number("shutdown_poll_interval_ms"),
            ),
        }
    }

    /// Driver connection settings
    pub fn cluster(&self) -> ClusterConfig {
        let count = |key: &str| u32::try_from(self.number(key)).unwrap_or(u32::MAX);

        ClusterConfig {
            hosts: split_list(&self.options["hosts"]),
            username: self.options["username"].clone(),
            password: self.options["password"].clone(),
            io_threads: count("client_io_threads"),
            queue_size: count("client_queue_size"),
            core_connections_per_host: count("client_server_connects_per_thread"),
            max_connections_per_host: count("client_max_connects_per_thread"),
            max_concurrent_creation: count("client_max_conc_connect_creation"),
            max_concurrent_requests: count("client_max_concurrent_requests"),
            tls: self.tls(),
        }
    }

    fn tls(&self) -> Option<TlsConfig> {
        let trusted_certs: Vec<PathBuf> = split_list(&self.options["server_trusted_cert"])
            .into_iter()
            .map(PathBuf::from)
            .collect();
        let non_empty = |key: &str| {
            let value = self.options[key].as_str();
            (!value.is_empty()).then(|| value.to_string())
        };
        let client_cert = non_empty("client_ssl_cert").map(PathBuf::from);
        let client_key = non_empty("client_ssl_key").map(PathBuf::from);

        let client_auth = client_cert.is_some() && client_key.is_some();
        if trusted_certs.is_empty() && !client_auth {
            return None;
        }

        Some(TlsConfig {
            trusted_certs,
            verify: VerifyMode::from_code(self.number("server_verify_mode") as i64),
            client_cert,
            client_key,
            key_password: non_empty("client_key_password"),
        })
    }

    /// Numeric option, falling back to the default number when unparsable.
    fn number(&self, key: &str) -> u64 {
        let raw = self.options.get(key).map(String::as_str).unwrap_or("");
        match raw.trim().parse() {
            Ok(n) => n,
            Err(_) => {
                let fallback = default_of(key)
                    .and_then(|d| d.parse().ok())
                    .unwrap_or_default();
                tracing::warn!(
                    "Option {} has non-numeric value '{}', using {}",
                    key,
                    raw,
                    fallback
                );
                fallback
            }
        }
    }
}

fn canonical_key(key: &str) -> Option<&'static str> {
    let key = key.trim();
    if let Some((_, target)) = ALIASES.iter().find(|(alias, _)| *alias == key) {
        return Some(*target);
    }
    DEFAULTS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(name, _)| *name)
}

fn default_of(key: &str) -> Option<&'static str> {
    DEFAULTS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, value)| *value)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
