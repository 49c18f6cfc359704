// Daemon configuration (environment variables with defaults)

use switchboard_api_rpc::RpcServerConfig;
use tracing::warn;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9527;
const DEFAULT_RPC_PATH: &str = "/";
const DEFAULT_METRICS_PATH: &str = "/metrics";
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var("SWITCHBOARD_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub host: String,
    pub rpc_port: u16,
    pub rpc_path: String,
    pub metrics_path: String,
    /// Unset = unbounded fan-out per batch
    pub batch_concurrency: Option<usize>,
    pub max_body_bytes: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            rpc_port: DEFAULT_RPC_PORT,
            rpc_path: DEFAULT_RPC_PATH.to_string(),
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            batch_concurrency: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable values fall back to the default with a warning
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("SWITCHBOARD_HOST").unwrap_or(defaults.host),
            rpc_port: parsed(&lookup, "SWITCHBOARD_RPC_PORT").unwrap_or(defaults.rpc_port),
            rpc_path: lookup("SWITCHBOARD_RPC_PATH")
                .map(normalize_path)
                .unwrap_or(defaults.rpc_path),
            metrics_path: lookup("SWITCHBOARD_METRICS_PATH")
                .map(normalize_path)
                .unwrap_or(defaults.metrics_path),
            batch_concurrency: parsed(&lookup, "SWITCHBOARD_BATCH_CONCURRENCY")
                .filter(|n: &usize| *n > 0),
            max_body_bytes: parsed(&lookup, "SWITCHBOARD_MAX_BODY_BYTES")
                .unwrap_or(defaults.max_body_bytes),
        }
    }

    pub fn server(&self) -> RpcServerConfig {
        RpcServerConfig {
            host: self.host.clone(),
            port: self.rpc_port,
            rpc_path: self.rpc_path.clone(),
            metrics_path: self.metrics_path.clone(),
            max_body_bytes: self.max_body_bytes,
        }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable configuration value");
            None
        }
    }
}

fn normalize_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    }
}
