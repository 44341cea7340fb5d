use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to listen on (default: 0.0.0.0).
    pub bind_addr: IpAddr,
    /// Listening port, from `PORT` (default: 8080).
    pub port: u16,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Directory uploads are written to. Must already exist.
    pub upload_dir: PathBuf,
    /// Largest accepted request body.
    pub max_upload_bytes: usize,
    /// Upper bound on a single analysis call.
    pub detect_timeout: Duration,
    /// Pending analysis requests the engine will queue before callers wait.
    pub engine_queue_depth: usize,
    /// Keep uploaded files on disk after the request completes.
    pub retain_uploads: bool,
}

impl Config {
    /// Load configuration from `PORT` and `FACEDROP_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            bind_addr: env_parse(&lookup, "FACEDROP_BIND_ADDR")
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            port: env_parse(&lookup, "PORT").unwrap_or(DEFAULT_PORT),
            model_dir: lookup("FACEDROP_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("models")),
            upload_dir: lookup("FACEDROP_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("uploads")),
            max_upload_bytes: env_parse(&lookup, "FACEDROP_MAX_UPLOAD_BYTES")
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            detect_timeout: Duration::from_secs(
                env_parse(&lookup, "FACEDROP_DETECT_TIMEOUT_SECS").unwrap_or(30),
            ),
            engine_queue_depth: env_parse::<usize>(&lookup, "FACEDROP_ENGINE_QUEUE")
                .unwrap_or(16)
                .max(1),
            retain_uploads: lookup("FACEDROP_RETAIN_UPLOADS")
                .map(|v| v.trim() != "0")
                .unwrap_or(true),
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn env_parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
