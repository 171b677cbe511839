use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration, read from `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the SQLite database and the covers directory.
    pub data_dir: PathBuf,
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
    pub books: BooksConfig,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.versolivro"),
            gateway: GatewayConfig::default(),
            auth: AuthConfig::default(),
            books: BooksConfig::default(),
            log: LogConfig::default(),
        }
    }
}

// ── Gateway ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Allow binding to a non-loopback address.
    pub allow_public_bind: bool,
    /// Upper bound on request bodies, covers included.
    pub max_body_bytes: usize,
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            allow_public_bind: false,
            max_body_bytes: 5 * 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

// ── Auth ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// SHA-256 rounds applied to new password hashes.
    pub hash_iterations: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            hash_iterations: crate::auth::password::DEFAULT_ITERATIONS,
        }
    }
}

// ── Books ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BooksConfig {
    /// Cover upload directory, relative to `data_dir` unless absolute.
    pub covers_dir: PathBuf,
}

impl Default for BooksConfig {
    fn default() -> Self {
        Self {
            covers_dir: PathBuf::from("capas"),
        }
    }
}

// ── Log ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
        }
    }
}
