use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "CareDocs";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND: &str = "127.0.0.1:5000";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OCR_MODEL: &str = "llama3.2-vision";
pub const DEFAULT_SUMMARY_MODEL: &str = "llama3.2";
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 12 * 3600;
pub const MAX_SESSION_TTL_SECS: u64 = 365 * 24 * 3600;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_SHARE_PURGE_SECS: u64 = 3600;
pub const DEFAULT_PASSWORD_ITERATIONS: u32 = 600_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot determine home directory; set CAREDOCS_DATA_DIR")]
    NoHomeDir,

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "caredocs_lib=info,caredocs=info,tower_http=warn"
}

/// Get the application data directory
/// ~/CareDocs/ unless overridden.
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(APP_NAME))
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub ollama_url: String,
    pub ocr_model: String,
    pub summary_model: String,
    /// Upper bound on a single extraction or summarization call.
    pub stage_timeout: Duration,
    pub session_ttl: Duration,
    pub max_upload_bytes: usize,
    pub share_purge_interval: Duration,
    pub password_iterations: u32,
}

impl Config {
    /// Read from process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = match lookup("CAREDOCS_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => app_data_dir()?,
        };

        Ok(Self {
            data_dir,
            bind_addr: parse_or(&lookup, "CAREDOCS_BIND", DEFAULT_BIND.parse().map_err(|_| {
                ConfigError::InvalidValue {
                    key: "CAREDOCS_BIND",
                    value: DEFAULT_BIND.into(),
                }
            })?)?,
            ollama_url: lookup("CAREDOCS_OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            ocr_model: lookup("CAREDOCS_OCR_MODEL").unwrap_or_else(|| DEFAULT_OCR_MODEL.into()),
            summary_model: lookup("CAREDOCS_SUMMARY_MODEL")
                .unwrap_or_else(|| DEFAULT_SUMMARY_MODEL.into()),
            stage_timeout: Duration::from_secs(parse_or(
                &lookup,
                "CAREDOCS_STAGE_TIMEOUT_SECS",
                DEFAULT_STAGE_TIMEOUT_SECS,
            )?),
            session_ttl: Duration::from_secs(parse_at_most(
                &lookup,
                "CAREDOCS_SESSION_TTL_SECS",
                DEFAULT_SESSION_TTL_SECS,
                MAX_SESSION_TTL_SECS,
            )?),
            max_upload_bytes: parse_or(&lookup, "CAREDOCS_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            share_purge_interval: Duration::from_secs(parse_or(
                &lookup,
                "CAREDOCS_SHARE_PURGE_SECS",
                DEFAULT_SHARE_PURGE_SECS,
            )?),
            password_iterations: DEFAULT_PASSWORD_ITERATIONS,
        })
    }

    /// Defaults rooted at `data_dir`, for tests and embedding.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            ollama_url: DEFAULT_OLLAMA_URL.into(),
            ocr_model: DEFAULT_OCR_MODEL.into(),
            summary_model: DEFAULT_SUMMARY_MODEL.into(),
            stage_timeout: Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            share_purge_interval: Duration::from_secs(DEFAULT_SHARE_PURGE_SECS),
            password_iterations: DEFAULT_PASSWORD_ITERATIONS,
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("caredocs.db")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

fn parse_at_most<F>(lookup: &F, key: &'static str, default: u64, max: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, key, default)?;
    if value > max {
        return Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        });
    }
    Ok(value)
}
