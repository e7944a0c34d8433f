use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend {other}")),
        }
    }
}

pub struct Config {
    pub port: u16,
    pub store_backend: StoreBackend,
    pub redis_url: String,
    pub firebase_api_key: String,
    pub allowed_origins: Vec<String>,
    pub welcome_credits: u64,
    pub max_top_up: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            store_backend: StoreBackend::Redis,
            redis_url: "redis://redis:6379".to_string(),
            firebase_api_key: String::new(),
            allowed_origins: Vec::new(),
            welcome_credits: 400,
            max_top_up: 10_000,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Self {
            port: try_load("RUST_PORT", "5000")?,
            store_backend: try_load("STORE_BACKEND", "redis")?,
            redis_url: try_load("REDIS_URL", "redis://redis:6379")?,
            firebase_api_key: read_secret("FIREBASE_API_KEY")?,
            allowed_origins: parse_origins(&try_load::<String>("ALLOWED_ORIGINS", "")?),
            welcome_credits: try_load("WELCOME_CREDITS", "400")?,
            max_top_up: try_load("MAX_TOP_UP", "10000")?,
        })
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            anyhow!("Environment misconfigured: {key}: {e}")
        })
}

/// Environment first, then the Docker secret file.
fn read_secret(secret_name: &str) -> Result<String> {
    if let Some(value) = var(secret_name) {
        return Ok(value.trim().to_string());
    }

    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .with_context(|| format!("Secrets misconfigured: {secret_name} missing from env and {path}"))
}
