/*
 * Responsibility
 * - Read settings from the environment (.env supported via dotenvy)
 * - Validate them up front: a missing/broken value fails startup
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use url::Url;

use crate::services::auth::google::{GOOGLE_ISSUERS, GOOGLE_JWKS_URL};
use crate::services::cache::DEFAULT_TOKEN_CACHE_CAPACITY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(raw: Option<String>) -> Self {
        match raw
            .unwrap_or_else(|| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,

    pub app_env: AppEnv,
    pub cors_allowed_origins: Vec<String>,

    // Expected `aud` of incoming ID tokens (Google OAuth client id).
    pub google_client_id: String,
    pub auth_issuers: Vec<String>,
    pub google_jwks_url: Url,
    pub auth_leeway_seconds: u64,
    pub jwks_timeout_seconds: u64,

    pub token_cache_capacity: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = match lookup("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid("PORT"))?,
            None => 3000,
        };

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::parse(lookup("APP_ENV"));

        let cors_allowed_origins = split_list(lookup("CORS_ALLOWED_ORIGINS").unwrap_or_default());

        let google_client_id = lookup("GOOGLE_CLIENT_ID")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("GOOGLE_CLIENT_ID"))?;

        let auth_issuers = match lookup("AUTH_ISSUERS") {
            Some(raw) => split_list(raw),
            None => GOOGLE_ISSUERS.iter().map(|s| s.to_string()).collect(),
        };
        if auth_issuers.is_empty() {
            return Err(ConfigError::Invalid("AUTH_ISSUERS"));
        }

        let google_jwks_url = lookup("GOOGLE_JWKS_URL")
            .unwrap_or_else(|| GOOGLE_JWKS_URL.to_string());
        let google_jwks_url =
            Url::parse(&google_jwks_url).map_err(|_| ConfigError::Invalid("GOOGLE_JWKS_URL"))?;

        // Signing keys must not travel over plain http outside development.
        match google_jwks_url.scheme() {
            "https" => {}
            "http" if !app_env.is_production() => {}
            _ => return Err(ConfigError::Invalid("GOOGLE_JWKS_URL")),
        }

        let auth_leeway_seconds = parse_or("AUTH_LEEWAY_SECONDS", lookup("AUTH_LEEWAY_SECONDS"), 60)?;
        let jwks_timeout_seconds =
            parse_or("JWKS_TIMEOUT_SECONDS", lookup("JWKS_TIMEOUT_SECONDS"), 10)?;

        let token_cache_capacity = parse_or(
            "TOKEN_CACHE_CAPACITY",
            lookup("TOKEN_CACHE_CAPACITY"),
            DEFAULT_TOKEN_CACHE_CAPACITY,
        )?;
        if token_cache_capacity == 0 {
            return Err(ConfigError::Invalid("TOKEN_CACHE_CAPACITY"));
        }

        Ok(Self {
            addr,
            app_env,
            cors_allowed_origins,
            google_client_id,
            auth_issuers,
            google_jwks_url,
            auth_leeway_seconds,
            jwks_timeout_seconds,
            token_cache_capacity,
        })
    }
}

fn split_list(raw: String) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or(key: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match raw {
        Some(v) => v.trim().parse::<u64>().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}
