//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{Credential, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable holding the upstream bearer credential.
pub const CREDENTIAL_ENV: &str = "UPSTREAM_API_KEY";
/// Environment variable overriding `upstream.base_url`.
pub const BASE_URL_ENV: &str = "UPSTREAM_BASE_URL";
/// Environment variable overriding `cors.allowed_origin`.
pub const ALLOWED_ORIGIN_ENV: &str = "ALLOWED_ORIGIN";
/// Environment variable overriding `listener.bind_address`.
pub const BIND_ADDRESS_ENV: &str = "BIND_ADDRESS";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build the startup configuration: optional file, then environment
/// overrides, then validation.
pub fn load_startup_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ProxyConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment overrides through a lookup function.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup(CREDENTIAL_ENV).and_then(Credential::new) {
        config.upstream.api_key = Some(key);
    }
    if let Some(url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
        config.upstream.base_url = url.trim().trim_end_matches('/').to_string();
    }
    if let Some(origin) = lookup(ALLOWED_ORIGIN_ENV).filter(|v| !v.trim().is_empty()) {
        config.cors.allowed_origin = origin.trim().to_string();
    }
    if let Some(addr) = lookup(BIND_ADDRESS_ENV).filter(|v| !v.trim().is_empty()) {
        config.listener.bind_address = addr.trim().to_string();
    }
}
