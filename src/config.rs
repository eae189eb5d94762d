//! Storefront configuration, read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use validator::Validate;

use crate::domain::{CountryCode, ValueError};

/// Relations requested with every cart read. Reads and reconciling refetches share it.
pub const DEFAULT_CART_FIELDS: &str =
    "*items,*region,*items.product,*items.variant,+items.thumbnail,*promotions,*shipping_methods";

#[derive(Debug, Clone, Validate)]
pub struct StorefrontConfig {
    #[validate(url)]
    pub backend_url: String,
    #[validate(length(min = 1))]
    pub publishable_key: Option<String>,
    pub default_region: CountryCode,
    #[validate(length(min = 1))]
    pub cart_fields: String,
    pub session_path: PathBuf,
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub region_cache_ttl_secs: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {key}: {source}")]
    InvalidValue { key: &'static str, source: ValueError },

    #[error("{key} is not a number: {value:?}")]
    NotANumber { key: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:9000".to_string(),
            publishable_key: None,
            default_region: CountryCode::default(),
            cart_fields: DEFAULT_CART_FIELDS.to_string(),
            session_path: PathBuf::from(".storefront-session.json"),
            request_timeout_secs: 30,
            region_cache_ttl_secs: 3600,
        }
    }
}

impl StorefrontConfig {
    /// Builds the configuration from `STOREFRONT_*` variables, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable is malformed or the result fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup("STOREFRONT_BACKEND_URL") { config.backend_url = url; }
        config.publishable_key = lookup("STOREFRONT_PUBLISHABLE_KEY").filter(|k| !k.is_empty());
        if let Some(region) = lookup("STOREFRONT_DEFAULT_REGION") {
            config.default_region = CountryCode::new(region)
                .map_err(|source| ConfigError::InvalidValue { key: "STOREFRONT_DEFAULT_REGION", source })?;
        }
        if let Some(fields) = lookup("STOREFRONT_CART_FIELDS") { config.cart_fields = fields; }
        if let Some(path) = lookup("STOREFRONT_SESSION_PATH") { config.session_path = PathBuf::from(path); }
        if let Some(value) = lookup("STOREFRONT_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_number("STOREFRONT_REQUEST_TIMEOUT_SECS", value)?;
        }
        if let Some(value) = lookup("STOREFRONT_REGION_CACHE_TTL_SECS") {
            config.region_cache_ttl_secs = parse_number("STOREFRONT_REGION_CACHE_TTL_SECS", value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn region_cache_ttl(&self) -> Duration { Duration::from_secs(self.region_cache_ttl_secs) }
}

fn parse_number(key: &'static str, value: String) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::NotANumber { key, value })
}
