//! Backend connection configuration.
//!
//! # Responsibility
//! - Load the backend endpoint and anon key from the environment.
//! - Refuse half-configured startup: both values are required.
//!
//! # Invariants
//! - `BackendConfig::base_url` always ends with `/` so relative endpoint
//!   joins keep the configured path prefix.

use std::error::Error;
use std::fmt::{Display, Formatter};
use url::Url;

pub const ENV_BACKEND_URL: &str = "SUPABASE_URL";
pub const ENV_ANON_KEY: &str = "SUPABASE_ANON_KEY";
pub const ENV_ARTICLES_TABLE: &str = "POSTBOARD_ARTICLES_TABLE";
pub const ENV_IMAGES_BUCKET: &str = "POSTBOARD_IMAGES_BUCKET";

pub const DEFAULT_ARTICLES_TABLE: &str = "articles";
pub const DEFAULT_IMAGES_BUCKET: &str = "article-images";

/// Startup configuration failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required variable is unset or blank.
    Missing(&'static str),
    /// Variable is set but unusable.
    Invalid { var: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(var) => write!(f, "missing required configuration `{var}`"),
            Self::Invalid { var, reason } => write!(f, "invalid configuration `{var}`: {reason}"),
        }
    }
}

impl Error for ConfigError {}

/// Connection settings for the hosted backend.
#[derive(Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub base_url: Url,
    pub anon_key: String,
    pub articles_table: String,
    pub images_bucket: String,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url.as_str())
            .field("anon_key", &"<redacted>")
            .field("articles_table", &self.articles_table)
            .field("images_bucket", &self.images_bucket)
            .finish()
    }
}

impl BackendConfig {
    /// Builds a config from explicit values with default table/bucket names.
    ///
    /// # Errors
    /// - `Invalid` when `base_url` is not an absolute http(s) URL.
    /// - `Missing` when `anon_key` is blank.
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            anon_key: require_non_blank(ENV_ANON_KEY, Some(anon_key.to_string()))?,
            articles_table: DEFAULT_ARTICLES_TABLE.to_string(),
            images_bucket: DEFAULT_IMAGES_BUCKET.to_string(),
        })
    }

    /// Loads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = require_non_blank(ENV_BACKEND_URL, lookup(ENV_BACKEND_URL))?;
        let anon_key = require_non_blank(ENV_ANON_KEY, lookup(ENV_ANON_KEY))?;
        let articles_table = optional_non_blank(lookup(ENV_ARTICLES_TABLE))
            .unwrap_or_else(|| DEFAULT_ARTICLES_TABLE.to_string());
        let images_bucket = optional_non_blank(lookup(ENV_IMAGES_BUCKET))
            .unwrap_or_else(|| DEFAULT_IMAGES_BUCKET.to_string());

        if images_bucket.contains('/') {
            return Err(ConfigError::Invalid {
                var: ENV_IMAGES_BUCKET,
                reason: "bucket name cannot contain `/`".to_string(),
            });
        }

        Ok(Self {
            base_url: parse_base_url(&raw_url)?,
            anon_key,
            articles_table,
            images_bucket,
        })
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Missing(ENV_BACKEND_URL));
    }
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash).map_err(|err| ConfigError::Invalid {
        var: ENV_BACKEND_URL,
        reason: err.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            var: ENV_BACKEND_URL,
            reason: format!("unsupported scheme `{}`", url.scheme()),
        });
    }
    Ok(url)
}

fn require_non_blank(var: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    optional_non_blank(value).ok_or(ConfigError::Missing(var))
}

fn optional_non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
