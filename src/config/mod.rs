//! Dispatch configuration.
//!
//! Every field has a default, so a partial document (or none at all) yields a
//! working configuration. A node's configuration is fixed once the node is
//! built; children receive a clone.

use serde::Deserialize;
use thiserror::Error;

/// Errors produced while decoding a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("json_indent must be at most {max}, got {got}")]
    Indent { max: usize, got: usize },
}

/// Widest indent accepted for structured bodies.
const MAX_JSON_INDENT: usize = 16;

/// Settings consulted by the dispatcher and the output stage.
///
/// # Examples
///
/// ```
/// use waypost::config::Config;
///
/// let config = Config::from_json(r#"{ "error_status": 503 }"#).unwrap();
/// assert_eq!(config.error_status, 503);
/// assert_eq!(config.not_found_status, 404);
/// assert_eq!(config.default_content_type, "text/html; charset=utf-8");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `Content-Type` emitted when the response did not set one.
    pub default_content_type: String,
    /// Status forced by the error pipeline when no status was set.
    pub error_status: u16,
    /// Status set when routing or the body guard reports not-found.
    pub not_found_status: u16,
    /// Redirect target used for `"back"` when the request has no referrer.
    pub back_fallback: String,
    /// Indent width used when serializing structured bodies.
    pub json_indent: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_content_type: "text/html; charset=utf-8".to_owned(),
            error_status: 500,
            not_found_status: 404,
            back_fallback: "javascript:history.back()".to_owned(),
            json_indent: 4,
        }
    }
}

impl Config {
    /// Decodes a configuration from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] for malformed JSON or mistyped fields
    /// and [`ConfigError::Indent`] for an oversized `json_indent`.
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        if config.json_indent > MAX_JSON_INDENT {
            return Err(ConfigError::Indent {
                max: MAX_JSON_INDENT,
                got: config.json_indent,
            });
        }
        Ok(config)
    }
}
