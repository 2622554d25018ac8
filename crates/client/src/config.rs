//! Client configuration loaded from the environment.

use std::str::FromStr;

use maiopinion_core::validation::DEFAULT_MAX_IMAGE_BYTES;

/// Default bound on a buffered, not yet newline-terminated frame.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a pipeline running locally.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the pipeline service (default: `http://localhost:5000`).
    pub api_url: String,
    /// TCP connect timeout in seconds (default: `10`). There is no total
    /// request timeout: a diagnosis stream can run for minutes.
    pub connect_timeout_secs: u64,
    /// Largest partial frame the assembler will buffer (default: 1 MiB).
    pub max_frame_bytes: usize,
    /// Largest image accepted for upload (default: 16 MiB).
    pub max_image_bytes: usize,
}

/// A configuration variable was set to something unparsable.
#[derive(Debug, thiserror::Error)]
#[error("{var} must be a valid {expected}, got {value:?}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000".into(),
            connect_timeout_secs: 10,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                 |
    /// |------------------------|-------------------------|
    /// | `MAIOPINION_API_URL`   | `http://localhost:5000` |
    /// | `CONNECT_TIMEOUT_SECS` | `10`                    |
    /// | `MAX_FRAME_BYTES`      | `1048576`               |
    /// | `MAX_IMAGE_BYTES`      | `16777216`              |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_url = lookup("MAIOPINION_API_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.api_url);

        Ok(Self {
            api_url,
            connect_timeout_secs: parse_var(
                &lookup,
                "CONNECT_TIMEOUT_SECS",
                "u64",
                defaults.connect_timeout_secs,
            )?,
            max_frame_bytes: parse_var(&lookup, "MAX_FRAME_BYTES", "usize", defaults.max_frame_bytes)?,
            max_image_bytes: parse_var(&lookup, "MAX_IMAGE_BYTES", "usize", defaults.max_image_bytes)?,
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError {
            var,
            value,
            expected,
        }),
    }
}
