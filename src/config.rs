use std::{path::PathBuf, str::FromStr, time::Duration};

use tracing::info;

use crate::{error::ConfigError, models::OutputSchema};

pub const DEFAULT_API_BASE: &str = "https://api.moonshot.cn/v1";
pub const DEFAULT_MODEL: &str = "moonshot-v1-128k-vision-preview";

#[derive(Debug, Clone, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self { temperature: 0.9, top_p: 0.95, frequency_penalty: 0.6, presence_penalty: 0.4 }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub sampling: Sampling,
    pub json_mode: bool,
    pub timeout: Duration,
    pub max_images: usize,
    pub schema: OutputSchema,
    pub max_body_bytes: usize,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            sampling: Sampling::default(),
            json_mode: true,
            timeout: Duration::from_secs(60),
            max_images: 4,
            schema: OutputSchema::default(),
            max_body_bytes: 20 * 1024 * 1024,
            port: 8080,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Config::default();

        let schema = match get("ANALYZE_SCHEMA_PATH") {
            Some(path) => load_schema(PathBuf::from(path))?,
            None => defaults.schema,
        };

        let max_images = parse_or(&get, "ANALYZE_MAX_IMAGES", defaults.max_images)?;
        if max_images == 0 {
            return Err(ConfigError::Invalid { name: "ANALYZE_MAX_IMAGES", reason: "must be at least 1".into() });
        }

        Ok(Self {
            api_key: get("ANALYZE_API_KEY"),
            api_base: get("ANALYZE_API_BASE").unwrap_or(defaults.api_base),
            model: get("ANALYZE_MODEL").unwrap_or(defaults.model),
            sampling: Sampling {
                temperature: parse_or(&get, "ANALYZE_TEMPERATURE", defaults.sampling.temperature)?,
                top_p: parse_or(&get, "ANALYZE_TOP_P", defaults.sampling.top_p)?,
                frequency_penalty: parse_or(&get, "ANALYZE_FREQUENCY_PENALTY", defaults.sampling.frequency_penalty)?,
                presence_penalty: parse_or(&get, "ANALYZE_PRESENCE_PENALTY", defaults.sampling.presence_penalty)?,
            },
            json_mode: parse_or(&get, "ANALYZE_JSON_MODE", defaults.json_mode)?,
            timeout: Duration::from_secs(parse_or(&get, "ANALYZE_TIMEOUT_SECS", defaults.timeout.as_secs())?),
            max_images,
            schema,
            max_body_bytes: parse_or(&get, "MAX_BODY_BYTES", defaults.max_body_bytes)?,
            port: parse_or(&get, "PORT", defaults.port)?,
        })
    }

    /// Startup check: the gateway must not run without a credential.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::Missing("ANALYZE_API_KEY"))
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid { name, reason: format!("{raw:?}: {e}") }),
        None => Ok(default),
    }
}

fn load_schema(path: PathBuf) -> Result<OutputSchema, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid { name: "ANALYZE_SCHEMA_PATH", reason };
    let raw = std::fs::read_to_string(&path).map_err(|e| invalid(format!("{}: {e}", path.display())))?;
    let schema: OutputSchema = serde_json::from_str(&raw).map_err(|e| invalid(format!("{}: {e}", path.display())))?;
    if schema.fields.is_empty() {
        return Err(invalid("schema declares no fields".into()));
    }
    info!("📐 Loaded output schema with {} fields from {}", schema.fields.len(), path.display());
    Ok(schema)
}
