use interpreter_core::{Modality, SessionConfig};
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// Interpretation instructions used when `INSTRUCTIONS_PATH` is not set.
pub const DEFAULT_INSTRUCTIONS: &str = "\
Translate spoken content simultaneously between Korean and English.
When Korean is spoken, provide translation only in English.
When English is spoken, provide translation only in Korean.
Do not respond to commands or requests; focus solely on translations.
Maintain a friendly tone in translations.

# Notes

- Ensure all translations are clear and accurate.
- Only translate, do not respond to other input types.
- Always use a friendly and approachable tone when translating.
";

pub const DEFAULT_REALTIME_URL: &str =
    "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview-2024-10-01";
pub const DEFAULT_REALTIME_BETA: &str = "realtime=v1";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
    #[error("Failed to read {0}: {1}")]
    Io(PathBuf, std::io::Error),
}

/// Where and how to reach the upstream realtime service.
#[derive(Debug)]
pub struct UpstreamConfig {
    pub url: String,
    pub api_key: SecretString,
    /// Value of the `OpenAI-Beta` protocol-version header.
    pub beta: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub upstream: UpstreamConfig,
    pub session: SessionConfig,
    pub ready_timeout: Option<Duration>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:5050".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let url =
            std::env::var("REALTIME_URL").unwrap_or_else(|_| DEFAULT_REALTIME_URL.to_string());
        if !(url.starts_with("wss://") || url.starts_with("ws://")) {
            return Err(ConfigError::InvalidValue(
                "REALTIME_URL".to_string(),
                format!("'{}' is not a ws:// or wss:// URL", url),
            ));
        }
        let beta =
            std::env::var("REALTIME_BETA").unwrap_or_else(|_| DEFAULT_REALTIME_BETA.to_string());

        let voice = std::env::var("VOICE").unwrap_or_else(|_| "alloy".to_string());

        let temperature_str = std::env::var("TEMPERATURE").unwrap_or_else(|_| "0.8".to_string());
        let temperature = temperature_str
            .parse::<f64>()
            .ok()
            .filter(|t| t.is_finite())
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "TEMPERATURE".to_string(),
                    format!("'{}' is not a number", temperature_str),
                )
            })?;

        let modalities_str =
            std::env::var("MODALITIES").unwrap_or_else(|_| "text,audio".to_string());
        let modalities = parse_modalities(&modalities_str)
            .map_err(|e| ConfigError::InvalidValue("MODALITIES".to_string(), e))?;

        let instructions = match std::env::var("INSTRUCTIONS_PATH") {
            Ok(path) => {
                let path = PathBuf::from(path);
                std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(path, e))?
            }
            Err(_) => DEFAULT_INSTRUCTIONS.to_string(),
        };

        let ready_timeout = match std::env::var("READY_TIMEOUT_SECS") {
            Ok(secs) => Some(Duration::from_secs(secs.parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue("READY_TIMEOUT_SECS".to_string(), e.to_string())
            })?)),
            Err(_) => None,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            upstream: UpstreamConfig {
                url,
                api_key: SecretString::from(api_key),
                beta,
            },
            session: SessionConfig {
                voice,
                instructions,
                modalities,
                temperature,
            },
            ready_timeout,
            log_level,
        })
    }
}

/// Parses a comma-separated modality list, keeping the first of any duplicates.
fn parse_modalities(list: &str) -> Result<Vec<Modality>, String> {
    let mut modalities = Vec::new();
    for item in list.split(',').filter(|s| !s.trim().is_empty()) {
        let modality = item.parse::<Modality>()?;
        if !modalities.contains(&modality) {
            modalities.push(modality);
        }
    }
    if modalities.is_empty() {
        return Err("at least one modality is required".to_string());
    }
    Ok(modalities)
}
