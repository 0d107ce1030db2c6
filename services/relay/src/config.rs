use dealtalk_core::negotiation::TurnLimits;
use dealtalk_core::oracle::Provider;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all relay configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub bind_address: SocketAddr,
    pub provider: Provider,
    pub api_key: String,
    pub model: String,
    pub limits: TurnLimits,
    /// Deadline for any single oracle call; an elapsed deadline fails open.
    pub oracle_timeout: Duration,
    /// Pause between the `conclusion` and `end` broadcasts, so consumers can
    /// render the summary before the channel closes.
    pub conclusion_grace: Duration,
    pub log_level: Level,
}

impl RelayConfig {
    /// Loads configuration from environment variables. A missing API key for
    /// the selected provider is fatal; everything else has defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:9000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let provider =
            Provider::parse(&std::env::var("ORACLE_PROVIDER").unwrap_or_else(|_| "gemini".into()));
        let key_var = match provider {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        };
        let api_key =
            std::env::var(key_var).map_err(|_| ConfigError::MissingVar(key_var.to_string()))?;

        let model = std::env::var("ORACLE_MODEL")
            .unwrap_or_else(|_| provider.default_model().to_string());

        let min_turns = parse_var("MIN_TURNS", TurnLimits::default().min_turns)?;
        let max_turns = parse_var("MAX_TURNS", TurnLimits::default().max_turns)?;
        if min_turns >= max_turns {
            return Err(ConfigError::InvalidValue(
                "MIN_TURNS".to_string(),
                format!("must be strictly below MAX_TURNS ({min_turns} >= {max_turns})"),
            ));
        }

        let oracle_timeout = Duration::from_secs(parse_var("ORACLE_TIMEOUT_SECS", 30u64)?);
        let conclusion_grace = Duration::from_secs(parse_var("CONCLUSION_GRACE_SECS", 2u64)?);

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            provider,
            api_key,
            model,
            limits: TurnLimits {
                min_turns,
                max_turns,
            },
            oracle_timeout,
            conclusion_grace,
            log_level,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
    }
}
