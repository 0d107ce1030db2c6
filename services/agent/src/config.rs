use dealtalk_core::oracle::Provider;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Agent configuration loaded from the environment at startup.
///
/// The oracle key is required; an agent cannot negotiate without it. The
/// Brave Search key is optional; without it research falls back to a generic
/// briefing.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub provider: Provider,
    pub api_key: String,
    pub model: String,
    pub brave_api_key: Option<String>,
    pub log_level: Level,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

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

        let brave_api_key = std::env::var("BRAVE_API_KEY").ok();

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            provider,
            api_key,
            model,
            brave_api_key,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("ORACLE_PROVIDER");
            env::remove_var("OPENAI_API_KEY");
            env::remove_var("GEMINI_API_KEY");
            env::remove_var("ORACLE_MODEL");
            env::remove_var("BRAVE_API_KEY");
            env::remove_var("RUST_LOG");
        }
    }

    #[test]
    #[serial]
    fn oracle_key_is_required() {
        clear_env_vars();
        let err = AgentConfig::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "GEMINI_API_KEY"),
            _ => panic!("Expected MissingVar for GEMINI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn search_key_is_optional() {
        clear_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "test-key");
        }

        let config = AgentConfig::from_env().unwrap();
        assert_eq!(config.provider, Provider::Gemini);
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.brave_api_key, None);
    }

    #[test]
    #[serial]
    fn openai_provider_with_custom_model() {
        clear_env_vars();
        unsafe {
            env::set_var("ORACLE_PROVIDER", "openai");
            env::set_var("OPENAI_API_KEY", "test-openai-key");
            env::set_var("ORACLE_MODEL", "gpt-4o-mini");
            env::set_var("BRAVE_API_KEY", "test-brave-key");
        }

        let config = AgentConfig::from_env().unwrap();
        assert_eq!(config.provider, Provider::OpenAi);
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.brave_api_key, Some("test-brave-key".into()));
    }
}
