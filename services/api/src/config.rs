use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// Voice Live API version pinned by the relay.
pub const VOICE_LIVE_API_VERSION: &str = "2025-05-01-preview";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Static settings of the upstream voice service.
///
/// The credential and resource name may be absent at startup; a relay
/// session fails with a client-visible error if it needs them and they are
/// missing.
#[derive(Clone, Debug, PartialEq)]
pub struct VoiceLiveSettings {
    pub api_key: Option<String>,
    pub resource_name: Option<String>,
    pub domain: String,
    pub path: String,
    /// Replaces `wss://{resource}.{domain}` when set.
    pub endpoint_override: Option<String>,
    pub default_model: String,
    pub default_agent_id: Option<String>,
    pub project_name: Option<String>,
    pub voice_name: String,
    pub voice_type: String,
    pub avatar_character: String,
    pub avatar_style: String,
    pub turn_detection: String,
    pub noise_reduction: String,
    pub echo_cancellation: String,
}

impl Default for VoiceLiveSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            resource_name: None,
            domain: "cognitiveservices.azure.com".to_string(),
            path: "voice-live/realtime".to_string(),
            endpoint_override: None,
            default_model: "gpt-4o".to_string(),
            default_agent_id: None,
            project_name: None,
            voice_name: "en-US-Ava:DragonHDLatestNeural".to_string(),
            voice_type: "azure-standard".to_string(),
            avatar_character: "lisa".to_string(),
            avatar_style: "casual-sitting".to_string(),
            turn_detection: "server_vad".to_string(),
            noise_reduction: "azure_deep_noise_suppression".to_string(),
            echo_cancellation: "server_echo_cancellation".to_string(),
        }
    }
}

impl VoiceLiveSettings {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: optional_var("AZURE_OPENAI_API_KEY"),
            resource_name: optional_var("AZURE_AI_RESOURCE_NAME"),
            domain: var_or("VOICE_LIVE_DOMAIN", defaults.domain),
            path: var_or("VOICE_LIVE_PATH", defaults.path),
            endpoint_override: optional_var("VOICE_LIVE_ENDPOINT"),
            default_model: var_or("VOICE_LIVE_MODEL", defaults.default_model),
            default_agent_id: optional_var("AZURE_AGENT_ID"),
            project_name: optional_var("AZURE_AI_PROJECT_NAME"),
            voice_name: var_or("AZURE_TTS_VOICE", defaults.voice_name),
            voice_type: var_or("AZURE_TTS_VOICE_TYPE", defaults.voice_type),
            avatar_character: var_or("AZURE_AVATAR_CHARACTER", defaults.avatar_character),
            avatar_style: var_or("AZURE_AVATAR_STYLE", defaults.avatar_style),
            turn_detection: var_or("TURN_DETECTION_TYPE", defaults.turn_detection),
            noise_reduction: var_or("NOISE_SUPPRESSION_TYPE", defaults.noise_reduction),
            echo_cancellation: var_or("ECHO_CANCELLATION_TYPE", defaults.echo_cancellation),
        }
    }
}

/// Settings for registering agents with the provider's agents API.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteAgentSettings {
    pub project_endpoint: String,
    pub api_key: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub scenarios_path: PathBuf,
    pub voice_live: VoiceLiveSettings,
    /// Present only when remote agents are enabled.
    pub remote_agents: Option<RemoteAgentSettings>,
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(name: &str, default: String) -> String {
    optional_var(name).unwrap_or(default)
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not a boolean", raw),
        )),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let scenarios_path = std::env::var("SCENARIOS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/scenarios"));

        let voice_live = VoiceLiveSettings::from_env();

        let use_remote_agents = match optional_var("USE_AZURE_AI_AGENTS") {
            Some(raw) => parse_bool("USE_AZURE_AI_AGENTS", &raw)?,
            None => false,
        };
        let remote_agents = if use_remote_agents {
            let project_endpoint = optional_var("PROJECT_ENDPOINT").ok_or_else(|| {
                ConfigError::MissingVar(
                    "PROJECT_ENDPOINT must be set when USE_AZURE_AI_AGENTS is enabled".to_string(),
                )
            })?;
            let api_key = optional_var("AZURE_AI_AGENTS_API_KEY")
                .or_else(|| voice_live.api_key.clone())
                .ok_or_else(|| {
                    ConfigError::MissingVar(
                        "AZURE_AI_AGENTS_API_KEY or AZURE_OPENAI_API_KEY must be set for remote agents"
                            .to_string(),
                    )
                })?;
            Some(RemoteAgentSettings {
                project_endpoint,
                api_key,
            })
        } else {
            None
        };

        Ok(Self {
            bind_address,
            log_level,
            scenarios_path,
            voice_live,
            remote_agents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    const VARS: &[&str] = &[
        "BIND_ADDRESS",
        "RUST_LOG",
        "SCENARIOS_PATH",
        "AZURE_OPENAI_API_KEY",
        "AZURE_AI_RESOURCE_NAME",
        "VOICE_LIVE_DOMAIN",
        "VOICE_LIVE_PATH",
        "VOICE_LIVE_ENDPOINT",
        "VOICE_LIVE_MODEL",
        "AZURE_AGENT_ID",
        "AZURE_AI_PROJECT_NAME",
        "AZURE_TTS_VOICE",
        "AZURE_TTS_VOICE_TYPE",
        "AZURE_AVATAR_CHARACTER",
        "AZURE_AVATAR_STYLE",
        "TURN_DETECTION_TYPE",
        "NOISE_SUPPRESSION_TYPE",
        "ECHO_CANCELLATION_TYPE",
        "USE_AZURE_AI_AGENTS",
        "PROJECT_ENDPOINT",
        "AZURE_AI_AGENTS_API_KEY",
    ];

    fn clear_env_vars() {
        unsafe {
            for var in VARS {
                env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load without any variables");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:8000");
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.scenarios_path, PathBuf::from("./data/scenarios"));
        assert_eq!(config.voice_live, VoiceLiveSettings::default());
        assert!(config.remote_agents.is_none());
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("RUST_LOG", "debug");
            env::set_var("SCENARIOS_PATH", "/srv/scenarios");
            env::set_var("AZURE_OPENAI_API_KEY", "voice-key");
            env::set_var("AZURE_AI_RESOURCE_NAME", "contoso-voice");
            env::set_var("VOICE_LIVE_MODEL", "gpt-4o-mini");
            env::set_var("AZURE_AGENT_ID", "asst_default");
            env::set_var("AZURE_TTS_VOICE", "en-US-Andrew:DragonHDLatestNeural");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.scenarios_path, PathBuf::from("/srv/scenarios"));
        assert_eq!(config.voice_live.api_key.as_deref(), Some("voice-key"));
        assert_eq!(
            config.voice_live.resource_name.as_deref(),
            Some("contoso-voice")
        );
        assert_eq!(config.voice_live.default_model, "gpt-4o-mini");
        assert_eq!(
            config.voice_live.default_agent_id.as_deref(),
            Some("asst_default")
        );
        assert_eq!(
            config.voice_live.voice_name,
            "en-US-Andrew:DragonHDLatestNeural"
        );
        assert_eq!(config.voice_live.domain, "cognitiveservices.azure.com");
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_config_remote_agents_require_endpoint() {
        clear_env_vars();
        unsafe {
            env::set_var("USE_AZURE_AI_AGENTS", "true");
            env::set_var("AZURE_OPENAI_API_KEY", "voice-key");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => assert!(msg.contains("PROJECT_ENDPOINT")),
            _ => panic!("Expected MissingVar for PROJECT_ENDPOINT"),
        }
    }

    #[test]
    #[serial]
    fn test_config_remote_agents_fall_back_to_voice_key() {
        clear_env_vars();
        unsafe {
            env::set_var("USE_AZURE_AI_AGENTS", "yes");
            env::set_var("PROJECT_ENDPOINT", "https://proj.services.ai.azure.com/api/projects/p");
            env::set_var("AZURE_OPENAI_API_KEY", "voice-key");
        }

        let config = Config::from_env().expect("Config should load successfully");
        let remote = config.remote_agents.expect("remote agents enabled");
        assert_eq!(remote.api_key, "voice-key");
        assert_eq!(
            remote.project_endpoint,
            "https://proj.services.ai.azure.com/api/projects/p"
        );
    }

    #[test]
    #[serial]
    fn test_config_invalid_remote_agents_flag() {
        clear_env_vars();
        unsafe {
            env::set_var("USE_AZURE_AI_AGENTS", "maybe");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "USE_AZURE_AI_AGENTS"),
            _ => panic!("Expected InvalidValue for USE_AZURE_AI_AGENTS"),
        }
    }
}
