use obsede_core::drill::DrillPaths;
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use tracing::Level;

pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-pro-preview-tts";
pub const DEFAULT_PUBLIC_BASE_URL: &str = "https://longieee.github.io/daily-french-learning";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// OAuth refresh-token credentials for Google Drive uploads.
#[derive(Debug)]
pub struct DriveCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
    pub refresh_token: SecretString,
    pub folder_id: Option<String>,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub gemini_api_key: Option<SecretString>,
    pub text_model: String,
    pub tts_model: String,
    pub data_dir: PathBuf,
    pub prompts_path: PathBuf,
    pub content_dir: PathBuf,
    pub feed_path: PathBuf,
    pub public_base_url: String,
    pub drive: Option<DriveCredentials>,
    pub log_level: Level,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let gemini_api_key = non_empty_var("GEMINI_API_KEY").map(SecretString::from);
        let text_model = var_or("TEXT_MODEL", DEFAULT_TEXT_MODEL);
        let tts_model = var_or("TTS_MODEL", DEFAULT_TTS_MODEL);

        let data_dir = PathBuf::from(var_or("DATA_DIR", "."));
        let prompts_path = PathBuf::from(var_or("PROMPTS_PATH", "./prompts"));
        let content_dir = PathBuf::from(var_or("CONTENT_DIR", "content/audio"));
        let feed_path = PathBuf::from(var_or("FEED_PATH", "feed.xml"));

        let public_base_url = var_or("PUBLIC_BASE_URL", DEFAULT_PUBLIC_BASE_URL);
        if !(public_base_url.starts_with("http://") || public_base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(
                "PUBLIC_BASE_URL".to_string(),
                format!("'{public_base_url}' is not an http(s) URL"),
            ));
        }

        let drive = Self::drive_from_env()?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            gemini_api_key,
            text_model,
            tts_model,
            data_dir,
            prompts_path,
            content_dir,
            feed_path,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            drive,
            log_level,
        })
    }

    /// Drive credentials are all-or-nothing; a partial set is a configuration error.
    fn drive_from_env() -> Result<Option<DriveCredentials>, ConfigError> {
        let vars = ["GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET", "GOOGLE_REFRESH_TOKEN"];
        let values: Vec<Option<String>> = vars.iter().map(|v| non_empty_var(v)).collect();
        match values.as_slice() {
            [Some(client_id), Some(secret), Some(token)] => Ok(Some(DriveCredentials {
                client_id: client_id.clone(),
                client_secret: SecretString::from(secret.as_str()),
                refresh_token: SecretString::from(token.as_str()),
                folder_id: non_empty_var("GOOGLE_DRIVE_FOLDER_ID"),
            })),
            [None, None, None] => Ok(None),
            _ => {
                let missing: Vec<&str> = vars
                    .iter()
                    .zip(&values)
                    .filter(|(_, v)| v.is_none())
                    .map(|(name, _)| *name)
                    .collect();
                Err(ConfigError::MissingVar(format!(
                    "{} (Drive upload needs all of GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET, GOOGLE_REFRESH_TOKEN)",
                    missing.join(", ")
                )))
            }
        }
    }

    /// The API key, which only the generating commands need.
    pub fn require_api_key(&self) -> Result<SecretString, ConfigError> {
        self.gemini_api_key
            .as_ref()
            .map(|key| SecretString::from(key.expose_secret()))
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY must be set to run the drill".to_string()))
    }

    pub fn drill_paths(&self) -> DrillPaths {
        DrillPaths {
            curriculum: self.data_dir.join("curriculum.json"),
            state: self.data_dir.join("user_state.json"),
            episodes: self.data_dir.join("episodes.json"),
            feed: self.feed_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    const VARS: [&str; 13] = [
        "GEMINI_API_KEY",
        "TEXT_MODEL",
        "TTS_MODEL",
        "DATA_DIR",
        "PROMPTS_PATH",
        "CONTENT_DIR",
        "FEED_PATH",
        "PUBLIC_BASE_URL",
        "GOOGLE_CLIENT_ID",
        "GOOGLE_CLIENT_SECRET",
        "GOOGLE_REFRESH_TOKEN",
        "GOOGLE_DRIVE_FOLDER_ID",
        "RUST_LOG",
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
    fn test_config_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");

        assert!(config.gemini_api_key.is_none());
        assert_eq!(config.text_model, DEFAULT_TEXT_MODEL);
        assert_eq!(config.tts_model, DEFAULT_TTS_MODEL);
        assert_eq!(config.data_dir, PathBuf::from("."));
        assert_eq!(config.prompts_path, PathBuf::from("./prompts"));
        assert_eq!(config.content_dir, PathBuf::from("content/audio"));
        assert_eq!(config.feed_path, PathBuf::from("feed.xml"));
        assert_eq!(config.public_base_url, DEFAULT_PUBLIC_BASE_URL);
        assert!(config.drive.is_none());
        assert_eq!(config.log_level, Level::INFO);
        assert!(matches!(config.require_api_key(), Err(ConfigError::MissingVar(_))));
    }

    #[test]
    #[serial]
    fn test_config_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "test-gemini-key");
            env::set_var("TEXT_MODEL", "gemini-test");
            env::set_var("DATA_DIR", "/var/lib/drill");
            env::set_var("FEED_PATH", "public/feed.xml");
            env::set_var("PUBLIC_BASE_URL", "https://example.org/podcast/");
            env::set_var("GOOGLE_CLIENT_ID", "client");
            env::set_var("GOOGLE_CLIENT_SECRET", "secret");
            env::set_var("GOOGLE_REFRESH_TOKEN", "refresh");
            env::set_var("GOOGLE_DRIVE_FOLDER_ID", "folder");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.require_api_key().unwrap().expose_secret(), "test-gemini-key");
        assert_eq!(config.text_model, "gemini-test");
        assert_eq!(config.public_base_url, "https://example.org/podcast");
        assert_eq!(config.log_level, Level::DEBUG);
        let drive = config.drive.as_ref().unwrap();
        assert_eq!(drive.client_id, "client");
        assert_eq!(drive.refresh_token.expose_secret(), "refresh");
        assert_eq!(drive.folder_id.as_deref(), Some("folder"));

        let paths = config.drill_paths();
        assert_eq!(paths.state, PathBuf::from("/var/lib/drill/user_state.json"));
        assert_eq!(paths.feed, PathBuf::from("public/feed.xml"));
    }

    #[test]
    #[serial]
    fn test_api_key_is_redacted_in_debug() {
        clear_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "super-secret-key");
        }
        let config = Config::from_env().unwrap();
        assert!(!format!("{config:?}").contains("super-secret-key"));
    }

    #[test]
    #[serial]
    fn test_partial_drive_credentials() {
        clear_env_vars();
        unsafe {
            env::set_var("GOOGLE_CLIENT_ID", "client");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => {
                assert!(msg.starts_with("GOOGLE_CLIENT_SECRET, GOOGLE_REFRESH_TOKEN"));
            }
            _ => panic!("Expected MissingVar for the Drive credentials"),
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
    fn test_config_invalid_base_url() {
        clear_env_vars();
        unsafe {
            env::set_var("PUBLIC_BASE_URL", "longieee.github.io");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "PUBLIC_BASE_URL"),
            _ => panic!("Expected InvalidValue for PUBLIC_BASE_URL"),
        }
    }
}
