//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.parlante/config.toml` (user)
//! 3. `/etc/parlante/config.toml` (system)
//! 4. built-in defaults
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.parlante/secrets.toml` (user, must be 0600)
//! 2. `/etc/parlante/secrets.toml` (system, must be 0600)
//!
//! and fall back to environment variables per key.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::providers::{AwsCredentials, DEFAULT_GEMINI_MODELS, DEFAULT_OPENAI_MODEL, RetryConfig};
use crate::types::Gender;
use crate::{ParlanteError, Result};

/// Library and CLI configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub reply: ReplyConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
}

/// Speech path settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechConfig {
    /// Per-vendor time budget in seconds (default: 30).
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
    /// Genders answered by the browser directive instead of a paid vendor
    /// (default: `["male"]`).
    #[serde(default = "default_local_genders")]
    pub local_genders: Vec<Gender>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: default_attempt_timeout(),
            local_genders: default_local_genders(),
        }
    }
}

fn default_attempt_timeout() -> u64 {
    30
}

fn default_local_genders() -> Vec<Gender> {
    vec![Gender::Male]
}

/// Reply path settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyConfig {
    /// Gemini models, tried in order before OpenAI.
    #[serde(default = "default_gemini_models")]
    pub gemini_models: Vec<String>,
    /// Last model in the chain.
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    /// Entries kept per session (default: 10).
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Seconds the breaker stays open after a rate limit (default: 60).
    #[serde(default = "default_breaker_cooldown")]
    pub breaker_cooldown_secs: u64,
    /// Per-model time budget in seconds (default: 30).
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
    /// Run the grammar pre-filter before calling models (default: true).
    #[serde(default = "default_true")]
    pub grammar_filter: bool,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            gemini_models: default_gemini_models(),
            openai_model: default_openai_model(),
            history_window: default_history_window(),
            breaker_cooldown_secs: default_breaker_cooldown(),
            attempt_timeout_secs: default_attempt_timeout(),
            grammar_filter: true,
        }
    }
}

fn default_gemini_models() -> Vec<String> {
    DEFAULT_GEMINI_MODELS.iter().map(|m| m.to_string()).collect()
}

fn default_openai_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

fn default_history_window() -> usize {
    crate::history::DEFAULT_WINDOW
}

fn default_breaker_cooldown() -> u64 {
    crate::breaker::DEFAULT_COOLDOWN.as_secs()
}

fn default_true() -> bool {
    true
}

/// Retry settings for transient vendor failures.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    5_000
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_attempts(self.max_attempts)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
    }
}

/// Base URL overrides, mostly for proxies and tests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default)]
    pub elevenlabs: Option<String>,
    #[serde(default)]
    pub polly: Option<String>,
    #[serde(default)]
    pub google_tts: Option<String>,
    #[serde(default)]
    pub gemini: Option<String>,
    #[serde(default)]
    pub openai: Option<String>,
}

/// Vendor credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub elevenlabs: Option<ApiKeySecret>,
    #[serde(default)]
    pub google_tts: Option<ApiKeySecret>,
    #[serde(default)]
    pub gemini: Option<ApiKeySecret>,
    #[serde(default)]
    pub openai: Option<ApiKeySecret>,
    #[serde(default)]
    pub aws: Option<AwsSecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// AWS key pair for Polly.
#[derive(Clone, Deserialize)]
pub struct AwsSecret {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSecret")
            .field("access_key_id", &self.access_key_id)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

/// Provider name → environment variable name mapping.
const PROVIDER_ENV_VARS: &[(&str, &str)] = &[
    ("elevenlabs", "ELEVENLABS_API_KEY"),
    ("google_tts", "GOOGLE_TTS_API_KEY"),
    ("gemini", "GEMINI_API_KEY"),
    ("openai", "OPENAI_API_KEY"),
];

const AWS_ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
const AWS_SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";
const AWS_REGION_ENV: &str = "AWS_REGION";
const AWS_SESSION_TOKEN_ENV: &str = "AWS_SESSION_TOKEN";

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path must exist. Without one, the first existing file of
    /// `~/.parlante/config.toml` and `/etc/parlante/config.toml` is used,
    /// and defaults apply when neither exists.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Config::default()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ParlanteError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            ParlanteError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every attempt fail.
    pub fn validate(&self) -> Result<()> {
        for (section, secs) in [
            ("speech", self.speech.attempt_timeout_secs),
            ("reply", self.reply.attempt_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ParlanteError::Configuration(format!(
                    "[{section}] attempt_timeout_secs must be at least 1"
                )));
            }
        }
        Ok(())
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(ParlanteError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".parlante").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/parlante/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Returns empty secrets if no file exists (keys may come from env vars).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".parlante").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/parlante/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load one secrets file, rejecting group- or world-readable files.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            ParlanteError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            ParlanteError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            ParlanteError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(ParlanteError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// API key for a provider, falling back to its environment variable.
    pub fn api_key(&self, provider: &str) -> Option<String> {
        let from_file = match provider {
            "elevenlabs" => self.elevenlabs.as_ref(),
            "google_tts" => self.google_tts.as_ref(),
            "gemini" => self.gemini.as_ref(),
            "openai" => self.openai.as_ref(),
            _ => None,
        }
        .map(|s| s.api_key.clone());

        from_file.or_else(|| {
            PROVIDER_ENV_VARS
                .iter()
                .find(|(name, _)| *name == provider)
                .and_then(|(_, env_var)| std::env::var(env_var).ok())
        })
    }

    /// Polly credentials from the `[aws]` table, else the standard AWS
    /// environment variables. `None` unless key, secret and region are set.
    pub fn aws_credentials(&self) -> Option<AwsCredentials> {
        let env = |name: &str| std::env::var(name).ok();
        let (key, secret, region, token) = match &self.aws {
            Some(aws) => (
                Some(aws.access_key_id.clone()),
                Some(aws.secret_access_key.clone()),
                aws.region.clone().or_else(|| env(AWS_REGION_ENV)),
                aws.session_token.clone(),
            ),
            None => (
                env(AWS_ACCESS_KEY_ENV),
                env(AWS_SECRET_KEY_ENV),
                env(AWS_REGION_ENV),
                env(AWS_SESSION_TOKEN_ENV),
            ),
        };
        let mut credentials = AwsCredentials::from_parts(key, secret, region)?;
        credentials.session_token = token.filter(|t| !t.trim().is_empty());
        Some(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.speech.attempt_timeout_secs, 30);
        assert_eq!(config.speech.local_genders, vec![Gender::Male]);
        assert_eq!(config.reply.history_window, 10);
        assert_eq!(config.reply.breaker_cooldown_secs, 60);
        assert_eq!(config.reply.gemini_models.len(), 3);
        assert_eq!(config.reply.openai_model, "gpt-4o-mini");
        assert!(config.reply.grammar_filter);
        assert_eq!(config.retry.max_attempts, 2);
    }

    #[test]
    fn zero_attempt_timeout_is_rejected() {
        let config: Config = toml::from_str("[reply]\nattempt_timeout_secs = 0").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ParlanteError::Configuration(_)));
        assert!(err.to_string().contains("[reply] attempt_timeout_secs"));
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
            [reply]
            history_window = 20
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.reply.history_window, 20);
        // Defaults preserved
        assert_eq!(config.reply.breaker_cooldown_secs, 60);
        assert_eq!(config.cache.max_entries, 10_000);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [speech]
            attempt_timeout_secs = 10
            local_genders = []

            [cache]
            dir = "/var/cache/parlante"
            ttl_secs = 3600

            [reply]
            gemini_models = ["gemini-2.0-flash"]
            openai_model = "gpt-4o"
            breaker_cooldown_secs = 120
            grammar_filter = false

            [retry]
            max_attempts = 3
            initial_delay_ms = 100

            [endpoints]
            google_tts = "http://localhost:9000"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.speech.local_genders.is_empty());
        assert_eq!(config.cache.dir, Some(PathBuf::from("/var/cache/parlante")));
        assert_eq!(config.cache.ttl_secs, 3600);
        assert_eq!(config.reply.gemini_models, vec!["gemini-2.0-flash"]);
        assert_eq!(config.reply.openai_model, "gpt-4o");
        assert!(!config.reply.grammar_filter);
        assert_eq!(
            config.endpoints.google_tts.as_deref(),
            Some("http://localhost:9000")
        );

        let retry = config.retry.to_retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_millis(100));
        assert_eq!(retry.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn parse_secrets() {
        let toml = r#"
            [elevenlabs]
            api_key = "xi-test-key"

            [aws]
            access_key_id = "AKIDEXAMPLE"
            secret_access_key = "secret"
            region = "eu-west-1"
        "#;
        let secrets: Secrets = toml::from_str(toml).unwrap();
        assert_eq!(secrets.api_key("elevenlabs"), Some("xi-test-key".to_string()));
        let aws = secrets.aws_credentials().unwrap();
        assert_eq!(aws.region, "eu-west-1");
        assert!(secrets.gemini.is_none());
    }

    #[test]
    fn api_key_from_secrets() {
        let secrets = Secrets {
            openai: Some(ApiKeySecret {
                api_key: "from-file".to_string(),
            }),
            ..Default::default()
        };
        assert_eq!(secrets.api_key("openai"), Some("from-file".to_string()));
        // Unknown provider returns None
        assert_eq!(secrets.api_key("nonexistent"), None);
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }
}
