// Configuration loading and parsing (coach.toml, credentials.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::protocol::StreamOptions;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub authority: AuthorityConfig,
    pub negotiation: TurnConfig,
    pub stream: ReplayConfig,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// coach.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire coach.toml file.
#[derive(Debug, Clone, Deserialize)]
struct CoachFile {
    authority: AuthorityConfig,
    negotiation: TurnConfig,
    stream: ReplayConfig,
}

/// Where the draft authority lives.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorityConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl AuthorityConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Timing of the negotiation turn protocol.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnConfig {
    /// Pause before asking the authority for the opponent's action.
    pub think_delay_ms: u64,
    /// Pause before retrying a failed opponent-turn request.
    pub poll_delay_ms: u64,
    /// Consecutive transport failures tolerated in the opponent cascade.
    pub opponent_retry_limit: u32,
    /// Fetch commentary automatically whenever it becomes our turn.
    #[serde(default)]
    pub auto_insight: bool,
}

impl TurnConfig {
    pub fn think_delay(&self) -> Duration {
        Duration::from_millis(self.think_delay_ms)
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }
}

/// Replay playback defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayConfig {
    pub speed: f32,
    pub delay_seconds: f32,
    #[serde(default)]
    pub commentary: bool,
    #[serde(default)]
    pub wait_for_commentary: bool,
    /// Upper bound on how long playback is held for one commentary.
    pub commentary_wait_secs: u64,
}

impl ReplayConfig {
    pub fn commentary_wait(&self) -> Duration {
        Duration::from_secs(self.commentary_wait_secs)
    }
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    /// Forwarded to the authority for commentary generation.
    pub insight_api_key: Option<String>,
}

impl Config {
    /// Replay options assembled from `[stream]` plus the insight key.
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            speed: self.stream.speed,
            delay_seconds: self.stream.delay_seconds,
            commentary: self.stream.commentary,
            wait_for_commentary: self.stream.wait_for_commentary,
            api_key: self.insight_api_key(),
        }
    }

    /// The configured insight key, ignoring blank values.
    pub fn insight_api_key(&self) -> Option<String> {
        self.credentials
            .insight_api_key
            .as_ref()
            .filter(|k| !k.trim().is_empty())
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/coach.toml` and
/// (optionally) `config/credentials.toml`, relative to `base_dir`.
///
/// Does not copy defaults; `load_config()` does that first.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- coach.toml (required) ---
    let coach_path = config_dir.join("coach.toml");
    let coach_text = read_file(&coach_path)?;
    let coach: CoachFile = toml::from_str(&coach_text).map_err(|e| ConfigError::ParseError {
        path: coach_path.clone(),
        source: e,
    })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        authority: coach.authority,
        negotiation: coach.negotiation,
        stream: coach.stream,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // Never overwrite the user's copy.
            }
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let url = config.authority.base_url.trim();
    if url.is_empty() {
        return Err(invalid("authority.base_url", "must not be empty"));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(invalid(
            "authority.base_url",
            format!("must start with http:// or https://, got {url}"),
        ));
    }
    if config.authority.request_timeout_secs == 0 {
        return Err(invalid("authority.request_timeout_secs", "must be > 0"));
    }

    if config.negotiation.opponent_retry_limit == 0 {
        return Err(invalid("negotiation.opponent_retry_limit", "must be >= 1"));
    }

    let speed = config.stream.speed;
    if !(speed > 0.0) {
        return Err(invalid("stream.speed", format!("must be > 0, got {speed}")));
    }
    let delay = config.stream.delay_seconds;
    if !(delay >= 0.0) {
        return Err(invalid(
            "stream.delay_seconds",
            format!("must be >= 0, got {delay}"),
        ));
    }
    if config.stream.commentary_wait_secs == 0 {
        return Err(invalid("stream.commentary_wait_secs", "must be > 0"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
