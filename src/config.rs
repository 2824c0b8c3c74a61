use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::answer::AnswerFormat;
use crate::backend::ConversationStyle;
use crate::request::default_input_path;

/// Environment variable holding the bot token.
pub const TOKEN_ENV: &str = "TELEGRAM_TOKEN";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    /// Endpoint the question is POSTed to.
    backend_url: String,
    #[serde(default = "default_cookie_path")]
    cookie_path: String,
    /// Overridden by TELEGRAM_TOKEN when set.
    #[serde(default)]
    telegram_bot_token: String,
    /// Alternative Bot API server.
    telegram_api_url: Option<String>,
    /// Question file. Defaults to question.json, then question.txt.
    input_path: Option<String>,
    #[serde(default)]
    style: ConversationStyle,
    #[serde(default)]
    format: AnswerFormat,
    #[serde(default)]
    typing_indicator: bool,
    #[serde(default)]
    dry_run: bool,
    backend_timeout_secs: Option<u64>,
    /// Directory for logs. Defaults to current directory.
    data_dir: Option<String>,
}

fn default_cookie_path() -> String {
    "cookies.json".to_string()
}

#[derive(Debug)]
pub struct Config {
    pub backend_url: reqwest::Url,
    pub cookie_path: PathBuf,
    /// No token means answers are never delivered.
    pub telegram_bot_token: Option<String>,
    pub telegram_api_url: Option<reqwest::Url>,
    pub input_path: Option<PathBuf>,
    pub style: ConversationStyle,
    pub format: AnswerFormat,
    pub typing_indicator: bool,
    pub dry_run: bool,
    pub backend_timeout: Option<Duration>,
    pub data_dir: PathBuf,
}

impl Config {
    /// Load from `path`, taking the token from the process environment if set.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    pub fn load_with_env<P, F>(path: P, env: F) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        let backend_url = parse_url("backend_url", &file.backend_url)?;
        let telegram_api_url = file
            .telegram_api_url
            .as_deref()
            .map(|url| parse_url("telegram_api_url", url))
            .transpose()?;

        let token = env(TOKEN_ENV)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(file.telegram_bot_token);
        let telegram_bot_token = if token.is_empty() {
            None
        } else {
            // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
            let token_parts: Vec<&str> = token.split(':').collect();
            if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
                return Err(ConfigError::Validation(
                    "telegram token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
                ));
            }
            Some(token)
        };

        if file.backend_timeout_secs == Some(0) {
            return Err(ConfigError::Validation("backend_timeout_secs must be positive".into()));
        }

        Ok(Self {
            backend_url,
            cookie_path: PathBuf::from(file.cookie_path),
            telegram_bot_token,
            telegram_api_url,
            input_path: file.input_path.map(PathBuf::from),
            style: file.style,
            format: file.format,
            typing_indicator: file.typing_indicator,
            dry_run: file.dry_run,
            backend_timeout: file.backend_timeout_secs.map(Duration::from_secs),
            data_dir: file.data_dir.map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
        })
    }

    /// The configured input file, or the default lookup in the working directory.
    pub fn input_path(&self) -> PathBuf {
        self.input_path
            .clone()
            .unwrap_or_else(|| default_input_path(Path::new(".")))
    }
}

fn parse_url(field: &str, value: &str) -> Result<reqwest::Url, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::Validation(format!("{field} '{value}' is not a valid URL: {e}")))
}
