//! Conversational backend reached through a browser-session cookie jar.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Tone requested from the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStyle {
    #[default]
    Creative,
    Balanced,
    Precise,
}

/// Something that can answer a question.
///
/// Returns the raw response document; picking the answer out of it is the
/// caller's job so a shape mismatch is reported separately from transport errors.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn ask(
        &self,
        question: &str,
        style: ConversationStyle,
    ) -> Result<serde_json::Value, BackendError>;
}

/// One entry of a `cookies.json` export. Other fields (domain, path, ...) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

pub fn load_cookies<P: AsRef<Path>>(path: P) -> Result<Vec<Cookie>, BackendError> {
    let path = path.as_ref().to_path_buf();
    let content = std::fs::read_to_string(&path)
        .map_err(|e| BackendError::ReadCookies { path: path.clone(), source: e })?;
    serde_json::from_str(&content).map_err(|e| BackendError::ParseCookies { path, source: e })
}

fn cookie_header(cookies: &[Cookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Serialize)]
struct AskRequest<'a> {
    question: &'a str,
    style: ConversationStyle,
}

/// HTTP backend authenticated by session cookies.
pub struct CookieBackend {
    endpoint: reqwest::Url,
    cookie_header: String,
    http: reqwest::Client,
}

impl CookieBackend {
    pub fn new(
        endpoint: reqwest::Url,
        cookies: &[Cookie],
        timeout: Option<Duration>,
    ) -> Result<Self, BackendError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|e| BackendError::Http(e.to_string()))?;

        Ok(Self {
            endpoint,
            cookie_header: cookie_header(cookies),
            http,
        })
    }

    /// Build from a cookie file on disk.
    pub fn from_cookie_file<P: AsRef<Path>>(
        endpoint: reqwest::Url,
        cookie_path: P,
        timeout: Option<Duration>,
    ) -> Result<Self, BackendError> {
        let cookies = load_cookies(&cookie_path)?;
        info!(
            "🍪 Loaded {} cookie(s) from {}",
            cookies.len(),
            cookie_path.as_ref().display()
        );
        Self::new(endpoint, &cookies, timeout)
    }
}

#[async_trait]
impl Backend for CookieBackend {
    async fn ask(
        &self,
        question: &str,
        style: ConversationStyle,
    ) -> Result<serde_json::Value, BackendError> {
        debug!("Asking backend at {} ({:?})", self.endpoint, style);

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .json(&AskRequest { question, style });
        if !self.cookie_header.is_empty() {
            request = request.header(reqwest::header::COOKIE, &self.cookie_header);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api(format!("{status}: {body}")));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }
}

#[derive(Debug)]
pub enum BackendError {
    ReadCookies { path: PathBuf, source: std::io::Error },
    ParseCookies { path: PathBuf, source: serde_json::Error },
    Http(String),
    Api(String),
    Parse(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::ReadCookies { path, source } => {
                write!(f, "failed to read cookie file '{}': {}", path.display(), source)
            }
            BackendError::ParseCookies { path, source } => {
                write!(f, "failed to parse cookie file '{}': {}", path.display(), source)
            }
            BackendError::Http(e) => write!(f, "HTTP error: {e}"),
            BackendError::Api(e) => write!(f, "API error: {e}"),
            BackendError::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::ReadCookies { source, .. } => Some(source),
            BackendError::ParseCookies { source, .. } => Some(source),
            _ => None,
        }
    }
}
