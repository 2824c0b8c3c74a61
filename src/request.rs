//! Question input: a raw text file or a small JSON document.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use teloxide::types::{ChatId, Recipient};

use crate::backend::ConversationStyle;

/// Errors that can occur when loading a request.
#[derive(Debug)]
pub enum RequestError {
    /// Failed to read the input file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse a `.json` input.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// The question is empty or whitespace only.
    EmptyQuestion { path: PathBuf },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read input file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse input file '{}': {}", path.display(), source)
            }
            Self::EmptyQuestion { path } => {
                write!(f, "input file '{}' contains no question", path.display())
            }
        }
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::EmptyQuestion { .. } => None,
        }
    }
}

/// Where the answer goes: a numeric chat id or a `@channel` username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination(String);

impl Destination {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn recipient(&self) -> Recipient {
        match self.0.parse::<i64>() {
            Ok(id) => Recipient::Id(ChatId(id)),
            Err(_) => Recipient::ChannelUsername(self.0.clone()),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Telegram chat ids show up both quoted and bare.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawChatId {
    Text(String),
    Number(i64),
}

#[derive(Deserialize)]
struct RequestFile {
    question: String,
    chat_id: Option<RawChatId>,
    /// The user's message carrying the question; the answer replies to it.
    message_id: Option<i32>,
    /// Bot message the user was replying to. Only a session store would need it.
    #[allow(dead_code)]
    reply_to_message_id: Option<i32>,
    style: Option<ConversationStyle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub question: String,
    pub destination: Option<Destination>,
    /// Message the answer is sent as a reply to.
    pub message_id: Option<i32>,
    /// Overrides the configured conversation style for this question.
    pub style: Option<ConversationStyle>,
}

impl Request {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            destination: None,
            message_id: None,
            style: None,
        }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Load a request. `.json` files are parsed, anything else is the question verbatim.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RequestError> {
        let path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| RequestError::ReadFile { path: path.clone(), source: e })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let request = if is_json {
            let file: RequestFile = serde_json::from_str(&content)
                .map_err(|e| RequestError::ParseJson { path: path.clone(), source: e })?;
            let destination = file
                .chat_id
                .map(|id| match id {
                    RawChatId::Text(s) => s.trim().to_string(),
                    RawChatId::Number(n) => n.to_string(),
                })
                .filter(|id| !id.is_empty())
                .map(Destination);
            Self {
                question: file.question,
                destination,
                message_id: file.message_id,
                style: file.style,
            }
        } else {
            Self::new(content)
        };

        if request.question.trim().is_empty() {
            return Err(RequestError::EmptyQuestion { path });
        }
        Ok(request)
    }
}

/// `question.json` if present, else `question.txt`, both relative to `dir`.
pub fn default_input_path(dir: &Path) -> PathBuf {
    let json = dir.join("question.json");
    if json.exists() {
        json
    } else {
        dir.join("question.txt")
    }
}
