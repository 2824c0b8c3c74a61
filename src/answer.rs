//! Answer extraction and Telegram rendering.
//!
//! The backend replies with a conversation transcript; the answer is the
//! second message. Citations appear inline as `[^N^]` markers pointing into
//! that message's `sourceAttributions`.

use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::sync::LazyLock;

/// Position of the answer in `item.messages`; index 0 echoes the question.
pub const ANSWER_INDEX: usize = 1;

static CITATION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\^(\d+)\^\]").expect("valid citation regex"));

static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^- ").expect("valid list item regex"));

/// The response did not have the expected `item.messages[1].text` shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedResponse(pub String);

impl fmt::Display for MalformedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed backend response: {}", self.0)
    }
}

impl std::error::Error for MalformedResponse {}

/// How the answer is formatted when sent to Telegram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerFormat {
    #[default]
    MarkdownV2,
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    /// Citation URLs; `[^1^]` refers to the first.
    pub attributions: Vec<String>,
}

impl Answer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attributions: Vec::new(),
        }
    }

    /// Pull the answer out of a backend response.
    ///
    /// Only `item.messages[1].text` has to be well formed; the other messages
    /// are never looked at.
    pub fn extract(response: serde_json::Value) -> Result<Self, MalformedResponse> {
        let messages = response["item"]["messages"]
            .as_array()
            .ok_or_else(|| MalformedResponse("missing item.messages array".to_string()))?;

        let message = messages.get(ANSWER_INDEX).ok_or_else(|| {
            MalformedResponse(format!("expected at least 2 messages, got {}", messages.len()))
        })?;

        let text = match message.get("text") {
            Some(serde_json::Value::String(text)) => text.clone(),
            Some(_) => return Err(MalformedResponse("answer text is not a string".to_string())),
            None => return Err(MalformedResponse("answer message has no text".to_string())),
        };

        // Unusable entries stay as empty strings so `[^N^]` keeps pointing at entry N.
        let attributions = message
            .get("sourceAttributions")
            .and_then(|a| a.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .map(|a| a["seeMoreUrl"].as_str().unwrap_or_default().to_string())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self { text, attributions })
    }

    pub fn render(&self, format: AnswerFormat) -> String {
        match format {
            AnswerFormat::Plain => self.text.clone(),
            AnswerFormat::MarkdownV2 => self.to_markdown_v2(),
        }
    }

    fn to_markdown_v2(&self) -> String {
        let text = LIST_ITEM.replace_all(&self.text, "• ");
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for caps in CITATION_MARKER.captures_iter(&text) {
            let Some(marker) = caps.get(0) else { continue };
            out.push_str(&escape_markdown_v2(&text[last..marker.start()]));

            let url = caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1).map(|i| (n, i)))
                .and_then(|(n, i)| self.attributions.get(i).map(|url| (n, url)))
                .filter(|(_, url)| !url.is_empty());

            match url {
                Some((n, url)) => {
                    out.push_str(&format!("[{}]({})", superscript(n), escape_link_url(url)));
                }
                None => out.push_str(&escape_markdown_v2(marker.as_str())),
            }
            last = marker.end();
        }

        out.push_str(&escape_markdown_v2(&text[last..]));
        out
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Escape every character MarkdownV2 reserves.
pub fn escape_markdown_v2(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(
            c,
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '=' | '|'
                | '{' | '}' | '.' | '!' | '\\'
        ) {
            result.push('\\');
        }
        result.push(c);
    }
    result
}

/// Inside `(...)` of a link only `)` and `\` need escaping.
fn escape_link_url(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        if c == ')' || c == '\\' {
            result.push('\\');
        }
        result.push(c);
    }
    result
}

fn superscript(n: usize) -> String {
    const DIGITS: [char; 10] = ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];
    n.to_string()
        .chars()
        .filter_map(|d| d.to_digit(10).map(|d| DIGITS[d as usize]))
        .collect()
}
