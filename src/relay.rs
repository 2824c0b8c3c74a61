//! Relay: question in, answer out, optionally forwarded to Telegram.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::answer::{Answer, AnswerFormat, MalformedResponse};
use crate::backend::{Backend, BackendError, ConversationStyle};
use crate::request::{Destination, Request, RequestError};
use crate::telegram::{DeliveryError, Messenger};

/// Telegram shows "typing..." for about 5 seconds per action.
const TYPING_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum RelayError {
    Request(RequestError),
    Backend(BackendError),
    MalformedResponse(MalformedResponse),
    Delivery(DeliveryError),
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::Request(e) => write!(f, "{e}"),
            RelayError::Backend(e) => write!(f, "backend request failed: {e}"),
            RelayError::MalformedResponse(e) => write!(f, "{e}"),
            RelayError::Delivery(e) => write!(f, "delivery failed: {e}"),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::Request(e) => Some(e),
            RelayError::Backend(e) => Some(e),
            RelayError::MalformedResponse(e) => Some(e),
            RelayError::Delivery(e) => Some(e),
        }
    }
}

impl From<RequestError> for RelayError {
    fn from(e: RequestError) -> Self {
        RelayError::Request(e)
    }
}

impl From<BackendError> for RelayError {
    fn from(e: BackendError) -> Self {
        RelayError::Backend(e)
    }
}

impl From<MalformedResponse> for RelayError {
    fn from(e: MalformedResponse) -> Self {
        RelayError::MalformedResponse(e)
    }
}

impl From<DeliveryError> for RelayError {
    fn from(e: DeliveryError) -> Self {
        RelayError::Delivery(e)
    }
}

pub struct Relay<B> {
    backend: B,
    messenger: Option<Arc<dyn Messenger>>,
    style: ConversationStyle,
    format: AnswerFormat,
    typing_indicator: bool,
    dry_run: bool,
}

impl<B: Backend> Relay<B> {
    /// A relay that only asks; nothing is delivered until a messenger is set.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            messenger: None,
            style: ConversationStyle::default(),
            format: AnswerFormat::default(),
            typing_indicator: false,
            dry_run: false,
        }
    }

    pub fn with_messenger(mut self, messenger: Arc<dyn Messenger>) -> Self {
        self.messenger = Some(messenger);
        self
    }

    pub fn with_style(mut self, style: ConversationStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_format(mut self, format: AnswerFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_typing_indicator(mut self, enabled: bool) -> Self {
        self.typing_indicator = enabled;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Load the request from `path` and run it.
    pub async fn run_file<P: AsRef<Path>>(&self, path: P) -> Result<Answer, RelayError> {
        let request = Request::load(&path)?;
        info!("📥 Loaded question from {}", path.as_ref().display());
        self.run(&request).await
    }

    pub async fn run(&self, request: &Request) -> Result<Answer, RelayError> {
        let style = request.style.unwrap_or(self.style);
        let preview: String = request.question.chars().take(100).collect();
        info!("❓ Asking ({:?}): \"{preview}\"", style);

        let messenger = match (&request.destination, &self.messenger) {
            (Some(destination), Some(messenger)) => Some((destination, messenger)),
            (Some(destination), None) => {
                warn!("No Telegram token configured, not delivering to {destination}");
                None
            }
            (None, _) => None,
        };

        let typing = match messenger {
            Some((destination, messenger)) if self.typing_indicator && !self.dry_run => {
                Some(TypingIndicator::start(messenger.clone(), destination.clone()))
            }
            _ => None,
        };

        let response = self.backend.ask(&request.question, style).await;
        if let Some(typing) = typing {
            typing.stop().await;
        }

        let answer = Answer::extract(response?)?;
        info!("💬 Got answer ({} chars)", answer.text.chars().count());

        if let Some((destination, messenger)) = messenger {
            let text = answer.render(self.format);
            if self.dry_run {
                info!("[DRY RUN] Would send {} chars to {destination}", text.chars().count());
            } else {
                messenger
                    .send_message(destination, &text, self.format, request.message_id)
                    .await?;
            }
        }

        Ok(answer)
    }
}

/// Background task that keeps "typing..." visible while the backend thinks.
struct TypingIndicator {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TypingIndicator {
    fn start(messenger: Arc<dyn Messenger>, destination: Destination) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TYPING_INTERVAL);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        // A stop request abandons an in-flight action.
                        tokio::select! {
                            _ = &mut stop_rx => break,
                            result = messenger.send_typing(&destination) => {
                                if let Err(e) = result {
                                    debug!("Typing indicator failed: {e}");
                                }
                            }
                        }
                    }
                }
            }
        });

        Self { stop_tx, handle }
    }

    async fn stop(self) {
        // The task may already be gone; either way wait for it.
        let _ = self.stop_tx.send(());
        if let Err(e) = self.handle.await {
            warn!("Typing indicator task failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests;
