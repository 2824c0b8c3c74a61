//! Relay scenarios against in-memory backend and messenger stubs.

use super::*;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Mutex;
use tempfile::{Builder, NamedTempFile};

struct StubBackend {
    response: Value,
    delay: Option<Duration>,
    fail: bool,
    asked: Mutex<Vec<(String, ConversationStyle)>>,
}

impl StubBackend {
    fn answering(response: Value) -> Self {
        Self {
            response,
            delay: None,
            fail: false,
            asked: Mutex::new(Vec::new()),
        }
    }

    fn hello() -> Self {
        Self::answering(json!({"item": {"messages": [{}, {"text": "hello"}]}}))
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::hello()
        }
    }

    fn questions(&self) -> Vec<String> {
        self.asked.lock().unwrap().iter().map(|(q, _)| q.clone()).collect()
    }
}

#[async_trait]
impl Backend for StubBackend {
    async fn ask(&self, question: &str, style: ConversationStyle) -> Result<Value, BackendError> {
        self.asked.lock().unwrap().push((question.to_string(), style));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(BackendError::Api("503: overloaded".to_string()));
        }
        Ok(self.response.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Sent {
    destination: String,
    text: String,
    format: AnswerFormat,
    reply_to: Option<i32>,
}

#[derive(Default)]
struct StubMessenger {
    sent: Mutex<Vec<Sent>>,
    typing: Mutex<usize>,
    fail: bool,
    /// How long each typing action takes to go through.
    typing_delay: Option<Duration>,
}

impl StubMessenger {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn typing_count(&self) -> usize {
        *self.typing.lock().unwrap()
    }
}

#[async_trait]
impl Messenger for StubMessenger {
    async fn send_message(
        &self,
        destination: &Destination,
        text: &str,
        format: AnswerFormat,
        reply_to_message_id: Option<i32>,
    ) -> Result<i64, DeliveryError> {
        if self.fail {
            return Err(DeliveryError::Telegram("Bad Request: chat not found".to_string()));
        }
        self.sent.lock().unwrap().push(Sent {
            destination: destination.to_string(),
            text: text.to_string(),
            format,
            reply_to: reply_to_message_id,
        });
        Ok(7)
    }

    async fn send_typing(&self, _destination: &Destination) -> Result<(), DeliveryError> {
        *self.typing.lock().unwrap() += 1;
        if let Some(delay) = self.typing_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

fn write_input(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn relay_with(backend: StubBackend, messenger: Arc<StubMessenger>) -> Relay<StubBackend> {
    Relay::new(backend)
        .with_messenger(messenger)
        .with_format(AnswerFormat::Plain)
}

// =============================================================================
// DELIVERY
// =============================================================================

#[tokio::test]
async fn test_json_request_delivers_once() {
    let messenger = Arc::new(StubMessenger::default());
    let relay = relay_with(StubBackend::hello(), messenger.clone());
    let input = write_input(".json", r#"{"question": "hi", "chat_id": "123"}"#);

    let answer = relay.run_file(input.path()).await.unwrap();

    assert_eq!(answer.text, "hello");
    assert_eq!(
        messenger.sent(),
        vec![Sent {
            destination: "123".to_string(),
            text: "hello".to_string(),
            format: AnswerFormat::Plain,
            reply_to: None,
        }]
    );
}

#[tokio::test]
async fn test_answer_replies_to_question_message() {
    let messenger = Arc::new(StubMessenger::default());
    let relay = relay_with(StubBackend::hello(), messenger.clone());
    let input = write_input(
        ".json",
        r#"{"question": "hi", "chat_id": "123", "message_id": 10, "reply_to_message_id": 5}"#,
    );

    relay.run_file(input.path()).await.unwrap();

    assert_eq!(messenger.sent()[0].reply_to, Some(10));
}

#[tokio::test]
async fn test_markdown_format_renders_before_sending() {
    let messenger = Arc::new(StubMessenger::default());
    let backend =
        StubBackend::answering(json!({"item": {"messages": [{}, {"text": "4."}]}}));
    let relay = Relay::new(backend)
        .with_messenger(messenger.clone())
        .with_format(AnswerFormat::MarkdownV2);

    let answer = relay
        .run(&Request::new("2+2?").with_destination(Destination::new("1")))
        .await
        .unwrap();

    assert_eq!(answer.text, "4.");
    assert_eq!(messenger.sent()[0].text, r"4\.");
    assert_eq!(messenger.sent()[0].format, AnswerFormat::MarkdownV2);
}

#[tokio::test]
async fn test_no_destination_means_no_delivery() {
    let messenger = Arc::new(StubMessenger::default());
    let relay = relay_with(StubBackend::hello(), messenger.clone());
    let input = write_input(".json", r#"{"question": "hi"}"#);

    let answer = relay.run_file(input.path()).await.unwrap();

    assert_eq!(answer.text, "hello");
    assert!(messenger.sent().is_empty());
}

#[tokio::test]
async fn test_destination_without_messenger_still_answers() {
    let relay = Relay::new(StubBackend::hello());
    let request = Request::new("hi").with_destination(Destination::new("123"));

    let answer = relay.run(&request).await.unwrap();

    assert_eq!(answer.text, "hello");
}

#[tokio::test]
async fn test_delivery_failure_is_error() {
    let messenger = Arc::new(StubMessenger::failing());
    let relay = relay_with(StubBackend::hello(), messenger.clone());
    let request = Request::new("hi").with_destination(Destination::new("123"));

    let err = relay.run(&request).await.unwrap_err();

    assert!(matches!(err, RelayError::Delivery(_)));
    assert!(err.to_string().contains("chat not found"));
}

#[tokio::test]
async fn test_dry_run_skips_delivery() {
    let messenger = Arc::new(StubMessenger::default());
    let relay = relay_with(StubBackend::hello(), messenger.clone()).with_dry_run(true);
    let request = Request::new("hi").with_destination(Destination::new("123"));

    let answer = relay.run(&request).await.unwrap();

    assert_eq!(answer.text, "hello");
    assert!(messenger.sent().is_empty());
}

// =============================================================================
// BACKEND AND RESPONSE
// =============================================================================

#[tokio::test]
async fn test_plain_text_question_passed_verbatim() {
    let backend = StubBackend::hello();
    let relay = Relay::new(backend);
    let input = write_input(".txt", "What is 2+2?");

    relay.run_file(input.path()).await.unwrap();

    assert_eq!(relay.backend.questions(), vec!["What is 2+2?".to_string()]);
}

#[tokio::test]
async fn test_style_override_from_request() {
    let relay = Relay::new(StubBackend::hello()).with_style(ConversationStyle::Balanced);

    relay.run(&Request::new("a")).await.unwrap();
    let mut request = Request::new("b");
    request.style = Some(ConversationStyle::Precise);
    relay.run(&request).await.unwrap();

    let styles: Vec<_> = relay.backend.asked.lock().unwrap().iter().map(|(_, s)| *s).collect();
    assert_eq!(styles, vec![ConversationStyle::Balanced, ConversationStyle::Precise]);
}

#[tokio::test]
async fn test_malformed_response_skips_delivery() {
    let messenger = Arc::new(StubMessenger::default());
    let backend = StubBackend::answering(json!({"item": {"messages": [{"text": "hi"}]}}));
    let relay = relay_with(backend, messenger.clone());
    let request = Request::new("hi").with_destination(Destination::new("123"));

    let err = relay.run(&request).await.unwrap_err();

    assert!(matches!(err, RelayError::MalformedResponse(_)));
    assert!(messenger.sent().is_empty());
}

#[tokio::test]
async fn test_backend_error_skips_delivery() {
    let messenger = Arc::new(StubMessenger::default());
    let relay = relay_with(StubBackend::failing(), messenger.clone());
    let request = Request::new("hi").with_destination(Destination::new("123"));

    let err = relay.run(&request).await.unwrap_err();

    assert!(matches!(err, RelayError::Backend(BackendError::Api(_))));
    assert!(messenger.sent().is_empty());
}

#[tokio::test]
async fn test_missing_input_file() {
    let relay = Relay::new(StubBackend::hello());

    let err = relay.run_file("/nonexistent/question.json").await.unwrap_err();

    assert!(matches!(err, RelayError::Request(RequestError::ReadFile { .. })));
    assert!(relay.backend.questions().is_empty());
}

// =============================================================================
// TYPING INDICATOR
// =============================================================================

#[tokio::test]
async fn test_typing_indicator_runs_while_waiting() {
    let messenger = Arc::new(StubMessenger::default());
    let backend = StubBackend {
        delay: Some(Duration::from_millis(50)),
        ..StubBackend::hello()
    };
    let relay = relay_with(backend, messenger.clone()).with_typing_indicator(true);
    let request = Request::new("hi").with_destination(Destination::new("123"));

    relay.run(&request).await.unwrap();
    let typing_after_run = messenger.typing_count();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(typing_after_run >= 1);
    assert_eq!(messenger.typing_count(), typing_after_run);
    assert_eq!(messenger.sent().len(), 1);
}

#[tokio::test]
async fn test_typing_indicator_stops_on_backend_error() {
    let messenger = Arc::new(StubMessenger::default());
    let backend = StubBackend {
        delay: Some(Duration::from_millis(20)),
        ..StubBackend::failing()
    };
    let relay = relay_with(backend, messenger.clone()).with_typing_indicator(true);
    let request = Request::new("hi").with_destination(Destination::new("123"));

    assert!(relay.run(&request).await.is_err());
    let typing_after_run = messenger.typing_count();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(messenger.typing_count(), typing_after_run);
}

#[tokio::test]
async fn test_typing_indicator_off_without_destination() {
    let messenger = Arc::new(StubMessenger::default());
    let relay = relay_with(StubBackend::hello(), messenger.clone()).with_typing_indicator(true);

    relay.run(&Request::new("hi")).await.unwrap();

    assert_eq!(messenger.typing_count(), 0);
}

#[tokio::test]
async fn test_slow_typing_action_does_not_delay_delivery() {
    let messenger = Arc::new(StubMessenger {
        typing_delay: Some(Duration::from_secs(30)),
        ..Default::default()
    });
    let backend = StubBackend {
        delay: Some(Duration::from_millis(20)),
        ..StubBackend::hello()
    };
    let relay = relay_with(backend, messenger.clone()).with_typing_indicator(true);
    let request = Request::new("hi").with_destination(Destination::new("123"));

    let result = tokio::time::timeout(Duration::from_secs(2), relay.run(&request)).await;

    let answer = result.expect("typing action held up the relay").unwrap();
    assert_eq!(answer.text, "hello");
    assert_eq!(messenger.typing_count(), 1);
    assert_eq!(messenger.sent().len(), 1);
}
