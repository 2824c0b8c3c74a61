//! Ask a chatbot backend one question and relay the answer to Telegram.

pub mod answer;
pub mod backend;
pub mod config;
pub mod relay;
pub mod request;
pub mod telegram;

pub use answer::{Answer, AnswerFormat};
pub use backend::{Backend, ConversationStyle, CookieBackend};
pub use config::Config;
pub use relay::{Relay, RelayError};
pub use request::{Destination, Request};
pub use telegram::{Messenger, TelegramClient};
