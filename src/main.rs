use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::prelude::*;

use askrelay::{Config, CookieBackend, Relay, TelegramClient};

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "askrelay.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Setup logging. Stdout is reserved for the answer.
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("askrelay.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file: {e}");
            return ExitCode::FAILURE;
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting askrelay...");
    info!("Loaded config from {config_path}");
    if config.dry_run {
        info!("DRY RUN mode enabled");
    }

    let backend = match CookieBackend::from_cookie_file(
        config.backend_url.clone(),
        &config.cookie_path,
        config.backend_timeout,
    ) {
        Ok(backend) => backend,
        Err(e) => {
            error!("Failed to set up backend: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut relay = Relay::new(backend)
        .with_style(config.style)
        .with_format(config.format)
        .with_typing_indicator(config.typing_indicator)
        .with_dry_run(config.dry_run);

    match &config.telegram_bot_token {
        Some(token) => {
            let telegram = match &config.telegram_api_url {
                Some(url) => TelegramClient::with_api_url(token, url.clone()),
                None => TelegramClient::new(token),
            };
            relay = relay.with_messenger(Arc::new(telegram));
        }
        None => info!("No Telegram token, answers will only be printed"),
    }

    match relay.run_file(config.input_path()).await {
        Ok(answer) => {
            println!("{answer}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
