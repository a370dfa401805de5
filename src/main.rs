use interview_assistant::{
    config::{get_config, init_config, Config, LogFormat},
    router,
    services::telegram_service::TelegramClient,
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config();
    init_tracing(config.log_format);

    let telegram_http = reqwest::Client::builder()
        .connect_timeout(config.http_timeout())
        .build()?;
    let telegram = Arc::new(TelegramClient::from_config(config, telegram_http));
    let state = AppState::from_config(config, telegram.clone()).await?;

    match config.telegram_webhook_url.as_deref() {
        Some(url) => serve_webhook(config, &telegram, state, url).await,
        None => run_polling(&telegram, state).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn serve_webhook(
    config: &Config,
    telegram: &TelegramClient,
    state: AppState,
    target_webhook_url: &str,
) -> anyhow::Result<()> {
    info!("Checking Telegram webhook status...");
    let secret = config.telegram_webhook_secret.as_deref();
    match telegram.webhook_info().await {
        // The secret is not reported back, so a configured one is always re-sent.
        Ok(info) if info.url == target_webhook_url && secret.is_none() => {
            info!("Telegram webhook is already up to date: {}", info.url);
        }
        Ok(info) => {
            info!("Updating Telegram webhook: {} -> {}", info.url, target_webhook_url);
            telegram.set_webhook(target_webhook_url, secret).await?;
            info!("Telegram webhook registered successfully");
        }
        Err(e) => {
            warn!(error = %e, "Could not check Telegram webhook status, registering anyway");
            telegram.set_webhook(target_webhook_url, secret).await?;
        }
    }

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

async fn run_polling(telegram: &TelegramClient, state: AppState) -> anyhow::Result<()> {
    if let Err(e) = telegram.delete_webhook().await {
        warn!(error = %e, "Failed to remove Telegram webhook before polling");
    }
    info!("Polling Telegram for updates");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut offset: Option<i64> = None;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            polled = telegram.get_updates(offset, POLL_TIMEOUT_SECS) => match polled {
                Ok(updates) => {
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        if let Some(msg) = update.into_incoming() {
                            state.dispatcher.dispatch(msg);
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "getUpdates failed");
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                }
            }
        }
    }

    Ok(())
}
