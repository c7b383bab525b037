//! Gateway HTTP server (single port): liveness endpoint and optional Telegram webhook.
//! Also wires the Telegram channel, dispatcher, and inbound router together.

use crate::channels::{
    ChannelHandle, InboundMessage, TelegramChannel, TelegramMessage, TelegramUpdate,
};
use crate::config::{Config, Credentials};
use crate::dispatch::{Dispatcher, InboundRouter};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Body of `GET /`.
pub const LIVENESS_TEXT: &str = "Telegram Gemini Bot is alive!";

const INBOUND_QUEUE: usize = 64;

/// Shared state for the HTTP routes.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Sender for inbound channel messages (e.g. Telegram webhook POSTs). The inbound router receives.
    pub inbound_tx: mpsc::Sender<InboundMessage>,
}

/// Routes served on the gateway port. The webhook route exists only in webhook mode
/// (`channels.telegram.webhookUrl` set); in polling mode updates come from getUpdates alone.
pub fn router(state: GatewayState) -> Router {
    let mut app = Router::new().route("/", get(liveness));
    if state.config.channels.telegram.webhook_url.is_some() {
        app = app.route("/telegram/webhook", post(telegram_webhook));
    }
    app.with_state(state)
}

/// Run the relay: start the Telegram channel (long poll or webhook), the inbound router, and the
/// HTTP server on config.gateway.bind:config.gateway.port. Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config, credentials: Credentials) -> Result<()> {
    let config = Arc::new(config);
    let telegram = Arc::new(TelegramChannel::new(
        &config.channels.telegram.api_base,
        credentials.telegram_token.clone(),
    ));
    let dispatcher = Dispatcher::from_config(
        &config.gemini,
        &credentials.gemini_api_key,
        telegram.clone(),
    )?;

    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(INBOUND_QUEUE);
    let router_task = tokio::spawn(InboundRouter::new(Arc::new(dispatcher)).run(inbound_rx));

    let mut channel_tasks: Vec<JoinHandle<()>> = Vec::new();
    let webhook_mode = match config.channels.telegram.webhook_url.as_deref() {
        Some(url) => {
            let secret = config.channels.telegram.webhook_secret.as_deref();
            if secret.is_none() {
                log::warn!("telegram webhook mode without webhookSecret: the route accepts any caller");
            }
            if let Err(e) = telegram.set_webhook(url, secret).await {
                log::warn!("telegram set_webhook failed: {}", e);
            } else {
                log::info!("telegram channel ({}) in webhook mode: {}", telegram.id(), url);
            }
            true
        }
        None => {
            // getUpdates is refused while a webhook is set.
            if let Err(e) = telegram.delete_webhook().await {
                log::debug!("telegram delete_webhook before polling: {}", e);
            }
            channel_tasks.push(telegram.clone().start_inbound(inbound_tx.clone()));
            log::info!("telegram channel ({}) getUpdates loop started", telegram.id());
            false
        }
    };

    let state = GatewayState {
        config: config.clone(),
        inbound_tx,
    };
    let app = router(state);

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(telegram, channel_tasks, webhook_mode))
        .await
        .context("gateway server exited")?;

    // The router ends once every inbound sender (poll loop, webhook state) is gone.
    let _ = router_task.await;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Stops the Telegram connector, removes its webhook if used, then awaits channel tasks.
async fn shutdown_signal(
    telegram: Arc<TelegramChannel>,
    channel_tasks: Vec<JoinHandle<()>>,
    webhook_mode: bool,
) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, stopping channels");

    telegram.stop();

    if webhook_mode {
        if let Err(e) = telegram.delete_webhook().await {
            log::debug!("telegram delete_webhook on shutdown: {}", e);
        }
    }

    for h in channel_tasks {
        // A poll in flight can take up to the long-poll timeout; don't hold shutdown for it.
        h.abort();
        let _ = h.await;
    }
    log::info!("channel tasks finished");
}

/// POST /telegram/webhook: receives Telegram update JSON; verifies optional secret, pushes InboundMessage.
async fn telegram_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(ref expected) = state.config.channels.telegram.webhook_secret {
        let provided = headers
            .get("X-Telegram-Bot-Api-Secret-Token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected.as_str() {
            return StatusCode::FORBIDDEN;
        }
    }
    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    let Some(inbound) = update.message.as_ref().and_then(TelegramMessage::to_inbound) else {
        return StatusCode::OK;
    };
    if state.inbound_tx.send(inbound).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// GET / returns a static alive string (for host-platform health checks).
async fn liveness() -> &'static str {
    LIVENESS_TEXT
}
