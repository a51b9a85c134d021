//! Keep-alive plumbing for hosts that put idle services to sleep.
//!
//! Two halves: a trivial HTTP liveness endpoint, and a loop that fetches
//! our own public URL once a minute so the host sees traffic. Each ping is
//! recorded in the operator log and the previous record is deleted, so the
//! channel holds one ping line instead of a growing pile.

use std::time::Duration;

use axum::{routing::get, Router};
use tokio_util::sync::CancellationToken;

use crate::{domain::MessageRef, oplog::OpsLog, Result};

const PING_INTERVAL: Duration = Duration::from_secs(60);

async fn liveness() -> &'static str {
    "Support Hotline Bot is UP!"
}

/// Serve the liveness endpoint until shutdown.
pub async fn serve_http(port: u16, shutdown: CancellationToken) -> Result<()> {
    let app = Router::new().route("/", get(liveness));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "keep-alive endpoint listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Ping our own service URL once a minute until shutdown.
pub async fn run_self_ping(
    service_url: Option<String>,
    oplog: OpsLog,
    shutdown: CancellationToken,
) {
    let client = reqwest::Client::new();
    let mut interval = tokio::time::interval(PING_INTERVAL);
    let mut previous: Option<MessageRef> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        if let Some(message) = previous.take() {
            oplog.forget(message).await;
        }
        previous = ping(&client, service_url.as_deref(), &oplog).await;
    }
}

async fn ping(
    client: &reqwest::Client,
    service_url: Option<&str>,
    oplog: &OpsLog,
) -> Option<MessageRef> {
    let Some(url) = service_url else {
        return oplog.record("SERVICE_URL is not set, skipping the self ping").await;
    };

    match client.get(url).send().await {
        Ok(response) => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            oplog.record(&format!("Self ping ({status}): {body}")).await
        }
        Err(err) => oplog.record(&format!("Self ping failed: {err}")).await,
    }
}
