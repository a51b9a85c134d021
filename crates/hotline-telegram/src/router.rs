//! Dispatcher wiring and process startup.
//!
//! Order matters here: the config document is bootstrapped before the
//! dispatcher accepts its first update, and the keep-alive tasks share one
//! cancellation token with the signal handler so a SIGTERM winds down the
//! HTTP endpoint, the self-ping loop and long polling together.

use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio_util::sync::CancellationToken;

use hotline_core::{
    config::Config,
    domain::UserId,
    flows::{startup, FlowContext},
    keepalive,
    listen::Listeners,
    messaging::MessengerPort,
    oplog::OpsLog,
    store::HotlineStore,
};

use crate::{handlers, TelegramMessenger};

pub struct AppState {
    pub ctx: FlowContext,
}

pub async fn run_polling(config: Arc<Config>, store: Arc<dyn HotlineStore>) -> anyhow::Result<()> {
    let bot = Bot::new(config.telegram_bot_token.clone());

    let me = bot.get_me().await?;
    tracing::info!(bot = me.username(), "hotline bot starting");
    let bot_id = UserId(me.id.0 as i64);

    let messenger: Arc<dyn MessengerPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let oplog = OpsLog::new(messenger.clone(), config.log_channel_id);
    let ctx = FlowContext {
        store,
        messenger,
        listeners: Arc::new(Listeners::new()),
        oplog: oplog.clone(),
        bot_id,
    };

    startup::bootstrap(&ctx, config.default_admin_id, config.ga_chat_id).await?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        let port = config.keepalive_port;
        tokio::spawn(async move {
            if let Err(err) = keepalive::serve_http(port, shutdown).await {
                tracing::error!(error = %err, "keep-alive endpoint failed");
            }
        });
    }
    tokio::spawn(keepalive::run_self_ping(
        config.service_url.clone(),
        oplog.clone(),
        shutdown.clone(),
    ));

    let state = Arc::new(AppState { ctx });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build();

    let token = dispatcher.shutdown_token();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("termination signal received, shutting down");
        shutdown.cancel();
        if let Ok(done) = token.shutdown() {
            done.await;
        }
    });

    oplog.record("Hotline bot started").await;
    dispatcher.dispatch().await;
    oplog.record("Hotline bot stopped").await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let Ok(mut term) = signal(SignalKind::terminate()) else {
        let _ = tokio::signal::ctrl_c().await;
        return;
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
