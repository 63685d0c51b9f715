mod app;
mod constants;
mod handlers;
mod state;
mod subscriptions;
mod timers;

use std::path::PathBuf;

use anyhow::Context;
use modus_notifications_config::NotificationsConfig;
use modus_notifications_util::ImageCache;
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::app::PresentationController;
use crate::state::history::HistoryStore;

fn main() -> anyhow::Result<()> {
    color_backtrace::install();
    init_tracing();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_tracing() {
    #[cfg(feature = "systemd")]
    if let Ok(journald) = tracing_journald::layer() {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(tracing_subscriber::fmt::layer())
            .with(journald.with_syslog_identifier(modus_notifications_config::ID.to_string()))
            .init();
        return;
    }

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run() -> anyhow::Result<()> {
    let config = NotificationsConfig::load_or_default(None);

    let cache_dir = config.cache_dir.clone().unwrap_or_else(default_cache_dir);
    let cache = ImageCache::new(&cache_dir)
        .with_context(|| format!("failed to create cache dir {}", cache_dir.display()))?;
    cache.sweep_stale(constants::CACHE_RETENTION);

    let history_file = config
        .history_file
        .clone()
        .unwrap_or_else(|| cache_dir.join("notification_history.json"));
    let history = HistoryStore::load(&history_file, config.history_limit);

    let (messages_tx, messages_rx) = mpsc::channel(constants::CHANNEL_BUFFER_SIZE);
    let (feedback_tx, feedback_rx) = mpsc::unbounded_channel();

    let (controller, view) = PresentationController::new(
        config,
        cache,
        history,
        Some(history_file),
        messages_tx.clone(),
        feedback_tx,
    );

    let conns = subscriptions::notifications::Conns::new(messages_tx)
        .await
        .context("failed to claim org.freedesktop.Notifications")?;
    tokio::spawn(subscriptions::notifications::serve(conns, feedback_rx));

    // The renderer subscribes to this; hold it open for the daemon's lifetime
    let _view = view;

    tracing::info!("modus-notifications ready");
    controller.run(messages_rx).await;
    Ok(())
}

fn default_cache_dir() -> PathBuf {
    std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
        .join("modus")
        .join("notifications")
}
