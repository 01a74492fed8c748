use crate::broker::{self, listener};
use crate::correlation::CorrelationRegistry;
use crate::metrics::Metrics;
use crate::{config, server};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Gateway lifecycle: config → broker topology → reply listeners → servers
/// → drain.
///
/// Returns an error (and the process exits non-zero) on configuration
/// errors or when the broker cannot be reached at startup.
pub async fn run(config_path: PathBuf, listen: String, admin_listen: String) -> Result<()> {
    init_tracing();

    // Configuration and shared state.
    let config = config::GatewayConfig::load(&config_path)?;
    let metrics = Metrics::install();
    let instance_id = instance_id();
    let registry = CorrelationRegistry::new(config.request.max_in_flight);
    let shutdown = Arc::new(Notify::new());

    // Broker topology + reply listeners. Connection failure here is fatal; a
    // gateway that cannot reach its services must not serve traffic.
    let (broker, publisher, reply_queue) = if config.broker.enabled {
        let broker = broker::Broker::connect(&config.broker, &instance_id).await?;
        listener::spawn_listeners(
            &broker,
            registry.clone(),
            config.broker.consumer_workers,
            &shutdown,
        )
        .await?;
        let publisher: Arc<dyn broker::RequestPublisher> = Arc::new(broker.publisher());
        let reply_queue = broker.reply_queue.clone();
        (Some(broker), Some(publisher), reply_queue)
    } else {
        tracing::warn!("broker: disabled, broker-backed routes will fail 503");
        let reply_queue =
            broker::reply_queue_name(&config.broker.reply_queue_prefix, &instance_id);
        (None, None, reply_queue)
    };

    let state = server::GatewayState::new(
        config,
        metrics,
        registry,
        publisher,
        reply_queue,
        instance_id.clone(),
    )?;

    // Admin surface runs on its own listener so health/metrics stay
    // reachable while the gateway drains.
    {
        let admin_state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = server::run_admin_server(&admin_listen, admin_state).await {
                tracing::error!("server: admin failed, error={}", e);
            }
        });
    }

    tracing::info!(
        "server: starting gateway, listen={}, instance={}, reply_queue={}",
        listen,
        instance_id,
        state.reply_queue
    );

    let gateway_handle = tokio::spawn({
        let state = state.clone();
        let shutdown = shutdown.clone();
        async move { server::run_gateway_server(&listen, state, shutdown).await }
    });

    // Block until a termination signal, then drain.
    let signal = termination_signal().await;
    tracing::info!(
        pending_requests = state.registry.in_flight(),
        instance = %instance_id,
        "server: {} received, draining",
        signal
    );
    shutdown.notify_waiters();

    if let Err(e) = gateway_handle.await {
        tracing::error!("server: gateway task error: {}", e);
    }

    // The broker connection is held open until the very end so in-flight
    // replies can still land during the drain window.
    drop(broker);

    tracing::info!("server: shutdown complete");
    Ok(())
}

/// Short unique id naming this gateway replica's reply queue.
fn instance_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// JSON logs on stdout through a non-blocking writer. The writer guard must
/// outlive the process, so it is leaked.
fn init_tracing() {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    std::mem::forget(guard);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .json(),
        )
        .init();
}

/// Resolves with the name of the first termination signal to arrive.
async fn termination_signal() -> &'static str {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT"
    }
}
