//! Application orchestration.
//!
//! Wires the routing core together:
//! - ConnectionsHub, MessagesHub and TickerHub actors
//! - Request handlers (client count, signal list)
//! - Tickers and their sample sinks (archive, per-sample push)
//! - The WebSocket gateway
//!
//! Shutdown is cooperative: Ctrl-C cancels the root token, which stops the
//! tickers, the ticker hub, every connection and the gateway; the remaining
//! hubs are then drained and the sample archive flushed.

use std::sync::Arc;

use sigcast_core::SignalStatic;
use sigcast_feed::{
    spawn_ticker_hub, spawn_tickers, FanoutSink, FeedConfig, PushSink, SampleSink, Ticker,
    TickerHubHandle,
};
use sigcast_gateway::{bind, serve, GatewayState};
use sigcast_hub::{
    spawn_connections_hub, spawn_messages_hub, Connection, ConnectionTasks,
    ConnectionsHubHandle, HubConfig, MessagesHubHandle, PeerSink, PeerStream,
};
use sigcast_persistence::{write_catalogue, JsonLinesSampleSink};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::AppResult;

// ============================================================================
// Services
// ============================================================================

/// The running routing core: three hubs with their handlers registered.
pub struct Services {
    pub connections: ConnectionsHubHandle,
    pub messages: MessagesHubHandle,
    pub tickers: TickerHubHandle,
    /// Root token; cancelling it stops tickers, the ticker hub and every
    /// connection.
    pub shutdown: CancellationToken,
    hub_config: HubConfig,
    joins: Vec<JoinHandle<()>>,
}

impl Services {
    /// Spawn the hubs and register their request handlers.
    pub async fn start(hub: &HubConfig, feed: &FeedConfig) -> AppResult<Self> {
        hub.validate()?;
        feed.validate()?;

        let shutdown = CancellationToken::new();

        let (connections, connections_join) =
            spawn_connections_hub(hub.inbox_capacity, hub.stats_interval());
        let (messages, messages_join) =
            spawn_messages_hub(connections.clone(), hub.inbox_capacity, hub.request_timeout());
        let (tickers, tickers_join) = spawn_ticker_hub(
            connections.clone(),
            feed.aggregation_period(),
            hub.inbox_capacity,
            shutdown.clone(),
        );

        connections.register_handlers(&messages).await?;
        tickers.register_handlers(&messages).await?;

        info!(commands = ?messages.registered_commands().await?, "Hubs started");

        Ok(Self {
            connections,
            messages,
            tickers,
            shutdown,
            hub_config: hub.clone(),
            joins: vec![connections_join, messages_join, tickers_join],
        })
    }

    /// Create, launch and subscribe a ticker.
    pub async fn add_ticker(
        &self,
        signal: SignalStatic,
        sink: Arc<dyn SampleSink>,
    ) -> AppResult<Ticker> {
        let ticker = Ticker::new(signal, sink, &self.shutdown);
        ticker.launch();
        self.tickers.subscribe(ticker.clone()).await?;
        Ok(ticker)
    }

    /// Register a peer and run its pumps.
    pub async fn attach(&self, sink: PeerSink, stream: PeerStream) -> AppResult<ConnectionTasks> {
        let connection = Connection::open(
            &self.connections,
            self.hub_config.send_queue_capacity,
            self.hub_config.pump_settings(),
            &self.shutdown,
        )
        .await?;

        Ok(connection.spawn(
            sink,
            stream,
            self.messages.clone(),
            self.connections.clone(),
        ))
    }

    /// Stop everything and wait for the hubs to exit.
    pub async fn stop(self) {
        self.shutdown.cancel();
        self.tickers.shutdown().await;
        self.messages.shutdown().await;
        self.connections.shutdown().await;

        for join in self.joins {
            if let Err(e) = join.await {
                warn!(error = %e, "Hub task ended abnormally");
            }
        }
        info!("Hubs stopped");
    }
}

// ============================================================================
// Application
// ============================================================================

/// Main application.
pub struct Application {
    config: AppConfig,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Run until Ctrl-C or until the gateway stops.
    pub async fn run(self) -> AppResult<()> {
        let config = self.config;
        let services = Services::start(&config.hub, &config.feed).await?;

        let sink = Arc::new(build_sink(&config, &services)?);
        let tickers = spawn_tickers(&config.feed, sink.clone(), &services.shutdown)?;

        if config.persistence.enabled {
            let signals: Vec<SignalStatic> =
                tickers.iter().map(|t| t.signal().clone()).collect();
            write_catalogue(&config.persistence.data_dir, &signals)?;
        }

        for ticker in &tickers {
            services.tickers.subscribe(ticker.clone()).await?;
        }
        info!(count = services.tickers.ticker_count().await?, "Tickers subscribed");

        let listener = bind(&config.gateway).await?;
        let state = GatewayState::new(
            services.connections.clone(),
            services.messages.clone(),
            config.hub.clone(),
            &config.gateway,
            services.shutdown.clone(),
        );
        let mut gateway = tokio::spawn(serve(listener, state));

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                }
                info!("Shutdown signal received");
            }
            result = &mut gateway => {
                match result {
                    Ok(Ok(())) => info!("Gateway exited"),
                    Ok(Err(e)) => error!(error = %e, "Gateway failed"),
                    Err(e) => error!(error = %e, "Gateway task panicked"),
                }
            }
        }

        info!("Shutting down");
        services.shutdown.cancel();
        if !gateway.is_finished() {
            let _ = gateway.await;
        }
        services.stop().await;

        sink.flush()?;
        info!("Shutdown complete");
        Ok(())
    }
}

/// Sample sinks enabled by the configuration.
fn build_sink(config: &AppConfig, services: &Services) -> AppResult<FanoutSink> {
    let mut sink = FanoutSink::new();

    if config.persistence.enabled {
        info!(dir = %config.persistence.data_dir.display(), "Sample archive enabled");
        sink = sink.with(Arc::new(JsonLinesSampleSink::new(&config.persistence)?));
    }
    if config.feed.per_sample_push {
        info!("Per-sample push enabled");
        sink = sink.with(Arc::new(PushSink::new(services.connections.clone())));
    }

    Ok(sink)
}
