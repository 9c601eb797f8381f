//! HTTP server implementation using axum.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use sigcast_hub::{Connection, ConnectionsHubHandle, HubConfig, MessagesHubHandle};
use sigcast_telemetry::Metrics;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::limiter::{ConnectionGuard, ConnectionLimiter};
use crate::socket::split_socket;

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct GatewayState {
    connections: ConnectionsHubHandle,
    messages: MessagesHubHandle,
    hub_config: Arc<HubConfig>,
    limiter: Arc<ConnectionLimiter>,
    shutdown: CancellationToken,
}

impl GatewayState {
    pub fn new(
        connections: ConnectionsHubHandle,
        messages: MessagesHubHandle,
        hub_config: HubConfig,
        config: &GatewayConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            connections,
            messages,
            hub_config: Arc::new(hub_config),
            limiter: Arc::new(ConnectionLimiter::new(config.max_connections)),
            shutdown,
        }
    }
}

/// Create the axum router.
pub fn create_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/ws", get(ws_handler))
        .route("/metrics", get(serve_metrics))
        .with_state(state)
}

/// Serve the client page.
async fn serve_index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

/// Prometheus text exposition.
async fn serve_metrics() -> Response {
    match Metrics::render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(
    State(state): State<GatewayState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let guard = match state.limiter.try_acquire() {
        Some(guard) => guard,
        None => {
            warn!(
                %addr,
                current = state.limiter.current_count(),
                max = state.limiter.max(),
                "WebSocket connection limit reached"
            );
            return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
        }
    };

    ws.max_message_size(state.hub_config.max_frame_bytes)
        .on_upgrade(move |socket| serve_socket(socket, state, guard, addr))
}

/// Register an upgraded socket and run its pumps to completion.
async fn serve_socket(
    socket: WebSocket,
    state: GatewayState,
    _guard: ConnectionGuard,
    addr: SocketAddr,
) {
    let connection = match Connection::open(
        &state.connections,
        state.hub_config.send_queue_capacity,
        state.hub_config.pump_settings(),
        &state.shutdown,
    )
    .await
    {
        Ok(connection) => connection,
        Err(e) => {
            warn!(%addr, error = %e, "Failed to register connection");
            return;
        }
    };

    let conn_id = connection.id();
    info!(
        conn_id,
        %addr,
        connections = state.limiter.current_count(),
        "Peer connected"
    );

    let (sink, stream) = split_socket(socket);
    connection
        .spawn(sink, stream, state.messages.clone(), state.connections.clone())
        .join()
        .await;

    debug!(conn_id, %addr, "Peer disconnected");
}

/// Bind the listener.
pub async fn bind(config: &GatewayConfig) -> GatewayResult<TcpListener> {
    let addr = config.socket_addr()?;
    TcpListener::bind(addr)
        .await
        .map_err(|source| GatewayError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// Serve until the shutdown token is cancelled.
pub async fn serve(listener: TcpListener, state: GatewayState) -> GatewayResult<()> {
    let shutdown = state.shutdown.clone();
    let addr = listener.local_addr()?;
    info!(%addr, "Starting gateway");

    let app = create_router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use futures_util::{SinkExt, StreamExt};
    use sigcast_core::{CommandType, ServerFrame};
    use sigcast_hub::{spawn_connections_hub, spawn_messages_hub};
    use tokio_tungstenite::tungstenite::Message;
    use tower::ServiceExt;

    use super::*;

    fn state(max_connections: usize) -> GatewayState {
        let (connections, _) = spawn_connections_hub(64, Duration::from_secs(60));
        let (messages, _) = spawn_messages_hub(connections.clone(), 64, Duration::from_secs(5));
        let config = GatewayConfig {
            max_connections,
            ..Default::default()
        };
        GatewayState::new(
            connections,
            messages,
            HubConfig::default(),
            &config,
            CancellationToken::new(),
        )
    }

    async fn start(state: GatewayState) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state));
        addr
    }

    #[tokio::test]
    async fn test_index_page() {
        let response = create_router(state(4))
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("/ws"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        Metrics::connections(0);
        let response = create_router(state(4))
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("sigcast_connections"));
    }

    #[tokio::test]
    async fn test_websocket_client_count() {
        let state = state(4);
        let shutdown = state.shutdown.clone();
        let addr = start(state).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();

        // Registration is announced to every client, including the new one.
        let first = match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => ServerFrame::parse(&text).unwrap(),
            other => panic!("unexpected frame {other:?}"),
        };
        assert_eq!(first.command, CommandType::N_CONNECTIONS);
        assert_eq!(first.number, Some(1));

        ws.send(Message::Text(r#"{"command":0}"#.to_string()))
            .await
            .unwrap();
        let listing = loop {
            if let Message::Text(text) = ws.next().await.unwrap().unwrap() {
                break ServerFrame::parse(&text).unwrap();
            }
        };
        assert_eq!(listing.command, CommandType::COMMAND_LIST);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_connection_limit_returns_503() {
        let state = state(1);
        let shutdown = state.shutdown.clone();
        let addr = start(state).await;

        let (_first, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();

        let err = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap_err();
        match err {
            tokio_tungstenite::tungstenite::Error::Http(response) => {
                assert_eq!(response.status().as_u16(), 503);
            }
            other => panic!("expected HTTP rejection, got {other:?}"),
        }

        shutdown.cancel();
    }
}
