//! WebSocket test client against a live gateway.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use sigcast_core::{CommandType, ServerFrame};
use sigcast_gateway::{serve, GatewayConfig, GatewayState};
use sigcast_hub::HubConfig;
use sigcast_server::Services;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::WAIT;

/// Serve `services` on an ephemeral port.
pub async fn start_gateway(services: &Services) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = GatewayState::new(
        services.connections.clone(),
        services.messages.clone(),
        HubConfig::default(),
        &GatewayConfig::default(),
        services.shutdown.clone(),
    );
    tokio::spawn(serve(listener, state));
    addr
}

/// A WebSocket client.
pub struct WsClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        Self { ws }
    }

    pub async fn send(&mut self, text: &str) {
        self.ws.send(Message::Text(text.to_string())).await.unwrap();
    }

    /// Next text frame, decoded. Pings are answered by tungstenite itself.
    pub async fn next(&mut self) -> ServerFrame {
        loop {
            let message = timeout(WAIT, self.ws.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("socket closed")
                .unwrap();
            if let Message::Text(text) = message {
                return ServerFrame::parse(&text).unwrap();
            }
        }
    }

    pub async fn next_command(&mut self, command: CommandType) -> ServerFrame {
        loop {
            let frame = self.next().await;
            if frame.command == command {
                return frame;
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
