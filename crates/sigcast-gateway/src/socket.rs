//! WebSocket adapter.
//!
//! Maps an axum `WebSocket` to the transport-neutral peer halves the
//! connection pumps drive.

use axum::extract::ws::{Message, WebSocket};
use futures_util::future;
use futures_util::{SinkExt, StreamExt};
use sigcast_hub::{HubError, HubResult, PeerFrame, PeerSink, PeerStream};

/// Split a socket into peer halves.
pub fn split_socket(socket: WebSocket) -> (PeerSink, PeerStream) {
    let (sink, stream) = socket.split();

    let sink = sink
        .sink_map_err(|e| HubError::Peer(e.to_string()))
        .with(|frame: PeerFrame| future::ready(Ok::<_, HubError>(to_message(frame))));
    let stream = stream.map(from_message);

    (Box::pin(sink), Box::pin(stream))
}

fn to_message(frame: PeerFrame) -> Message {
    match frame {
        PeerFrame::Text(text) => Message::Text(text.into()),
        PeerFrame::Binary(data) => Message::Binary(data.into()),
        PeerFrame::Ping(data) => Message::Ping(data.into()),
        PeerFrame::Pong(data) => Message::Pong(data.into()),
        PeerFrame::Close => Message::Close(None),
    }
}

fn from_message(msg: Result<Message, axum::Error>) -> HubResult<PeerFrame> {
    match msg {
        Ok(Message::Text(text)) => Ok(PeerFrame::Text(text.as_str().to_owned())),
        Ok(Message::Binary(data)) => Ok(PeerFrame::Binary(data.to_vec())),
        Ok(Message::Ping(data)) => Ok(PeerFrame::Ping(data.to_vec())),
        Ok(Message::Pong(data)) => Ok(PeerFrame::Pong(data.to_vec())),
        Ok(Message::Close(_)) => Ok(PeerFrame::Close),
        Err(e) => Err(HubError::Peer(e.to_string())),
    }
}
