//! STOMP-over-WebSocket connection to the node's chat service.

mod frame;

use async_trait::async_trait;
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use log::{debug, error, info, warn};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message as WsMessage,
};
use url::Url;

use crate::chat::OutboundMessage;
use crate::error::{BotError, Result};

pub use frame::{Command, Frame, FrameDecoder};

/// Destination the node publishes chat events on.
const SUBSCRIBE_DESTINATION: &str = "/api/v1/chat";
/// Destination the node accepts outgoing chat messages on.
const SEND_DESTINATION: &str = "/app/api/v1/chat";
const SUBSCRIPTION_ID: &str = "1";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

/// Delivers outgoing chat payloads.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<()>;
}

/// Sending half of the chat connection.
pub struct StompSender {
    sink: Mutex<WsSink>,
}

/// Receiving half of the chat connection.
pub struct StompReceiver {
    stream: SplitStream<WsStream>,
    decoder: FrameDecoder,
}

/// WebSocket endpoint for a node whose control API lives at `api_url`.
pub fn websocket_url(api_url: &str) -> Result<Url> {
    let mut url = Url::parse(api_url)?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(BotError::Config(format!(
                "unsupported API URL scheme '{other}'"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| BotError::Config(format!("cannot use scheme '{scheme}' for {api_url}")))?;
    url.set_path("/ws");
    url.set_query(None);
    Ok(url)
}

/// Opens the WebSocket, performs the STOMP handshake and subscribes to chat events.
pub async fn connect(api_url: &str) -> Result<(StompSender, StompReceiver)> {
    let url = websocket_url(api_url)?;
    info!("Connecting to chat service at {url}");

    let host = url.host_str().unwrap_or("localhost").to_string();
    let (ws, _) = connect_async(url.as_str()).await?;
    let (sink, stream) = ws.split();

    let sender = StompSender {
        sink: Mutex::new(sink),
    };
    let mut receiver = StompReceiver {
        stream,
        decoder: FrameDecoder::default(),
    };

    sender
        .send_frame(
            &Frame::new(Command::Connect)
                .header("accept-version", "1.2")
                .header("host", host)
                .header("heart-beat", "0,0"),
        )
        .await?;

    match receiver.next_frame().await? {
        Some(frame) if frame.command == Command::Connected => {
            debug!(
                "STOMP session established (version {})",
                frame.get_header("version").unwrap_or("?")
            );
        }
        Some(frame) if frame.command == Command::Error => {
            return Err(BotError::Transport(format!(
                "connection refused: {}",
                frame.get_header("message").unwrap_or(&frame.body)
            )));
        }
        Some(frame) => {
            return Err(BotError::Transport(format!(
                "expected CONNECTED, got {}",
                frame.command
            )));
        }
        None => {
            return Err(BotError::Transport(
                "connection closed during handshake".to_string(),
            ));
        }
    }

    sender
        .send_frame(
            &Frame::new(Command::Subscribe)
                .header("destination", SUBSCRIBE_DESTINATION)
                .header("id", SUBSCRIPTION_ID)
                .header("ack", "auto"),
        )
        .await?;
    info!("Subscribed to {SUBSCRIBE_DESTINATION}");

    Ok((sender, receiver))
}

impl StompSender {
    async fn send_frame(&self, frame: &Frame) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(WsMessage::text(frame.encode()))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for StompSender {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        let frame = message.into_frame(SEND_DESTINATION)?;
        self.send_frame(&frame).await
    }
}

impl StompReceiver {
    /// Next STOMP frame from the server, or `None` once the connection is closed.
    ///
    /// Malformed frames are logged and skipped.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.decoder.next_frame() {
                Ok(Some(frame)) => return Ok(Some(frame)),
                Ok(None) => {}
                Err(e) => {
                    warn!("Dropping malformed STOMP frame: {e}");
                    continue;
                }
            }

            let Some(message) = self.stream.next().await else {
                warn!("Chat connection closed");
                return Ok(None);
            };

            match message? {
                WsMessage::Text(text) => self.decoder.push(text.as_bytes()),
                WsMessage::Binary(data) => self.decoder.push(&data),
                WsMessage::Close(reason) => {
                    warn!("Chat connection closed by server: {reason:?}");
                    return Ok(None);
                }
                // tungstenite answers pings on its own.
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            }
        }
    }

    /// Next MESSAGE frame; server ERROR frames are logged and skipped.
    pub async fn next_message(&mut self) -> Result<Option<Frame>> {
        while let Some(frame) = self.next_frame().await? {
            match frame.command {
                Command::Message => return Ok(Some(frame)),
                Command::Error => error!(
                    "Received an error: {}",
                    frame.get_header("message").unwrap_or(&frame.body)
                ),
                other => debug!("Ignoring {other} frame"),
            }
        }
        Ok(None)
    }
}
