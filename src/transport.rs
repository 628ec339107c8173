use std::io;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, error::ProtocolError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::error::ProbeError;

/// A connection that carries one JSON text frame per message.
#[async_trait]
pub trait MessageChannel: Send {
    async fn send_text(&mut self, text: String) -> Result<(), ProbeError>;

    /// Wait for the next text frame.
    async fn recv_text(&mut self) -> Result<String, ProbeError>;

    async fn close(&mut self) -> Result<(), ProbeError>;
}

/// WebSocket client connection to the speech-to-text server.
pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsChannel {
    pub async fn connect(uri: &str) -> Result<Self, ProbeError> {
        match connect_async(uri).await {
            Ok((stream, response)) => {
                info!("Connected to {} (HTTP {})", uri, response.status());
                Ok(Self { stream })
            }
            Err(tungstenite::Error::Io(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
                Err(ProbeError::ConnectionRefused {
                    uri: uri.to_string(),
                })
            }
            Err(source) => Err(ProbeError::Connect {
                uri: uri.to_string(),
                source,
            }),
        }
    }
}

#[async_trait]
impl MessageChannel for WsChannel {
    async fn send_text(&mut self, text: String) -> Result<(), ProbeError> {
        debug!("-> {}", text);
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| ProbeError::Transport(e.to_string()))
    }

    async fn recv_text(&mut self) -> Result<String, ProbeError> {
        while let Some(msg) = self.stream.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    debug!("<- {}", text);
                    return Ok(text);
                }
                Ok(Message::Close(frame)) => {
                    info!("Server sent close frame: {:?}", frame);
                    return Err(ProbeError::Closed);
                }
                Ok(Message::Binary(data)) => {
                    debug!("Ignoring binary frame ({} bytes)", data.len());
                }
                // Ping/pong replies are queued by tungstenite itself.
                Ok(_) => {}
                Err(tungstenite::Error::ConnectionClosed) => return Err(ProbeError::Closed),
                Err(e) => return Err(ProbeError::Transport(e.to_string())),
            }
        }
        Err(ProbeError::Closed)
    }

    async fn close(&mut self) -> Result<(), ProbeError> {
        match self.stream.close(None).await {
            // The server may have closed first; the handshake is then already done.
            Ok(())
            | Err(
                tungstenite::Error::ConnectionClosed
                | tungstenite::Error::AlreadyClosed
                | tungstenite::Error::Protocol(ProtocolError::SendAfterClosing),
            ) => Ok(()),
            Err(e) => Err(ProbeError::Transport(e.to_string())),
        }
    }
}
