//! Frame transport.
//!
//! [`Connector`] opens one bidirectional frame channel per attempt; the
//! session client only sees [`FrameTransport`]. [`WsConnector`] is the
//! production implementation over `tokio-tungstenite`.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use http::HeaderValue;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{BinaryProtocol, Frame};

/// Headers sent when opening a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectHeaders {
    /// `X-Api-App-Id`
    pub app_id: String,
    /// `X-Api-App-Key`, the fixed key shared by all podcast clients.
    pub app_key: String,
    /// `X-Api-Access-Key`
    pub access_key: String,
    /// `X-Api-Resource-Id`
    pub resource_id: String,
    /// `X-Api-Connect-Id`, fresh per connection.
    pub connect_id: String,
}

impl ConnectHeaders {
    /// Returns the headers as `(name, value)` pairs.
    pub fn pairs(&self) -> [(&'static str, &str); 5] {
        [
            ("X-Api-App-Id", self.app_id.as_str()),
            ("X-Api-App-Key", self.app_key.as_str()),
            ("X-Api-Access-Key", self.access_key.as_str()),
            ("X-Api-Resource-Id", self.resource_id.as_str()),
            ("X-Api-Connect-Id", self.connect_id.as_str()),
        ]
    }
}

/// A bidirectional frame channel for one attempt.
#[async_trait]
pub trait FrameTransport: Send {
    /// Sends one frame.
    async fn send(&mut self, frame: &Frame) -> Result<()>;

    /// Receives the next frame; `None` once the peer closed the channel.
    async fn recv(&mut self) -> Result<Option<Frame>>;

    /// Closes the channel. Closing twice is not an error.
    async fn close(&mut self) -> Result<()>;
}

/// Opens frame transports.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, headers: &ConnectHeaders) -> Result<Box<dyn FrameTransport>>;
}

// ================== WebSocket ==================

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connects to the podcast endpoint over WebSocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    proto: BinaryProtocol,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            proto: BinaryProtocol::new(),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, headers: &ConnectHeaders) -> Result<Box<dyn FrameTransport>> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Config(format!("build ws request: {}", e)))?;

        for (name, value) in headers.pairs() {
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("header {}: {}", name, e)))?;
            request.headers_mut().insert(name, value);
        }

        debug!("connecting to {} (connect_id={})", self.url, headers.connect_id);
        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| Error::Connection(format!("websocket connect: {}", e)))?;

        Ok(Box::new(WsTransport {
            stream,
            proto: self.proto.clone(),
            closed: false,
        }))
    }
}

/// One WebSocket connection carrying binary frames.
pub struct WsTransport {
    stream: WsStream,
    proto: BinaryProtocol,
    closed: bool,
}

#[async_trait]
impl FrameTransport for WsTransport {
    async fn send(&mut self, frame: &Frame) -> Result<()> {
        let data = self.proto.marshal(frame)?;
        self.stream.send(WsMessage::binary(data)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Frame>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(WsError::ConnectionClosed)) | None => return Ok(None),
                Some(Err(e)) => return Err(e.into()),
            };

            match msg {
                WsMessage::Binary(data) => return self.proto.unmarshal(&data).map(Some),
                WsMessage::Close(frame) => {
                    debug!("websocket closed by server: {:?}", frame);
                    return Ok(None);
                }
                WsMessage::Text(text) => {
                    debug!("ignoring text message: {}", text.as_str());
                }
                _ => continue,
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_names() {
        let headers = ConnectHeaders {
            app_id: "app".to_string(),
            app_key: "key".to_string(),
            access_key: "access".to_string(),
            resource_id: "res".to_string(),
            connect_id: "conn".to_string(),
        };
        let names: Vec<&str> = headers.pairs().iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec![
                "X-Api-App-Id",
                "X-Api-App-Key",
                "X-Api-Access-Key",
                "X-Api-Resource-Id",
                "X-Api-Connect-Id"
            ]
        );
    }
}
