//! Handles the WebSocket connection to the upstream realtime service.

use crate::config::UpstreamConfig;
use anyhow::Context;
use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use interpreter_core::{RelayError, Result, UpstreamConnector, UpstreamSink, UpstreamSource};
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        self, client::IntoClientRequest, http::HeaderValue, protocol::Message as WsMessage,
    },
};
use tracing::debug;

type RealtimeStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens one authenticated upstream socket per session.
#[derive(Debug)]
pub struct RealtimeConnector {
    url: String,
    authorization: HeaderValue,
    beta: HeaderValue,
}

impl RealtimeConnector {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let mut authorization: HeaderValue =
            format!("Bearer {}", config.api_key.expose_secret())
                .parse()
                .context("OPENAI_API_KEY is not a valid header value")?;
        authorization.set_sensitive(true);
        let beta = config
            .beta
            .parse()
            .context("REALTIME_BETA is not a valid header value")?;
        Ok(Self {
            url: config.url.clone(),
            authorization,
            beta,
        })
    }
}

#[async_trait]
impl UpstreamConnector for RealtimeConnector {
    type Source = UpstreamReader;
    type Sink = UpstreamWriter;

    async fn connect(&self) -> Result<(UpstreamReader, UpstreamWriter)> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(RelayError::transport)?;
        request
            .headers_mut()
            .insert("Authorization", self.authorization.clone());
        request.headers_mut().insert("OpenAI-Beta", self.beta.clone());

        let (ws_stream, response) = connect_async(request)
            .await
            .map_err(|e| RelayError::Transport(format!("upstream handshake failed: {e}")))?;
        debug!(status = %response.status(), "Upstream handshake complete.");

        let (sink, stream) = ws_stream.split();
        Ok((
            UpstreamReader { stream },
            UpstreamWriter {
                sink,
                closed: false,
            },
        ))
    }
}

pub struct UpstreamReader {
    stream: SplitStream<RealtimeStream>,
}

#[async_trait]
impl UpstreamSource for UpstreamReader {
    async fn next_message(&mut self) -> Result<Option<String>> {
        while let Some(msg) = self.stream.next().await {
            match msg.map_err(RelayError::transport)? {
                WsMessage::Text(text) => return Ok(Some(text.as_str().to_owned())),
                // Not expected from the service; let the parser judge the contents.
                WsMessage::Binary(data) => {
                    return Ok(Some(String::from_utf8_lossy(&data).into_owned()));
                }
                WsMessage::Close(frame) => {
                    debug!(?frame, "Upstream sent close frame.");
                    return Ok(None);
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            }
        }
        Ok(None)
    }
}

pub struct UpstreamWriter {
    sink: SplitSink<RealtimeStream, WsMessage>,
    closed: bool,
}

#[async_trait]
impl UpstreamSink for UpstreamWriter {
    async fn send_message(&mut self, text: String) -> Result<()> {
        if self.closed {
            return Err(RelayError::ChannelClosed);
        }
        self.sink
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(send_error)
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.sink.send(WsMessage::Close(None)).await;
        let _ = self.sink.close().await;
        debug!("Upstream connection closed.");
    }
}

fn send_error(err: tungstenite::Error) -> RelayError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            RelayError::ChannelClosed
        }
        other => RelayError::transport(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn upstream_config(api_key: &str) -> UpstreamConfig {
        UpstreamConfig {
            url: "ws://127.0.0.1:9/v1/realtime".to_string(),
            api_key: SecretString::from(api_key.to_string()),
            beta: "realtime=v1".to_string(),
        }
    }

    #[test]
    fn test_connector_builds_sensitive_auth_header() {
        let connector = RealtimeConnector::new(&upstream_config("sk-test")).unwrap();
        assert_eq!(connector.authorization, "Bearer sk-test");
        assert!(connector.authorization.is_sensitive());
        assert_eq!(connector.beta, "realtime=v1");
        assert!(!format!("{:?}", connector).contains("sk-test"));
    }

    #[test]
    fn test_connector_rejects_bad_header_values() {
        assert!(RealtimeConnector::new(&upstream_config("bad\nkey")).is_err());
    }

    #[tokio::test]
    async fn test_connect_failure_is_transport_error() {
        let connector = RealtimeConnector::new(&upstream_config("sk-test")).unwrap();
        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, RelayError::Transport(_)));
    }

    #[test]
    fn test_send_error_mapping() {
        assert!(matches!(
            send_error(tungstenite::Error::AlreadyClosed),
            RelayError::ChannelClosed
        ));
        assert!(matches!(
            send_error(tungstenite::Error::Io(std::io::Error::other("reset"))),
            RelayError::Transport(_)
        ));
    }
}
