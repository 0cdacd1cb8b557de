//! Adapts the browser WebSocket to the relay's client-side traits.
//!
//! Inbound binary frames are raw audio. Outbound binary frames are synthesized
//! audio and outbound text frames are completed transcripts.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use interpreter_core::{ClientSink, ClientSource, RelayError, Result};
use tracing::{debug, warn};

pub struct ClientReader {
    stream: SplitStream<WebSocket>,
}

impl ClientReader {
    pub fn new(stream: SplitStream<WebSocket>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl ClientSource for ClientReader {
    async fn read_audio_frame(&mut self) -> Result<Option<Bytes>> {
        while let Some(msg) = self.stream.next().await {
            match msg.map_err(RelayError::transport)? {
                Message::Binary(data) => return Ok(Some(data)),
                Message::Text(text) => {
                    warn!(len = text.len(), "Ignoring text frame from client.");
                }
                Message::Close(frame) => {
                    debug!(?frame, "Client sent close frame.");
                    return Ok(None);
                }
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
        Ok(None)
    }
}

pub struct ClientWriter {
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
}

impl ClientWriter {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink,
            closed: false,
        }
    }

    async fn send(&mut self, msg: Message) -> Result<()> {
        if self.closed {
            return Err(RelayError::ChannelClosed);
        }
        self.sink.send(msg).await.map_err(|e| {
            debug!(error = %e, "Write to client failed.");
            RelayError::ChannelClosed
        })
    }
}

#[async_trait]
impl ClientSink for ClientWriter {
    async fn write_audio_frame(&mut self, frame: Bytes) -> Result<()> {
        self.send(Message::Binary(frame)).await
    }

    async fn write_text(&mut self, text: String) -> Result<()> {
        self.send(Message::Text(text.into())).await
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
        debug!("Client connection closed.");
    }
}
