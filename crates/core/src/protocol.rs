//! Wire types for the upstream realtime speech service.
//!
//! Every message is a JSON text frame discriminated by its `type` field.

use crate::{codec, error::Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// An output type the upstream is asked to produce.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Text => write!(f, "text"),
            Modality::Audio => write!(f, "audio"),
        }
    }
}

impl FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Modality::Text),
            "audio" => Ok(Modality::Audio),
            other => Err(format!("'{}' is not a modality (expected text or audio)", other)),
        }
    }
}

/// Session parameters pushed to the upstream once it reports readiness.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub voice: String,
    pub instructions: String,
    /// Ordered, without duplicates.
    pub modalities: Vec<Modality>,
    pub temperature: f64,
}

/// Messages the relay sends to the upstream.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Appends one encoded audio chunk to the upstream input buffer.
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    /// Configures voice, instructions, modalities and temperature.
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },
}

impl ClientEvent {
    /// Wraps one raw client audio frame for the upstream input buffer.
    pub fn append(frame: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: codec::encode(frame),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Detail attached to an upstream `error` event.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Messages received from the upstream.
///
/// Types the relay has no use for fall into [`ServerEvent::Unrecognized`]
/// instead of failing to parse.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated,
    /// A chunk of synthesized audio. `delta` is base64 and may be absent.
    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta { delta: Option<String> },
    #[serde(rename = "response.audio_transcript.done")]
    ResponseAudioTranscriptDone { transcript: String },
    #[serde(rename = "input_audio_buffer.speech_started")]
    InputAudioBufferSpeechStarted,
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    InputAudioBufferSpeechStopped,
    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioBufferCommitted,
    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated,
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: ErrorDetail,
    },
    #[serde(other)]
    Unrecognized,
}

impl ServerEvent {
    /// Parses one upstream text frame.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Lifecycle events that carry nothing the client needs.
    pub fn is_ignored(&self) -> bool {
        matches!(
            self,
            ServerEvent::InputAudioBufferSpeechStarted
                | ServerEvent::InputAudioBufferSpeechStopped
                | ServerEvent::InputAudioBufferCommitted
                | ServerEvent::ConversationItemCreated
        )
    }
}
