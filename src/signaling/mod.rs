//! Signaling channel boundary: the relay through which peers exchange
//! connection metadata before they can reach each other directly.

pub mod websocket;

use crate::error::ChannelError;
use crate::session::ChannelSink;
use crate::transport::{IceCandidate, SdpKind, SessionDescription};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use websocket::WebSocketChannelFactory;

/// An open (or opening) signaling connection.
pub trait SignalingChannel: Send + Sync {
    fn send(&self, text: String) -> Result<(), ChannelError>;
    fn close(&self);
}

/// Opens signaling channels. `open` returns as soon as the handshake has
/// been started; open/close/message/error are reported through `sink`.
pub trait ChannelFactory: Send + Sync {
    fn open(
        &self,
        url: &str,
        protocols: &[String],
        sink: ChannelSink,
    ) -> Result<Arc<dyn SignalingChannel>, ChannelError>;
}

/// Raw open/close notification of the channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelEvent {
    pub url: String,
    /// Sub-protocol the server agreed to.
    pub protocol: Option<String>,
    /// Close code, when the channel closed.
    pub code: Option<u16>,
    pub reason: Option<String>,
}

impl ChannelEvent {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Raw message received on the channel. The session never interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    Text(String),
    Binary(Bytes),
}

impl ChannelMessage {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ChannelMessage::Text(text) => Some(text),
            ChannelMessage::Binary(data) => std::str::from_utf8(data).ok(),
        }
    }

    /// Parses the message as one of the messages sessions emit.
    pub fn decode(&self) -> Result<WireMessage, serde_json::Error> {
        match self {
            ChannelMessage::Text(text) => serde_json::from_str(text),
            ChannelMessage::Binary(data) => serde_json::from_slice(data),
        }
    }
}

/// Messages the session itself writes to the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireMessage {
    NewCandidate { candidate: IceCandidate },
    Offer { sdp: String },
    Answer { sdp: String },
    Pranswer { sdp: String },
}

impl WireMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// The session description carried by an offer or answer.
    pub fn description(&self) -> Option<SessionDescription> {
        let (kind, sdp) = match self {
            WireMessage::Offer { sdp } => (SdpKind::Offer, sdp),
            WireMessage::Answer { sdp } => (SdpKind::Answer, sdp),
            WireMessage::Pranswer { sdp } => (SdpKind::Pranswer, sdp),
            WireMessage::NewCandidate { .. } => return None,
        };
        Some(SessionDescription {
            kind,
            sdp: sdp.clone(),
        })
    }
}

impl From<SessionDescription> for WireMessage {
    fn from(description: SessionDescription) -> Self {
        let sdp = description.sdp;
        match description.kind {
            SdpKind::Offer => WireMessage::Offer { sdp },
            SdpKind::Answer => WireMessage::Answer { sdp },
            SdpKind::Pranswer => WireMessage::Pranswer { sdp },
        }
    }
}
