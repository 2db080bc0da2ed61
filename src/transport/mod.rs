//! Direct peer transport boundary.
//!
//! The session only sees [`DirectTransport`] and [`TransportFactory`];
//! [`connection`] provides the webrtc-rs backed implementation.

pub mod connection;
pub mod ice;

use crate::config::{IceOptions, PeerConfig, ServerConfig};
use crate::error::TransportError;
use crate::media::MediaHandle;
use crate::session::TransportSink;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use connection::WebRtcTransportFactory;

/// A transport candidate, in the JSON shape browsers use.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
    Pranswer,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

/// What a transport is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub ice_servers: Vec<ServerConfig>,
    pub ice_options: Option<IceOptions>,
}

impl From<&PeerConfig> for TransportConfig {
    fn from(config: &PeerConfig) -> Self {
        Self {
            ice_servers: config.ice_servers.clone(),
            ice_options: config.ice_options.clone(),
        }
    }
}

/// A point-to-point transport. Every call returns immediately; candidates,
/// remote media and failures come back through the [`TransportSink`] the
/// transport was created with.
pub trait DirectTransport: Send + Sync {
    /// Offers local media to the remote peer.
    fn add_stream(&self, media: &MediaHandle);
    /// Creates and applies a local offer. Candidate gathering starts here;
    /// the offer comes back through [`TransportSink::local_description`].
    fn create_offer(&self);
    /// Answers the remote offer already applied.
    fn create_answer(&self);
    fn add_ice_candidate(&self, candidate: IceCandidate);
    /// Applying a remote offer answers it without a separate `create_answer`.
    fn set_remote_description(&self, description: SessionDescription);
    fn close(&self);
}

pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        config: &TransportConfig,
        sink: TransportSink,
    ) -> Result<Arc<dyn DirectTransport>, TransportError>;
}
