use thiserror::Error;

/// Payload of the `error` event.
///
/// Errors raised by the session itself carry a type tag (`UNSUPPORTED`,
/// `NO_CANDIDATE`); failures reported by a collaborator are passed through
/// as they were received.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("real-time communication is not supported on this platform")]
    Unsupported,

    #[error("candidate gathering finished without producing a candidate")]
    NoCandidate,

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl PeerError {
    pub const UNSUPPORTED: &'static str = "UNSUPPORTED";
    pub const NO_CANDIDATE: &'static str = "NO_CANDIDATE";

    /// Discriminator of errors the session originates; `None` for raw ones.
    pub fn type_tag(&self) -> Option<&'static str> {
        match self {
            PeerError::Unsupported => Some(Self::UNSUPPORTED),
            PeerError::NoCandidate => Some(Self::NO_CANDIDATE),
            PeerError::Channel(_) | PeerError::Media(_) | PeerError::Transport(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid signaling request: {0}")]
    InvalidRequest(String),

    #[error("failed to encode signaling message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("signaling channel is closed")]
    Closed,

    #[error("signaling channel error: {0}")]
    Other(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("permission to capture media was denied")]
    PermissionDenied,

    #[error("no capture device for {0}")]
    DeviceNotFound(String),

    #[error("media capture failed: {0}")]
    Capture(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("webrtc error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("invalid session description: {0}")]
    Description(String),

    #[error("peer connection failed")]
    ConnectionFailed,

    #[error("transport is closed")]
    Closed,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("playback failed: {0}")]
    Playback(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("signaling channel url is empty")]
    EmptyChannelUrl,

    #[error("signaling channel url must use ws:// or wss://, got {0}")]
    ChannelScheme(String),

    #[error("relay server url cannot be empty")]
    EmptyServerUrl,

    #[error("TURN server {0} requires username and credential")]
    TurnCredentials(String),
}
