//! Client side of a peer-to-peer negotiation: a [`Session`] drives a direct
//! transport and a signaling channel, relays transport candidates through the
//! channel and publishes what happens as events.
//!
//! ```no_run
//! use ssc_peer::{
//!     Capability, EventKind, PeerConfig, PeerEvent, Platform, Session, SessionListener,
//!     WebRtcTransportFactory, WebSocketChannelFactory,
//! };
//! use std::sync::Arc;
//!
//! # fn probe() -> Box<dyn ssc_peer::PlatformProbe> { unimplemented!() }
//! # async fn run() {
//! ssc_peer::logger::init();
//!
//! let platform = Platform {
//!     capability: Capability::detect(probe().as_ref()),
//!     transports: Arc::new(WebRtcTransportFactory::try_current().unwrap()),
//!     channels: Arc::new(WebSocketChannelFactory::try_current().unwrap()),
//! };
//! let config = PeerConfig::from_json(r#"{ "channelUrl": "wss://signal.example.org" }"#).unwrap();
//!
//! let session = Session::new(config, platform);
//! session
//!     .on(EventKind::Media, SessionListener::new(|session, event| {
//!         if let PeerEvent::Media(media) = event {
//!             session.stream(&media.media);
//!         }
//!     }))
//!     .connect();
//! # }
//! ```

pub mod capability;
pub mod config;
pub mod error;
pub mod events;
pub mod logger;
pub mod media;
pub mod presenter;
pub mod session;
pub mod signaling;
pub mod transport;
pub mod utils;

pub use capability::{Capability, PlatformProbe, Variant};
pub use config::{IceOptions, IceTransportPolicy, MediaConstraints, PeerConfig, ServerConfig};
pub use error::{
    ChannelError, ConfigError, MediaError, PeerError, SurfaceError, TransportError,
};
pub use events::{EventHub, EventKind, Listener, MediaEvent, MediaOrigin, PeerEvent};
pub use media::{MediaCapture, MediaHandle, MediaTrack, TrackKind};
pub use presenter::{ObjectUrls, Presenter, Surface};
pub use session::{
    ChannelSink, MediaSink, Platform, Session, SessionListener, SessionState, TransportSink,
};
pub use signaling::{
    ChannelEvent, ChannelFactory, ChannelMessage, SignalingChannel, WebSocketChannelFactory,
    WireMessage,
};
pub use transport::{
    DirectTransport, IceCandidate, SdpKind, SessionDescription, TransportConfig,
    TransportFactory, WebRtcTransportFactory,
};
