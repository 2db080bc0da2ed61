//! The negotiation session.
//!
//! A [`Session`] owns at most one direct transport and one signaling
//! channel. It creates them on [`Session::connect`], relays local transport
//! candidates and session descriptions over the channel, and republishes everything the transport,
//! the channel and media capture report as [`PeerEvent`]s. What the remote
//! peer sends is handed to the application untouched (`signal`).
//!
//! Collaborators call back through the sink they were created with
//! ([`TransportSink`], [`ChannelSink`], [`MediaSink`]). Sinks hold the
//! session weakly and are tied to the handles they were issued for: after
//! [`Session::close`] they go quiet.
//!
//! Listeners receive the session as their first argument; capturing a
//! session clone inside a listener keeps it alive forever.

use crate::capability::{Capability, Variant};
use crate::config::PeerConfig;
use crate::error::{ChannelError, MediaError, PeerError, TransportError};
use crate::events::{EventHub, EventKind, Listener, MediaEvent, MediaOrigin, PeerEvent};
use crate::logger::dump_candidate;
use crate::media::{MediaCapture, MediaHandle};
use crate::presenter::{Presenter, Surface};
use crate::signaling::{ChannelEvent, ChannelFactory, ChannelMessage, SignalingChannel, WireMessage};
use crate::transport::{
    DirectTransport, IceCandidate, SessionDescription, TransportConfig, TransportFactory,
};
use crate::utils::random_id;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

pub type SessionListener = Listener<Session, PeerEvent>;

/// Everything a session needs from the platform, decided once at startup.
#[derive(Clone)]
pub struct Platform {
    pub capability: Capability,
    pub transports: Arc<dyn TransportFactory>,
    pub channels: Arc<dyn ChannelFactory>,
}

/// Progress of the signaling track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No capture primitive on this platform; nothing will ever happen.
    Unsupported,
    Idle,
    /// Handles exist, the channel handshake is in flight.
    Connecting,
    ChannelOpen,
    Disconnected,
}

/// Open/close reported by a channel before its factory returned the handle.
enum EarlyReport {
    Opened(ChannelEvent),
    Closed(ChannelEvent),
}

#[derive(Default)]
struct ChannelSlot {
    handle: Option<Arc<dyn SignalingChannel>>,
    early: Vec<EarlyReport>,
}

#[derive(Default)]
struct Outbox {
    open: bool,
    queued: Vec<String>,
}

struct Inner {
    id: String,
    config: PeerConfig,
    capture: Option<Arc<dyn MediaCapture>>,
    presenter: Option<Presenter>,
    transports: Arc<dyn TransportFactory>,
    channels: Arc<dyn ChannelFactory>,
    hub: EventHub<EventKind, Session, PeerEvent>,
    transport: Mutex<Option<Arc<dyn DirectTransport>>>,
    channel: Mutex<ChannelSlot>,
    outbox: Mutex<Outbox>,
    state: Mutex<SessionState>,
    connecting: Mutex<()>,
    generation: AtomicU64,
    media_ready: AtomicBool,
    failed: AtomicBool,
    unsupported_reported: AtomicBool,
}

/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    pub fn new(config: PeerConfig, platform: Platform) -> Self {
        let (capture, presenter, state) = match platform.capability {
            Capability::Supported { variant, capture } => (
                Some(capture),
                Some(Presenter::for_variant(variant)),
                SessionState::Idle,
            ),
            Capability::Unsupported => (None, None, SessionState::Unsupported),
        };

        let session = Session {
            inner: Arc::new(Inner {
                id: random_id(),
                config,
                capture,
                presenter,
                transports: platform.transports,
                channels: platform.channels,
                hub: EventHub::new(),
                transport: Mutex::new(None),
                channel: Mutex::new(ChannelSlot::default()),
                outbox: Mutex::new(Outbox::default()),
                state: Mutex::new(state),
                connecting: Mutex::new(()),
                generation: AtomicU64::new(0),
                media_ready: AtomicBool::new(false),
                failed: AtomicBool::new(false),
                unsupported_reported: AtomicBool::new(false),
            }),
        };

        if state == SessionState::Unsupported {
            warn!("WebRTC is not supported.");
            session.report_unsupported();
        } else {
            debug!("session {} created", session.inner.id);
        }
        session
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn config(&self) -> &PeerConfig {
        &self.inner.config
    }

    pub fn variant(&self) -> Option<Variant> {
        match self.inner.presenter {
            Some(Presenter::Standard) => Some(Variant::Standard),
            Some(Presenter::Moz) => Some(Variant::Moz),
            Some(Presenter::Webkit(_)) => Some(Variant::Webkit),
            None => None,
        }
    }

    pub fn presenter(&self) -> Option<&Presenter> {
        self.inner.presenter.as_ref()
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Whether outbound signaling is written immediately (rather than queued).
    pub fn is_channel_open(&self) -> bool {
        self.inner.outbox.lock().open
    }

    /// Local or remote media has been delivered at least once.
    pub fn is_media_ready(&self) -> bool {
        self.inner.media_ready.load(Ordering::SeqCst)
    }

    /// An error event (other than `NO_CANDIDATE`) has been emitted.
    pub fn has_failed(&self) -> bool {
        self.inner.failed.load(Ordering::SeqCst)
    }

    pub fn has_transport(&self) -> bool {
        self.inner.transport.lock().is_some()
    }

    pub fn has_channel(&self) -> bool {
        self.inner.channel.lock().handle.is_some()
    }

    /// Number of outbound signaling messages waiting for the channel.
    pub fn queued_signals(&self) -> usize {
        self.inner.outbox.lock().queued.len()
    }

    pub fn on(&self, kind: EventKind, listener: SessionListener) -> &Self {
        self.inner.hub.on(kind, listener);
        self
    }

    /// Publishes `event` to its listeners. `false` when nobody listens.
    pub fn emit(&self, event: PeerEvent) -> bool {
        self.inner.hub.emit(event.kind(), self, &event)
    }

    /// Creates whichever of the transport and the channel is missing, then
    /// asks for local media. Returns at once; results arrive as events.
    pub fn connect(&self) -> &Self {
        let Some(capture) = self.inner.capture.clone() else {
            self.report_unsupported();
            return self;
        };

        // a listener reacting to an event raised by a factory may call connect again
        let Some(_connecting) = self.inner.connecting.try_lock() else {
            debug!("connect already in progress");
            return self;
        };

        let generation = self.inner.generation.load(Ordering::SeqCst);
        let mut failures = Vec::new();
        let mut early = Vec::new();

        let needs_transport = self.inner.transport.lock().is_none();
        if needs_transport {
            let sink = TransportSink {
                link: self.link(generation),
            };
            match self
                .inner
                .transports
                .create(&TransportConfig::from(&self.inner.config), sink)
            {
                Ok(transport) => {
                    debug!("transport created");
                    *self.inner.transport.lock() = Some(transport);
                }
                Err(e) => {
                    warn!("Failed to create transport: {}", e);
                    failures.push(PeerError::Transport(e));
                }
            }
        }

        let needs_channel = self.inner.channel.lock().handle.is_none();
        if needs_channel {
            let sink = ChannelSink {
                link: self.link(generation),
            };
            let config = &self.inner.config;
            match self
                .inner
                .channels
                .open(&config.channel_url, &config.channel_protocols, sink)
            {
                Ok(channel) => {
                    info!("opening signaling channel {}", config.channel_url);
                    {
                        let mut slot = self.inner.channel.lock();
                        slot.handle = Some(channel);
                        early = std::mem::take(&mut slot.early);
                    }
                    let mut state = self.inner.state.lock();
                    if *state != SessionState::ChannelOpen {
                        *state = SessionState::Connecting;
                    }
                }
                Err(e) => {
                    warn!("Failed to open signaling channel: {}", e);
                    self.inner.channel.lock().early.clear();
                    failures.push(PeerError::Channel(e));
                }
            }
        }

        drop(_connecting);

        for report in early {
            match report {
                EarlyReport::Opened(event) => self.on_channel_open(event),
                EarlyReport::Closed(event) => self.on_channel_close(event),
            }
        }

        for failure in failures {
            self.fail(failure);
        }

        capture.acquire(
            &self.inner.config.media,
            MediaSink {
                link: self.link(generation),
            },
        );
        self
    }

    /// Renders `media` on `surface` the way the detected platform variant
    /// requires.
    pub fn play(&self, media: &MediaHandle, surface: &mut dyn Surface) -> &Self {
        match &self.inner.presenter {
            Some(presenter) => presenter.play(media, surface),
            None => self.report_unsupported(),
        }
        self
    }

    /// Offers local media to the remote peer. Ignored before `connect`.
    pub fn stream(&self, media: &MediaHandle) -> &Self {
        if let Some(transport) = self.live_transport("stream") {
            debug!("streaming local media {}", media.id);
            transport.add_stream(media);
        }
        self
    }

    /// Starts negotiation from this side. The offer is sent over the
    /// signaling channel once the transport has produced it.
    pub fn create_offer(&self) -> &Self {
        if let Some(transport) = self.live_transport("create_offer") {
            transport.create_offer();
        }
        self
    }

    /// Answers a remote offer applied with `apply_remote_description`.
    /// Transports answer offers on their own; this is for applications that
    /// want to answer again.
    pub fn create_answer(&self) -> &Self {
        if let Some(transport) = self.live_transport("create_answer") {
            transport.create_answer();
        }
        self
    }

    /// Hands a candidate received from the remote peer to the transport.
    pub fn apply_remote_candidate(&self, candidate: IceCandidate) -> &Self {
        if let Some(transport) = self.live_transport("apply_remote_candidate") {
            dump_candidate("REMOTE", &candidate);
            transport.add_ice_candidate(candidate);
        }
        self
    }

    pub fn apply_remote_description(&self, description: SessionDescription) -> &Self {
        if let Some(transport) = self.live_transport("apply_remote_description") {
            debug!("applying remote {:?}", description.kind);
            transport.set_remote_description(description);
        }
        self
    }

    /// Sends an application message over the signaling channel, queuing it
    /// until the channel is open.
    pub fn send_signal(&self, text: impl Into<String>) -> &Self {
        if self.inner.capture.is_none() {
            self.report_unsupported();
            return self;
        }
        self.send_or_queue(text.into());
        self
    }

    /// Tears the session down: closes the channel and the transport, drops
    /// queued signaling and silences callbacks from the released handles.
    /// A later `connect` starts over with new handles.
    pub fn close(&self) -> &Self {
        if self.inner.capture.is_none() {
            self.report_unsupported();
            return self;
        }

        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let channel = {
            let mut slot = self.inner.channel.lock();
            slot.early.clear();
            slot.handle.take()
        };
        let transport = self.inner.transport.lock().take();
        let was_open = {
            let mut outbox = self.inner.outbox.lock();
            let was_open = outbox.open;
            *outbox = Outbox::default();
            was_open
        };

        if let Some(transport) = transport {
            transport.close();
        }

        match channel {
            Some(channel) => {
                channel.close();
                *self.inner.state.lock() = SessionState::Disconnected;
                info!("session {} closed", self.inner.id);
                if was_open {
                    self.emit(PeerEvent::Disconnect(ChannelEvent {
                        code: Some(1000),
                        reason: Some("session closed".into()),
                        ..ChannelEvent::new(self.inner.config.channel_url.clone())
                    }));
                }
            }
            None => *self.inner.state.lock() = SessionState::Idle,
        }
        self
    }

    fn link(&self, generation: u64) -> Link {
        Link {
            session: Arc::downgrade(&self.inner),
            generation,
        }
    }

    fn live_transport(&self, operation: &str) -> Option<Arc<dyn DirectTransport>> {
        if self.inner.capture.is_none() {
            self.report_unsupported();
            return None;
        }
        let transport = self.inner.transport.lock().clone();
        if transport.is_none() {
            warn!("{} called before connect; ignoring", operation);
        }
        transport
    }

    /// Delivers `UNSUPPORTED` once, to the first `error` listeners. Claimed
    /// before emitting: listeners may call back into the session.
    fn report_unsupported(&self) {
        if self.inner.hub.listener_count(EventKind::Error) == 0 {
            return;
        }
        if self.inner.unsupported_reported.swap(true, Ordering::SeqCst) {
            return;
        }
        self.fail(PeerError::Unsupported);
    }

    fn fail(&self, error: PeerError) {
        self.inner.failed.store(true, Ordering::SeqCst);
        self.emit(PeerEvent::Error(error));
    }

    fn send_or_queue(&self, text: String) {
        {
            let mut outbox = self.inner.outbox.lock();
            if !outbox.open {
                debug!("signaling channel not open, queuing message");
                outbox.queued.push(text);
                return;
            }
        }
        self.send_now(text);
    }

    fn send_now(&self, text: String) {
        let channel = self.inner.channel.lock().handle.clone();
        match channel {
            Some(channel) => {
                if let Err(e) = channel.send(text) {
                    warn!("Failed to send signaling message: {}", e);
                    self.fail(PeerError::Channel(e));
                }
            }
            None => warn!("no signaling channel, dropping message"),
        }
    }

    fn on_candidate(&self, candidate: Option<IceCandidate>) {
        match candidate {
            Some(candidate) => match (WireMessage::NewCandidate { candidate }).to_json() {
                Ok(text) => self.send_or_queue(text),
                Err(e) => self.fail(PeerError::Channel(ChannelError::Encode(e))),
            },
            None => {
                debug!("candidate gathering finished");
                self.emit(PeerEvent::Error(PeerError::NoCandidate));
            }
        }
    }

    fn on_local_description(&self, description: SessionDescription) {
        debug!("relaying local {:?}", description.kind);
        match WireMessage::from(description).to_json() {
            Ok(text) => self.send_or_queue(text),
            Err(e) => self.fail(PeerError::Channel(ChannelError::Encode(e))),
        }
    }

    fn on_remote_media(&self, media: MediaHandle) {
        self.inner.media_ready.store(true, Ordering::SeqCst);
        self.emit(PeerEvent::Media(MediaEvent {
            origin: MediaOrigin::Remote,
            media,
        }));
    }

    fn on_channel_open(&self, event: ChannelEvent) {
        {
            let mut slot = self.inner.channel.lock();
            if slot.handle.is_none() {
                // replayed by `connect` once the handle is stored
                slot.early.push(EarlyReport::Opened(event));
                return;
            }
        }

        // flush in order; messages queued while flushing go out in a later round
        loop {
            let batch = {
                let mut outbox = self.inner.outbox.lock();
                if outbox.queued.is_empty() {
                    outbox.open = true;
                    break;
                }
                std::mem::take(&mut outbox.queued)
            };
            debug!("flushing {} queued signaling messages", batch.len());
            for text in batch {
                self.send_now(text);
            }
        }

        *self.inner.state.lock() = SessionState::ChannelOpen;
        info!("Client can send signals now.");
        self.emit(PeerEvent::Connect(event));
    }

    /// The dead handle is released; the next `connect` opens a new channel
    /// and flushes whatever was queued meanwhile.
    fn on_channel_close(&self, event: ChannelEvent) {
        {
            let mut slot = self.inner.channel.lock();
            if slot.handle.take().is_none() {
                slot.early.push(EarlyReport::Closed(event));
                return;
            }
        }
        self.inner.outbox.lock().open = false;
        *self.inner.state.lock() = SessionState::Disconnected;
        info!("Client is not able to send signals now.");
        self.emit(PeerEvent::Disconnect(event));
    }

    fn on_local_media(&self, result: Result<MediaHandle, MediaError>) {
        match result {
            Ok(media) => {
                debug!("local media {} acquired", media.id);
                self.inner.media_ready.store(true, Ordering::SeqCst);
                self.emit(PeerEvent::Media(MediaEvent {
                    origin: MediaOrigin::Local,
                    media,
                }));
            }
            Err(e) => {
                warn!("Failed to acquire local media: {}", e);
                self.fail(PeerError::Media(e));
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("channel_open", &self.is_channel_open())
            .finish()
    }
}

/// Weak reference to the session, valid for one handle generation.
#[derive(Clone)]
struct Link {
    session: Weak<Inner>,
    generation: u64,
}

impl Link {
    fn session(&self) -> Option<Session> {
        let inner = self.session.upgrade()?;
        if inner.generation.load(Ordering::SeqCst) != self.generation {
            debug!("ignoring callback from a released handle");
            return None;
        }
        Some(Session { inner })
    }
}

/// How a direct transport reports back to its session.
#[derive(Clone)]
pub struct TransportSink {
    link: Link,
}

impl TransportSink {
    /// `None` signals that gathering finished.
    pub fn ice_candidate(&self, candidate: Option<IceCandidate>) {
        if let Some(session) = self.link.session() {
            session.on_candidate(candidate);
        }
    }

    /// A local offer or answer, already applied to the transport.
    pub fn local_description(&self, description: SessionDescription) {
        if let Some(session) = self.link.session() {
            session.on_local_description(description);
        }
    }

    pub fn remote_media(&self, media: MediaHandle) {
        if let Some(session) = self.link.session() {
            session.on_remote_media(media);
        }
    }

    pub fn failed(&self, error: TransportError) {
        if let Some(session) = self.link.session() {
            session.fail(PeerError::Transport(error));
        }
    }
}

/// How a signaling channel reports back to its session.
#[derive(Clone)]
pub struct ChannelSink {
    link: Link,
}

impl ChannelSink {
    pub fn opened(&self, event: ChannelEvent) {
        if let Some(session) = self.link.session() {
            session.on_channel_open(event);
        }
    }

    pub fn closed(&self, event: ChannelEvent) {
        if let Some(session) = self.link.session() {
            session.on_channel_close(event);
        }
    }

    pub fn message(&self, message: ChannelMessage) {
        if let Some(session) = self.link.session() {
            session.emit(PeerEvent::Signal(message));
        }
    }

    pub fn error(&self, error: ChannelError) {
        if let Some(session) = self.link.session() {
            session.fail(PeerError::Channel(error));
        }
    }
}

/// How media capture reports back to its session.
#[derive(Clone)]
pub struct MediaSink {
    link: Link,
}

impl MediaSink {
    pub fn succeeded(&self, media: MediaHandle) {
        self.complete(Ok(media));
    }

    pub fn failed(&self, error: MediaError) {
        self.complete(Err(error));
    }

    pub fn complete(&self, result: Result<MediaHandle, MediaError>) {
        if let Some(session) = self.link.session() {
            session.on_local_media(result);
        }
    }
}
