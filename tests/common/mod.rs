#![allow(dead_code)]

use parking_lot::Mutex;
use ssc_peer::{
    Capability, ChannelError, ChannelEvent, ChannelFactory, ChannelSink, DirectTransport,
    EventKind, IceCandidate, MediaCapture, MediaConstraints, MediaHandle, MediaSink, PeerConfig,
    PeerEvent, Platform, Session, SessionDescription, SessionListener, SignalingChannel, Surface,
    SurfaceError, TransportConfig, TransportError, TransportFactory, TransportSink, Variant,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub const CHANNEL_URL: &str = "wss://signal.example.org/chapter1/signaling";

#[derive(Default)]
pub struct FakeTransport {
    pub streams: Mutex<Vec<MediaHandle>>,
    pub candidates: Mutex<Vec<IceCandidate>>,
    pub descriptions: Mutex<Vec<SessionDescription>>,
    pub offers: AtomicUsize,
    pub answers: AtomicUsize,
    pub closed: AtomicBool,
}

impl DirectTransport for FakeTransport {
    fn add_stream(&self, media: &MediaHandle) {
        self.streams.lock().push(media.clone());
    }

    fn create_offer(&self) {
        self.offers.fetch_add(1, Ordering::SeqCst);
    }

    fn create_answer(&self) {
        self.answers.fetch_add(1, Ordering::SeqCst);
    }

    fn add_ice_candidate(&self, candidate: IceCandidate) {
        self.candidates.lock().push(candidate);
    }

    fn set_remote_description(&self, description: SessionDescription) {
        self.descriptions.lock().push(description);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeTransports {
    created: Mutex<Vec<(Arc<FakeTransport>, TransportSink, TransportConfig)>>,
    pub fail: AtomicBool,
    /// Reported through the sink before `create` returns.
    pub gather_on_create: Mutex<Option<IceCandidate>>,
}

impl FakeTransports {
    pub fn count(&self) -> usize {
        self.created.lock().len()
    }

    pub fn transport(&self, index: usize) -> Arc<FakeTransport> {
        self.created.lock()[index].0.clone()
    }

    pub fn sink(&self, index: usize) -> TransportSink {
        self.created.lock()[index].1.clone()
    }

    pub fn config(&self, index: usize) -> TransportConfig {
        self.created.lock()[index].2.clone()
    }
}

impl TransportFactory for FakeTransports {
    fn create(
        &self,
        config: &TransportConfig,
        sink: TransportSink,
    ) -> Result<Arc<dyn DirectTransport>, TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if let Some(candidate) = self.gather_on_create.lock().clone() {
            sink.ice_candidate(Some(candidate));
        }
        let transport = Arc::new(FakeTransport::default());
        self.created
            .lock()
            .push((transport.clone(), sink, config.clone()));
        Ok(transport)
    }
}

#[derive(Default)]
pub struct FakeChannel {
    pub sent: Mutex<Vec<String>>,
    pub closed: AtomicBool,
    pub fail_send: AtomicBool,
}

impl SignalingChannel for FakeChannel {
    fn send(&self, text: String) -> Result<(), ChannelError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ChannelError::Other("socket is not open".into()));
        }
        self.sent.lock().push(text);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct OpenedChannel {
    pub url: String,
    pub protocols: Vec<String>,
    pub channel: Arc<FakeChannel>,
    pub sink: ChannelSink,
}

#[derive(Default)]
pub struct FakeChannels {
    opened: Mutex<Vec<Arc<OpenedChannel>>>,
    /// Report `opened` before `open` returns.
    pub open_immediately: AtomicBool,
    /// Report `closed` before `open` returns, as a refused connection does.
    pub close_immediately: AtomicBool,
}

impl FakeChannels {
    pub fn count(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn get(&self, index: usize) -> Arc<OpenedChannel> {
        self.opened.lock()[index].clone()
    }

    pub fn sent(&self, index: usize) -> Vec<String> {
        self.get(index).channel.sent.lock().clone()
    }
}

impl ChannelFactory for FakeChannels {
    fn open(
        &self,
        url: &str,
        protocols: &[String],
        sink: ChannelSink,
    ) -> Result<Arc<dyn SignalingChannel>, ChannelError> {
        let channel = Arc::new(FakeChannel::default());
        self.opened.lock().push(Arc::new(OpenedChannel {
            url: url.to_string(),
            protocols: protocols.to_vec(),
            channel: channel.clone(),
            sink: sink.clone(),
        }));
        if self.open_immediately.load(Ordering::SeqCst) {
            sink.opened(ChannelEvent::new(url));
        }
        if self.close_immediately.load(Ordering::SeqCst) {
            sink.closed(ChannelEvent {
                code: Some(1006),
                ..ChannelEvent::new(url)
            });
        }
        Ok(channel)
    }
}

#[derive(Default)]
pub struct FakeCapture {
    requests: Mutex<Vec<(MediaConstraints, MediaSink)>>,
}

impl FakeCapture {
    pub fn count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn sink(&self, index: usize) -> MediaSink {
        self.requests.lock()[index].1.clone()
    }

    pub fn constraints(&self, index: usize) -> MediaConstraints {
        self.requests.lock()[index].0
    }
}

impl MediaCapture for FakeCapture {
    fn acquire(&self, constraints: &MediaConstraints, sink: MediaSink) {
        self.requests.lock().push((*constraints, sink));
    }
}

/// Surface recording every call made on it.
#[derive(Default)]
pub struct RecordingSurface {
    pub ops: Vec<String>,
}

impl Surface for RecordingSurface {
    fn set_src_object(&mut self, media: &MediaHandle) {
        self.ops.push(format!("src_object={}", media.id));
    }

    fn set_vendor_src_object(&mut self, media: &MediaHandle) {
        self.ops.push(format!("vendor_src_object={}", media.id));
    }

    fn set_src(&mut self, url: &str) {
        self.ops.push(format!("src={url}"));
    }

    fn play(&mut self) -> Result<(), SurfaceError> {
        self.ops.push("play".into());
        Ok(())
    }
}

pub fn candidate(n: u32) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{n} 1 udp 2122260223 192.168.1.{n} 5400{n} typ host"),
        sdp_mid: Some("0".into()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}

/// One-line summary of an event, for assertions.
pub fn describe(event: &PeerEvent) -> String {
    match event {
        PeerEvent::Connect(_) => "connect".into(),
        PeerEvent::Disconnect(_) => "disconnect".into(),
        PeerEvent::Signal(msg) => format!("signal:{}", msg.as_text().unwrap_or("<binary>")),
        PeerEvent::Media(m) => format!("media:{:?}:{}", m.origin, m.media.id).to_lowercase(),
        PeerEvent::Error(e) => match e.type_tag() {
            Some(tag) => format!("error:{tag}"),
            None => format!("error:raw:{e}"),
        },
    }
}

pub struct Harness {
    pub session: Session,
    pub transports: Arc<FakeTransports>,
    pub channels: Arc<FakeChannels>,
    pub capture: Arc<FakeCapture>,
    pub events: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    pub fn new(variant: Variant) -> Self {
        let capture = Arc::new(FakeCapture::default());
        Self::build(Capability::supported(variant, capture.clone()), capture)
    }

    pub fn unsupported() -> Self {
        Self::build(Capability::Unsupported, Arc::new(FakeCapture::default()))
    }

    fn build(capability: Capability, capture: Arc<FakeCapture>) -> Self {
        let transports = Arc::new(FakeTransports::default());
        let channels = Arc::new(FakeChannels::default());
        let mut config = PeerConfig::new(CHANNEL_URL);
        config.channel_protocols = vec!["peer-v1".into()];

        let session = Session::new(
            config,
            Platform {
                capability,
                transports: transports.clone(),
                channels: channels.clone(),
            },
        );

        Self {
            session,
            transports,
            channels,
            capture,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Records every event kind into `events`.
    pub fn record(self) -> Self {
        let events = self.events.clone();
        let recorder = SessionListener::new(move |_, event| events.lock().push(describe(event)));
        for kind in EventKind::ALL {
            self.session.on(kind, recorder.clone());
        }
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }
}
