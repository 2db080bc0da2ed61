mod common;

use common::FakeCapture;
use parking_lot::Mutex;
use ssc_peer::{
    Capability, ChannelError, ChannelEvent, ChannelFactory, ChannelMessage, ChannelSink,
    EventKind, MediaConstraints, MediaHandle, PeerConfig, PeerEvent, Platform, Session,
    SessionListener, SignalingChannel, TrackKind, Variant, WebRtcTransportFactory, WireMessage,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Where messages for one side are delivered.
#[derive(Default)]
struct Mailbox {
    sink: Mutex<Option<ChannelSink>>,
}

struct LoopChannel {
    peer: Arc<Mailbox>,
}

impl SignalingChannel for LoopChannel {
    fn send(&self, text: String) -> Result<(), ChannelError> {
        let sink = self.peer.sink.lock().clone();
        match sink {
            Some(sink) => {
                sink.message(ChannelMessage::Text(text));
                Ok(())
            }
            None => Err(ChannelError::Closed),
        }
    }

    fn close(&self) {}
}

/// In-memory signaling between two sessions; channels open at once.
struct LoopChannels {
    own: Arc<Mailbox>,
    peer: Arc<Mailbox>,
}

impl ChannelFactory for LoopChannels {
    fn open(
        &self,
        url: &str,
        _protocols: &[String],
        sink: ChannelSink,
    ) -> Result<Arc<dyn SignalingChannel>, ChannelError> {
        *self.own.sink.lock() = Some(sink.clone());
        sink.opened(ChannelEvent::new(url));
        Ok(Arc::new(LoopChannel {
            peer: self.peer.clone(),
        }))
    }
}

fn wire_name(message: &WireMessage) -> &'static str {
    match message {
        WireMessage::NewCandidate { .. } => "NEW_CANDIDATE",
        WireMessage::Offer { .. } => "OFFER",
        WireMessage::Answer { .. } => "ANSWER",
        WireMessage::Pranswer { .. } => "PRANSWER",
    }
}

/// A session that applies whatever negotiation its peer sends and reports
/// `<name>:<what>` on `tx`.
fn peer(
    name: &'static str,
    own: Arc<Mailbox>,
    other: Arc<Mailbox>,
    tx: mpsc::UnboundedSender<String>,
) -> Session {
    let mut config = PeerConfig::new("ws://loopback");
    config.ice_servers = Vec::new();
    config.media = MediaConstraints {
        audio: true,
        video: false,
    };

    let session = Session::new(
        config,
        Platform {
            capability: Capability::supported(Variant::Standard, Arc::new(FakeCapture::default())),
            transports: Arc::new(WebRtcTransportFactory::try_current().unwrap()),
            channels: Arc::new(LoopChannels { own, peer: other }),
        },
    );

    let signals = tx.clone();
    session.on(
        EventKind::Signal,
        SessionListener::new(move |session, event| {
            let Some(message) = (match event {
                PeerEvent::Signal(msg) => msg.decode().ok(),
                _ => None,
            }) else {
                return;
            };
            let _ = signals.send(format!("{name}:signal:{}", wire_name(&message)));
            match (message.description(), message) {
                (Some(description), _) => {
                    session.apply_remote_description(description);
                }
                (None, WireMessage::NewCandidate { candidate }) => {
                    session.apply_remote_candidate(candidate);
                }
                (None, _) => {}
            }
        }),
    );
    session.on(
        EventKind::Error,
        SessionListener::new(move |_, event| {
            if let PeerEvent::Error(e) = event {
                let what = e.type_tag().map_or_else(|| e.to_string(), str::to_string);
                let _ = tx.send(format!("{name}:error:{what}"));
            }
        }),
    );
    session
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn offer_answer_and_gathering_over_loopback() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let alice_box = Arc::new(Mailbox::default());
    let bob_box = Arc::new(Mailbox::default());

    let bob = peer("bob", bob_box.clone(), alice_box.clone(), tx.clone());
    let alice = peer("alice", alice_box, bob_box, tx);

    bob.connect();
    alice.connect();
    assert!(alice.is_channel_open());
    assert!(bob.is_channel_open());

    alice
        .stream(&MediaHandle::new("mic").with_track(TrackKind::Audio))
        .create_offer();

    let expected: HashSet<&str> = [
        "bob:signal:OFFER",
        "alice:signal:ANSWER",
        "alice:error:NO_CANDIDATE",
        "bob:error:NO_CANDIDATE",
    ]
    .into_iter()
    .collect();
    let mut seen = HashSet::new();

    let collect = async {
        while let Some(event) = rx.recv().await {
            assert!(
                !event.contains(":error:") || event.ends_with("NO_CANDIDATE"),
                "unexpected failure {event}"
            );
            seen.insert(event);
            if expected.iter().all(|e| seen.contains(*e)) {
                break;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(20), collect)
        .await
        .unwrap_or_else(|_| panic!("negotiation stalled, saw {seen:?}"));

    alice.close();
    bob.close();
}
