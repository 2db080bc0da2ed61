use super::ice::{analyze_candidates, apply_pending_candidates, PendingCandidates};
use super::{
    DirectTransport, IceCandidate, SdpKind, SessionDescription, TransportConfig, TransportFactory,
};
use crate::config::{IceTransportPolicy, ServerConfig};
use crate::error::TransportError;
use crate::logger::dump_candidate;
use crate::media::{MediaHandle, MediaTrack, TrackKind};
use crate::session::TransportSink;
use crate::utils::add_ice_url_scheme;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

const DEFAULT_CANDIDATE_POOL_SIZE: u8 = 10;

/// Builds webrtc-rs peer connections on the given tokio runtime.
#[derive(Debug, Clone)]
pub struct WebRtcTransportFactory {
    runtime: Handle,
}

impl WebRtcTransportFactory {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl TransportFactory for WebRtcTransportFactory {
    fn create(
        &self,
        config: &TransportConfig,
        sink: TransportSink,
    ) -> Result<Arc<dyn DirectTransport>, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.runtime.spawn(run_peer(rtc_config(config), sink, rx));
        Ok(Arc::new(WebRtcTransport { commands: tx }))
    }
}

enum Command {
    AddStream(MediaHandle),
    CreateOffer,
    CreateAnswer,
    AddCandidate(IceCandidate),
    SetRemote(SessionDescription),
    Close,
}

/// Handle to a peer connection owned by a background task. Commands are
/// applied in the order they were issued.
struct WebRtcTransport {
    commands: mpsc::UnboundedSender<Command>,
}

impl WebRtcTransport {
    fn submit(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("peer connection task has stopped, dropping command");
        }
    }
}

impl DirectTransport for WebRtcTransport {
    fn add_stream(&self, media: &MediaHandle) {
        self.submit(Command::AddStream(media.clone()));
    }

    fn create_offer(&self) {
        self.submit(Command::CreateOffer);
    }

    fn create_answer(&self) {
        self.submit(Command::CreateAnswer);
    }

    fn add_ice_candidate(&self, candidate: IceCandidate) {
        self.submit(Command::AddCandidate(candidate));
    }

    fn set_remote_description(&self, description: SessionDescription) {
        self.submit(Command::SetRemote(description));
    }

    fn close(&self) {
        self.submit(Command::Close);
    }
}

async fn run_peer(
    config: RTCConfiguration,
    sink: TransportSink,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let pc = match new_peer(config, sink.clone()).await {
        Ok(pc) => pc,
        Err(e) => {
            warn!("Failed to create peer connection: {}", e);
            sink.failed(e);
            return;
        }
    };

    let mut pending = PendingCandidates::default();

    while let Some(command) = commands.recv().await {
        let result = match command {
            Command::AddStream(media) => add_stream(&pc, &media).await,
            Command::CreateOffer => create_local(&pc, SdpKind::Offer, &sink).await,
            Command::CreateAnswer => create_local(&pc, SdpKind::Answer, &sink).await,
            Command::AddCandidate(candidate) => {
                if pc.remote_description().await.is_some() {
                    pc.add_ice_candidate(candidate.into())
                        .await
                        .map_err(TransportError::from)
                } else {
                    pending.push(candidate);
                    Ok(())
                }
            }
            Command::SetRemote(description) => {
                let offered = description.kind == SdpKind::Offer;
                match set_remote(&pc, description).await {
                    Ok(()) => {
                        apply_pending_candidates(&pc, &mut pending).await;
                        if offered {
                            create_local(&pc, SdpKind::Answer, &sink).await
                        } else {
                            Ok(())
                        }
                    }
                    Err(e) => Err(e),
                }
            }
            Command::Close => break,
        };

        if let Err(e) = result {
            warn!("Peer connection command failed: {}", e);
            sink.failed(e);
        }
    }

    info!("Closing peer connection");
    if let Err(e) = pc.close().await {
        warn!("Failed to close peer connection: {}", e);
    }
}

async fn new_peer(
    config: RTCConfiguration,
    sink: TransportSink,
) -> Result<Arc<RTCPeerConnection>, TransportError> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let pc = Arc::new(api.new_peer_connection(config).await?);

    let gathered: Arc<Mutex<Vec<IceCandidate>>> = Arc::new(Mutex::new(Vec::new()));
    let candidate_sink = sink.clone();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        match cand {
            Some(c) => match c.to_json() {
                Ok(init) => {
                    let candidate = IceCandidate::from(init);
                    dump_candidate("LOCAL", &candidate);
                    gathered.lock().push(candidate.clone());
                    candidate_sink.ice_candidate(Some(candidate));
                }
                Err(e) => warn!("Failed to serialize local candidate: {:?}", e),
            },
            None => {
                // a null candidate ends gathering
                debug!("ICE candidate gathering completed (null candidate received)");
                analyze_candidates(&gathered.lock());
                candidate_sink.ice_candidate(None);
            }
        }
        Box::pin(async {})
    }));

    pc.on_ice_gathering_state_change(Box::new(move |state| {
        debug!("ICE gathering state changed to: {:?}", state);
        Box::pin(async {})
    }));

    let announced: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    let track_sink = sink.clone();
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            let stream_id = track.stream_id().to_string();
            // one media event per remote stream, on its first track
            if announced.lock().insert(stream_id.clone()) {
                info!("Remote stream {} arrived", stream_id);
                track_sink.remote_media(remote_handle(&track, stream_id));
            } else {
                debug!("Additional track {} on remote stream {}", track.id(), stream_id);
            }
            Box::pin(async {})
        },
    ));

    let state_sink = sink;
    pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
        info!("Peer connection state changed to: {:?}", st);
        if st == RTCPeerConnectionState::Failed {
            state_sink.failed(TransportError::ConnectionFailed);
        }
        Box::pin(async {})
    }));

    Ok(pc)
}

fn remote_handle(track: &TrackRemote, stream_id: String) -> MediaHandle {
    let kind = match track.kind() {
        RTPCodecType::Audio => Some(TrackKind::Audio),
        RTPCodecType::Video => Some(TrackKind::Video),
        _ => None,
    };

    MediaHandle {
        id: stream_id,
        tracks: kind
            .map(|kind| MediaTrack {
                id: track.id().to_string(),
                kind,
            })
            .into_iter()
            .collect(),
    }
}

fn codec_for(kind: TrackKind) -> RTCRtpCodecCapability {
    match kind {
        TrackKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        },
        TrackKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
    }
}

async fn add_stream(pc: &RTCPeerConnection, media: &MediaHandle) -> Result<(), TransportError> {
    for track in &media.tracks {
        let local = Arc::new(TrackLocalStaticSample::new(
            codec_for(track.kind),
            track.id.clone(),
            media.id.clone(),
        ));
        pc.add_track(local as Arc<dyn TrackLocal + Send + Sync>)
            .await?;
        debug!("Added {:?} track {} of stream {}", track.kind, track.id, media.id);
    }
    Ok(())
}

/// Creates an offer or an answer, applies it locally (which starts
/// candidate gathering) and hands it to the session.
async fn create_local(
    pc: &RTCPeerConnection,
    kind: SdpKind,
    sink: &TransportSink,
) -> Result<(), TransportError> {
    let desc = match kind {
        SdpKind::Offer => pc.create_offer(None).await?,
        SdpKind::Answer | SdpKind::Pranswer => pc.create_answer(None).await?,
    };
    let local = local_description(&desc)?;
    pc.set_local_description(desc).await?;
    info!("Local {:?} set, gathering candidates", local.kind);
    sink.local_description(local);
    Ok(())
}

fn local_description(desc: &RTCSessionDescription) -> Result<SessionDescription, TransportError> {
    let kind = match desc.sdp_type {
        RTCSdpType::Offer => SdpKind::Offer,
        RTCSdpType::Answer => SdpKind::Answer,
        RTCSdpType::Pranswer => SdpKind::Pranswer,
        other => {
            return Err(TransportError::Description(format!(
                "unexpected local description type {other}"
            )))
        }
    };
    Ok(SessionDescription {
        kind,
        sdp: desc.sdp.clone(),
    })
}

async fn set_remote(
    pc: &RTCPeerConnection,
    description: SessionDescription,
) -> Result<(), TransportError> {
    let desc = match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
        SdpKind::Pranswer => RTCSessionDescription::pranswer(description.sdp),
    }
    .map_err(|e| TransportError::Description(e.to_string()))?;

    pc.set_remote_description(desc).await?;
    debug!("Remote description set successfully");
    Ok(())
}

/// Peer connection configuration for the given relay settings.
fn rtc_config(config: &TransportConfig) -> RTCConfiguration {
    let options = config.ice_options.clone().unwrap_or_default();

    RTCConfiguration {
        ice_servers: ice_servers(&config.ice_servers),
        ice_candidate_pool_size: options
            .candidate_pool_size
            .unwrap_or(DEFAULT_CANDIDATE_POOL_SIZE),
        ice_transport_policy: match options.transport_policy {
            Some(IceTransportPolicy::Relay) => RTCIceTransportPolicy::Relay,
            Some(IceTransportPolicy::All) | None => RTCIceTransportPolicy::All,
        },
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

fn ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|server| RTCIceServer {
            urls: server
                .urls
                .iter()
                .map(|url| add_ice_url_scheme(server, url))
                .collect(),
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IceOptions, PeerConfig};

    #[test]
    fn default_config_policies() {
        let config = TransportConfig::from(&PeerConfig::new("ws://localhost"));
        let rtc = rtc_config(&config);

        assert_eq!(rtc.ice_candidate_pool_size, DEFAULT_CANDIDATE_POOL_SIZE);
        assert_eq!(rtc.ice_transport_policy, RTCIceTransportPolicy::All);
        assert_eq!(rtc.bundle_policy, RTCBundlePolicy::MaxBundle);
        assert_eq!(rtc.rtcp_mux_policy, RTCRtcpMuxPolicy::Require);
        assert_eq!(
            rtc.ice_servers[0].urls,
            vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string()
            ]
        );
    }

    #[test]
    fn ice_options_override_defaults() {
        let config = TransportConfig {
            ice_servers: vec![ServerConfig {
                id: None,
                r#type: Some("turn".into()),
                urls: vec!["relay.example.org:3478".into()],
                username: Some("user".into()),
                credential: Some("secret".into()),
            }],
            ice_options: Some(IceOptions {
                candidate_pool_size: Some(1),
                transport_policy: Some(IceTransportPolicy::Relay),
            }),
        };
        let rtc = rtc_config(&config);

        assert_eq!(rtc.ice_candidate_pool_size, 1);
        assert_eq!(rtc.ice_transport_policy, RTCIceTransportPolicy::Relay);
        assert_eq!(rtc.ice_servers[0].urls, vec!["turn:relay.example.org:3478"]);
        assert_eq!(rtc.ice_servers[0].username, "user");
        assert_eq!(rtc.ice_servers[0].credential, "secret");
    }

    #[test]
    fn local_descriptions_keep_their_type() {
        let offer: RTCSessionDescription =
            serde_json::from_str(r#"{"type":"offer","sdp":"v=0"}"#).unwrap();
        assert_eq!(
            local_description(&offer).unwrap(),
            SessionDescription {
                kind: SdpKind::Offer,
                sdp: "v=0".into(),
            }
        );

        let rollback: RTCSessionDescription =
            serde_json::from_str(r#"{"type":"rollback","sdp":""}"#).unwrap();
        assert!(local_description(&rollback).is_err());
    }

    #[test]
    fn codecs_follow_track_kind() {
        assert_eq!(codec_for(TrackKind::Audio).mime_type, MIME_TYPE_OPUS);
        assert_eq!(codec_for(TrackKind::Video).mime_type, MIME_TYPE_VP8);
        assert_eq!(codec_for(TrackKind::Video).clock_rate, 90000);
    }
}
