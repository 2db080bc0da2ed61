use crate::config::MediaConstraints;
use crate::session::MediaSink;
use crate::utils::random_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
}

/// Opaque handle to a stream of tracks, either captured locally or
/// received from the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHandle {
    pub id: String,
    pub tracks: Vec<MediaTrack>,
}

impl MediaHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tracks: Vec::new(),
        }
    }

    /// A handle with one fresh track per requested kind.
    pub fn for_constraints(constraints: &MediaConstraints) -> Self {
        let mut handle = Self::new(random_id());
        if constraints.audio {
            handle = handle.with_track(TrackKind::Audio);
        }
        if constraints.video {
            handle = handle.with_track(TrackKind::Video);
        }
        handle
    }

    pub fn with_track(mut self, kind: TrackKind) -> Self {
        self.tracks.push(MediaTrack {
            id: random_id(),
            kind,
        });
        self
    }

    pub fn has(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind == kind)
    }
}

/// Platform primitive that captures local devices.
///
/// `acquire` must return without waiting for the devices; the outcome is
/// reported later through `sink`, exactly once.
pub trait MediaCapture: Send + Sync {
    fn acquire(&self, constraints: &MediaConstraints, sink: MediaSink);
}
