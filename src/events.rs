//! Listener registry and the events a session publishes.
//!
//! The hub is generic over the event kind, the context handed to listeners
//! (the emitting session) and the payload, so it carries no knowledge of
//! sessions itself.

use crate::error::PeerError;
use crate::media::MediaHandle;
use crate::signaling::{ChannelEvent, ChannelMessage};
use parking_lot::Mutex;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Deepest nesting of `emit` calls (on one thread) before further
/// emissions are dropped.
pub const MAX_EMIT_DEPTH: usize = 32;

thread_local! {
    static EMIT_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// A registered callback. Two listeners are the same listener only when
/// they share the allocation, i.e. one is a clone of the other.
pub struct Listener<C: ?Sized, P: ?Sized>(Arc<dyn Fn(&C, &P) + Send + Sync>);

impl<C: ?Sized, P: ?Sized> Listener<C, P> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&C, &P) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn same_as(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }

    fn call(&self, ctx: &C, payload: &P) {
        (self.0)(ctx, payload)
    }
}

impl<C: ?Sized, P: ?Sized> Clone for Listener<C, P> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<C: ?Sized, P: ?Sized> fmt::Debug for Listener<C, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Arc::as_ptr(&self.0))
    }
}

pub struct EventHub<K, C: ?Sized, P: ?Sized> {
    listeners: Mutex<HashMap<K, Vec<Listener<C, P>>>>,
}

impl<K, C, P> Default for EventHub<K, C, P>
where
    K: Copy + Eq + Hash + fmt::Debug,
    C: ?Sized,
    P: ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, C, P> EventHub<K, C, P>
where
    K: Copy + Eq + Hash + fmt::Debug,
    C: ?Sized,
    P: ?Sized,
{
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `listener` under `kind` unless that exact listener is
    /// already there.
    pub fn on(&self, kind: K, listener: Listener<C, P>) -> &Self {
        let mut map = self.listeners.lock();
        let list = map.entry(kind).or_default();
        if !list.iter().any(|l| l.same_as(&listener)) {
            list.push(listener);
        }
        self
    }

    /// Calls every listener of `kind` in registration order. Returns `false`
    /// without calling anything when nobody ever subscribed to `kind`.
    ///
    /// The registry is not locked while listeners run, so a listener may
    /// subscribe or emit again; listeners added during an emission are
    /// first called on the next one.
    pub fn emit(&self, kind: K, ctx: &C, payload: &P) -> bool {
        let snapshot = {
            let map = self.listeners.lock();
            match map.get(&kind) {
                Some(list) => list.clone(),
                None => return false,
            }
        };

        let _depth = match DepthGuard::enter() {
            Some(guard) => guard,
            None => {
                tracing::warn!(
                    "dropping {:?} event: emit nested deeper than {}",
                    kind,
                    MAX_EMIT_DEPTH
                );
                return false;
            }
        };

        for listener in &snapshot {
            listener.call(ctx, payload);
        }
        true
    }

    pub fn listener_count(&self, kind: K) -> usize {
        self.listeners.lock().get(&kind).map_or(0, Vec::len)
    }
}

/// Tracks emit nesting; released on drop, including while unwinding.
struct DepthGuard;

impl DepthGuard {
    fn enter() -> Option<Self> {
        EMIT_DEPTH.with(|depth| {
            if depth.get() >= MAX_EMIT_DEPTH {
                None
            } else {
                depth.set(depth.get() + 1);
                Some(DepthGuard)
            }
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        EMIT_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The signaling channel is open and writable.
    Connect,
    /// The signaling channel closed.
    Disconnect,
    /// A message arrived on the signaling channel.
    Signal,
    /// Local or remote media became available.
    Media,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Connect,
        EventKind::Disconnect,
        EventKind::Signal,
        EventKind::Media,
        EventKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
            EventKind::Signal => "signal",
            EventKind::Media => "media",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaOrigin {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaEvent {
    pub origin: MediaOrigin,
    pub media: MediaHandle,
}

#[derive(Debug)]
pub enum PeerEvent {
    Connect(ChannelEvent),
    Disconnect(ChannelEvent),
    Signal(ChannelMessage),
    Media(MediaEvent),
    Error(PeerError),
}

impl PeerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PeerEvent::Connect(_) => EventKind::Connect,
            PeerEvent::Disconnect(_) => EventKind::Disconnect,
            PeerEvent::Signal(_) => EventKind::Signal,
            PeerEvent::Media(_) => EventKind::Media,
            PeerEvent::Error(_) => EventKind::Error,
        }
    }

    pub fn as_media(&self) -> Option<&MediaEvent> {
        match self {
            PeerEvent::Media(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&PeerError> {
        match self {
            PeerEvent::Error(e) => Some(e),
            _ => None,
        }
    }
}
