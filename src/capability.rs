//! One-time detection of the platform's capture primitive.
//!
//! Runs once at startup. The resulting [`Capability`] is handed to every
//! session (through [`crate::session::Platform`]) and decides both whether a
//! session can ever succeed and how media is presented.

use crate::media::MediaCapture;
use std::fmt;
use std::sync::Arc;

/// Which capture primitive was found. Probed in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Standard,
    Moz,
    Webkit,
}

/// Looks up each variant's capture primitive on the running platform.
pub trait PlatformProbe {
    fn standard(&self) -> Option<Arc<dyn MediaCapture>>;
    fn moz(&self) -> Option<Arc<dyn MediaCapture>>;
    fn webkit(&self) -> Option<Arc<dyn MediaCapture>>;
}

#[derive(Clone)]
pub enum Capability {
    Supported {
        variant: Variant,
        capture: Arc<dyn MediaCapture>,
    },
    Unsupported,
}

impl Capability {
    /// First match wins: the standard primitive beats the vendor ones.
    pub fn detect(probe: &dyn PlatformProbe) -> Self {
        let found = probe
            .standard()
            .map(|c| (Variant::Standard, c))
            .or_else(|| probe.moz().map(|c| (Variant::Moz, c)))
            .or_else(|| probe.webkit().map(|c| (Variant::Webkit, c)));

        match found {
            Some((variant, capture)) => {
                tracing::info!("media capture available: {:?}", variant);
                Capability::Supported { variant, capture }
            }
            None => {
                tracing::warn!("WebRTC is not supported: no capture primitive found");
                Capability::Unsupported
            }
        }
    }

    pub fn supported(variant: Variant, capture: Arc<dyn MediaCapture>) -> Self {
        Capability::Supported { variant, capture }
    }

    pub fn variant(&self) -> Option<Variant> {
        match self {
            Capability::Supported { variant, .. } => Some(*variant),
            Capability::Unsupported => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, Capability::Supported { .. })
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Supported { variant, .. } => {
                f.debug_tuple("Supported").field(variant).finish()
            }
            Capability::Unsupported => f.write_str("Unsupported"),
        }
    }
}
