use crate::transport::IceCandidate;
use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

/// Local wall-clock timestamps, millisecond precision.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        write!(w, "[{}]", now.format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

pub fn logging_enabled() -> bool {
    crate::config::LOGGING_ENABLED && crate::config::dev::ENABLE_LOGGING
}

/// Installs the global subscriber. Safe to call more than once; does
/// nothing when logging is switched off for this build.
pub fn init() {
    if !logging_enabled() {
        return;
    }
    INIT.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        // Another subscriber may already be installed by the host application.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(LocalTimer)
            .with_target(false)
            .try_init();
        tracing::debug!("logging initialised");
    });
}

/// Logs a trickled candidate.
pub fn dump_candidate(label: &str, cand: &IceCandidate) {
    tracing::debug!(
        "Trickle {label}: candidate={} sdp_mid={:?} sdp_mline_index={:?} username_fragment={:?}",
        cand.candidate,
        cand.sdp_mid,
        cand.sdp_mline_index,
        cand.username_fragment
    );
}
