use crate::config::ServerConfig;
use rand::Rng;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

/// Adds the `stun:`/`turn:` scheme to a relay URL that lacks one.
pub fn add_ice_url_scheme(config: &ServerConfig, url: &str) -> String {
    if url.starts_with("turn:")
        || url.starts_with("turns:")
        || url.starts_with("stun:")
        || url.starts_with("stuns:")
    {
        url.to_string()
    } else {
        let scheme = if config.r#type.as_deref() == Some("turn") {
            "turn:"
        } else {
            "stun:"
        };
        format!("{}{}", scheme, url)
    }
}
