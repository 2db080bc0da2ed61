use crate::error::ConfigError;
use serde::{Deserialize, Deserializer, Serialize};

// Logging can only be switched off in development builds

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true;

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false;

#[cfg(debug_assertions)]
pub mod dev {
    // Set to false to silence logging entirely in debug builds.
    pub const ENABLE_LOGGING: bool = true;
}

#[cfg(not(debug_assertions))]
pub mod dev {
    pub const ENABLE_LOGGING: bool = false;
}

/// Relay servers used when the configuration names none.
pub const DEFAULT_ICE_SERVERS: [&str; 2] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
];

/// Options a session is constructed with. Immutable once the session exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeerConfig {
    /// Signaling endpoint, `ws://` or `wss://`.
    pub channel_url: String,
    /// Sub-protocols offered during the signaling handshake.
    #[serde(default, deserialize_with = "one_or_many")]
    pub channel_protocols: Vec<String>,
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<ServerConfig>,
    /// Reserved; handed to the transport untouched.
    #[serde(default)]
    pub ice_options: Option<IceOptions>,
    #[serde(default)]
    pub media: MediaConstraints,
}

/// A candidate relay server (STUN or TURN).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// `stun` or `turn`; decides the scheme of bare URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(alias = "url", deserialize_with = "one_or_many")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IceOptions {
    #[serde(default)]
    pub candidate_pool_size: Option<u8>,
    #[serde(default)]
    pub transport_policy: Option<IceTransportPolicy>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IceTransportPolicy {
    All,
    Relay,
}

/// Capture kinds requested from the local device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaConstraints {
    #[serde(default)]
    pub audio: bool,
    #[serde(default)]
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

impl PeerConfig {
    pub fn new(channel_url: impl Into<String>) -> Self {
        Self {
            channel_url: channel_url.into(),
            channel_protocols: Vec::new(),
            ice_servers: default_ice_servers(),
            ice_options: None,
            media: MediaConstraints::default(),
        }
    }

    /// Parses a JSON configuration and validates it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: PeerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_url.is_empty() {
            return Err(ConfigError::EmptyChannelUrl);
        }
        if !(self.channel_url.starts_with("ws://") || self.channel_url.starts_with("wss://")) {
            return Err(ConfigError::ChannelScheme(self.channel_url.clone()));
        }

        for server in &self.ice_servers {
            if server.urls.is_empty() || server.urls.iter().any(|u| u.is_empty()) {
                return Err(ConfigError::EmptyServerUrl);
            }
            if server.is_turn() && (server.username.is_none() || server.credential.is_none()) {
                return Err(ConfigError::TurnCredentials(server.urls.join(",")));
            }
        }
        Ok(())
    }
}

impl ServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            id: None,
            r#type: Some("stun".into()),
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    pub fn is_turn(&self) -> bool {
        self.r#type.as_deref() == Some("turn")
            || self
                .urls
                .iter()
                .any(|u| u.starts_with("turn:") || u.starts_with("turns:"))
    }
}

fn default_ice_servers() -> Vec<ServerConfig> {
    vec![ServerConfig {
        id: Some("default-stun".into()),
        r#type: Some("stun".into()),
        urls: DEFAULT_ICE_SERVERS.iter().map(|u| u.to_string()).collect(),
        username: None,
        credential: None,
    }]
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}
