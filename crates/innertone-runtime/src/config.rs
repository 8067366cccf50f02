//! Session configuration
//!
//! Every section has working defaults; a host may override any subset from
//! TOML.

use std::path::Path;
use std::time::Duration;

use innertone_core::{InnertoneError, InnertoneResult};
use innertone_transport::{PeerConfig, WsConnector, DEFAULT_ICE_SERVER, DIALOGUE_PATH, SIGNALING_PATH};
use innertone_visual::AnimationConfig;
use innertone_voice::{RecognitionOptions, SpeechOptions};
use serde::Deserialize;

/// Remote endpoints
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub base_url: String,
    pub dialogue_path: String,
    pub signaling_path: String,
    pub ice_servers: Vec<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "ws://localhost:8000".to_string(),
            dialogue_path: DIALOGUE_PATH.to_string(),
            signaling_path: SIGNALING_PATH.to_string(),
            ice_servers: vec![DEFAULT_ICE_SERVER.to_string()],
        }
    }
}

impl TransportConfig {
    pub fn dialogue_connector(&self) -> WsConnector {
        WsConnector::new(self.base_url.clone(), self.dialogue_path.clone())
    }

    pub fn signaling_connector(&self) -> WsConnector {
        WsConnector::new(self.base_url.clone(), self.signaling_path.clone())
    }

    pub fn peer_config(&self) -> PeerConfig {
        PeerConfig {
            ice_servers: self.ice_servers.clone(),
        }
    }
}

/// Text-to-speech settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub rate: f32,
    pub pitch: f32,
    pub preferred_voices: Vec<String>,
    pub keepalive_interval_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        let options = SpeechOptions::default();
        Self {
            rate: options.rate,
            pitch: options.pitch,
            preferred_voices: options.preferred_voices,
            keepalive_interval_ms: options.keepalive_interval.as_millis() as u64,
        }
    }
}

impl SpeechConfig {
    pub fn options(&self) -> SpeechOptions {
        SpeechOptions {
            rate: self.rate,
            pitch: self.pitch,
            preferred_voices: self.preferred_voices.clone(),
            keepalive_interval: Duration::from_millis(self.keepalive_interval_ms),
        }
    }
}

/// Speech-to-text settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub language: String,
    pub interim_results: bool,
    pub continuous: bool,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        let options = RecognitionOptions::default();
        Self {
            language: options.language,
            interim_results: options.interim_results,
            continuous: options.continuous,
        }
    }
}

impl RecognitionConfig {
    pub fn options(&self) -> RecognitionOptions {
        RecognitionOptions {
            language: self.language.clone(),
            interim_results: self.interim_results,
            continuous: self.continuous,
        }
    }
}

/// Log output
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "innertone=info".to_string(),
            json: false,
        }
    }
}

/// Top-level session configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub transport: TransportConfig,
    pub speech: SpeechConfig,
    pub recognition: RecognitionConfig,
    pub animation: AnimationConfig,
    pub logging: LoggingConfig,
    /// Timer and keep-alive resolution
    pub tick_interval_ms: u64,
    /// Peer calls send an offer as soon as the relay is joined
    pub auto_offer: bool,
    /// Fixed room key instead of a generated id. Every start joins this same
    /// room, so two parties can meet and rejoin after hanging up.
    pub session_id: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            speech: SpeechConfig::default(),
            recognition: RecognitionConfig::default(),
            animation: AnimationConfig::default(),
            logging: LoggingConfig::default(),
            tick_interval_ms: 250,
            auto_offer: false,
            session_id: None,
        }
    }
}

impl SessionConfig {
    /// Defaults pointed at another server
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.transport.base_url = base_url.into();
        config
    }

    pub fn from_toml_str(raw: &str) -> InnertoneResult<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| InnertoneError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> InnertoneResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| InnertoneError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> InnertoneResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(InnertoneError::Config("tick_interval_ms must be positive".into()));
        }
        if !self.transport.dialogue_path.contains("{id}")
            || !self.transport.signaling_path.contains("{id}")
        {
            return Err(InnertoneError::Config("channel paths must contain {id}".into()));
        }
        self.animation.validate()
    }
}
