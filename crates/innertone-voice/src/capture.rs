//! Audio Capture Adapter - microphone and camera acquisition
//!
//! Wraps the host's media devices. A stream, once acquired, stays with the
//! adapter until [`CaptureAdapter::stop`]; mute and camera toggles only
//! enable or disable tracks.

use std::sync::Arc;

use async_trait::async_trait;
use innertone_core::{InnertoneResult, SessionMode};
use tracing::{debug, info};

use crate::SampleTap;

/// Devices requested from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    pub fn audio_only() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }

    pub fn audio_video() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }

    pub fn for_mode(mode: SessionMode) -> Self {
        if mode.wants_video() {
            Self::audio_video()
        } else {
            Self::audio_only()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Track as reported by the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: String,
    pub kind: TrackKind,
    pub enabled: bool,
}

/// Live device stream
pub trait MediaStream: Send + Sync {
    fn tracks(&self) -> Vec<TrackInfo>;

    /// Enable or disable every track of `kind`
    fn set_track_enabled(&self, kind: TrackKind, enabled: bool);

    /// Stop every track; the stream is unusable afterwards
    fn stop(&self);

    /// Feed captured audio into the visualizer
    fn attach_analyser(&self, tap: SampleTap);
}

/// Host media devices
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire a stream; fails with `PermissionDenied` when the user refuses
    async fn acquire(&self, constraints: MediaConstraints) -> InnertoneResult<Box<dyn MediaStream>>;
}

/// Session-scoped owner of the local stream
pub struct CaptureAdapter {
    devices: Arc<dyn MediaDevices>,
    stream: Option<Box<dyn MediaStream>>,
    muted: bool,
    video_off: bool,
}

impl CaptureAdapter {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            stream: None,
            muted: false,
            video_off: false,
        }
    }

    /// Acquire devices. A second call while a stream is held is a no-op.
    pub async fn start(&mut self, constraints: MediaConstraints) -> InnertoneResult<()> {
        if self.stream.is_some() {
            debug!("capture already active");
            return Ok(());
        }
        let stream = self.devices.acquire(constraints).await?;
        info!(
            audio = constraints.audio,
            video = constraints.video,
            tracks = stream.tracks().len(),
            "media acquired"
        );
        self.stream = Some(stream);
        self.muted = false;
        self.video_off = false;
        Ok(())
    }

    /// Stop and release every track. Idempotent.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.stop();
            info!("media released");
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    pub fn tracks(&self) -> Vec<TrackInfo> {
        self.stream.as_ref().map(|s| s.tracks()).unwrap_or_default()
    }

    pub fn stream(&self) -> Option<&dyn MediaStream> {
        self.stream.as_deref()
    }

    pub fn attach_analyser(&self, tap: SampleTap) {
        if let Some(stream) = &self.stream {
            stream.attach_analyser(tap);
        }
    }

    #[inline]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    #[inline]
    pub fn is_video_off(&self) -> bool {
        self.video_off
    }

    /// Flip the microphone; returns the new muted flag
    pub fn toggle_mute(&mut self) -> bool {
        if let Some(stream) = &self.stream {
            self.muted = !self.muted;
            stream.set_track_enabled(TrackKind::Audio, !self.muted);
        }
        self.muted
    }

    /// Flip the camera; returns the new video-off flag
    pub fn toggle_camera(&mut self) -> bool {
        if let Some(stream) = &self.stream {
            self.video_off = !self.video_off;
            stream.set_track_enabled(TrackKind::Video, !self.video_off);
        }
        self.video_off
    }
}

impl Drop for CaptureAdapter {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CaptureAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureAdapter")
            .field("active", &self.is_active())
            .field("muted", &self.muted)
            .field("video_off", &self.video_off)
            .finish()
    }
}
