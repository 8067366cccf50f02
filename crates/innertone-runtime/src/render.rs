//! Render pump
//!
//! Called once per display frame by the host. Reads the latest session
//! snapshot without waiting on the runtime, samples the visualizer and
//! advances the avatar.

use std::sync::Arc;

use innertone_core::{Clock, SessionTime};
use innertone_visual::{AnimationFrame, AvatarAnimator, RigPose};
use innertone_voice::{FrequencySnapshot, FrequencyVisualizer, SampleTap};
use tokio::sync::watch;

use crate::SessionSnapshot;

/// Everything a renderer draws for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct RenderFrame {
    pub animation: AnimationFrame,
    pub pose: RigPose,
    pub spectrum: FrequencySnapshot,
    pub status: String,
    pub elapsed: String,
}

pub struct RenderPump {
    animator: AvatarAnimator,
    visualizer: FrequencyVisualizer,
    snapshot: watch::Receiver<SessionSnapshot>,
    clock: Arc<dyn Clock>,
    epoch: SessionTime,
}

impl RenderPump {
    pub fn new(
        animator: AvatarAnimator,
        visualizer: FrequencyVisualizer,
        snapshot: watch::Receiver<SessionSnapshot>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let epoch = clock.now();
        Self {
            animator,
            visualizer,
            snapshot,
            clock,
            epoch,
        }
    }

    /// Tap to hand to the session machine for captured audio
    pub fn tap(&self) -> SampleTap {
        self.visualizer.tap()
    }

    pub fn animator(&self) -> &AvatarAnimator {
        &self.animator
    }

    /// Produce the next frame
    pub fn frame(&mut self) -> RenderFrame {
        let t = self.clock.now().saturating_since(self.epoch).as_secs_f32();
        let (state, status, elapsed, live) = {
            let snapshot = self.snapshot.borrow();
            (
                snapshot.state,
                snapshot.status.clone(),
                snapshot.elapsed_label(),
                snapshot.session_id.is_some(),
            )
        };

        let spectrum = if live {
            self.visualizer.snapshot()
        } else {
            self.visualizer.reset();
            FrequencySnapshot::default()
        };
        let animation = self.animator.tick(t, Some(state), Some(spectrum.level));

        RenderFrame {
            animation,
            pose: self.animator.pose(),
            spectrum,
            status,
            elapsed,
        }
    }
}

impl std::fmt::Debug for RenderPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPump")
            .field("animator", &self.animator)
            .field("visualizer", &self.visualizer)
            .finish()
    }
}
