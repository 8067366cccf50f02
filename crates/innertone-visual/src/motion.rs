//! Motion - head micro-movement and breathing

use innertone_core::SessionState;
use rand::Rng;

use crate::{approach, sample, AnimationConfig};

/// Head yaw/pitch smoothing state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeadMotion {
    pub yaw: f32,
    pub pitch: f32,
    pub target_yaw: f32,
    pub target_pitch: f32,
    /// Next drift re-pick while speaking, seconds of animation time
    pub next_drift_at: f32,
}

impl HeadMotion {
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        t: f32,
        dt: f32,
        state: Option<SessionState>,
        level: f32,
        rng: &mut R,
        config: &AnimationConfig,
    ) {
        match state {
            Some(SessionState::Speaking) => {
                if t >= self.next_drift_at {
                    self.target_yaw = sample(rng, (-config.drift_yaw, config.drift_yaw));
                    self.target_pitch = sample(rng, (-config.drift_pitch, config.drift_pitch));
                    self.next_drift_at = t + sample(rng, config.drift_interval);
                }
            }
            Some(SessionState::Listening) => {
                self.target_yaw = config.listen_sway * (0.5 * t).sin();
                self.target_pitch = config.attentive_nod * level.clamp(0.0, 1.0);
                self.next_drift_at = t;
            }
            _ => {
                self.target_yaw = config.idle_sway * (0.2 * t).sin();
                self.target_pitch = 0.0;
                self.next_drift_at = t;
            }
        }

        self.yaw = approach(self.yaw, self.target_yaw, config.head_weight, dt);
        self.pitch = approach(self.pitch, self.target_pitch, config.head_weight, dt);
    }
}

/// Torso scale, `1 ± amplitude`
#[inline]
pub fn breath_scale(t: f32, config: &AnimationConfig) -> f32 {
    1.0 + config.breath_amplitude * (config.breath_rate * t).sin()
}
