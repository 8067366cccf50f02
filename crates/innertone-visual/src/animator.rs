//! Avatar animator - per-frame composition of every driver
//!
//! [`AvatarAnimator::tick`] is called once per rendered frame with the
//! animation time, the latest session state (if any) and the latest audio
//! level (if any). It never blocks and holds only smoothing state.

use innertone_core::{InnertoneError, InnertoneResult, SessionState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::{
    breath_scale, ArmBone, BlinkDriver, Bone, CharacterRig, HeadMotion, IdlePoseConfig, LipSync,
    RigPose, Rotation3D, Viseme,
};

/// Animation tuning
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Blink target threshold on the composed sine
    pub blink_threshold: f32,
    pub blink_weight: f32,
    pub viseme_weight: f32,
    /// Viseme dwell range, seconds
    pub viseme_dwell: (f32, f32),
    pub viseme_amplitude: (f32, f32),
    pub jaw_range: (f32, f32),
    /// Jaw oscillation, radians per second
    pub jaw_frequency: f32,
    pub fallback_weight: f32,
    /// Maximum fallback head scale increase
    pub fallback_scale_gain: f32,
    pub head_weight: f32,
    pub drift_yaw: f32,
    pub drift_pitch: f32,
    /// Drift re-pick interval range, seconds
    pub drift_interval: (f32, f32),
    pub listen_sway: f32,
    /// Pitch added per unit of audio level while listening
    pub attentive_nod: f32,
    pub idle_sway: f32,
    pub breath_amplitude: f32,
    /// Breathing, radians per second
    pub breath_rate: f32,
    /// Longest frame step honoured by the smoothing filters, seconds
    pub max_frame_step: f32,
    pub idle_pose: IdlePoseConfig,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            blink_threshold: 0.98,
            blink_weight: 0.3,
            viseme_weight: 0.35,
            viseme_dwell: (0.07, 0.13),
            viseme_amplitude: (0.4, 0.8),
            jaw_range: (0.1, 0.35),
            jaw_frequency: 12.0,
            fallback_weight: 0.4,
            fallback_scale_gain: 0.1,
            head_weight: 0.05,
            drift_yaw: 0.1,
            drift_pitch: 0.05,
            drift_interval: (0.5, 2.0),
            listen_sway: 0.05,
            attentive_nod: 0.03,
            idle_sway: 0.02,
            breath_amplitude: 0.003,
            breath_rate: 1.57,
            max_frame_step: 0.25,
            idle_pose: IdlePoseConfig::default(),
        }
    }
}

impl AnimationConfig {
    /// Calmer preset: smaller head drift and sway
    pub fn subdued() -> Self {
        Self {
            blink_weight: 0.35,
            drift_yaw: 0.03,
            drift_pitch: 0.02,
            listen_sway: 0.02,
            ..Default::default()
        }
    }

    /// Reject ranges the animator cannot sample from
    pub fn validate(&self) -> InnertoneResult<()> {
        ordered("viseme_dwell", self.viseme_dwell, 0.0, f32::INFINITY)?;
        if self.viseme_dwell.0 <= 0.0 {
            return Err(InnertoneError::Config("viseme_dwell must be positive".into()));
        }
        ordered("viseme_amplitude", self.viseme_amplitude, 0.0, 1.0)?;
        ordered("jaw_range", self.jaw_range, 0.0, 1.0)?;
        ordered("drift_interval", self.drift_interval, 0.0, f32::INFINITY)?;
        for (name, amplitude) in [("drift_yaw", self.drift_yaw), ("drift_pitch", self.drift_pitch)] {
            if !(amplitude.is_finite() && amplitude >= 0.0) {
                return Err(InnertoneError::Config(format!("{name} must be non-negative")));
            }
        }
        Ok(())
    }
}

fn ordered(name: &str, (lo, hi): (f32, f32), floor: f32, ceil: f32) -> InnertoneResult<()> {
    if lo.is_finite() && hi.is_finite() && floor <= lo && lo <= hi && hi <= ceil {
        Ok(())
    } else {
        Err(InnertoneError::Config(format!(
            "{name} must be an ordered range within [{floor}, {ceil}]"
        )))
    }
}

/// Per-frame blend targets
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationFrame {
    pub blink_influence: f32,
    pub viseme_influences: [f32; Viseme::COUNT],
    pub jaw_open: f32,
    pub head_yaw: f32,
    pub head_pitch: f32,
    pub breath_scale: f32,
    pub fallback_talk_scale: f32,
}

impl AnimationFrame {
    #[inline]
    pub fn viseme(&self, viseme: Viseme) -> f32 {
        self.viseme_influences[viseme.index()]
    }

    /// Visemes with their influence, channel order
    pub fn visemes(&self) -> impl Iterator<Item = (Viseme, f32)> + '_ {
        Viseme::all()
            .iter()
            .map(move |v| (*v, self.viseme_influences[v.index()]))
    }
}

/// Procedural animator for one character
pub struct AvatarAnimator<R: Rng = StdRng> {
    config: AnimationConfig,
    rig: CharacterRig,
    rng: R,
    last_t: Option<f32>,
    blink: BlinkDriver,
    lips: LipSync,
    head: HeadMotion,
    breath: f32,
}

impl AvatarAnimator<StdRng> {
    /// Animator with a fixed seed
    pub fn seeded(config: AnimationConfig, rig: CharacterRig, seed: u64) -> Self {
        Self::new(config, rig, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> AvatarAnimator<R> {
    pub fn new(config: AnimationConfig, rig: CharacterRig, rng: R) -> Self {
        Self {
            config,
            rig,
            rng,
            last_t: None,
            blink: BlinkDriver::default(),
            lips: LipSync::default(),
            head: HeadMotion::default(),
            breath: 1.0,
        }
    }

    pub fn config(&self) -> &AnimationConfig {
        &self.config
    }

    pub fn rig(&self) -> &CharacterRig {
        &self.rig
    }

    /// Advance to animation time `t` (seconds)
    pub fn tick(
        &mut self,
        t: f32,
        state: Option<SessionState>,
        level: Option<f32>,
    ) -> AnimationFrame {
        let dt = match self.last_t {
            Some(prev) => (t - prev).clamp(0.0, self.config.max_frame_step),
            None => 1.0 / 60.0,
        };
        self.last_t = Some(t);

        let speaking = state == Some(SessionState::Speaking);
        let level = level.unwrap_or(0.0);

        if self.rig.has_blink {
            self.blink.update(t, dt, &self.config);
        }
        self.lips.update(
            t,
            dt,
            speaking,
            self.rig.has_visemes,
            &mut self.rng,
            &self.config,
        );
        self.head
            .update(t, dt, state, level, &mut self.rng, &self.config);
        self.breath = breath_scale(t, &self.config);

        self.frame()
    }

    /// Current blend targets without advancing
    pub fn frame(&self) -> AnimationFrame {
        AnimationFrame {
            blink_influence: self.blink.influence,
            viseme_influences: self.lips.influences,
            jaw_open: self.lips.jaw_open,
            head_yaw: self.head.yaw,
            head_pitch: self.head.pitch,
            breath_scale: self.breath,
            fallback_talk_scale: self.lips.fallback_scale,
        }
    }

    /// Bone targets: offsets composed onto the rig's resting orientations
    pub fn pose(&self) -> RigPose {
        let head_offset = Rotation3D::from_yaw_pitch(self.head.yaw, self.head.pitch);
        let arm = |bone: ArmBone| {
            let rest = self.rig.rest_rotation(bone.into());
            (bone, rest.compose(&self.config.idle_pose.correction(bone)))
        };

        RigPose {
            head: self.rig.rest_rotation(Bone::Head).compose(&head_offset),
            head_scale: self.lips.fallback_scale,
            spine_scale: self.breath,
            arms: [
                arm(ArmBone::LeftUpperArm),
                arm(ArmBone::RightUpperArm),
                arm(ArmBone::LeftForearm),
                arm(ArmBone::RightForearm),
            ],
        }
    }
}

impl<R: Rng> std::fmt::Debug for AvatarAnimator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarAnimator")
            .field("rig", &self.rig)
            .field("last_t", &self.last_t)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn run(
        animator: &mut AvatarAnimator,
        from: usize,
        to: usize,
        state: Option<SessionState>,
    ) -> AnimationFrame {
        let mut frame = animator.frame();
        for i in from..to {
            frame = animator.tick(i as f32 * DT, state, Some(0.2));
        }
        frame
    }

    #[test]
    fn test_same_seed_same_frames() {
        let mut a = AvatarAnimator::seeded(AnimationConfig::default(), CharacterRig::full(), 5);
        let mut b = AvatarAnimator::seeded(AnimationConfig::default(), CharacterRig::full(), 5);
        for i in 0..300 {
            let t = i as f32 * DT;
            assert_eq!(
                a.tick(t, Some(SessionState::Speaking), None),
                b.tick(t, Some(SessionState::Speaking), None)
            );
        }
    }

    #[test]
    fn test_mouth_moves_only_while_speaking() {
        let mut animator =
            AvatarAnimator::seeded(AnimationConfig::default(), CharacterRig::full(), 1);

        let listening = run(&mut animator, 0, 120, Some(SessionState::Listening));
        assert_eq!(listening.jaw_open, 0.0);
        assert!(listening.visemes().all(|(_, v)| v == 0.0));

        let speaking = run(&mut animator, 120, 240, Some(SessionState::Speaking));
        assert!(speaking.jaw_open > 0.05);
        assert_eq!(speaking.viseme(Viseme::Sil), 0.0);
    }

    #[test]
    fn test_state_change_is_continuous() {
        let mut animator =
            AvatarAnimator::seeded(AnimationConfig::default(), CharacterRig::full(), 2);
        let before = run(&mut animator, 0, 180, Some(SessionState::Speaking));
        let after = animator.tick(180.0 * DT, Some(SessionState::Idle), None);

        // one frame closes at most the per-frame weight of the gap
        assert!(after.jaw_open >= before.jaw_open * 0.64);
        assert!((after.head_yaw - before.head_yaw).abs() < 0.01);
    }

    #[test]
    fn test_missing_state_is_tolerated() {
        let mut animator =
            AvatarAnimator::seeded(AnimationConfig::default(), CharacterRig::full(), 3);
        let frame = run(&mut animator, 0, 60, None);
        assert_eq!(frame.jaw_open, 0.0);
        assert!(frame.breath_scale > 0.99);
    }

    #[test]
    fn test_basic_rig_uses_head_scale() {
        let mut animator =
            AvatarAnimator::seeded(AnimationConfig::default(), CharacterRig::basic(), 4);
        let frame = run(&mut animator, 0, 120, Some(SessionState::Speaking));
        assert!(frame.fallback_talk_scale > 1.0);
        assert!(frame.fallback_talk_scale <= 1.1);
        assert_eq!(frame.blink_influence, 0.0);
        assert_eq!(animator.pose().head_scale, frame.fallback_talk_scale);
    }

    #[test]
    fn test_pose_composes_onto_rest() {
        let rest = Rotation3D::from_euler(0.0, 0.5, 0.0);
        let rig = CharacterRig::full()
            .with_rest(Bone::Head, rest)
            .with_rest(Bone::LeftUpperArm, rest);
        let animator = AvatarAnimator::seeded(AnimationConfig::default(), rig, 0);
        let pose = animator.pose();

        // no head motion yet: head stays at rest
        assert!(pose.head.angle_to(&rest) < 1e-4);

        let expected = rest.compose(&IdlePoseConfig::default().correction(ArmBone::LeftUpperArm));
        assert!(pose.arm(ArmBone::LeftUpperArm).angle_to(&expected) < 1e-4);
    }

    #[test]
    fn test_validate_rejects_unsampleable_ranges() {
        assert!(AnimationConfig::default().validate().is_ok());
        assert!(AnimationConfig::subdued().validate().is_ok());

        let with = |edit: fn(&mut AnimationConfig)| {
            let mut config = AnimationConfig::default();
            edit(&mut config);
            config
        };
        let broken = [
            with(|c| c.viseme_dwell = (0.2, 0.1)),
            with(|c| c.viseme_dwell = (0.0, 0.1)),
            with(|c| c.viseme_amplitude = (0.8, 0.4)),
            with(|c| c.jaw_range = (0.35, 0.1)),
            with(|c| c.drift_interval = (2.0, 0.5)),
            with(|c| c.drift_interval = (0.5, f32::NAN)),
            with(|c| c.drift_yaw = -0.1),
            with(|c| c.drift_pitch = -0.05),
        ];
        for config in broken {
            assert!(
                matches!(config.validate(), Err(InnertoneError::Config(_))),
                "{config:?}"
            );
        }
    }

    #[test]
    fn test_reversed_ranges_do_not_panic() {
        let config = AnimationConfig {
            viseme_dwell: (0.2, 0.1),
            viseme_amplitude: (0.8, 0.4),
            drift_interval: (2.0, 0.5),
            drift_yaw: -0.1,
            drift_pitch: -0.05,
            ..Default::default()
        };
        let mut animator = AvatarAnimator::seeded(config, CharacterRig::full(), 6);
        let frame = run(&mut animator, 0, 120, Some(SessionState::Speaking));
        assert!(frame.jaw_open.is_finite());
        assert!(frame.head_yaw.is_finite());
    }

    #[test]
    fn test_config_partial_overrides() {
        let config: AnimationConfig =
            serde_json::from_str(r#"{"blink_weight":0.35,"jaw_range":[0.1,0.3]}"#).unwrap();
        assert_eq!(config.blink_weight, 0.35);
        assert_eq!(config.jaw_range, (0.1, 0.3));
        assert_eq!(config.viseme_weight, 0.35);
    }
}
