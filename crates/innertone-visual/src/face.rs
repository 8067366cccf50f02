//! Face - blink and lip-sync morph drivers

use rand::Rng;

use crate::AnimationConfig;

/// Viseme - mouth shapes for speech
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Viseme {
    #[default]
    Sil, // silence
    PP, // "p", "b", "m" (lips together)
    FF, // "f", "v" (teeth on lip)
    TH, // "th" (tongue between teeth)
    DD, // "d", "t" (tongue on ridge)
    KK, // "k", "g" (back of tongue)
    CH, // "ch", "j", "sh"
    SS, // "s", "z"
    NN, // "n", "l"
    RR, // "r"
    AA, // "ah"
    E,  // "eh"
    I,  // "ee"
    O,  // "oh"
    U,  // "oo"
}

impl Viseme {
    pub const COUNT: usize = 15;

    /// All visemes in channel order
    pub fn all() -> &'static [Viseme; Viseme::COUNT] {
        &[
            Viseme::Sil,
            Viseme::PP,
            Viseme::FF,
            Viseme::TH,
            Viseme::DD,
            Viseme::KK,
            Viseme::CH,
            Viseme::SS,
            Viseme::NN,
            Viseme::RR,
            Viseme::AA,
            Viseme::E,
            Viseme::I,
            Viseme::O,
            Viseme::U,
        ]
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Morph target name on standard avatar rigs
    pub fn morph_name(self) -> &'static str {
        match self {
            Viseme::Sil => "viseme_sil",
            Viseme::PP => "viseme_PP",
            Viseme::FF => "viseme_FF",
            Viseme::TH => "viseme_TH",
            Viseme::DD => "viseme_DD",
            Viseme::KK => "viseme_kk",
            Viseme::CH => "viseme_CH",
            Viseme::SS => "viseme_SS",
            Viseme::NN => "viseme_nn",
            Viseme::RR => "viseme_RR",
            Viseme::AA => "viseme_aa",
            Viseme::E => "viseme_E",
            Viseme::I => "viseme_I",
            Viseme::O => "viseme_O",
            Viseme::U => "viseme_U",
        }
    }
}

/// Move `current` toward `target` by a per-frame `weight`, corrected for the
/// actual frame time (`weight` is defined at 60 Hz).
#[inline]
pub fn approach(current: f32, target: f32, weight: f32, dt: f32) -> f32 {
    let w = 1.0 - (1.0 - weight.clamp(0.0, 1.0)).powf(dt.max(0.0) * 60.0);
    current + (target - current) * w
}

/// Binary blink target: a composed sine so blinks are not evenly spaced
#[inline]
pub fn blink_target(t: f32, threshold: f32) -> f32 {
    if (3.0 * t + 0.8 * (0.7 * t).sin()).sin() > threshold {
        1.0
    } else {
        0.0
    }
}

/// Eyelid smoothing state
#[derive(Debug, Clone, Copy, Default)]
pub struct BlinkDriver {
    pub influence: f32,
}

impl BlinkDriver {
    pub fn update(&mut self, t: f32, dt: f32, config: &AnimationConfig) -> f32 {
        let target = blink_target(t, config.blink_threshold);
        self.influence = approach(self.influence, target, config.blink_weight, dt).clamp(0.0, 1.0);
        self.influence
    }
}

/// Uniform pick from `lo..=hi`. An empty or unbounded range yields `lo`.
pub fn sample<R: Rng + ?Sized>(rng: &mut R, (lo, hi): (f32, f32)) -> f32 {
    if lo < hi && (hi - lo).is_finite() {
        rng.gen_range(lo..=hi)
    } else {
        lo
    }
}

/// Which viseme is shown and until when
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisemeCycle {
    pub active_viseme_index: usize,
    /// Seconds of animation time
    pub next_change_at: f32,
    pub amplitude: f32,
}

impl Default for VisemeCycle {
    fn default() -> Self {
        Self {
            active_viseme_index: 0,
            next_change_at: 0.0,
            amplitude: 0.0,
        }
    }
}

impl VisemeCycle {
    /// Pick a new viseme once the dwell time has elapsed
    pub fn advance<R: Rng + ?Sized>(&mut self, t: f32, rng: &mut R, config: &AnimationConfig) {
        if t < self.next_change_at {
            return;
        }
        // skip silence so the mouth keeps moving
        self.active_viseme_index = rng.gen_range(1..Viseme::COUNT);
        self.amplitude = sample(rng, config.viseme_amplitude);
        self.next_change_at = t + sample(rng, config.viseme_dwell);
    }

    /// Stop talking; the next advance picks immediately
    pub fn reset(&mut self, t: f32) {
        self.amplitude = 0.0;
        self.next_change_at = t;
    }
}

/// Mouth smoothing state
#[derive(Debug, Clone)]
pub struct LipSync {
    pub cycle: VisemeCycle,
    pub influences: [f32; Viseme::COUNT],
    pub jaw_open: f32,
    pub fallback_scale: f32,
}

impl Default for LipSync {
    fn default() -> Self {
        Self {
            cycle: VisemeCycle::default(),
            influences: [0.0; Viseme::COUNT],
            jaw_open: 0.0,
            fallback_scale: 1.0,
        }
    }
}

impl LipSync {
    /// Jaw-open target while speaking, bounded by the configured range
    pub fn jaw_target(t: f32, config: &AnimationConfig) -> f32 {
        let (lo, hi) = config.jaw_range;
        let mid = (lo + hi) * 0.5;
        let half = (hi - lo) * 0.5;
        (mid + half * (config.jaw_frequency * t).sin()).clamp(lo, hi)
    }

    pub fn update<R: Rng + ?Sized>(
        &mut self,
        t: f32,
        dt: f32,
        speaking: bool,
        has_visemes: bool,
        rng: &mut R,
        config: &AnimationConfig,
    ) {
        if speaking {
            self.cycle.advance(t, rng, config);
        } else {
            self.cycle.reset(t);
        }
        let amplitude = self.cycle.amplitude;

        if has_visemes {
            for (i, influence) in self.influences.iter_mut().enumerate() {
                let target = if speaking && i == self.cycle.active_viseme_index {
                    amplitude
                } else {
                    0.0
                };
                *influence = approach(*influence, target, config.viseme_weight, dt).clamp(0.0, 1.0);
            }
            let jaw = if speaking {
                Self::jaw_target(t, config)
            } else {
                0.0
            };
            self.jaw_open = approach(self.jaw_open, jaw, config.viseme_weight, dt).clamp(0.0, 1.0);
        } else {
            let target = 1.0 + amplitude * config.fallback_scale_gain;
            self.fallback_scale = approach(self.fallback_scale, target, config.fallback_weight, dt)
                .clamp(1.0, 1.0 + config.fallback_scale_gain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn test_approach_matches_per_frame_weight_at_60hz() {
        let v = approach(0.0, 1.0, 0.3, DT);
        assert!((v - 0.3).abs() < 1e-5);
        // two half-length frames land where one full frame does
        let half = approach(approach(0.0, 1.0, 0.3, DT / 2.0), 1.0, 0.3, DT / 2.0);
        assert!((half - v).abs() < 1e-5);
        assert_eq!(approach(0.4, 1.0, 0.3, 0.0), 0.4);
    }

    #[test]
    fn test_viseme_channel_names() {
        assert_eq!(Viseme::all().len(), Viseme::COUNT);
        assert_eq!(Viseme::KK.morph_name(), "viseme_kk");
        assert_eq!(Viseme::U.index(), 14);
    }

    #[test]
    fn test_blink_excursions_are_brief() {
        let config = AnimationConfig::default();
        let mut blink = BlinkDriver::default();
        let frames = 60 * 60;

        let mut excursions = 0;
        let mut longest = 0;
        let mut run = 0;
        let mut quiet = 0;
        for i in 0..frames {
            let v = blink.update(i as f32 * DT, DT, &config);
            if v > 0.5 {
                if run == 0 {
                    excursions += 1;
                }
                run += 1;
                longest = longest.max(run);
            } else {
                run = 0;
            }
            if v < 0.05 {
                quiet += 1;
            }
        }

        assert!(excursions >= 10, "only {excursions} blinks in a minute");
        assert!(longest <= 20, "blink held for {longest} frames");
        assert!(quiet as f32 / frames as f32 > 0.6);
    }

    #[test]
    fn test_viseme_cycle_dwell_and_amplitude() {
        let config = AnimationConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut cycle = VisemeCycle::default();

        let mut t = 0.0;
        for _ in 0..200 {
            let before = cycle.next_change_at;
            cycle.advance(t, &mut rng, &config);
            if cycle.next_change_at != before {
                let dwell = cycle.next_change_at - t;
                assert!((0.0699..=0.1301).contains(&dwell));
                assert!((0.4..=0.8).contains(&cycle.amplitude));
                assert!(cycle.active_viseme_index >= 1 && cycle.active_viseme_index < Viseme::COUNT);
            }
            t += DT;
        }
    }

    #[test]
    fn test_lip_sync_silent_when_not_speaking() {
        let config = AnimationConfig::default();
        let mut rng = StdRng::seed_from_u64(2);
        let mut lips = LipSync::default();

        for i in 0..60 {
            lips.update(i as f32 * DT, DT, true, true, &mut rng, &config);
        }
        assert!(lips.jaw_open > 0.05);
        assert!(lips.influences.iter().any(|&v| v > 0.1));

        for i in 60..400 {
            lips.update(i as f32 * DT, DT, false, true, &mut rng, &config);
        }
        assert!(lips.jaw_open < 0.01);
        assert!(lips.influences.iter().all(|&v| v < 0.01));
    }

    #[test]
    fn test_fallback_scale_bounded() {
        let config = AnimationConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        let mut lips = LipSync::default();

        let mut peak: f32 = 1.0;
        for i in 0..600 {
            lips.update(i as f32 * DT, DT, true, false, &mut rng, &config);
            peak = peak.max(lips.fallback_scale);
        }
        assert!(peak > 1.01);
        assert!(peak <= 1.1);
        assert!(lips.influences.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_jaw_target_range() {
        let config = AnimationConfig::default();
        for i in 0..1000 {
            let j = LipSync::jaw_target(i as f32 * 0.013, &config);
            assert!((0.1..=0.35).contains(&j));
        }
    }
}
