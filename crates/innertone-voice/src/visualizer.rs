//! Frequency Visualizer - amplitude-by-frequency snapshots of live audio
//!
//! Capture pushes PCM into a shared [`SampleTap`]; the render loop calls
//! [`FrequencyVisualizer::snapshot`] once per frame. Snapshots never block:
//! if the tap is busy the previous snapshot is returned.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

/// Visualizer configuration
#[derive(Debug, Clone)]
pub struct VisualizerConfig {
    /// Transform size in samples (bins = fft_size / 2)
    pub fft_size: usize,

    /// Time-smoothing constant in [0, 1)
    pub smoothing: f32,

    /// Decibel value mapped to byte 0
    pub min_db: f32,

    /// Decibel value mapped to byte 255
    pub max_db: f32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
        }
    }
}

/// Shared sample buffer between capture and visualizer
#[derive(Clone, Debug)]
pub struct SampleTap {
    buffer: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
}

impl SampleTap {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// Append samples, discarding the oldest beyond capacity
    pub fn push(&self, samples: &[f32]) {
        let mut buffer = self.buffer.lock();
        for &s in samples {
            if buffer.len() == self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(s);
        }
    }

    pub fn clear(&self) {
        self.buffer.lock().clear();
    }

    /// Copy the newest `out.len()` samples into `out`, zero-padding the front.
    /// Returns `false` without touching `out` if the buffer is locked.
    fn try_read_latest(&self, out: &mut [f32]) -> bool {
        let Some(buffer) = self.buffer.try_lock() else {
            return false;
        };
        let n = buffer.len().min(out.len());
        let pad = out.len() - n;
        out[..pad].fill(0.0);
        for (dst, src) in out[pad..].iter_mut().zip(buffer.iter().skip(buffer.len() - n)) {
            *dst = *src;
        }
        true
    }
}

/// One visualizer reading
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrequencySnapshot {
    /// Byte magnitude per frequency bucket, low to high
    pub bins: Vec<u8>,

    /// Mean bucket magnitude normalized to [0, 1]
    pub level: f32,
}

impl FrequencySnapshot {
    fn from_bins(bins: Vec<u8>) -> Self {
        let level = if bins.is_empty() {
            0.0
        } else {
            bins.iter().map(|&b| b as f32).sum::<f32>() / (bins.len() as f32 * 255.0)
        };
        Self { bins, level }
    }
}

/// Analyser over a [`SampleTap`]
pub struct FrequencyVisualizer {
    config: VisualizerConfig,
    tap: SampleTap,
    fft: Arc<dyn RealToComplex<f32>>,
    hann_window: Vec<f32>,
    frame: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    last: FrequencySnapshot,
}

impl FrequencyVisualizer {
    pub fn new(config: VisualizerConfig) -> Self {
        let n_fft = config.fft_size.max(2);
        let hann_window: Vec<f32> = (0..n_fft)
            .map(|i| {
                let x = std::f32::consts::PI * i as f32 / (n_fft - 1) as f32;
                0.5 * (1.0 - (2.0 * x).cos())
            })
            .collect();

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n_fft);
        let spectrum = fft.make_output_vec();
        let bins = n_fft / 2;

        Self {
            tap: SampleTap::new(n_fft * 4),
            fft,
            hann_window,
            frame: vec![0.0; n_fft],
            spectrum,
            smoothed: vec![0.0; bins],
            last: FrequencySnapshot::from_bins(vec![0; bins]),
            config,
        }
    }

    /// Tap to hand to the capture stream
    pub fn tap(&self) -> SampleTap {
        self.tap.clone()
    }

    pub fn bin_count(&self) -> usize {
        self.smoothed.len()
    }

    /// Latest amplitude-by-frequency reading
    pub fn snapshot(&mut self) -> FrequencySnapshot {
        if !self.tap.try_read_latest(&mut self.frame) {
            return self.last.clone();
        }

        for (s, w) in self.frame.iter_mut().zip(self.hann_window.iter()) {
            *s *= w;
        }

        if self.fft.process(&mut self.frame, &mut self.spectrum).is_err() {
            return self.last.clone();
        }

        let scale = 1.0 / self.hann_window.len() as f32;
        let tau = self.config.smoothing.clamp(0.0, 0.999);
        let range = (self.config.max_db - self.config.min_db).max(f32::EPSILON);

        let bins = self
            .smoothed
            .iter_mut()
            .zip(self.spectrum.iter())
            .map(|(smoothed, c)| {
                *smoothed = tau * *smoothed + (1.0 - tau) * c.norm() * scale;
                let db = 20.0 * smoothed.max(1e-12).log10();
                (255.0 * (db - self.config.min_db) / range).clamp(0.0, 255.0) as u8
            })
            .collect();

        self.last = FrequencySnapshot::from_bins(bins);
        self.last.clone()
    }

    /// Forget smoothing history and buffered samples
    pub fn reset(&mut self) {
        self.tap.clear();
        self.smoothed.fill(0.0);
        self.last = FrequencySnapshot::from_bins(vec![0; self.smoothed.len()]);
    }
}

impl Default for FrequencyVisualizer {
    fn default() -> Self {
        Self::new(VisualizerConfig::default())
    }
}

impl std::fmt::Debug for FrequencyVisualizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrequencyVisualizer")
            .field("config", &self.config)
            .field("level", &self.last.level)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_silence_gives_zero_bins() {
        let mut viz = FrequencyVisualizer::default();
        let snap = viz.snapshot();
        assert_eq!(snap.bins.len(), 128);
        assert!(snap.bins.iter().all(|&b| b == 0));
        assert_eq!(snap.level, 0.0);
    }

    #[test]
    fn test_tone_peaks_in_expected_bucket() {
        let mut viz = FrequencyVisualizer::new(VisualizerConfig {
            smoothing: 0.0,
            ..Default::default()
        });
        // 16 kHz, 256-point transform: bin width 62.5 Hz, 2 kHz lands on bin 32
        viz.tap().push(&sine(2000.0, 16000.0, 256));
        let snap = viz.snapshot();

        assert_eq!(snap.bins[32], 255);
        assert!(snap.bins[100] < snap.bins[32]);
        assert!(snap.bins[5] < snap.bins[32]);
        assert!(snap.level > 0.0);
    }

    #[test]
    fn test_smoothing_decays_gradually() {
        let mut viz = FrequencyVisualizer::default();
        viz.tap().push(&sine(1000.0, 16000.0, 256));
        let loud = viz.snapshot();

        viz.tap().push(&vec![0.0; 256]);
        let after = viz.snapshot();

        assert!(after.level > 0.0);
        assert!(after.level <= loud.level);
    }

    #[test]
    fn test_busy_tap_returns_previous_snapshot() {
        let mut viz = FrequencyVisualizer::default();
        let tap = viz.tap();
        tap.push(&sine(1000.0, 16000.0, 256));
        let first = viz.snapshot();

        let _guard = tap.buffer.lock();
        assert_eq!(viz.snapshot(), first);
    }

    #[test]
    fn test_tap_capacity_keeps_newest() {
        let tap = SampleTap::new(4);
        tap.push(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut out = [0.0; 3];
        assert!(tap.try_read_latest(&mut out));
        assert_eq!(out, [4.0, 5.0, 6.0]);
    }
}
