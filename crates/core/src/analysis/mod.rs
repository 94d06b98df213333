use std::{
    f32::consts::PI,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{AudioConfig, PulseError, Result};

/// Snapshot of the magnitude spectrum, one byte per frequency bin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyFrame(Vec<u8>);

impl FrequencyFrame {
    pub fn new(bins: Vec<u8>) -> Self {
        Self(bins)
    }

    /// A frame of `bin_count` silent bins.
    pub fn silent(bin_count: usize) -> Self {
        Self(vec![0; bin_count])
    }

    pub fn bins(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Magnitude of bin `index` scaled to `[0, 1]`.
    pub fn level(&self, index: usize) -> f32 {
        self.0.get(index).map_or(0.0, |&m| f32::from(m) / 255.0)
    }
}

/// Read-only spectrum tap attached to the live signal path.
///
/// Playback pushes every block it emits through [`FrequencyAnalyzer::push_samples`];
/// the render loop reads [`FrequencyAnalyzer::snapshot`] at whatever rate it
/// likes. Clones share the same tap.
#[derive(Clone)]
pub struct FrequencyAnalyzer {
    shared: Arc<Mutex<AnalyzerState>>,
    bin_count: usize,
}

impl FrequencyAnalyzer {
    pub fn new(config: &AudioConfig) -> Result<Self> {
        if config.bin_count == 0 {
            return Err(PulseError::InvalidInput("bin count must be positive"));
        }
        if !(0.0..1.0).contains(&config.smoothing) {
            return Err(PulseError::InvalidInput("smoothing must lie in [0, 1)"));
        }
        if config.max_decibels <= config.min_decibels {
            return Err(PulseError::InvalidInput(
                "max decibels must exceed min decibels",
            ));
        }

        let state = AnalyzerState::new(config);
        Ok(Self {
            shared: Arc::new(Mutex::new(state)),
            bin_count: config.bin_count,
        })
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    pub fn fft_size(&self) -> usize {
        self.bin_count * 2
    }

    /// Feeds mono samples into the tap's sliding window.
    pub fn push_samples(&self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut state = self.lock()?;
        state.push(samples);
        Ok(())
    }

    /// Pushes `samples` only while `live` still holds, checked under the tap's
    /// lock so a concurrent [`FrequencyAnalyzer::silence`] always wins.
    pub(crate) fn push_while(&self, samples: &[f32], live: impl FnOnce() -> bool) -> Result<()> {
        let mut state = self.lock()?;
        if live() {
            state.push(samples);
        }
        Ok(())
    }

    /// Zeroes the sample window but keeps smoothing history, so later
    /// snapshots decay towards silence instead of repeating the last block.
    pub fn silence(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.window.iter_mut().for_each(|s| *s = 0.0);
        Ok(())
    }

    /// Returns the current magnitude distribution, exactly `bin_count` bins.
    pub fn snapshot(&self) -> Result<FrequencyFrame> {
        let mut state = self.lock()?;
        state.analyse()
    }

    /// Forgets buffered samples and smoothing history.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.window.iter_mut().for_each(|s| *s = 0.0);
        state.smoothed.iter_mut().for_each(|m| *m = 0.0);
        state.write_pos = 0;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, AnalyzerState>> {
        self.shared
            .lock()
            .map_err(|_| PulseError::msg("frequency analyzer has been poisoned"))
    }
}

impl fmt::Debug for FrequencyAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrequencyAnalyzer")
            .field("bin_count", &self.bin_count)
            .finish()
    }
}

struct AnalyzerState {
    window: Vec<f32>,
    write_pos: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    smoothed: Vec<f32>,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
}

impl AnalyzerState {
    fn new(config: &AudioConfig) -> Self {
        let size = config.fft_size();
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(size);
        let input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();

        Self {
            window: vec![0.0; size],
            write_pos: 0,
            plan,
            input,
            spectrum,
            scratch,
            smoothed: vec![0.0; config.bin_count],
            smoothing: config.smoothing,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
        }
    }

    fn push(&mut self, samples: &[f32]) {
        let size = self.window.len();
        for &sample in samples {
            self.window[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % size;
        }
    }

    fn analyse(&mut self) -> Result<FrequencyFrame> {
        let size = self.window.len();
        for i in 0..size {
            let sample = self.window[(self.write_pos + i) % size];
            self.input[i] = sample * blackman_value(i, size);
        }

        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)?;

        let range = self.max_decibels - self.min_decibels;
        let scale = 1.0 / size as f32;
        let tau = self.smoothing;
        let mut bins = Vec::with_capacity(self.smoothed.len());

        for (bin, smoothed) in self.spectrum.iter().zip(self.smoothed.iter_mut()) {
            let magnitude = bin.norm() * scale;
            *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;
            if !smoothed.is_finite() {
                *smoothed = 0.0;
            }

            let byte = if *smoothed <= 0.0 {
                0
            } else {
                let db = 20.0 * smoothed.log10();
                (255.0 * (db - self.min_decibels) / range).clamp(0.0, 255.0) as u8
            };
            bins.push(byte);
        }

        Ok(FrequencyFrame(bins))
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    const A0: f32 = 0.42;
    const A1: f32 = 0.5;
    const A2: f32 = 0.08;

    let phase = 2.0 * PI * index as f32 / len as f32;
    A0 - A1 * phase.cos() + A2 * (2.0 * phase).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer(bin_count: usize, smoothing: f32) -> FrequencyAnalyzer {
        FrequencyAnalyzer::new(&AudioConfig {
            bin_count,
            smoothing,
            ..Default::default()
        })
        .unwrap()
    }

    fn sine_at_bin(bin: usize, size: usize) -> Vec<f32> {
        (0..size)
            .map(|n| (2.0 * PI * bin as f32 * n as f32 / size as f32).sin())
            .collect()
    }

    #[test]
    fn silence_produces_zeroed_frame_of_bin_count() {
        let analyzer = analyzer(128, 0.8);
        let frame = analyzer.snapshot().unwrap();

        assert_eq!(frame.len(), 128);
        assert!(frame.bins().iter().all(|&m| m == 0));
    }

    #[test]
    fn pure_tone_peaks_in_its_bin() {
        let analyzer = analyzer(64, 0.0);
        analyzer.push_samples(&sine_at_bin(8, 128)).unwrap();

        let frame = analyzer.snapshot().unwrap();
        assert_eq!(frame.len(), 64);
        assert_eq!(frame.bins()[8], 255);
        assert!(frame.bins()[40] < 50, "far bin leaked: {}", frame.bins()[40]);
    }

    #[test]
    fn smoothing_carries_energy_into_later_snapshots() {
        let analyzer = analyzer(64, 0.8);
        analyzer.push_samples(&sine_at_bin(4, 128)).unwrap();
        let loud = analyzer.snapshot().unwrap();

        analyzer.push_samples(&[0.0; 128]).unwrap();
        let fading = analyzer.snapshot().unwrap();

        assert!(fading.bins()[4] > 0);
        assert!(fading.bins()[4] <= loud.bins()[4]);
    }

    #[test]
    fn snapshot_length_is_stable_under_any_push_pattern() {
        let analyzer = analyzer(32, 0.5);
        for chunk in [1usize, 7, 64, 300] {
            analyzer.push_samples(&vec![1.0; chunk]).unwrap();
            assert_eq!(analyzer.snapshot().unwrap().len(), 32);
        }
    }

    #[test]
    fn reset_clears_history() {
        let analyzer = analyzer(64, 0.0);
        analyzer.push_samples(&sine_at_bin(8, 128)).unwrap();
        analyzer.reset().unwrap();

        let frame = analyzer.snapshot().unwrap();
        assert!(frame.bins().iter().all(|&m| m == 0));
    }

    #[test]
    fn silenced_tap_decays_to_zero() {
        let analyzer = analyzer(64, 0.8);
        analyzer.push_samples(&sine_at_bin(8, 128)).unwrap();
        assert!(analyzer.snapshot().unwrap().bins()[8] > 200);

        analyzer.silence().unwrap();
        let fading = analyzer.snapshot().unwrap();
        assert!(fading.bins()[8] > 0);

        let settled = (0..200).map(|_| analyzer.snapshot().unwrap()).last().unwrap();
        assert!(settled.bins().iter().all(|&m| m == 0), "{:?}", settled.bins());
    }

    #[test]
    fn push_while_skips_samples_once_detached() {
        let analyzer = analyzer(64, 0.0);
        analyzer.push_while(&sine_at_bin(8, 128), || false).unwrap();
        assert!(analyzer.snapshot().unwrap().bins().iter().all(|&m| m == 0));

        analyzer.push_while(&sine_at_bin(8, 128), || true).unwrap();
        assert_eq!(analyzer.snapshot().unwrap().bins()[8], 255);
    }

    #[test]
    fn rejects_degenerate_configuration() {
        let config = AudioConfig {
            bin_count: 0,
            ..Default::default()
        };
        assert!(FrequencyAnalyzer::new(&config).is_err());

        let config = AudioConfig {
            smoothing: 1.0,
            ..Default::default()
        };
        assert!(FrequencyAnalyzer::new(&config).is_err());
    }

    #[test]
    fn frame_level_is_normalised() {
        let frame = FrequencyFrame::new(vec![0, 255, 51]);
        assert_eq!(frame.level(0), 0.0);
        assert_eq!(frame.level(1), 1.0);
        assert!((frame.level(2) - 0.2).abs() < 1e-6);
        assert_eq!(frame.level(9), 0.0);
    }
}
