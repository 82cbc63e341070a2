//! # Fast Fourier Transform (FFT) Module
//!
//! Magnitude spectra used to sharpen the tracker's frequency estimate.
//!
//! ## Features
//! - FFT planned once per frame size using RustFFT
//! - Hann windowing for reduced spectral leakage
//! - DC offset removal for accurate analysis

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Applies a Hann window to the input buffer to reduce spectral leakage.
fn apply_hann_window(buffer: &mut [f32]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// A forward FFT planned for one frame size.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    size: usize,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer").field("size", &self.size).finish()
    }
}

impl SpectrumAnalyzer {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        Self { fft, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the magnitude spectrum up to the Nyquist frequency.
    ///
    /// Frames shorter than the planned size are zero-padded, longer ones
    /// truncated.
    pub fn magnitudes(&self, signal: &[f32]) -> Vec<f32> {
        let mut processed = vec![0.0; self.size];
        let len = signal.len().min(self.size);
        processed[..len].copy_from_slice(&signal[..len]);
        remove_dc_offset(&mut processed[..len]);
        apply_hann_window(&mut processed[..len]);

        let mut buffer: Vec<Complex<f32>> = processed
            .into_iter()
            .map(|sample| Complex { re: sample, im: 0.0 })
            .collect();
        self.fft.process(&mut buffer);

        buffer
            .iter()
            .take(self.size / 2)
            .map(|c| c.norm()) // .norm() is sqrt(re^2 + im^2)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_bin_matches_tone() {
        let size = 2048;
        let sample_rate = 44100.0;
        // Pick a frequency that falls exactly on bin 20.
        let freq = 20.0 * sample_rate / size as f32;
        let signal: Vec<f32> = (0..size)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect();

        let analyzer = SpectrumAnalyzer::new(size);
        let magnitudes = analyzer.magnitudes(&signal);
        assert_eq!(magnitudes.len(), size / 2);

        let peak = magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 20);
    }

    #[test]
    fn test_dc_is_removed() {
        let analyzer = SpectrumAnalyzer::new(256);
        let magnitudes = analyzer.magnitudes(&vec![0.7; 256]);
        assert!(magnitudes[0] < 1e-3);
    }
}
