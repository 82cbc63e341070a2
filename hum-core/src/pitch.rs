//! # Pitch Detection Module
//!
//! Fundamental frequency estimation for a sung voice.
//!
//! ## Features
//! - YIN pitch detection restricted to a frequency band
//! - Noise rejection and clarity checking
//! - Parabolic interpolation for sub-sample accuracy
//! - Spectrum refinement for improved precision

/// Root mean square level of a frame.
pub fn rms(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    (signal.iter().map(|&s| s * s).sum::<f32>() / signal.len() as f32).sqrt()
}

/// YIN pitch detection limited to `min_hz..=max_hz`.
///
/// Restricting the lag search to the band plays the role of the high-pass
/// and low-pass filters in front of a hardware tracker: nothing below
/// `min_hz` or above `max_hz` can be reported.
///
/// # Arguments
/// * `signal` - Input audio signal
/// * `sample_rate` - Sample rate in Hz
/// * `min_hz`, `max_hz` - Band the fundamental must fall in
/// * `amplitude_threshold` - Minimum RMS level for pitch detection
///
/// # Returns
/// * `Some(frequency)` - Detected frequency in Hz
/// * `None` - No pitch detected (silence, noise, or out of band)
pub fn detect_pitch_yin(
    signal: &[f32],
    sample_rate: u32,
    min_hz: f32,
    max_hz: f32,
    amplitude_threshold: f32,
) -> Option<f32> {
    let half = signal.len() / 2;
    if half < 3 || min_hz <= 0.0 || max_hz <= min_hz {
        return None;
    }

    // --- Noise gate ---
    if rms(signal) < amplitude_threshold {
        return None;
    }

    let min_tau = ((sample_rate as f32 / max_hz).floor() as usize).max(2);
    let max_tau = ((sample_rate as f32 / min_hz).ceil() as usize).min(half - 2);
    if min_tau >= max_tau {
        return None;
    }

    // --- Difference function ---
    let mut yin_buffer = vec![0.0_f32; max_tau + 2];
    for tau in 1..(max_tau + 2) {
        let mut diff = 0.0;
        for i in 0..half {
            let delta = signal[i] - signal[i + tau];
            diff += delta * delta;
        }
        yin_buffer[tau] = diff;
    }

    // --- Cumulative mean normalized difference ---
    let mut running_sum = 0.0;
    yin_buffer[0] = 1.0;
    for tau in 1..yin_buffer.len() {
        running_sum += yin_buffer[tau];
        if running_sum != 0.0 {
            yin_buffer[tau] *= tau as f32 / running_sum;
        } else {
            yin_buffer[tau] = 1.0;
        }
    }

    // --- First significant dip inside the band, to avoid octave errors ---
    let min_val = yin_buffer[min_tau..=max_tau]
        .iter()
        .cloned()
        .fold(f32::INFINITY, f32::min);
    let threshold = min_val + 0.05;

    let mut period = 0;
    for tau in min_tau..=max_tau {
        if yin_buffer[tau] < threshold && yin_buffer[tau] <= yin_buffer[tau + 1] {
            period = tau;
            break;
        }
    }

    // A clear tone has a very low value at its period; anything else is noise.
    const CLARITY_THRESHOLD: f32 = 0.2;
    if period == 0 || yin_buffer[period] > CLARITY_THRESHOLD {
        return None;
    }

    // --- Parabolic interpolation ---
    let y1 = yin_buffer[period - 1];
    let y2 = yin_buffer[period];
    let y3 = yin_buffer[period + 1];

    let period_float = if (y1 - 2.0 * y2 + y3) != 0.0 {
        let peak_shift = (y1 - y3) / (2.0 * (y1 - 2.0 * y2 + y3));
        period as f32 + peak_shift
    } else {
        period as f32
    };

    let frequency = sample_rate as f32 / period_float;
    if frequency.is_finite() && frequency >= min_hz * 0.9 && frequency <= max_hz * 1.1 {
        Some(frequency)
    } else {
        None
    }
}

/// Refines a frequency estimate using a pre-computed magnitude spectrum.
///
/// Looks for the strongest bin near the estimate and interpolates between
/// its neighbours on a log scale.
///
/// # Returns
/// * The refined frequency, or `rough_freq` when refinement is not possible
pub fn refine_from_spectrum(spectrum_magnitudes: &[f32], rough_freq: f32, sample_rate: u32) -> f32 {
    if rough_freq <= 0.0 || spectrum_magnitudes.len() < 3 {
        return rough_freq;
    }
    let buffer_size = spectrum_magnitudes.len() * 2;
    let target_bin = (rough_freq * buffer_size as f32) / sample_rate as f32;
    let search_radius = 2.0;
    let start_bin = (target_bin - search_radius).max(0.0) as usize;
    let end_bin = (target_bin + search_radius).min((spectrum_magnitudes.len() - 1) as f32) as usize;
    if start_bin >= end_bin {
        return rough_freq;
    }

    let peak_bin = match spectrum_magnitudes[start_bin..=end_bin]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
    {
        Some((offset, _)) => start_bin + offset,
        None => return rough_freq,
    };

    if peak_bin == 0 || peak_bin >= spectrum_magnitudes.len() - 1 {
        return rough_freq;
    }

    let y1 = spectrum_magnitudes[peak_bin - 1].ln();
    let y2 = spectrum_magnitudes[peak_bin].ln();
    let y3 = spectrum_magnitudes[peak_bin + 1].ln();
    if !y1.is_finite() || !y2.is_finite() || !y3.is_finite() {
        return rough_freq;
    }

    let denominator = 2.0 * y2 - y1 - y3;
    if denominator.abs() < 1e-6 {
        return rough_freq;
    }

    let peak_shift = (y3 - y1) / (2.0 * denominator);
    let interpolated_bin = peak_bin as f32 + peak_shift;
    let final_freq = (interpolated_bin * sample_rate as f32) / buffer_size as f32;

    // Only trust the spectrum when it agrees with the time-domain estimate.
    if final_freq.is_finite() && (final_freq - rough_freq).abs() < rough_freq * 0.01 {
        final_freq
    } else {
        rough_freq
    }
}
