//! # Pitch Reference Module
//!
//! This module holds the reference table that sung frequencies are classified
//! against, plus the frequency to MIDI conversions used for playback.
//!
//! ## Features
//! - Seven natural pitch classes per octave (no sharps or flats)
//! - Six octaves of reference frequencies, built once at startup
//! - Nearest-pitch lookup with deterministic tie breaking
//! - Frequency to MIDI note conversion with a configurable correction offset

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the seven natural note names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl PitchClass {
    /// All pitch classes in table order.
    pub const ALL: [PitchClass; 7] = [
        PitchClass::C,
        PitchClass::D,
        PitchClass::E,
        PitchClass::F,
        PitchClass::G,
        PitchClass::A,
        PitchClass::B,
    ];

    /// Position of this class inside an octave row (C = 0).
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::D => "D",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::G => "G",
            PitchClass::A => "A",
            PitchClass::B => "B",
        }
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A classified pitch: a pitch class within a numbered octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pitch {
    pub octave: u8,
    pub class: PitchClass,
}

impl Pitch {
    pub fn new(class: PitchClass, octave: u8) -> Self {
        Self { octave, class }
    }

    /// Display name such as "E2".
    pub fn name(&self) -> String {
        format!("{}{}", self.class, self.octave)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class, self.octave)
    }
}

/// One row of the reference table.
#[derive(Debug, Clone, PartialEq)]
pub struct Octave {
    pub index: u8,
    /// Reference frequencies in Hz, ordered like [`PitchClass::ALL`].
    pub frequencies: [f32; 7],
}

/// Reference frequencies (Hz) for octaves 0 through 5.
const REFERENCE_FREQUENCIES: [[f32; 7]; 6] = [
    [16.35, 18.35, 20.60, 21.83, 24.50, 27.50, 30.87],
    [32.70, 36.71, 41.20, 43.65, 49.00, 55.00, 61.74],
    [65.41, 73.42, 82.41, 87.31, 98.00, 110.0, 123.5],
    [130.8, 146.8, 164.8, 174.6, 196.0, 220.0, 246.9],
    [261.6, 293.7, 329.6, 349.2, 392.0, 440.0, 493.9],
    [523.3, 587.3, 659.3, 698.5, 784.0, 880.0, 987.8],
];

/// The process-wide reference table, built once and never mutated.
static OCTAVES: Lazy<Vec<Octave>> = Lazy::new(|| {
    REFERENCE_FREQUENCIES
        .iter()
        .enumerate()
        .map(|(index, frequencies)| Octave {
            index: index as u8,
            frequencies: *frequencies,
        })
        .collect()
});

/// Returns the reference table, lowest octave first.
pub fn octaves() -> &'static [Octave] {
    &OCTAVES
}

/// Looks up the reference frequency of a pitch, if the table contains it.
pub fn reference_frequency(pitch: Pitch) -> Option<f32> {
    OCTAVES
        .get(pitch.octave as usize)
        .map(|octave| octave.frequencies[pitch.class.index()])
}

/// Finds the table entry closest to a given frequency.
///
/// Every (octave, pitch class) pair is scanned, octave ascending then pitch
/// class ascending, and the entry with the smallest absolute distance wins.
/// On a tie the first entry in scan order is kept.
///
/// # Arguments
/// * `freq` - Input frequency in Hz
///
/// # Returns
/// * The nearest [`Pitch`]. The table is never empty, so there is always one.
pub fn nearest_pitch(freq: f32) -> Pitch {
    let mut best = Pitch::new(PitchClass::C, 0);
    let mut best_distance = f32::INFINITY;

    for octave in OCTAVES.iter() {
        for (class, &reference) in PitchClass::ALL.iter().zip(octave.frequencies.iter()) {
            let distance = (reference - freq).abs();
            if distance < best_distance {
                best_distance = distance;
                best = Pitch::new(*class, octave.index);
            }
        }
    }
    best
}

/// Converts a frequency to a fractional MIDI note number (A4 = 440 Hz = 69).
pub fn frequency_to_midi(freq: f32) -> f64 {
    69.0 + 12.0 * (freq as f64 / 440.0).log2()
}

/// Converts a frequency to a playable MIDI key, shifted by `offset` semitones.
///
/// The result is rounded to the nearest key rather than truncated, and
/// clamped into `0..=127`.
pub fn corrected_midi_note(freq: f32, offset: i32) -> u8 {
    let midi = frequency_to_midi(freq).round() + offset as f64;
    if midi.is_finite() {
        midi.clamp(0.0, 127.0) as u8
    } else {
        0
    }
}

/// Frequency in Hz of a MIDI key in equal temperament.
pub fn midi_to_frequency(key: u8) -> f32 {
    440.0 * 2.0_f32.powf((key as f32 - 69.0) / 12.0)
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat.
pub fn cents_between(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_table_is_monotonic() {
        let all: Vec<f32> = octaves().iter().flat_map(|o| o.frequencies).collect();
        assert_eq!(all.len(), 42);
        assert!(all.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_nearest_pitch_example() {
        // |82.41 - 80| beats |73.42 - 80|
        assert_eq!(nearest_pitch(80.0), Pitch::new(PitchClass::E, 2));
    }

    #[test]
    fn test_nearest_pitch_is_global_minimum() {
        let mut freq = 15.0_f32;
        while freq < 1000.0 {
            let found = nearest_pitch(freq);
            let found_distance = (reference_frequency(found).unwrap() - freq).abs();
            for octave in octaves() {
                for reference in octave.frequencies {
                    assert!(found_distance <= (reference - freq).abs());
                }
            }
            freq += 0.37;
        }
    }

    #[test]
    fn test_nearest_pitch_out_of_range() {
        assert_eq!(nearest_pitch(1.0), Pitch::new(PitchClass::C, 0));
        assert_eq!(nearest_pitch(5000.0), Pitch::new(PitchClass::B, 5));
    }

    #[test]
    fn test_reference_frequencies_classify_to_themselves() {
        for octave in octaves() {
            for (class, freq) in PitchClass::ALL.iter().zip(octave.frequencies) {
                assert_eq!(nearest_pitch(freq), Pitch::new(*class, octave.index));
            }
        }
    }

    #[test]
    fn test_frequency_to_midi() {
        assert_abs_diff_eq!(frequency_to_midi(440.0), 69.0, epsilon = 1e-9);
        assert_abs_diff_eq!(frequency_to_midi(220.0), 57.0, epsilon = 1e-9);
    }

    #[test]
    fn test_corrected_midi_note() {
        assert_eq!(corrected_midi_note(440.0, 0), 69);
        assert_eq!(corrected_midi_note(110.0, 28), 45 + 28);
        // 115 Hz is key 45.77, which rounds up.
        assert_eq!(corrected_midi_note(115.0, 0), 46);
        assert_eq!(corrected_midi_note(20_000.0, 28), 127);
        assert_eq!(corrected_midi_note(10.0, -60), 0);
    }

    #[test]
    fn test_midi_to_frequency() {
        assert_abs_diff_eq!(midi_to_frequency(69), 440.0, epsilon = 1e-3);
        assert_abs_diff_eq!(midi_to_frequency(57), 220.0, epsilon = 1e-3);
    }

    #[test]
    fn test_cents_between() {
        assert_abs_diff_eq!(cents_between(880.0, 440.0), 1200.0, epsilon = 1e-3);
        assert_abs_diff_eq!(cents_between(440.0, 440.0), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_pitch_name() {
        assert_eq!(Pitch::new(PitchClass::E, 2).name(), "E2");
        assert_eq!(Pitch::new(PitchClass::B, 5).to_string(), "B5");
    }
}
