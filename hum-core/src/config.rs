//! # Configuration Module
//!
//! Tunable constants for the segmentation engine, the capture side and
//! playback. Everything has a default that reproduces the reference
//! recorder, and the whole set can be saved to and loaded from a JSON file.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{HumError, HumResult};

/// Settings owned by the note segmentation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Samples with an amplitude at or below this level count as silence.
    pub silence_threshold: f32,
    /// Raw samples averaged into one decision point.
    pub smoothing_window_size: usize,
    /// Semitones added to the tracker's MIDI estimate before playback.
    pub midi_correction_offset: i32,
    /// Whether `stop_session` closes a note that is still sounding.
    pub close_open_note_on_stop: bool,
    /// Amplitudes above this are treated as malformed readings.
    pub max_amplitude: f32,
    /// Whether the pitch of a note already ended by silence may start a new
    /// note. When false, singing it again adds nothing to the log.
    pub reopen_same_pitch_after_silence: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 0.12,
            smoothing_window_size: 6,
            midi_correction_offset: 28,
            close_open_note_on_stop: false,
            max_amplitude: 1.0,
            reopen_same_pitch_after_silence: false,
        }
    }
}

/// Settings for microphone capture and frequency tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// How often the latest tracker estimate is handed to the engine.
    pub poll_interval_ms: u64,
    /// Lowest frequency the tracker will report.
    pub high_pass_hz: f32,
    /// Highest frequency the tracker will report.
    pub low_pass_hz: f32,
    /// RMS level below which pitch detection is not attempted.
    pub yin_amplitude_floor: f32,
    /// Optional WAV file receiving the raw voice while recording.
    pub record_voice: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            high_pass_hz: 32.0,
            low_pass_hz: 550.0,
            yin_amplitude_floor: 0.001,
            record_voice: None,
        }
    }
}

/// Oscillator shapes offered by the playback synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
}

/// Settings for replaying a transcription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub velocity: u8,
    /// Seconds an unterminated final note keeps sounding when the session
    /// length is unknown.
    pub trailing_note_hold: f64,
    pub waveform: Waveform,
    pub gain: f32,
    pub midi_ticks_per_beat: u16,
    pub midi_bpm: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            velocity: 80,
            trailing_note_hold: 0.5,
            waveform: Waveform::Sine,
            gain: 0.2,
            midi_ticks_per_beat: 480,
            midi_bpm: 120,
        }
    }
}

/// The complete configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HumConfig {
    pub engine: EngineConfig,
    pub capture: CaptureConfig,
    pub playback: PlaybackConfig,
}

impl HumConfig {
    /// Loads a configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> HumResult<Self> {
        let mut file = File::open(path)?;
        let mut data = String::new();
        file.read_to_string(&mut data)?;
        let config: HumConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> HumResult<()> {
        let json_string = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }

    /// Rejects values that would make the engine or tracker meaningless.
    pub fn validate(&self) -> HumResult<()> {
        if !self.engine.silence_threshold.is_finite() || self.engine.silence_threshold < 0.0 {
            return Err(HumError::Config(format!(
                "silence_threshold must be a non-negative number, got {}",
                self.engine.silence_threshold
            )));
        }
        if self.engine.max_amplitude <= self.engine.silence_threshold {
            return Err(HumError::Config(
                "max_amplitude must be above silence_threshold".to_string(),
            ));
        }
        if self.capture.poll_interval_ms == 0 {
            return Err(HumError::Config("poll_interval_ms must be at least 1".to_string()));
        }
        if self.capture.high_pass_hz <= 0.0 || self.capture.low_pass_hz <= self.capture.high_pass_hz {
            return Err(HumError::Config(format!(
                "invalid tracking band {} - {} Hz",
                self.capture.high_pass_hz, self.capture.low_pass_hz
            )));
        }
        if self.playback.velocity > 127 {
            return Err(HumError::Config("velocity must be at most 127".to_string()));
        }
        if self.playback.midi_bpm < crate::midi::MIN_BPM {
            return Err(HumError::Config(format!(
                "midi_bpm must be at least {}, got {}",
                crate::midi::MIN_BPM,
                self.playback.midi_bpm
            )));
        }
        if self.playback.midi_ticks_per_beat == 0 {
            return Err(HumError::Config("midi_ticks_per_beat must be positive".to_string()));
        }
        Ok(())
    }
}
