//! # Synthesizer Module
//!
//! A small polyphonic oscillator bank used to play transcriptions back, plus
//! a clip queue for replaying recorded voice audio through the same output.
//!
//! ## Features
//! - Sine, triangle and square oscillators
//! - Short attack and release ramps so note changes do not click
//! - Voice clips resampled to the output rate
//! - CPAL output stream driven by the shared [`Mixer`]

use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::audio;
use crate::config::{PlaybackConfig, Waveform};
use crate::error::HumResult;
use crate::playback::Synthesizer;
use crate::tuning::midi_to_frequency;

const ATTACK_SECONDS: f32 = 0.005;
const RELEASE_SECONDS: f32 = 0.03;

#[derive(Debug, Clone)]
struct Voice {
    key: u8,
    phase_step: f32,
    phase: f32,
    level: f32,
    envelope: f32,
    releasing: bool,
}

#[derive(Debug, Clone)]
struct Clip {
    samples: Vec<f32>,
    position: f64,
    step: f64,
}

/// Renders sounding notes and queued clips into mono audio.
#[derive(Debug)]
pub struct Mixer {
    sample_rate: f32,
    waveform: Waveform,
    gain: f32,
    voices: Vec<Voice>,
    clips: VecDeque<Clip>,
}

impl Mixer {
    pub fn new(sample_rate: u32, config: &PlaybackConfig) -> Self {
        Self {
            sample_rate: sample_rate.max(1) as f32,
            waveform: config.waveform,
            gain: config.gain,
            voices: Vec::new(),
            clips: VecDeque::new(),
        }
    }

    pub fn note_on(&mut self, key: u8, velocity: u8) {
        let level = velocity.min(127) as f32 / 127.0;
        let phase_step = midi_to_frequency(key) / self.sample_rate;
        // Retrigger a key that is still held instead of stacking it.
        if let Some(voice) = self.voices.iter_mut().find(|v| v.key == key && !v.releasing) {
            voice.level = level;
            return;
        }
        self.voices.push(Voice {
            key,
            phase_step,
            phase: 0.0,
            level,
            envelope: 0.0,
            releasing: false,
        });
    }

    pub fn note_off(&mut self, key: u8) {
        for voice in self.voices.iter_mut().filter(|v| v.key == key) {
            voice.releasing = true;
        }
    }

    pub fn all_notes_off(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.releasing = true;
        }
    }

    /// Queues recorded audio at `sample_rate` to play after earlier clips.
    pub fn queue_clip(&mut self, samples: Vec<f32>, sample_rate: u32) {
        let step = sample_rate as f64 / self.sample_rate as f64;
        self.clips.push_back(Clip {
            samples,
            position: 0.0,
            step,
        });
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// True when nothing is sounding or queued.
    pub fn is_idle(&self) -> bool {
        self.voices.is_empty() && self.clips.is_empty()
    }

    /// Fills `out` with the next block of mono audio.
    pub fn render(&mut self, out: &mut [f32]) {
        let attack_step = 1.0 / (ATTACK_SECONDS * self.sample_rate);
        let release_step = 1.0 / (RELEASE_SECONDS * self.sample_rate);

        for sample in out.iter_mut() {
            let mut value = 0.0;

            for voice in self.voices.iter_mut() {
                if voice.releasing {
                    voice.envelope = (voice.envelope - release_step).max(0.0);
                } else {
                    voice.envelope = (voice.envelope + attack_step).min(1.0);
                }
                value += oscillator(self.waveform, voice.phase) * voice.level * voice.envelope;
                voice.phase = (voice.phase + voice.phase_step).fract();
            }

            if let Some(clip) = self.clips.front_mut() {
                let index = clip.position as usize;
                if let Some(&clip_sample) = clip.samples.get(index) {
                    value += clip_sample;
                    clip.position += clip.step;
                }
                if clip.position as usize >= clip.samples.len() {
                    self.clips.pop_front();
                }
            }

            *sample = value * self.gain;
        }

        self.voices.retain(|voice| !(voice.releasing && voice.envelope <= 0.0));
    }
}

/// One cycle of the waveform, `phase` in `0.0..1.0`.
fn oscillator(waveform: Waveform, phase: f32) -> f32 {
    match waveform {
        Waveform::Sine => (2.0 * std::f32::consts::PI * phase).sin(),
        Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
    }
}

/// A [`Synthesizer`] handle onto a shared mixer.
#[derive(Debug, Clone)]
pub struct OscillatorBank {
    mixer: Arc<Mutex<Mixer>>,
}

impl OscillatorBank {
    pub fn new(mixer: Arc<Mutex<Mixer>>) -> Self {
        Self { mixer }
    }
}

impl Synthesizer for OscillatorBank {
    fn note_on(&mut self, key: u8, velocity: u8) {
        debug!("[SYNTH] note on {key} ({velocity})");
        self.mixer.lock().note_on(key, velocity);
    }

    fn note_off(&mut self, key: u8) {
        debug!("[SYNTH] note off {key}");
        self.mixer.lock().note_off(key);
    }

    fn all_notes_off(&mut self) {
        self.mixer.lock().all_notes_off();
    }
}

/// The default output device rendering a shared [`Mixer`].
///
/// The CPAL stream is not `Send`, so this stays on the thread that opened
/// it; hand [`OscillatorBank`]s to other threads instead.
pub struct AudioOutput {
    _stream: cpal::Stream,
    mixer: Arc<Mutex<Mixer>>,
    sample_rate: u32,
}

impl AudioOutput {
    pub fn open(config: &PlaybackConfig) -> HumResult<Self> {
        let mixer = Arc::new(Mutex::new(Mixer::new(audio::TARGET_SAMPLE_RATE, config)));
        let render_mixer = Arc::clone(&mixer);
        let (stream, sample_rate) = audio::start_audio_output(move |out| render_mixer.lock().render(out))?;
        // The device rate is only known once the stream exists.
        *mixer.lock() = Mixer::new(sample_rate, config);
        debug!("[SYNTH] Output running at {sample_rate} Hz");
        Ok(Self {
            _stream: stream,
            mixer,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bank(&self) -> OscillatorBank {
        OscillatorBank::new(Arc::clone(&self.mixer))
    }

    pub fn play_clip(&self, samples: Vec<f32>, sample_rate: u32) {
        self.mixer.lock().queue_clip(samples, sample_rate);
    }

    pub fn is_idle(&self) -> bool {
        self.mixer.lock().is_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixer() -> Mixer {
        Mixer::new(1000, &PlaybackConfig::default())
    }

    #[test]
    fn test_silent_without_notes() {
        let mut mixer = mixer();
        let mut out = vec![1.0; 64];
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(mixer.is_idle());
    }

    #[test]
    fn test_note_sounds_then_releases() {
        let mut mixer = mixer();
        mixer.note_on(69, 127);
        let mut out = vec![0.0; 200];
        mixer.render(&mut out);
        assert!(out.iter().any(|&s| s.abs() > 0.01));

        mixer.note_off(69);
        mixer.render(&mut out);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_retrigger_does_not_stack() {
        let mut mixer = mixer();
        mixer.note_on(60, 80);
        mixer.note_on(60, 100);
        assert_eq!(mixer.active_voices(), 1);
    }

    #[test]
    fn test_clip_plays_once() {
        let mut mixer = mixer();
        mixer.queue_clip(vec![0.5; 10], 1000);
        let mut out = vec![0.0; 20];
        mixer.render(&mut out);
        let gain = PlaybackConfig::default().gain;
        assert!(out[..10].iter().all(|&s| (s - 0.5 * gain).abs() < 1e-6));
        assert!(out[10..].iter().all(|&s| s == 0.0));
        assert!(mixer.is_idle());
    }

    #[test]
    fn test_waveform_bounds() {
        for waveform in [Waveform::Sine, Waveform::Triangle, Waveform::Square] {
            for i in 0..100 {
                let value = oscillator(waveform, i as f32 / 100.0);
                assert!((-1.0..=1.0).contains(&value));
            }
        }
    }
}
