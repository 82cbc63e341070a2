//! # Tracks and Projects
//!
//! A project groups recordings: transcribed melodies replayed on the
//! synthesizer, and raw voice recordings replayed as audio. Projects are
//! saved to and loaded from JSON.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::PlaybackConfig;
use crate::error::HumResult;
use crate::note::NoteEvent;
use crate::playback::{PlaybackTimeline, Player, Synthesizer};

/// One recording in a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Track {
    /// A transcription, played on the synthesizer.
    Piano {
        title: String,
        notes: Vec<NoteEvent>,
        /// Session length in seconds, used to end a final open note.
        duration: Option<f64>,
    },
    /// Raw audio from the microphone.
    Voice { title: String, file: PathBuf },
}

impl Track {
    pub fn title(&self) -> &str {
        match self {
            Track::Piano { title, .. } | Track::Voice { title, .. } => title,
        }
    }

    /// The synthesizer timeline for a piano track.
    pub fn timeline(&self, config: &PlaybackConfig) -> Option<PlaybackTimeline> {
        match self {
            Track::Piano { notes, duration, .. } => Some(PlaybackTimeline::compile(notes, *duration, config)),
            Track::Voice { .. } => None,
        }
    }
}

/// Where a project plays: a synthesizer per piano track and an audio
/// queue for voice tracks.
pub trait PlaybackSink {
    type Synth: Synthesizer + 'static;

    fn synthesizer(&self) -> Self::Synth;
    fn play_clip(&self, samples: Vec<f32>, sample_rate: u32);
}

impl PlaybackSink for crate::synth::AudioOutput {
    type Synth = crate::synth::OscillatorBank;

    fn synthesizer(&self) -> Self::Synth {
        self.bank()
    }

    fn play_clip(&self, samples: Vec<f32>, sample_rate: u32) {
        crate::synth::AudioOutput::play_clip(self, samples, sample_rate);
    }
}

/// An ordered collection of tracks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub tracks: Vec<Track>,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, track: Track) {
        self.tracks.push(track);
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Starts every track at once.
    ///
    /// Piano tracks each get a [`Player`]; voice tracks are loaded and
    /// queued on the sink. A voice file that cannot be read is skipped.
    pub fn play<S: PlaybackSink>(&self, sink: &S, config: &PlaybackConfig) -> Vec<Player> {
        let mut players = Vec::new();
        for track in &self.tracks {
            match track {
                Track::Piano { .. } => {
                    if let Some(timeline) = track.timeline(config) {
                        info!("[PROJECT] Playing piano track '{}'", track.title());
                        players.push(Player::spawn(timeline, sink.synthesizer()));
                    }
                }
                Track::Voice { file, .. } => match read_wav(file) {
                    Ok((samples, sample_rate)) => {
                        info!("[PROJECT] Playing voice track '{}'", track.title());
                        sink.play_clip(samples, sample_rate);
                    }
                    Err(e) => warn!("[PROJECT] Skipping voice track '{}': {e}", track.title()),
                },
            }
        }
        players
    }

    /// Saves the project as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> HumResult<()> {
        let json_string = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> HumResult<Self> {
        let mut file = File::open(path)?;
        let mut data = String::new();
        file.read_to_string(&mut data)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Loads `path` if it exists, otherwise starts an empty project.
    pub fn load_or_default(path: impl AsRef<Path>) -> HumResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Reads a WAV file as mono f32 samples.
pub fn read_wav(path: impl AsRef<Path>) -> HumResult<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };
    Ok((mono, spec.sample_rate))
}
