// hum-core/src/lib.rs

//! The core logic for the hum melody recorder.
//! This crate turns a sung melody into discrete notes and plays them back:
//! audio capture, frequency tracking, note segmentation, playback scheduling
//! and synthesis. It is completely headless and contains no UI code.

pub mod audio;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod fft;
pub mod midi;
pub mod note;
pub mod pitch;
pub mod playback;
pub mod smoothing;
pub mod synth;
pub mod track;
pub mod tracker;
pub mod tuning;

pub use config::{CaptureConfig, EngineConfig, HumConfig, PlaybackConfig, Waveform};
pub use engine::{EngineState, RawSample, SampleOutcome, SegmentationEngine, SessionStats, SharedEngine};
pub use error::{HumError, HumResult, SampleError};
pub use note::{LogSignal, NoteEvent, NoteEventLog};
pub use playback::{PlaybackTimeline, Player, Synthesizer};
pub use track::{Project, Track};
pub use tuning::{Pitch, PitchClass};
