//! # Note Segmentation Engine
//!
//! Turns the tracker's stream of `(frequency, amplitude)` readings into the
//! session's [`NoteEventLog`].
//!
//! Each sample is handled in this order:
//! 1. Samples arriving while no session is running are ignored.
//! 2. Malformed samples are logged and skipped.
//! 3. Silence (amplitude at or below the threshold) closes a sounding note.
//! 4. Otherwise the frequency is buffered; once the smoothing window is full
//!    the mean is classified against the pitch table and a new note is
//!    opened if the pitch differs from the last note's.
//!
//! Samples must arrive in non-decreasing timestamp order.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::SampleError;
use crate::note::{LogSignal, NoteEvent, NoteEventLog};
use crate::smoothing::FrequencyBuffer;
use crate::tuning;

/// A single reading from the frequency tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Fundamental frequency estimate in Hz.
    pub frequency: f32,
    /// Signal level, nominally 0.0 to 1.0.
    pub amplitude: f32,
    /// Seconds since the session began.
    pub timestamp: f64,
}

impl RawSample {
    pub fn new(frequency: f32, amplitude: f32, timestamp: f64) -> Self {
        Self {
            frequency,
            amplitude,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No session.
    Idle,
    /// Session running, nothing sounding.
    Listening,
    /// Session running, the log's last note is open.
    Tracking,
}

/// What the engine did with one sample.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// No session was running.
    Ignored,
    Rejected(SampleError),
    /// Silence; `closed` tells whether a sounding note was ended.
    Silence { closed: bool },
    /// Buffered, the smoothing window is not full yet.
    Accumulated,
    /// A decision point was reached.
    Decision { opened: bool },
}

/// Counters for the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub accepted: u64,
    pub rejected: u64,
    pub decision_points: u64,
}

/// The state machine that segments a session into notes.
#[derive(Debug)]
pub struct SegmentationEngine {
    config: EngineConfig,
    state: EngineState,
    buffer: FrequencyBuffer,
    log: NoteEventLog,
    last_timestamp: Option<f64>,
    session_end: Option<f64>,
    stats: SessionStats,
}

impl SegmentationEngine {
    pub fn new(config: EngineConfig) -> Self {
        let buffer = FrequencyBuffer::new(config.smoothing_window_size);
        Self {
            config,
            state: EngineState::Idle,
            buffer,
            log: NoteEventLog::new(),
            last_timestamp: None,
            session_end: None,
            stats: SessionStats::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state != EngineState::Idle
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Time of the last sample accepted in the current or last session.
    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    /// Stop time of the last finished session.
    pub fn session_end(&self) -> Option<f64> {
        self.session_end
    }

    /// A copy of the log as it is right now.
    pub fn current_log(&self) -> Vec<NoteEvent> {
        self.log.snapshot()
    }

    pub fn log(&self) -> &NoteEventLog {
        &self.log
    }

    pub fn subscribe(&mut self) -> Receiver<LogSignal> {
        self.log.subscribe()
    }

    /// Begins a new session with an empty log. A running session is
    /// replaced.
    pub fn start_session(&mut self) {
        if self.is_recording() {
            warn!("[ENGINE] Session started while another was running; discarding it");
        }
        self.buffer.clear();
        self.last_timestamp = None;
        self.session_end = None;
        self.stats = SessionStats::default();
        self.state = EngineState::Listening;
        self.log.reset();
        info!("[ENGINE] Session started");
    }

    /// Ends the session at the last accepted sample's time.
    pub fn stop_session(&mut self) {
        let time = self.last_timestamp.unwrap_or(0.0);
        self.stop_session_at(time);
    }

    /// Ends the session at `time`, freezing the log.
    ///
    /// A sounding note is closed at `time` only when
    /// `close_open_note_on_stop` is set. Stopping with no session is a no-op.
    pub fn stop_session_at(&mut self, time: f64) {
        if !self.is_recording() {
            return;
        }
        let time = match self.last_timestamp {
            Some(last) if last > time => last,
            _ => time,
        };
        if self.config.close_open_note_on_stop && self.log.close_tail(time) {
            debug!("[ENGINE] Closed sounding note at stop ({time:.3}s)");
        }
        self.state = EngineState::Idle;
        self.session_end = Some(time);
        self.log.notify(LogSignal::SessionStopped);
        info!(
            "[ENGINE] Session stopped at {:.3}s: {} notes, {} samples, {} rejected",
            time,
            self.log.len(),
            self.stats.accepted,
            self.stats.rejected
        );
    }

    /// Feeds one tracker reading into the state machine.
    pub fn on_sample(&mut self, sample: RawSample) -> SampleOutcome {
        if !self.is_recording() {
            return SampleOutcome::Ignored;
        }
        if let Err(e) = self.validate(&sample) {
            self.stats.rejected += 1;
            warn!("[ENGINE] Skipping sample: {e}");
            return SampleOutcome::Rejected(e);
        }
        self.stats.accepted += 1;
        self.last_timestamp = Some(sample.timestamp);

        if sample.amplitude <= self.config.silence_threshold {
            let closed = self.state == EngineState::Tracking && self.log.close_tail(sample.timestamp);
            if closed {
                debug!("[ENGINE] Silence closed note at {:.3}s", sample.timestamp);
            }
            self.state = EngineState::Listening;
            return SampleOutcome::Silence { closed };
        }

        self.buffer.push(sample.frequency);
        if !self.buffer.is_ready() {
            return SampleOutcome::Accumulated;
        }

        self.stats.decision_points += 1;
        let opened = self.decide(&sample);
        SampleOutcome::Decision { opened }
    }

    fn validate(&self, sample: &RawSample) -> Result<(), SampleError> {
        if !sample.timestamp.is_finite() {
            return Err(SampleError::NonFiniteTimestamp);
        }
        let amplitude = sample.amplitude;
        if !amplitude.is_finite() || amplitude < 0.0 || amplitude > self.config.max_amplitude {
            return Err(SampleError::AmplitudeOutOfRange(amplitude));
        }
        if let Some(previous) = self.last_timestamp {
            if sample.timestamp < previous {
                return Err(SampleError::TimestampRegressed {
                    previous,
                    current: sample.timestamp,
                });
            }
        }
        // The tracker reports 0 Hz while nobody sings, so silent samples skip
        // the frequency checks.
        if amplitude <= self.config.silence_threshold {
            return Ok(());
        }
        if !sample.frequency.is_finite() {
            return Err(SampleError::NonFiniteFrequency);
        }
        if sample.frequency <= 0.0 {
            return Err(SampleError::NonPositiveFrequency(sample.frequency));
        }
        Ok(())
    }

    /// Classifies the full smoothing window. Returns true if a note opened.
    fn decide(&mut self, sample: &RawSample) -> bool {
        let smoothed = self.buffer.consume();
        let pitch = tuning::nearest_pitch(smoothed);
        let now = sample.timestamp;

        // A closed tail still counts unless the policy re-opens it.
        let reopen = self.config.reopen_same_pitch_after_silence;
        let tail = self.log.last().filter(|last| !reopen || last.is_open());
        if tail.is_some_and(|last| last.pitch == pitch) {
            return false;
        }

        let event = NoteEvent {
            pitch,
            detected_frequency: smoothed,
            start: now,
            end: None,
            midi_note: tuning::corrected_midi_note(sample.frequency, self.config.midi_correction_offset),
        };

        if let Some(last) = self.log.last() {
            if last.start >= now {
                // Two decisions at the same instant; keep starts strictly
                // increasing.
                if self.log.reclassify_tail(event) {
                    debug!("[ENGINE] Reclassified note at {now:.3}s as {pitch}");
                    self.state = EngineState::Tracking;
                }
                return false;
            }
        }

        if self.log.close_tail(now) {
            debug!("[ENGINE] Pitch changed, closed previous note at {now:.3}s");
        }
        if let Some(reference) = tuning::reference_frequency(pitch) {
            debug!(
                "[ENGINE] Opened {} at {:.3}s ({:.1} Hz, {:+.0} cents, key {})",
                pitch,
                now,
                smoothed,
                tuning::cents_between(smoothed, reference),
                event.midi_note
            );
        }
        self.log.open(event);
        self.state = EngineState::Tracking;
        true
    }
}

/// A segmentation engine shared between the capture thread and whoever
/// controls the session.
///
/// Every call takes the same lock, so stopping a session never interleaves
/// with a sample half-way through processing, and snapshots are consistent.
#[derive(Debug, Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<SegmentationEngine>>,
}

impl SharedEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SegmentationEngine::new(config))),
        }
    }

    pub fn start_session(&self) {
        self.inner.lock().start_session();
    }

    pub fn stop_session(&self) {
        self.inner.lock().stop_session();
    }

    pub fn stop_session_at(&self, time: f64) {
        self.inner.lock().stop_session_at(time);
    }

    pub fn on_sample(&self, sample: RawSample) -> SampleOutcome {
        self.inner.lock().on_sample(sample)
    }

    pub fn current_log(&self) -> Vec<NoteEvent> {
        self.inner.lock().current_log()
    }

    pub fn subscribe(&self) -> Receiver<LogSignal> {
        self.inner.lock().subscribe()
    }

    pub fn state(&self) -> EngineState {
        self.inner.lock().state()
    }

    pub fn is_recording(&self) -> bool {
        self.inner.lock().is_recording()
    }

    pub fn stats(&self) -> SessionStats {
        self.inner.lock().stats()
    }

    pub fn session_end(&self) -> Option<f64> {
        self.inner.lock().session_end()
    }

    /// Runs `f` with the engine locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut SegmentationEngine) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
