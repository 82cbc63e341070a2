//! # Playback Module
//!
//! Compiles a frozen note log into an ordered note-on / note-off timeline
//! and plays it against a [`Synthesizer`] on a background thread.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};
use log::{debug, error, info};

use crate::config::PlaybackConfig;
use crate::note::NoteEvent;

/// The boundary to whatever makes sound.
pub trait Synthesizer: Send {
    fn note_on(&mut self, key: u8, velocity: u8);
    fn note_off(&mut self, key: u8);
    fn all_notes_off(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackAction {
    NoteOn { key: u8, velocity: u8 },
    NoteOff { key: u8 },
}

/// One action at an offset (seconds) from the start of playback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledEvent {
    pub at: f64,
    pub action: PlaybackAction,
}

/// Note-on / note-off events ordered by time.
///
/// For consecutive notes the off of one is never later than the on of the
/// next, so at most one note sounds at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackTimeline {
    events: Vec<ScheduledEvent>,
}

impl PlaybackTimeline {
    /// Builds the timeline for a session's notes.
    ///
    /// Each note starts at its `start` and stops at the earlier of its own
    /// `end` and the next note's `start`. A final note that never ended stops
    /// at `session_end`, or `trailing_note_hold` seconds after it began when
    /// the session length is unknown. Notes with no audible length are
    /// skipped.
    pub fn compile(notes: &[NoteEvent], session_end: Option<f64>, config: &PlaybackConfig) -> Self {
        let mut events = Vec::with_capacity(notes.len() * 2);

        for (i, note) in notes.iter().enumerate() {
            let next_start = notes.get(i + 1).map(|next| next.start);
            let off_at = match (note.end, next_start) {
                (Some(end), Some(next)) => end.min(next),
                (None, Some(next)) => next,
                (Some(end), None) => end,
                (None, None) => session_end
                    .filter(|&end| end > note.start)
                    .unwrap_or(note.start + config.trailing_note_hold),
            };

            if off_at <= note.start {
                debug!("[PLAYBACK] Skipping zero-length {} at {:.3}s", note.pitch, note.start);
                continue;
            }

            events.push(ScheduledEvent {
                at: note.start,
                action: PlaybackAction::NoteOn {
                    key: note.midi_note,
                    velocity: config.velocity,
                },
            });
            events.push(ScheduledEvent {
                at: off_at,
                action: PlaybackAction::NoteOff { key: note.midi_note },
            });
        }

        debug_assert!(events.windows(2).all(|w| w[0].at <= w[1].at));
        Self { events }
    }

    pub fn events(&self) -> &[ScheduledEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Offset of the last event in seconds.
    pub fn duration(&self) -> f64 {
        self.events.last().map_or(0.0, |event| event.at)
    }
}

/// A timeline being played on a background thread.
#[derive(Debug)]
pub struct Player {
    shutdown_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Player {
    /// Starts playing `timeline` on `synth` immediately.
    pub fn spawn<S>(timeline: PlaybackTimeline, mut synth: S) -> Self
    where
        S: Synthesizer + 'static,
    {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = thread::spawn(move || {
            info!(
                "[PLAYBACK] Playing {} events over {:.2}s",
                timeline.events().len(),
                timeline.duration()
            );
            let started = Instant::now();
            for event in timeline.events() {
                let due = started + Duration::from_secs_f64(event.at.max(0.0));
                match shutdown_rx.recv_deadline(due) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        debug!("[PLAYBACK] Stopped early");
                        synth.all_notes_off();
                        return;
                    }
                }
                match event.action {
                    PlaybackAction::NoteOn { key, velocity } => synth.note_on(key, velocity),
                    PlaybackAction::NoteOff { key } => synth.note_off(key),
                }
            }
            debug!("[PLAYBACK] Finished");
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|handle| handle.is_finished())
    }

    /// Waits for the timeline to play out.
    pub fn join(mut self) {
        self.wait();
    }

    /// Silences the synthesizer and stops playback.
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
        self.wait();
    }

    fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("[PLAYBACK] Playback thread panicked");
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
        self.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::{Pitch, PitchClass};
    use std::sync::{Arc, Mutex};

    fn note(start: f64, end: Option<f64>, key: u8) -> NoteEvent {
        NoteEvent {
            pitch: Pitch::new(PitchClass::C, 2),
            detected_frequency: 65.4,
            start,
            end,
            midi_note: key,
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSynth {
        actions: Arc<Mutex<Vec<PlaybackAction>>>,
        silenced: Arc<Mutex<bool>>,
    }

    impl Synthesizer for RecordingSynth {
        fn note_on(&mut self, key: u8, velocity: u8) {
            self.actions.lock().unwrap().push(PlaybackAction::NoteOn { key, velocity });
        }

        fn note_off(&mut self, key: u8) {
            self.actions.lock().unwrap().push(PlaybackAction::NoteOff { key });
        }

        fn all_notes_off(&mut self) {
            *self.silenced.lock().unwrap() = true;
        }
    }

    #[test]
    fn test_contiguous_notes_hand_over() {
        let notes = vec![note(0.3, Some(0.6), 60), note(0.6, None, 62)];
        let timeline = PlaybackTimeline::compile(&notes, Some(1.0), &PlaybackConfig::default());
        let events = timeline.events();

        assert_eq!(events.len(), 4);
        assert_eq!(events[0].action, PlaybackAction::NoteOn { key: 60, velocity: 80 });
        assert_eq!(events[1], ScheduledEvent { at: 0.6, action: PlaybackAction::NoteOff { key: 60 } });
        assert_eq!(events[2].at, 0.6);
        assert_eq!(events[3], ScheduledEvent { at: 1.0, action: PlaybackAction::NoteOff { key: 62 } });
    }

    #[test]
    fn test_gap_uses_own_end() {
        let notes = vec![note(0.3, Some(0.5), 60), note(0.9, Some(1.2), 64)];
        let timeline = PlaybackTimeline::compile(&notes, None, &PlaybackConfig::default());
        assert_eq!(timeline.events()[1].at, 0.5);
        assert_eq!(timeline.events()[3].at, 1.2);
    }

    #[test]
    fn test_open_note_without_session_end_is_held() {
        let notes = vec![note(2.0, None, 60)];
        let timeline = PlaybackTimeline::compile(&notes, None, &PlaybackConfig::default());
        assert_eq!(timeline.events()[1].at, 2.5);
    }

    #[test]
    fn test_open_middle_note_stops_at_next_start() {
        // Only possible with logs built by hand, but the rule still holds.
        let notes = vec![note(0.3, None, 60), note(0.9, Some(1.0), 64)];
        let timeline = PlaybackTimeline::compile(&notes, None, &PlaybackConfig::default());
        assert_eq!(timeline.events()[1].at, 0.9);
    }

    #[test]
    fn test_off_never_after_next_on() {
        let notes = vec![
            note(0.1, Some(0.4), 60),
            note(0.3, Some(0.7), 62),
            note(0.7, Some(0.8), 64),
            note(1.0, None, 65),
        ];
        let timeline = PlaybackTimeline::compile(&notes, Some(1.5), &PlaybackConfig::default());
        let ons: Vec<f64> = timeline
            .events()
            .iter()
            .filter(|e| matches!(e.action, PlaybackAction::NoteOn { .. }))
            .map(|e| e.at)
            .collect();
        let offs: Vec<f64> = timeline
            .events()
            .iter()
            .filter(|e| matches!(e.action, PlaybackAction::NoteOff { .. }))
            .map(|e| e.at)
            .collect();
        for i in 0..ons.len() - 1 {
            assert!(offs[i] <= ons[i + 1]);
        }
    }

    #[test]
    fn test_zero_length_note_is_skipped() {
        let notes = vec![note(0.5, Some(0.5), 60)];
        let timeline = PlaybackTimeline::compile(&notes, None, &PlaybackConfig::default());
        assert!(timeline.is_empty());
    }

    #[test]
    fn test_player_plays_in_order() {
        let notes = vec![note(0.0, Some(0.01), 60), note(0.01, Some(0.02), 62)];
        let timeline = PlaybackTimeline::compile(&notes, None, &PlaybackConfig::default());
        let synth = RecordingSynth::default();
        let actions = Arc::clone(&synth.actions);

        Player::spawn(timeline.clone(), synth).join();

        let expected: Vec<PlaybackAction> = timeline.events().iter().map(|e| e.action).collect();
        assert_eq!(*actions.lock().unwrap(), expected);
    }

    #[test]
    fn test_player_stop_silences() {
        let notes = vec![note(0.0, Some(10.0), 60)];
        let timeline = PlaybackTimeline::compile(&notes, None, &PlaybackConfig::default());
        let synth = RecordingSynth::default();
        let silenced = Arc::clone(&synth.silenced);

        let player = Player::spawn(timeline, synth);
        std::thread::sleep(Duration::from_millis(20));
        player.stop();
        assert!(*silenced.lock().unwrap());
    }
}
