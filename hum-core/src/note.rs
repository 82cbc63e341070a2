//! # Note Event Log
//!
//! The ordered list of notes produced by one recording session, together
//! with the change notification that observers subscribe to.
//!
//! Only the segmentation engine mutates a log. Every mutation sends exactly
//! one [`LogSignal::Changed`] to each live subscriber, synchronously, before
//! the mutating call returns. Signals carry no data: a subscriber re-reads
//! the engine's snapshot.

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::tuning::Pitch;

/// One transcribed note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub pitch: Pitch,
    /// Smoothed frequency that produced the classification.
    pub detected_frequency: f32,
    /// Session time in seconds when the note began.
    pub start: f64,
    /// Session time in seconds when the note ended. `None` while sounding.
    pub end: Option<f64>,
    /// Playback key, already shifted by the correction offset.
    pub midi_note: u8,
}

impl NoteEvent {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Length of a closed note in seconds.
    pub fn duration(&self) -> Option<f64> {
        self.end.map(|end| end - self.start)
    }
}

/// Notifications sent to log subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSignal {
    /// A new session began and the log was replaced with an empty one.
    SessionStarted,
    /// A note was appended or closed. Re-read the log.
    Changed,
    /// The session ended; the log is now frozen.
    SessionStopped,
}

/// Append-only sequence of notes, ordered by strictly increasing `start`.
///
/// At most one note is open, and if one is, it is the last.
#[derive(Debug, Default)]
pub struct NoteEventLog {
    events: Vec<NoteEvent>,
    subscribers: Vec<Sender<LogSignal>>,
}

impl NoteEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[NoteEvent] {
        &self.events
    }

    pub fn last(&self) -> Option<&NoteEvent> {
        self.events.last()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Copies the current contents for a reader.
    pub fn snapshot(&self) -> Vec<NoteEvent> {
        self.events.clone()
    }

    /// Registers a new observer.
    pub fn subscribe(&mut self) -> Receiver<LogSignal> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Drops all notes, keeping subscribers, and announces the new session.
    pub(crate) fn reset(&mut self) {
        self.events = Vec::new();
        self.notify(LogSignal::SessionStarted);
    }

    /// Appends an open note. The previous tail must already be closed.
    pub(crate) fn open(&mut self, event: NoteEvent) {
        debug_assert!(self.events.last().is_none_or(|last| !last.is_open()));
        debug_assert!(self.events.last().is_none_or(|last| last.start < event.start));
        self.events.push(event);
        self.notify(LogSignal::Changed);
    }

    /// Closes the tail note at `time`. Returns false if there was nothing
    /// open to close.
    pub(crate) fn close_tail(&mut self, time: f64) -> bool {
        match self.events.last_mut() {
            Some(last) if last.is_open() => {
                last.end = Some(time);
                self.notify(LogSignal::Changed);
                true
            }
            _ => false,
        }
    }

    /// Rewrites the pitch of an open tail that started at the same instant a
    /// new classification arrived.
    pub(crate) fn reclassify_tail(&mut self, event: NoteEvent) -> bool {
        match self.events.last_mut() {
            Some(last) if last.is_open() && last.start == event.start => {
                *last = event;
                self.notify(LogSignal::Changed);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn notify(&mut self, signal: LogSignal) {
        // Receivers that have gone away are dropped here.
        self.subscribers.retain(|tx| tx.send(signal).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::PitchClass;

    fn note(class: PitchClass, start: f64) -> NoteEvent {
        NoteEvent {
            pitch: Pitch::new(class, 2),
            detected_frequency: 80.0,
            start,
            end: None,
            midi_note: 68,
        }
    }

    #[test]
    fn test_open_and_close_notify_once_each() {
        let mut log = NoteEventLog::new();
        let rx = log.subscribe();

        log.open(note(PitchClass::C, 0.3));
        assert!(log.close_tail(0.6));
        assert!(!log.close_tail(0.7));

        let signals: Vec<LogSignal> = rx.try_iter().collect();
        assert_eq!(signals, vec![LogSignal::Changed, LogSignal::Changed]);
        assert_eq!(log.last().unwrap().end, Some(0.6));
    }

    #[test]
    fn test_reset_keeps_subscribers() {
        let mut log = NoteEventLog::new();
        let rx = log.subscribe();
        log.open(note(PitchClass::C, 0.3));
        log.reset();
        assert!(log.is_empty());
        let signals: Vec<LogSignal> = rx.try_iter().collect();
        assert_eq!(signals, vec![LogSignal::Changed, LogSignal::SessionStarted]);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut log = NoteEventLog::new();
        let rx = log.subscribe();
        drop(rx);
        log.open(note(PitchClass::D, 1.0));
        assert!(log.subscribers.is_empty());
    }

    #[test]
    fn test_reclassify_only_same_instant_open_tail() {
        let mut log = NoteEventLog::new();
        log.open(note(PitchClass::C, 0.3));
        assert!(!log.reclassify_tail(note(PitchClass::D, 0.4)));
        assert!(log.reclassify_tail(note(PitchClass::D, 0.3)));
        assert_eq!(log.len(), 1);
        assert_eq!(log.last().unwrap().pitch.class, PitchClass::D);
    }

    #[test]
    fn test_duration() {
        let mut event = note(PitchClass::E, 1.0);
        assert_eq!(event.duration(), None);
        event.end = Some(1.5);
        assert_eq!(event.duration(), Some(0.5));
    }
}
