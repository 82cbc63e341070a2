use std::thread;
use std::time::Duration;

use hum_core::{
    EngineConfig, EngineState, LogSignal, NoteEvent, Pitch, PitchClass, RawSample, SegmentationEngine,
    SharedEngine,
};

const POLL: f64 = 0.05;

/// Feeds `count` samples starting at poll index `from`; returns the next index.
fn feed(engine: &mut SegmentationEngine, frequency: f32, amplitude: f32, from: usize, count: usize) -> usize {
    for i in from..from + count {
        engine.on_sample(RawSample::new(frequency, amplitude, i as f64 * POLL));
    }
    from + count
}

fn started() -> SegmentationEngine {
    let mut engine = SegmentationEngine::new(EngineConfig::default());
    engine.start_session();
    engine
}

fn assert_log_invariants(log: &[NoteEvent]) {
    for pair in log.windows(2) {
        assert!(pair[0].start < pair[1].start, "starts must strictly increase");
        assert!(!pair[0].is_open(), "only the last note may be open");
    }
    for event in log {
        if let Some(end) = event.end {
            assert!(end >= event.start);
        }
    }
}

#[test]
fn test_sustained_pitch_is_one_note() {
    let mut engine = started();
    feed(&mut engine, 80.0, 0.5, 0, 18);

    let log = engine.current_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].pitch, Pitch::new(PitchClass::E, 2));
    assert_eq!(log[0].start, 5.0 * POLL);
    assert!(log[0].is_open());
    assert_eq!(engine.stats().decision_points, 3);
}

#[test]
fn test_pitch_change_is_two_contiguous_notes() {
    let mut engine = started();
    let next = feed(&mut engine, 65.41, 0.5, 0, 6);
    feed(&mut engine, 73.42, 0.5, next, 6);

    let log = engine.current_log();
    assert_eq!(log.len(), 2);
    let transition = 11.0 * POLL;
    assert_eq!(log[0].pitch, Pitch::new(PitchClass::C, 2));
    assert_eq!(log[0].end, Some(transition));
    assert_eq!(log[1].pitch, Pitch::new(PitchClass::D, 2));
    assert_eq!(log[1].start, transition);
    assert!(log[1].is_open());
}

#[test]
fn test_silence_closes_open_note() {
    let mut engine = started();
    let next = feed(&mut engine, 110.0, 0.5, 0, 6);
    assert_eq!(engine.state(), EngineState::Tracking);

    feed(&mut engine, 110.0, 0.05, next, 1);

    let log = engine.current_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].end, Some(next as f64 * POLL));
    assert_eq!(engine.state(), EngineState::Listening);
}

#[test]
fn test_silence_after_close_changes_nothing() {
    let mut engine = started();
    let next = feed(&mut engine, 110.0, 0.5, 0, 6);
    feed(&mut engine, 0.0, 0.0, next, 5);

    let log = engine.current_log();
    assert_eq!(log[0].end, Some(next as f64 * POLL));
}

#[test]
fn test_same_pitch_after_silence_adds_nothing() {
    let mut engine = started();
    let mut next = feed(&mut engine, 110.0, 0.5, 0, 6);
    let silence_at = next as f64 * POLL;
    next = feed(&mut engine, 0.0, 0.0, next, 4);
    feed(&mut engine, 110.0, 0.5, next, 6);

    let log = engine.current_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].pitch, Pitch::new(PitchClass::A, 2));
    assert_eq!(log[0].end, Some(silence_at));
    assert_eq!(engine.state(), EngineState::Listening);
}

#[test]
fn test_same_pitch_after_silence_can_reopen() {
    let mut engine = SegmentationEngine::new(EngineConfig {
        reopen_same_pitch_after_silence: true,
        ..EngineConfig::default()
    });
    engine.start_session();
    let mut next = feed(&mut engine, 110.0, 0.5, 0, 6);
    next = feed(&mut engine, 0.0, 0.0, next, 4);
    feed(&mut engine, 110.0, 0.5, next, 6);

    let log = engine.current_log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].pitch, log[1].pitch);
    assert!(!log[0].is_open());
    assert!(log[1].is_open());
    assert_log_invariants(&log);
}

#[test]
fn test_pitch_change_after_silence_keeps_closed_end() {
    let mut engine = started();
    let mut next = feed(&mut engine, 65.41, 0.5, 0, 6); // open C2
    let silence_at = next as f64 * POLL;
    next = feed(&mut engine, 0.0, 0.0, next, 3); // close C2
    next = feed(&mut engine, 73.42, 0.5, next, 6); // open D2
    let change_at = (next - 1) as f64 * POLL;

    let log = engine.current_log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].pitch, Pitch::new(PitchClass::C, 2));
    assert_eq!(log[0].end, Some(silence_at));
    assert_eq!(log[1].pitch, Pitch::new(PitchClass::D, 2));
    assert_eq!(log[1].start, change_at);
    assert!(change_at > silence_at);
    assert!(log[1].is_open());
}

#[test]
fn test_never_loud_session_is_empty() {
    let mut engine = started();
    feed(&mut engine, 220.0, 0.1, 0, 50);
    assert!(engine.current_log().is_empty());
    assert_eq!(engine.state(), EngineState::Listening);
}

#[test]
fn test_empty_session_signals() {
    let mut engine = SegmentationEngine::new(EngineConfig::default());
    let rx = engine.subscribe();
    engine.start_session();
    engine.stop_session();

    assert!(engine.current_log().is_empty());
    let signals: Vec<LogSignal> = rx.try_iter().collect();
    assert_eq!(signals, vec![LogSignal::SessionStarted, LogSignal::SessionStopped]);
}

#[test]
fn test_one_signal_per_mutation() {
    let mut engine = SegmentationEngine::new(EngineConfig::default());
    let rx = engine.subscribe();
    engine.start_session();
    let mut next = feed(&mut engine, 65.41, 0.5, 0, 6); // open C2
    next = feed(&mut engine, 73.42, 0.5, next, 6); // close C2, open D2
    feed(&mut engine, 0.0, 0.0, next, 2); // close D2
    engine.stop_session();

    let signals: Vec<LogSignal> = rx.try_iter().collect();
    assert_eq!(
        signals,
        vec![
            LogSignal::SessionStarted,
            LogSignal::Changed,
            LogSignal::Changed,
            LogSignal::Changed,
            LogSignal::Changed,
            LogSignal::SessionStopped,
        ]
    );
}

#[test]
fn test_stop_leaves_tail_open_by_default() {
    let mut engine = started();
    feed(&mut engine, 98.0, 0.5, 0, 6);
    engine.stop_session_at(2.0);

    assert_eq!(engine.state(), EngineState::Idle);
    assert!(engine.current_log()[0].is_open());
    assert_eq!(engine.session_end(), Some(2.0));

    // Frozen: further samples are ignored.
    feed(&mut engine, 123.5, 0.5, 100, 12);
    assert_eq!(engine.current_log().len(), 1);
}

#[test]
fn test_stop_can_close_tail() {
    let mut engine = SegmentationEngine::new(EngineConfig {
        close_open_note_on_stop: true,
        ..EngineConfig::default()
    });
    engine.start_session();
    feed(&mut engine, 98.0, 0.5, 0, 6);
    engine.stop_session_at(2.0);

    assert_eq!(engine.current_log()[0].end, Some(2.0));
}

#[test]
fn test_invariants_hold_for_noisy_input() {
    let mut engine = started();
    let mut seed: u32 = 12345;
    let mut random = move || {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
        (seed >> 16) as f32 / 65536.0
    };

    for i in 0..2000 {
        let frequency = 20.0 + random() * 900.0;
        let amplitude = random() * 0.4;
        // Occasionally a malformed reading slips through.
        let frequency = if i % 97 == 0 { -frequency } else { frequency };
        engine.on_sample(RawSample::new(frequency, amplitude, i as f64 * POLL));

        let log = engine.current_log();
        assert_log_invariants(&log);
        let tracking = engine.state() == EngineState::Tracking;
        assert_eq!(tracking, log.last().is_some_and(|last| last.is_open()));
    }
    assert!(engine.stats().rejected > 0);
}

#[test]
fn test_shared_engine_stop_from_another_thread() {
    let engine = SharedEngine::new(EngineConfig::default());
    engine.start_session();

    let feeder = {
        let engine = engine.clone();
        thread::spawn(move || {
            for i in 0..400 {
                let frequency = if (i / 12) % 2 == 0 { 65.41 } else { 98.0 };
                engine.on_sample(RawSample::new(frequency, 0.5, i as f64 * 0.001));
                if i % 50 == 0 {
                    thread::sleep(Duration::from_millis(1));
                }
            }
        })
    };

    thread::sleep(Duration::from_millis(2));
    engine.stop_session();
    feeder.join().unwrap();

    assert_eq!(engine.state(), EngineState::Idle);
    let log = engine.current_log();
    assert_log_invariants(&log);
    // Nothing was appended after the stop.
    let end = engine.session_end().unwrap();
    assert!(log.iter().all(|event| event.start <= end));
}
