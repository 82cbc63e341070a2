//! Standard MIDI file export of a playback timeline.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};

use crate::error::HumResult;
use crate::playback::{PlaybackAction, PlaybackTimeline};

const CHANNEL: u8 = 0;

/// Slowest tempo whose beat length fits the 24-bit tempo field.
pub const MIN_BPM: u32 = 4;

/// Builds a single-track file: a tempo event followed by the timeline's
/// note events, with times converted to delta ticks.
pub fn timeline_to_smf(timeline: &PlaybackTimeline, ticks_per_beat: u16, bpm: u32) -> Smf<'static> {
    let ticks_per_beat = ticks_per_beat.clamp(1, 0x7FFF);
    let bpm = bpm.max(MIN_BPM);
    let ticks_per_second = ticks_per_beat as f64 * bpm as f64 / 60.0;

    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(ticks_per_beat)),
    ));
    let mut track: Track<'static> = Track::new();

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(60_000_000 / bpm))),
    });

    let mut previous_tick = 0u32;
    for event in timeline.events() {
        let tick = (event.at.max(0.0) * ticks_per_second).round() as u32;
        let delta = tick.saturating_sub(previous_tick).min(0x0FFF_FFFF);
        previous_tick = previous_tick.max(tick);

        let message = match event.action {
            PlaybackAction::NoteOn { key, velocity } => MidiMessage::NoteOn {
                key: u7::new(key.min(127)),
                vel: u7::new(velocity.min(127)),
            },
            PlaybackAction::NoteOff { key } => MidiMessage::NoteOff {
                key: u7::new(key.min(127)),
                vel: u7::new(0),
            },
        };
        track.push(TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(CHANNEL),
                message,
            },
        });
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);
    smf
}

/// Writes the timeline as a MIDI file to any writer.
pub fn write_midi<W: Write>(
    timeline: &PlaybackTimeline,
    ticks_per_beat: u16,
    bpm: u32,
    writer: &mut W,
) -> HumResult<()> {
    timeline_to_smf(timeline, ticks_per_beat, bpm).write_std(writer)?;
    Ok(())
}

pub fn timeline_to_midi_bytes(timeline: &PlaybackTimeline, ticks_per_beat: u16, bpm: u32) -> HumResult<Vec<u8>> {
    let mut buffer = Vec::new();
    write_midi(timeline, ticks_per_beat, bpm, &mut buffer)?;
    Ok(buffer)
}

pub fn save_midi(
    timeline: &PlaybackTimeline,
    ticks_per_beat: u16,
    bpm: u32,
    path: impl AsRef<Path>,
) -> HumResult<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    write_midi(timeline, ticks_per_beat, bpm, &mut writer)?;
    writer.flush()?;
    info!("[PLAYBACK] Wrote {} events to {}", timeline.events().len(), path.display());
    Ok(())
}
