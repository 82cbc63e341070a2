//! # hum - Sung Melody Recorder
//!
//! Command line front end for the hum core: record a sung melody, see the
//! notes as they are recognised, and play the transcription back on a
//! synthesizer or export it as MIDI.
//!
//! ## Architecture
//! - **Main thread**: parses commands and owns the session lifecycle
//! - **Capture threads**: audio analysis and polling, inside `CaptureSession`
//! - **Printer thread**: subscribes to the note log and prints new notes
//! - **Playback threads**: one `Player` per piano track

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use hum_core::synth::AudioOutput;
use hum_core::tracker::CaptureSession;
use hum_core::{
    midi, HumConfig, LogSignal, NoteEvent, Project, RawSample, SegmentationEngine, SharedEngine, Track,
};

#[derive(Debug, Parser)]
#[command(name = "hum", version, about = "Turn a sung melody into notes and play it back")]
struct Cli {
    /// JSON configuration file. Defaults are used when it does not exist.
    #[arg(long, global = true, default_value = "hum.json")]
    config: PathBuf,

    /// Log at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record from the microphone and add the transcription to a project.
    Record {
        /// Stop after this many seconds instead of waiting for Enter.
        #[arg(long)]
        seconds: Option<f64>,
        #[arg(long, default_value = "project.json")]
        project: PathBuf,
        #[arg(long)]
        title: Option<String>,
        /// Also keep the raw voice in this WAV file.
        #[arg(long)]
        voice: Option<PathBuf>,
    },
    /// Transcribe a JSON array of recorded tracker samples.
    Transcribe {
        samples: PathBuf,
        /// Add the result to this project.
        #[arg(long)]
        project: Option<PathBuf>,
        #[arg(long)]
        title: Option<String>,
    },
    /// Play every track of a project.
    Play { project: PathBuf },
    /// Write a piano track as a standard MIDI file.
    ExportMidi {
        project: PathBuf,
        out: PathBuf,
        /// Index of the track to export. Defaults to the first piano track.
        #[arg(long)]
        track: Option<usize>,
    },
    /// Write the default configuration to a file.
    InitConfig { path: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Record {
            seconds,
            project,
            title,
            voice,
        } => record(&config, seconds, &project, title, voice),
        Command::Transcribe { samples, project, title } => transcribe(&config, &samples, project, title),
        Command::Play { project } => play(&config, &project),
        Command::ExportMidi { project, out, track } => export_midi(&config, &project, &out, track),
        Command::InitConfig { path } => {
            HumConfig::default()
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<HumConfig> {
    if path.exists() {
        info!("[MAIN] Loading configuration from {}", path.display());
        HumConfig::load(path).with_context(|| format!("loading {}", path.display()))
    } else {
        Ok(HumConfig::default())
    }
}

fn record(
    config: &HumConfig,
    seconds: Option<f64>,
    project_path: &Path,
    title: Option<String>,
    voice: Option<PathBuf>,
) -> Result<()> {
    if seconds.is_some_and(|s| !(s > 0.0)) {
        bail!("--seconds must be positive");
    }
    let mut project = Project::load_or_default(project_path)
        .with_context(|| format!("loading {}", project_path.display()))?;

    let engine = SharedEngine::new(config.engine.clone());
    let signals = engine.subscribe();

    let mut capture_config = config.capture.clone();
    if voice.is_some() {
        capture_config.record_voice = voice;
    }

    let session = CaptureSession::start(engine.clone(), &capture_config).context("starting capture")?;
    let voice_file = session.voice_file().map(Path::to_path_buf);
    println!("Sing, please!");

    let printer = {
        let engine = engine.clone();
        thread::spawn(move || {
            let mut printed = 0;
            for signal in signals.iter() {
                match signal {
                    LogSignal::Changed => {
                        let log = engine.current_log();
                        // Print each note once, when it opens.
                        if log.len() > printed {
                            if let Some(last) = log.last() {
                                println!("  {} ({:.1} Hz)", last.pitch, last.detected_frequency);
                            }
                            printed = log.len();
                        }
                    }
                    LogSignal::SessionStopped => break,
                    LogSignal::SessionStarted => {}
                }
            }
        })
    };

    match seconds {
        Some(seconds) => thread::sleep(Duration::from_secs_f64(seconds)),
        None => {
            println!("Press Enter to stop.");
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
        }
    }

    let duration = session.stop()?;
    if printer.join().is_err() {
        warn!("[MAIN] Note printer panicked");
    }

    let notes = engine.current_log();
    print_notes(&notes);

    let title = title.unwrap_or_else(|| format!("Take {}", project.tracks.len() + 1));
    project.add(Track::Piano {
        title: title.clone(),
        notes,
        duration: Some(duration),
    });
    if let Some(file) = voice_file {
        project.add(Track::Voice {
            title: format!("{title} (voice)"),
            file,
        });
    }
    project
        .save(project_path)
        .with_context(|| format!("saving {}", project_path.display()))?;
    println!("Saved to {}", project_path.display());
    Ok(())
}

fn transcribe(config: &HumConfig, samples_path: &Path, project_path: Option<PathBuf>, title: Option<String>) -> Result<()> {
    let data = std::fs::read_to_string(samples_path).with_context(|| format!("reading {}", samples_path.display()))?;
    let samples: Vec<RawSample> =
        serde_json::from_str(&data).with_context(|| format!("parsing {}", samples_path.display()))?;

    let mut engine = SegmentationEngine::new(config.engine.clone());
    engine.start_session();
    for sample in samples {
        engine.on_sample(sample);
    }
    engine.stop_session();

    let notes = engine.current_log();
    let stats = engine.stats();
    println!(
        "{} samples ({} rejected), {} decision points",
        stats.accepted + stats.rejected,
        stats.rejected,
        stats.decision_points
    );
    print_notes(&notes);

    if let Some(project_path) = project_path {
        let mut project = Project::load_or_default(&project_path)?;
        project.add(Track::Piano {
            title: title.unwrap_or_else(|| samples_path.display().to_string()),
            notes,
            duration: engine.session_end(),
        });
        project.save(&project_path)?;
        println!("Saved to {}", project_path.display());
    }
    Ok(())
}

fn play(config: &HumConfig, project_path: &Path) -> Result<()> {
    let project = Project::load(project_path).with_context(|| format!("loading {}", project_path.display()))?;
    if project.is_empty() {
        bail!("{} has no tracks", project_path.display());
    }

    let output = AudioOutput::open(&config.playback).context("opening audio output")?;
    println!("Playing...");
    for player in project.play(&output, &config.playback) {
        player.join();
    }
    // Let voice clips and note releases finish.
    while !output.is_idle() {
        thread::sleep(Duration::from_millis(20));
    }
    thread::sleep(Duration::from_millis(100));
    Ok(())
}

fn export_midi(config: &HumConfig, project_path: &Path, out: &Path, index: Option<usize>) -> Result<()> {
    let project = Project::load(project_path).with_context(|| format!("loading {}", project_path.display()))?;

    let track = match index {
        Some(i) => project
            .tracks
            .get(i)
            .ok_or_else(|| anyhow!("track {i} does not exist"))?,
        None => project
            .tracks
            .iter()
            .find(|t| matches!(t, Track::Piano { .. }))
            .ok_or_else(|| anyhow!("{} has no piano track", project_path.display()))?,
    };
    let timeline = track
        .timeline(&config.playback)
        .ok_or_else(|| anyhow!("'{}' is a voice track", track.title()))?;

    midi::save_midi(
        &timeline,
        config.playback.midi_ticks_per_beat,
        config.playback.midi_bpm,
        out,
    )?;
    println!("Wrote {}", out.display());
    Ok(())
}

fn print_notes(notes: &[NoteEvent]) {
    if notes.is_empty() {
        println!("No notes recognised.");
        return;
    }
    for note in notes {
        let end = note.end.map_or_else(|| "...".to_string(), |end| format!("{end:.2}s"));
        println!(
            "{:<3} {:>7.2}s - {:<8} {:>7.1} Hz  key {}",
            note.pitch.name(),
            note.start,
            end,
            note.detected_frequency,
            note.midi_note
        );
    }
}
