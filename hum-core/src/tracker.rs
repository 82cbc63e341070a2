//! # Frequency Tracker and Capture Session
//!
//! The capture side of a recording: microphone frames are analysed into a
//! running `(frequency, amplitude)` estimate, and a poll timer hands that
//! estimate to the segmentation engine at a fixed cadence.
//!
//! ## Architecture
//! - **Audio thread**: owns the CPAL input stream, analyses each frame and
//!   optionally writes the raw voice to a WAV file
//! - **Poll thread**: every poll interval stamps the latest estimate with the
//!   session clock and feeds it to the [`SharedEngine`]
//! - **Shutdown**: dropping the shutdown sender wakes both threads

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::StreamTrait;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::audio::{self, BUFFER_SIZE};
use crate::clock::SessionClock;
use crate::config::CaptureConfig;
use crate::engine::{RawSample, SharedEngine};
use crate::error::{HumError, HumResult};
use crate::fft::SpectrumAnalyzer;
use crate::pitch;

/// The tracker's current estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackerReading {
    /// Last detected fundamental in Hz, 0.0 until a pitch has been heard.
    pub frequency: f32,
    /// RMS level of the latest frame.
    pub amplitude: f32,
}

/// Turns audio frames into tracker readings.
#[derive(Debug)]
pub struct FrequencyTracker {
    sample_rate: u32,
    min_hz: f32,
    max_hz: f32,
    amplitude_floor: f32,
    analyzer: SpectrumAnalyzer,
    reading: TrackerReading,
}

impl FrequencyTracker {
    pub fn new(sample_rate: u32, config: &CaptureConfig) -> Self {
        Self {
            sample_rate,
            min_hz: config.high_pass_hz,
            max_hz: config.low_pass_hz,
            amplitude_floor: config.yin_amplitude_floor,
            analyzer: SpectrumAnalyzer::new(BUFFER_SIZE),
            reading: TrackerReading::default(),
        }
    }

    pub fn reading(&self) -> TrackerReading {
        self.reading
    }

    /// Analyses one frame and returns the updated reading.
    ///
    /// Like a hardware tracker, the frequency holds its last value while no
    /// pitch can be found; the amplitude always follows the signal.
    pub fn analyze(&mut self, frame: &[f32]) -> TrackerReading {
        self.reading.amplitude = pitch::rms(frame);

        if let Some(rough) = pitch::detect_pitch_yin(
            frame,
            self.sample_rate,
            self.min_hz,
            self.max_hz,
            self.amplitude_floor,
        ) {
            let magnitudes = self.analyzer.magnitudes(frame);
            self.reading.frequency = pitch::refine_from_spectrum(&magnitudes, rough, self.sample_rate);
        }
        self.reading
    }
}

/// A live recording: microphone capture feeding a segmentation engine.
pub struct CaptureSession {
    engine: SharedEngine,
    clock: SessionClock,
    shutdown_tx: Option<Sender<()>>,
    audio_thread: Option<JoinHandle<()>>,
    poll_thread: Option<JoinHandle<()>>,
    voice_file: Option<PathBuf>,
}

impl CaptureSession {
    /// Starts a new engine session and begins capturing.
    ///
    /// Fails if the engine is already recording or the input device cannot
    /// be opened. The engine session only starts once capture is running.
    pub fn start(engine: SharedEngine, config: &CaptureConfig) -> HumResult<Self> {
        if engine.is_recording() {
            return Err(HumError::AlreadyRecording);
        }

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<HumResult<u32>>(1);
        let latest = Arc::new(Mutex::new(TrackerReading::default()));

        let audio_thread = {
            let latest = Arc::clone(&latest);
            let shutdown_rx = shutdown_rx.clone();
            let config = config.clone();
            thread::spawn(move || run_audio_thread(config, latest, shutdown_rx, ready_tx))
        };

        let sample_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = audio_thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = audio_thread.join();
                return Err(HumError::Audio("audio thread exited during startup".to_string()));
            }
        };
        debug!("[TRACKER] Audio thread ready at {sample_rate} Hz");

        let clock = SessionClock::start();
        engine.start_session();

        let poll_thread = {
            let engine = engine.clone();
            let interval = Duration::from_millis(config.poll_interval_ms);
            thread::spawn(move || run_poll_thread(engine, clock, interval, latest, shutdown_rx))
        };

        info!(
            "[TRACKER] Capture session started, polling every {} ms",
            config.poll_interval_ms
        );

        Ok(Self {
            engine,
            clock,
            shutdown_tx: Some(shutdown_tx),
            audio_thread: Some(audio_thread),
            poll_thread: Some(poll_thread),
            voice_file: config.record_voice.clone(),
        })
    }

    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    pub fn elapsed(&self) -> f64 {
        self.clock.elapsed()
    }

    /// Stops the engine session, then tears down capture.
    ///
    /// Returns the session length in seconds.
    pub fn stop(mut self) -> HumResult<f64> {
        self.shutdown()
    }

    /// WAV file the raw voice was written to, if any.
    pub fn voice_file(&self) -> Option<&Path> {
        self.voice_file.as_deref()
    }

    fn shutdown(&mut self) -> HumResult<f64> {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return Err(HumError::NotRecording);
        };

        // The engine lock makes this exclusive with any in-flight sample.
        let end = self.clock.elapsed();
        self.engine.stop_session_at(end);

        drop(shutdown_tx);
        for handle in [self.poll_thread.take(), self.audio_thread.take()].into_iter().flatten() {
            if handle.join().is_err() {
                error!("[TRACKER] A capture thread panicked");
            }
        }
        info!("[TRACKER] Capture session stopped after {end:.2}s");
        Ok(self.engine.session_end().unwrap_or(end))
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some() {
            let _ = self.shutdown();
        }
    }
}

fn run_audio_thread(
    config: CaptureConfig,
    latest: Arc<Mutex<TrackerReading>>,
    shutdown_rx: Receiver<()>,
    ready_tx: Sender<HumResult<u32>>,
) {
    debug!("[AUDIO-THREAD] Starting audio thread...");
    let (raw_audio_tx, raw_audio_rx) = crossbeam_channel::bounded::<Vec<f32>>(16);

    let (stream, sample_rate) = match audio::start_audio_capture(raw_audio_tx) {
        Ok(tuple) => tuple,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let mut voice_writer = match config.record_voice.as_deref().map(|path| create_voice_writer(path, sample_rate)) {
        Some(Ok(writer)) => Some(writer),
        Some(Err(e)) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
        None => None,
    };

    let mut tracker = FrequencyTracker::new(sample_rate, &config);
    let _ = ready_tx.send(Ok(sample_rate));

    loop {
        crossbeam_channel::select! {
            recv(raw_audio_rx) -> msg => match msg {
                Ok(frame) => {
                    let reading = tracker.analyze(&frame);
                    *latest.lock() = reading;

                    let written = voice_writer
                        .as_mut()
                        .map(|writer| frame.iter().try_for_each(|&sample| writer.write_sample(sample)));
                    if let Some(Err(e)) = written {
                        warn!("[AUDIO-THREAD] Voice recording failed, disabling it: {e}");
                        voice_writer = None;
                    }
                }
                Err(_) => {
                    warn!("[AUDIO-THREAD] Audio channel closed");
                    break;
                }
            },
            recv(shutdown_rx) -> _ => {
                debug!("[AUDIO-THREAD] Received shutdown signal");
                break;
            },
        }
    }

    if let Err(e) = stream.pause() {
        warn!("[AUDIO-THREAD] Error pausing stream: {e}");
    }
    drop(stream);

    if let Some(writer) = voice_writer {
        if let Err(e) = writer.finalize() {
            error!("[AUDIO-THREAD] Could not finalize voice recording: {e}");
        }
    }
    debug!("[AUDIO-THREAD] Audio thread finished");
}

fn run_poll_thread(
    engine: SharedEngine,
    clock: SessionClock,
    interval: Duration,
    latest: Arc<Mutex<TrackerReading>>,
    shutdown_rx: Receiver<()>,
) {
    let ticker = crossbeam_channel::tick(interval);
    loop {
        crossbeam_channel::select! {
            recv(ticker) -> _ => {
                let reading = *latest.lock();
                engine.on_sample(RawSample::new(reading.frequency, reading.amplitude, clock.elapsed()));
            },
            recv(shutdown_rx) -> _ => break,
        }
    }
}

fn create_voice_writer(
    path: &Path,
    sample_rate: u32,
) -> HumResult<hound::WavWriter<std::io::BufWriter<std::fs::File>>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    info!("[AUDIO-THREAD] Recording voice to {}", path.display());
    Ok(hound::WavWriter::create(path, spec)?)
}
