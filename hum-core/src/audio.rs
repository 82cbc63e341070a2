//! # Audio Device Module
//!
//! This module handles real-time audio input and output using CPAL
//! (Cross-Platform Audio Library).
//!
//! ## Features
//! - Automatic audio device selection
//! - Closest supported sample rate to the 44.1 kHz target
//! - Multi-channel input downmixed to mono frames
//! - Mono render callback fanned out to every output channel

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfigRange};
use crossbeam_channel::Sender;
use log::{error, info};

use crate::error::{HumError, HumResult};

/// Audio buffer size for processing frames.
///
/// Larger buffers provide more frequency resolution but increase latency.
/// At 44.1 kHz one frame is about 46 ms, just under the 50 ms poll interval.
pub const BUFFER_SIZE: usize = 2048;

/// Preferred capture rate in Hz.
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// Starts audio capture from the default input device.
///
/// Mono frames of [`BUFFER_SIZE`] samples are sent over `sender`. Frames are
/// dropped rather than blocking the audio callback when the channel is full.
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Audio stream handle and sample rate
/// * `Err(e)` - Error if no device or no usable format exists
pub fn start_audio_capture(sender: Sender<Vec<f32>>) -> HumResult<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| HumError::Audio("No input device available".to_string()))?;

    info!("[AUDIO] Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, TARGET_SAMPLE_RATE)
        .ok_or_else(|| HumError::Audio("No suitable f32 input format found".to_string()))?;

    let sample_rate = clamp_rate(&supported_config, TARGET_SAMPLE_RATE);
    let config = supported_config.with_sample_rate(cpal::SampleRate(sample_rate));
    let channels = config.channels().max(1) as usize;
    let config: cpal::StreamConfig = config.into();

    info!("[AUDIO] Selected sample rate: {sample_rate} Hz, {channels} channel(s)");

    let err_fn = |err| error!("[AUDIO] An error occurred on the input stream: {err}");

    // This buffer accumulates mono audio from the callback.
    let mut audio_buffer = Vec::with_capacity(BUFFER_SIZE * 2);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if channels == 1 {
                audio_buffer.extend_from_slice(data);
            } else {
                audio_buffer.extend(
                    data.chunks(channels)
                        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                );
            }

            while audio_buffer.len() >= BUFFER_SIZE {
                let frame_to_send = audio_buffer[..BUFFER_SIZE].to_vec();
                // Send the frame, ignoring errors if the channel is full.
                let _ = sender.try_send(frame_to_send);
                audio_buffer.drain(..BUFFER_SIZE);
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate))
}

/// Opens the default output device and drives it from a mono render
/// callback.
///
/// `render` is called on the audio thread with a mono buffer to fill; the
/// result is copied to every output channel.
pub fn start_audio_output<F>(mut render: F) -> HumResult<(cpal::Stream, u32)>
where
    F: FnMut(&mut [f32]) + Send + 'static,
{
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| HumError::Audio("No output device available".to_string()))?;

    info!("[AUDIO] Using audio output device: {}", device.name()?);

    let supported = device.default_output_config()?;
    if supported.sample_format() != SampleFormat::F32 {
        return Err(HumError::Audio(format!(
            "Unsupported output sample format {:?}",
            supported.sample_format()
        )));
    }
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels().max(1) as usize;
    let config: cpal::StreamConfig = supported.into();

    let err_fn = |err| error!("[AUDIO] An error occurred on the output stream: {err}");
    let mut mono = Vec::new();

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            mono.resize(frames, 0.0);
            render(&mut mono);
            for (frame, &value) in data.chunks_mut(channels).zip(mono.iter()) {
                frame.fill(value);
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate))
}

/// Finds the best supported input configuration for the target sample rate.
///
/// Only 32-bit float formats are considered. Among those, fewer channels
/// win, then the range closest to `target_rate`.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .min_by_key(|c| {
            let rate_diff = (clamp_rate(c, target_rate) as i64 - target_rate as i64).abs();
            (c.channels(), rate_diff)
        })
}

fn clamp_rate(config: &SupportedStreamConfigRange, target_rate: u32) -> u32 {
    target_rate.clamp(config.min_sample_rate().0, config.max_sample_rate().0)
}
