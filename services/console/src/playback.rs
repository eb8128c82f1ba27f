//! The inbound audio playback pipeline.
//!
//! Decoded PCM chunks from the reassembly engine are resampled to the output
//! device rate and fed through a ring buffer to the cpal output callback,
//! which renders silence on underrun so playback stays gapless while frames
//! keep arriving in time. Frames that overflow the ring are dropped; media
//! has no retry semantics.

use anyhow::{Context, Result, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, SupportedStreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use rubato::{FastFixedIn, Resampler};
use tracing::{error, info, warn};

use crate::audio::{self, RESAMPLER_CHUNK, WIRE_PLAYBACK_SAMPLE_RATE};

/// An active playback sink. Construct it explicitly before any inbound
/// media event can be rendered; until then the session drops audio frames.
pub struct Player {
    _stream: Stream,
    producer: HeapProd<f32>,
    resampler: FastFixedIn<f32>,
    pending: Vec<f32>,
}

impl Player {
    /// Opens the default output device and starts the stream.
    pub fn start() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("no audio output device available")?;
        let config = device
            .default_output_config()
            .context("failed to query output device configuration")?;
        let device_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        // Half a second of device-rate audio between network and callback.
        let ring = HeapRb::<f32>::new(device_rate as usize / 2);
        let (producer, consumer) = ring.split();

        let stream = match config.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, channels, consumer),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, channels, consumer),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, channels, consumer),
            other => bail!("unsupported playback sample format: {other:?}"),
        }?;
        stream.play().context("failed to start playback stream")?;

        let resampler =
            audio::create_resampler(WIRE_PLAYBACK_SAMPLE_RATE, device_rate as f64, RESAMPLER_CHUNK)?;
        info!(
            device = %device.name().unwrap_or_else(|_| "<unnamed>".into()),
            rate = device_rate,
            "playback started"
        );
        Ok(Self {
            _stream: stream,
            producer,
            resampler,
            pending: Vec::new(),
        })
    }

    /// Schedules one decoded PCM16 chunk, in arrival order.
    pub fn enqueue(&mut self, pcm: &[u8]) {
        self.pending.extend(audio::pcm16_bytes_to_f32(pcm));
        let needed = self.resampler.input_frames_next();
        while self.pending.len() >= needed {
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            match self.resampler.process(&[chunk], None) {
                Ok(resampled) => {
                    let written = self.producer.push_slice(&resampled[0]);
                    if written < resampled[0].len() {
                        warn!(
                            dropped = resampled[0].len() - written,
                            "playback buffer full; samples dropped"
                        );
                    }
                }
                Err(err) => warn!(%err, "playback resampling failed; chunk dropped"),
            }
        }
    }
}

fn build_stream<T>(
    device: &Device,
    config: &SupportedStreamConfig,
    channels: usize,
    mut consumer: HeapCons<f32>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let stream = device.build_output_stream(
        &config.clone().into(),
        move |out: &mut [T], _: &cpal::OutputCallbackInfo| {
            for frame in out.chunks_mut(channels) {
                // Silence on underrun keeps the stream alive between turns.
                let sample = consumer.try_pop().unwrap_or(0.0);
                frame.fill(T::from_sample(sample));
            }
        },
        |err| error!(%err, "playback stream error"),
        None,
    )?;
    Ok(stream)
}
