//! Microphone capture capability and its cpal implementation.
//!
//! The pipeline code depends only on [`CaptureSource`]; the concrete device
//! is injected at session start. Capture failures (no device, permission
//! denied) surface as errors to the caller and leave the session running.

use anyhow::{Context, Result, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, SupportedStreamConfig};
use tracing::{error, info};

/// Receives mono f32 sample frames on the audio thread.
pub type FrameCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// An audio-capture source that yields fixed-size PCM frames via callback.
#[cfg_attr(test, mockall::automock)]
pub trait CaptureSource {
    /// The device sample rate in Hz.
    fn sample_rate(&self) -> u32;
    /// Begins delivering frames to `on_frame` until `stop` is called.
    fn start(&mut self, on_frame: FrameCallback) -> Result<()>;
    /// Stops the stream and releases the device.
    fn stop(&mut self);
}

/// The default microphone, via cpal.
pub struct CpalCapture {
    device: Device,
    config: SupportedStreamConfig,
    stream: Option<Stream>,
}

impl CpalCapture {
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .context("no audio input device available")?;
        let config = device
            .default_input_config()
            .context("failed to query input device configuration")?;
        info!(
            device = %device.name().unwrap_or_else(|_| "<unnamed>".into()),
            rate = config.sample_rate().0,
            "input device ready"
        );
        Ok(Self {
            device,
            config,
            stream: None,
        })
    }
}

impl CaptureSource for CpalCapture {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    fn start(&mut self, on_frame: FrameCallback) -> Result<()> {
        let channels = self.config.channels() as usize;
        let stream = match self.config.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&self.device, &self.config, channels, on_frame),
            SampleFormat::I16 => build_stream::<i16>(&self.device, &self.config, channels, on_frame),
            SampleFormat::U16 => build_stream::<u16>(&self.device, &self.config, channels, on_frame),
            other => bail!("unsupported capture sample format: {other:?}"),
        }?;
        stream.play().context("failed to start capture stream")?;
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the stream releases the hardware lock.
        self.stream = None;
    }
}

fn build_stream<T>(
    device: &Device,
    config: &SupportedStreamConfig,
    channels: usize,
    mut on_frame: FrameCallback,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let stream = device.build_input_stream(
        &config.clone().into(),
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let mono = downmix(data, channels);
            on_frame(&mono);
        },
        |err| error!(%err, "capture stream error"),
        None,
    )?;
    Ok(stream)
}

/// Averages interleaved channels down to mono f32.
fn downmix<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    if channels <= 1 {
        return data.iter().map(|&s| f32::from_sample(s)).collect();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().map(|&s| f32::from_sample(s)).sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn downmix_passes_mono_through() {
        let out = downmix(&[0.5f32, -0.5], 1);
        assert_eq!(out, vec![0.5, -0.5]);
    }

    #[test]
    fn downmix_averages_stereo() {
        let out = downmix(&[1.0f32, 0.0, -1.0, -1.0], 2);
        assert_abs_diff_eq!(out[0], 0.5, epsilon = 0.0001);
        assert_abs_diff_eq!(out[1], -1.0, epsilon = 0.0001);
    }

    #[test]
    fn downmix_converts_i16_samples() {
        let out = downmix(&[i16::MAX, 0], 2);
        assert_eq!(out.len(), 1);
        assert_abs_diff_eq!(out[0], 0.5, epsilon = 0.001);
    }
}
