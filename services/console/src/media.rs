//! The outbound media pipeline: typed text, camera stills, microphone audio.
//!
//! Everything here funnels into the connection's guarded [`FrameSender`];
//! whatever is offered while the channel is down is dropped, never queued.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use rubato::Resampler;
use tracing::debug;

use bidichat_core::event::ClientFrame;
use bidichat_core::summary;

use crate::audio::{self, RESAMPLER_CHUNK, WIRE_CAPTURE_SAMPLE_RATE};
use crate::capture::{CaptureSource, FrameCallback};
use crate::connection::{FrameSender, OutboundFrame};
use crate::log::{Direction, SessionLog};

/// JPEG quality for captured stills, out of 100.
pub const JPEG_QUALITY: u8 = 85;

/// Packages a typed user message and hands it to the connection.
pub fn send_text(sender: &FrameSender, log: &SessionLog, text: &str) -> Result<()> {
    let frame = ClientFrame::Text {
        text: text.to_owned(),
    };
    sender.send(OutboundFrame::Text(serde_json::to_string(&frame)?));
    log.record(Direction::Outbound, format!("text {}", summary::preview(text)));
    Ok(())
}

/// Encodes a still frame, sends it, and returns the JPEG bytes so the caller
/// can echo the sent image locally without waiting for the server.
pub fn send_image(sender: &FrameSender, log: &SessionLog, still: &RgbImage) -> Result<Vec<u8>> {
    let jpeg = encode_jpeg(still)?;
    let frame = ClientFrame::Image {
        data: STANDARD.encode(&jpeg),
        mime_type: "image/jpeg".to_owned(),
    };
    sender.send(OutboundFrame::Text(serde_json::to_string(&frame)?));
    log.record(
        Direction::Outbound,
        format!("image/jpeg {} bytes", jpeg.len()),
    );
    Ok(jpeg)
}

fn encode_jpeg(still: &RgbImage) -> Result<Vec<u8>> {
    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    still
        .write_with_encoder(encoder)
        .context("JPEG encoding failed")?;
    Ok(jpeg)
}

/// A camera capture source yielding a single still frame on demand.
pub trait CameraSource {
    fn capture_still(&mut self) -> Result<RgbImage>;
}

/// File-backed stand-in for a hardware camera: "captures" a still by
/// reading an image from disk.
pub struct FileStill {
    path: PathBuf,
}

impl FileStill {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CameraSource for FileStill {
    fn capture_still(&mut self) -> Result<RgbImage> {
        let image = image::open(&self.path)
            .with_context(|| format!("failed to read still frame from {}", self.path.display()))?;
        Ok(image.to_rgb8())
    }
}

/// Streams microphone frames to the connection while enabled.
///
/// Device-rate samples are resampled to the 16 kHz PCM16 the wire expects
/// and sent immediately as raw binary frames, one per resampler chunk. There
/// is no batching and no buffering across a disabled or disconnected gap.
pub struct MicPipeline {
    source: Box<dyn CaptureSource>,
    sender: FrameSender,
    active: Arc<AtomicBool>,
}

impl MicPipeline {
    pub fn new(source: Box<dyn CaptureSource>, sender: FrameSender) -> Self {
        Self {
            source,
            sender,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Enables capture. A second enable while already active is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.active.load(Ordering::SeqCst) {
            debug!("audio capture already active");
            return Ok(());
        }
        let mut resampler = audio::create_resampler(
            self.source.sample_rate() as f64,
            WIRE_CAPTURE_SAMPLE_RATE,
            RESAMPLER_CHUNK,
        )?;
        let sender = self.sender.clone();
        let active = Arc::clone(&self.active);
        let mut pending: Vec<f32> = Vec::new();
        let on_frame: FrameCallback = Box::new(move |samples| {
            if !active.load(Ordering::SeqCst) {
                // Toggled off: frames are dropped, never held back.
                return;
            }
            pending.extend_from_slice(samples);
            let needed = resampler.input_frames_next();
            while pending.len() >= needed {
                let chunk: Vec<f32> = pending.drain(..needed).collect();
                match resampler.process(&[chunk], None) {
                    Ok(resampled) => sender.send(OutboundFrame::Audio(audio::f32_to_pcm16_bytes(
                        &resampled[0],
                    ))),
                    Err(err) => debug!(%err, "capture resampling failed; frame dropped"),
                }
            }
        });
        self.source.start(on_frame)?;
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Disables capture and releases the device. Safe to call when idle.
    pub fn stop(&mut self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.source.stop();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MockCaptureSource;
    use crate::connection::{LinkState, LinkStatus};
    use tokio::sync::mpsc;

    fn open_sender() -> (FrameSender, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(16);
        let status = LinkStatus::default();
        status.set(LinkState::Open);
        (FrameSender::new(status, tx), rx)
    }

    #[test]
    fn mic_enable_is_idempotent() {
        let mut source = MockCaptureSource::new();
        source.expect_sample_rate().return_const(16000u32);
        source.expect_start().times(1).returning(|_| Ok(()));

        let (sender, _rx) = open_sender();
        let mut mic = MicPipeline::new(Box::new(source), sender);
        mic.start().unwrap();
        mic.start().unwrap();
        assert!(mic.is_active());
    }

    #[test]
    fn mic_stop_releases_and_allows_restart() {
        let mut source = MockCaptureSource::new();
        source.expect_sample_rate().return_const(16000u32);
        source.expect_start().times(2).returning(|_| Ok(()));
        source.expect_stop().times(1).return_const(());

        let (sender, _rx) = open_sender();
        let mut mic = MicPipeline::new(Box::new(source), sender);
        mic.start().unwrap();
        mic.stop();
        assert!(!mic.is_active());
        mic.stop();
        mic.start().unwrap();
    }

    #[test]
    fn captured_frames_reach_the_wire_as_pcm16() {
        let mut source = MockCaptureSource::new();
        source.expect_sample_rate().return_const(16000u32);
        // Drive the callback synchronously with one chunk's worth of samples.
        source.expect_start().returning(|mut on_frame| {
            on_frame(&vec![0.25f32; RESAMPLER_CHUNK]);
            Ok(())
        });

        let (sender, mut rx) = open_sender();
        let mut mic = MicPipeline::new(Box::new(source), sender);
        mic.start().unwrap();

        let OutboundFrame::Audio(pcm) = rx.try_recv().unwrap() else {
            panic!("expected a binary audio frame");
        };
        assert_eq!(pcm.len(), RESAMPLER_CHUNK * 2);
    }

    #[test]
    fn jpeg_encoding_uses_the_jpeg_container() {
        let still = RgbImage::new(8, 8);
        let jpeg = encode_jpeg(&still).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn send_image_emits_an_image_frame_and_returns_the_echo() {
        let (sender, mut rx) = open_sender();
        let log = SessionLog::new();
        let still = RgbImage::new(4, 4);

        let jpeg = send_image(&sender, &log, &still).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let OutboundFrame::Text(json) = rx.try_recv().unwrap() else {
            panic!("expected a text frame");
        };
        assert!(json.contains(r#""type":"image""#));
        assert!(json.contains(r#""mimeType":"image/jpeg""#));
        assert_eq!(log.recent(1)[0].summary, format!("image/jpeg {} bytes", jpeg.len()));
    }

    #[test]
    fn send_text_logs_an_outbound_entry() {
        let (sender, mut rx) = open_sender();
        let log = SessionLog::new();
        send_text(&sender, &log, "hello").unwrap();

        let OutboundFrame::Text(json) = rx.try_recv().unwrap() else {
            panic!("expected a text frame");
        };
        assert_eq!(json, r#"{"type":"text","text":"hello"}"#);
        assert_eq!(log.recent(1)[0].summary, r#"text "hello""#);
    }

    #[test]
    fn missing_still_file_is_an_error_not_a_crash() {
        let mut camera = FileStill::new("/definitely/not/a/real/path.png");
        assert!(camera.capture_still().is_err());
    }
}
