use rubato::{FastFixedIn, PolynomialDegree};

// Define standard sample rates for clarity and consistency
pub const WIRE_CAPTURE_SAMPLE_RATE: f64 = 16000.0; // what the server expects from the microphone
pub const WIRE_PLAYBACK_SAMPLE_RATE: f64 = 24000.0; // what inbound inline audio is encoded at

/// Frames handed to the resampler at a time, in samples.
pub const RESAMPLER_CHUNK: usize = 512;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,                     // No cutoff frequency, pass all frequencies
        PolynomialDegree::Cubic, // Cubic interpolation for quality
        chunk_size,
        1, // 1 channel (mono)
    )?;
    Ok(resampler)
}

/// Interprets little-endian PCM16 bytes as normalized f32 samples.
pub fn pcm16_bytes_to_f32(pcm16: &[u8]) -> Vec<f32> {
    pcm16
        .chunks_exact(2)
        .map(|chunk| {
            let v = i16::from_le_bytes([chunk[0], chunk[1]]);
            (v as f32 / 32768.0).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Converts f32 samples to little-endian PCM16 bytes.
pub fn f32_to_pcm16_bytes(pcm32: &[f32]) -> Vec<u8> {
    pcm32
        .iter()
        .flat_map(|&sample| {
            let v = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            v.to_le_bytes()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_create_resampler() {
        assert!(create_resampler(48000.0, WIRE_CAPTURE_SAMPLE_RATE, RESAMPLER_CHUNK).is_ok());
        assert!(create_resampler(WIRE_PLAYBACK_SAMPLE_RATE, 44100.0, RESAMPLER_CHUNK).is_ok());
        assert!(create_resampler(24000.0, 24000.0, 1024).is_ok());
    }

    #[test]
    fn test_pcm16_bytes_to_f32() {
        // i16 value 16384 = 0x4000 little endian = [0x00, 0x40], normalized 0.5.
        let result = pcm16_bytes_to_f32(&[0x00, 0x40, 0x00, 0x80]);
        assert_eq!(result.len(), 2);
        assert_abs_diff_eq!(result[0], 0.5, epsilon = 0.0001);
        assert_abs_diff_eq!(result[1], -1.0, epsilon = 0.0001);

        // An odd trailing byte cannot form a sample and is skipped.
        assert!(pcm16_bytes_to_f32(&[0x00]).is_empty());
        assert!(pcm16_bytes_to_f32(&[]).is_empty());
    }

    #[test]
    fn test_f32_to_pcm16_bytes() {
        let bytes = f32_to_pcm16_bytes(&[0.5, -1.0, 0.0]);
        assert_eq!(bytes.len(), 6);
        let back = pcm16_bytes_to_f32(&bytes);
        assert_abs_diff_eq!(back[0], 0.5, epsilon = 0.001);
        assert_abs_diff_eq!(back[1], -1.0, epsilon = 0.001);
        assert_abs_diff_eq!(back[2], 0.0, epsilon = 0.001);
    }

    #[test]
    fn test_out_of_range_samples_are_clamped() {
        let bytes = f32_to_pcm16_bytes(&[2.0, -2.0, f32::NAN]);
        for sample in pcm16_bytes_to_f32(&bytes) {
            assert!((-1.0..=1.0).contains(&sample));
        }
    }
}
