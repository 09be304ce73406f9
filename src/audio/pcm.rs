//! Sample encoding for the uplink.
//!
//! Captured audio is sent as **signed 16-bit little-endian mono PCM**.  The
//! byte order is fixed regardless of the host so the server never has to
//! guess.  No resampling happens here; chunks keep the capture device rate.

// ---------------------------------------------------------------------------
// downmix_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// * `channels == 1` returns the input unchanged.
/// * `channels == 0` returns an empty vector.
///
/// ```rust
/// use cameron_client::audio::downmix_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = downmix_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// i16 conversion
// ---------------------------------------------------------------------------

/// Convert one `[-1.0, 1.0]` sample to `i16`, clamping out-of-range input.
pub fn f32_to_i16(sample: f32) -> i16 {
    let clamped = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    (clamped * i16::MAX as f32).round() as i16
}

/// Encode samples as little-endian `i16` bytes (two bytes per sample).
///
/// ```rust
/// use cameron_client::audio::encode_pcm16_le;
///
/// assert_eq!(encode_pcm16_le(&[0.0, 1.0]), vec![0x00, 0x00, 0xFF, 0x7F]);
/// ```
pub fn encode_pcm16_le(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        out.extend_from_slice(&f32_to_i16(s).to_le_bytes());
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
