//! Audio decoder using symphonia
//!
//! Decodes a complete in-memory file into interleaved f32 samples for the
//! graph backend. Decoding runs on tokio's blocking pool so the event loop
//! keeps servicing timers while a large file decodes.
//!
//! # Sample Format
//!
//! - Output: interleaved f32 at the file's native rate and channel count
//! - No resampling (the graph device consumes native-rate buffers)

use super::{AudioDecoder, BackendFuture, DecodedAudio};
use crate::error::BackendError;
use futures::FutureExt;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Symphonia-backed [`AudioDecoder`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    /// Create a decoder
    pub fn new() -> Self {
        Self
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, bytes: Vec<u8>, hint: Option<String>) -> BackendFuture<DecodedAudio> {
        async move {
            tokio::task::spawn_blocking(move || decode_all(bytes, hint.as_deref()))
                .await
                .map_err(|e| BackendError::Decode(format!("decoder task failed: {}", e)))?
        }
        .boxed()
    }
}

/// Decode every packet of the default track
pub fn decode_all(bytes: Vec<u8>, hint_ext: Option<&str>) -> Result<DecodedAudio, BackendError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = hint_ext {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| BackendError::Decode(format!("unsupported format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| BackendError::Decode("No audio track found".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| BackendError::Decode(format!("unsupported codec: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break; // EOF
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(BackendError::Decode(e.to_string())),
        };

        // Skip packets from other tracks
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                channels = spec.channels.count() as u16;
                sample_rate = spec.rate;

                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                // Corrupt packet: skip it, keep the rest of the stream
                warn!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(BackendError::Decode(e.to_string())),
        }
    }

    if channels == 0 || sample_rate == 0 {
        return Err(BackendError::Decode("stream has no decodable audio".to_string()));
    }

    let audio = DecodedAudio {
        samples,
        channels,
        sample_rate,
    };
    debug!(
        "Decoded {} frames ({} ch @ {} Hz, {:.3}s)",
        audio.frames(),
        channels,
        sample_rate,
        audio.duration()
    );
    Ok(audio)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(frames: usize, channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames * channels as usize {
                writer.write_sample(((i % 64) as i16) * 100).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_wav_duration() {
        let bytes = wav_bytes(8000, 2, 16000);
        let audio = decode_all(bytes, Some("wav")).unwrap();

        assert_eq!(audio.channels, 2);
        assert_eq!(audio.sample_rate, 16000);
        assert_eq!(audio.frames(), 8000);
        assert!((audio.duration() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = decode_all(b"definitely not audio".to_vec(), Some("mp3"));
        assert!(matches!(result, Err(BackendError::Decode(_))));
    }

    #[tokio::test]
    async fn test_async_decode_uses_blocking_pool() {
        let bytes = wav_bytes(100, 1, 8000);
        let audio = SymphoniaDecoder::new()
            .decode(bytes, Some("wav".to_string()))
            .await
            .unwrap();
        assert_eq!(audio.frames(), 100);
    }
}
