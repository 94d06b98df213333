use std::io::{Cursor, ErrorKind};

use async_trait::async_trait;
use bytes::Bytes;
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use crate::{DecodedAudio, PulseError, Result};

/// Turns a fetched payload into playable PCM.
#[async_trait]
pub trait AudioDecoder: Send + Sync {
    async fn decode(&self, payload: Bytes) -> Result<DecodedAudio>;
}

/// Decodes whole payloads with symphonia on the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct SymphoniaDecoder {
    extension_hint: Option<String>,
}

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hints the container format (e.g. `mp3`) to speed up probing.
    pub fn with_extension_hint(extension: impl Into<String>) -> Self {
        Self {
            extension_hint: Some(extension.into()),
        }
    }

    /// Synchronous decode of a complete in-memory payload.
    pub fn decode_blocking(&self, payload: impl Into<Bytes>) -> Result<DecodedAudio> {
        let stream =
            MediaSourceStream::new(Box::new(Cursor::new(payload.into())), Default::default());
        let mut hint = Hint::new();
        if let Some(extension) = &self.extension_hint {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(PulseError::decode)?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| PulseError::decode("no decodable audio track"))?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let mut channels = track
            .codec_params
            .channels
            .map(|channels| channels.count())
            .unwrap_or(0);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(PulseError::decode)?;

        let mut samples = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                    break
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(err) => return Err(PulseError::decode(err)),
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate = spec.rate;
                    channels = spec.channels.count();

                    let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buffer.samples());
                }
                Err(SymphoniaError::DecodeError(reason)) => {
                    tracing::warn!(reason, "skipping undecodable packet");
                }
                Err(err) => return Err(PulseError::decode(err)),
            }
        }

        if samples.is_empty() || channels == 0 || sample_rate == 0 {
            return Err(PulseError::decode("payload contains no audio"));
        }

        tracing::debug!(
            channels,
            sample_rate,
            frames = samples.len() / channels,
            "decoded payload"
        );
        Ok(DecodedAudio::new(samples, channels, sample_rate))
    }
}

#[async_trait]
impl AudioDecoder for SymphoniaDecoder {
    async fn decode(&self, payload: Bytes) -> Result<DecodedAudio> {
        let decoder = self.clone();
        tokio::task::spawn_blocking(move || decoder.decode_blocking(payload))
            .await
            .map_err(|err| PulseError::decode(format!("decoder task failed: {err}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_payload(channels: u16, sample_rate: u32, frames: usize) -> Bytes {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut raw = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut raw), spec).unwrap();
            for n in 0..frames * channels as usize {
                let value = if n % 2 == 0 { i16::MAX / 2 } else { -i16::MAX / 2 };
                writer.write_sample(value).unwrap();
            }
            writer.finalize().unwrap();
        }
        Bytes::from(raw)
    }

    #[tokio::test]
    async fn decodes_wav_payload() {
        let decoder = SymphoniaDecoder::new();
        let audio = decoder.decode(wav_payload(2, 8_000, 800)).await.unwrap();

        assert_eq!(audio.channels, 2);
        assert_eq!(audio.sample_rate, 8_000);
        assert_eq!(audio.frames(), 800);
        assert!((audio.samples[0] - 0.5).abs() < 0.01);
    }

    #[tokio::test]
    async fn rejects_garbage_payload() {
        let decoder = SymphoniaDecoder::with_extension_hint("mp3");
        let err = decoder
            .decode(Bytes::from_static(b"definitely not audio"))
            .await
            .unwrap_err();

        assert!(matches!(err, PulseError::Decode { .. }));
    }

    #[test]
    fn rejects_empty_payload() {
        let decoder = SymphoniaDecoder::new();
        assert!(decoder.decode_blocking(Bytes::new()).is_err());
    }
}
