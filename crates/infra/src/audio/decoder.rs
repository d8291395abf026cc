//! Whole-file decoding with symphonia
//!
//! Sounds on a board are short, so each one is decoded completely into
//! interleaved f32 before playback starts.

use async_trait::async_trait;
use soundboard_core::domain::audio::{AudioError, DecodedAudio, Result};
use soundboard_core::domain::playback::AudioDecoder;
use soundboard_core::domain::track::TrackSource;
use std::fs::File;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, instrument, warn};

/// Decodes wav, mp3 and ogg/vorbis tracks
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode an in-memory or on-disk sound synchronously
    pub fn decode_blocking(source: &TrackSource, extension: Option<&str>) -> Result<DecodedAudio> {
        let media: Box<dyn MediaSource> = match source {
            TrackSource::File(path) => Box::new(File::open(path).map_err(|e| {
                AudioError::DecodeError(format!("Failed to open {}: {}", path.display(), e))
            })?),
            // shares the track's bytes
            TrackSource::Memory(bytes) => Box::new(Cursor::new(bytes.clone())),
        };

        let mss = MediaSourceStream::new(media, Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| AudioError::DecodeError(format!("Failed to probe format: {}", e)))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::DecodeError("No audio track found".to_string()))?;

        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let mut channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(2);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::DecodeError(format!("Failed to create decoder: {}", e)))?;

        let mut samples = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => return Err(AudioError::DecodeError(format!("Failed to read packet: {}", e))),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(AudioError::DecodeError(format!("Decode failed: {}", e))),
            };

            let spec = *decoded.spec();
            sample_rate = spec.rate;
            channels = spec.channels.count() as u16;

            let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }

        if samples.is_empty() {
            return Err(AudioError::DecodeError("Sound contains no audio".to_string()));
        }

        let audio = DecodedAudio::new(samples, sample_rate, channels);
        debug!(frames = audio.frames(), sample_rate, channels, "Decoded sound");
        Ok(audio)
    }
}

#[async_trait]
impl AudioDecoder for SymphoniaDecoder {
    #[instrument(skip(self, source))]
    async fn decode(&self, source: &TrackSource, extension: Option<&str>) -> Result<DecodedAudio> {
        let source = source.clone();
        let extension = extension.map(str::to_owned);
        tokio::task::spawn_blocking(move || Self::decode_blocking(&source, extension.as_deref()))
            .await
            .map_err(|e| AudioError::DecodeError(e.to_string()))?
    }
}
