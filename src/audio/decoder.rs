//! Codec dispatch
//!
//! One decoder per session, selected once from the format the sender
//! advertised. Variants are tagged values behind a uniform decode surface;
//! the AAC-ELD path is a fallback chain where the first factory that
//! configures wins.

use std::path::Path;

use thiserror::Error;

use crate::protocol::constants::{
    BITS_PER_SAMPLE, CHANNELS, DEFAULT_FRAMES_PER_PACKET, SAMPLE_RATE,
};

use super::aac::{AacDecoder, AacProfile};
use super::alac::AlacDecoder;
use super::eld_pipe::EldPipeDecoder;

/// Audio format advertised for the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// Apple Lossless
    Alac,
    /// AAC main profile, raw frames
    Aac,
    /// AAC Enhanced Low Delay
    AacEld,
    /// Uncompressed 16-bit PCM
    Pcm,
    /// Not advertised; resolved through the compression-type fallback
    Unknown,
}

/// Decoder configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderSpec {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u8,
    /// Bits per sample
    pub bit_depth: u8,
    /// Samples per frame
    pub frame_length: u32,
}

impl DecoderSpec {
    /// Standard RAOP output: 16-bit stereo at 44100 Hz.
    #[must_use]
    pub fn stereo_44100(frame_length: u32) -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            bit_depth: BITS_PER_SAMPLE,
            frame_length,
        }
    }

    /// Bytes per decoded frame.
    #[must_use]
    pub fn output_size(&self) -> usize {
        self.frame_length as usize * usize::from(self.channels) * usize::from(self.bit_depth / 8)
    }
}

/// Errors from decoder configuration and decoding
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The requested configuration is outside what the codec supports
    #[error("unsupported decoder config: {0}")]
    UnsupportedConfig(String),

    /// The codec could not be configured
    #[error("decoder configuration failed: {0}")]
    Configure(String),

    /// A frame failed to decode
    #[error("decode failed: {0}")]
    Frame(String),

    /// I/O against the out-of-process decoder helper failed
    #[error("decoder helper I/O: {0}")]
    Helper(#[from] std::io::Error),
}

/// Session decoder
pub enum Decoder {
    /// Apple Lossless
    Alac(AlacDecoder),
    /// AAC (main or low-complexity profile)
    Aac(AacDecoder),
    /// AAC-ELD through the native decoder
    AacEld(AacDecoder),
    /// AAC-ELD through the out-of-process helper
    EldPipe(EldPipeDecoder),
    /// Pass-through
    Pcm(DecoderSpec),
}

impl Decoder {
    /// Select and configure the decoder for a session's advertised format.
    ///
    /// # Errors
    /// Returns the last [`DecodeError`] when no candidate configures, which
    /// for AAC-ELD means the whole fallback chain failed.
    pub fn select(
        format: AudioFormat,
        samples_per_frame: Option<u32>,
        compression_type: u8,
        eld_helper: Option<&Path>,
    ) -> Result<Self, DecodeError> {
        let frames = |fallback: u32| samples_per_frame.unwrap_or(fallback);

        match format {
            AudioFormat::Alac => {
                let spec = DecoderSpec::stereo_44100(frames(DEFAULT_FRAMES_PER_PACKET));
                Ok(Self::Alac(AlacDecoder::new(spec)?))
            }
            AudioFormat::Aac => {
                let spec = DecoderSpec::stereo_44100(frames(1024));
                Ok(Self::Aac(AacDecoder::new(AacProfile::Main, spec)?))
            }
            AudioFormat::AacEld => Self::select_eld(DecoderSpec::stereo_44100(frames(480)), eld_helper),
            AudioFormat::Pcm => {
                Ok(Self::Pcm(DecoderSpec::stereo_44100(frames(DEFAULT_FRAMES_PER_PACKET))))
            }
            AudioFormat::Unknown => {
                let resolved = if compression_type == 1 {
                    AudioFormat::Alac
                } else {
                    AudioFormat::Pcm
                };
                Self::select(resolved, samples_per_frame, compression_type, eld_helper)
            }
        }
    }

    /// AAC-ELD fallback chain: native FDK-ELD, then the external LATM
    /// helper, then plain AAC-LC of the same configuration.
    fn select_eld(spec: DecoderSpec, eld_helper: Option<&Path>) -> Result<Self, DecodeError> {
        type Factory = Box<dyn FnOnce() -> Result<Decoder, DecodeError>>;

        let mut chain: Vec<(&'static str, Factory)> = vec![(
            "fdk-aac-eld",
            Box::new(move || AacDecoder::new(AacProfile::Eld, spec).map(Decoder::AacEld)),
        )];
        if let Some(helper) = eld_helper {
            let helper = helper.to_path_buf();
            chain.push((
                "eld-helper",
                Box::new(move || EldPipeDecoder::spawn(&helper, spec).map(Decoder::EldPipe)),
            ));
        }
        chain.push((
            "fdk-aac-lc",
            Box::new(move || AacDecoder::new(AacProfile::Lc, spec).map(Decoder::Aac)),
        ));

        let mut last_err = DecodeError::Configure("empty decoder chain".into());
        for (name, factory) in chain {
            match factory() {
                Ok(decoder) => {
                    tracing::info!(decoder = name, "AAC-ELD decoder selected");
                    return Ok(decoder);
                }
                Err(e) => {
                    tracing::warn!(decoder = name, error = %e, "AAC-ELD candidate failed");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    /// Codec name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Alac(_) => "alac",
            Self::Aac(_) => "aac",
            Self::AacEld(_) => "aac-eld",
            Self::EldPipe(_) => "aac-eld-pipe",
            Self::Pcm(_) => "pcm",
        }
    }

    /// Bytes per decoded frame.
    #[must_use]
    pub fn output_size(&self) -> usize {
        match self {
            Self::Alac(d) => d.output_size(),
            Self::Aac(d) | Self::AacEld(d) => d.output_size(),
            Self::EldPipe(d) => d.output_size(),
            Self::Pcm(spec) => spec.output_size(),
        }
    }

    /// Decode one packet body to interleaved 16-bit PCM.
    ///
    /// # Errors
    /// Returns [`DecodeError`] when the codec rejects the frame; the caller
    /// substitutes a silent frame of [`Self::output_size`] bytes so the
    /// presentation cadence survives a corrupt packet.
    pub fn decode(&mut self, input: &[u8]) -> Result<Vec<u8>, DecodeError> {
        match self {
            Self::Alac(d) => d.decode(input),
            Self::Aac(d) | Self::AacEld(d) => d.decode(input),
            Self::EldPipe(d) => d.decode(input),
            Self::Pcm(_) => Ok(input.to_vec()),
        }
    }
}
