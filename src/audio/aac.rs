//! AAC decoding using fdk-aac

use fdk_aac::dec::{Decoder as FdkDecoder, Transport};

use super::decoder::{DecodeError, DecoderSpec};

/// AAC profile variants used on the audio path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacProfile {
    /// AAC main profile (raw frames)
    Main,
    /// AAC low complexity, the ELD fallback
    Lc,
    /// AAC enhanced low delay
    Eld,
}

/// AAC decoder wrapper
pub struct AacDecoder {
    decoder: FdkDecoder,
    spec: DecoderSpec,
    scratch: Vec<i16>,
}

impl AacDecoder {
    /// Configure a raw-transport AAC decoder.
    ///
    /// # Errors
    /// Returns [`DecodeError`] when the profile/rate combination has no
    /// audio-specific config or fdk-aac rejects it.
    pub fn new(profile: AacProfile, spec: DecoderSpec) -> Result<Self, DecodeError> {
        let asc = audio_specific_config(profile, &spec)?;

        let mut decoder = FdkDecoder::new(Transport::Raw);
        decoder
            .config_raw(&asc)
            .map_err(|e| DecodeError::Configure(format!("{e:?}")))?;

        Ok(Self {
            decoder,
            spec,
            // fdk wants room for a full frame across all channels; oversize
            // so a config mismatch cannot make decode_frame overrun.
            scratch: vec![0i16; 2048 * 8],
        })
    }

    /// Bytes per decoded frame.
    #[must_use]
    pub fn output_size(&self) -> usize {
        self.spec.output_size()
    }

    /// Decode one raw AAC frame to interleaved little-endian 16-bit PCM.
    ///
    /// # Errors
    /// Returns [`DecodeError::Frame`] when fdk-aac rejects the bitstream.
    pub fn decode(&mut self, input: &[u8]) -> Result<Vec<u8>, DecodeError> {
        self.decoder
            .fill(input)
            .map_err(|e| DecodeError::Frame(format!("{e:?}")))?;
        self.decoder
            .decode_frame(&mut self.scratch)
            .map_err(|e| DecodeError::Frame(format!("{e:?}")))?;

        let samples = self.spec.frame_length as usize * usize::from(self.spec.channels);
        let mut out = Vec::with_capacity(self.spec.output_size());
        for sample in &self.scratch[..samples] {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(out)
    }
}

/// MPEG-4 audio-specific config fed to `config_raw`.
fn audio_specific_config(profile: AacProfile, spec: &DecoderSpec) -> Result<Vec<u8>, DecodeError> {
    match profile {
        AacProfile::Eld => {
            // The ELD config carries an escaped object type plus an
            // eldSpecificConfig; only the stream layout the protocol
            // actually uses is supported here.
            if spec.sample_rate == 44_100 && spec.channels == 2 {
                Ok(vec![0xF8, 0xE8, 0x50, 0x00])
            } else {
                Err(DecodeError::UnsupportedConfig(format!(
                    "aac-eld at {} Hz / {} ch",
                    spec.sample_rate, spec.channels
                )))
            }
        }
        AacProfile::Main | AacProfile::Lc => {
            let object_type: u16 = if profile == AacProfile::Main { 1 } else { 2 };
            let freq_index = sampling_frequency_index(spec.sample_rate)?;
            let asc = object_type << 11 | freq_index << 7 | u16::from(spec.channels) << 3;
            Ok(asc.to_be_bytes().to_vec())
        }
    }
}

fn sampling_frequency_index(rate: u32) -> Result<u16, DecodeError> {
    const RATES: [u32; 12] = [
        96_000, 88_200, 64_000, 48_000, 44_100, 32_000, 24_000, 22_050, 16_000, 12_000, 11_025,
        8_000,
    ];
    RATES
        .iter()
        .position(|&r| r == rate)
        .map(|i| i as u16)
        .ok_or_else(|| DecodeError::UnsupportedConfig(format!("sample rate {rate} Hz")))
}
