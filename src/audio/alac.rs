//! Apple Lossless decoding via symphonia

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions, CODEC_TYPE_ALAC};
use symphonia::core::formats::Packet;

use super::decoder::{DecodeError, DecoderSpec};

/// ALAC decoder for RAOP packet bodies
pub struct AlacDecoder {
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    spec: DecoderSpec,
}

impl AlacDecoder {
    /// Configure an ALAC decoder for the session's stream parameters.
    ///
    /// The sender does not ship an ALAC magic cookie over RTP; it is
    /// reconstructed here from the negotiated frame length, depth, channel
    /// count and rate.
    ///
    /// # Errors
    /// Returns [`DecodeError::Configure`] when symphonia rejects the
    /// synthesized configuration.
    pub fn new(spec: DecoderSpec) -> Result<Self, DecodeError> {
        let cookie = magic_cookie(&spec);

        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_ALAC)
            .with_sample_rate(spec.sample_rate)
            .with_extra_data(cookie.to_vec().into_boxed_slice());

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Configure(e.to_string()))?;

        Ok(Self { decoder, spec })
    }

    /// Bytes per decoded frame.
    #[must_use]
    pub fn output_size(&self) -> usize {
        self.spec.output_size()
    }

    /// Decode one ALAC frame to interleaved little-endian 16-bit PCM.
    ///
    /// # Errors
    /// Returns [`DecodeError::Frame`] when the bitstream is rejected.
    pub fn decode(&mut self, input: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let packet = Packet::new_from_slice(0, 0, u64::from(self.spec.frame_length), input);

        let decoded = self
            .decoder
            .decode(&packet)
            .map_err(|e| DecodeError::Frame(e.to_string()))?;

        let signal_spec = *decoded.spec();
        let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, signal_spec);
        samples.copy_interleaved_ref(decoded);

        let mut out = Vec::with_capacity(self.spec.output_size());
        for sample in samples.samples() {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        // Short final frames are padded so every packet spans the same
        // presentation interval.
        out.resize(self.spec.output_size(), 0);
        Ok(out)
    }
}

/// 24-byte ALACSpecificConfig, the layout ALAC tooling calls the magic
/// cookie.
fn magic_cookie(spec: &DecoderSpec) -> [u8; 24] {
    let mut cookie = [0u8; 24];
    cookie[0..4].copy_from_slice(&spec.frame_length.to_be_bytes());
    cookie[4] = 0; // compatible version
    cookie[5] = spec.bit_depth;
    cookie[6] = 40; // rice history mult (pb)
    cookie[7] = 10; // rice initial history (mb)
    cookie[8] = 14; // rice limit (kb)
    cookie[9] = spec.channels;
    cookie[10..12].copy_from_slice(&255u16.to_be_bytes()); // max run
    cookie[12..16].copy_from_slice(&0u32.to_be_bytes()); // max frame bytes (unknown)
    cookie[16..20].copy_from_slice(&0u32.to_be_bytes()); // avg bit rate (unknown)
    cookie[20..24].copy_from_slice(&spec.sample_rate.to_be_bytes());
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_layout() {
        let spec = DecoderSpec::stereo_44100(352);
        let cookie = magic_cookie(&spec);

        assert_eq!(&cookie[0..4], &352u32.to_be_bytes());
        assert_eq!(cookie[5], 16);
        assert_eq!(cookie[9], 2);
        assert_eq!(&cookie[20..24], &44_100u32.to_be_bytes());
    }

    #[test]
    fn configures_from_synthesized_cookie() {
        let decoder = AlacDecoder::new(DecoderSpec::stereo_44100(352)).unwrap();
        assert_eq!(decoder.output_size(), 1408);
    }
}
