//! Out-of-process AAC-ELD decoding
//!
//! Fallback used when the native ELD decoder is unavailable: an external
//! helper executable is spawned per session and fed LATM-framed input on
//! stdin, answering with raw PCM frames on stdout. The child's lifetime is
//! scoped to the session; it is killed when the decoder is dropped.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use super::decoder::{DecodeError, DecoderSpec};

/// Largest payload a 13-bit LATM length field can frame.
const MAX_LATM_PAYLOAD: usize = 0x1FFF;

/// AAC-ELD decoder speaking LATM over a child process pipe
pub struct EldPipeDecoder {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    spec: DecoderSpec,
}

impl EldPipeDecoder {
    /// Spawn the helper and wire up its pipes.
    ///
    /// The helper receives the stream layout as arguments:
    /// `<sample_rate> <channels> <frame_length>`.
    ///
    /// # Errors
    /// Returns [`DecodeError::Helper`] when the executable cannot be
    /// started.
    pub fn spawn(helper: &Path, spec: DecoderSpec) -> Result<Self, DecodeError> {
        let mut child = Command::new(helper)
            .arg(spec.sample_rate.to_string())
            .arg(spec.channels.to_string())
            .arg(spec.frame_length.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DecodeError::Configure("helper stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DecodeError::Configure("helper stdout unavailable".into()))?;

        Ok(Self {
            child,
            stdin,
            stdout,
            spec,
        })
    }

    /// Bytes per decoded frame.
    #[must_use]
    pub fn output_size(&self) -> usize {
        self.spec.output_size()
    }

    /// Ship one ELD frame through the helper and read the PCM back.
    ///
    /// # Errors
    /// Returns [`DecodeError`] when framing fails or the pipe breaks; the
    /// caller substitutes silence and keeps the stream going.
    pub fn decode(&mut self, input: &[u8]) -> Result<Vec<u8>, DecodeError> {
        if input.len() > MAX_LATM_PAYLOAD {
            return Err(DecodeError::Frame(format!(
                "frame of {} bytes exceeds LATM framing",
                input.len()
            )));
        }

        // LOAS AudioSyncStream framing: 11-bit syncword 0x2B7 followed by a
        // 13-bit payload length.
        #[allow(clippy::cast_possible_truncation)]
        let header = [
            0x56,
            0xE0 | ((input.len() >> 8) as u8 & 0x1F),
            input.len() as u8,
        ];
        self.stdin.write_all(&header)?;
        self.stdin.write_all(input)?;
        self.stdin.flush()?;

        let mut pcm = vec![0u8; self.spec.output_size()];
        self.stdout.read_exact(&mut pcm)?;
        Ok(pcm)
    }
}

impl Drop for EldPipeDecoder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
