//! Audio-side building blocks: dejitter buffer, decoders, clock, sink

pub mod aac;
pub mod alac;
pub mod buffer;
pub mod clock;
pub mod decoder;
pub mod eld_pipe;
pub mod sink;


pub use buffer::{AdmitOutcome, CircularBuffer, DequeuedFrame};
pub use clock::SyncClock;
pub use decoder::{AudioFormat, DecodeError, Decoder, DecoderSpec};
pub use sink::{PcmFrame, PcmSink, SinkError};
