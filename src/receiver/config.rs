//! Stream configuration supplied by the control-plane collaborator

use std::path::PathBuf;

/// Configuration for one audio streaming session
#[derive(Debug, Clone, Default)]
pub struct StreamConfig {
    /// UDP port for the control socket (0 = ephemeral)
    pub control_port: u16,
    /// UDP port for the data socket (0 = ephemeral)
    pub data_port: u16,
    /// Key into the session store
    pub session_id: String,
    /// Mirroring session: audio may arrive on the control socket and
    /// retransmission requests are disabled
    pub is_mirroring: bool,
    /// Directory for raw/PCM packet dumps (used by the `dump` feature)
    pub dump_path: Option<PathBuf>,
    /// External AAC-ELD decoder executable for the codec fallback chain
    pub eld_helper: Option<PathBuf>,
}
