//! Debug packet dumps
//!
//! Compiled behind the `dump` feature: writes per-packet ciphertext and
//! decoded PCM under the configured directory as `raw_<seq>` / `pcm_<seq>`.

use std::fs;
use std::path::{Path, PathBuf};

/// Writes packet dumps under one directory
pub(crate) struct DumpWriter {
    dir: PathBuf,
}

impl DumpWriter {
    pub fn new(dir: &Path) -> Self {
        if let Err(e) = fs::create_dir_all(dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot create dump directory");
        }
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn raw(&self, sequence: u16, bytes: &[u8]) {
        self.write(&format!("raw_{sequence}"), bytes);
    }

    pub fn pcm(&self, sequence: u16, bytes: &[u8]) {
        self.write(&format!("pcm_{sequence}"), bytes);
    }

    fn write(&self, name: &str, bytes: &[u8]) {
        let path = self.dir.join(name);
        if let Err(e) = fs::write(&path, bytes) {
            tracing::warn!(path = %path.display(), error = %e, "dump write failed");
        }
    }
}
