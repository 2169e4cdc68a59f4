//! Online status probes

use std::path::{Path, PathBuf};

use tracing::trace;

use crate::source::StatusProbe;
use crate::{LinkError, Result};

/// Reads the online flag from a small status file.
///
/// `1`, `true`, `online` and `yes` (any case, surrounding whitespace ignored)
/// mean online; any other content means offline. A missing or unreadable file
/// is an error so the refresh fails instead of reporting a guessed state.
#[derive(Debug, Clone)]
pub struct FileStatusProbe {
    path: PathBuf,
}

impl FileStatusProbe {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl StatusProbe for FileStatusProbe {
    fn is_online(&self) -> Result<bool> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| LinkError::StatusProbe {
            reason: format!("{}: {}", self.path.display(), e),
        })?;
        let value = text.trim().to_ascii_lowercase();
        let online = matches!(value.as_str(), "1" | "true" | "online" | "yes");
        trace!(path = %self.path.display(), online, "Probed online status");
        Ok(online)
    }
}

/// Probe with a fixed answer, used when no status file is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedStatusProbe(pub bool);

impl StatusProbe for FixedStatusProbe {
    fn is_online(&self) -> Result<bool> {
        Ok(self.0)
    }
}
