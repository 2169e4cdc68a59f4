//! Link configuration.
//!
//! Loaded from a YAML document; every field has a default so an empty document
//! describes the reference deployment.
//!
//! ```rust
//! use databox_link::LinkConfig;
//!
//! let config = LinkConfig::from_yaml("notify_interval_ms: 20\nmax_payload: 180\n").unwrap();
//! assert_eq!(config.notify_interval_ms, 20);
//! assert_eq!(config.shm_size, 1024);
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::snapshot::layout;
use crate::types::FRAME_OVERHEAD;
use crate::{LinkError, Result};

pub const DEF_SHM_PATH: &str = "/dev/shm/gallopiq_shm";
pub const DEF_SERIAL_PATH: &str = "/etc/gallopiq/databox_sn";
pub const DEF_NOTIFY_INTERVAL_MS: u64 = 40;
pub const DEF_MEASURE_ADDR: &str = "127.0.0.1:4242";
pub const DEF_TIME_SYNC_THRESHOLD_SECS: u64 = 120;
pub const DEF_NAME_PREFIX: &str = "Calvara";

/// Configuration for the whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Shared-memory region written by the producer.
    pub shm_path: PathBuf,
    /// Bytes mapped from the region.
    pub shm_size: usize,
    /// File holding the persisted databox serial number.
    pub serial_path: PathBuf,
    /// File read at refresh time for the online flag. `None` means always offline.
    pub status_path: Option<PathBuf>,
    /// Tick interval of the notification scheduler.
    pub notify_interval_ms: u64,
    /// Payload bytes per body packet.
    pub max_payload: usize,
    /// Measurement service control socket.
    pub measure_addr: String,
    /// Clock is only corrected when off by more than this.
    pub time_sync_threshold_secs: u64,
    /// Advertised local name is this prefix followed by the serial.
    pub advertised_name_prefix: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            shm_path: PathBuf::from(DEF_SHM_PATH),
            shm_size: layout::DEFAULT_REGION_SIZE,
            serial_path: PathBuf::from(DEF_SERIAL_PATH),
            status_path: None,
            notify_interval_ms: DEF_NOTIFY_INTERVAL_MS,
            max_payload: crate::protocol::DEFAULT_MAX_PAYLOAD,
            measure_addr: DEF_MEASURE_ADDR.to_string(),
            time_sync_threshold_secs: DEF_TIME_SYNC_THRESHOLD_SECS,
            advertised_name_prefix: DEF_NAME_PREFIX.to_string(),
        }
    }
}

impl LinkConfig {
    /// Read and validate a YAML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|e| LinkError::io_error(path.to_path_buf(), e))?;
        debug!(path = %path.display(), "Loading link configuration");
        Self::from_yaml(&text)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: LinkConfig = if text.trim().is_empty() {
            LinkConfig::default()
        } else {
            serde_yaml_ng::from_str(text)
                .map_err(|e| LinkError::parse("Link configuration", e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_payload == 0 {
            return Err(LinkError::config("max_payload must be greater than zero"));
        }
        if self.max_payload + FRAME_OVERHEAD > u16::MAX as usize {
            return Err(LinkError::config(format!(
                "max_payload {} does not fit a u16 frame length",
                self.max_payload
            )));
        }
        if self.notify_interval_ms == 0 {
            return Err(LinkError::config("notify_interval_ms must be greater than zero"));
        }
        if self.shm_size < layout::HEADER_SIZE {
            return Err(LinkError::config(format!(
                "shm_size {} is smaller than the {} byte header",
                self.shm_size,
                layout::HEADER_SIZE
            )));
        }
        self.measure_socket()?;
        Ok(())
    }

    pub fn notify_interval(&self) -> Duration {
        Duration::from_millis(self.notify_interval_ms)
    }

    pub fn time_sync_threshold(&self) -> Duration {
        Duration::from_secs(self.time_sync_threshold_secs)
    }

    pub fn measure_socket(&self) -> Result<SocketAddr> {
        self.measure_addr
            .parse()
            .map_err(|e| LinkError::config(format!("measure_addr '{}': {}", self.measure_addr, e)))
    }
}

/// Read the persisted databox serial number.
pub fn read_serial<P: AsRef<Path>>(path: P) -> Result<u32> {
    let path = path.as_ref();
    let text =
        std::fs::read_to_string(path).map_err(|e| LinkError::io_error(path.to_path_buf(), e))?;
    text.trim().parse::<u32>().map_err(|e| {
        LinkError::parse("Databox serial", format!("{}: '{}' ({})", path.display(), text.trim(), e))
    })
}

/// Local name announced to scanners, e.g. `Calvara1234`.
pub fn advertised_name(prefix: &str, serial: u32) -> String {
    format!("{}{}", prefix, serial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_gives_defaults() {
        let config = LinkConfig::from_yaml("").expect("defaults are valid");
        assert_eq!(config, LinkConfig::default());
        assert_eq!(config.notify_interval(), Duration::from_millis(40));
        assert_eq!(config.time_sync_threshold(), Duration::from_secs(120));
        assert_eq!(config.max_payload, 100);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let yaml = "shm_path: /tmp/region\nstatus_path: /run/online\nmax_payload: 180\n";
        let config = LinkConfig::from_yaml(yaml).expect("valid");
        assert_eq!(config.shm_path, PathBuf::from("/tmp/region"));
        assert_eq!(config.status_path, Some(PathBuf::from("/run/online")));
        assert_eq!(config.max_payload, 180);
        assert_eq!(config.shm_size, 1024);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(LinkConfig::from_yaml("max_payload: 0"), Err(LinkError::Config { .. })));
        assert!(matches!(
            LinkConfig::from_yaml("notify_interval_ms: 0"),
            Err(LinkError::Config { .. })
        ));
        assert!(matches!(LinkConfig::from_yaml("shm_size: 12"), Err(LinkError::Config { .. })));
        assert!(matches!(
            LinkConfig::from_yaml("measure_addr: not-an-address"),
            Err(LinkError::Config { .. })
        ));
        assert!(matches!(LinkConfig::from_yaml("bogus_key: 1"), Err(LinkError::Parse { .. })));
    }

    #[test]
    fn serial_is_read_and_trimmed() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "  1234 ").expect("write");
        assert_eq!(read_serial(file.path()).expect("numeric serial"), 1234);
        assert_eq!(advertised_name(DEF_NAME_PREFIX, 1234), "Calvara1234");

        let mut bad = tempfile::NamedTempFile::new().expect("temp file");
        write!(bad, "abc").expect("write");
        assert!(matches!(read_serial(bad.path()), Err(LinkError::Parse { .. })));
        assert!(matches!(read_serial("/nonexistent/databox_sn"), Err(LinkError::Io { .. })));
    }
}
