//! Shared memory snapshot source

use std::path::Path;

use tracing::info;

use crate::source::SnapshotSource;
use crate::Result;

#[cfg(unix)]
use crate::unix::SharedMapping;

/// Source backed by the producer's shared memory file.
///
/// The file is opened read-only and mapped once; each read copies the mapped
/// bytes so decoding never races the producer mid-parse.
#[cfg(unix)]
pub struct ShmSource {
    mapping: SharedMapping,
}

#[cfg(unix)]
impl ShmSource {
    /// Map `size` bytes of the region at `path`.
    pub fn open<P: AsRef<Path>>(path: P, size: usize) -> Result<Self> {
        let mapping = SharedMapping::open(path, size)?;
        info!(path = %mapping.path().display(), len = mapping.len(), "Opened shared memory source");
        Ok(Self { mapping })
    }
}

#[cfg(unix)]
impl SnapshotSource for ShmSource {
    fn read_region(&self) -> Result<Vec<u8>> {
        Ok(self.mapping.read())
    }

    fn describe(&self) -> String {
        format!("shm:{}", self.mapping.path().display())
    }
}

// Non-Unix stub implementation
#[cfg(not(unix))]
pub struct ShmSource {
    _private: (),
}

#[cfg(not(unix))]
impl ShmSource {
    /// Shared memory mapping is only implemented for Unix targets.
    pub fn open<P: AsRef<Path>>(_path: P, _size: usize) -> Result<Self> {
        info!("Shared memory source requested on unsupported platform");
        Err(crate::LinkError::unsupported_platform("Shared memory source", "Unix"))
    }
}

#[cfg(not(unix))]
impl SnapshotSource for ShmSource {
    fn read_region(&self) -> Result<Vec<u8>> {
        Err(crate::LinkError::unsupported_platform("Shared memory source", "Unix"))
    }

    fn describe(&self) -> String {
        "shm:unsupported".to_string()
    }
}
