//! In-memory snapshot source

use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::source::SnapshotSource;
use crate::Result;

/// Region held in memory and replaceable at runtime.
///
/// Used for replaying captured regions and for driving the pipeline in tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    region: Arc<Mutex<Vec<u8>>>,
}

impl MemorySource {
    pub fn new(region: Vec<u8>) -> Self {
        Self { region: Arc::new(Mutex::new(region)) }
    }

    /// Swap in new region contents, as a producer write would.
    pub fn replace(&self, region: Vec<u8>) {
        trace!(len = region.len(), "Replacing in-memory region");
        *self.region.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = region;
    }
}

impl SnapshotSource for MemorySource {
    fn read_region(&self) -> Result<Vec<u8>> {
        Ok(self.region.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
