//! Source traits for snapshot capture

use crate::Result;

/// Something that can hand out the current contents of the telemetry region.
///
/// Sources are polled: every refresh calls [`read_region`](Self::read_region)
/// once. Reads run on a blocking worker, never on the notification tick.
///
/// Implementations:
/// - [`ShmSource`](crate::sources::ShmSource): the producer's shared memory file
/// - [`MemorySource`](crate::sources::MemorySource): an in-memory region for replay and tests
pub trait SnapshotSource: Send + Sync + 'static {
    /// Copy of the region as it is right now.
    fn read_region(&self) -> Result<Vec<u8>>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Side channel reporting whether the databox is online.
///
/// Read once per refresh and merged into the decoded snapshot.
pub trait StatusProbe: Send + Sync + 'static {
    fn is_online(&self) -> Result<bool>;
}
