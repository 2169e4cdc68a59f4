//! Snapshot source and status probe implementations

pub mod memory;
pub mod shm;
pub mod status;

pub use memory::MemorySource;
pub use shm::ShmSource;
pub use status::{FileStatusProbe, FixedStatusProbe};
