//! Unix platform support
//!
//! Shared memory mapping and system clock access.

pub mod clock;
pub mod mapping;

pub use clock::set_realtime;
pub use mapping::SharedMapping;
