//! Packet fragmentation protocol.
//!
//! A transfer is one [`WireBlob`](crate::snapshot::WireBlob) split into a meta
//! packet followed by body packets small enough for a single notification.
//! Each frame carries its own length and CRC32; the meta packet additionally
//! carries the CRC32 of the whole blob and the coordinates of the final body
//! packet so a receiver can detect short or corrupted transfers.

pub mod fragment;
pub mod reassembly;

pub use fragment::{DEFAULT_MAX_PAYLOAD, PacketFragmenter};
pub use reassembly::{AssemblyStatus, TransferAssembler};
