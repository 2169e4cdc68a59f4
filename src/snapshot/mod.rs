//! # Snapshot Capture and Encoding
//!
//! The external producer keeps a fixed-size region in shared memory up to date.
//! This module turns that region into a structured [`Snapshot`](crate::types::Snapshot)
//! and encodes the snapshot into the [`WireBlob`] that gets fragmented for delivery.
//!
//! ```text
//! region bytes ──► SnapshotDecoder ──► Snapshot ──► SnapshotSerializer ──► WireBlob
//!                                         ▲
//!                       status probe ─────┘ (online flag)
//! ```

pub mod decode;
pub mod layout;
pub mod serialize;

pub use decode::SnapshotDecoder;
pub use layout::{DEFAULT_REGION_SIZE, DEVICE_SIZE, HEADER_SIZE, encode_region};
pub use serialize::{BLOB_HEADER_SIZE, BlobContents, SnapshotSerializer, WireBlob, decode_blob};
