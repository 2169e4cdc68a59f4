//! Chunked delivery of shared-memory telemetry snapshots over BLE notifications.
//!
//! A producer process keeps a fixed-layout telemetry region in shared memory.
//! This crate captures that region on request, serializes it into a compact
//! blob and drip-feeds it to a small-MTU notification channel as a sequence of
//! framed, CRC-checked packets led by one meta packet.
//!
//! # Pipeline
//!
//! ```text
//! write trigger -> CommandDispatcher -> Refresher (blocking worker)
//!     SnapshotSource -> SnapshotDecoder -> SnapshotSerializer -> PacketFragmenter
//!     -> publish (watch) -> DeliveryQueue replace -> NotificationScheduler ticks
//!     -> NotificationTransport::send, one frame per tick
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use databox_link::{ChannelTransport, DataboxLink, LinkConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LinkConfig::load("/etc/gallopiq/link.yaml")?;
//!     let (transport, mut frames) = ChannelTransport::new();
//!     let link = DataboxLink::open(config, Arc::new(transport))?;
//!
//!     // Refresh-and-send trigger written by the peer.
//!     link.dispatch(&[0xFF, 0xFF, 0xFF, 0xFF]);
//!
//!     while let Some(frame) = frames.recv().await {
//!         println!("notify {} bytes", frame.len());
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Capture and encoding
pub mod snapshot;
pub mod source;
pub mod sources;

// Framing and delivery
pub mod delivery;
pub mod protocol;

// Orchestration
pub mod command;
pub mod link;
pub mod refresh;

// Platform-specific modules
#[cfg(unix)]
pub mod unix;

// Core exports
pub use config::LinkConfig;
pub use error::*;
pub use types::*;

// Pipeline exports
pub use command::{Clock, Command, CommandDispatcher, ManualClock, MeasurementClient, SystemClock};
pub use delivery::{ChannelTransport, NotificationScheduler, NotificationTransport};
pub use link::{DataboxLink, LinkParts};
pub use protocol::{PacketFragmenter, TransferAssembler};
pub use refresh::{INITIAL_READ_VALUE, Published, Refresher};
pub use snapshot::{SnapshotDecoder, SnapshotSerializer, WireBlob};
pub use source::{SnapshotSource, StatusProbe};
