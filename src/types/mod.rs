//! Core types for snapshot and packet representation.
//!
//! - [`Snapshot`] is the decoded, immutable view of the shared-memory region
//! - [`DeviceRecord`] is one sensor entry within a snapshot
//! - [`DataId`] and [`DataIdCounter`] identify transfers, skipping reserved values
//! - [`Packet`] is one framed, checksummed notification unit
//!
//! ## Usage Example
//!
//! ```rust
//! use databox_link::types::{DataIdCounter, Snapshot};
//!
//! let snapshot = Snapshot::default();
//! assert_eq!(snapshot.num_devices, 0);
//! assert!(snapshot.devices.is_empty());
//!
//! let mut ids = DataIdCounter::new();
//! assert_eq!(ids.next_id().get(), 1);
//! ```

mod data_id;
mod packet;

pub use data_id::{DataId, DataIdCounter};
pub use packet::{META_FRAME_LEN, Packet, PacketKind, FRAME_OVERHEAD};

use serde::{Deserialize, Serialize};

/// USB supply above this voltage counts as "plugged in".
pub const USB_PRESENT_MV: i16 = 4300;

/// A `(seconds, microseconds)` timer pair as written by the producer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeVal {
    pub sec: i64,
    pub usec: i64,
}

impl TimeVal {
    pub fn new(sec: i64, usec: i64) -> Self {
        Self { sec, usec }
    }
}

/// Per-axis acceleration extrema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: i16,
    pub max: i16,
}

/// Acceleration extrema for all three axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccelExtrema {
    pub x: AxisRange,
    pub y: AxisRange,
    pub z: AxisRange,
}

/// One sensor device as reported in the shared-memory region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub serial: u32,
    pub online: bool,
    pub measurement_active: bool,
    pub accel: AccelExtrema,
    pub missing_packets: u32,
    pub battery_mv: i16,
    pub usb_mv: i16,
    pub rssi: i8,
}

impl DeviceRecord {
    /// Whether the device reports USB power above [`USB_PRESENT_MV`].
    pub fn usb_present(&self) -> bool {
        self.usb_mv > USB_PRESENT_MV
    }
}

/// Decoded view of the shared-memory region at one point in time.
///
/// Snapshots are never mutated after capture; a refresh always builds a new one.
/// `online` does not come from the region itself but from the status probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub heartbeat: TimeVal,
    pub shm_timestamp: TimeVal,
    pub measure_start: TimeVal,
    pub num_devices: u8,
    pub diskspace_mb: u32,
    pub diskspace_percent: u8,
    pub battery_mv: i16,
    pub usb_mv: i16,
    pub battery_percent: u8,
    pub online: bool,
    pub devices: Vec<DeviceRecord>,
}

impl Snapshot {
    /// Merge the externally probed online flag into a freshly decoded snapshot.
    pub fn with_online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    /// Whether the databox itself reports USB power above [`USB_PRESENT_MV`].
    pub fn usb_present(&self) -> bool {
        self.usb_mv > USB_PRESENT_MV
    }

    /// Number of devices currently running a measurement.
    pub fn active_measurements(&self) -> usize {
        self.devices.iter().filter(|d| d.measurement_active).count()
    }
}
