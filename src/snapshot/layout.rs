//! Shared-memory region layout
//!
//! The producer writes a packed little-endian structure with no padding:
//!
//! ```text
//! header (59 bytes)
//!   i64 heartbeat_sec      offset 0
//!   i64 heartbeat_usec     offset 8
//!   i64 timestamp_sec      offset 16
//!   i64 timestamp_usec     offset 24
//!   i64 measure_start_sec  offset 32
//!   i64 measure_start_usec offset 40
//!   u8  num_devices        offset 48
//!   u32 diskspace_mb       offset 49
//!   u8  diskspace_percent  offset 53
//!   i16 battery_mv         offset 54
//!   i16 usb_mv             offset 56
//!   u8  battery_percent    offset 58
//!
//! device (27 bytes, repeated num_devices times)
//!   u32 serial             offset 0
//!   u8  online             offset 4
//!   u8  measurement        offset 5
//!   i16 x_min, x_max, y_min, y_max, z_min, z_max   offset 6..18
//!   u32 missing_packets    offset 18
//!   i16 battery_mv         offset 22
//!   i16 usb_mv             offset 24
//!   i8  rssi               offset 26
//! ```

use crate::types::Snapshot;
use crate::{LinkError, Result};

/// Size of the header block in bytes.
pub const HEADER_SIZE: usize = 6 * 8 + 1 + 4 + 1 + 2 + 2 + 1;

/// Size of one device block in bytes.
pub const DEVICE_SIZE: usize = 4 + 1 + 1 + 6 * 2 + 4 + 2 + 2 + 1;

/// Region size used by the reference producer.
pub const DEFAULT_REGION_SIZE: usize = 1024;

/// Offset of the device count within the header.
pub const NUM_DEVICES_OFFSET: usize = 48;

/// Number of bytes a region must hold to carry `num_devices` devices.
pub const fn required_len(num_devices: u8) -> usize {
    HEADER_SIZE + num_devices as usize * DEVICE_SIZE
}

/// Largest device count that fits in a region of `region_size` bytes.
pub const fn max_devices(region_size: usize) -> usize {
    if region_size < HEADER_SIZE { 0 } else { (region_size - HEADER_SIZE) / DEVICE_SIZE }
}

/// Write `snapshot` in the producer's layout, zero-padded to `region_size`.
///
/// The inverse of decoding, for replaying captured snapshots through a
/// [`MemorySource`](crate::sources::MemorySource) or simulating a producer.
/// `online` is not part of the region and is dropped. A `region_size` smaller
/// than the encoded length leaves the region unpadded.
pub fn encode_region(snapshot: &Snapshot, region_size: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(required_len(snapshot.num_devices).max(region_size));
    for timer in [snapshot.heartbeat, snapshot.shm_timestamp, snapshot.measure_start] {
        bytes.extend_from_slice(&timer.sec.to_le_bytes());
        bytes.extend_from_slice(&timer.usec.to_le_bytes());
    }
    bytes.push(snapshot.num_devices);
    bytes.extend_from_slice(&snapshot.diskspace_mb.to_le_bytes());
    bytes.push(snapshot.diskspace_percent);
    bytes.extend_from_slice(&snapshot.battery_mv.to_le_bytes());
    bytes.extend_from_slice(&snapshot.usb_mv.to_le_bytes());
    bytes.push(snapshot.battery_percent);

    for device in &snapshot.devices {
        bytes.extend_from_slice(&device.serial.to_le_bytes());
        bytes.push(device.online as u8);
        bytes.push(device.measurement_active as u8);
        for axis in [device.accel.x, device.accel.y, device.accel.z] {
            bytes.extend_from_slice(&axis.min.to_le_bytes());
            bytes.extend_from_slice(&axis.max.to_le_bytes());
        }
        bytes.extend_from_slice(&device.missing_packets.to_le_bytes());
        bytes.extend_from_slice(&device.battery_mv.to_le_bytes());
        bytes.extend_from_slice(&device.usb_mv.to_le_bytes());
        bytes.push(device.rssi as u8);
    }

    if bytes.len() < region_size {
        bytes.resize(region_size, 0);
    }
    bytes
}

/// Bounds-checked little-endian cursor over a byte slice.
pub(crate) struct LeReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> LeReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub(crate) fn at(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    fn take<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let end = self.offset.checked_add(N).filter(|&end| end <= self.data.len()).ok_or_else(|| {
            LinkError::parse(
                "Little-endian read",
                format!(
                    "Insufficient data for {} at offset {} (need {} bytes, have {})",
                    what,
                    self.offset,
                    N,
                    self.data.len().saturating_sub(self.offset)
                ),
            )
        })?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.offset..end]);
        self.offset = end;
        Ok(out)
    }

    pub(crate) fn i64(&mut self) -> Result<i64> {
        self.take::<8>("i64").map(i64::from_le_bytes)
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        self.take::<4>("u32").map(u32::from_le_bytes)
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        self.take::<2>("u16").map(u16::from_le_bytes)
    }

    pub(crate) fn i16(&mut self) -> Result<i16> {
        self.take::<2>("i16").map(i16::from_le_bytes)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        self.take::<1>("u8").map(|b| b[0])
    }

    pub(crate) fn i8(&mut self) -> Result<i8> {
        self.take::<1>("i8").map(|b| b[0] as i8)
    }

    /// Any non-zero byte is `true`.
    pub(crate) fn bool(&mut self) -> Result<bool> {
        self.u8().map(|b| b != 0)
    }
}
