//! Snapshot wire encoding
//!
//! The blob is a fixed binary layout, little-endian, mirroring the region
//! layout with two additions: a u16 length prefix that counts itself, and the
//! databox serial number ahead of the snapshot fields. The `online` flag sits
//! directly after `num_devices`.
//!
//! ```text
//! u16 total_len | u32 databox_serial
//! i64 x 6 timers | u8 num_devices | u8 online | u32 diskspace_mb | u8 diskspace_percent
//! i16 battery_mv | i16 usb_mv | u8 battery_percent
//! device x num_devices: same 27-byte block as the region
//! ```

use std::sync::Arc;

use super::layout::{DEVICE_SIZE, LeReader};
use crate::types::{AccelExtrema, AxisRange, DeviceRecord, Snapshot, TimeVal};
use crate::{LinkError, Result};

/// Size of the blob preamble before the first device entry.
pub const BLOB_HEADER_SIZE: usize = 2 + 4 + 6 * 8 + 1 + 1 + 4 + 1 + 2 + 2 + 1;

/// Serialized snapshot, ready for fragmentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireBlob(Arc<[u8]>);

impl WireBlob {
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// CRC32 of the whole blob, as carried by the meta packet.
    pub fn crc32(&self) -> u32 {
        crc32fast::hash(&self.0)
    }
}

impl AsRef<[u8]> for WireBlob {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Decoded blob contents, used by receivers and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobContents {
    pub databox_serial: u32,
    pub snapshot: Snapshot,
}

/// Encodes snapshots for one databox.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotSerializer {
    databox_serial: u32,
}

impl SnapshotSerializer {
    pub fn new(databox_serial: u32) -> Self {
        Self { databox_serial }
    }

    pub fn databox_serial(&self) -> u32 {
        self.databox_serial
    }

    /// Encode `snapshot`. Deterministic; exactly `num_devices` entries are written
    /// in `devices` order.
    pub fn serialize(&self, snapshot: &Snapshot) -> Result<WireBlob> {
        if snapshot.devices.len() != snapshot.num_devices as usize {
            return Err(LinkError::parse(
                "Snapshot serialization",
                format!(
                    "num_devices is {} but {} device records are present",
                    snapshot.num_devices,
                    snapshot.devices.len()
                ),
            ));
        }

        let total = BLOB_HEADER_SIZE + snapshot.devices.len() * DEVICE_SIZE;
        let mut body = Vec::with_capacity(total);
        body.extend_from_slice(&(total as u16).to_le_bytes());
        body.extend_from_slice(&self.databox_serial.to_le_bytes());

        for timer in [snapshot.heartbeat, snapshot.shm_timestamp, snapshot.measure_start] {
            body.extend_from_slice(&timer.sec.to_le_bytes());
            body.extend_from_slice(&timer.usec.to_le_bytes());
        }
        body.push(snapshot.num_devices);
        body.push(snapshot.online as u8);
        body.extend_from_slice(&snapshot.diskspace_mb.to_le_bytes());
        body.push(snapshot.diskspace_percent);
        body.extend_from_slice(&snapshot.battery_mv.to_le_bytes());
        body.extend_from_slice(&snapshot.usb_mv.to_le_bytes());
        body.push(snapshot.battery_percent);

        for device in &snapshot.devices {
            encode_device(&mut body, device);
        }

        debug_assert_eq!(body.len(), total);
        Ok(WireBlob::from_bytes(body))
    }
}

fn encode_device(body: &mut Vec<u8>, device: &DeviceRecord) {
    body.extend_from_slice(&device.serial.to_le_bytes());
    body.push(device.online as u8);
    body.push(device.measurement_active as u8);
    for axis in [device.accel.x, device.accel.y, device.accel.z] {
        body.extend_from_slice(&axis.min.to_le_bytes());
        body.extend_from_slice(&axis.max.to_le_bytes());
    }
    body.extend_from_slice(&device.missing_packets.to_le_bytes());
    body.extend_from_slice(&device.battery_mv.to_le_bytes());
    body.extend_from_slice(&device.usb_mv.to_le_bytes());
    body.push(device.rssi as u8);
}

/// Decode a blob produced by [`SnapshotSerializer::serialize`].
pub fn decode_blob(bytes: &[u8]) -> Result<BlobContents> {
    let mut reader = LeReader::new(bytes);

    let declared = reader.u16()? as usize;
    if declared != bytes.len() {
        return Err(LinkError::integrity("blob length", declared as u32, bytes.len() as u32));
    }

    let databox_serial = reader.u32()?;
    let heartbeat = TimeVal::new(reader.i64()?, reader.i64()?);
    let shm_timestamp = TimeVal::new(reader.i64()?, reader.i64()?);
    let measure_start = TimeVal::new(reader.i64()?, reader.i64()?);
    let num_devices = reader.u8()?;
    let online = reader.bool()?;
    let diskspace_mb = reader.u32()?;
    let diskspace_percent = reader.u8()?;
    let battery_mv = reader.i16()?;
    let usb_mv = reader.i16()?;
    let battery_percent = reader.u8()?;

    let mut devices = Vec::with_capacity(num_devices as usize);
    for _ in 0..num_devices {
        let serial = reader.u32()?;
        let online = reader.bool()?;
        let measurement_active = reader.bool()?;
        let x = AxisRange { min: reader.i16()?, max: reader.i16()? };
        let y = AxisRange { min: reader.i16()?, max: reader.i16()? };
        let z = AxisRange { min: reader.i16()?, max: reader.i16()? };
        devices.push(DeviceRecord {
            serial,
            online,
            measurement_active,
            accel: AccelExtrema { x, y, z },
            missing_packets: reader.u32()?,
            battery_mv: reader.i16()?,
            usb_mv: reader.i16()?,
            rssi: reader.i8()?,
        });
    }

    if reader.offset() != bytes.len() {
        return Err(LinkError::parse(
            "Blob decoding",
            format!("{} trailing bytes after last device", bytes.len() - reader.offset()),
        ));
    }

    Ok(BlobContents {
        databox_serial,
        snapshot: Snapshot {
            heartbeat,
            shm_timestamp,
            measure_start,
            num_devices,
            diskspace_mb,
            diskspace_percent,
            battery_mv,
            usb_mv,
            battery_percent,
            online,
            devices,
        },
    })
}
