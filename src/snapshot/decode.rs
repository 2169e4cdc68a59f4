//! Shared-memory region decoding

use tracing::{debug, trace};

use super::layout::{self, DEVICE_SIZE, HEADER_SIZE, LeReader, NUM_DEVICES_OFFSET};
use crate::types::{AccelExtrema, AxisRange, DeviceRecord, Snapshot, TimeVal};
use crate::{LinkError, Result};

/// Turns a raw shared-memory region into a [`Snapshot`].
///
/// Decoding is pure: the same bytes always give the same snapshot and nothing
/// outside the slice is touched. The `online` flag is left `false`; the caller
/// merges the status probe result with [`Snapshot::with_online`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotDecoder;

impl SnapshotDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode header and devices.
    ///
    /// Fails with [`LinkError::TruncatedBuffer`] when `raw` is shorter than the
    /// header plus the declared number of device blocks.
    pub fn decode(&self, raw: &[u8]) -> Result<Snapshot> {
        trace!(region_len = raw.len(), "Decoding shared memory region");

        if raw.len() < HEADER_SIZE {
            let num_devices = raw.get(NUM_DEVICES_OFFSET).copied().unwrap_or(0);
            return Err(LinkError::truncated(HEADER_SIZE, raw.len(), num_devices));
        }

        let num_devices = raw[NUM_DEVICES_OFFSET];
        let required = layout::required_len(num_devices);
        if raw.len() < required {
            return Err(LinkError::truncated(required, raw.len(), num_devices));
        }

        let mut reader = LeReader::new(raw);
        let heartbeat = TimeVal::new(reader.i64()?, reader.i64()?);
        let shm_timestamp = TimeVal::new(reader.i64()?, reader.i64()?);
        let measure_start = TimeVal::new(reader.i64()?, reader.i64()?);
        let declared_devices = reader.u8()?;
        debug_assert_eq!(declared_devices, num_devices);
        let diskspace_mb = reader.u32()?;
        let diskspace_percent = reader.u8()?;
        let battery_mv = reader.i16()?;
        let usb_mv = reader.i16()?;
        let battery_percent = reader.u8()?;

        let devices = (0..num_devices as usize)
            .map(|index| decode_device(raw, HEADER_SIZE + index * DEVICE_SIZE))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            num_devices,
            diskspace_percent,
            battery_percent,
            heartbeat_sec = heartbeat.sec,
            "Decoded shared memory snapshot"
        );

        Ok(Snapshot {
            heartbeat,
            shm_timestamp,
            measure_start,
            num_devices,
            diskspace_mb,
            diskspace_percent,
            battery_mv,
            usb_mv,
            battery_percent,
            online: false,
            devices,
        })
    }
}

fn decode_device(raw: &[u8], offset: usize) -> Result<DeviceRecord> {
    let mut reader = LeReader::at(raw, offset);

    let serial = reader.u32()?;
    let online = reader.bool()?;
    let measurement_active = reader.bool()?;
    let x = AxisRange { min: reader.i16()?, max: reader.i16()? };
    let y = AxisRange { min: reader.i16()?, max: reader.i16()? };
    let z = AxisRange { min: reader.i16()?, max: reader.i16()? };
    let missing_packets = reader.u32()?;
    let battery_mv = reader.i16()?;
    let usb_mv = reader.i16()?;
    let rssi = reader.i8()?;

    Ok(DeviceRecord {
        serial,
        online,
        measurement_active,
        accel: AccelExtrema { x, y, z },
        missing_packets,
        battery_mv,
        usb_mv,
        rssi,
    })
}
