//! Shared helpers for integration tests

#![allow(dead_code)]

use databox_link::types::{AccelExtrema, AxisRange, DeviceRecord, Snapshot, TimeVal};

/// Snapshot with `num_devices` simple devices.
pub fn snapshot(num_devices: u8) -> Snapshot {
    let devices = (0..num_devices)
        .map(|i| DeviceRecord {
            serial: 500 + i as u32,
            online: true,
            measurement_active: i == 0,
            accel: AccelExtrema {
                x: AxisRange { min: -1, max: 1 },
                y: AxisRange { min: -2, max: 2 },
                z: AxisRange { min: -3, max: 3 },
            },
            missing_packets: i as u32,
            battery_mv: 3900,
            usb_mv: 0,
            rssi: -60,
        })
        .collect();

    Snapshot {
        heartbeat: TimeVal::new(1_700_000_000, 1),
        shm_timestamp: TimeVal::new(1_700_000_000, 2),
        measure_start: TimeVal::new(0, 0),
        num_devices,
        diskspace_mb: 2048,
        diskspace_percent: 10,
        battery_mv: 4000,
        usb_mv: 5100,
        battery_percent: 90,
        online: false,
        devices,
    }
}
