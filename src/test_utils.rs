//! Test helpers shared by unit tests, integration tests and benches
//!
//! - [`ShmFixture`] builds synthetic shared-memory regions
//! - [`RecordingTransport`] captures emitted frames and can simulate failures

#![cfg(any(test, feature = "benchmark"))]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::delivery::NotificationTransport;
use crate::snapshot::layout::{DEFAULT_REGION_SIZE, encode_region};
use crate::types::{AccelExtrema, AxisRange, DeviceRecord, Snapshot, TimeVal};
use crate::{LinkError, Result};

/// Builder for raw shared-memory regions in the producer's layout.
#[derive(Debug, Clone)]
pub struct ShmFixture {
    bytes: Vec<u8>,
}

impl ShmFixture {
    /// Deterministic snapshot with `num_devices` devices and `online == false`.
    pub fn sample_snapshot(num_devices: u8) -> Snapshot {
        let devices = (0..num_devices)
            .map(|i| {
                let i16v = i as i16;
                DeviceRecord {
                    serial: 1000 + i as u32,
                    online: i % 2 == 0,
                    measurement_active: i % 3 == 0,
                    accel: AccelExtrema {
                        x: AxisRange { min: -100 - i16v, max: 100 + i16v },
                        y: AxisRange { min: -200 - i16v, max: 200 + i16v },
                        z: AxisRange { min: -300 - i16v, max: 300 + i16v },
                    },
                    missing_packets: 7 * i as u32,
                    battery_mv: 3700 + i16v,
                    usb_mv: if i % 2 == 0 { 5000 } else { 0 },
                    rssi: -40 - i as i8 % 50,
                }
            })
            .collect();

        Snapshot {
            heartbeat: TimeVal::new(1_700_000_000, 250_000),
            shm_timestamp: TimeVal::new(1_700_000_001, 500_000),
            measure_start: TimeVal::new(1_699_999_000, 0),
            num_devices,
            diskspace_mb: 12_345,
            diskspace_percent: 42,
            battery_mv: 3850,
            usb_mv: 4800,
            battery_percent: 87,
            online: false,
            devices,
        }
    }

    /// Encode `snapshot` in the producer's region layout.
    ///
    /// `online` is not part of the region and is dropped.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self { bytes: encode_region(snapshot, 0) }
    }

    /// Encoded bytes without padding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Region zero-padded to the reference size (or longer, if the devices need it).
    pub fn into_region(mut self) -> Vec<u8> {
        let len = self.bytes.len().max(DEFAULT_REGION_SIZE);
        self.bytes.resize(len, 0);
        self.bytes
    }
}

/// Transport that records every frame it accepts.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    frames: Mutex<Vec<Arc<[u8]>>>,
    failures: AtomicUsize,
}

impl RecordingTransport {
    /// Refuse the next `count` sends.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn frames(&self) -> Vec<Arc<[u8]>> {
        self.frames.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl NotificationTransport for RecordingTransport {
    async fn send(&self, frame: Arc<[u8]>) -> Result<()> {
        let refused = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(LinkError::transport_unavailable("simulated notification failure"));
        }
        self.frames.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(frame);
        Ok(())
    }
}
