//! Refresh pipeline and published state
//!
//! A refresh reads the region, probes the online flag, decodes, serializes and
//! fragments on a blocking worker, then publishes the (snapshot, blob) pair and
//! hands the packets to the [`NotificationScheduler`]. The newest completed
//! refresh wins; there is no queue of pending requests.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::delivery::NotificationScheduler;
use crate::protocol::PacketFragmenter;
use crate::snapshot::{SnapshotDecoder, SnapshotSerializer, WireBlob};
use crate::source::{SnapshotSource, StatusProbe};
use crate::types::{DataId, DataIdCounter, Snapshot};
use crate::{LinkError, Result};

/// Value served to readers before the first refresh has completed.
pub const INITIAL_READ_VALUE: &[u8] = b"42";

/// Snapshot and blob captured together, before a data id is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub snapshot: Snapshot,
    pub blob: WireBlob,
}

/// State visible to readers after a refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub data_id: DataId,
    pub snapshot: Snapshot,
    pub blob: WireBlob,
    /// Meta packet included.
    pub packet_count: usize,
}

struct RefreshInner {
    source: Arc<dyn SnapshotSource>,
    probe: Arc<dyn StatusProbe>,
    decoder: SnapshotDecoder,
    serializer: SnapshotSerializer,
    fragmenter: PacketFragmenter,
    counter: Mutex<DataIdCounter>,
    published: watch::Sender<Option<Arc<Published>>>,
    scheduler: NotificationScheduler,
}

/// Runs refreshes and owns the published state. Cheap to clone.
#[derive(Clone)]
pub struct Refresher {
    inner: Arc<RefreshInner>,
}

impl Refresher {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        probe: Arc<dyn StatusProbe>,
        serializer: SnapshotSerializer,
        fragmenter: PacketFragmenter,
        scheduler: NotificationScheduler,
    ) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            inner: Arc::new(RefreshInner {
                source,
                probe,
                decoder: SnapshotDecoder::new(),
                serializer,
                fragmenter,
                counter: Mutex::new(DataIdCounter::new()),
                published,
                scheduler,
            }),
        }
    }

    pub fn scheduler(&self) -> &NotificationScheduler {
        &self.inner.scheduler
    }

    /// Receiver for published states; `None` until the first refresh completes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Published>>> {
        self.inner.published.subscribe()
    }

    pub fn latest(&self) -> Option<Arc<Published>> {
        self.inner.published.borrow().clone()
    }

    /// Bytes served to a synchronous read: the latest blob, or
    /// [`INITIAL_READ_VALUE`] before any refresh.
    pub fn read_value(&self) -> Vec<u8> {
        match self.inner.published.borrow().as_ref() {
            Some(published) => published.blob.as_bytes().to_vec(),
            None => INITIAL_READ_VALUE.to_vec(),
        }
    }

    /// Read, probe, decode and serialize without touching shared state.
    pub fn capture(&self) -> Result<Capture> {
        let inner = &self.inner;
        let region = inner.source.read_region()?;
        let online = inner.probe.is_online()?;
        let snapshot = inner.decoder.decode(&region)?.with_online(online);
        let blob = inner.serializer.serialize(&snapshot)?;
        Ok(Capture { snapshot, blob })
    }

    /// Assign a data id, fragment, publish and start delivery.
    ///
    /// Id assignment, publication and the queue replace happen under one lock,
    /// so published state and the queued transfer always belong together.
    pub fn publish(&self, capture: Capture) -> Result<Arc<Published>> {
        let inner = &self.inner;
        let mut counter = inner.counter.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let data_id = counter.next_id();
        let packets = inner.fragmenter.fragment(capture.blob.as_bytes(), data_id)?;
        let published = Arc::new(Published {
            data_id,
            snapshot: capture.snapshot,
            blob: capture.blob,
            packet_count: packets.len(),
        });

        inner.published.send_replace(Some(published.clone()));
        inner.scheduler.start_transfer(packets);
        drop(counter);

        info!(
            %data_id,
            blob_len = published.blob.len(),
            packets = published.packet_count,
            num_devices = published.snapshot.num_devices,
            online = published.snapshot.online,
            "Published snapshot"
        );
        Ok(published)
    }

    /// Run the whole refresh on a blocking worker.
    pub async fn refresh(&self) -> Result<Arc<Published>> {
        let this = self.clone();
        self.inner.scheduler.runtime().spawn_blocking(move || {
            let capture = this.capture()?;
            this.publish(capture)
        })
        .await
        .map_err(|e| LinkError::command_failed("refresh", format!("refresh worker failed: {}", e)))?
    }

    /// Fire-and-forget refresh. Failures are logged and leave the previous
    /// published state and transfer untouched.
    ///
    /// Safe to call from any thread; the work runs on the scheduler's runtime.
    pub fn spawn_refresh(&self) -> JoinHandle<()> {
        let this = self.clone();
        debug!(source = %self.inner.source.describe(), "Refresh requested");
        self.inner.scheduler.runtime().spawn(async move {
            if let Err(e) = this.refresh().await {
                warn!("Refresh failed, keeping previous state: {}", e);
                for suggestion in e.recovery_suggestions() {
                    debug!("  {}", suggestion);
                }
            }
        })
    }
}

impl std::fmt::Debug for Refresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refresher")
            .field("source", &self.inner.source.describe())
            .field("serializer", &self.inner.serializer)
            .field("fragmenter", &self.inner.fragmenter)
            .finish()
    }
}
