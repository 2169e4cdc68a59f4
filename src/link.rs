//! The assembled pipeline as seen by the GATT layer

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::command::{self, Clock, CommandDispatcher, MeasurementClient, SystemClock};
use crate::config::{self, LinkConfig};
use crate::delivery::{NotificationScheduler, NotificationTransport};
use crate::protocol::PacketFragmenter;
use crate::refresh::{Published, Refresher};
use crate::snapshot::SnapshotSerializer;
use crate::source::{SnapshotSource, StatusProbe};
use crate::sources::{FileStatusProbe, FixedStatusProbe, ShmSource};
use crate::{LinkError, Result};

/// Collaborators plugged into a [`DataboxLink`].
pub struct LinkParts {
    pub source: Arc<dyn SnapshotSource>,
    pub probe: Arc<dyn StatusProbe>,
    pub transport: Arc<dyn NotificationTransport>,
    pub clock: Arc<dyn Clock>,
}

/// Snapshot capture, fragmentation and delivery for one databox.
///
/// Write payloads go to [`dispatch`](Self::dispatch), reads are served by
/// [`read_value`](Self::read_value) and [`time_value`](Self::time_value).
/// Dropping the link stops the notification ticks.
pub struct DataboxLink {
    config: LinkConfig,
    serial: u32,
    advertised_name: String,
    refresher: Refresher,
    dispatcher: CommandDispatcher,
}

impl DataboxLink {
    /// Open the configured shared-memory region and serial file.
    ///
    /// Must be called within a Tokio runtime; see [`with_parts`](Self::with_parts).
    pub fn open(config: LinkConfig, transport: Arc<dyn NotificationTransport>) -> Result<Self> {
        config.validate()?;
        let serial = config::read_serial(&config.serial_path)?;
        let source = ShmSource::open(&config.shm_path, config.shm_size)?;
        let probe: Arc<dyn StatusProbe> = match &config.status_path {
            Some(path) => Arc::new(FileStatusProbe::new(path)),
            None => {
                debug!("No status path configured, reporting offline");
                Arc::new(FixedStatusProbe(false))
            }
        };

        let parts =
            LinkParts { source: Arc::new(source), probe, transport, clock: Arc::new(SystemClock) };
        Self::with_parts(config, serial, parts)
    }

    /// Build a link from explicit collaborators.
    ///
    /// Captures the current Tokio runtime. Later calls such as
    /// [`dispatch`](Self::dispatch) may come from any thread.
    pub fn with_parts(config: LinkConfig, serial: u32, parts: LinkParts) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            LinkError::config(format!("databox link must be created inside a Tokio runtime: {}", e))
        })?;
        let fragmenter = PacketFragmenter::new(config.max_payload)?;
        let scheduler =
            NotificationScheduler::new(parts.transport, config.notify_interval(), runtime);
        let refresher = Refresher::new(
            parts.source,
            parts.probe,
            SnapshotSerializer::new(serial),
            fragmenter,
            scheduler,
        );
        let dispatcher = CommandDispatcher::new(
            refresher.clone(),
            MeasurementClient::new(config.measure_socket()?),
            parts.clock,
            config.time_sync_threshold(),
        );
        let advertised_name = config::advertised_name(&config.advertised_name_prefix, serial);

        info!(
            name = %advertised_name,
            interval_ms = config.notify_interval_ms,
            max_payload = config.max_payload,
            "Databox link ready"
        );
        Ok(Self { config, serial, advertised_name, refresher, dispatcher })
    }

    /// Handle a write payload. Returns at once; `None` if it was ignored.
    pub fn dispatch(&self, payload: &[u8]) -> Option<JoinHandle<()>> {
        self.dispatcher.dispatch(payload)
    }

    /// Refresh and queue a transfer, waiting for the published result.
    pub async fn refresh(&self) -> Result<Arc<Published>> {
        self.refresher.refresh().await
    }

    /// Latest published blob, or the placeholder before the first refresh.
    pub fn read_value(&self) -> Vec<u8> {
        self.refresher.read_value()
    }

    /// Current wall clock as 8 little-endian bytes.
    pub fn time_value(&self) -> Result<[u8; 8]> {
        command::time_value(self.dispatcher.clock())
    }

    /// Published states, starting with the current one if any.
    pub fn snapshot_updates(&self) -> impl Stream<Item = Arc<Published>> + 'static {
        WatchStream::new(self.refresher.subscribe()).filter_map(|opt| async move { opt })
    }

    pub fn latest(&self) -> Option<Arc<Published>> {
        self.refresher.latest()
    }

    pub fn advertised_name(&self) -> &str {
        &self.advertised_name
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &NotificationScheduler {
        self.refresher.scheduler()
    }
}

impl std::fmt::Debug for DataboxLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataboxLink")
            .field("advertised_name", &self.advertised_name)
            .field("scheduler", self.scheduler())
            .finish()
    }
}

impl Drop for DataboxLink {
    fn drop(&mut self) {
        debug!("Dropping databox link");
        let scheduler = self.refresher.scheduler();
        if scheduler.pending() > 0 {
            warn!(pending = scheduler.pending(), "Dropping link with unsent packets");
        }
        scheduler.disarm();
    }
}
