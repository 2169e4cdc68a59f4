//! Paced emission of the queued transfer
//!
//! The scheduler owns the [`DeliveryQueue`] and a tick task that sends one
//! packet per interval. Queue and phase sit behind one lock; the lock is never
//! held across a transport send, and going idle happens under the same lock
//! that observed the empty queue, so a refresh racing the last tick either
//! refills the queue in time or sees `Idle` and arms a fresh task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::queue::DeliveryQueue;
use super::transport::NotificationTransport;
use crate::types::{DataId, Packet};

/// Whether a tick task is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerPhase {
    #[default]
    Idle,
    Active,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The packet at `index` went out.
    Sent { data_id: DataId, index: usize, phase: SchedulerPhase },
    /// The transport refused the packet at `index`; it is not retried.
    Failed { data_id: DataId, index: usize, phase: SchedulerPhase },
    /// Nothing was pending.
    Empty,
}

impl TickOutcome {
    /// Phase after the tick completed.
    pub fn phase(&self) -> SchedulerPhase {
        match self {
            Self::Sent { phase, .. } | Self::Failed { phase, .. } => *phase,
            Self::Empty => SchedulerPhase::Idle,
        }
    }
}

/// Counters since the scheduler was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub sent: u64,
    pub failed: u64,
    /// Pending packets dropped because a newer transfer replaced them.
    pub superseded: u64,
}

#[derive(Debug, Default)]
struct State {
    queue: DeliveryQueue,
    phase: SchedulerPhase,
}

struct Inner {
    state: Mutex<State>,
    transport: Arc<dyn NotificationTransport>,
    interval: Duration,
    runtime: Handle,
    shutdown: CancellationToken,
    sent: AtomicU64,
    failed: AtomicU64,
    superseded: AtomicU64,
}

/// Sends the current transfer one packet per tick.
///
/// Cheap to clone; clones share the same queue and tick task. Tick tasks are
/// spawned on the runtime handed to [`new`](Self::new), so transfers can be
/// started from threads outside that runtime.
#[derive(Clone)]
pub struct NotificationScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for NotificationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationScheduler")
            .field("interval", &self.inner.interval)
            .field("phase", &self.phase())
            .field("pending", &self.pending())
            .finish()
    }
}

impl NotificationScheduler {
    pub fn new(
        transport: Arc<dyn NotificationTransport>,
        interval: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                transport,
                interval,
                runtime,
                shutdown: CancellationToken::new(),
                sent: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                superseded: AtomicU64::new(0),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Runtime that tick tasks, and work handed off by other components, run on.
    pub fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.lock().phase
    }

    pub fn pending(&self) -> usize {
        self.lock().queue.pending_len()
    }

    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            sent: self.inner.sent.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            superseded: self.inner.superseded.load(Ordering::Relaxed),
        }
    }

    /// Replace the queued transfer without starting a tick task.
    ///
    /// Returns `true` when the scheduler went from `Idle` to `Active`, in which
    /// case the caller is responsible for driving [`tick`](Self::tick).
    pub fn enqueue(&self, packets: Vec<Packet>) -> bool {
        let data_id = packets.first().map(Packet::data_id);
        let count = packets.len();
        let mut state = self.lock();
        let discarded = state.queue.replace(packets);
        if discarded > 0 {
            self.inner.superseded.fetch_add(discarded as u64, Ordering::Relaxed);
            debug!(discarded, "New transfer replaced unsent packets");
        }
        trace!(?data_id, count, "Transfer queued");

        if state.phase == SchedulerPhase::Idle && !state.queue.is_empty() {
            state.phase = SchedulerPhase::Active;
            true
        } else {
            false
        }
    }

    /// Replace the queued transfer and arm the tick task if it is not running.
    ///
    /// After [`disarm`](Self::disarm) the packets are dropped and nothing is
    /// queued or armed.
    pub fn start_transfer(&self, packets: Vec<Packet>) {
        if self.inner.shutdown.is_cancelled() {
            debug!("Scheduler shut down, transfer not armed");
            return;
        }
        if self.enqueue(packets) {
            self.arm();
        }
    }

    fn arm(&self) {
        let scheduler = self.clone();
        let cancel = self.inner.shutdown.child_token();
        debug!(interval_ms = self.inner.interval.as_millis() as u64, "Arming notification ticks");
        self.inner.runtime.spawn(async move {
            scheduler.tick_task(cancel).await;
        });
    }

    async fn tick_task(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.inner.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Notification ticks cancelled");
                    break;
                }
                _ = interval.tick() => {}
            }

            if self.tick().await.phase() == SchedulerPhase::Idle {
                debug!("Transfer drained, ticks disarmed");
                break;
            }
        }
    }

    /// Send the next pending packet, if any.
    ///
    /// The tick task calls this once per interval; it is public so the pacing
    /// can be driven by hand.
    pub async fn tick(&self) -> TickOutcome {
        let (packet, index) = {
            let mut state = self.lock();
            match state.queue.pop_next() {
                Some(next) => next,
                None => {
                    state.phase = SchedulerPhase::Idle;
                    return TickOutcome::Empty;
                }
            }
        };

        let data_id = packet.data_id();
        let result = self.inner.transport.send(packet.frame_arc()).await;

        let phase = {
            let mut state = self.lock();
            if state.queue.is_empty() {
                state.phase = SchedulerPhase::Idle;
            }
            state.phase
        };

        match result {
            Ok(()) => {
                self.inner.sent.fetch_add(1, Ordering::Relaxed);
                trace!(%data_id, index, "Packet sent");
                TickOutcome::Sent { data_id, index, phase }
            }
            Err(e) => {
                self.inner.failed.fetch_add(1, Ordering::Relaxed);
                warn!(%data_id, index, "Packet dropped, transport refused it: {}", e);
                TickOutcome::Failed { data_id, index, phase }
            }
        }
    }

    /// Stop ticking for good and drop whatever is queued.
    pub fn disarm(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.shutdown.cancel();
        let mut state = self.lock();
        state.queue.clear();
        state.phase = SchedulerPhase::Idle;
        info!("Notification scheduler shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PacketFragmenter;
    use crate::test_utils::RecordingTransport;
    use crate::types::Packet;

    fn transfer(raw_id: u8, len: usize) -> Vec<Packet> {
        let id = DataId::new(raw_id).expect("valid id");
        PacketFragmenter::default().fragment(&vec![raw_id; len], id).expect("fits")
    }

    fn scheduler(transport: &Arc<RecordingTransport>, interval_ms: u64) -> NotificationScheduler {
        NotificationScheduler::new(
            transport.clone(),
            Duration::from_millis(interval_ms),
            Handle::current(),
        )
    }

    #[tokio::test]
    async fn manual_ticks_send_in_order_then_go_idle() {
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = scheduler(&transport, 1000);

        assert!(scheduler.enqueue(transfer(1, 250)));
        assert_eq!(scheduler.phase(), SchedulerPhase::Active);

        let mut indices = Vec::new();
        loop {
            match scheduler.tick().await {
                TickOutcome::Sent { index, phase, .. } => {
                    indices.push(index);
                    if phase == SchedulerPhase::Idle {
                        break;
                    }
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
        assert_eq!(scheduler.tick().await, TickOutcome::Empty);

        let frames = transport.frames();
        assert_eq!(frames.len(), 4);
        assert!(Packet::parse(&frames[0]).expect("valid frame").is_meta());
    }

    #[tokio::test]
    async fn replacement_mid_transfer_discards_old_packets() {
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = scheduler(&transport, 1000);

        scheduler.enqueue(transfer(1, 500));
        scheduler.tick().await;
        scheduler.tick().await;

        // Already active, so no second task would be armed.
        assert!(!scheduler.enqueue(transfer(2, 150)));
        while scheduler.tick().await.phase() == SchedulerPhase::Active {}

        let ids: Vec<u8> = transport
            .frames()
            .iter()
            .map(|f| Packet::parse(f).expect("valid frame").data_id().get())
            .collect();
        assert_eq!(ids, vec![1, 1, 2, 2, 2]);
        assert_eq!(scheduler.stats(), DeliveryStats { sent: 5, failed: 0, superseded: 4 });
    }

    #[tokio::test]
    async fn transport_failure_loses_packet_and_continues() {
        let transport = Arc::new(RecordingTransport::default());
        transport.fail_next(1);
        let scheduler = scheduler(&transport, 1000);

        scheduler.enqueue(transfer(3, 150));
        assert!(matches!(scheduler.tick().await, TickOutcome::Failed { index: 0, .. }));
        assert!(matches!(scheduler.tick().await, TickOutcome::Sent { index: 1, .. }));
        assert!(matches!(
            scheduler.tick().await,
            TickOutcome::Sent { index: 2, phase: SchedulerPhase::Idle, .. }
        ));
        assert_eq!(transport.frames().len(), 2);
        assert_eq!(scheduler.stats().failed, 1);
    }

    #[tokio::test]
    async fn armed_task_drains_queue_and_disarms() {
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = scheduler(&transport, 2);

        scheduler.start_transfer(transfer(4, 250));
        tokio::time::timeout(Duration::from_secs(5), async {
            while scheduler.phase() == SchedulerPhase::Active {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("transfer drains");

        assert_eq!(transport.frames().len(), 4);
        assert_eq!(scheduler.pending(), 0);

        // A second transfer re-arms from idle.
        scheduler.start_transfer(transfer(5, 10));
        tokio::time::timeout(Duration::from_secs(5), async {
            while transport.frames().len() < 6 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("second transfer drains");
    }

    #[tokio::test]
    async fn disarm_stops_ticks_and_refuses_new_transfers() {
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = scheduler(&transport, 10_000);

        scheduler.start_transfer(transfer(6, 1000));
        scheduler.disarm();
        assert!(scheduler.is_shut_down());
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
        assert_eq!(scheduler.pending(), 0);

        scheduler.start_transfer(transfer(7, 10));
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
        assert_eq!(scheduler.pending(), 0);
    }

    /// Transport whose sends wait for a permit, so a send can be held in flight.
    struct GatedTransport {
        gate: tokio::sync::Semaphore,
        started: std::sync::atomic::AtomicUsize,
        emitted: Mutex<Vec<(u8, u16, u8)>>,
    }

    impl GatedTransport {
        fn new() -> Self {
            Self {
                gate: tokio::sync::Semaphore::new(0),
                started: std::sync::atomic::AtomicUsize::new(0),
                emitted: Mutex::new(Vec::new()),
            }
        }

        fn emitted(&self) -> Vec<(u8, u16, u8)> {
            self.emitted.lock().expect("not poisoned").clone()
        }
    }

    #[async_trait::async_trait]
    impl NotificationTransport for GatedTransport {
        async fn send(&self, frame: Arc<[u8]>) -> crate::Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.gate.acquire().await.expect("gate open").forget();
            let packet = Packet::parse(&frame)?;
            let (section, id) = packet.coordinates();
            self.emitted.lock().expect("not poisoned").push((packet.data_id().get(), section, id));
            Ok(())
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("condition reached in time");
    }

    #[tokio::test]
    async fn transfer_started_during_final_send_follows_without_stranding() {
        let transport = Arc::new(GatedTransport::new());
        let scheduler =
            NotificationScheduler::new(transport.clone(), Duration::from_millis(1), Handle::current());

        // 250 bytes: meta plus three bodies.
        scheduler.start_transfer(transfer(1, 250));
        transport.gate.add_permits(3);
        wait_until(|| transport.started.load(Ordering::SeqCst) == 4).await;

        // Last packet of the first transfer is in flight and the queue is empty.
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.phase(), SchedulerPhase::Active);

        scheduler.start_transfer(transfer(2, 350));
        transport.gate.add_permits(64);
        wait_until(|| transport.emitted().len() == 9 && scheduler.phase() == SchedulerPhase::Idle)
            .await;

        assert_eq!(
            transport.emitted(),
            vec![
                (1, 0, 0),
                (1, 0, 1),
                (1, 0, 2),
                (1, 0, 3),
                (2, 0, 0),
                (2, 0, 1),
                (2, 0, 2),
                (2, 0, 3),
                (2, 0, 4),
            ]
        );
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.stats(), DeliveryStats { sent: 9, failed: 0, superseded: 0 });
    }

    #[tokio::test]
    async fn repeated_supersedes_never_interleave_transfers() {
        let transport = Arc::new(GatedTransport::new());
        transport.gate.add_permits(10_000);
        let scheduler =
            NotificationScheduler::new(transport.clone(), Duration::from_millis(1), Handle::current());

        for round in 1..=20u8 {
            scheduler.start_transfer(transfer(round, 300));
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        wait_until(|| scheduler.phase() == SchedulerPhase::Idle).await;

        let emitted = transport.emitted();
        // Once a transfer is seen, no earlier transfer may follow it.
        assert!(emitted.windows(2).all(|w| w[0].0 <= w[1].0));
        // Within one transfer, coordinates strictly increase.
        assert!(emitted.windows(2).filter(|w| w[0].0 == w[1].0).all(|w| w[0] < w[1]));
        // The final transfer is delivered whole.
        let last: Vec<_> = emitted.iter().filter(|e| e.0 == 20).copied().collect();
        assert_eq!(last, vec![(20, 0, 0), (20, 0, 1), (20, 0, 2), (20, 0, 3)]);
    }
}
