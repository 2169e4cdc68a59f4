//! Inbound write commands
//!
//! Write payloads are parsed into a [`Command`] and executed on a background
//! task so the writer (and the notification tick) never waits on I/O.
//!
//! | Payload            | Command                      |
//! |--------------------|------------------------------|
//! | `FF FF FF FF`      | refresh and send             |
//! | `FF FF FF 01`      | start measurement            |
//! | `FF FF FF 00`      | stop measurement             |
//! | any 8 bytes        | proposed UNIX time, LE u64   |

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::refresh::{Published, Refresher};
use crate::{LinkError, Result};

pub const REFRESH_TRIGGER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
pub const MEASURE_START_TRIGGER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0x01];
pub const MEASURE_STOP_TRIGGER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0x00];

/// Upper bound for one round trip to the measurement service.
const MEASURE_TIMEOUT: Duration = Duration::from_secs(5);
const MEASURE_RESPONSE_LIMIT: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    RefreshAndSend,
    MeasureStart,
    MeasureStop,
    /// Proposed wall-clock time in seconds since the UNIX epoch.
    SetTime { unix_secs: u64 },
}

impl Command {
    /// Parse a write payload. Unknown payloads give `None`.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match payload {
            p if p == REFRESH_TRIGGER => Some(Self::RefreshAndSend),
            p if p == MEASURE_START_TRIGGER => Some(Self::MeasureStart),
            p if p == MEASURE_STOP_TRIGGER => Some(Self::MeasureStop),
            p => {
                let raw: [u8; 8] = p.try_into().ok()?;
                Some(Self::SetTime { unix_secs: u64::from_le_bytes(raw) })
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RefreshAndSend => "refresh",
            Self::MeasureStart => "measure_start",
            Self::MeasureStop => "measure_stop",
            Self::SetTime { .. } => "time_sync",
        }
    }
}

/// What an executed command did.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Refreshed(Arc<Published>),
    /// Text returned by the measurement service.
    Measurement(String),
    TimeSync(TimeSyncDecision),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureAction {
    Start,
    Stop,
}

impl MeasureAction {
    fn request(self) -> &'static [u8] {
        match self {
            Self::Start => b"measure_start\n",
            Self::Stop => b"measure_stop\n",
        }
    }
}

/// Line-oriented client for the measurement service control socket.
#[derive(Debug, Clone, Copy)]
pub struct MeasurementClient {
    addr: SocketAddr,
}

impl MeasurementClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Send one request and return the service's reply.
    pub async fn send(&self, action: MeasureAction) -> Result<String> {
        let command = match action {
            MeasureAction::Start => "measure_start",
            MeasureAction::Stop => "measure_stop",
        };
        let exchange = async {
            let mut stream = TcpStream::connect(self.addr).await?;
            stream.write_all(action.request()).await?;
            let mut buf = vec![0u8; MEASURE_RESPONSE_LIMIT];
            let n = stream.read(&mut buf).await?;
            buf.truncate(n);
            Ok::<_, std::io::Error>(buf)
        };

        let reply = tokio::time::timeout(MEASURE_TIMEOUT, exchange)
            .await
            .map_err(|_| {
                LinkError::command_failed(
                    command,
                    format!("no reply from {} within {:?}", self.addr, MEASURE_TIMEOUT),
                )
            })?
            .map_err(|e| {
                LinkError::command_failed_with_source(
                    command,
                    format!("exchange with {} failed", self.addr),
                    Box::new(e),
                )
            })?;

        let text = String::from_utf8_lossy(&reply).into_owned();
        debug!(command, addr = %self.addr, reply = %text.trim_end(), "Measurement service replied");
        Ok(text)
    }
}

/// Wall clock access.
pub trait Clock: Send + Sync + 'static {
    fn now_unix(&self) -> Result<i64>;
    fn set_unix(&self, unix_secs: i64) -> Result<()>;
}

/// The host's real-time clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> Result<i64> {
        let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).map_err(|e| {
            LinkError::command_failed("time_read", format!("clock before epoch: {}", e))
        })?;
        Ok(elapsed.as_secs() as i64)
    }

    #[cfg(unix)]
    fn set_unix(&self, unix_secs: i64) -> Result<()> {
        crate::unix::set_realtime(unix_secs)
    }

    #[cfg(not(unix))]
    fn set_unix(&self, _unix_secs: i64) -> Result<()> {
        Err(LinkError::unsupported_platform("Setting the system clock", "Unix"))
    }
}

/// Clock that only moves when set, for replaying captured sessions.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(unix_secs: i64) -> Self {
        Self { now: AtomicI64::new(unix_secs) }
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> Result<i64> {
        Ok(self.now.load(Ordering::SeqCst))
    }

    fn set_unix(&self, unix_secs: i64) -> Result<()> {
        self.now.store(unix_secs, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSyncDecision {
    Applied { previous: i64, proposed: i64 },
    WithinThreshold { delta_secs: u64 },
}

/// Apply `proposed` if it differs from the clock by more than `threshold`.
pub fn sync_time(
    clock: &dyn Clock,
    proposed: u64,
    threshold: Duration,
) -> Result<TimeSyncDecision> {
    let proposed = i64::try_from(proposed).map_err(|_| {
        LinkError::command_failed("time_sync", format!("proposed time {} out of range", proposed))
    })?;
    let now = clock.now_unix()?;
    let delta_secs = proposed.abs_diff(now);

    if delta_secs <= threshold.as_secs() {
        debug!(now, proposed, delta_secs, "Clock within threshold, not adjusted");
        return Ok(TimeSyncDecision::WithinThreshold { delta_secs });
    }

    clock.set_unix(proposed)?;
    info!(previous = now, proposed, delta_secs, "System clock adjusted");
    Ok(TimeSyncDecision::Applied { previous: now, proposed })
}

/// Current time as the 8-byte little-endian value served to time reads.
pub fn time_value(clock: &dyn Clock) -> Result<[u8; 8]> {
    let now = clock.now_unix()?;
    Ok((now.max(0) as u64).to_le_bytes())
}

/// Routes write payloads to their actions. Cheap to clone.
#[derive(Clone)]
pub struct CommandDispatcher {
    refresher: Refresher,
    measurement: MeasurementClient,
    clock: Arc<dyn Clock>,
    time_sync_threshold: Duration,
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("measurement", &self.measurement)
            .field("time_sync_threshold", &self.time_sync_threshold)
            .finish()
    }
}

impl CommandDispatcher {
    pub fn new(
        refresher: Refresher,
        measurement: MeasurementClient,
        clock: Arc<dyn Clock>,
        time_sync_threshold: Duration,
    ) -> Self {
        Self { refresher, measurement, clock, time_sync_threshold }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Parse `payload` and run it in the background.
    ///
    /// Returns immediately and may be called from any thread, including ones
    /// the runtime does not own. `None` means the payload was not a command.
    pub fn dispatch(&self, payload: &[u8]) -> Option<JoinHandle<()>> {
        let Some(command) = Command::parse(payload) else {
            warn!(len = payload.len(), "Ignoring unrecognised write payload");
            return None;
        };
        trace!(command = command.name(), "Dispatching command");

        let this = self.clone();
        Some(self.refresher.scheduler().runtime().spawn(async move {
            match this.execute(command).await {
                Ok(outcome) => trace!(command = command.name(), ?outcome, "Command completed"),
                Err(e) => warn!(command = command.name(), "Command failed: {}", e),
            }
        }))
    }

    /// Run `command` to completion.
    pub async fn execute(&self, command: Command) -> Result<CommandOutcome> {
        match command {
            Command::RefreshAndSend => {
                self.refresher.refresh().await.map(CommandOutcome::Refreshed)
            }
            Command::MeasureStart => {
                self.measurement.send(MeasureAction::Start).await.map(CommandOutcome::Measurement)
            }
            Command::MeasureStop => {
                self.measurement.send(MeasureAction::Stop).await.map(CommandOutcome::Measurement)
            }
            Command::SetTime { unix_secs } => {
                sync_time(self.clock.as_ref(), unix_secs, self.time_sync_threshold)
                    .map(CommandOutcome::TimeSync)
            }
        }
    }
}
