//! Notification transport seam

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::{LinkError, Result};

/// Push channel towards the remote peer (a BLE notify characteristic).
///
/// One call carries exactly one frame. Delivery is fire-and-forget: an `Ok`
/// only means the frame was handed to the stack.
#[async_trait::async_trait]
pub trait NotificationTransport: Send + Sync + 'static {
    async fn send(&self, frame: Arc<[u8]>) -> Result<()>;
}

/// Transport that forwards frames into a channel.
///
/// The GATT layer owns the receiving end and turns every frame into a
/// notification; once it drops the receiver, sends fail with
/// [`LinkError::TransportUnavailable`].
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Arc<[u8]>>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Arc<[u8]>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl NotificationTransport for ChannelTransport {
    async fn send(&self, frame: Arc<[u8]>) -> Result<()> {
        trace!(len = frame.len(), "Forwarding frame to notification channel");
        self.tx
            .send(frame)
            .map_err(|e| {
                LinkError::transport_unavailable_with_source(
                    "notification receiver dropped",
                    Box::new(e),
                )
            })
    }
}
