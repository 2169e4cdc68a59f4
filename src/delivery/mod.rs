//! Delivery of fragmented transfers over the notification channel
//!
//! [`DeliveryQueue`] holds the packets of the current transfer,
//! [`NotificationScheduler`] paces them out one per tick through a
//! [`NotificationTransport`].

pub mod queue;
pub mod scheduler;
pub mod transport;

pub use queue::DeliveryQueue;
pub use scheduler::{DeliveryStats, NotificationScheduler, SchedulerPhase, TickOutcome};
pub use transport::{ChannelTransport, NotificationTransport};
