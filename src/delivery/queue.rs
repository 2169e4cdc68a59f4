//! Pending packet queue for the current transfer

use std::collections::VecDeque;
use std::sync::Arc;

use crate::types::{DataId, Packet};

/// Packets of the current transfer and the indices still to be sent.
///
/// Only one transfer is ever held. [`replace`](Self::replace) drops whatever
/// was left of the previous one; there is no merging. The queue itself is not
/// synchronised; the scheduler keeps it behind its single lock.
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    packets: Arc<[Packet]>,
    pending: VecDeque<usize>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard pending indices and load `0..packets.len()`.
    ///
    /// Returns how many indices of the previous transfer were discarded.
    pub fn replace(&mut self, packets: Vec<Packet>) -> usize {
        let discarded = self.pending.len();
        self.pending = (0..packets.len()).collect();
        self.packets = packets.into();
        discarded
    }

    /// Remove the earliest pending index and return its packet.
    pub fn pop_next(&mut self) -> Option<(Packet, usize)> {
        let index = self.pending.pop_front()?;
        self.packets.get(index).cloned().map(|packet| (packet, index))
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Transfer the queue currently holds, if any.
    pub fn data_id(&self) -> Option<DataId> {
        self.packets.first().map(Packet::data_id)
    }

    /// Drop everything, pending or not.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.packets = Arc::from(Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PacketFragmenter;

    fn transfer(raw_id: u8, len: usize) -> Vec<Packet> {
        let id = DataId::new(raw_id).expect("valid id");
        PacketFragmenter::default().fragment(&vec![raw_id; len], id).expect("fits")
    }

    #[test]
    fn pops_in_fifo_order_then_empties() {
        let mut queue = DeliveryQueue::new();
        assert!(queue.pop_next().is_none());

        queue.replace(transfer(1, 250));
        assert_eq!(queue.pending_len(), 4);

        let indices: Vec<usize> = std::iter::from_fn(|| queue.pop_next().map(|(_, i)| i)).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(queue.is_empty());
        assert!(queue.pop_next().is_none());
    }

    #[test]
    fn replace_discards_leftovers_of_previous_transfer() {
        let mut queue = DeliveryQueue::new();
        queue.replace(transfer(1, 500));
        queue.pop_next();
        queue.pop_next();

        let discarded = queue.replace(transfer(2, 150));
        assert_eq!(discarded, 4);
        assert_eq!(queue.data_id().map(DataId::get), Some(2));

        let mut seen = Vec::new();
        while let Some((packet, index)) = queue.pop_next() {
            assert_eq!(packet.data_id().get(), 2);
            seen.push(index);
        }
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn clear_empties_everything() {
        let mut queue = DeliveryQueue::new();
        queue.replace(transfer(3, 10));
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.data_id().is_none());
    }
}
