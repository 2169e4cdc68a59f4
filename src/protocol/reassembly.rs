//! Receiver-side transfer reassembly
//!
//! The sender never retransmits, so a receiver can only detect loss: it compares
//! the coordinates it has seen against the meta packet's last coordinates and
//! the reassembled blob against the meta packet's CRC.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::types::{DataId, Packet, PacketKind};
use crate::{LinkError, Result};

/// Progress of a transfer being reassembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyStatus {
    /// No meta packet seen yet.
    AwaitingMeta,
    /// Meta seen, `received` of `expected` body packets present.
    Partial { received: usize, expected: usize },
    /// Every body packet up to the last coordinates is present.
    Complete,
}

/// Collects the packets of one transfer and rebuilds its blob.
#[derive(Debug, Default)]
pub struct TransferAssembler {
    data_id: Option<DataId>,
    last: Option<(u16, u8)>,
    blob_crc32: u32,
    bodies: BTreeMap<(u16, u8), Vec<u8>>,
}

impl TransferAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transfer currently being assembled.
    pub fn data_id(&self) -> Option<DataId> {
        self.data_id
    }

    /// Add one received packet.
    ///
    /// A packet from a different transfer discards everything collected so far
    /// and starts over, since the sender has moved on.
    pub fn push(&mut self, packet: &Packet) {
        if self.data_id != Some(packet.data_id()) {
            if self.data_id.is_some() {
                debug!(
                    old = ?self.data_id.map(DataId::get),
                    new = packet.data_id().get(),
                    "New transfer seen, dropping partial assembly"
                );
            }
            *self = Self { data_id: Some(packet.data_id()), ..Self::default() };
        }

        match packet.kind() {
            PacketKind::Meta { last_section_id, last_packet_id, blob_crc32 } => {
                self.last = Some((last_section_id, last_packet_id));
                self.blob_crc32 = blob_crc32;
            }
            PacketKind::Body => {
                trace!(section_id = packet.section_id(), packet_id = packet.packet_id(), "Body packet");
                self.bodies.insert(packet.coordinates(), packet.payload().to_vec());
            }
        }
    }

    /// Decode and add a raw frame.
    pub fn push_frame(&mut self, frame: &[u8]) -> Result<()> {
        let packet = Packet::parse(frame)?;
        self.push(&packet);
        Ok(())
    }

    pub fn status(&self) -> AssemblyStatus {
        match self.last {
            None => AssemblyStatus::AwaitingMeta,
            Some(last) => {
                let expected = body_count(last);
                let received = self.bodies.range(..=last).count();
                if received == expected {
                    AssemblyStatus::Complete
                } else {
                    AssemblyStatus::Partial { received, expected }
                }
            }
        }
    }

    /// Highest body coordinates received so far.
    pub fn highest_seen(&self) -> Option<(u16, u8)> {
        self.bodies.keys().next_back().copied()
    }

    /// Concatenate the body payloads in order and verify the blob checksum.
    pub fn assemble(&self) -> Result<Vec<u8>> {
        match self.status() {
            AssemblyStatus::Complete => {}
            AssemblyStatus::AwaitingMeta => {
                return Err(LinkError::protocol("transfer has no meta packet yet"));
            }
            AssemblyStatus::Partial { received, expected } => {
                return Err(LinkError::protocol(format!(
                    "transfer incomplete: {} of {} body packets",
                    received, expected
                )));
            }
        }

        let last = self.last.unwrap_or((0, 0));
        let blob: Vec<u8> =
            self.bodies.range(..=last).flat_map(|(_, payload)| payload.iter().copied()).collect();

        let actual = crc32fast::hash(&blob);
        if actual != self.blob_crc32 {
            return Err(LinkError::integrity("blob crc32", self.blob_crc32, actual));
        }
        Ok(blob)
    }
}

/// Body packets from `(0, 1)` through `last` inclusive.
fn body_count(last: (u16, u8)) -> usize {
    match last {
        (0, 0) => 0,
        (0, packet) => packet as usize,
        (section, packet) => 255 + (section as usize - 1) * 256 + packet as usize + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PacketFragmenter;

    fn id(raw: u8) -> DataId {
        DataId::new(raw).expect("valid id")
    }

    #[test]
    fn body_count_matches_numbering() {
        assert_eq!(body_count((0, 0)), 0);
        assert_eq!(body_count((0, 3)), 3);
        assert_eq!(body_count((0, 255)), 255);
        assert_eq!(body_count((1, 0)), 256);
        assert_eq!(body_count((1, 44)), 300);
        assert_eq!(body_count((2, 0)), 512);
    }

    #[test]
    fn out_of_order_delivery_reassembles() {
        let blob: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let packets = PacketFragmenter::new(7).expect("valid").fragment(&blob, id(8)).expect("fits");

        let mut assembler = TransferAssembler::new();
        for packet in packets.iter().rev() {
            assembler.push_frame(packet.frame()).expect("valid frame");
        }
        assert_eq!(assembler.status(), AssemblyStatus::Complete);
        assert_eq!(assembler.assemble().expect("complete"), blob);
    }

    #[test]
    fn missing_tail_is_detected() {
        let blob = vec![1u8; 250];
        let packets = PacketFragmenter::default().fragment(&blob, id(3)).expect("fits");

        let mut assembler = TransferAssembler::new();
        for packet in &packets[..3] {
            assembler.push(packet);
        }
        assert_eq!(assembler.status(), AssemblyStatus::Partial { received: 2, expected: 3 });
        assert_eq!(assembler.highest_seen(), Some((0, 2)));
        assert!(matches!(assembler.assemble(), Err(LinkError::Protocol { .. })));
    }

    #[test]
    fn new_transfer_resets_state() {
        let fragmenter = PacketFragmenter::default();
        let first = fragmenter.fragment(&[1u8; 150], id(1)).expect("fits");
        let second = fragmenter.fragment(&[2u8; 50], id(2)).expect("fits");

        let mut assembler = TransferAssembler::new();
        assembler.push(&first[0]);
        assembler.push(&first[1]);
        for packet in &second {
            assembler.push(packet);
        }
        assert_eq!(assembler.data_id(), Some(id(2)));
        assert_eq!(assembler.assemble().expect("complete"), vec![2u8; 50]);
    }

    #[test]
    fn empty_transfer_is_complete_with_meta_only() {
        let packets = PacketFragmenter::default().fragment(&[], id(5)).expect("fits");
        let mut assembler = TransferAssembler::new();
        assert_eq!(assembler.status(), AssemblyStatus::AwaitingMeta);
        assembler.push(&packets[0]);
        assert_eq!(assembler.assemble().expect("complete"), Vec::<u8>::new());
    }
}
