//! Framed notification packets
//!
//! Every frame is little-endian and self-describing:
//!
//! ```text
//! body: | len u16 | data_id u8 | section_id u16 | packet_id u8 | payload ... | crc32 u32 |
//! meta: | len u16 | data_id u8 | 0u16 | 0u8 | last_section u16 | last_packet u8 | blob_crc32 u32 | crc32 u32 |
//! ```
//!
//! `len` counts the whole frame including itself. The trailing CRC32 covers
//! everything between the length prefix and the CRC.

use std::sync::Arc;

use crc32fast::Hasher;

use super::DataId;
use crate::{LinkError, Result};

const LEN_SIZE: usize = 2;
const HEADER_SIZE: usize = LEN_SIZE + 1 + 2 + 1;
const CRC_SIZE: usize = 4;

/// Bytes added around a body payload (length prefix, ids, CRC trailer).
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + CRC_SIZE;

/// Total size of a meta frame.
pub const META_FRAME_LEN: usize = HEADER_SIZE + 2 + 1 + 4 + CRC_SIZE;

/// What a packet carries besides its coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Leading packet of a transfer: range and whole-blob checksum.
    Meta { last_section_id: u16, last_packet_id: u8, blob_crc32: u32 },
    /// A slice of the serialized blob.
    Body,
}

/// One framed packet, ready to hand to the notification transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    data_id: DataId,
    section_id: u16,
    packet_id: u8,
    kind: PacketKind,
    frame: Arc<[u8]>,
}

impl Packet {
    /// Build a body frame around `payload`.
    pub fn body(data_id: DataId, section_id: u16, packet_id: u8, payload: &[u8]) -> Result<Self> {
        let total = FRAME_OVERHEAD + payload.len();
        if total > u16::MAX as usize {
            return Err(LinkError::protocol(format!(
                "payload of {} bytes does not fit a u16 frame length",
                payload.len()
            )));
        }
        let frame = seal(total, |buf| {
            buf.push(data_id.get());
            buf.extend_from_slice(&section_id.to_le_bytes());
            buf.push(packet_id);
            buf.extend_from_slice(payload);
        });
        Ok(Self { data_id, section_id, packet_id, kind: PacketKind::Body, frame })
    }

    /// Build the meta frame of a transfer.
    pub fn meta(data_id: DataId, last_section_id: u16, last_packet_id: u8, blob_crc32: u32) -> Self {
        let frame = seal(META_FRAME_LEN, |buf| {
            buf.push(data_id.get());
            buf.extend_from_slice(&0u16.to_le_bytes());
            buf.push(0);
            buf.extend_from_slice(&last_section_id.to_le_bytes());
            buf.push(last_packet_id);
            buf.extend_from_slice(&blob_crc32.to_le_bytes());
        });
        Self {
            data_id,
            section_id: 0,
            packet_id: 0,
            kind: PacketKind::Meta { last_section_id, last_packet_id, blob_crc32 },
            frame,
        }
    }

    /// Decode a received frame, checking its length prefix and CRC trailer.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FRAME_OVERHEAD {
            return Err(LinkError::parse(
                "Packet frame",
                format!("frame of {} bytes is shorter than the {} byte minimum", bytes.len(), FRAME_OVERHEAD),
            ));
        }

        let declared = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        if declared != bytes.len() {
            return Err(LinkError::integrity("frame length", declared as u32, bytes.len() as u32));
        }

        let crc_at = bytes.len() - CRC_SIZE;
        let expected = u32::from_le_bytes([
            bytes[crc_at],
            bytes[crc_at + 1],
            bytes[crc_at + 2],
            bytes[crc_at + 3],
        ]);
        let actual = crc32fast::hash(&bytes[LEN_SIZE..crc_at]);
        if expected != actual {
            return Err(LinkError::integrity("frame crc32", expected, actual));
        }

        let data_id = DataId::new(bytes[2])
            .ok_or_else(|| LinkError::protocol(format!("reserved data id {}", bytes[2])))?;
        let section_id = u16::from_le_bytes([bytes[3], bytes[4]]);
        let packet_id = bytes[5];

        let kind = if section_id == 0 && packet_id == 0 {
            if bytes.len() != META_FRAME_LEN {
                return Err(LinkError::parse(
                    "Meta frame",
                    format!("expected {} bytes, found {}", META_FRAME_LEN, bytes.len()),
                ));
            }
            PacketKind::Meta {
                last_section_id: u16::from_le_bytes([bytes[6], bytes[7]]),
                last_packet_id: bytes[8],
                blob_crc32: u32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]),
            }
        } else {
            PacketKind::Body
        };

        Ok(Self { data_id, section_id, packet_id, kind, frame: Arc::from(bytes) })
    }

    pub fn data_id(&self) -> DataId {
        self.data_id
    }

    pub fn section_id(&self) -> u16 {
        self.section_id
    }

    pub fn packet_id(&self) -> u8 {
        self.packet_id
    }

    /// `(section_id, packet_id)`, ordered the way packets are emitted.
    pub fn coordinates(&self) -> (u16, u8) {
        (self.section_id, self.packet_id)
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    pub fn is_meta(&self) -> bool {
        matches!(self.kind, PacketKind::Meta { .. })
    }

    /// Complete frame bytes as sent over the air.
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    /// Shared handle to the frame bytes.
    pub fn frame_arc(&self) -> Arc<[u8]> {
        Arc::clone(&self.frame)
    }

    /// Blob slice carried by a body packet; empty for the meta packet.
    pub fn payload(&self) -> &[u8] {
        match self.kind {
            PacketKind::Body => &self.frame[HEADER_SIZE..self.frame.len() - CRC_SIZE],
            PacketKind::Meta { .. } => &[],
        }
    }

    /// The CRC32 trailer.
    pub fn frame_crc32(&self) -> u32 {
        let at = self.frame.len() - CRC_SIZE;
        u32::from_le_bytes([self.frame[at], self.frame[at + 1], self.frame[at + 2], self.frame[at + 3]])
    }
}

/// Prefix the length, let `fill` write the checked region, append the CRC.
fn seal(total: usize, fill: impl FnOnce(&mut Vec<u8>)) -> Arc<[u8]> {
    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&(total as u16).to_le_bytes());
    fill(&mut buf);

    let mut hasher = Hasher::new();
    hasher.update(&buf[LEN_SIZE..]);
    let crc = hasher.finalize();
    buf.extend_from_slice(&crc.to_le_bytes());

    debug_assert_eq!(buf.len(), total);
    buf.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u8) -> DataId {
        DataId::new(raw).expect("valid id")
    }

    #[test]
    fn body_frame_layout() {
        let packet = Packet::body(id(3), 1, 7, b"abc").expect("fits");
        let frame = packet.frame();

        assert_eq!(frame.len(), FRAME_OVERHEAD + 3);
        assert_eq!(u16::from_le_bytes([frame[0], frame[1]]) as usize, frame.len());
        assert_eq!(frame[2], 3);
        assert_eq!(u16::from_le_bytes([frame[3], frame[4]]), 1);
        assert_eq!(frame[5], 7);
        assert_eq!(&frame[6..9], b"abc");
        assert_eq!(packet.frame_crc32(), crc32fast::hash(&frame[2..9]));
        assert_eq!(packet.payload(), b"abc");
    }

    #[test]
    fn meta_frame_layout() {
        let packet = Packet::meta(id(9), 2, 40, 0xDEAD_BEEF);
        let frame = packet.frame();

        assert_eq!(frame.len(), META_FRAME_LEN);
        assert_eq!(u16::from_le_bytes([frame[0], frame[1]]) as usize, META_FRAME_LEN);
        assert_eq!(&frame[2..6], &[9, 0, 0, 0]);
        assert_eq!(u16::from_le_bytes([frame[6], frame[7]]), 2);
        assert_eq!(frame[8], 40);
        assert_eq!(u32::from_le_bytes([frame[9], frame[10], frame[11], frame[12]]), 0xDEAD_BEEF);
        assert_eq!(packet.frame_crc32(), crc32fast::hash(&frame[2..13]));
        assert!(packet.payload().is_empty());
    }

    #[test]
    fn parse_accepts_what_was_built() {
        let body = Packet::body(id(1), 0, 1, &[0xAA; 20]).expect("fits");
        assert_eq!(Packet::parse(body.frame()).expect("valid frame"), body);

        let meta = Packet::meta(id(1), 0, 1, 42);
        let parsed = Packet::parse(meta.frame()).expect("valid frame");
        assert_eq!(parsed.kind(), PacketKind::Meta { last_section_id: 0, last_packet_id: 1, blob_crc32: 42 });
    }

    #[test]
    fn parse_detects_corruption() {
        let body = Packet::body(id(5), 0, 2, b"payload").expect("fits");
        let mut bytes = body.frame().to_vec();
        bytes[7] ^= 0xFF;
        assert!(matches!(Packet::parse(&bytes), Err(LinkError::Integrity { .. })));

        let truncated = &body.frame()[..body.frame().len() - 1];
        assert!(matches!(Packet::parse(truncated), Err(LinkError::Integrity { .. })));

        assert!(matches!(Packet::parse(&[0u8; 3]), Err(LinkError::Parse { .. })));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let payload = vec![0u8; u16::MAX as usize];
        assert!(matches!(Packet::body(id(1), 0, 1, &payload), Err(LinkError::Protocol { .. })));
    }
}
