//! Blob fragmentation into framed packets

use tracing::debug;

use crate::types::{DataId, Packet};
use crate::{LinkError, Result};

/// Default payload bytes per body packet.
pub const DEFAULT_MAX_PAYLOAD: usize = 100;

/// Splits blobs into a meta packet followed by numbered body packets.
///
/// Body packets are numbered from `(section 0, packet 1)`. When the packet id
/// would pass 255 the section advances and the packet id restarts at 0. The meta
/// packet always sits at `(0, 0)` and points at the last body packet.
///
/// A zero-length blob yields only the meta packet, with the last coordinates set
/// to `(0, 0)`, meaning "no body packets".
#[derive(Debug, Clone, Copy)]
pub struct PacketFragmenter {
    max_payload: usize,
}

impl Default for PacketFragmenter {
    fn default() -> Self {
        Self { max_payload: DEFAULT_MAX_PAYLOAD }
    }
}

impl PacketFragmenter {
    /// Create a fragmenter; `max_payload` must be non-zero and fit a u16 frame.
    pub fn new(max_payload: usize) -> Result<Self> {
        if max_payload == 0 {
            return Err(LinkError::config("max_payload must be greater than zero"));
        }
        if max_payload + crate::types::FRAME_OVERHEAD > u16::MAX as usize {
            return Err(LinkError::config(format!(
                "max_payload {} exceeds the u16 frame length",
                max_payload
            )));
        }
        Ok(Self { max_payload })
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Number of packets, meta included, that `blob_len` bytes produce.
    pub fn packet_count(&self, blob_len: usize) -> usize {
        blob_len.div_ceil(self.max_payload) + 1
    }

    /// Fragment `blob` for transfer `data_id`.
    pub fn fragment(&self, blob: &[u8], data_id: DataId) -> Result<Vec<Packet>> {
        let blob_crc32 = crc32fast::hash(blob);
        let mut packets = Vec::with_capacity(self.packet_count(blob.len()));
        packets.push(Packet::meta(data_id, 0, 0, 0));

        let mut section_id: u16 = 0;
        let mut packet_id: u8 = 1;
        let mut last = (0u16, 0u8);

        for (index, chunk) in blob.chunks(self.max_payload).enumerate() {
            if index > 0 {
                if packet_id == u8::MAX {
                    section_id = section_id.checked_add(1).ok_or_else(|| {
                        LinkError::protocol(format!(
                            "blob of {} bytes needs more than {} sections",
                            blob.len(),
                            u16::MAX as u32 + 1
                        ))
                    })?;
                    packet_id = 0;
                } else {
                    packet_id += 1;
                }
            }
            packets.push(Packet::body(data_id, section_id, packet_id, chunk)?);
            last = (section_id, packet_id);
        }

        packets[0] = Packet::meta(data_id, last.0, last.1, blob_crc32);

        debug!(
            data_id = data_id.get(),
            blob_len = blob.len(),
            packets = packets.len(),
            last_section_id = last.0,
            last_packet_id = last.1,
            blob_crc32 = format_args!("{:#010x}", blob_crc32),
            "Fragmented blob"
        );

        Ok(packets)
    }
}
