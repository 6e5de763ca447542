//! RIP2 datagram framing
//!
//! Packet format (all integers big-endian):
//!
//! ```text
//! ┌──────────────┬────────────────┬──────────────────────────┬──────────────┐
//! │ Magic (4)    │ Length (4)     │ Payload (N - 12)         │ CRC-32 (4)   │
//! │ 82 73 80 50  │ u32 == N       │ Snappy(Packet protobuf)  │ over [0,N-4) │
//! └──────────────┴────────────────┴──────────────────────────┴──────────────┘
//! ```
//!
//! Decode checks run in a fixed order and the first failure decides the
//! [`DropReason`]: a datagram with the wrong magic is rejected before any
//! length, checksum or decompression work is done.
//!
//! Datagrams are independent. An optional sequence id from the message
//! header feeds [`SequenceTracker`] for loss/duplicate accounting only; it
//! never gates decoding.

use super::proto;
use crate::core::types::RangeImage;
use crate::error::{DropReason, Error, Result};
use prost::Message;

/// "RIP2" magic
pub const MAGIC: [u8; 4] = [0x82, 0x73, 0x80, 0x50];

/// Magic + length field
pub const HEADER_LEN: usize = 8;

/// CRC-32 trailer
pub const TRAILER_LEN: usize = 4;

/// Smallest datagram that can carry a (possibly empty) payload
pub const MIN_PACKET_LEN: usize = HEADER_LEN + TRAILER_LEN;

/// Receive buffer size for the sonar socket
pub const MAX_DATAGRAM_SIZE: usize = 65536;

/// Largest UDP payload over IPv4; the encode limit
pub const MAX_UDP_PAYLOAD: usize = 65507;

/// Successfully decoded datagram
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket {
    pub image: RangeImage,
    /// Header sequence id, when the sender included a header
    pub sequence: Option<u32>,
}

/// Decode one datagram into a range image.
pub fn decode(packet: &[u8]) -> std::result::Result<DecodedPacket, DropReason> {
    if packet.len() < MIN_PACKET_LEN {
        return Err(DropReason::TooShort);
    }
    if packet[..4] != MAGIC {
        return Err(DropReason::BadMagic);
    }

    let declared = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]) as usize;
    if declared != packet.len() {
        return Err(DropReason::BadLength);
    }

    let body_end = packet.len() - TRAILER_LEN;
    let expected_crc = u32::from_be_bytes([
        packet[body_end],
        packet[body_end + 1],
        packet[body_end + 2],
        packet[body_end + 3],
    ]);
    let actual_crc = checksum(&packet[..body_end]);
    if actual_crc != expected_crc {
        log::trace!(
            "RIP2 checksum mismatch: expected {:#010x}, got {:#010x}",
            expected_crc,
            actual_crc
        );
        return Err(DropReason::BadChecksum);
    }

    let payload = &packet[HEADER_LEN..body_end];
    let decompressed = snap::raw::Decoder::new()
        .decompress_vec(payload)
        .map_err(|_| DropReason::DecompressFail)?;

    let envelope =
        proto::Packet::decode(decompressed.as_slice()).map_err(|_| DropReason::SchemaMismatch)?;
    let any = envelope.msg.ok_or(DropReason::SchemaMismatch)?;
    if !proto::is_range_image_type(&any.type_url) {
        log::trace!("Ignoring RIP2 message type {}", any.type_url);
        return Err(DropReason::NotRangeImage);
    }

    let msg =
        proto::RangeImage::decode(any.value.as_slice()).map_err(|_| DropReason::SchemaMismatch)?;

    let sequence = msg.header.as_ref().map(|h| h.sequence_id);
    let image = RangeImage {
        width: msg.width,
        height: msg.height,
        fov_horizontal_deg: msg.fov_horizontal,
        fov_vertical_deg: msg.fov_vertical,
        pixel_scale: msg.image_pixel_scale,
        // Samples travel as uint32 but only the low 16 bits carry range
        samples: msg
            .image_pixel_data
            .iter()
            .map(|&v| (v & 0xFFFF) as u16)
            .collect(),
    };

    Ok(DecodedPacket { image, sequence })
}

/// Encode a range image into a complete RIP2 datagram.
///
/// Used by the simulator and tests; the receiver only decodes.
pub fn encode(image: &RangeImage, sequence: Option<u32>) -> Result<Vec<u8>> {
    let msg = proto::RangeImage {
        header: sequence.map(|sequence_id| proto::Header {
            timestamp: Some(now_timestamp()),
            sequence_id,
        }),
        width: image.width,
        height: image.height,
        fov_horizontal: image.fov_horizontal_deg,
        fov_vertical: image.fov_vertical_deg,
        image_pixel_scale: image.pixel_scale,
        image_pixel_data: image.samples.iter().map(|&s| s as u32).collect(),
    };

    let envelope = proto::Packet {
        msg: Some(prost_types::Any {
            type_url: format!("{}{}", proto::TYPE_URL_PREFIX, proto::RANGE_IMAGE_TYPE_NAME),
            value: msg.encode_to_vec(),
        }),
    };

    let compressed = snap::raw::Encoder::new()
        .compress_vec(&envelope.encode_to_vec())
        .map_err(|e| Error::Encode(e.to_string()))?;

    frame(&compressed)
}

/// Wrap an already compressed payload with header and CRC trailer.
pub fn frame(payload: &[u8]) -> Result<Vec<u8>> {
    let total_len = HEADER_LEN + payload.len() + TRAILER_LEN;
    if total_len > MAX_UDP_PAYLOAD {
        return Err(Error::Encode(format!(
            "packet of {} bytes exceeds datagram limit {}",
            total_len, MAX_UDP_PAYLOAD
        )));
    }

    let mut packet = Vec::with_capacity(total_len);
    packet.extend_from_slice(&MAGIC);
    packet.extend_from_slice(&(total_len as u32).to_be_bytes());
    packet.extend_from_slice(payload);
    let crc = checksum(&packet);
    packet.extend_from_slice(&crc.to_be_bytes());
    Ok(packet)
}

/// CRC-32 (IEEE 802.3) over header + payload
#[inline]
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

fn now_timestamp() -> prost_types::Timestamp {
    let us = crate::core::timestamp_us();
    prost_types::Timestamp {
        seconds: (us / 1_000_000) as i64,
        nanos: ((us % 1_000_000) * 1000) as i32,
    }
}

// ============================================================================
// Sequence tracking
// ============================================================================

/// Backward jumps larger than this are treated as a sender restart
const SEQUENCE_RESET_WINDOW: u32 = 1024;

/// Classification of one observed sequence id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvent {
    /// First id seen
    First,
    /// Exactly one after the previous id
    InOrder,
    /// Ids were skipped; carries the number missing
    Gap(u32),
    /// Same id as the previous datagram
    Duplicate,
    /// Older than the previous id (late arrival)
    OutOfOrder,
    /// Large backward jump; tracking restarts from this id
    Reset,
}

/// Loss and duplicate counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceStats {
    pub lost: u64,
    pub duplicates: u64,
    pub out_of_order: u64,
    pub resets: u64,
}

/// Observes header sequence ids for link-quality statistics.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last: Option<u32>,
    stats: SequenceStats,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one id (wrap-around safe)
    pub fn observe(&mut self, sequence: u32) -> SequenceEvent {
        let Some(last) = self.last else {
            self.last = Some(sequence);
            return SequenceEvent::First;
        };

        let forward = sequence.wrapping_sub(last);
        let event = if forward == 0 {
            SequenceEvent::Duplicate
        } else if forward == 1 {
            SequenceEvent::InOrder
        } else if forward < u32::MAX / 2 {
            SequenceEvent::Gap(forward - 1)
        } else if last.wrapping_sub(sequence) > SEQUENCE_RESET_WINDOW {
            SequenceEvent::Reset
        } else {
            SequenceEvent::OutOfOrder
        };

        match event {
            SequenceEvent::InOrder | SequenceEvent::First => self.last = Some(sequence),
            SequenceEvent::Gap(missing) => {
                self.stats.lost += missing as u64;
                self.last = Some(sequence);
            }
            SequenceEvent::Duplicate => self.stats.duplicates += 1,
            SequenceEvent::OutOfOrder => self.stats.out_of_order += 1,
            SequenceEvent::Reset => {
                self.stats.resets += 1;
                self.last = Some(sequence);
            }
        }
        event
    }

    pub fn stats(&self) -> SequenceStats {
        self.stats
    }

    /// Forget the last id (e.g. after a socket reconnect)
    pub fn reset(&mut self) {
        self.last = None;
    }
}
