//! Binary packet framing used by the low-level transport.
//!
//! A packet is a fixed 128-byte big-endian header followed by the payload:
//!
//! | offset | size | field            |
//! |--------|------|------------------|
//! | 0      | 4    | packet type      |
//! | 4      | 4    | sequence number  |
//! | 8      | 4    | total parts      |
//! | 12     | 4    | payload length   |
//! | 16     | 32   | BLAKE3 checksum  |
//! | 48     | 8    | timestamp (f64)  |
//! | 56     | 32   | source id        |
//! | 88     | 32   | destination id   |
//! | 120    | 8    | zero padding     |
//!
//! On a stream every packet is preceded by a `u32` frame length.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::constants::{MAX_PACKET_PAYLOAD, PACKET_HEADER_SIZE, PACKET_ID_LEN};
use crate::time_utils::utc_now_secs_f64;

const CHECKSUM_LEN: usize = 32;
const FRAME_LEN_PREFIX: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PacketType {
    Heartbeat = 1,
    FileUpload = 2,
    FileDownload = 3,
    FileChunk = 4,
    Control = 5,
    Ack = 6,
    Error = 7,
}

impl TryFrom<u32> for PacketType {
    type Error = PacketError;

    fn try_from(value: u32) -> Result<Self, PacketError> {
        Ok(match value {
            1 => PacketType::Heartbeat,
            2 => PacketType::FileUpload,
            3 => PacketType::FileDownload,
            4 => PacketType::FileChunk,
            5 => PacketType::Control,
            6 => PacketType::Ack,
            7 => PacketType::Error,
            other => return Err(PacketError::UnknownType(other)),
        })
    }
}

#[derive(Error, Debug)]
pub enum PacketError {
    #[error("payload of {len} bytes exceeds the {MAX_PACKET_PAYLOAD} byte limit")]
    PayloadTooLarge { len: usize },

    #[error("id {id:?} is longer than {PACKET_ID_LEN} bytes")]
    IdTooLong { id: String },

    #[error("packet truncated: {len} bytes is shorter than the header")]
    Truncated { len: usize },

    #[error("payload length mismatch: header says {declared}, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("unknown packet type {0}")]
    UnknownType(u32),

    #[error("id field is not valid UTF-8")]
    InvalidId,

    #[error("frame of {len} bytes exceeds the maximum packet size")]
    FrameTooLarge { len: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PacketHeader {
    pub packet_type: PacketType,
    pub sequence_number: u32,
    pub total_parts: u32,
    pub payload_len: u32,
    pub checksum: [u8; CHECKSUM_LEN],
    /// Unix seconds at creation.
    pub timestamp: f64,
    pub source_id: String,
    pub destination_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

pub fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    *blake3::hash(payload).as_bytes()
}

impl Packet {
    pub fn new(
        packet_type: PacketType,
        sequence_number: u32,
        total_parts: u32,
        source_id: &str,
        destination_id: &str,
        payload: impl Into<Bytes>,
    ) -> Result<Self, PacketError> {
        let payload = payload.into();
        if payload.len() > MAX_PACKET_PAYLOAD {
            return Err(PacketError::PayloadTooLarge { len: payload.len() });
        }
        check_id(source_id)?;
        check_id(destination_id)?;

        Ok(Self {
            header: PacketHeader {
                packet_type,
                sequence_number,
                total_parts,
                payload_len: payload.len() as u32,
                checksum: checksum(&payload),
                timestamp: utc_now_secs_f64(),
                source_id: source_id.to_string(),
                destination_id: destination_id.to_string(),
            },
            payload,
        })
    }

    /// Acknowledges `self`, echoing its sequence number back to the sender.
    pub fn ack(&self, source_id: &str) -> Result<Self, PacketError> {
        let mut payload = BytesMut::with_capacity(12);
        payload.put_u32(self.header.sequence_number);
        payload.put_f64(utc_now_secs_f64());

        Packet::new(
            PacketType::Ack,
            self.header.sequence_number,
            1,
            source_id,
            &self.header.source_id,
            payload.freeze(),
        )
    }

    pub fn encoded_len(&self) -> usize {
        PACKET_HEADER_SIZE + self.payload.len()
    }

    /// Header fields are public, so a hand-built packet is re-checked here
    /// before anything is written.
    fn validate(&self) -> Result<(), PacketError> {
        if self.payload.len() > MAX_PACKET_PAYLOAD {
            return Err(PacketError::PayloadTooLarge {
                len: self.payload.len(),
            });
        }
        check_id(&self.header.source_id)?;
        check_id(&self.header.destination_id)
    }

    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<(), PacketError> {
        self.validate()?;
        let h = &self.header;
        dst.reserve(self.encoded_len());
        dst.put_u32(h.packet_type as u32);
        dst.put_u32(h.sequence_number);
        dst.put_u32(h.total_parts);
        dst.put_u32(h.payload_len);
        dst.put_slice(&h.checksum);
        dst.put_f64(h.timestamp);
        put_id(dst, &h.source_id);
        put_id(dst, &h.destination_id);
        dst.put_bytes(0, PACKET_HEADER_SIZE - HEADER_FIELDS_LEN);
        dst.put_slice(&self.payload);
        Ok(())
    }

    pub fn encode(&self) -> Result<Bytes, PacketError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Parses one packet and verifies its payload checksum.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < PACKET_HEADER_SIZE {
            return Err(PacketError::Truncated { len: data.len() });
        }

        let mut header = &data[..PACKET_HEADER_SIZE];
        let packet_type = PacketType::try_from(header.get_u32())?;
        let sequence_number = header.get_u32();
        let total_parts = header.get_u32();
        let payload_len = header.get_u32();
        let mut sum = [0u8; CHECKSUM_LEN];
        header.copy_to_slice(&mut sum);
        let timestamp = header.get_f64();
        let source_id = get_id(&mut header)?;
        let destination_id = get_id(&mut header)?;

        let payload = &data[PACKET_HEADER_SIZE..];
        if payload.len() != payload_len as usize {
            return Err(PacketError::LengthMismatch {
                declared: payload_len as usize,
                actual: payload.len(),
            });
        }
        if checksum(payload) != sum {
            return Err(PacketError::ChecksumMismatch);
        }

        Ok(Self {
            header: PacketHeader {
                packet_type,
                sequence_number,
                total_parts,
                payload_len,
                checksum: sum,
                timestamp,
                source_id,
                destination_id,
            },
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

const HEADER_FIELDS_LEN: usize = 4 * 4 + CHECKSUM_LEN + 8 + 2 * PACKET_ID_LEN;

fn check_id(id: &str) -> Result<(), PacketError> {
    if id.len() > PACKET_ID_LEN {
        return Err(PacketError::IdTooLong { id: id.to_string() });
    }
    Ok(())
}

fn put_id(dst: &mut BytesMut, id: &str) {
    let raw = id.as_bytes();
    dst.put_slice(raw);
    dst.put_bytes(0, PACKET_ID_LEN - raw.len());
}

fn get_id(src: &mut &[u8]) -> Result<String, PacketError> {
    let mut raw = [0u8; PACKET_ID_LEN];
    src.copy_to_slice(&mut raw);
    let end = raw.iter().position(|b| *b == 0).unwrap_or(PACKET_ID_LEN);
    std::str::from_utf8(&raw[..end])
        .map(str::to_string)
        .map_err(|_| PacketError::InvalidId)
}

/// Length-prefixed packet stream. Corrupt packets are dropped and decoding
/// continues with the next frame.
#[derive(Debug, Default)]
pub struct PacketCodec {
    discarded: u64,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = PacketError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, PacketError> {
        loop {
            if src.len() < FRAME_LEN_PREFIX {
                return Ok(None);
            }

            let mut len_bytes = [0u8; FRAME_LEN_PREFIX];
            len_bytes.copy_from_slice(&src[..FRAME_LEN_PREFIX]);
            let frame_len = u32::from_be_bytes(len_bytes) as usize;

            if frame_len > PACKET_HEADER_SIZE + MAX_PACKET_PAYLOAD {
                return Err(PacketError::FrameTooLarge { len: frame_len });
            }

            if src.len() < FRAME_LEN_PREFIX + frame_len {
                src.reserve(FRAME_LEN_PREFIX + frame_len - src.len());
                return Ok(None);
            }

            src.advance(FRAME_LEN_PREFIX);
            let frame = src.split_to(frame_len);

            match Packet::decode(&frame) {
                Ok(packet) => return Ok(Some(packet)),
                Err(e) => {
                    self.discarded += 1;
                    warn!("discarding packet: {}", e);
                }
            }
        }
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = PacketError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), PacketError> {
        item.validate()?;
        dst.reserve(FRAME_LEN_PREFIX + item.encoded_len());
        dst.put_u32(item.encoded_len() as u32);
        item.encode_into(dst)
    }
}
