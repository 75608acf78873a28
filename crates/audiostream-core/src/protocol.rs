//! Wire protocol for PCM streaming over a byte-stream transport.
//!
//! A session starts with a single 20-byte [`StreamHeader`], followed by a
//! sequence of 8-byte [`ChunkHeader`]s, each prefixed to `size` bytes of
//! interleaved float32 payload. A chunk with `size == 0` is a keepalive and
//! carries no payload.
//!
//! All multi-byte integer fields are little-endian.

use crate::config::StreamConfig;
use std::time::Duration;
use thiserror::Error;

/// Magic bytes opening every stream header
pub const PROTOCOL_MAGIC: [u8; 4] = *b"ACAU";

/// Current protocol version
pub const PROTOCOL_VERSION: u16 = 1;

/// Encoded size of a [`StreamHeader`]
pub const STREAM_HEADER_SIZE: usize = 20;

/// Encoded size of a [`ChunkHeader`]
pub const CHUNK_HEADER_SIZE: usize = 8;

/// Period of the sender's keepalive chunks
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(2000);

/// Upper bound on the sender's blocking connect attempt
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Decoding failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("truncated header: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("bad magic: {0:02x?}")]
    BadMagic([u8; 4]),
}

/// One-time handshake sent by the sender immediately after connecting.
///
/// The version field is parsed but not validated in v1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub version: u16,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub buffer_size: u32,
    pub reserved: u16,
}

impl StreamHeader {
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            sample_rate: config.sample_rate,
            channels: config.channels,
            bits_per_sample: config.bits_per_sample,
            buffer_size: config.buffer_size,
            reserved: 0,
        }
    }

    pub fn to_config(&self) -> StreamConfig {
        StreamConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
            buffer_size: self.buffer_size,
        }
    }

    pub fn encode(&self) -> [u8; STREAM_HEADER_SIZE] {
        let mut data = [0u8; STREAM_HEADER_SIZE];
        data[0..4].copy_from_slice(&PROTOCOL_MAGIC);
        data[4..6].copy_from_slice(&self.version.to_le_bytes());
        data[6..10].copy_from_slice(&self.sample_rate.to_le_bytes());
        data[10..12].copy_from_slice(&self.channels.to_le_bytes());
        data[12..14].copy_from_slice(&self.bits_per_sample.to_le_bytes());
        data[14..18].copy_from_slice(&self.buffer_size.to_le_bytes());
        data[18..20].copy_from_slice(&self.reserved.to_le_bytes());
        data
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < STREAM_HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                expected: STREAM_HEADER_SIZE,
                actual: data.len(),
            });
        }

        let magic: [u8; 4] = data[0..4].try_into().unwrap();
        if magic != PROTOCOL_MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }

        Ok(Self {
            version: u16::from_le_bytes(data[4..6].try_into().unwrap()),
            sample_rate: u32::from_le_bytes(data[6..10].try_into().unwrap()),
            channels: u16::from_le_bytes(data[10..12].try_into().unwrap()),
            bits_per_sample: u16::from_le_bytes(data[12..14].try_into().unwrap()),
            buffer_size: u32::from_le_bytes(data[14..18].try_into().unwrap()),
            reserved: u16::from_le_bytes(data[18..20].try_into().unwrap()),
        })
    }
}

/// Per-chunk frame prefix.
///
/// `size` is the payload length in bytes: either 0 (keepalive) or a positive
/// multiple of `channels * 4`. `sequence` increases by exactly one per chunk
/// transmitted, keepalives included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub size: u32,
    pub sequence: u32,
}

impl ChunkHeader {
    pub fn keepalive(sequence: u32) -> Self {
        Self { size: 0, sequence }
    }

    pub fn is_keepalive(&self) -> bool {
        self.size == 0
    }

    pub fn encode(&self) -> [u8; CHUNK_HEADER_SIZE] {
        let mut data = [0u8; CHUNK_HEADER_SIZE];
        data[0..4].copy_from_slice(&self.size.to_le_bytes());
        data[4..8].copy_from_slice(&self.sequence.to_le_bytes());
        data
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < CHUNK_HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                expected: CHUNK_HEADER_SIZE,
                actual: data.len(),
            });
        }
        Ok(Self::from_bytes(data[..CHUNK_HEADER_SIZE].try_into().unwrap()))
    }

    /// Decode from an exact-sized buffer; total
    pub fn from_bytes(data: [u8; CHUNK_HEADER_SIZE]) -> Self {
        Self {
            size: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            sequence: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_header_round_trips() {
        let config = StreamConfig {
            sample_rate: 96000,
            channels: 8,
            bits_per_sample: 32,
            buffer_size: 256,
        };
        let header = StreamHeader::from_config(&config);
        let decoded = StreamHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.to_config(), config);
    }

    #[test]
    fn stream_header_layout_is_bit_exact() {
        let header = StreamHeader {
            version: 1,
            sample_rate: 48000,
            channels: 2,
            bits_per_sample: 32,
            buffer_size: 512,
            reserved: 0,
        };
        let data = header.encode();
        assert_eq!(&data[0..4], b"ACAU");
        assert_eq!(data[4..6], 1u16.to_le_bytes());
        assert_eq!(data[6..10], 48000u32.to_le_bytes());
        assert_eq!(data[10..12], 2u16.to_le_bytes());
        assert_eq!(data[12..14], 32u16.to_le_bytes());
        assert_eq!(data[14..18], 512u32.to_le_bytes());
        assert_eq!(data[18..20], [0, 0]);
    }

    #[test]
    fn chunk_header_round_trips() {
        let header = ChunkHeader {
            size: 4096,
            sequence: u32::MAX,
        };
        assert_eq!(ChunkHeader::decode(&header.encode()).unwrap(), header);

        let keepalive = ChunkHeader::keepalive(7);
        assert!(keepalive.is_keepalive());
        assert_eq!(ChunkHeader::decode(&keepalive.encode()).unwrap(), keepalive);
    }

    #[test]
    fn short_input_is_rejected() {
        for len in 0..STREAM_HEADER_SIZE {
            let data = vec![0u8; len];
            assert!(matches!(
                StreamHeader::decode(&data),
                Err(ProtocolError::Truncated { .. })
            ));
        }
        for len in 0..CHUNK_HEADER_SIZE {
            let data = vec![0u8; len];
            assert!(matches!(
                ChunkHeader::decode(&data),
                Err(ProtocolError::Truncated { .. })
            ));
        }
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut data = StreamHeader::from_config(&StreamConfig::default()).encode();
        data[0..4].copy_from_slice(b"XXXX");
        assert_eq!(
            StreamHeader::decode(&data),
            Err(ProtocolError::BadMagic(*b"XXXX"))
        );
    }

    #[test]
    fn unknown_version_is_parsed_not_rejected() {
        let mut data = StreamHeader::from_config(&StreamConfig::default()).encode();
        data[4..6].copy_from_slice(&9u16.to_le_bytes());
        let header = StreamHeader::decode(&data).unwrap();
        assert_eq!(header.version, 9);
    }
}
