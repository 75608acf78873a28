//! Audiostream Core - Streaming pipeline for uncompressed PCM over TCP
//!
//! This library provides the building blocks for point-to-point audio
//! streaming: the framed wire protocol, a lock-free SPSC ring buffer that
//! bridges the network thread and the realtime playback callback, the TCP
//! transport endpoint, and the cpal-based audio device layer.

pub mod audio;
pub mod config;
pub mod protocol;
pub mod ring;
pub mod transport;

pub use config::{Config, Mode, StreamConfig};
pub use ring::RingBuffer;
pub use transport::tcp_pcm::TcpPcmTransport;
pub use transport::{Transport, TransportError, TransportState, TransportStatus};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Default channel count (stereo)
pub const DEFAULT_CHANNELS: u16 = 2;

/// Default device block size in frames
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Default streaming port
pub const DEFAULT_PORT: u16 = 9876;

/// Default HTTP API port
pub const DEFAULT_API_PORT: u16 = 8080;
