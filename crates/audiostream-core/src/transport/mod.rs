//! Transport endpoints for streaming audio between two hosts.
//!
//! A transport owns the socket lifecycle, the handshake and framing
//! protocol, and the endpoint state machine. It exists in two roles
//! sharing one interface: a sender pushes captured audio into
//! [`Transport::send_audio`], a receiver delivers incoming chunks through
//! the audio-received callback.

pub mod tcp_pcm;

use crate::config::StreamConfig;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Endpoint state.
///
/// `Error` is recoverable: `stop()` returns the endpoint to
/// `Disconnected`, after which it may be restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransportState {
    #[default]
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Streaming = 3,
    Error = 4,
}

impl TransportState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => TransportState::Connecting,
            2 => TransportState::Connected,
            3 => TransportState::Streaming,
            4 => TransportState::Error,
            _ => TransportState::Disconnected,
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Disconnected => "disconnected",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Streaming => "streaming",
            TransportState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Snapshot of an endpoint's observable state.
///
/// Counters are cumulative across the current session and reset on
/// `start_*`. Only the endpoint mutates them; readers observe a snapshot.
#[derive(Debug, Clone, Default)]
pub struct TransportStatus {
    pub state: TransportState,
    pub peer_address: String,
    pub peer_port: u16,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_lost: u32,
    pub error_message: String,
}

/// Errors returned by `start_sender` / `start_receiver`.
///
/// Setup failures are additionally recorded in the status error message.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is already running")]
    AlreadyRunning,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to listen: {0}")]
    Listen(#[source] std::io::Error),
}

/// Invoked on each received non-empty chunk with the interleaved payload,
/// the channel count, and the frame count
pub type AudioReceivedCallback = Arc<dyn Fn(&[f32], u16, usize) + Send + Sync>;

/// Invoked with `true` when a peer attaches and `false` when it detaches
pub type ConnectionCallback = Arc<dyn Fn(bool) + Send + Sync>;

pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Connect to a receiver at `target:port` and stream `config` audio.
    ///
    /// Returns immediately; connection progress is visible via [`status`].
    /// Refused with [`TransportError::AlreadyRunning`] until `stop()`.
    ///
    /// [`status`]: Transport::status
    fn start_sender(
        &self,
        target: &str,
        port: u16,
        config: StreamConfig,
    ) -> Result<(), TransportError>;

    /// Bind `0.0.0.0:port` and accept one sender at a time.
    fn start_receiver(&self, port: u16, config: StreamConfig) -> Result<(), TransportError>;

    /// Tear down synchronously: after return no background activity
    /// remains, the state is `Disconnected`, and the endpoint may be
    /// restarted.
    fn stop(&self);

    /// Push one block of planar audio (sender only).
    ///
    /// `channel_data` holds one slice per channel, all the same length.
    /// Returns `false` when not currently streaming or on a send failure.
    fn send_audio(&self, channel_data: &[&[f32]]) -> bool;

    fn status(&self) -> TransportStatus;

    fn set_audio_received_callback(&self, callback: AudioReceivedCallback);

    fn set_connection_callback(&self, callback: ConnectionCallback);
}
