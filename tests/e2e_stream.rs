//! E2E tests for the loopback streaming path.
//!
//! A sender and a receiver endpoint run in-process and talk over
//! 127.0.0.1; received chunks are collected through the audio callback.

use audiostream_core::{StreamConfig, TcpPcmTransport, Transport, TransportState};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn wait_for_state(transport: &dyn Transport, state: TransportState, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if transport.status().state == state {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

/// One received chunk as seen by the audio callback
struct Chunk {
    samples: Vec<f32>,
    channels: u16,
    frames: usize,
}

#[test]
fn streams_100_chunks_with_exact_accounting() {
    let config = StreamConfig {
        sample_rate: 48000,
        channels: 2,
        bits_per_sample: 32,
        buffer_size: 512,
    };

    // Start the receiver with a deliberately different channel count;
    // the handshake must replace it with the sender's parameters.
    let receiver_config = StreamConfig {
        channels: 8,
        ..config
    };

    let receiver = TcpPcmTransport::new();
    let (chunk_tx, chunk_rx) = crossbeam_channel::unbounded::<Chunk>();
    receiver.set_audio_received_callback(Arc::new(move |samples, channels, frames| {
        let _ = chunk_tx.send(Chunk {
            samples: samples.to_vec(),
            channels,
            frames,
        });
    }));
    receiver
        .start_receiver(19876, receiver_config)
        .expect("receiver starts");

    let sender = TcpPcmTransport::new();
    sender
        .start_sender("127.0.0.1", 19876, config)
        .expect("sender starts");

    assert!(
        wait_for_state(&sender, TransportState::Streaming, Duration::from_secs(5)),
        "sender reaches streaming after the handshake"
    );
    assert!(
        wait_for_state(&receiver, TransportState::Streaming, Duration::from_secs(5)),
        "receiver reaches streaming after the handshake"
    );

    let left = vec![0.25f32; 512];
    let right = vec![-0.25f32; 512];
    for _ in 0..100 {
        assert!(
            sender.send_audio(&[left.as_slice(), right.as_slice()]),
            "send_audio succeeds while streaming"
        );
    }

    for _ in 0..100 {
        let chunk = chunk_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("audio callback fires once per chunk");
        assert_eq!(chunk.channels, 2, "handshake config is authoritative");
        assert_eq!(chunk.frames, 512);
        assert_eq!(chunk.samples.len(), 1024);
        assert_eq!(chunk.samples[0], 0.25, "interleaved frame-major layout");
        assert_eq!(chunk.samples[1], -0.25);
    }

    let status = receiver.status();
    assert_eq!(status.packets_lost, 0);
    assert_eq!(status.bytes_received, 100 * (8 + 4096));
    assert_eq!(status.peer_address, "127.0.0.1");

    let sender_status = sender.status();
    assert!(sender_status.bytes_sent >= 100 * (8 + 4096));
    assert_eq!(sender_status.peer_address, "127.0.0.1");
    assert_eq!(sender_status.peer_port, 19876);

    sender.stop();
    receiver.stop();
    assert_eq!(sender.status().state, TransportState::Disconnected);
    assert_eq!(receiver.status().state, TransportState::Disconnected);
}

#[test]
fn send_audio_is_refused_when_not_streaming() {
    let sender = TcpPcmTransport::new();
    let block = vec![0.0f32; 512];
    assert!(
        !sender.send_audio(&[block.as_slice(), block.as_slice()]),
        "no session, nothing to send to"
    );
}
