//! E2E test for keepalive behavior on an idle link.
//!
//! Keepalives consume sequence numbers on the sender and advance the
//! receiver's expectation, so an idle period must not show up as loss
//! once audio resumes.

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

#[test]
fn idle_link_stays_streaming_with_zero_loss() {
    let config = StreamConfig::default();

    let receiver = TcpPcmTransport::new();
    let (chunk_tx, chunk_rx) = crossbeam_channel::unbounded::<(u16, usize)>();
    receiver.set_audio_received_callback(Arc::new(move |_samples, channels, frames| {
        let _ = chunk_tx.send((channels, frames));
    }));
    receiver.start_receiver(19911, config).expect("receiver starts");

    let sender = TcpPcmTransport::new();
    sender
        .start_sender("127.0.0.1", 19911, config)
        .expect("sender starts");
    assert!(wait_for_state(&sender, TransportState::Streaming, Duration::from_secs(5)));
    assert!(wait_for_state(&receiver, TransportState::Streaming, Duration::from_secs(5)));

    // Send no audio across two keepalive periods.
    std::thread::sleep(Duration::from_secs(5));

    assert_eq!(
        receiver.status().state,
        TransportState::Streaming,
        "keepalives hold the connection open"
    );
    assert_eq!(receiver.status().packets_lost, 0);
    assert!(
        chunk_rx.try_recv().is_err(),
        "keepalives never reach the audio callback"
    );
    let idle_sent = sender.status().bytes_sent;
    assert!(
        idle_sent >= 16 && idle_sent % 8 == 0,
        "only zero-sized chunks went out while idle, got {idle_sent} bytes"
    );

    // Audio resumes after the idle gap; keepalive sequence accounting
    // must leave the loss counter untouched.
    let block = vec![0.1f32; 512];
    assert!(sender.send_audio(&[block.as_slice(), block.as_slice()]));

    let (channels, frames) = chunk_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("audio flows again after the idle period");
    assert_eq!(channels, 2);
    assert_eq!(frames, 512);
    assert_eq!(
        receiver.status().packets_lost,
        0,
        "keepalive sequence numbers were accounted for"
    );

    sender.stop();
    receiver.stop();
}
