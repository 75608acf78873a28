//! Cross-thread ordering test for the SPSC ring buffer.

use audiostream_core::RingBuffer;
use std::sync::Arc;

#[test]
fn million_elements_cross_threads_in_order() {
    const TOTAL: u32 = 1_000_000;
    const BATCH: u32 = 256;

    let ring = Arc::new(RingBuffer::<u32>::new(4096));

    let producer_ring = Arc::clone(&ring);
    let producer = std::thread::spawn(move || {
        let mut chunk = Vec::with_capacity(BATCH as usize);
        let mut next = 0u32;
        while next < TOTAL {
            let end = (next + BATCH).min(TOTAL);
            chunk.clear();
            chunk.extend(next..end);

            let mut offset = 0;
            while offset < chunk.len() {
                let written = producer_ring.write(&chunk[offset..]);
                if written == 0 {
                    std::thread::yield_now();
                }
                offset += written;
            }
            next = end;
        }
    });

    let mut expected = 0u32;
    let mut buf = [0u32; 512];
    while expected < TOTAL {
        let n = ring.read(&mut buf);
        if n == 0 {
            std::thread::yield_now();
            continue;
        }
        for &value in &buf[..n] {
            assert_eq!(value, expected, "no gaps, duplicates, or reordering");
            expected += 1;
        }
    }

    producer.join().expect("producer finishes cleanly");
    assert!(ring.is_empty(), "everything written was read exactly once");
}
