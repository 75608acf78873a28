//! Conversions between the device's planar layout and the wire's
//! interleaved layout, plus the playback side of the receiver bridge.

use crate::ring::RingBuffer;

/// Interleave planar channel buffers into `out`.
///
/// `out` must hold `frames * channels` samples, where `frames` is the
/// length of each channel slice.
pub fn interleave<S: AsRef<[f32]>>(planar: &[S], out: &mut [f32]) {
    let channels = planar.len();
    for (ch, channel) in planar.iter().enumerate() {
        for (frame, &sample) in channel.as_ref().iter().enumerate() {
            out[frame * channels + ch] = sample;
        }
    }
}

/// Scatter an interleaved buffer into planar channel buffers.
pub fn deinterleave<S: AsMut<[f32]>>(interleaved: &[f32], planar: &mut [S]) {
    let channels = planar.len();
    for (ch, channel) in planar.iter_mut().enumerate() {
        for (frame, sample) in channel.as_mut().iter_mut().enumerate() {
            *sample = interleaved[frame * channels + ch];
        }
    }
}

/// Pull one device block from the ring buffer into planar output.
///
/// Reads `frames * channels` interleaved samples, zero-fills whatever the
/// ring could not supply (underrun), and de-interleaves into `planar`.
/// Returns whether any data at all was available; the output buffers are
/// valid (silence-filled) either way.
pub fn playback_pull<S: AsMut<[f32]>>(
    ring: &RingBuffer<f32>,
    scratch: &mut Vec<f32>,
    planar: &mut [S],
) -> bool {
    let channels = planar.len();
    let frames = match planar.first_mut() {
        Some(channel) => channel.as_mut().len(),
        None => return false,
    };
    let total = frames * channels;

    scratch.resize(total, 0.0);
    let read = ring.read(&mut scratch[..total]);
    scratch[read..total].fill(0.0);

    deinterleave(&scratch[..total], planar);
    read > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleave_matches_wire_layout() {
        let left = [1.0f32, 2.0, 3.0];
        let right = [10.0f32, 20.0, 30.0];
        let mut out = [0.0f32; 6];
        interleave(&[&left[..], &right[..]], &mut out);
        assert_eq!(out, [1.0, 10.0, 2.0, 20.0, 3.0, 30.0]);
    }

    #[test]
    fn deinterleave_inverts_interleave() {
        let wire = [1.0f32, 10.0, 2.0, 20.0, 3.0, 30.0];
        let mut planar = [vec![0.0f32; 3], vec![0.0f32; 3]];
        deinterleave(&wire, &mut planar);
        assert_eq!(planar[0], [1.0, 2.0, 3.0]);
        assert_eq!(planar[1], [10.0, 20.0, 30.0]);
    }

    #[test]
    fn playback_pull_delivers_buffered_audio() {
        let ring = RingBuffer::<f32>::new(64);
        ring.write(&[1.0, 10.0, 2.0, 20.0]);

        let mut scratch = Vec::new();
        let mut planar = [vec![9.0f32; 2], vec![9.0f32; 2]];
        assert!(playback_pull(&ring, &mut scratch, &mut planar));
        assert_eq!(planar[0], [1.0, 2.0]);
        assert_eq!(planar[1], [10.0, 20.0]);
    }

    #[test]
    fn underrun_zero_fills_and_reports_no_data() {
        let ring = RingBuffer::<f32>::new(4096);

        let mut scratch = Vec::new();
        let mut planar = [vec![1.0f32; 512], vec![1.0f32; 512]];
        let got_data = playback_pull(&ring, &mut scratch, &mut planar);

        assert!(!got_data, "empty ring reports no data");
        assert!(planar[0].iter().all(|&s| s == 0.0), "output is silence");
        assert!(planar[1].iter().all(|&s| s == 0.0), "output is silence");
    }

    #[test]
    fn partial_underrun_keeps_head_and_silences_tail() {
        let ring = RingBuffer::<f32>::new(64);
        ring.write(&[5.0, 6.0]); // one stereo frame

        let mut scratch = Vec::new();
        let mut planar = [vec![1.0f32; 4], vec![1.0f32; 4]];
        assert!(playback_pull(&ring, &mut scratch, &mut planar));
        assert_eq!(planar[0], [5.0, 0.0, 0.0, 0.0]);
        assert_eq!(planar[1], [6.0, 0.0, 0.0, 0.0]);
    }
}
