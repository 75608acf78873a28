//! Audio device layer and the bridge between device and wire layouts.
//!
//! The device side works in planar buffers (one slice per channel); the
//! wire and the ring buffer carry interleaved samples. [`bridge`] holds
//! the conversions, [`engine`] wraps the cpal device backend, [`tone`]
//! provides the test signal source.

pub mod bridge;
pub mod engine;
pub mod tone;

pub use engine::{AudioDeviceInfo, AudioEngine, AudioEngineError, CaptureCallback, PlaybackCallback};
pub use tone::ToneGenerator;
