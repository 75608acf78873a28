//! cpal audio engine for device enumeration and stream handling.
//!
//! The engine opens at most one stream in the configured direction and
//! adapts cpal's interleaved callback buffers to the planar layout the
//! pipeline callbacks use. The callbacks run on the driver's realtime
//! thread and must not block.

use crate::config::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SampleRate};
use thiserror::Error;
use tracing::{error, info, warn};

/// Common sample rates probed during device enumeration
const COMMON_RATES: [u32; 6] = [44100, 48000, 88200, 96000, 176400, 192000];

/// Errors from the audio device layer
#[derive(Debug, Error)]
pub enum AudioEngineError {
    #[error("No audio devices found")]
    NoDevicesFound,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to enumerate devices: {0}")]
    Enumeration(String),

    #[error("Failed to open stream: {0}")]
    Stream(String),
}

/// Audio device information
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    /// Device name
    pub name: String,
    /// Whether this is the default device for its direction
    pub is_default: bool,
    /// Supported sample rates
    pub sample_rates: Vec<u32>,
    /// Number of input channels
    pub input_channels: u16,
    /// Number of output channels
    pub output_channels: u16,
}

/// Planar capture callback: one slice per channel plus the frame count
pub type CaptureCallback = Box<dyn FnMut(&[&[f32]], usize) + Send + 'static>;

/// Planar playback callback: fills the channel buffers, returns whether
/// any data was produced (silence is delivered either way)
pub type PlaybackCallback = Box<dyn FnMut(&mut [&mut [f32]], usize) -> bool + Send + 'static>;

enum Direction {
    Input,
    Output,
}

/// Audio engine owning the open device stream
pub struct AudioEngine {
    device_name: Option<String>,
    stream: Option<cpal::Stream>,
    config: StreamConfig,
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine {
    pub fn new() -> Self {
        Self {
            device_name: None,
            stream: None,
            config: StreamConfig::default(),
        }
    }

    /// List available input devices
    pub fn list_input_devices() -> Result<Vec<AudioDeviceInfo>, AudioEngineError> {
        Self::list_devices(Direction::Input)
    }

    /// List available output devices
    pub fn list_output_devices() -> Result<Vec<AudioDeviceInfo>, AudioEngineError> {
        Self::list_devices(Direction::Output)
    }

    fn list_devices(direction: Direction) -> Result<Vec<AudioDeviceInfo>, AudioEngineError> {
        let host = cpal::default_host();
        let mut devices = Vec::new();

        let default_name = match direction {
            Direction::Input => host.default_input_device().and_then(|d| d.name().ok()),
            Direction::Output => host.default_output_device().and_then(|d| d.name().ok()),
        };

        let iter = match direction {
            Direction::Input => host
                .input_devices()
                .map_err(|e| AudioEngineError::Enumeration(e.to_string()))?,
            Direction::Output => host
                .output_devices()
                .map_err(|e| AudioEngineError::Enumeration(e.to_string()))?,
        };

        for device in iter {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            let is_default = default_name.as_deref() == Some(name.as_str());

            let input_channels = device
                .default_input_config()
                .map(|c| c.channels())
                .unwrap_or(0);
            let output_channels = device
                .default_output_config()
                .map(|c| c.channels())
                .unwrap_or(0);

            let mut sample_rates = Vec::new();
            let supported = match direction {
                Direction::Input => device
                    .supported_input_configs()
                    .map(|c| c.collect::<Vec<_>>()),
                Direction::Output => device
                    .supported_output_configs()
                    .map(|c| c.collect::<Vec<_>>()),
            };
            if let Ok(configs) = supported {
                for config in configs {
                    for &rate in &COMMON_RATES {
                        if (config.min_sample_rate().0..=config.max_sample_rate().0)
                            .contains(&rate)
                            && !sample_rates.contains(&rate)
                        {
                            sample_rates.push(rate);
                        }
                    }
                }
            }
            sample_rates.sort_unstable();

            devices.push(AudioDeviceInfo {
                name,
                is_default,
                sample_rates,
                input_channels,
                output_channels,
            });
        }

        Ok(devices)
    }

    fn find_device(
        host: &Host,
        name: Option<&str>,
        direction: &Direction,
    ) -> Result<Device, AudioEngineError> {
        if let Some(name) = name {
            let mut iter = match direction {
                Direction::Input => host
                    .input_devices()
                    .map_err(|e| AudioEngineError::Enumeration(e.to_string()))?,
                Direction::Output => host
                    .output_devices()
                    .map_err(|e| AudioEngineError::Enumeration(e.to_string()))?,
            };
            iter.find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| AudioEngineError::DeviceNotFound(name.to_string()))
        } else {
            match direction {
                Direction::Input => host.default_input_device(),
                Direction::Output => host.default_output_device(),
            }
            .ok_or(AudioEngineError::NoDevicesFound)
        }
    }

    /// Probe which stream parameters the device actually accepts.
    ///
    /// Tries the requested rate with the requested fixed block size,
    /// then relaxes the block size, then falls back to the device's
    /// default rate. The probe streams are built with no-op callbacks
    /// and dropped immediately.
    fn negotiate(
        device: &Device,
        requested: &StreamConfig,
        direction: &Direction,
    ) -> Result<cpal::StreamConfig, AudioEngineError> {
        let default_rate = match direction {
            Direction::Input => device.default_input_config(),
            Direction::Output => device.default_output_config(),
        }
        .map(|c| c.sample_rate().0)
        .unwrap_or(requested.sample_rate);

        let mut candidates = vec![
            (requested.sample_rate, cpal::BufferSize::Fixed(requested.buffer_size)),
            (requested.sample_rate, cpal::BufferSize::Default),
        ];
        if default_rate != requested.sample_rate {
            candidates.push((default_rate, cpal::BufferSize::Default));
        }

        for (rate, buffer_size) in candidates {
            let config = cpal::StreamConfig {
                channels: requested.channels,
                sample_rate: SampleRate(rate),
                buffer_size,
            };
            let probe = match direction {
                Direction::Input => device
                    .build_input_stream(&config, |_: &[f32], _| {}, |_| {}, None)
                    .map(|_| ()),
                Direction::Output => device
                    .build_output_stream(&config, |_: &mut [f32], _| {}, |_| {}, None)
                    .map(|_| ()),
            };
            match probe {
                Ok(()) => {
                    if rate != requested.sample_rate {
                        warn!(
                            "requested rate {} Hz unavailable, using device default {} Hz",
                            requested.sample_rate, rate
                        );
                    }
                    return Ok(config);
                }
                Err(e) => {
                    warn!(rate, ?buffer_size, "stream config rejected: {e}");
                }
            }
        }

        Err(AudioEngineError::Stream(format!(
            "no workable stream config for {} Hz / {} channels",
            requested.sample_rate, requested.channels
        )))
    }

    /// Open the capture stream and begin delivering planar audio blocks
    /// to `callback`. Returns the effective stream parameters.
    pub fn open_input(
        &mut self,
        device_name: Option<&str>,
        requested: &StreamConfig,
        mut callback: CaptureCallback,
    ) -> Result<StreamConfig, AudioEngineError> {
        let host = cpal::default_host();
        let device = Self::find_device(&host, device_name, &Direction::Input)?;
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let config = Self::negotiate(&device, requested, &Direction::Input)?;

        let channels = config.channels as usize;
        let mut planar: Vec<Vec<f32>> = vec![Vec::new(); channels];

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let frames = data.len() / channels;
                    for (ch, channel) in planar.iter_mut().enumerate() {
                        channel.clear();
                        channel.extend(data.iter().skip(ch).step_by(channels));
                    }
                    let refs: Vec<&[f32]> = planar.iter().map(Vec::as_slice).collect();
                    callback(&refs, frames);
                },
                |err| error!("input stream error: {err}"),
                None,
            )
            .map_err(|e| AudioEngineError::Stream(e.to_string()))?;
        stream
            .play()
            .map_err(|e| AudioEngineError::Stream(e.to_string()))?;

        info!(
            device = %name,
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "capture stream open"
        );
        self.stream = Some(stream);
        self.device_name = Some(name);
        self.config = Self::effective(requested, &config);
        Ok(self.config)
    }

    /// Open the playback stream; `callback` fills planar blocks pulled by
    /// the device. Returns the effective stream parameters.
    pub fn open_output(
        &mut self,
        device_name: Option<&str>,
        requested: &StreamConfig,
        mut callback: PlaybackCallback,
    ) -> Result<StreamConfig, AudioEngineError> {
        let host = cpal::default_host();
        let device = Self::find_device(&host, device_name, &Direction::Output)?;
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let config = Self::negotiate(&device, requested, &Direction::Output)?;

        let channels = config.channels as usize;
        let mut planar: Vec<Vec<f32>> = vec![Vec::new(); channels];

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    for channel in planar.iter_mut() {
                        channel.clear();
                        channel.resize(frames, 0.0);
                    }
                    {
                        let mut refs: Vec<&mut [f32]> =
                            planar.iter_mut().map(|c| c.as_mut_slice()).collect();
                        callback(&mut refs, frames);
                    }
                    // Interleave back into the device buffer; an underrun
                    // left the planar buffers zero-filled.
                    for (i, sample) in data.iter_mut().enumerate() {
                        *sample = planar[i % channels][i / channels];
                    }
                },
                |err| error!("output stream error: {err}"),
                None,
            )
            .map_err(|e| AudioEngineError::Stream(e.to_string()))?;
        stream
            .play()
            .map_err(|e| AudioEngineError::Stream(e.to_string()))?;

        info!(
            device = %name,
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "playback stream open"
        );
        self.stream = Some(stream);
        self.device_name = Some(name);
        self.config = Self::effective(requested, &config);
        Ok(self.config)
    }

    fn effective(requested: &StreamConfig, opened: &cpal::StreamConfig) -> StreamConfig {
        StreamConfig {
            sample_rate: opened.sample_rate.0,
            channels: opened.channels,
            bits_per_sample: 32,
            buffer_size: requested.buffer_size,
        }
    }

    /// Close the open stream, if any
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            info!("audio stream closed");
        }
        self.device_name = None;
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    /// Effective stream parameters of the open stream
    pub fn config(&self) -> StreamConfig {
        self.config
    }
}
