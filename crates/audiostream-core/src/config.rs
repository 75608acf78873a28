//! Runtime configuration and command-line parsing.

use thiserror::Error;

/// Operating mode of the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Capture local audio and forward it to a receiver
    Sender,
    /// Accept one sender and play its stream locally
    Receiver,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Sender => "sender",
            Mode::Receiver => "receiver",
        }
    }
}

/// Audio stream parameters, immutable once the handshake completes.
///
/// `buffer_size` is the device-side block size in frames and is advisory:
/// wire chunks may carry a different number of frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Bits per sample; only 32 (IEEE-754 binary32) is defined
    pub bits_per_sample: u16,
    /// Device block size in frames
    pub buffer_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: crate::DEFAULT_SAMPLE_RATE,
            channels: crate::DEFAULT_CHANNELS,
            bits_per_sample: 32,
            buffer_size: crate::DEFAULT_BUFFER_SIZE,
        }
    }
}

impl StreamConfig {
    /// Bytes per frame on the wire (`channels * 4` at float32)
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * 4
    }
}

/// Errors produced while parsing command-line arguments
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown argument: {0}")]
    UnknownArgument(String),

    #[error("{0} requires a value")]
    MissingValue(&'static str),

    #[error("Invalid value for {flag}: {value}")]
    InvalidValue { flag: &'static str, value: String },

    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    #[error("Invalid transport: {0}")]
    InvalidTransport(String),
}

/// Top-level application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    /// Audio device name; `None` selects the system default
    pub device: Option<String>,
    /// Receiver address, sender mode only
    pub target: Option<String>,
    pub port: u16,
    pub api_port: u16,
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_size: u32,
    pub verbose: bool,
    pub list_devices: bool,
    pub show_help: bool,
    pub test_tone: bool,
    pub tone_frequency: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Receiver,
            device: None,
            target: None,
            port: crate::DEFAULT_PORT,
            api_port: crate::DEFAULT_API_PORT,
            sample_rate: crate::DEFAULT_SAMPLE_RATE,
            channels: crate::DEFAULT_CHANNELS,
            buffer_size: crate::DEFAULT_BUFFER_SIZE,
            verbose: false,
            list_devices: false,
            show_help: false,
            test_tone: false,
            tone_frequency: 440,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments (without argv[0])
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let args: Vec<String> = args.into_iter().collect();
        let mut config = Config::default();
        let mut i = 0;

        fn value<'a>(
            args: &'a [String],
            i: &mut usize,
            flag: &'static str,
        ) -> Result<&'a str, ConfigError> {
            *i += 1;
            args.get(*i)
                .map(|s| s.as_str())
                .ok_or(ConfigError::MissingValue(flag))
        }

        fn parse<T: std::str::FromStr>(flag: &'static str, raw: &str) -> Result<T, ConfigError> {
            raw.parse().map_err(|_| ConfigError::InvalidValue {
                flag,
                value: raw.to_string(),
            })
        }

        while i < args.len() {
            match args[i].as_str() {
                "--help" | "-h" => config.show_help = true,
                "--list-devices" => config.list_devices = true,
                "--verbose" | "-v" => config.verbose = true,
                "--test-tone" => config.test_tone = true,
                "--mode" => {
                    let raw = value(&args, &mut i, "--mode")?;
                    config.mode = match raw {
                        "sender" => Mode::Sender,
                        "receiver" => Mode::Receiver,
                        other => return Err(ConfigError::InvalidMode(other.to_string())),
                    };
                }
                "--device" => config.device = Some(value(&args, &mut i, "--device")?.to_string()),
                "--target" => config.target = Some(value(&args, &mut i, "--target")?.to_string()),
                "--port" => config.port = parse("--port", value(&args, &mut i, "--port")?)?,
                "--api-port" => {
                    config.api_port = parse("--api-port", value(&args, &mut i, "--api-port")?)?
                }
                "--sample-rate" => {
                    config.sample_rate =
                        parse("--sample-rate", value(&args, &mut i, "--sample-rate")?)?
                }
                "--channels" => {
                    config.channels = parse("--channels", value(&args, &mut i, "--channels")?)?
                }
                "--buffer-size" => {
                    config.buffer_size =
                        parse("--buffer-size", value(&args, &mut i, "--buffer-size")?)?
                }
                "--tone-freq" => {
                    config.tone_frequency =
                        parse("--tone-freq", value(&args, &mut i, "--tone-freq")?)?
                }
                "--transport" => {
                    let raw = value(&args, &mut i, "--transport")?;
                    if raw != "tcp-pcm" {
                        return Err(ConfigError::InvalidTransport(raw.to_string()));
                    }
                }
                other => return Err(ConfigError::UnknownArgument(other.to_string())),
            }
            i += 1;
        }

        Ok(config)
    }

    /// The stream parameters implied by this configuration
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: 32,
            buffer_size: self.buffer_size,
        }
    }

    /// Print the usage text to stdout
    pub fn print_usage() {
        println!(
            r#"audiostream - Network audio streaming server

USAGE:
    audiostream [OPTIONS]

OPTIONS:
    --mode <MODE>           Operating mode: sender or receiver (default: receiver)
    --device <NAME>         Audio device name (default: system default)
    --target <HOST>         Target receiver address (sender mode only)
    --port <PORT>           Streaming port (default: 9876)
    --api-port <PORT>       HTTP API port (default: 8080)
    --sample-rate <RATE>    Sample rate in Hz (default: 48000)
    --channels <N>          Number of channels (default: 2)
    --buffer-size <SIZE>    Buffer size in frames (default: 512)
    --transport <TYPE>      Transport backend: tcp-pcm (default: tcp-pcm)
    --test-tone             Send a generated sine tone instead of device audio
    --tone-freq <HZ>        Test tone frequency (default: 440)
    --list-devices          List available audio devices and exit
    --verbose, -v           Enable verbose logging
    --help, -h              Show this help message

EXAMPLES:
    # Start as receiver on the default output device
    audiostream --mode receiver

    # Start as sender, stream to 192.168.1.100
    audiostream --mode sender --target 192.168.1.100

    # List available audio devices
    audiostream --list-devices
"#
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_match_receiver_mode() {
        let config = Config::from_args(args(&[])).unwrap();
        assert_eq!(config.mode, Mode::Receiver);
        assert_eq!(config.port, 9876);
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.channels, 2);
        assert_eq!(config.buffer_size, 512);
        assert!(!config.test_tone);
    }

    #[test]
    fn parses_sender_options() {
        let config = Config::from_args(args(&[
            "--mode",
            "sender",
            "--target",
            "192.168.1.100",
            "--port",
            "4000",
            "--sample-rate",
            "44100",
            "--channels",
            "1",
        ]))
        .unwrap();
        assert_eq!(config.mode, Mode::Sender);
        assert_eq!(config.target.as_deref(), Some("192.168.1.100"));
        assert_eq!(config.port, 4000);
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.channels, 1);
    }

    #[test]
    fn rejects_unknown_argument() {
        let err = Config::from_args(args(&["--bogus"])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownArgument(_)));
    }

    #[test]
    fn rejects_missing_value() {
        let err = Config::from_args(args(&["--mode"])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingValue("--mode")));
    }

    #[test]
    fn rejects_invalid_mode_and_transport() {
        assert!(matches!(
            Config::from_args(args(&["--mode", "broadcast"])).unwrap_err(),
            ConfigError::InvalidMode(_)
        ));
        assert!(matches!(
            Config::from_args(args(&["--transport", "udp-rtp"])).unwrap_err(),
            ConfigError::InvalidTransport(_)
        ));
    }

    #[test]
    fn stream_config_carries_float32() {
        let config = Config::from_args(args(&["--channels", "4"])).unwrap();
        let stream = config.stream_config();
        assert_eq!(stream.bits_per_sample, 32);
        assert_eq!(stream.frame_bytes(), 16);
    }
}
