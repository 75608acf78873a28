//! audiostream - Network audio streaming server
//!
//! Entry point: parses configuration, wires the audio engine to the
//! transport endpoint for the configured role, starts the HTTP control
//! surface, and runs until Ctrl-C.

use anyhow::{Context, Result};
use audiostream_core::audio::{bridge, AudioEngine, ToneGenerator};
use audiostream_core::{
    Config, Mode, RingBuffer, StreamConfig, TcpPcmTransport, Transport, TransportState, VERSION,
};
use audiostream_server::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

fn main() -> Result<()> {
    let config = match Config::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            Config::print_usage();
            std::process::exit(1);
        }
    };

    if config.show_help {
        Config::print_usage();
        return Ok(());
    }

    init_logging(config.verbose)?;

    if config.list_devices {
        return list_devices();
    }

    if config.mode == Mode::Sender && config.target.is_none() {
        eprintln!("Error: Sender mode requires --target <host>");
        std::process::exit(1);
    }

    let transport = Arc::new(TcpPcmTransport::new());
    transport.set_connection_callback(Arc::new(|connected| {
        if connected {
            info!("peer attached");
        } else {
            info!("peer detached");
        }
    }));

    let requested = config.stream_config();
    let use_test_tone = config.test_tone && config.mode == Mode::Sender;

    // Receiver jitter buffer: one second of audio decouples the network
    // thread from the playback callback.
    let ring = Arc::new(RingBuffer::<f32>::new(
        requested.sample_rate as usize * requested.channels as usize,
    ));

    let mut engine = AudioEngine::new();
    let (stream_config, device_label) = match config.mode {
        Mode::Sender if use_test_tone => {
            (requested, format!("Test tone ({} Hz)", config.tone_frequency))
        }
        Mode::Sender => {
            let endpoint = Arc::clone(&transport);
            let effective = engine
                .open_input(
                    config.device.as_deref(),
                    &requested,
                    Box::new(move |planar, _frames| {
                        endpoint.send_audio(planar);
                    }),
                )
                .context("failed to open audio input device")?;
            let label = engine.device_name().unwrap_or("Unknown").to_string();
            (effective, label)
        }
        Mode::Receiver => {
            let producer = Arc::clone(&ring);
            transport.set_audio_received_callback(Arc::new(move |samples, _channels, _frames| {
                // A full ring drops the excess silently (jitter overflow).
                producer.write(samples);
            }));

            let consumer = Arc::clone(&ring);
            let mut scratch: Vec<f32> = Vec::new();
            let effective = engine
                .open_output(
                    config.device.as_deref(),
                    &requested,
                    Box::new(move |planar, _frames| {
                        bridge::playback_pull(&consumer, &mut scratch, planar)
                    }),
                )
                .context("failed to open audio output device")?;
            let label = engine.device_name().unwrap_or("Unknown").to_string();
            (effective, label)
        }
    };

    match config.mode {
        Mode::Sender => transport.start_sender(
            config.target.as_deref().unwrap_or_default(),
            config.port,
            stream_config,
        ),
        Mode::Receiver => transport.start_receiver(config.port, stream_config),
    }
    .context("failed to start transport")?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let state = AppState::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::new(config.clone()),
        stream_config,
        device_label.clone(),
    );
    let api_port = config.api_port;
    runtime.spawn(async move {
        if let Err(e) = audiostream_server::start_server(state, api_port).await {
            error!("API server failed: {e}");
        }
    });

    println!(
        "audiostream {} started in {} mode",
        VERSION,
        config.mode.as_str()
    );
    println!("  Source: {device_label}");
    println!("  Sample rate: {} Hz", stream_config.sample_rate);
    println!("  Channels: {}", stream_config.channels);
    println!("  Buffer size: {} frames", stream_config.buffer_size);
    println!("  Streaming port: {}", config.port);
    println!("  API port: {}", config.api_port);
    if let Some(target) = &config.target {
        println!("  Target: {target}");
    }
    println!();
    println!("Press Ctrl+C to exit");

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })
    .context("failed to install signal handler")?;

    let tone_thread = use_test_tone.then(|| {
        let endpoint = Arc::clone(&transport);
        let running = Arc::clone(&running);
        let frequency = config.tone_frequency;
        std::thread::spawn(move || run_test_tone(endpoint, running, stream_config, frequency))
    });

    let mut last_status = String::new();
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));

        if config.verbose {
            let status = transport.status();
            let line = format!(
                "State: {} | Sent: {} KB | Recv: {} KB | Lost: {}",
                status.state,
                status.bytes_sent / 1024,
                status.bytes_received / 1024,
                status.packets_lost
            );
            if line != last_status {
                println!("{line}");
                last_status = line;
            }
        }
    }

    println!();
    println!("Shutting down...");

    if let Some(handle) = tone_thread {
        let _ = handle.join();
    }
    transport.stop();
    engine.close();
    runtime.shutdown_background();

    println!("Done.");
    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for krate in ["audiostream", "audiostream_core", "audiostream_server"] {
        filter = filter.add_directive(
            format!("{krate}={level}")
                .parse()
                .context("invalid log directive")?,
        );
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn list_devices() -> Result<()> {
    println!("Input Devices:");
    match AudioEngine::list_input_devices() {
        Ok(devices) => print_devices(&devices),
        Err(e) => println!("  Error: {e}"),
    }

    println!();
    println!("Output Devices:");
    match AudioEngine::list_output_devices() {
        Ok(devices) => print_devices(&devices),
        Err(e) => println!("  Error: {e}"),
    }

    Ok(())
}

fn print_devices(devices: &[audiostream_core::audio::AudioDeviceInfo]) {
    if devices.is_empty() {
        println!("  (none)");
        return;
    }
    for device in devices {
        let default_marker = if device.is_default { " [default]" } else { "" };
        println!("  - {}{}", device.name, default_marker);
        println!(
            "    Channels: {} in, {} out",
            device.input_channels, device.output_channels
        );
        if !device.sample_rates.is_empty() {
            println!("    Sample rates: {:?}", device.sample_rates);
        }
    }
}

/// Generate and send sine-tone blocks at the device block period,
/// mirroring what a capture callback would deliver.
fn run_test_tone(
    transport: Arc<TcpPcmTransport>,
    running: Arc<AtomicBool>,
    config: StreamConfig,
    frequency: u32,
) {
    let mut tone = ToneGenerator::new(config.sample_rate, frequency);
    let frames = config.buffer_size as usize;
    let mut block: Vec<Vec<f32>> = vec![vec![0.0; frames]; config.channels as usize];
    let period = Duration::from_micros(1_000_000u64 * frames as u64 / config.sample_rate as u64);
    let mut next = Instant::now();

    while running.load(Ordering::SeqCst) {
        if transport.status().state == TransportState::Streaming {
            tone.generate(&mut block);
            let refs: Vec<&[f32]> = block.iter().map(Vec::as_slice).collect();
            transport.send_audio(&refs);

            // Schedule the next block at a precise interval; if we fell
            // behind, restart the clock instead of bursting.
            next += period;
            let now = Instant::now();
            if next > now {
                std::thread::sleep(next - now);
            } else {
                next = now;
            }
        } else {
            std::thread::sleep(Duration::from_millis(10));
            next = Instant::now();
        }
    }
}
