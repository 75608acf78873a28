//! REST API endpoints. All responses are JSON.

use crate::AppState;
use audiostream_core::audio::AudioEngine;
use audiostream_core::{Mode, TransportState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;
use std::sync::Arc;

/// Application status response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub mode: String,
    pub state: String,
    pub device: String,
    pub stream: StreamInfo,
    pub transport: TransportInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_size: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportInfo {
    pub name: String,
    pub peer_address: String,
    pub peer_port: u16,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_lost: u32,
}

/// Device listing response
#[derive(Serialize)]
pub struct DevicesResponse {
    pub inputs: Vec<DeviceEntry>,
    pub outputs: Vec<DeviceEntry>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEntry {
    pub name: String,
    pub is_default: bool,
    pub channels: u16,
}

/// Outcome of a lifecycle verb
#[derive(Serialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

#[derive(Serialize)]
pub struct TransportsResponse {
    pub transports: Vec<TransportEntry>,
}

#[derive(Serialize)]
pub struct TransportEntry {
    pub name: String,
    pub description: String,
    pub active: bool,
}

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.transport.status();

    Json(StatusResponse {
        mode: state.config.mode.as_str().to_string(),
        state: status.state.to_string(),
        device: state.device.clone(),
        stream: StreamInfo {
            sample_rate: state.stream.sample_rate,
            channels: state.stream.channels,
            buffer_size: state.stream.buffer_size,
        },
        transport: TransportInfo {
            name: state.transport.name().to_string(),
            peer_address: status.peer_address,
            peer_port: status.peer_port,
            bytes_sent: status.bytes_sent,
            bytes_received: status.bytes_received,
            packets_lost: status.packets_lost,
        },
        error: (!status.error_message.is_empty()).then_some(status.error_message),
    })
}

/// GET /devices
pub async fn list_devices() -> Result<Json<DevicesResponse>, (StatusCode, String)> {
    // Device enumeration talks to the audio backend; keep it off the
    // async workers.
    let result = tokio::task::spawn_blocking(|| {
        let inputs = AudioEngine::list_input_devices()?;
        let outputs = AudioEngine::list_output_devices()?;
        Ok::<_, audiostream_core::audio::AudioEngineError>((inputs, outputs))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let (inputs, outputs) = result.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to list devices: {e}"),
        )
    })?;

    let entry = |d: &audiostream_core::audio::AudioDeviceInfo, channels: u16| DeviceEntry {
        name: d.name.clone(),
        is_default: d.is_default,
        channels,
    };

    Ok(Json(DevicesResponse {
        inputs: inputs.iter().map(|d| entry(d, d.input_channels)).collect(),
        outputs: outputs.iter().map(|d| entry(d, d.output_channels)).collect(),
    }))
}

/// POST /stream/start
pub async fn start_stream(
    State(state): State<AppState>,
) -> (StatusCode, Json<ActionResponse>) {
    if state.transport.status().state == TransportState::Streaming {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResponse::failed("Stream already active")),
        );
    }

    if state.config.mode == Mode::Sender && state.config.target.is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResponse::failed("No target specified for sender mode")),
        );
    }

    let transport = Arc::clone(&state.transport);
    let config = Arc::clone(&state.config);
    let stream = state.stream;
    let result = tokio::task::spawn_blocking(move || match config.mode {
        Mode::Sender => transport.start_sender(
            config.target.as_deref().unwrap_or_default(),
            config.port,
            stream,
        ),
        Mode::Receiver => transport.start_receiver(config.port, stream),
    })
    .await;

    match result {
        Ok(Ok(())) => (StatusCode::OK, Json(ActionResponse::ok())),
        Ok(Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ActionResponse::failed(e.to_string())),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ActionResponse::failed(e.to_string())),
        ),
    }
}

/// POST /stream/stop
pub async fn stop_stream(State(state): State<AppState>) -> Json<ActionResponse> {
    let transport = Arc::clone(&state.transport);
    // stop() joins the pipeline threads; run it off the async workers.
    let _ = tokio::task::spawn_blocking(move || transport.stop()).await;
    Json(ActionResponse::ok())
}

/// GET /transports
pub async fn list_transports(State(state): State<AppState>) -> Json<TransportsResponse> {
    Json(TransportsResponse {
        transports: vec![TransportEntry {
            name: state.transport.name().to_string(),
            description: state.transport.description().to_string(),
            active: true,
        }],
    })
}

/// PUT /transport
pub async fn switch_transport() -> (StatusCode, Json<ActionResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ActionResponse::failed(
            "Only tcp-pcm transport is currently supported",
        )),
    )
}
