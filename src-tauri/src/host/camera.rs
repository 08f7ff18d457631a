//! Camera preview streaming.
//!
//! The camera never joins the recorded artifact; it feeds the live preview
//! bubble in the webview. A capture thread owns the nokhwa camera and emits
//! downscaled PNG frames as events until the camera track ends.

use std::time::Duration;

use base64::Engine as _;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use screenreel_core::capture::MediaTrack;
use screenreel_core::error::CaptureError;
use serde::Serialize;
use tauri::{AppHandle, Emitter};
use tokio::sync::oneshot;

/// Event carrying one preview frame.
pub const CAMERA_FRAME_EVENT: &str = "camera-frame";

const PREVIEW_WIDTH: u32 = 320;
const PREVIEW_INTERVAL: Duration = Duration::from_millis(100);

/// Payload for [`CAMERA_FRAME_EVENT`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// PNG image as a base64 data URL.
    pub data_url: String,
}

/// Open the default camera and stream preview frames until `track` ends.
///
/// Resolves once the camera is delivering frames, or with the open failure.
pub async fn start_preview(app: AppHandle, track: MediaTrack) -> Result<(), CaptureError> {
    let (ready_tx, ready_rx) = oneshot::channel();

    std::thread::Builder::new()
        .name("camera-preview".to_string())
        .spawn(move || preview_loop(app, track, ready_tx))
        .map_err(|e| CaptureError::Backend(format!("failed to spawn camera thread: {}", e)))?;

    ready_rx
        .await
        .map_err(|_| CaptureError::Backend("camera thread exited before reporting".to_string()))?
}

fn preview_loop(app: AppHandle, track: MediaTrack, ready: oneshot::Sender<Result<(), CaptureError>>) {
    let mut camera = match open_default_camera() {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if ready.send(Ok(())).is_err() {
        let _ = camera.stop_stream();
        return;
    }

    let format = camera.camera_format();
    tracing::info!(
        "Camera preview started ({}x{} @ {}fps)",
        format.resolution().width(),
        format.resolution().height(),
        format.frame_rate()
    );

    while !track.is_ended() {
        match capture_preview_frame(&mut camera) {
            Ok(frame) => {
                if let Err(e) = app.emit(CAMERA_FRAME_EVENT, &frame) {
                    tracing::warn!("Failed to emit camera frame: {}", e);
                    break;
                }
            }
            Err(e) => tracing::debug!("Camera frame skipped: {}", e),
        }
        std::thread::sleep(PREVIEW_INTERVAL);
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!("Error stopping camera stream: {:?}", e);
    }
    tracing::info!("Camera preview stopped");
}

fn open_default_camera() -> Result<Camera, CaptureError> {
    let cameras = nokhwa::query(ApiBackend::Auto)
        .map_err(|e| CaptureError::Backend(format!("camera enumeration failed: {}", e)))?;
    if cameras.is_empty() {
        return Err(CaptureError::Unavailable);
    }

    let requested =
        RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution);
    let mut camera = Camera::new(CameraIndex::Index(0), requested)
        .map_err(|e| CaptureError::Backend(format!("failed to open camera: {}", e)))?;
    camera
        .open_stream()
        .map_err(|e| CaptureError::Backend(format!("failed to open camera stream: {}", e)))?;
    Ok(camera)
}

fn capture_preview_frame(camera: &mut Camera) -> Result<CameraFrame, CaptureError> {
    let frame = camera
        .frame()
        .map_err(|e| CaptureError::Backend(format!("frame capture failed: {}", e)))?;
    let rgba = frame
        .decode_image::<RgbAFormat>()
        .map_err(|e| CaptureError::Backend(format!("frame decode failed: {}", e)))?;

    let (width, height, pixels) =
        super::downscale_rgba(rgba.width(), rgba.height(), rgba.as_raw(), PREVIEW_WIDTH);
    let png = super::encode_png(width, height, &pixels)?;
    Ok(CameraFrame {
        width,
        height,
        data_url: format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        ),
    })
}
