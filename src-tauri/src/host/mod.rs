//! Desktop capture host.
//!
//! [`DesktopHost`] is the engine's capture collaborator on this platform:
//! monitors come from xcap, consent goes through a picker dialog rendered by
//! the webview, encoding runs in an ffmpeg child process, and the camera
//! preview streams through nokhwa.

pub mod camera;
pub mod screen;
pub mod sink;

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use screenreel_core::capture::{CaptureHost, MediaHandle, ScreenSource};
use screenreel_core::error::{CaptureError, SinkError};
use screenreel_core::recorder::{EncodingProfile, RecordingSink, SessionEvent};
use serde::Serialize;
use tauri::{AppHandle, Emitter};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use screen::ScreenTarget;
use sink::FfmpegSink;

/// Event asking the webview to show the screen picker.
pub const PICKER_REQUEST_EVENT: &str = "picker-request";

/// Payload for [`PICKER_REQUEST_EVENT`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickerRequest {
    pub sources: Vec<ScreenSource>,
}

/// Capture host backed by the desktop the app runs on.
///
/// Screen consent is a webview dialog: `request_screen` emits
/// [`PICKER_REQUEST_EVENT`] and suspends until the frontend reports the
/// user's choice through [`DesktopHost::resolve_picker`].
pub struct DesktopHost {
    app: AppHandle,
    pending_picker: Mutex<Option<oneshot::Sender<Option<String>>>>,
    targets: Mutex<HashMap<Uuid, ScreenTarget>>,
}

impl DesktopHost {
    pub fn new(app: AppHandle) -> Self {
        Self {
            app,
            pending_picker: Mutex::new(None),
            targets: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the pending picker with the user's choice. `None` means the
    /// dialog was dismissed.
    pub fn resolve_picker(&self, source_id: Option<String>) {
        match self.pending_picker.lock().take() {
            Some(choice_tx) => {
                let _ = choice_tx.send(source_id);
            }
            None => tracing::debug!("Picker resolved with no request pending"),
        }
    }
}

#[async_trait]
impl CaptureHost for DesktopHost {
    async fn list_screens(&self) -> Result<Vec<ScreenSource>, CaptureError> {
        tokio::task::spawn_blocking(screen::enumerate_sources)
            .await
            .map_err(|e| CaptureError::Backend(format!("enumeration task failed: {}", e)))?
    }

    async fn request_screen(&self) -> Result<MediaHandle, CaptureError> {
        let sources = self.list_screens().await?;

        let (choice_tx, choice_rx) = oneshot::channel();
        if self.pending_picker.lock().replace(choice_tx).is_some() {
            tracing::warn!("Replacing an unresolved picker request");
        }
        if let Err(e) = self.app.emit(PICKER_REQUEST_EVENT, PickerRequest { sources }) {
            self.pending_picker.lock().take();
            return Err(CaptureError::Backend(format!(
                "failed to reach the picker: {}",
                e
            )));
        }

        // Suspends until the user decides. A torn-down channel (window
        // closed, app exiting) reads as a denial.
        let choice = choice_rx.await.map_err(|_| CaptureError::Denied)?;
        let Some(source_id) = choice else {
            tracing::info!("Screen capture declined in the picker");
            return Err(CaptureError::Denied);
        };

        let target = tokio::task::spawn_blocking(move || screen::resolve_target(&source_id))
            .await
            .map_err(|e| CaptureError::Backend(format!("resolve task failed: {}", e)))??;

        tracing::info!(
            "Capturing {} ({}x{})",
            target.title,
            target.width,
            target.height
        );
        let monitor_index = target.index;
        let handle = MediaHandle::screen();
        self.targets.lock().insert(handle.id(), target);
        if let Some(track) = handle.video_track() {
            screen::start_self_view(self.app.clone(), track.clone(), monitor_index);
        }
        Ok(handle)
    }

    async fn request_camera(&self) -> Result<MediaHandle, CaptureError> {
        let handle = MediaHandle::camera();
        let Some(track) = handle.video_track() else {
            return Err(CaptureError::Backend(
                "camera handle has no video track".to_string(),
            ));
        };
        camera::start_preview(self.app.clone(), track.clone()).await?;
        Ok(handle)
    }

    async fn create_sink(
        &self,
        source: &MediaHandle,
        profile: EncodingProfile,
        session: Uuid,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Box<dyn RecordingSink>, SinkError> {
        let target = self.targets.lock().remove(&source.id()).ok_or_else(|| {
            SinkError::StartFailed(format!("no capture target for handle {}", source.id()))
        })?;
        Ok(Box::new(FfmpegSink::new(target, profile, session, events)))
    }
}

/// Nearest-neighbor downscale to `target_width`, preserving aspect ratio.
/// Sources at or below the target width pass through unchanged.
pub(crate) fn downscale_rgba(
    width: u32,
    height: u32,
    data: &[u8],
    target_width: u32,
) -> (u32, u32, Vec<u8>) {
    if width <= target_width || width == 0 || height == 0 {
        return (width, height, data.to_vec());
    }

    let out_width = target_width;
    let out_height = ((height as u64 * target_width as u64) / width as u64).max(1) as u32;
    let mut out = Vec::with_capacity(out_width as usize * out_height as usize * 4);
    for y in 0..out_height {
        let src_y = (y as u64 * height as u64 / out_height as u64) as usize;
        for x in 0..out_width {
            let src_x = (x as u64 * width as u64 / out_width as u64) as usize;
            let idx = (src_y * width as usize + src_x) * 4;
            out.extend_from_slice(&data[idx..idx + 4]);
        }
    }
    (out_width, out_height, out)
}

/// Encode RGBA pixels as an in-memory PNG.
pub(crate) fn encode_png(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>, CaptureError> {
    let mut out = Vec::new();
    let mut encoder = png::Encoder::new(&mut out, width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder
        .write_header()
        .map_err(|e| CaptureError::Backend(format!("PNG encode error: {}", e)))?;
    writer
        .write_image_data(data)
        .map_err(|e| CaptureError::Backend(format!("PNG encode error: {}", e)))?;
    writer
        .finish()
        .map_err(|e| CaptureError::Backend(format!("PNG encode error: {}", e)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downscale_preserves_aspect_ratio() {
        let data = vec![0u8; 640 * 480 * 4];
        let (width, height, pixels) = downscale_rgba(640, 480, &data, 320);
        assert_eq!(width, 320);
        assert_eq!(height, 240);
        assert_eq!(pixels.len(), 320 * 240 * 4);
    }

    #[test]
    fn downscale_passes_small_images_through() {
        let data = vec![7u8; 100 * 50 * 4];
        let (width, height, pixels) = downscale_rgba(100, 50, &data, 320);
        assert_eq!((width, height), (100, 50));
        assert_eq!(pixels, data);
    }

    #[test]
    fn downscale_samples_source_pixels() {
        // Left half red, right half blue; both must survive the downscale.
        let mut data = Vec::new();
        for _ in 0..4 {
            for x in 0..4 {
                if x < 2 {
                    data.extend_from_slice(&[255, 0, 0, 255]);
                } else {
                    data.extend_from_slice(&[0, 0, 255, 255]);
                }
            }
        }
        let (width, height, pixels) = downscale_rgba(4, 4, &data, 2);
        assert_eq!((width, height), (2, 2));
        assert_eq!(&pixels[0..4], &[255, 0, 0, 255]);
        assert_eq!(&pixels[4..8], &[0, 0, 255, 255]);
    }

    #[test]
    fn encoded_png_carries_the_signature() {
        let data = vec![128u8; 8 * 8 * 4];
        let png = encode_png(8, 8, &data).unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']);
    }

    #[test]
    fn picker_payload_carries_sources_without_empty_thumbnails() {
        let request = PickerRequest {
            sources: vec![ScreenSource {
                id: "3".to_string(),
                title: "DP-1".to_string(),
                width: 2560,
                height: 1440,
                thumbnail: None,
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        let source = &json["sources"][0];
        assert_eq!(source["id"], "3");
        assert_eq!(source["width"], 2560);
        assert!(source.get("thumbnail").is_none());
    }
}
