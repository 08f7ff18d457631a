//! Screen source enumeration and the self-view preview.
//!
//! Monitors are enumerated through xcap and presented with downscaled PNG
//! thumbnails so the picker can show previews. A chosen source is frozen
//! into a [`ScreenTarget`] carrying the geometry the encoder grabs, and a
//! self-view thread streams periodic captures of it while the screen track
//! is live.

use std::time::Duration;

use base64::Engine as _;
use screenreel_core::capture::{MediaTrack, ScreenSource};
use screenreel_core::error::CaptureError;
use serde::Serialize;
use tauri::{AppHandle, Emitter};
use xcap::Monitor;

/// Event carrying one self-view frame of the captured screen.
pub const SCREEN_FRAME_EVENT: &str = "screen-frame";

const THUMBNAIL_WIDTH: u32 = 320;
const SELF_VIEW_INTERVAL: Duration = Duration::from_millis(500);

/// Geometry of the monitor chosen for capture.
#[derive(Debug, Clone)]
pub struct ScreenTarget {
    /// Position in the platform's monitor ordering, used where the grabber
    /// addresses screens by index instead of geometry.
    pub index: usize,
    pub title: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Enumerate monitors as picker sources.
pub fn enumerate_sources() -> Result<Vec<ScreenSource>, CaptureError> {
    let monitors = list_monitors()?;
    if monitors.is_empty() {
        tracing::warn!("No monitors reported by the capture backend");
        return Err(CaptureError::Unavailable);
    }
    Ok(monitors.iter().map(source_for).collect())
}

/// Find the chosen monitor and freeze its capture geometry.
pub fn resolve_target(source_id: &str) -> Result<ScreenTarget, CaptureError> {
    let monitors = list_monitors()?;
    let Some(index) = monitors.iter().position(|m| m.id().to_string() == source_id) else {
        tracing::warn!("Picker chose unknown source {}", source_id);
        return Err(CaptureError::Unavailable);
    };

    let monitor = &monitors[index];
    Ok(ScreenTarget {
        index,
        title: display_title(monitor),
        x: monitor.x(),
        y: monitor.y(),
        width: monitor.width(),
        height: monitor.height(),
    })
}

fn list_monitors() -> Result<Vec<Monitor>, CaptureError> {
    Monitor::all().map_err(|e| CaptureError::Backend(format!("monitor enumeration failed: {}", e)))
}

fn source_for(monitor: &Monitor) -> ScreenSource {
    ScreenSource {
        id: monitor.id().to_string(),
        title: display_title(monitor),
        width: monitor.width(),
        height: monitor.height(),
        thumbnail: thumbnail_for(monitor),
    }
}

fn display_title(monitor: &Monitor) -> String {
    let name = monitor.name();
    if name.is_empty() {
        format!("Display {}", monitor.id())
    } else if monitor.is_primary() {
        format!("{} (primary)", name)
    } else {
        name.to_string()
    }
}

/// Grab a downscaled PNG of the monitor as a data URL. Failures degrade to
/// a picker entry without a preview.
fn thumbnail_for(monitor: &Monitor) -> Option<String> {
    let image = match monitor.capture_image() {
        Ok(image) => image,
        Err(e) => {
            tracing::debug!("Thumbnail capture failed for {}: {}", monitor.name(), e);
            return None;
        }
    };

    let (width, height, pixels) =
        super::downscale_rgba(image.width(), image.height(), image.as_raw(), THUMBNAIL_WIDTH);
    match super::encode_png(width, height, &pixels) {
        Ok(png) => Some(format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        )),
        Err(e) => {
            tracing::debug!("Thumbnail encode failed for {}: {}", monitor.name(), e);
            None
        }
    }
}

/// Payload for [`SCREEN_FRAME_EVENT`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenFrame {
    pub width: u32,
    pub height: u32,
    /// PNG image as a base64 data URL.
    pub data_url: String,
}

/// Stream self-view frames of the captured monitor until `track` ends.
///
/// Best-effort: if the preview cannot run, the recording proceeds without
/// it. Recording the display that shows the preview nests the preview
/// inside itself.
pub fn start_self_view(app: AppHandle, track: MediaTrack, monitor_index: usize) {
    let spawned = std::thread::Builder::new()
        .name("screen-preview".to_string())
        .spawn(move || self_view_loop(app, track, monitor_index));
    if let Err(e) = spawned {
        tracing::warn!("Failed to spawn screen preview thread: {}", e);
    }
}

fn self_view_loop(app: AppHandle, track: MediaTrack, monitor_index: usize) {
    let monitors = match list_monitors() {
        Ok(monitors) => monitors,
        Err(e) => {
            tracing::warn!("Screen preview unavailable: {}", e);
            return;
        }
    };
    let Some(monitor) = monitors.into_iter().nth(monitor_index) else {
        tracing::warn!("Screen preview unavailable: monitor {} is gone", monitor_index);
        return;
    };

    while !track.is_ended() {
        match self_view_frame(&monitor) {
            Ok(frame) => {
                if let Err(e) = app.emit(SCREEN_FRAME_EVENT, &frame) {
                    tracing::warn!("Failed to emit screen frame: {}", e);
                    break;
                }
            }
            Err(e) => tracing::debug!("Screen frame skipped: {}", e),
        }
        std::thread::sleep(SELF_VIEW_INTERVAL);
    }
    tracing::debug!("Screen preview stopped");
}

fn self_view_frame(monitor: &Monitor) -> Result<ScreenFrame, CaptureError> {
    let image = monitor
        .capture_image()
        .map_err(|e| CaptureError::Backend(format!("screen capture failed: {}", e)))?;
    let (width, height, pixels) =
        super::downscale_rgba(image.width(), image.height(), image.as_raw(), THUMBNAIL_WIDTH);
    let png = super::encode_png(width, height, &pixels)?;
    Ok(ScreenFrame {
        width,
        height,
        data_url: format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        ),
    })
}
