//! Recording-related Tauri commands

use std::sync::Arc;

use screenreel_core::capture::{CaptureHost, ScreenSource};
use screenreel_core::recorder::{RecorderConfig, RecorderHandle, SessionSnapshot};
use tauri::State;
use tauri_plugin_shell::ShellExt;

use crate::host::DesktopHost;

/// Application state for recording
pub struct RecorderState {
    pub handle: RecorderHandle,
    pub host: Arc<DesktopHost>,
}

/// List candidate screens for the picker
#[tauri::command]
pub async fn list_screens(state: State<'_, RecorderState>) -> Result<Vec<ScreenSource>, String> {
    state.host.list_screens().await.map_err(|e| e.to_string())
}

/// Start a recording session
#[tauri::command]
pub async fn start_recording(
    state: State<'_, RecorderState>,
    config: RecorderConfig,
) -> Result<SessionSnapshot, String> {
    state.handle.start(config).await.map_err(|e| e.to_string())
}

/// Stop the active recording session
#[tauri::command]
pub async fn stop_recording(state: State<'_, RecorderState>) -> Result<(), String> {
    state.handle.stop().await.map_err(|e| e.to_string())
}

/// Current recorder snapshot
#[tauri::command]
pub async fn recorder_status(state: State<'_, RecorderState>) -> Result<SessionSnapshot, String> {
    state.handle.status().await.map_err(|e| e.to_string())
}

/// Deliver the screen picker choice; `None` means the dialog was dismissed
#[tauri::command]
pub async fn resolve_picker(
    state: State<'_, RecorderState>,
    source_id: Option<String>,
) -> Result<(), String> {
    state.host.resolve_picker(source_id);
    Ok(())
}

/// Reveal a saved recording in the system file manager
#[tauri::command]
pub async fn reveal_recording(app: tauri::AppHandle, path: String) -> Result<(), String> {
    let folder = std::path::Path::new(&path)
        .parent()
        .unwrap_or(std::path::Path::new(&path));
    app.shell()
        .open(folder.to_string_lossy(), None)
        .map_err(|e| e.to_string())
}
