//! Artifact delivery through the desktop save dialog.
//!
//! The finished recording is offered through the platform save dialog,
//! seeded with the generated filename. Dismissing the dialog falls back to
//! the Downloads directory so a finished recording is never thrown away.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use screenreel_core::delivery::{artifact_filename, ArtifactDelivery};
use screenreel_core::error::DeliveryError;
use screenreel_core::recorder::Artifact;
use serde::Serialize;
use tauri::{AppHandle, Emitter};
use tauri_plugin_dialog::DialogExt;

/// Event announcing a saved recording.
pub const RECORDING_SAVED_EVENT: &str = "recording-saved";

/// Payload for [`RECORDING_SAVED_EVENT`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSaved {
    pub path: String,
    pub bytes: usize,
}

pub struct DialogDelivery {
    app: AppHandle,
}

impl DialogDelivery {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }

    /// Run the save dialog off the async runtime. `None` covers both a
    /// dismissed dialog and a destination that is not a plain path.
    async fn pick_destination(&self, suggested: String) -> Option<PathBuf> {
        let dialog = self.app.dialog().clone();
        let picked = tokio::task::spawn_blocking(move || {
            dialog
                .file()
                .set_file_name(&suggested)
                .add_filter("WebM video", &["webm"])
                .blocking_save_file()
        })
        .await
        .ok()
        .flatten()?;
        picked.into_path().ok()
    }
}

#[async_trait]
impl ArtifactDelivery for DialogDelivery {
    async fn deliver(&self, artifact: &Artifact) -> Result<PathBuf, DeliveryError> {
        let name = artifact_filename(Utc::now(), artifact.profile().extension());

        let path = match self.pick_destination(name.clone()).await {
            Some(path) => path,
            None => {
                let downloads = dirs::download_dir().ok_or_else(|| {
                    DeliveryError::NoTarget(
                        "no destination chosen and no Downloads directory".to_string(),
                    )
                })?;
                tracing::info!("Save dialog dismissed, falling back to {}", downloads.display());
                downloads.join(&name)
            }
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, artifact.bytes())?;
        tracing::info!("Delivered recording to: {}", path.display());

        let payload = RecordingSaved {
            path: path.to_string_lossy().to_string(),
            bytes: artifact.len(),
        };
        if let Err(e) = self.app.emit(RECORDING_SAVED_EVENT, payload) {
            tracing::warn!("Failed to announce saved recording: {}", e);
        }

        Ok(path)
    }
}
