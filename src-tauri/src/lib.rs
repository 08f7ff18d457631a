//! ScreenReel desktop shell.
//!
//! Hosts the recorder engine inside a Tauri app: the webview renders the
//! control surface while this crate supplies the capture host, the ffmpeg
//! encoder sink, and dialog-based artifact delivery.

pub mod commands;
pub mod delivery;
pub mod host;

use std::sync::Arc;

use screenreel_core::capture::CaptureHost;
use screenreel_core::delivery::ArtifactDelivery;
use screenreel_core::recorder::{EncodingProfile, RecordingCoordinator};
use tauri::{Emitter, Manager};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::recording::RecorderState;
use delivery::DialogDelivery;
use host::DesktopHost;

/// Event carrying the latest session snapshot to the webview.
pub const RECORDER_STATUS_EVENT: &str = "recorder-status";

/// Initialize the application
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screenreel_lib=debug,screenreel_core=debug,tauri=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ScreenReel v{}", env!("CARGO_PKG_VERSION"));

    tauri::Builder::default()
        .plugin(tauri_plugin_shell::init())
        .plugin(tauri_plugin_dialog::init())
        .invoke_handler(tauri::generate_handler![
            commands::recording::list_screens,
            commands::recording::start_recording,
            commands::recording::stop_recording,
            commands::recording::recorder_status,
            commands::recording::resolve_picker,
            commands::recording::reveal_recording,
        ])
        .setup(|app| {
            let host = Arc::new(DesktopHost::new(app.handle().clone()));
            let delivery = Arc::new(DialogDelivery::new(app.handle().clone()));

            let (coordinator, handle) = RecordingCoordinator::new(
                Arc::clone(&host) as Arc<dyn CaptureHost>,
                delivery as Arc<dyn ArtifactDelivery>,
                EncodingProfile::Vp9Webm,
            );
            tauri::async_runtime::spawn(coordinator.run());

            // Mirror every snapshot change into a webview event.
            let mut snapshots = handle.subscribe();
            let events_app = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                loop {
                    let snapshot = snapshots.borrow_and_update().clone();
                    if events_app.emit(RECORDER_STATUS_EVENT, &snapshot).is_err() {
                        break;
                    }
                    if snapshots.changed().await.is_err() {
                        break;
                    }
                }
            });

            app.manage(RecorderState { handle, host });
            Ok(())
        })
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
