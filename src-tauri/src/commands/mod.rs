//! Tauri command handlers
//!
//! IPC command handlers callable from the webview through Tauri's invoke
//! system.

pub mod recording;
