//! Screen recording sink backed by an ffmpeg child process.
//!
//! ffmpeg grabs the chosen monitor, encodes with the session's profile, and
//! muxes the container to its stdout. A reader thread forwards stdout chunks
//! to the recorder's event channel in capture order and emits the terminal
//! stopped event at EOF, so every data event precedes it.

use std::io::{Read, Write};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use screenreel_core::error::SinkError;
use screenreel_core::recorder::{EncodingProfile, RecordingSink, SessionEvent};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::host::screen::ScreenTarget;

const READ_CHUNK_BYTES: usize = 64 * 1024;
const GRAB_FRAMERATE: u32 = 30;
const REAP_POLL: Duration = Duration::from_millis(100);
const REAP_ATTEMPTS: u32 = 50;

/// Encoder sink for one session.
///
/// `start` launches ffmpeg and the reader thread; `stop` asks ffmpeg to
/// finalize the container and lets the reader run through to EOF.
pub struct FfmpegSink {
    target: ScreenTarget,
    profile: EncodingProfile,
    session: Uuid,
    events: mpsc::Sender<SessionEvent>,
    process: Option<Child>,
    active: bool,
}

impl FfmpegSink {
    pub fn new(
        target: ScreenTarget,
        profile: EncodingProfile,
        session: Uuid,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            target,
            profile,
            session,
            events,
            process: None,
            active: false,
        }
    }

    fn spawn_encoder(&self) -> Result<Child, SinkError> {
        let args = encoder_args(&self.target, self.profile);
        tracing::info!("Starting ffmpeg screen encoder: {:?}", args);

        Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    SinkError::EncoderUnavailable("ffmpeg not found on PATH".to_string())
                }
                _ => SinkError::StartFailed(format!("failed to start ffmpeg: {}", e)),
            })
    }
}

#[async_trait]
impl RecordingSink for FfmpegSink {
    async fn start(&mut self) -> Result<(), SinkError> {
        let mut child = self.spawn_encoder()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            SinkError::StartFailed("failed to capture encoder stdout".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            SinkError::StartFailed("failed to capture encoder stderr".to_string())
        })?;

        let events = self.events.clone();
        let session = self.session;
        let spawned = std::thread::Builder::new()
            .name("encoder-reader".to_string())
            .spawn(move || reader_loop(stdout, stderr, events, session));
        if let Err(e) = spawned {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SinkError::StartFailed(format!(
                "failed to spawn reader thread: {}",
                e
            )));
        }

        self.process = Some(child);
        self.active = true;
        Ok(())
    }

    async fn stop(&mut self) {
        self.active = false;
        let Some(mut child) = self.process.take() else {
            return;
        };

        // 'q' asks ffmpeg to finalize the container; closing stdin says the
        // same thing. The reader thread sees the flush through to EOF and
        // emits the terminal stop event.
        if let Some(mut stdin) = child.stdin.take() {
            if stdin.write_all(b"q").is_err() {
                tracing::debug!("Encoder stdin already closed");
            }
        }

        tokio::task::spawn_blocking(move || reap(child));
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if let Some(mut child) = self.process.take() {
            tracing::debug!("Killing encoder left running by an aborted session");
            let _ = child.kill();
        }
    }
}

/// Forward encoder output to the event channel, then signal the stop.
fn reader_loop(
    mut stdout: ChildStdout,
    mut stderr: ChildStderr,
    events: mpsc::Sender<SessionEvent>,
    session: Uuid,
) {
    let mut buf = [0u8; READ_CHUNK_BYTES];
    loop {
        match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let segment = buf[..n].to_vec();
                if events
                    .blocking_send(SessionEvent::Data { session, segment })
                    .is_err()
                {
                    tracing::debug!("Recorder event channel closed, dropping encoder output");
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Encoder output read failed: {}", e);
                break;
            }
        }
    }

    let mut diagnostics = String::new();
    if stderr.read_to_string(&mut diagnostics).is_ok() {
        let diagnostics = diagnostics.trim();
        if !diagnostics.is_empty() {
            tracing::warn!("ffmpeg reported: {}", diagnostics);
        }
    }

    // EOF means the encoder has flushed everything it will ever produce.
    if events
        .blocking_send(SessionEvent::Stopped { session })
        .is_err()
    {
        tracing::debug!("Recorder event channel closed before the stop event");
    }
}

/// Wait briefly for a clean exit after the quit request, then kill.
fn reap(mut child: Child) {
    for _ in 0..REAP_ATTEMPTS {
        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!("Encoder exited with {}", status);
                return;
            }
            Ok(None) => std::thread::sleep(REAP_POLL),
            Err(e) => {
                tracing::warn!("Failed to poll encoder: {}", e);
                return;
            }
        }
    }

    tracing::warn!("Encoder ignored the quit request, killing it");
    let _ = child.kill();
    let _ = child.wait();
}

/// Build the ffmpeg invocation: grab `target`, encode with `profile`, and
/// stream the container to stdout.
fn encoder_args(target: &ScreenTarget, profile: EncodingProfile) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ];
    args.extend(grab_args(target));
    args.extend([
        "-c:v".to_string(),
        profile.video_codec().to_string(),
        "-deadline".to_string(),
        "realtime".to_string(),
        "-cpu-used".to_string(),
        "8".to_string(),
        "-crf".to_string(),
        "32".to_string(),
        "-b:v".to_string(),
        "0".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-c:a".to_string(),
        profile.audio_codec().to_string(),
        "-b:a".to_string(),
        "96k".to_string(),
        "-f".to_string(),
        profile.container().to_string(),
        "pipe:1".to_string(),
    ]);
    args
}

/// Capture inputs for the platform's grabber: screen video plus microphone.
#[cfg(target_os = "macos")]
fn grab_args(target: &ScreenTarget) -> Vec<String> {
    // avfoundation addresses screens by name in device order.
    vec![
        "-f".to_string(),
        "avfoundation".to_string(),
        "-capture_cursor".to_string(),
        "1".to_string(),
        "-framerate".to_string(),
        GRAB_FRAMERATE.to_string(),
        "-i".to_string(),
        format!("Capture screen {}:default", target.index),
    ]
}

#[cfg(target_os = "windows")]
fn grab_args(target: &ScreenTarget) -> Vec<String> {
    // TODO: add a dshow microphone input once audio device enumeration is
    // wired through; gdigrab carries no audio on its own.
    vec![
        "-f".to_string(),
        "gdigrab".to_string(),
        "-framerate".to_string(),
        GRAB_FRAMERATE.to_string(),
        "-offset_x".to_string(),
        target.x.to_string(),
        "-offset_y".to_string(),
        target.y.to_string(),
        "-video_size".to_string(),
        format!("{}x{}", target.width, target.height),
        "-i".to_string(),
        "desktop".to_string(),
    ]
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn grab_args(target: &ScreenTarget) -> Vec<String> {
    vec![
        "-f".to_string(),
        "x11grab".to_string(),
        "-framerate".to_string(),
        GRAB_FRAMERATE.to_string(),
        "-video_size".to_string(),
        format!("{}x{}", target.width, target.height),
        "-i".to_string(),
        format!(":0.0+{},{}", target.x, target.y),
        "-f".to_string(),
        "pulse".to_string(),
        "-i".to_string(),
        "default".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ScreenTarget {
        ScreenTarget {
            index: 0,
            title: "Main".to_string(),
            x: 1920,
            y: 0,
            width: 2560,
            height: 1440,
        }
    }

    #[test]
    fn encoder_streams_the_profile_container_to_stdout() {
        let args = encoder_args(&target(), EncodingProfile::Vp9Webm);
        assert!(args.contains(&"libvpx-vp9".to_string()));
        assert!(args.contains(&"libopus".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "webm"));
        assert_eq!(args.last(), Some(&"pipe:1".to_string()));
    }

    #[test]
    fn encoder_runs_quiet_and_realtime() {
        let args = encoder_args(&target(), EncodingProfile::Vp9Webm);
        assert!(args.windows(2).any(|w| w[0] == "-loglevel" && w[1] == "error"));
        assert!(args.windows(2).any(|w| w[0] == "-deadline" && w[1] == "realtime"));
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn grabber_uses_the_target_geometry() {
        let args = encoder_args(&target(), EncodingProfile::Vp9Webm);
        assert!(args.contains(&"2560x1440".to_string()));
    }
}
