//! Artifact Capture
//!
//! Turns user inputs into transferable [`Artifact`]s. Typed text is not
//! captured here — it travels as the `initial_text` field of session
//! creation. This module covers the two binary sources:
//!
//! - a selected file, used verbatim with a guessed content type
//! - a recorded audio clip, finalized by the [`AudioRecorder`] state machine

use std::path::Path;

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::types::Artifact;

/// Content type for finalized audio recordings.
pub const AUDIO_CONTENT_TYPE: &str = "audio/webm";

/// File name for finalized audio recordings.
pub const AUDIO_FILE_NAME: &str = "idea.webm";

/// Errors from artifact capture.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// `start` was called while a recording is already in progress.
    /// The in-progress recording is left untouched.
    #[error("a recording is already in progress")]
    AlreadyRecording,

    /// Reading the selected file failed.
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds an artifact from a file on disk, used verbatim.
///
/// The content type is guessed from the extension, falling back to
/// `application/octet-stream`.
pub async fn artifact_from_file(path: impl AsRef<Path>) -> Result<Artifact, CaptureError> {
    let path = path.as_ref();
    let data = tokio::fs::read(path).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let content_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string();

    Ok(Artifact::new(file_name, content_type, data))
}

/// Recorder lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecorderState {
    /// Not recording; `stop` is a no-op.
    #[default]
    Idle,
    /// Capturing; chunks pushed now are part of the recording.
    Recording,
}

/// Audio capture state machine: `idle -> recording -> idle`.
///
/// `start` begins a capture and resets any previously buffered audio;
/// `stop` finalizes exactly one artifact from the concatenated chunks.
/// Encoding is out of scope: the recorder concatenates caller-provided
/// chunks as-is and tags them `audio/webm`.
#[derive(Debug, Default)]
pub struct AudioRecorder {
    state: RecorderState,
    chunks: Vec<Bytes>,
}

impl AudioRecorder {
    /// Creates an idle recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Whether a capture is in progress.
    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    /// Begins a capture, discarding any audio buffered by a previous one.
    ///
    /// # Errors
    /// Starting while already recording is a caller error; the in-progress
    /// recording is not disturbed.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.is_recording() {
            return Err(CaptureError::AlreadyRecording);
        }
        self.chunks.clear();
        self.state = RecorderState::Recording;
        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Appends one chunk of captured audio. Chunks arriving while idle are
    /// not part of any recording and are dropped.
    pub fn push_chunk(&mut self, chunk: impl Into<Bytes>) {
        if !self.is_recording() {
            tracing::debug!("dropping audio chunk received while idle");
            return;
        }
        self.chunks.push(chunk.into());
    }

    /// Ends the capture and finalizes the recording as one artifact.
    ///
    /// Returns `None` when no capture is in progress (`stop` without a
    /// prior `start` is a no-op and must not trigger an upload).
    pub fn stop(&mut self) -> Option<Artifact> {
        if !self.is_recording() {
            return None;
        }
        self.state = RecorderState::Idle;

        let mut data = BytesMut::with_capacity(self.chunks.iter().map(Bytes::len).sum());
        for chunk in self.chunks.drain(..) {
            data.extend_from_slice(&chunk);
        }

        tracing::debug!(bytes = data.len(), "audio capture finalized");
        Some(Artifact::new(
            AUDIO_FILE_NAME,
            AUDIO_CONTENT_TYPE,
            data.freeze(),
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================
