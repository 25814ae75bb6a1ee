//! Intake Protocol Types
//!
//! Defines the core data structures for the idea-intake session protocol:
//! - `SessionId`: opaque handle for one intake session
//! - `Artifact`: a named byte payload attached to a session
//! - `FollowupEvent`: server push events (`need_followup` / `complete`)
//! - `Answer`: a field-scoped answer fed back into the session
//! - `IntakeError`: protocol-level error types

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// Session Handle
// ============================================================================

/// Opaque identifier for one intake session, created server-side.
///
/// Every request after session creation carries this handle; it is the
/// transaction boundary of the protocol. Passing the typed handle (rather
/// than a loose string) ties each call site to a session explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps a server-issued session identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response body of the start-session request.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StartResponse {
    pub session_id: SessionId,
}

// ============================================================================
// Artifact
// ============================================================================

/// A named byte payload representing one user-supplied input unit —
/// an uploaded document or a finalized audio recording.
///
/// Typed text is not an artifact; it travels as the `initial_text` form
/// field of session creation (or as an answer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File name sent with the upload (e.g. `pitch.pdf`, `idea.webm`).
    pub file_name: String,
    /// MIME content type of the payload.
    pub content_type: String,
    /// The raw payload bytes.
    pub data: Bytes,
}

impl Artifact {
    /// Creates an artifact from an in-memory payload.
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ============================================================================
// Push Events
// ============================================================================

/// A single event from the per-session follow-up push stream.
///
/// Classified by the `status` discriminator of the JSON payload. Any other
/// status is a protocol error: logged and skipped, never fatal to the
/// channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FollowupEvent {
    /// The server requests one more datum.
    NeedFollowup {
        /// Question text to show the user.
        question: String,
        /// The schema field this question resolves.
        missing_field: String,
    },
    /// Terminal event: the extracted schema is complete.
    ///
    /// Once observed, no further events are meaningful and the subscription
    /// must be torn down by the consumer.
    Complete {
        /// The fully resolved structured result, passed through untouched.
        current_schema: Value,
    },
}

// ============================================================================
// Answer
// ============================================================================

/// A free-text answer scoped to exactly one `missing_field` previously
/// announced by a `need_followup` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// The session the answer belongs to.
    pub session_id: SessionId,
    /// Must equal the `missing_field` of the currently pending question.
    pub field: String,
    /// The user's free-text answer.
    pub answer_text: String,
}

impl Answer {
    /// Builds an answer for the given session and field.
    pub fn new(
        session_id: SessionId,
        field: impl Into<String>,
        answer_text: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            field: field.into(),
            answer_text: answer_text.into(),
        }
    }
}

// ============================================================================
// Start Outcome
// ============================================================================

/// Result of starting a session with an optional artifact attach.
///
/// Session creation failure is fatal and surfaces as an `Err` instead; a
/// failed artifact attach is non-fatal (the session already exists) and is
/// reported here without discarding the session handle.
#[derive(Debug)]
pub struct StartOutcome {
    /// The newly created session.
    pub session: SessionId,
    /// Error from the artifact-attach step, if one was requested and failed.
    pub upload_error: Option<IntakeError>,
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during intake protocol operations.
#[derive(Error, Debug)]
pub enum IntakeError {
    /// Session creation failed. Fatal: there is no session to proceed with.
    #[error("session creation failed: {0}")]
    SessionCreation(String),

    /// Artifact upload failed. Recoverable: the session remains usable.
    #[error("artifact upload failed: {0}")]
    ArtifactUpload(String),

    /// Answer submission failed. Recoverable: the pending question is kept
    /// so the caller can retry.
    #[error("answer submission failed: {0}")]
    AnswerSubmission(String),

    /// HTTP transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// A one-shot request exceeded its timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Non-success HTTP status.
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// Failed to parse a response body.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Malformed or unknown push message. Logged and skipped by the
    /// channel; never tears the subscription down.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The push connection was lost before completion and the reconnect
    /// budget is exhausted.
    #[error("push channel disconnected: {0}")]
    Disconnected(String),

    /// An answer was submitted while no question is pending.
    #[error("no pending question to answer")]
    NoPendingQuestion,
}

impl From<reqwest::Error> for IntakeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            IntakeError::Timeout(err.to_string())
        } else if err.is_connect() {
            IntakeError::Network(format!("connection failed: {}", err))
        } else {
            IntakeError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for IntakeError {
    fn from(err: serde_json::Error) -> Self {
        IntakeError::InvalidResponse(format!("JSON parse error: {}", err))
    }
}

// ============================================================================
// Tests
// ============================================================================
