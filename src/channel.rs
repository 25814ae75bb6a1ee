//! Follow-up Push Channel
//!
//! Subscribes to the per-session SSE stream and decodes pushes into typed
//! `FollowupEvent`s. The channel enforces the protocol lifecycle:
//!
//! - malformed messages are logged and skipped, never fatal
//! - `complete` is terminal: nothing is yielded after it
//! - close is explicit and idempotent
//! - a dropped connection is retried per the configured reconnect policy;
//!   once the budget is exhausted the channel yields one `Disconnected`
//!   error and stays closed

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::client::{IntakeClient, SseByteStream};
use crate::types::{FollowupEvent, IntakeError, SessionId};

// ============================================================================
// SSE Decoding
// ============================================================================

/// Incremental decoder from raw SSE bytes to follow-up events.
///
/// Buffers chunk fragments until a full line is available, then decodes
/// `data:` lines as JSON events. Comments (`:`), non-data fields
/// (`event:`, `id:`, `retry:`) and blank separator lines are skipped.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Consumes one chunk of the byte stream, returning every event (or
    /// protocol error) completed by it. A single chunk may carry zero, one
    /// or several events.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<Result<FollowupEvent, IntakeError>> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut out = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            if let Some(item) = decode_line(line.trim_end_matches(|c| c == '\n' || c == '\r')) {
                out.push(item);
            }
        }
        out
    }

    /// Flushes a trailing line that arrived without a final newline.
    /// Called when the underlying stream ends.
    pub(crate) fn finish(&mut self) -> Option<Result<FollowupEvent, IntakeError>> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(rest.trim_end_matches('\r'))
    }
}

/// Decodes a single SSE line into an optional event.
///
/// Returns `None` for lines that carry no payload, `Some(Err(...))` for
/// `data:` lines whose JSON is malformed or whose `status` is unknown.
fn decode_line(line: &str) -> Option<Result<FollowupEvent, IntakeError>> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let Some(rest) = line.strip_prefix("data:") else {
        // Non-data SSE fields (event:, id:, retry:) carry no payload here.
        return None;
    };
    let payload = rest.strip_prefix(' ').unwrap_or(rest);

    match serde_json::from_str::<FollowupEvent>(payload) {
        Ok(event) => Some(Ok(event)),
        Err(e) => Some(Err(IntakeError::Protocol(format!(
            "unrecognized push message: {} (payload: {})",
            e, payload
        )))),
    }
}

// ============================================================================
// Follow-up Source
// ============================================================================

/// Source of follow-up events for one session.
///
/// The session controller consumes this seam rather than the concrete
/// channel, so the protocol loop can be driven by scripted events in tests.
#[async_trait]
pub trait FollowupSource: Send {
    /// Waits for the next decoded event.
    ///
    /// `Ok(None)` means the source is finished (closed, or terminal
    /// `complete` already delivered). Protocol errors are handled
    /// internally; an `Err` is only returned when the connection is lost
    /// for good.
    async fn next_event(&mut self) -> Result<Option<FollowupEvent>, IntakeError>;

    /// Tears the subscription down. Must be idempotent.
    fn close(&mut self);
}

// ============================================================================
// Follow-up Channel
// ============================================================================

/// The live SSE subscription for one session.
///
/// Exactly one channel should exist per session. Dropping the channel (or
/// calling [`FollowupSource::close`]) releases the connection; both must
/// happen on UI teardown even if no `complete` event was ever received.
pub struct FollowupChannel {
    client: IntakeClient,
    session: SessionId,
    stream: Option<SseByteStream>,
    decoder: SseDecoder,
    pending: VecDeque<Result<FollowupEvent, IntakeError>>,
    reconnects_used: u32,
    completed: bool,
    closed: bool,
}

impl FollowupChannel {
    /// Opens the subscription, connecting immediately.
    ///
    /// The initial connect is not covered by the reconnect budget; its
    /// failure surfaces directly to the caller.
    pub(crate) async fn open(
        client: IntakeClient,
        session: SessionId,
    ) -> Result<Self, IntakeError> {
        let stream = client.open_followup_stream(&session).await?;
        tracing::debug!(session_id = %session, "follow-up channel opened");

        Ok(Self {
            client,
            session,
            stream: Some(stream),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            reconnects_used: 0,
            completed: false,
            closed: false,
        })
    }

    /// The session this channel belongs to.
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Whether the terminal `complete` event has been delivered.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Whether the channel has been closed (explicitly or by exhausting
    /// the reconnect budget).
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Pops decoded items until one is a valid event, logging and skipping
    /// protocol errors. The channel stays open across malformed pushes.
    fn pop_valid_event(&mut self) -> Option<FollowupEvent> {
        while let Some(item) = self.pending.pop_front() {
            match item {
                Ok(event) => return Some(event),
                Err(e) => {
                    tracing::warn!(session_id = %self.session, error = %e,
                        "ignoring malformed push message");
                }
            }
        }
        None
    }

    /// Handles the end of the current connection: flushes the decoder and
    /// drops the stream so the next poll goes through the reconnect path.
    fn on_stream_end(&mut self) {
        if let Some(item) = self.decoder.finish() {
            self.pending.push_back(item);
        }
        self.stream = None;
    }
}

#[async_trait]
impl FollowupSource for FollowupChannel {
    async fn next_event(&mut self) -> Result<Option<FollowupEvent>, IntakeError> {
        loop {
            if self.closed || self.completed {
                return Ok(None);
            }

            if let Some(event) = self.pop_valid_event() {
                // Any successfully decoded event proves the connection is
                // healthy again.
                self.reconnects_used = 0;
                if let FollowupEvent::Complete { .. } = event {
                    self.completed = true;
                    self.stream = None;
                    self.pending.clear();
                }
                return Ok(Some(event));
            }

            if self.stream.is_none() {
                let policy = self.client.config().reconnect.clone();
                if self.reconnects_used >= policy.max_attempts {
                    self.closed = true;
                    return Err(IntakeError::Disconnected(format!(
                        "push connection for session {} lost before completion",
                        self.session
                    )));
                }
                self.reconnects_used += 1;
                tracing::warn!(session_id = %self.session,
                    attempt = self.reconnects_used, max = policy.max_attempts,
                    "push connection lost, reconnecting");
                tokio::time::sleep(policy.delay).await;

                match self.client.open_followup_stream(&self.session).await {
                    Ok(stream) => self.stream = Some(stream),
                    Err(e) => {
                        tracing::warn!(session_id = %self.session, error = %e,
                            "reconnect attempt failed");
                        continue;
                    }
                }
            }

            // Invariant: stream is Some here.
            let next = match self.stream.as_mut() {
                Some(stream) => stream.next().await,
                None => continue,
            };

            match next {
                Some(Ok(chunk)) => {
                    let items = self.decoder.feed(&chunk);
                    self.pending.extend(items);
                }
                Some(Err(e)) => {
                    tracing::warn!(session_id = %self.session, error = %e,
                        "push stream read error");
                    self.on_stream_end();
                }
                None => self.on_stream_end(),
            }
        }
    }

    fn close(&mut self) {
        if !self.closed {
            tracing::debug!(session_id = %self.session, "follow-up channel closed");
        }
        self.closed = true;
        self.stream = None;
        self.pending.clear();
    }
}

impl std::fmt::Debug for FollowupChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FollowupChannel")
            .field("session", &self.session)
            .field("completed", &self.completed)
            .field("closed", &self.closed)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
