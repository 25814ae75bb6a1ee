//! Intake HTTP Client
//!
//! One-shot request plumbing for the intake protocol: session creation,
//! artifact upload and answer submission are multipart form POSTs; the
//! follow-up subscription is a long-lived GET returning an SSE byte stream.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use reqwest::multipart::{Form, Part};

use crate::channel::FollowupChannel;
use crate::types::{Answer, Artifact, IntakeError, SessionId, StartResponse};

/// Default timeout for one-shot requests, in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default connect timeout for the push subscription, in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Raw SSE byte stream returned by the subscribe request.
pub(crate) type SseByteStream =
    Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Reconnection policy for the follow-up push channel.
///
/// A dropped connection before `complete` is retried with a fixed delay up
/// to `max_attempts` times; the attempt counter resets after any
/// successfully decoded event. `max_attempts = 0` disables reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive reconnect attempts before giving up.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Configuration for the intake client.
#[derive(Debug, Clone)]
pub struct IntakeClientConfig {
    /// Base URL of the intake backend (e.g. `http://localhost:8000`).
    pub base_url: String,
    /// Timeout applied to one-shot requests. The push subscription is
    /// exempt (long-lived by design) and only bounded by `connect_timeout`.
    pub timeout: Duration,
    /// Connect timeout for all requests, including the subscription.
    pub connect_timeout: Duration,
    /// Optional bearer token forwarded on every request.
    pub auth_token: Option<String>,
    /// Reconnection policy for the follow-up channel.
    pub reconnect: ReconnectPolicy,
}

impl IntakeClientConfig {
    /// Creates a configuration for the given backend with default policies.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

impl Default for IntakeClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            auth_token: None,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// HTTP client for the intake session protocol.
///
/// Cheap to clone; the follow-up channel holds a clone so it can reopen
/// the subscription when reconnecting.
#[derive(Clone)]
pub struct IntakeClient {
    client: reqwest::Client,
    config: IntakeClientConfig,
}

impl IntakeClient {
    /// Creates a client for the given backend with default configuration.
    pub fn new(base_url: impl Into<String>) -> Result<Self, IntakeError> {
        Self::with_config(IntakeClientConfig::new(base_url))
    }

    /// Creates a client with the given configuration.
    pub fn with_config(config: IntakeClientConfig) -> Result<Self, IntakeError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| IntakeError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Creates a client wrapping an existing `reqwest::Client`.
    ///
    /// Useful for testing or when the caller wants to control the transport
    /// configuration (e.g. custom TLS, proxy settings).
    pub fn with_reqwest_client(client: reqwest::Client, config: IntakeClientConfig) -> Self {
        Self { client, config }
    }

    /// The active configuration.
    pub fn config(&self) -> &IntakeClientConfig {
        &self.config
    }

    /// Creates a session from the initial free-text description.
    ///
    /// The text may be empty when an artifact carries the idea instead;
    /// that choice belongs to the caller and is not validated here.
    ///
    /// # Errors
    /// Any failure here is fatal to the flow: without a session id no
    /// subsequent call can proceed.
    pub async fn start_session(&self, initial_text: &str) -> Result<SessionId, IntakeError> {
        let form = Form::new().text("initial_text", initial_text.to_string());

        let response = self
            .post_form("/api/intake/start", form)
            .await
            .map_err(|e| IntakeError::SessionCreation(e.to_string()))?;

        let start: StartResponse = response
            .json()
            .await
            .map_err(|e| IntakeError::SessionCreation(format!("invalid response body: {}", e)))?;

        tracing::debug!(session_id = %start.session_id, "intake session created");
        Ok(start.session_id)
    }

    /// Attaches an artifact to an existing session.
    ///
    /// Must only be called with a session id returned by a successful
    /// `start_session`; the upload request always follows session creation.
    pub async fn upload_artifact(
        &self,
        session: &SessionId,
        artifact: Artifact,
    ) -> Result<(), IntakeError> {
        let part = Part::bytes(artifact.data.to_vec())
            .file_name(artifact.file_name.clone())
            .mime_str(&artifact.content_type)
            .map_err(|e| {
                IntakeError::ArtifactUpload(format!(
                    "invalid content type {:?}: {}",
                    artifact.content_type, e
                ))
            })?;

        let form = Form::new()
            .text("session_id", session.to_string())
            .part("file", part);

        self.post_form("/api/intake/upload", form)
            .await
            .map_err(|e| IntakeError::ArtifactUpload(e.to_string()))?;

        tracing::debug!(session_id = %session, file = %artifact.file_name, "artifact uploaded");
        Ok(())
    }

    /// Submits a field-scoped answer back into the session.
    ///
    /// The backend processes the answer asynchronously and pushes the next
    /// `need_followup` or `complete` event on the existing follow-up
    /// channel; the call itself only acknowledges receipt.
    pub async fn submit_answer(&self, answer: &Answer) -> Result<(), IntakeError> {
        let form = Form::new()
            .text("session_id", answer.session_id.to_string())
            .text("answer_text", answer.answer_text.clone())
            .text("field", answer.field.clone());

        self.post_form("/api/intake/answer", form)
            .await
            .map_err(|e| IntakeError::AnswerSubmission(e.to_string()))?;

        tracing::debug!(session_id = %answer.session_id, field = %answer.field, "answer submitted");
        Ok(())
    }

    /// Opens the per-session follow-up push channel.
    ///
    /// Exactly one subscription should exist per session; the returned
    /// channel owns the connection and reconnects per the configured policy.
    pub async fn subscribe(&self, session: &SessionId) -> Result<FollowupChannel, IntakeError> {
        FollowupChannel::open(self.clone(), session.clone()).await
    }

    /// Issues the raw subscribe request and returns the SSE byte stream.
    pub(crate) async fn open_followup_stream(
        &self,
        session: &SessionId,
    ) -> Result<SseByteStream, IntakeError> {
        let mut req = self
            .client
            .get(self.endpoint("/api/intake/followups"))
            .query(&[("session_id", session.as_str())]);

        if let Some(ref token) = self.config.auth_token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await?;
        let status = response.status().as_u16();

        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(IntakeError::Http { status, body });
        }

        Ok(Box::pin(response.bytes_stream()))
    }

    /// Sends a multipart POST and checks the status, without interpreting
    /// the body. Operation-scoped error mapping happens at the call sites.
    async fn post_form(&self, path: &str, form: Form) -> Result<reqwest::Response, IntakeError> {
        let mut req = self
            .client
            .post(self.endpoint(path))
            .timeout(self.config.timeout)
            .multipart(form);

        if let Some(ref token) = self.config.auth_token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await?;
        let status = response.status().as_u16();

        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(IntakeError::Http { status, body });
        }

        Ok(response)
    }

    /// Joins the base URL and a path, tolerating trailing slashes.
    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

impl std::fmt::Debug for IntakeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntakeClient")
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
