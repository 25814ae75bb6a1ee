//! Session Controller
//!
//! Composition root of the intake flow. Owns the session handle, the
//! explicit protocol state machine, the single pending question and the
//! fire-exactly-once completion callback, and wires the client, channel and
//! capture plumbing into one cooperative loop:
//!
//! ```text
//! start -> subscribe -> [question -> answer]* -> complete
//! ```
//!
//! Events are processed one at a time in arrival order. The pending
//! question is mutated only by the event handler and read only by the
//! submit path, so there is no shared-state race to reason about.

use serde_json::Value;

use crate::channel::{FollowupChannel, FollowupSource};
use crate::client::IntakeClient;
use crate::types::{Answer, Artifact, FollowupEvent, IntakeError, SessionId, StartOutcome};

/// Protocol state of one intake session, from the client's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No session yet; `start` has not succeeded.
    Idle,
    /// Waiting for the next push event (first event, or the event that
    /// follows a submitted answer).
    AwaitingEvent,
    /// A question is pending; waiting for the user's answer.
    AwaitingAnswer,
    /// Terminal: the schema was delivered and the subscription is closed.
    Completed,
    /// Terminal from the client's view: the push connection was lost
    /// before completion and the reconnect budget is exhausted.
    Disconnected,
}

/// The question currently shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuestion {
    /// Question text.
    pub question: String,
    /// The schema field the answer will resolve.
    pub missing_field: String,
}

/// One observable step of the intake loop, as seen by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    /// The server asked (or re-asked) a question; answer it via
    /// [`SessionController::submit_answer`].
    Question(PendingQuestion),
    /// The session is complete; carries the final schema.
    Completed(Value),
}

/// Callback invoked exactly once when the final schema arrives.
pub type CompletionCallback = Box<dyn FnOnce(&Value) + Send>;

/// Drives one intake session end to end.
pub struct SessionController {
    client: IntakeClient,
    session: Option<SessionId>,
    phase: Phase,
    pending: Option<PendingQuestion>,
    on_complete: Option<CompletionCallback>,
    schema: Option<Value>,
}

impl SessionController {
    /// Creates a controller over the given client.
    pub fn new(client: IntakeClient) -> Self {
        Self {
            client,
            session: None,
            phase: Phase::Idle,
            pending: None,
            on_complete: None,
            schema: None,
        }
    }

    /// Registers the completion callback. It fires exactly once, when the
    /// terminal `complete` event is processed.
    pub fn on_complete(mut self, callback: impl FnOnce(&Value) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Current protocol phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The session handle, once `start` has succeeded.
    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    /// The question currently awaiting an answer, if any.
    pub fn pending_question(&self) -> Option<&PendingQuestion> {
        self.pending.as_ref()
    }

    /// The final schema, once the session has completed.
    pub fn schema(&self) -> Option<&Value> {
        self.schema.as_ref()
    }

    /// Creates the session and, if supplied, attaches the artifact.
    ///
    /// The two requests are strictly sequential: the upload only begins
    /// after the start response delivered a session id, and is skipped
    /// entirely when no artifact is given. A failed upload does not discard
    /// the session; it is reported in the returned [`StartOutcome`] so the
    /// caller can notify the user and proceed.
    pub async fn start(
        &mut self,
        initial_text: &str,
        artifact: Option<Artifact>,
    ) -> Result<StartOutcome, IntakeError> {
        if self.session.is_some() {
            return Err(IntakeError::SessionCreation(
                "a session is already active on this controller".to_string(),
            ));
        }

        let session = self.client.start_session(initial_text).await?;

        let upload_error = match artifact {
            Some(artifact) => match self.client.upload_artifact(&session, artifact).await {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!(session_id = %session, error = %e,
                        "artifact attach failed, continuing without it");
                    Some(e)
                }
            },
            None => None,
        };

        self.session = Some(session.clone());
        self.phase = Phase::AwaitingEvent;

        Ok(StartOutcome {
            session,
            upload_error,
        })
    }

    /// Opens the follow-up channel for the started session.
    pub async fn subscribe(&self) -> Result<FollowupChannel, IntakeError> {
        let session = self.require_session()?;
        self.client.subscribe(session).await
    }

    /// Waits for the next turn of the conversation.
    ///
    /// On `need_followup` the pending question is set (replacing an
    /// unanswered one: last-one-wins, the policy does not queue questions)
    /// and returned. On `complete` the subscription is closed, the
    /// completion callback fires, and the final schema is returned; calling
    /// again afterwards returns the same completed turn without touching
    /// the source.
    pub async fn next_turn<S: FollowupSource>(
        &mut self,
        source: &mut S,
    ) -> Result<Turn, IntakeError> {
        match self.phase {
            Phase::Idle => {
                return Err(IntakeError::SessionCreation(
                    "start must succeed before consuming follow-ups".to_string(),
                ))
            }
            Phase::Completed => {
                let schema = self.schema.clone().unwrap_or(Value::Null);
                return Ok(Turn::Completed(schema));
            }
            Phase::Disconnected => {
                return Err(IntakeError::Disconnected(
                    "push channel is down; the session is stalled".to_string(),
                ))
            }
            Phase::AwaitingEvent | Phase::AwaitingAnswer => {}
        }

        match source.next_event().await {
            Ok(Some(FollowupEvent::NeedFollowup {
                question,
                missing_field,
            })) => {
                if let Some(old) = &self.pending {
                    tracing::warn!(
                        replaced_field = %old.missing_field, new_field = %missing_field,
                        "replacing unanswered pending question"
                    );
                }
                let pending = PendingQuestion {
                    question,
                    missing_field,
                };
                self.pending = Some(pending.clone());
                self.phase = Phase::AwaitingAnswer;
                Ok(Turn::Question(pending))
            }
            Ok(Some(FollowupEvent::Complete { current_schema })) => {
                source.close();
                self.pending = None;
                self.phase = Phase::Completed;
                self.schema = Some(current_schema.clone());
                if let Some(callback) = self.on_complete.take() {
                    callback(&current_schema);
                }
                tracing::debug!("intake session completed");
                Ok(Turn::Completed(current_schema))
            }
            Ok(None) => {
                // The source finished without a terminal event; from the
                // client's perspective the session is stalled.
                self.phase = Phase::Disconnected;
                Err(IntakeError::Disconnected(
                    "push channel closed before completion".to_string(),
                ))
            }
            Err(e) => {
                source.close();
                self.phase = Phase::Disconnected;
                Err(e)
            }
        }
    }

    /// Submits the user's answer to the currently pending question.
    ///
    /// The field tag is taken from the pending question, never from the
    /// caller. On success the question is retired and the controller waits
    /// for the next push event; on failure the question is kept so the
    /// user can retry with the same (or edited) text.
    pub async fn submit_answer(&mut self, answer_text: &str) -> Result<(), IntakeError> {
        let session = self.require_session()?.clone();
        let pending = self
            .pending
            .as_ref()
            .ok_or(IntakeError::NoPendingQuestion)?;

        let answer = Answer::new(session, pending.missing_field.clone(), answer_text);
        self.client.submit_answer(&answer).await?;

        self.pending = None;
        self.phase = Phase::AwaitingEvent;
        Ok(())
    }

    /// Tears the flow down without waiting for completion.
    ///
    /// Closes the subscription (mandatory on UI teardown, even when no
    /// `complete` was received). The session id and any pending question
    /// are kept: abandonment is a client-side act, the backend session
    /// simply goes unanswered.
    pub fn abandon<S: FollowupSource>(&self, source: &mut S) {
        source.close();
    }

    fn require_session(&self) -> Result<&SessionId, IntakeError> {
        self.session.as_ref().ok_or_else(|| {
            IntakeError::SessionCreation("no active session on this controller".to_string())
        })
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("session", &self.session)
            .field("phase", &self.phase)
            .field("pending", &self.pending)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
