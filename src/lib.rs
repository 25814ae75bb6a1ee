//! Idea Intake Client
//!
//! Client-side implementation of the idea-intake session protocol: create a
//! session from a raw idea (text, file, or recorded audio), receive
//! server-driven follow-up questions over a push channel, and feed answers
//! back until the backend reports the extracted schema complete.
//!
//! # Architecture
//!
//! - `types` — protocol data structures: `SessionId`, `Artifact`,
//!   `FollowupEvent`, `Answer`, and `IntakeError`
//! - `client` — `IntakeClient`: the one-shot HTTP requests (start, upload,
//!   answer) and the raw SSE subscribe request
//! - `channel` — `FollowupChannel`: SSE decoding, lifecycle and
//!   reconnection for the per-session push stream
//! - `controller` — `SessionController`: the protocol state machine,
//!   pending-question ownership and the completion callback
//! - `capture` — file and audio artifact capture, including the
//!   `idle -> recording -> idle` recorder
//!
//! # Usage
//!
//! ```rust,no_run
//! use idea_intake_client::{IntakeClient, SessionController, Turn};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = IntakeClient::new("http://localhost:8000")?;
//! let mut controller = SessionController::new(client)
//!     .on_complete(|schema| println!("schema: {schema}"));
//!
//! controller.start("build a marketplace for freelancers", None).await?;
//! let mut channel = controller.subscribe().await?;
//!
//! loop {
//!     match controller.next_turn(&mut channel).await? {
//!         Turn::Question(q) => {
//!             println!("{}", q.question);
//!             controller.submit_answer("freelance designers").await?;
//!         }
//!         Turn::Completed(_) => break,
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod channel;
pub mod client;
pub mod controller;
pub mod types;

// Re-export core types for convenient access
pub use capture::{artifact_from_file, AudioRecorder, CaptureError, RecorderState};
pub use channel::{FollowupChannel, FollowupSource};
pub use client::{IntakeClient, IntakeClientConfig, ReconnectPolicy};
pub use controller::{PendingQuestion, Phase, SessionController, Turn};
pub use types::{Answer, Artifact, FollowupEvent, IntakeError, SessionId, StartOutcome};
