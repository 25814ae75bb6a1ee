//! Integration Tests Module
//!
//! End-to-end tests for the intake session protocol:
//! - full conversation flow (start, follow-ups, answers, completion)
//! - HTTP request/response plumbing against a loopback stub backend
//! - push channel lifecycle: decoding, disconnects and reconnection
//!
//! No live backend is required; the stub speaks just enough HTTP/1.1 and
//! SSE to drive the client.


// Conversation flow tests (controller + scripted/stubbed sources)
mod flow_test;
