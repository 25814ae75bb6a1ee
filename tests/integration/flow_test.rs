//! Conversation Flow Tests
//!
//! Drives the session controller through complete intake conversations:
//! the canonical start -> question -> answer -> complete scenario, the
//! upload ordering invariant, non-fatal upload failures, and teardown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use idea_intake_client::{
    AudioRecorder, FollowupEvent, IntakeClient, Phase, SessionController, Turn,
};

use super::support::{
    assert_request_contains, error_response, json_response, serve_responses, ScriptedSource,
};

fn need_followup(question: &str, field: &str) -> FollowupEvent {
    FollowupEvent::NeedFollowup {
        question: question.to_string(),
        missing_field: field.to_string(),
    }
}

#[tokio::test]
async fn test_full_intake_scenario() {
    // Backend: start response, then the answer acknowledgment.
    let (addr, mut requests) = serve_responses(vec![
        json_response(r#"{"session_id":"s1"}"#),
        json_response(r#"{"ok":true}"#),
    ])
    .await;

    let fired = Arc::new(AtomicUsize::new(0));
    let fired_clone = fired.clone();

    let client = IntakeClient::new(format!("http://{}", addr)).unwrap();
    let mut controller = SessionController::new(client).on_complete(move |schema| {
        assert_eq!(schema["target_customer"], "freelance designers");
        fired_clone.fetch_add(1, Ordering::SeqCst);
    });

    let outcome = controller
        .start("build a marketplace for freelancers", None)
        .await
        .unwrap();
    assert_eq!(outcome.session.as_str(), "s1");
    assert!(outcome.upload_error.is_none());

    let start_request = requests.recv().await.unwrap();
    assert_request_contains(&start_request, "POST /api/intake/start");
    assert_request_contains(&start_request, "name=\"initial_text\"");
    assert_request_contains(&start_request, "build a marketplace for freelancers");

    let schema = json!({"target_customer": "freelance designers"});
    let mut source = ScriptedSource::new(vec![
        Ok(Some(need_followup(
            "Who is your target customer?",
            "target_customer",
        ))),
        Ok(Some(FollowupEvent::Complete {
            current_schema: schema.clone(),
        })),
    ]);

    // First push: a question becomes pending.
    let turn = controller.next_turn(&mut source).await.unwrap();
    match turn {
        Turn::Question(q) => assert_eq!(q.missing_field, "target_customer"),
        _ => panic!("Expected Question"),
    }

    // The answer carries the session id and the pending field tag.
    controller.submit_answer("freelance designers").await.unwrap();
    let answer_request = requests.recv().await.unwrap();
    assert_request_contains(&answer_request, "POST /api/intake/answer");
    assert_request_contains(&answer_request, "name=\"session_id\"");
    assert_request_contains(&answer_request, "s1");
    assert_request_contains(&answer_request, "name=\"field\"");
    assert_request_contains(&answer_request, "target_customer");
    assert_request_contains(&answer_request, "freelance designers");

    // The answered question is retired.
    assert!(controller.pending_question().is_none());
    assert_eq!(controller.phase(), Phase::AwaitingEvent);

    // Final push: completion fires the callback exactly once and closes
    // the subscription.
    let turn = controller.next_turn(&mut source).await.unwrap();
    assert_eq!(turn, Turn::Completed(schema.clone()));
    assert_eq!(source.closes, 1);
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // Idempotent: re-polling a completed session changes nothing.
    let turn = controller.next_turn(&mut source).await.unwrap();
    assert_eq!(turn, Turn::Completed(schema));
    assert_eq!(source.closes, 1);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_upload_follows_successful_start() {
    let (addr, mut requests) = serve_responses(vec![
        json_response(r#"{"session_id":"s2"}"#),
        json_response(r#"{"ok":true}"#),
    ])
    .await;

    let client = IntakeClient::new(format!("http://{}", addr)).unwrap();
    let mut controller = SessionController::new(client);

    let mut recorder = AudioRecorder::new();
    recorder.start().unwrap();
    recorder.push_chunk(&b"opus-frames"[..]);
    let artifact = recorder.stop().unwrap();

    let outcome = controller.start("", Some(artifact)).await.unwrap();
    assert!(outcome.upload_error.is_none());

    // Ordering invariant: the start request strictly precedes the upload,
    // and the upload carries the freshly issued session id.
    let first = requests.recv().await.unwrap();
    assert_request_contains(&first, "POST /api/intake/start");

    let second = requests.recv().await.unwrap();
    assert_request_contains(&second, "POST /api/intake/upload");
    assert_request_contains(&second, "name=\"session_id\"");
    assert_request_contains(&second, "s2");
    assert_request_contains(&second, "filename=\"idea.webm\"");
    assert_request_contains(&second, "opus-frames");
}

#[tokio::test]
async fn test_failed_upload_keeps_session_usable() {
    let (addr, _requests) = serve_responses(vec![
        json_response(r#"{"session_id":"s3"}"#),
        error_response(500, "Internal Server Error", "storage unavailable"),
    ])
    .await;

    let client = IntakeClient::new(format!("http://{}", addr)).unwrap();
    let mut controller = SessionController::new(client);

    let mut recorder = AudioRecorder::new();
    recorder.start().unwrap();
    recorder.push_chunk(&b"audio"[..]);
    let artifact = recorder.stop().unwrap();

    let outcome = controller.start("an idea", Some(artifact)).await.unwrap();

    // The session survives the failed attach; the error is reported.
    assert_eq!(outcome.session.as_str(), "s3");
    assert!(outcome.upload_error.is_some());
    assert_eq!(controller.session().unwrap().as_str(), "s3");
    assert_eq!(controller.phase(), Phase::AwaitingEvent);
}

#[tokio::test]
async fn test_stop_without_start_causes_no_upload() {
    // Only the start request is served; any second request would hang the
    // client, so reaching the assertions proves no upload was attempted.
    let (addr, mut requests) =
        serve_responses(vec![json_response(r#"{"session_id":"s4"}"#)]).await;

    let client = IntakeClient::new(format!("http://{}", addr)).unwrap();
    let mut controller = SessionController::new(client);

    let mut recorder = AudioRecorder::new();
    let artifact = recorder.stop();
    assert!(artifact.is_none());

    controller.start("typed idea only", artifact).await.unwrap();

    let first = requests.recv().await.unwrap();
    assert_request_contains(&first, "POST /api/intake/start");
    assert!(requests.try_recv().is_err());
}

#[tokio::test]
async fn test_reissued_field_becomes_pending_again() {
    let (addr, _requests) = serve_responses(vec![
        json_response(r#"{"session_id":"s5"}"#),
        json_response(r#"{"ok":true}"#),
    ])
    .await;

    let client = IntakeClient::new(format!("http://{}", addr)).unwrap();
    let mut controller = SessionController::new(client);
    controller.start("an idea", None).await.unwrap();

    let mut source = ScriptedSource::new(vec![
        Ok(Some(need_followup("Who is it for?", "target_customer"))),
        // The backend re-asks the same field after a vague answer.
        Ok(Some(need_followup(
            "Could you be more specific about the customer?",
            "target_customer",
        ))),
    ]);

    controller.next_turn(&mut source).await.unwrap();
    controller.submit_answer("people").await.unwrap();
    assert!(controller.pending_question().is_none());

    let turn = controller.next_turn(&mut source).await.unwrap();
    match turn {
        Turn::Question(q) => {
            assert_eq!(q.missing_field, "target_customer");
            assert!(q.question.contains("more specific"));
        }
        _ => panic!("Expected Question"),
    }
}

#[tokio::test]
async fn test_abandon_mid_conversation() {
    let (addr, _requests) =
        serve_responses(vec![json_response(r#"{"session_id":"s6"}"#)]).await;

    let client = IntakeClient::new(format!("http://{}", addr)).unwrap();
    let mut controller = SessionController::new(client);
    controller.start("an idea", None).await.unwrap();

    let mut source = ScriptedSource::new(vec![Ok(Some(need_followup(
        "Who is it for?",
        "target_customer",
    )))]);
    controller.next_turn(&mut source).await.unwrap();

    controller.abandon(&mut source);
    assert_eq!(source.closes, 1);
    // The pending question text is not lost on teardown.
    assert_eq!(
        controller.pending_question().unwrap().question,
        "Who is it for?"
    );
}
