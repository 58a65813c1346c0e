mod common;

use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use common::{Harness, PanickingExtractor, StubInference};
use docflow::error::{Error, ErrorClass};
use docflow::notifications::MpscPushChannel;
use docflow::processing::SubmitRequest;
use docflow::types::{EventKind, OwnerId, PushEvent, TaskKind, TaskStatus};

fn request(owner: i64, filename: &str, data: &[u8], kind: &str) -> SubmitRequest {
    SubmitRequest {
        owner: OwnerId(owner),
        filename: filename.to_string(),
        data: Bytes::copy_from_slice(data),
        task_kind: kind.to_string(),
    }
}

fn drain(rx: &mut tokio::sync::mpsc::Receiver<PushEvent>) -> Vec<PushEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn text_upload_completes_with_model_result() {
    let harness = Harness::new(StubInference::replying("OK"));
    let (channel, mut rx) = MpscPushChannel::new(16);
    harness.hub.register(OwnerId(42), Arc::new(channel));

    let task = harness
        .orchestrator
        .submit(request(42, "a.txt", b"hello", "summarize"))
        .await
        .expect("submission accepted");
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.file_size, 5);
    assert_eq!(task.kind, TaskKind::Summarize);
    assert!(task.result.is_none() && task.error.is_none());

    harness.orchestrator.wait_idle().await;

    let done = harness
        .orchestrator
        .get_status(OwnerId(42), task.id)
        .await
        .expect("task visible to owner");
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.result.as_deref(), Some("OK"));
    assert!(done.error.is_none());
    assert!(done.updated_at >= done.created_at);

    let events = drain(&mut rx);
    let kinds: Vec<EventKind> = events.iter().map(|e| e.event).collect();
    assert_eq!(kinds, vec![EventKind::Started, EventKind::Completed]);
    assert!(events.iter().all(|e| e.task_id == Some(task.id)));
    assert_eq!(events[1].status, Some(TaskStatus::Completed));

    assert_eq!(harness.inference.calls(), 1);
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn unknown_task_kind_is_rejected_before_anything_is_written() {
    let harness = Harness::new(StubInference::replying("OK"));

    let err = harness
        .orchestrator
        .submit(request(1, "a.txt", b"hello", "bogus"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTaskKind(ref kind) if kind == "bogus"));
    assert_eq!(err.class(), ErrorClass::Validation);

    harness.orchestrator.wait_idle().await;
    assert!(harness.store.is_empty());
    assert_eq!(harness.staged_files(), 0);
    assert_eq!(harness.inference.calls(), 0);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let harness = Harness::with_config(StubInference::replying("OK"), |config| {
        config.processing.max_file_size = 4;
    });

    let err = harness
        .orchestrator
        .submit(request(1, "a.txt", b"hello", "summarize"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PayloadTooLarge { size: 5, max: 4 }));
    assert!(harness.store.is_empty());

    // Exactly at the limit is fine
    harness
        .orchestrator
        .submit(request(1, "a.txt", b"four", "summarize"))
        .await
        .expect("limit is inclusive");
    harness.orchestrator.wait_idle().await;
}

#[tokio::test]
async fn corrupt_pdf_fails_without_calling_the_model() {
    let harness = Harness::new(StubInference::replying("OK"));
    let (channel, mut rx) = MpscPushChannel::new(16);
    harness.hub.register(OwnerId(3), Arc::new(channel));

    let task = harness
        .orchestrator
        .submit(request(3, "broken.pdf", b"%PDF-1.4 this is not a pdf", "qa"))
        .await
        .unwrap();
    harness.orchestrator.wait_idle().await;

    let failed = harness.orchestrator.get_status(OwnerId(3), task.id).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.result.is_none());
    let message = failed.error.expect("failure carries a message");
    assert!(message.contains("broken.pdf"), "{message}");

    assert_eq!(harness.inference.calls(), 0);
    let kinds: Vec<EventKind> = drain(&mut rx).iter().map(|e| e.event).collect();
    assert_eq!(kinds, vec![EventKind::Started, EventKind::Failed]);
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn unsupported_extension_fails_in_background() {
    let harness = Harness::new(StubInference::replying("OK"));

    let task = harness
        .orchestrator
        .submit(request(3, "image.png", b"\x89PNG", "summarize"))
        .await
        .expect("format is checked during execution");
    harness.orchestrator.wait_idle().await;

    let failed = harness.orchestrator.get_status(OwnerId(3), task.id).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error.unwrap().contains("Unsupported file type"));
    assert_eq!(harness.inference.calls(), 0);
}

#[tokio::test]
async fn blank_document_fails_as_empty_input() {
    let harness = Harness::new(StubInference::replying("OK"));

    let task = harness
        .orchestrator
        .submit(request(5, "blank.txt", b"   \n\t ", "sentiment"))
        .await
        .unwrap();
    harness.orchestrator.wait_idle().await;

    let failed = harness.orchestrator.get_status(OwnerId(5), task.id).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("File appears to be empty or unreadable."));
}

#[tokio::test]
async fn model_error_is_recorded_on_the_task() {
    let harness = Harness::new(StubInference::failing("rate limited"));

    let task = harness
        .orchestrator
        .submit(request(5, "a.md", b"# Title\nbody", "translate"))
        .await
        .unwrap();
    harness.orchestrator.wait_idle().await;

    let failed = harness.orchestrator.get_status(OwnerId(5), task.id).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error.unwrap().contains("rate limited"));
}

#[tokio::test]
async fn slow_model_times_out() {
    let harness = Harness::with_config(
        StubInference::slow("too late", Duration::from_secs(10)),
        |config| config.llm.timeout_secs = 1,
    );

    let task = harness
        .orchestrator
        .submit(request(8, "a.txt", b"hello", "summarize"))
        .await
        .unwrap();
    harness.orchestrator.wait_idle().await;

    let failed = harness.orchestrator.get_status(OwnerId(8), task.id).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("Inference timed out after 1s"));
    assert!(failed.result.is_none());
}

#[tokio::test]
async fn processing_does_not_depend_on_listeners() {
    let harness = Harness::new(StubInference::replying("OK"));

    // One owner with no channels, one with a channel that is already closed
    let (dead, rx) = MpscPushChannel::new(1);
    drop(rx);
    harness.hub.register(OwnerId(2), Arc::new(dead));

    let quiet = harness
        .orchestrator
        .submit(request(1, "a.txt", b"hello", "summarize"))
        .await
        .unwrap();
    let pruned = harness
        .orchestrator
        .submit(request(2, "b.txt", b"hello", "summarize"))
        .await
        .unwrap();
    harness.orchestrator.wait_idle().await;

    for (owner, id) in [(1, quiet.id), (2, pruned.id)] {
        let task = harness.orchestrator.get_status(OwnerId(owner), id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }
    assert_eq!(harness.hub.channel_count(OwnerId(2)), 0);
}

#[tokio::test]
async fn tasks_are_scoped_to_their_owner() {
    let harness = Harness::new(StubInference::replying("OK"));

    let task = harness
        .orchestrator
        .submit(request(10, "a.txt", b"hello", "summarize"))
        .await
        .unwrap();
    harness.orchestrator.wait_idle().await;

    let err = harness
        .orchestrator
        .get_status(OwnerId(11), task.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let missing = harness
        .orchestrator
        .get_status(OwnerId(10), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(missing, Error::NotFound(_)));

    assert!(harness
        .orchestrator
        .list_tasks(OwnerId(11), None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn list_is_newest_first_and_limited() {
    let harness = Harness::with_config(StubInference::replying("OK"), |config| {
        config.processing.max_list_limit = 2;
    });

    let mut ids = Vec::new();
    for name in ["one.txt", "two.txt", "three.txt"] {
        let task = harness
            .orchestrator
            .submit(request(4, name, b"hello", "summarize"))
            .await
            .unwrap();
        ids.push(task.id);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    harness.orchestrator.wait_idle().await;

    let all = harness.orchestrator.list_tasks(OwnerId(4), Some(100)).await.unwrap();
    assert_eq!(all.len(), 2, "limit is clamped to max_list_limit");
    assert_eq!(all[0].id, ids[2]);
    assert_eq!(all[1].id, ids[1]);

    let one = harness.orchestrator.list_tasks(OwnerId(4), Some(1)).await.unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].filename, "three.txt");

    assert!(harness
        .orchestrator
        .list_tasks(OwnerId(4), Some(0))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn client_paths_are_reduced_to_file_names() {
    let harness = Harness::new(StubInference::replying("OK"));

    let task = harness
        .orchestrator
        .submit(request(6, "../../etc/notes.txt", b"hello", "summarize"))
        .await
        .unwrap();
    assert_eq!(task.filename, "notes.txt");
    harness.orchestrator.wait_idle().await;
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn shutdown_refuses_new_submissions() {
    let harness = Harness::new(StubInference::replying("OK"));

    let task = harness
        .orchestrator
        .submit(request(9, "a.txt", b"hello", "summarize"))
        .await
        .unwrap();
    harness.orchestrator.shutdown(Duration::from_secs(5)).await;

    let done = harness.orchestrator.get_status(OwnerId(9), task.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(harness.orchestrator.in_flight(), 0);

    assert!(harness
        .orchestrator
        .submit(request(9, "b.txt", b"hello", "summarize"))
        .await
        .is_err());
}

#[tokio::test]
async fn store_outage_at_submit_is_a_persistence_error() {
    let harness = Harness::new(StubInference::replying("OK"));
    harness.faults.fail_create();

    let err = harness
        .orchestrator
        .submit(request(12, "a.txt", b"hello", "summarize"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Persistence(_)), "{err:?}");
    assert_eq!(err.to_string(), "Task store error: db down");
    assert_eq!(
        axum::response::IntoResponse::into_response(err).status(),
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    );

    harness.orchestrator.wait_idle().await;
    assert_eq!(harness.staged_files(), 0);
    assert_eq!(harness.orchestrator.in_flight(), 0);
    assert_eq!(harness.inference.calls(), 0);
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn lost_terminal_write_still_notifies_and_polling_shows_processing() {
    let harness = Harness::new(StubInference::replying("OK"));
    harness.faults.fail_terminal_writes();
    let (channel, mut rx) = MpscPushChannel::new(16);
    harness.hub.register(OwnerId(13), Arc::new(channel));

    let task = harness
        .orchestrator
        .submit(request(13, "a.txt", b"hello", "summarize"))
        .await
        .unwrap();
    harness.orchestrator.wait_idle().await;

    let events = drain(&mut rx);
    let kinds: Vec<EventKind> = events.iter().map(|e| e.event).collect();
    assert_eq!(kinds, vec![EventKind::Started, EventKind::Completed]);
    assert_eq!(events[1].status, Some(TaskStatus::Completed));

    let polled = harness.orchestrator.get_status(OwnerId(13), task.id).await.unwrap();
    assert_eq!(polled.status, TaskStatus::Processing);
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn submit_returns_before_a_slow_model_answers() {
    let harness = Harness::new(StubInference::slow("late", Duration::from_secs(3)));

    let started = Instant::now();
    let task = harness
        .orchestrator
        .submit(request(14, "a.txt", b"hello", "summarize"))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());
    assert_eq!(task.status, TaskStatus::Pending);

    let current = harness.orchestrator.get_status(OwnerId(14), task.id).await.unwrap();
    assert!(!current.status.is_terminal());

    harness.orchestrator.wait_idle().await;
    let done = harness.orchestrator.get_status(OwnerId(14), task.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.result.as_deref(), Some("late"));
}

#[tokio::test]
async fn panicking_model_marks_the_task_failed() {
    let harness = Harness::new(StubInference::panicking("model exploded"));
    let (channel, mut rx) = MpscPushChannel::new(16);
    harness.hub.register(OwnerId(15), Arc::new(channel));

    let task = harness
        .orchestrator
        .submit(request(15, "a.txt", b"hello", "summarize"))
        .await
        .unwrap();
    harness.orchestrator.wait_idle().await;

    let failed = harness.orchestrator.get_status(OwnerId(15), task.id).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(
        failed.error.as_deref(),
        Some("Internal error during processing: model exploded")
    );
    let kinds: Vec<EventKind> = drain(&mut rx).iter().map(|e| e.event).collect();
    assert_eq!(kinds, vec![EventKind::Started, EventKind::Failed]);
    assert_eq!(harness.staged_files(), 0);

    // The orchestrator keeps serving after a crashed run
    let next = harness
        .orchestrator
        .submit(request(15, "b.txt", b"hello", "summarize"))
        .await;
    assert!(next.is_ok());
    harness.orchestrator.wait_idle().await;
}

#[tokio::test]
async fn panicking_extractor_marks_the_task_failed() {
    let harness =
        Harness::with_extractor(StubInference::replying("OK"), Arc::new(PanickingExtractor));

    let task = harness
        .orchestrator
        .submit(request(16, "a.txt", b"hello", "summarize"))
        .await
        .unwrap();
    harness.orchestrator.wait_idle().await;

    let failed = harness.orchestrator.get_status(OwnerId(16), task.id).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error.unwrap().contains("extractor crashed"));
    assert_eq!(harness.inference.calls(), 0);
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn runs_cut_off_at_shutdown_are_recorded_as_failed() {
    let harness = Harness::new(StubInference::slow("never", Duration::from_secs(30)));
    let (channel, mut rx) = MpscPushChannel::new(16);
    harness.hub.register(OwnerId(17), Arc::new(channel));

    let task = harness
        .orchestrator
        .submit(request(17, "a.txt", b"hello", "summarize"))
        .await
        .unwrap();
    // Let the run reach the model before shutting down
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.orchestrator.shutdown(Duration::from_millis(100)).await;

    let failed = harness.orchestrator.get_status(OwnerId(17), task.id).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("Processing aborted at shutdown"));

    let kinds: Vec<EventKind> = drain(&mut rx).iter().map(|e| e.event).collect();
    assert_eq!(kinds, vec![EventKind::Started, EventKind::Failed]);
    assert_eq!(harness.orchestrator.in_flight(), 0);
    assert_eq!(harness.staged_files(), 0);
}
