mod common;

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use clipcast_core::error::ClientError;
use clipcast_core::model::TaskStatus;
use clipcast_core::task_list::{TaskAction, TaskListView};
use clipcast_core::ApiClient;
use common::{MockTransport, Reply, task_record};
use serde_json::json;

fn view(mock: &Arc<MockTransport>) -> TaskListView<MockTransport> {
    TaskListView::new(ApiClient::from_shared(Arc::clone(mock)))
}

#[tokio::test]
async fn rows_carry_status_actions() {
    let mock = MockTransport::new();
    mock.ok(
        "GET /tasks",
        json!({ "items": [
            task_record("A", "completed", 100.0),
            task_record("B", "processing", 41.6),
            task_record("C", "queued", 0.0),
            task_record("D", "failed", 12.0),
            task_record("E", "canceled", 3.0),
        ]}),
    );

    let rows = view(&mock).refresh().await.unwrap();
    let summary: Vec<(&str, TaskStatus, u8, Option<TaskAction>)> = rows
        .iter()
        .map(|r| (r.id.as_str(), r.status, r.progress, r.action))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("A", TaskStatus::Completed, 100, Some(TaskAction::Download)),
            ("B", TaskStatus::Processing, 42, Some(TaskAction::Cancel)),
            ("C", TaskStatus::Queued, 0, Some(TaskAction::Cancel)),
            ("D", TaskStatus::Failed, 12, None),
            ("E", TaskStatus::Canceled, 3, None),
        ]
    );
    assert_eq!(rows[0].title, "Task A");
}

#[tokio::test]
async fn empty_and_missing_lists_yield_no_rows() {
    let mock = MockTransport::new();
    mock.ok("GET /tasks", json!({ "items": [] }));
    mock.push("GET /tasks", Reply::Json(json!({ "success": true })));

    let view = view(&mock);
    assert!(view.refresh().await.unwrap().is_empty());
    assert!(view.refresh().await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_status_fails_the_refresh() {
    let mock = MockTransport::new();
    mock.ok(
        "GET /tasks",
        json!({ "items": [task_record("A", "paused", 0.0)] }),
    );
    assert!(matches!(
        view(&mock).refresh().await,
        Err(ClientError::Transport(_))
    ));
}

#[tokio::test]
async fn cancel_reloads_the_list() {
    let mock = MockTransport::new();
    mock.push("POST /tasks/B/cancel", Reply::Json(json!({ "success": true })));
    mock.ok(
        "GET /tasks",
        json!({ "items": [task_record("B", "canceled", 41.0)] }),
    );

    let rows = view(&mock).cancel("B").await.unwrap();
    assert_eq!(rows[0].action, None);
    let keys: Vec<String> = mock.calls().into_iter().map(|c| c.key).collect();
    assert_eq!(keys, vec!["POST /tasks/B/cancel", "GET /tasks"]);
}

#[tokio::test]
async fn rejected_cancel_skips_reload() {
    let mock = MockTransport::new();
    mock.app_error("POST /tasks/B/cancel", "task already finished");

    let err = view(&mock).cancel("B").await.unwrap_err();
    assert_eq!(err.user_message("Cancel failed"), "task already finished");
    assert_eq!(mock.count("GET /tasks"), 0);
}

#[tokio::test]
async fn download_progress_is_monotonic_and_ends_at_100() {
    let mock = MockTransport::new();
    mock.push(
        "GET /download/T1",
        Reply::Download {
            status: 200,
            content_length: Some(1000),
            disposition: Some("attachment; filename=\"talk.mp3\"".to_owned()),
            chunks: vec![
                Bytes::from(vec![1u8; 100]),
                Bytes::from(vec![2u8; 250]),
                Bytes::from(vec![3u8; 650]),
            ],
        },
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let dir = tempfile::tempdir().unwrap();
    let path = view(&mock)
        .download("T1", dir.path(), move |p| sink.lock().unwrap().push(p))
        .await
        .unwrap();

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen, vec![10.0, 35.0, 100.0]);
    assert_eq!(path, dir.path().join("talk.mp3"));
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 1000);
}

#[tokio::test]
async fn download_error_status_is_reported() {
    let mock = MockTransport::new();
    mock.push(
        "GET /download/T9",
        Reply::Download {
            status: 404,
            content_length: None,
            disposition: None,
            chunks: Vec::new(),
        },
    );

    let dir = tempfile::tempdir().unwrap();
    let err = view(&mock)
        .download("T9", dir.path(), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::DownloadFailed { http_status: 404 }));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn download_without_disposition_uses_fallback_name() {
    let mock = MockTransport::new();
    mock.push(
        "GET /download/T2",
        Reply::Download {
            status: 200,
            content_length: None,
            disposition: None,
            chunks: vec![Bytes::from_static(b"ID3")],
        },
    );

    let dir = tempfile::tempdir().unwrap();
    let mut calls = 0;
    let path = view(&mock)
        .download("T2", dir.path(), |_| calls += 1)
        .await
        .unwrap();
    assert_eq!(calls, 0);
    assert_eq!(path, dir.path().join("converted_audio.mp3"));
}

#[tokio::test]
async fn broken_stream_leaves_no_files() {
    let mock = MockTransport::new();
    mock.push(
        "GET /download/T3",
        Reply::BrokenDownload {
            content_length: Some(1000),
            chunks: vec![Bytes::from(vec![1u8; 400])],
            error: "connection reset mid-body".to_owned(),
        },
    );

    let dir = tempfile::tempdir().unwrap();
    let err = view(&mock)
        .download("T3", dir.path(), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
    assert!(!dir.path().join(".talk.mp3.part").exists());
    assert!(!dir.path().join("talk.mp3").exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
