use std::sync::Arc;
use std::time::Duration;

use form_pilot::models::attempt::{AttemptContext, AttemptRecord};
use form_pilot::models::failure::AttemptOutcome;
use form_pilot::persistence::attempt_repo::AttemptRepo;
use form_pilot::persistence::{db, retention};
use tokio_util::sync::CancellationToken;

fn record(run_id: &str, age_days: i64) -> AttemptRecord {
    let mut record = AttemptRecord::begin(
        run_id,
        &AttemptContext {
            index: 0,
            proxy: None,
        },
    )
    .finish(AttemptOutcome::Completed);
    record.started_at -= chrono::Duration::days(age_days);
    record.finished_at -= chrono::Duration::days(age_days);
    record
}

#[tokio::test]
async fn retention_task_purges_expired_attempts_on_startup() {
    let database = Arc::new(db::connect_memory().await.expect("db"));
    let repo = AttemptRepo::new(Arc::clone(&database));
    repo.insert(&record("old-run", 10)).await.expect("insert");
    repo.insert(&record("new-run", 0)).await.expect("insert");

    let ct = CancellationToken::new();
    let handle = retention::spawn_retention_task(Arc::clone(&database), 7, ct.clone());

    tokio::time::sleep(Duration::from_millis(200)).await;
    ct.cancel();
    handle.await.expect("task exits cleanly");

    assert!(repo.list_for_run("old-run").await.expect("list").is_empty());
    assert_eq!(repo.list_for_run("new-run").await.expect("list").len(), 1);
}

#[tokio::test]
async fn retention_task_stops_on_cancel() {
    let database = Arc::new(db::connect_memory().await.expect("db"));
    let ct = CancellationToken::new();
    let handle = retention::spawn_retention_task(database, 30, ct.clone());

    ct.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("task stops promptly")
        .expect("task did not panic");
}
