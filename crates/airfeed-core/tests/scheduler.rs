mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use airfeed_core::{CycleStage, DatasetRules, PipelineConfig, RefreshPipeline, Scheduler};
use common::{ScriptedSource, Step};
use tokio_util::sync::CancellationToken;

const HEADER: &str = "name,iso_country,icao_code";

fn scheduler(source: Arc<ScriptedSource>, root: &Path, interval: Duration) -> Scheduler {
    let pipeline = RefreshPipeline::new(
        source,
        PipelineConfig {
            output_path: root.join("airports.csv"),
            staging_dir: root.join(".staging"),
            rules: DatasetRules::airports(),
        },
    );
    Scheduler::new(pipeline, interval)
}

#[tokio::test]
async fn run_once_reports_success() {
    let dir = tempfile::tempdir().unwrap();
    let published = dir.path().join("airports.csv");
    let source = Arc::new(ScriptedSource::new(
        vec![Step::Serve(format!("{HEADER}\nAlpha,US,K1\n"))],
        &published,
    ));
    let mut scheduler = scheduler(source, dir.path(), Duration::from_secs(3600));

    let report = scheduler.run_once().await.unwrap();

    assert_eq!(report.stats.rows_kept, 1);
    let state = scheduler.state();
    assert_eq!(state.cycles_run, 1);
    assert_eq!(state.successes, 1);
    assert!(state.last_success.is_some());
    assert!(state.last_error.is_none());
}

#[tokio::test]
async fn run_once_reports_failure() {
    let dir = tempfile::tempdir().unwrap();
    let published = dir.path().join("airports.csv");
    let source = Arc::new(ScriptedSource::new(vec![Step::Fail], &published));
    let mut scheduler = scheduler(source, dir.path(), Duration::from_secs(3600));

    let err = scheduler.run_once().await.unwrap_err();

    assert_eq!(err.stage(), CycleStage::Fetching);
    let state = scheduler.state();
    assert_eq!(state.failures, 1);
    assert_eq!(state.consecutive_failures, 1);
    assert!(state.last_success.is_none());
    assert!(state.last_error.is_some());
    assert!(!published.exists());
}

#[tokio::test]
async fn failed_cycle_does_not_stop_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let published = dir.path().join("airports.csv");
    let cancel = CancellationToken::new();
    let stop = cancel.clone();

    let source = Arc::new(
        ScriptedSource::new(
            vec![
                Step::Serve(format!("{HEADER}\nAlpha,US,K1\n")),
                Step::Fail,
                Step::Serve(format!("{HEADER}\nAlpha,US,K1\nBravo,US,K2\n")),
            ],
            &published,
        )
        .with_hook(move |call| {
            if call == 3 {
                stop.cancel();
            }
        }),
    );
    let mut scheduler = scheduler(source.clone(), dir.path(), Duration::from_millis(10));

    let state = tokio::time::timeout(Duration::from_secs(10), scheduler.run_continuous(cancel))
        .await
        .expect("loop should stop after cancellation");

    assert_eq!(state.cycles_run, 3);
    assert_eq!(state.successes, 2);
    assert_eq!(state.failures, 1);
    assert_eq!(state.consecutive_failures, 0);

    let first = format!("{HEADER}\r\nAlpha,US,K1\r\n");
    let observed = source.observed();
    assert_eq!(observed[0], None);
    assert_eq!(observed[1].as_deref(), Some(first.as_str()));
    // The failed second cycle left the first cycle's output in place.
    assert_eq!(observed[2].as_deref(), Some(first.as_str()));

    assert_eq!(
        std::fs::read_to_string(&published).unwrap(),
        format!("{HEADER}\r\nAlpha,US,K1\r\nBravo,US,K2\r\n")
    );
}

#[tokio::test]
async fn cancellation_interrupts_the_wait() {
    let dir = tempfile::tempdir().unwrap();
    let published = dir.path().join("airports.csv");
    let source = Arc::new(ScriptedSource::new(
        vec![Step::Serve(format!("{HEADER}\nAlpha,US,K1\n"))],
        &published,
    ));
    let mut scheduler = scheduler(source, dir.path(), Duration::from_secs(3600));
    let cancel = CancellationToken::new();

    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run_continuous(cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();

    let state = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop should stop promptly")
        .unwrap();

    assert_eq!(state.cycles_run, 1);
    assert_eq!(state.successes, 1);
    assert!(published.exists());
}

#[tokio::test]
async fn cancelled_before_start_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let published = dir.path().join("airports.csv");
    let source = Arc::new(ScriptedSource::new(Vec::new(), &published));
    let mut scheduler = scheduler(source.clone(), dir.path(), Duration::from_secs(3600));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let state = scheduler.run_continuous(cancel).await;

    assert_eq!(state.cycles_run, 0);
    assert!(source.observed().is_empty());
}
