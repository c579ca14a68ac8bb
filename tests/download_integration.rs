//! Integration tests for the download engine: assignment-driven fetching,
//! idempotent resume, and per-task failure isolation.

use std::sync::Arc;

use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use harvester_core::download::{DownloadEngine, HttpClient, RateLimiter};
use harvester_core::index::{DocumentType, Index, Record};
use harvester_core::report::OutcomeKind;
use harvester_core::resolver::build_default_registry;
use harvester_core::{NamingPlan, assign_filenames};

fn pdf_body() -> Vec<u8> {
    let mut body = b"%PDF-1.7\n".to_vec();
    body.extend(std::iter::repeat_n(b'x', 300));
    body
}

fn record(id: u32, title: &str, urls: Vec<String>) -> Record {
    Record::new(
        format!("https://catalog.test/si/si_public_record_report.cfm?dirEntryId={id}"),
        title.to_string(),
        DocumentType::new("PUBLISHED REPORT"),
        urls,
    )
}

fn plan_for(records: Vec<Record>) -> NamingPlan {
    let mut index = Index::new();
    for r in records {
        index.push(r);
    }
    assign_filenames(&index)
}

fn engine() -> DownloadEngine {
    let limiter = Arc::new(RateLimiter::disabled());
    let registry = Arc::new(build_default_registry(HttpClient::new(), Arc::clone(&limiter)));
    DownloadEngine::new(4, limiter, registry).unwrap()
}

#[tokio::test]
async fn downloads_land_under_assigned_names() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    for file in ["report.pdf", "appendix.pdf"] {
        Mock::given(method("GET"))
            .and(path(format!("/{file}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_body()))
            .mount(&server)
            .await;
    }

    // A two-download record gets the four-word title prefix on both names.
    let plan = plan_for(vec![record(
        1,
        "Annual Report on Air Quality 2020",
        vec![
            format!("{}/report.pdf", server.uri()),
            format!("{}/appendix.pdf", server.uri()),
        ],
    )]);

    let client = HttpClient::new();
    let report = engine()
        .run(&plan.assignments, &client, dir.path(), None)
        .await
        .unwrap();

    let summary = report.summary();
    assert_eq!(summary.downloaded, 2);
    assert_eq!(summary.failed, 0);

    assert!(dir.path().join("AnnualReportAirQuality_report.pdf").exists());
    assert!(dir.path().join("AnnualReportAirQuality_appendix.pdf").exists());
}

#[tokio::test]
async fn rerun_skips_existing_files() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // The server must be hit exactly once across two runs.
    Mock::given(method("GET"))
        .and(path("/data.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_body()))
        .expect(1)
        .mount(&server)
        .await;

    let plan = plan_for(vec![record(
        1,
        "Single File Record",
        vec![format!("{}/data.pdf", server.uri())],
    )]);
    let client = HttpClient::new();

    let first = engine()
        .run(&plan.assignments, &client, dir.path(), None)
        .await
        .unwrap();
    assert_eq!(first.summary().downloaded, 1);

    let second = engine()
        .run(&plan.assignments, &client, dir.path(), None)
        .await
        .unwrap();
    assert_eq!(second.summary().downloaded, 0);
    assert_eq!(second.summary().skipped_existing, 1);
    assert_eq!(
        second.outcomes()[0].kind,
        OutcomeKind::SkippedExisting
    );
}

#[tokio::test]
async fn a_failing_task_does_not_stop_the_batch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/good.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let plan = plan_for(vec![
        record(1, "Good Record", vec![format!("{}/good.pdf", server.uri())]),
        record(2, "Gone Record", vec![format!("{}/gone.pdf", server.uri())]),
    ]);
    let client = HttpClient::new();

    let report = engine()
        .run(&plan.assignments, &client, dir.path(), None)
        .await
        .unwrap();

    let summary = report.summary();
    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.failed, 1);
    assert!(dir.path().join("good.pdf").exists());
    assert!(!dir.path().join("gone.pdf").exists());

    let failed = report
        .outcomes()
        .iter()
        .find(|o| o.kind == OutcomeKind::Failed)
        .unwrap();
    assert_eq!(failed.record_id, "2");
    assert!(failed.detail.as_deref().unwrap().contains("404"));
}

#[tokio::test]
async fn cross_record_collisions_are_lettered_and_reported() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let body = vec![b'd'; 150];
    for route in ["/r1/data.csv", "/r2/data.csv"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;
    }

    let plan = plan_for(vec![
        record(1, "First Data Set", vec![format!("{}/r1/data.csv", server.uri())]),
        record(2, "Second Data Set", vec![format!("{}/r2/data.csv", server.uri())]),
    ]);

    // Both claimants of data.csv appear in the conflict report.
    assert_eq!(plan.report.conflicts.len(), 1);
    assert_eq!(plan.report.conflicts[0].name, "data.csv");
    assert_eq!(plan.report.conflicts[0].claims.len(), 2);

    let client = HttpClient::new();
    let report = engine()
        .run(&plan.assignments, &client, dir.path(), None)
        .await
        .unwrap();

    assert_eq!(report.summary().downloaded, 2);
    assert!(dir.path().join("data_a.csv").exists());
    assert!(dir.path().join("data_b.csv").exists());
    assert_eq!(std::fs::read(dir.path().join("data_a.csv")).unwrap(), body);
}

#[tokio::test]
async fn html_masquerading_as_pdf_is_a_failure_not_a_file() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/fake.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>Session expired, please sign in.</body></html>"),
        )
        .mount(&server)
        .await;

    let plan = plan_for(vec![record(
        1,
        "Fake Record",
        vec![format!("{}/fake.pdf", server.uri())],
    )]);
    let client = HttpClient::new();

    let report = engine()
        .run(&plan.assignments, &client, dir.path(), None)
        .await
        .unwrap();

    assert_eq!(report.summary().failed, 1);
    assert!(!dir.path().join("fake.pdf").exists());
    let outcome = &report.outcomes()[0];
    assert!(outcome.detail.as_deref().unwrap().contains("invalid payload"));
}

#[tokio::test]
async fn outcome_csv_written_for_a_mixed_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/ok.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let plan = plan_for(vec![
        record(1, "Ok Record", vec![format!("{}/ok.pdf", server.uri())]),
        record(2, "Missing Record", vec![format!("{}/missing.pdf", server.uri())]),
    ]);
    let client = HttpClient::new();

    let report = engine()
        .run(&plan.assignments, &client, dir.path(), None)
        .await
        .unwrap();

    let csv_path = dir.path().join("outcomes.csv");
    report.write_outcomes_csv(&csv_path).unwrap();

    let contents = std::fs::read_to_string(&csv_path).unwrap();
    assert!(contents.starts_with("record_id,column,url,host,filename,outcome,detail"));
    assert!(contents.contains("downloaded"));
    assert!(contents.contains("failed"));
    // Host column carries the mock server's host for auditing.
    assert!(contents.contains("127.0.0.1"));
}
