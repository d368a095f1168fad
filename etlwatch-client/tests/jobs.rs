use std::time::Duration;

use etlwatch_client::{ClientError, DashboardClient, Endpoint};
use etlwatch_core::domain::job::{JobId, JobStatus};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_list_jobs_sends_paging_and_parses_bare_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/etl/chart/logs"))
        .and(query_param("limit", "20"))
        .and(query_param("offset", "40"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 42, "status": "running", "started_at": "2024-03-01T10:00:00Z"},
            {"id": 41, "status": "finished", "records_count": 120},
        ])))
        .mount(&server)
        .await;

    let client = DashboardClient::new(server.uri(), Endpoint::new("/api/etl/chart"));
    let jobs = client.list_jobs(20, 40).await.expect("list ok");

    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].id, JobId::from("42"));
    assert_eq!(jobs[0].status, JobStatus::Running);
    assert_eq!(jobs[1].records_count, Some(120));
}

#[tokio::test]
async fn test_list_jobs_accepts_paged_envelope_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/etl/logs"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "abc", "status": "stuck"}],
            "total": 1,
        })))
        .mount(&server)
        .await;

    let client = DashboardClient::new(server.uri(), Endpoint::default()).with_token("s3cret");
    let jobs = client.list_jobs(10, 0).await.expect("list ok");

    assert_eq!(jobs[0].status, JobStatus::Stuck);
}

#[tokio::test]
async fn test_get_job_maps_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/etl/logs/9"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such log"))
        .mount(&server)
        .await;

    let client = DashboardClient::new(server.uri(), Endpoint::default());
    let err = client.get_job(&JobId::from("9")).await.unwrap_err();

    assert!(err.is_not_found());
    assert!(err.to_string().contains("no such log"));
}

#[tokio::test]
async fn test_start_job_posts_parameters_and_returns_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/etl/run"))
        .and(body_json(json!({"full": true})))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"log_id": 77})))
        .mount(&server)
        .await;

    let client = DashboardClient::new(server.uri(), Endpoint::default());
    let id = client
        .start_job(&json!({"full": true}))
        .await
        .expect("start ok");

    assert_eq!(id, JobId::from("77"));
}

#[tokio::test]
async fn test_list_jobs_honors_request_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/etl/logs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(5))
                .set_body_json(json!([])),
        )
        .mount(&server)
        .await;

    let client = DashboardClient::new(server.uri(), Endpoint::default())
        .with_request_timeout(Duration::from_millis(200));
    let err = tokio::time::timeout(Duration::from_secs(3), client.list_jobs(10, 0))
        .await
        .expect("request gives up on its own")
        .unwrap_err();

    assert!(matches!(err, ClientError::RequestFailed(ref e) if e.is_timeout()), "{err:?}");
}
