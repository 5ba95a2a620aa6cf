//! End-to-end crawl cycles: create, drain, recover

use crate::common::{viacep_body, viacep_section, TestDeployment};
use cep_crawler::config::QueueConfig;
use cep_crawler::crawler::{RecoverySweeper, ResultQuery};
use cep_crawler::queue::{QueueAdapter, QueueDepth, QueueError, QueueMessage, QueueResult, WorkQueue};
use cep_crawler::storage::{ResultFilter, Storage};
use cep_crawler::{CepError, CrawlStatus, ResultStatus};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Mounts a ViaCEP mock that knows every code except those ending in 9
async fn mount_viacep(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/ws/\d{8}/json/$"))
        .respond_with(|request: &Request| {
            let code = &request.url.path()[4..12];
            if code.ends_with('9') {
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "erro": "true" }))
            } else {
                ResponseTemplate::new(200).set_body_json(viacep_body(code))
            }
        })
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn result_codes(deployment: &TestDeployment, crawl_id: &str) -> Vec<String> {
    deployment
        .storage
        .with(|s| s.find_results(crawl_id, &ResultFilter::default(), 0, 1_000))
        .unwrap()
        .into_iter()
        .map(|r| r.postal_code)
        .collect()
}

#[tokio::test]
async fn test_full_crawl_covers_the_range() {
    let server = MockServer::start().await;
    mount_viacep(&server, 11).await;
    let deployment = TestDeployment::new(&viacep_section(&server.uri()));

    let crawl = deployment
        .service()
        .create_crawl("01000000", "01000010")
        .unwrap();
    assert_eq!(crawl.total_units, 11);
    assert_eq!(crawl.status, CrawlStatus::Pending);

    let finished = deployment.drain(&crawl.id).await;
    assert_eq!(finished.status, CrawlStatus::Finished);
    assert_eq!(finished.processed_units, 11);
    assert_eq!(finished.success_units, 10);
    assert_eq!(finished.failed_units, 1);
    assert_eq!(
        finished.processed_units,
        finished.success_units + finished.failed_units
    );

    let mut codes = result_codes(&deployment, &crawl.id);
    codes.sort();
    let expected: Vec<String> = (1_000_000..=1_000_010).map(|n| format!("{:08}", n)).collect();
    assert_eq!(codes, expected);

    let depth = deployment.queue.depth().unwrap();
    assert_eq!(depth.visible + depth.in_flight, 0);
}

#[tokio::test]
async fn test_second_crawl_is_served_from_cache() {
    let server = MockServer::start().await;
    // Only the first crawl reaches the provider
    mount_viacep(&server, 3).await;
    let deployment = TestDeployment::new(&viacep_section(&server.uri()));
    let service = deployment.service();

    let first = service.create_crawl("01000007", "01000009").unwrap();
    deployment.drain(&first.id).await;

    let second = service.create_crawl("01000007", "01000009").unwrap();
    assert_eq!(second.status, CrawlStatus::Finished);
    assert_eq!(second.processed_units, 3);
    assert_eq!(second.success_units, 2);
    assert_eq!(second.failed_units, 1);
    assert_eq!(deployment.queue.depth().unwrap().visible, 0);

    let errors = service
        .list_results(
            &second.id,
            &ResultQuery {
                status: Some(ResultStatus::Error),
                ..ResultQuery::default()
            },
        )
        .unwrap();
    assert_eq!(errors.total, 1);
    assert_eq!(errors.items[0].postal_code, "01000009");
    assert_eq!(
        errors.items[0].error_message.as_deref(),
        Some("CEP not found (cached)")
    );
}

#[tokio::test]
async fn test_results_search_by_address() {
    let server = MockServer::start().await;
    mount_viacep(&server, 3).await;
    let deployment = TestDeployment::new(&viacep_section(&server.uri()));
    let service = deployment.service();

    let crawl = service.create_crawl("01000008", "01000010").unwrap();
    deployment.drain(&crawl.id).await;

    let page = service
        .list_results(
            &crawl.id,
            &ResultQuery {
                search: Some("sé".to_string()),
                ..ResultQuery::default()
            },
        )
        .unwrap();
    let mut codes: Vec<&str> = page.items.iter().map(|i| i.postal_code.as_str()).collect();
    codes.sort();
    assert_eq!(codes, vec!["01000008", "01000010"]);

    let page = service
        .list_results(
            &crawl.id,
            &ResultQuery {
                postal_start: Some("01000009".to_string()),
                postal_end: Some("01000-010".to_string()),
                status: Some(ResultStatus::Success),
                ..ResultQuery::default()
            },
        )
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].postal_code, "01000010");
}

#[tokio::test]
async fn test_recovery_requeues_lost_units() {
    let server = MockServer::start().await;
    mount_viacep(&server, 5).await;
    let deployment = TestDeployment::new(&viacep_section(&server.uri()));

    let crawl = deployment
        .service()
        .create_crawl("01000000", "01000004")
        .unwrap();

    // Lose one message: acknowledged without ever being processed
    let cancel = CancellationToken::new();
    let mut messages = deployment.queue.receive_batch(10, &cancel).await.unwrap();
    assert_eq!(messages.len(), 5);
    let lost = messages.pop().unwrap();
    assert!(deployment.queue.acknowledge(&lost.receipt_handle).unwrap());

    let report = deployment.worker().process_batch(messages, &cancel).await;
    assert_eq!(report.recorded, 4);

    let stalled = deployment.crawl(&crawl.id);
    assert_eq!(stalled.status, CrawlStatus::Running);
    assert_eq!(stalled.processed_units, 4);

    let sweeper = RecoverySweeper::new(
        deployment.storage.clone(),
        deployment.queue.clone(),
        &deployment.config.recovery,
    );
    let recovery = sweeper.sweep().unwrap();
    assert_eq!(recovery.requeued, 1);

    // Within the cooldown a second sweep leaves the crawl alone
    assert_eq!(sweeper.sweep().unwrap().skipped, 1);

    let finished = deployment.drain(&crawl.id).await;
    assert_eq!(finished.status, CrawlStatus::Finished);
    assert_eq!(finished.processed_units, 5);
}

#[tokio::test]
async fn test_throttled_units_wait_for_redelivery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ws/01000000/json/"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;
    let deployment = TestDeployment::new(&viacep_section(&server.uri()));

    let crawl = deployment
        .service()
        .create_crawl("01000000", "01000000")
        .unwrap();

    let cancel = CancellationToken::new();
    let messages = deployment.queue.receive_batch(10, &cancel).await.unwrap();
    let report = deployment.worker().process_batch(messages, &cancel).await;
    assert_eq!(report.throttled, 1);

    let crawl = deployment.crawl(&crawl.id);
    assert_eq!(crawl.processed_units, 0);
    assert_eq!(deployment.queue.depth().unwrap().in_flight, 1);
    assert!(deployment
        .storage
        .with(|s| s.get_cached("01000000"))
        .unwrap()
        .is_none());
}

/// Transport whose sends always fail
struct BrokenQueue;

impl WorkQueue for BrokenQueue {
    fn ensure_queue(&mut self) -> QueueResult<()> {
        Ok(())
    }

    fn send_batch(&mut self, _bodies: &[String]) -> QueueResult<()> {
        Err(QueueError::Transport("connection refused".to_string()))
    }

    fn receive(&mut self, _max: usize, _visibility: Duration) -> QueueResult<Vec<QueueMessage>> {
        Ok(Vec::new())
    }

    fn delete(&mut self, _receipt_handle: &str) -> QueueResult<bool> {
        Ok(false)
    }

    fn dead_letter(&mut self, _receipt_handle: &str, _reason: &str) -> QueueResult<bool> {
        Ok(false)
    }

    fn depth(&self) -> QueueResult<QueueDepth> {
        Ok(QueueDepth::default())
    }
}

#[tokio::test]
async fn test_enqueue_failure_marks_crawl_failed() {
    let deployment = TestDeployment::new(&viacep_section("http://127.0.0.1:9"));
    let queue = QueueAdapter::new(Box::new(BrokenQueue), &QueueConfig::default()).unwrap();
    let service = cep_crawler::CrawlService::new(deployment.storage.clone(), queue);

    let result = service.create_crawl("01000000", "01000002");
    assert!(matches!(result, Err(CepError::Queue(_))));

    let conn = rusqlite::Connection::open(&deployment.config.database.path).unwrap();
    let (crawl_id, status): (String, String) = conn
        .query_row("SELECT id, status FROM crawls", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(status, "FAILED");
    assert_eq!(deployment.crawl(&crawl_id).status, CrawlStatus::Failed);

    // Failed crawls are not picked up by recovery
    let sweeper = RecoverySweeper::new(
        deployment.storage.clone(),
        deployment.queue.clone(),
        &deployment.config.recovery,
    );
    assert_eq!(sweeper.sweep().unwrap().examined, 0);
}
