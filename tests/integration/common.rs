use cep_crawler::config::{parse_config, Config};
use cep_crawler::crawler::{CrawlService, CrawlWorker};
use cep_crawler::queue::QueueAdapter;
use cep_crawler::resolver::AddressResolver;
use cep_crawler::storage::{CrawlRecord, SharedStorage, Storage};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// A crawl deployment backed by temporary databases
pub struct TestDeployment {
    // Kept alive for the lifetime of the databases
    _dir: TempDir,
    pub config: Config,
    pub storage: SharedStorage,
    pub queue: QueueAdapter,
}

impl TestDeployment {
    pub fn new(provider_sections: &str) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = test_config(&dir, provider_sections);

        let storage = SharedStorage::open(&config.database).expect("Failed to open store");
        let busy_timeout = Duration::from_millis(config.database.busy_timeout_ms);
        let queue = QueueAdapter::open(&config.queue, busy_timeout).expect("Failed to open queue");

        Self {
            _dir: dir,
            config,
            storage,
            queue,
        }
    }

    pub fn service(&self) -> CrawlService {
        CrawlService::new(self.storage.clone(), self.queue.clone())
    }

    pub fn worker(&self) -> CrawlWorker {
        let resolver = AddressResolver::from_config(&self.config).expect("Failed to build resolver");
        CrawlWorker::new(
            self.storage.clone(),
            self.queue.clone(),
            Arc::new(resolver),
            &self.config,
        )
    }

    pub fn crawl(&self, crawl_id: &str) -> CrawlRecord {
        self.storage
            .with(|s| s.get_crawl(crawl_id))
            .expect("Failed to read crawl")
            .expect("Crawl missing")
    }

    /// Runs a worker until the crawl reaches a terminal status
    pub async fn drain(&self, crawl_id: &str) -> CrawlRecord {
        let worker = self.worker();
        let cancel = CancellationToken::new();

        let watch = async {
            loop {
                let crawl = self.crawl(crawl_id);
                if crawl.status.is_terminal() {
                    cancel.cancel();
                    return crawl;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };

        let drained = async { tokio::join!(worker.run(cancel.clone()), watch).1 };
        tokio::time::timeout(Duration::from_secs(30), drained)
            .await
            .expect("Crawl did not finish in time")
    }
}

/// Provider section for a ViaCEP mock mounted at `/ws`
pub fn viacep_section(server_uri: &str) -> String {
    provider_section("viacep", &format!("{}/ws", server_uri))
}

/// Provider section for an OpenCEP mock mounted at `/v1`
pub fn opencep_section(server_uri: &str) -> String {
    provider_section("opencep", &format!("{}/v1", server_uri))
}

fn provider_section(kind: &str, base_url: &str) -> String {
    format!(
        r#"
[[provider]]
kind = "{}"
base-url = "{}"
timeout-ms = 2000
max-attempts = 3
base-delay-ms = 1
failure-threshold = 50
"#,
        kind, base_url
    )
}

/// Parses a complete configuration pointing at files inside `dir`
pub fn test_config(dir: &TempDir, provider_sections: &str) -> Config {
    let database = dir.path().join("crawler.db");
    let queue = dir.path().join("queue.db");

    let toml = format!(
        r#"
[runtime]
role = "both"

[database]
path = "{}"

[queue]
database-path = "{}"
name = "test-crawl"
visibility-timeout-secs = 30
wait-seconds = 0
poll-interval-ms = 10

[worker]
concurrency = 3
rate-limit-ms = 0
throttle-backoff-ms = 0
base-backoff-ms = 10
max-backoff-ms = 100

[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"
{}"#,
        database.display(),
        queue.display(),
        provider_sections
    );

    parse_config(&toml).expect("Test configuration should be valid")
}

/// A ViaCEP response body for a resolved code
pub fn viacep_body(postal_code: &str) -> serde_json::Value {
    serde_json::json!({
        "cep": format!("{}-{}", &postal_code[..5], &postal_code[5..]),
        "logradouro": "Praça da Sé",
        "complemento": "lado ímpar",
        "bairro": "Sé",
        "localidade": "São Paulo",
        "uf": "SP",
        "ibge": "3550308",
        "gia": "1004",
        "ddd": "11",
        "siafi": "7107"
    })
}
