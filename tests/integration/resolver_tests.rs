//! Provider chain behavior against mock providers

use crate::common::viacep_body;
use cep_crawler::config::{ProviderConfig, ProviderKind};
use cep_crawler::resolver::{AddressResolver, ResolveError, Resolution};
use reqwest::Client;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(kind: ProviderKind, base_url: String) -> ProviderConfig {
    let mut config = ProviderConfig::new(kind, base_url);
    config.base_delay_ms = 1;
    config.max_attempts = 3;
    config
}

fn viacep(server: &MockServer) -> ProviderConfig {
    provider(ProviderKind::Viacep, format!("{}/ws", server.uri()))
}

fn opencep(server: &MockServer) -> ProviderConfig {
    provider(ProviderKind::Opencep, format!("{}/v1", server.uri()))
}

#[tokio::test]
async fn test_viacep_resolves_address() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ws/01001000/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(viacep_body("01001000")))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = AddressResolver::new(Client::new(), &[viacep(&server)]);
    let resolution = resolver.resolve("01001000").await.unwrap();

    let address = resolution.address().expect("Address should be found");
    assert_eq!(address.street.as_deref(), Some("Praça da Sé"));
    assert_eq!(address.city.as_deref(), Some("São Paulo"));
    assert_eq!(address.state.as_deref(), Some("SP"));
}

#[tokio::test]
async fn test_viacep_error_flag_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ws/99999999/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "erro": true })))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = AddressResolver::new(Client::new(), &[viacep(&server)]);
    assert_eq!(resolver.resolve("99999999").await, Ok(Resolution::NotFound));
}

#[tokio::test]
async fn test_falls_back_to_next_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ws/01001000/json/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/01001000.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "cep": "01001-000",
            "logradouro": "Praça da Sé",
            "bairro": "Sé",
            "localidade": "São Paulo",
            "uf": "SP"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = AddressResolver::new(Client::new(), &[viacep(&server), opencep(&server)]);
    let resolution = resolver.resolve("01001000").await.unwrap();
    assert_eq!(
        resolution.address().and_then(|a| a.neighborhood.as_deref()),
        Some("Sé")
    );
}

#[tokio::test]
async fn test_transient_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ws/01001000/json/"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ws/01001000/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(viacep_body("01001000")))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = AddressResolver::new(Client::new(), &[viacep(&server)]);
    assert!(resolver.resolve("01001000").await.unwrap().is_found());
}

#[tokio::test]
async fn test_rate_limiting_escalates_to_throttled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ws/01001000/json/"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let resolver = AddressResolver::new(Client::new(), &[viacep(&server)]);
    let err = resolver.resolve("01001000").await.unwrap_err();

    assert!(err.is_throttled());
    assert_eq!(
        err,
        ResolveError::Throttled {
            postal_code: "01001000".to_string()
        }
    );
}

#[tokio::test]
async fn test_definitive_answer_beats_throttling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ws/01001000/json/"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/01001000.json"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = AddressResolver::new(Client::new(), &[viacep(&server), opencep(&server)]);
    assert_eq!(resolver.resolve("01001000").await, Ok(Resolution::NotFound));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ws/01001000/json/"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = AddressResolver::new(Client::new(), &[viacep(&server)]);
    assert_eq!(resolver.resolve("01001000").await, Ok(Resolution::NotFound));
}

#[tokio::test]
async fn test_open_circuit_skips_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ws/01001000/json/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = viacep(&server);
    config.max_attempts = 1;
    config.failure_threshold = 1;
    config.open_cooldown_secs = 3600;
    let resolver = AddressResolver::new(Client::new(), &[config]);

    // First lookup faults and opens the circuit
    assert_eq!(resolver.resolve("01001000").await, Ok(Resolution::NotFound));
    // Second lookup never reaches the provider
    assert_eq!(
        resolver.resolve("01001000").await,
        Err(ResolveError::Unavailable {
            postal_code: "01001000".to_string()
        })
    );
}
