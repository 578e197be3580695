//! Integration tests for the RabbitMQ exporter.
//!
//! These tests run a fake management API on a local port and verify the
//! full flow from fetching queue statistics to exposing them via the HTTP
//! /metrics endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde_json::{Value, json};
use tokio::sync::watch;

use rabbitsight_exporter::config::{QueueConfig, RabbitConfig};
use rabbitsight_exporter::{
    ConnectionMode, Exporter, ExporterConfig, HttpServer, ManagementClient, QueueCollector,
    StatsSource,
};

/// Basic auth header for guest:guest.
const GUEST_AUTH: &str = "Basic Z3Vlc3Q6Z3Vlc3Q=";

#[derive(Clone)]
struct FakeBroker {
    overview: Value,
    queues: Value,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == GUEST_AUTH)
}

async fn overview_handler(State(broker): State<FakeBroker>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(broker.overview).into_response()
}

async fn queues_handler(State(broker): State<FakeBroker>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(broker.queues).into_response()
}

/// Start a fake management API and return its base URL.
async fn start_fake_broker(queues: Value) -> String {
    let total = queues.as_array().map_or(0, Vec::len);
    let broker = FakeBroker {
        overview: json!({
            "cluster_name": "rabbit@test",
            "node": "rabbit@node1",
            "rabbitmq_version": "3.12.0",
            "object_totals": { "queues": total, "exchanges": 8 }
        }),
        queues,
    };

    let router = Router::new()
        .route("/api/overview", get(overview_handler))
        .route("/api/queues", get(queues_handler))
        .with_state(broker);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    format!("http://{}", addr)
}

fn sample_queues() -> Value {
    json!([
        {
            "vhost": "/",
            "name": "orders",
            "type": "classic",
            "durable": true,
            "policy": "ha-all",
            "node": "rabbit@node1",
            "state": "running",
            "idle_since": "2023-01-01 00:00:00",
            "messages_ready": 5,
            "messages_unacknowledged": 2,
            "consumers": 3,
            "slave_nodes": ["rabbit@node2", "rabbit@node3"],
            "arguments": { "x-max-length": 100 },
            "effective_policy_definition": { "max-length": 50 },
            "message_stats": {
                "publish": 10,
                "publish_details": { "rate": 0.5 }
            }
        },
        {
            "vhost": "staging",
            "name": "payments",
            "type": "quorum",
            "durable": false,
            "node": "rabbit@node2",
            "state": "running",
            "messages_ready": 1,
            "arguments": {}
        }
    ])
}

fn make_exporter(url: &str, queues: QueueConfig) -> Exporter<ManagementClient> {
    let rabbit = RabbitConfig {
        url: url.to_string(),
        timeout_secs: 5,
        ..RabbitConfig::default()
    };
    let client = ManagementClient::new(&rabbit).unwrap();
    let collector = QueueCollector::new(&queues, ConnectionMode::Direct).unwrap();
    Exporter::new(client, collector, "rabbitmq")
}

/// Find the sample of `name` whose line contains every fragment of `labels`.
fn sample(output: &str, name: &str, labels: &[&str]) -> Option<f64> {
    output
        .lines()
        .filter(|l| !l.starts_with('#'))
        .filter(|l| l.split(['{', ' ']).next() == Some(name))
        .find(|l| labels.iter().all(|fragment| l.contains(fragment)))
        .and_then(|l| l.rsplit(' ').next())
        .and_then(|v| v.parse().ok())
}

#[tokio::test]
async fn test_management_client_fetches_queues() {
    let url = start_fake_broker(sample_queues()).await;
    let client = ManagementClient::new(&RabbitConfig {
        url,
        ..RabbitConfig::default()
    })
    .unwrap();

    let overview = client.overview().await.unwrap();
    assert_eq!(overview.cluster_name, "rabbit@test");
    assert_eq!(overview.queue_context().total_count, Some(2));

    let queues = client.fetch_entities("queues").await.unwrap();
    assert_eq!(queues.len(), 2);
}

#[tokio::test]
async fn test_full_scrape() {
    let url = start_fake_broker(sample_queues()).await;
    let exporter = make_exporter(&url, QueueConfig::default());

    let output = exporter.render().await.unwrap();
    let orders = ["queue=\"orders\""];

    assert!(exporter.last_scrape_ok());
    assert_eq!(sample(&output, "rabbitmq_up", &[]), Some(1.0));
    assert_eq!(
        sample(&output, "rabbitmq_queue_messages_ready", &orders),
        Some(5.0)
    );
    assert_eq!(
        sample(&output, "rabbitmq_queue_messages_unacknowledged", &orders),
        Some(2.0)
    );
    assert_eq!(
        sample(&output, "rabbitmq_queue_messages_published_total", &orders),
        Some(10.0)
    );
    assert_eq!(
        sample(&output, "rabbitmq_queue_messages_ack_total", &orders),
        Some(0.0)
    );
    assert_eq!(
        sample(&output, "rabbitmq_queue_slaves_nodes_len", &orders),
        Some(2.0)
    );
    assert_eq!(sample(&output, "rabbitmq_queue_max_length", &orders), Some(50.0));
    assert_eq!(
        sample(&output, "rabbitmq_queue_idle_since_seconds", &orders),
        Some(1_672_531_200.0)
    );
    assert_eq!(
        sample(
            &output,
            "rabbitmq_queue_state",
            &["queue=\"orders\"", "state=\"idle\"", "self=\"1\"", "cluster=\"rabbit@test\""]
        ),
        Some(1.0)
    );

    // Absent gauge fields are not exported.
    assert_eq!(
        sample(&output, "rabbitmq_queue_consumers", &["queue=\"payments\""]),
        None
    );
    assert_eq!(
        sample(
            &output,
            "rabbitmq_queue_state",
            &["queue=\"payments\"", "state=\"running\"", "self=\"0\""]
        ),
        Some(1.0)
    );
}

#[tokio::test]
async fn test_scrape_with_filters_and_exclusions() {
    let url = start_fake_broker(sample_queues()).await;
    let exporter = make_exporter(
        &url,
        QueueConfig {
            skip_vhost: Some("^staging$".to_string()),
            exclude_metrics: vec!["consumers".to_string()],
            ..QueueConfig::default()
        },
    );

    let output = exporter.render().await.unwrap();

    assert!(!output.contains("queue=\"payments\""));
    assert!(!output.contains("rabbitmq_queue_consumers"));
    assert_eq!(
        sample(&output, "rabbitmq_queue_messages_ready", &["queue=\"orders\""]),
        Some(5.0)
    );
}

#[tokio::test]
async fn test_scrape_over_max_queues() {
    let url = start_fake_broker(sample_queues()).await;
    let exporter = make_exporter(
        &url,
        QueueConfig {
            max_queues: 1,
            ..QueueConfig::default()
        },
    );

    let output = exporter.render().await.unwrap();

    assert_eq!(sample(&output, "rabbitmq_up", &[]), Some(1.0));
    assert!(!output.contains("queue=\""));
}

#[tokio::test]
async fn test_scrape_with_wrong_credentials() {
    let url = start_fake_broker(sample_queues()).await;
    let rabbit = RabbitConfig {
        url,
        password: "wrong".to_string(),
        ..RabbitConfig::default()
    };
    let client = ManagementClient::new(&rabbit).unwrap();
    let err = client.overview().await.unwrap_err();
    assert!(err.to_string().contains("401"));

    let collector = QueueCollector::new(&QueueConfig::default(), ConnectionMode::Direct).unwrap();
    let exporter = Exporter::new(client, collector, "rabbitmq");
    let output = exporter.render().await.unwrap();

    assert!(!exporter.last_scrape_ok());
    assert_eq!(sample(&output, "rabbitmq_up", &[]), Some(0.0));
    assert_eq!(
        sample(&output, "rabbitmq_module_up", &["module=\"queue\""]),
        Some(0.0)
    );
}

#[tokio::test]
async fn test_scrape_with_unreachable_api() {
    // Bind then release a port so nothing is listening on it.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let exporter = make_exporter(&format!("http://{}", addr), QueueConfig::default());
    let output = exporter.render().await.unwrap();

    assert!(!exporter.last_scrape_ok());
    assert_eq!(sample(&output, "rabbitmq_up", &[]), Some(0.0));
}

#[tokio::test]
async fn test_config_from_file() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            rabbit: {{ url: "http://127.0.0.1:15672", connection: "loadbalancer" }},
            queues: {{ include_queues: "^orders", max_queues: 100 }},
        }}"#
    )
    .unwrap();

    let config = ExporterConfig::load_from_file(file.path()).unwrap();

    assert_eq!(config.rabbit.connection, ConnectionMode::LoadBalancer);
    assert_eq!(config.queues.max_queues, 100);
    assert!(QueueCollector::new(&config.queues, config.rabbit.connection).is_ok());
}

#[tokio::test]
async fn test_http_server_metrics_endpoint() {
    let url = start_fake_broker(sample_queues()).await;
    let exporter = Arc::new(make_exporter(&url, QueueConfig::default()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // We need to bind and get the actual port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    drop(listener); // Release the port

    // Start server in background
    let server = HttpServer::new(exporter, addr, "/metrics".to_string());
    let server_handle = tokio::spawn(async move {
        let _ = server.run(shutdown_rx).await;
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let health_before = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    let metrics = client
        .get(format!("http://{}/metrics", addr))
        .send()
        .await
        .unwrap();
    let metrics_status = metrics.status();
    let body = metrics.text().await.unwrap();
    let health_after = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();

    // Shutdown server
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(1), server_handle).await;

    assert_eq!(health_before.status(), reqwest::StatusCode::GATEWAY_TIMEOUT);
    assert!(metrics_status.is_success());
    assert!(body.contains("rabbitmq_queue_messages_ready"));
    assert_eq!(health_after.status(), reqwest::StatusCode::OK);
}
