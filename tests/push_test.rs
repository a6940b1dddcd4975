//! HTTP push tests
//!
//! Pushes go to an in-process axum receiver that records every request.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    Router,
};
use mesh_metrics::config::PushConfig;
use mesh_metrics::device::DeviceInterface;
use mesh_metrics::error::{ExporterError, Result};
use mesh_metrics::exposition::MetricFormatter;
use mesh_metrics::metrics::ExporterMetrics;
use mesh_metrics::output::OutputSink;
use mesh_metrics::progress::ProgressTask;
use mesh_metrics::push::{parse_header_arg, PushPublisher, EXPOSITION_CONTENT_TYPE};
use mesh_metrics::roster::{NodeId, Roster};
use mesh_metrics::scheduler::{run_collection, PollContext};
use mesh_metrics::shutdown::ShutdownSignal;
use mesh_metrics::telemetry::TelemetryParser;
use tokio::net::TcpListener;

struct Captured {
    path: String,
    headers: HeaderMap,
    body: String,
}

#[derive(Clone)]
struct Receiver {
    requests: Arc<Mutex<Vec<Captured>>>,
    status: StatusCode,
}

async fn capture(
    State(receiver): State<Receiver>,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    receiver.requests.lock().unwrap().push(Captured {
        path: uri.path().to_string(),
        headers,
        body,
    });
    receiver.status
}

/// Starts a receiver answering every request with `status`
async fn spawn_receiver(status: StatusCode) -> (String, Arc<Mutex<Vec<Captured>>>) {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(capture).with_state(Receiver {
        requests: requests.clone(),
        status,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), requests)
}

/// URL of a port nothing listens on
async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn push_config(url: &str, job_name: Option<&str>) -> PushConfig {
    PushConfig {
        url: Some(url.to_string()),
        job_name: job_name.map(str::to_string),
        timeout_seconds: 5,
        headers: HashMap::new(),
    }
}

fn node(id: &str) -> NodeId {
    NodeId::parse(id).unwrap()
}

#[test]
fn test_push_disabled_without_url() {
    let publisher = PushPublisher::from_config(&PushConfig::default()).unwrap();

    assert!(publisher.is_none());
}

#[test]
fn test_pushgateway_grouping_path() {
    // Given: A publisher with a job name
    let publisher = PushPublisher::from_config(&push_config("http://gw:9091/", Some("mesh fleet")))
        .unwrap()
        .unwrap();

    // When: Building the target for a node
    let url = publisher.target_url(&node("!2f67c123"));

    // Then: Job and instance become path segments, percent-encoded
    assert_eq!(
        url.as_str(),
        "http://gw:9091/metrics/job/mesh%20fleet/instance/2f67c123"
    );
}

#[tokio::test]
async fn test_publish_sends_body_and_headers() {
    // Given: A receiver and a publisher with an extra header
    let (base, requests) = spawn_receiver(StatusCode::OK).await;
    let mut config = push_config(&base, Some("meshtastic"));
    config
        .headers
        .insert("X-Scope-OrgID".to_string(), "tenant-a".to_string());
    let publisher = PushPublisher::from_config(&config).unwrap().unwrap();

    // When: Publishing one device
    publisher
        .publish(&node("!2f67c123"), "meshtastic_Voltage{node=\"!2f67c123\"} 3.8\n")
        .await
        .unwrap();

    // Then: The receiver saw the grouping path, content type and header
    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.path, "/metrics/job/meshtastic/instance/2f67c123");
    assert_eq!(
        request.headers.get("content-type").unwrap(),
        EXPOSITION_CONTENT_TYPE
    );
    assert_eq!(request.headers.get("x-scope-orgid").unwrap(), "tenant-a");
    assert_eq!(request.body, "meshtastic_Voltage{node=\"!2f67c123\"} 3.8\n");
}

#[tokio::test]
async fn test_publish_without_job_posts_to_url() {
    let (base, requests) = spawn_receiver(StatusCode::ACCEPTED).await;
    let publisher = PushPublisher::from_config(&push_config(&format!("{}/ingest", base), None))
        .unwrap()
        .unwrap();

    publisher.publish(&node("!2f67c123"), "x 1\n").await.unwrap();

    assert_eq!(requests.lock().unwrap()[0].path, "/ingest");
}

#[tokio::test]
async fn test_non_success_status_is_push_error() {
    // Given: A receiver that rejects everything
    let (base, _) = spawn_receiver(StatusCode::INTERNAL_SERVER_ERROR).await;
    let publisher = PushPublisher::from_config(&push_config(&base, None))
        .unwrap()
        .unwrap();

    // When: Publishing
    let result = publisher.publish(&node("!2f67c123"), "x 1\n").await;

    // Then: The status is reported
    let error = result.unwrap_err();
    assert!(matches!(error, ExporterError::Push(_)));
    assert!(error.to_string().contains("500"));
}

struct AlwaysUp;

impl DeviceInterface for AlwaysUp {
    fn preflight(&self) -> Result<()> {
        Ok(())
    }

    async fn request_telemetry(&self, _node: &NodeId) -> Result<String> {
        Ok("Battery level: 99%\nVoltage: 4.2V\nChannel utilization: 1.0%\n".to_string())
    }
}

#[tokio::test]
async fn test_push_failure_does_not_affect_local_output() {
    // Given: A push target that refuses connections
    let publisher = PushPublisher::from_config(&push_config(&closed_port_url().await, None))
        .unwrap()
        .unwrap();
    let roster = Roster::from_reader("!00000001,,,,\n!00000002,,,,\n".as_bytes()).unwrap();
    let parser = TelemetryParser::new(
        vec![
            "Battery".to_string(),
            "Voltage".to_string(),
            "utilization".to_string(),
        ],
        3,
    );
    let formatter = MetricFormatter::default();
    let metrics = ExporterMetrics::new().unwrap();
    let ctx = PollContext {
        device: &AlwaysUp,
        parser: &parser,
        formatter: &formatter,
        publisher: Some(&publisher),
        metrics: &metrics,
        dwell: Duration::ZERO,
    };
    let sink = OutputSink::writer(Box::new(io::sink()), "meshtastic");
    let (_trigger, mut shutdown) = ShutdownSignal::manual();

    // When: Running a cycle
    let result = run_collection(&ctx, &roster, sink, &mut shutdown, &ProgressTask::disabled())
        .await
        .unwrap();

    // Then: Pushes failed, but every device was collected and the run is clean
    assert_eq!(result.push_failures, 2);
    assert_eq!(result.push_successes, 0);
    assert_eq!(result.live_devices(), 2);
    assert_eq!(result.exit_code(), 0);
    assert!(metrics
        .render()
        .unwrap()
        .contains("meshtastic_exporter_pushes_total{result=\"failure\"} 2"));
}

#[tokio::test]
async fn test_push_success_counted_per_device() {
    let (base, requests) = spawn_receiver(StatusCode::OK).await;
    let publisher = PushPublisher::from_config(&push_config(&base, Some("mesh")))
        .unwrap()
        .unwrap();
    let roster = Roster::from_reader("!00000001,Ann,,,\n".as_bytes()).unwrap();
    let parser = TelemetryParser::new(vec!["Battery".to_string()], 1);
    let formatter = MetricFormatter::default().with_version("test");
    let metrics = ExporterMetrics::new().unwrap();
    let ctx = PollContext {
        device: &AlwaysUp,
        parser: &parser,
        formatter: &formatter,
        publisher: Some(&publisher),
        metrics: &metrics,
        dwell: Duration::ZERO,
    };
    let (_trigger, mut shutdown) = ShutdownSignal::manual();

    let result = run_collection(
        &ctx,
        &roster,
        OutputSink::writer(Box::new(io::sink()), "meshtastic"),
        &mut shutdown,
        &ProgressTask::disabled(),
    )
    .await
    .unwrap();

    assert_eq!(result.push_successes, 1);
    let requests = requests.lock().unwrap();
    assert_eq!(
        requests[0].body,
        "\
meshtastic_Battery_level{node=\"!00000001\"} 99
meshtastic_contact{node=\"!00000001\",str=\"Ann\"} 1
meshtastic_up{node=\"!00000001\",version=\"test\"} 1
"
    );
}

#[test]
fn test_parse_header_arg() {
    assert_eq!(
        parse_header_arg("Authorization: Bearer abc:def"),
        Some(("Authorization".to_string(), "Bearer abc:def".to_string()))
    );
    assert_eq!(
        parse_header_arg("X-Empty:"),
        Some(("X-Empty".to_string(), String::new()))
    );
    assert_eq!(parse_header_arg("no separator"), None);
    assert_eq!(parse_header_arg(": value"), None);
}
