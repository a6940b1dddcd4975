//! Configuration validation tests
//!
//! Tests that verify configuration defaults and the checks in `Config::validate`.

use mesh_metrics::config::{Config, NodeIdFormat, PollingConfig, ServerConfig, Transport};
use mesh_metrics::error::ExporterError;
use mesh_metrics::roster::RosterSource;

#[test]
fn test_default_config_is_valid() {
    // Given: A configuration built purely from defaults
    let config = Config::default();

    // When: Validating it
    let result = config.validate();

    // Then: Defaults should describe a working setup
    assert!(result.is_ok(), "{:?}", result);
}

#[test]
fn test_section_defaults() {
    // Given: Default configuration sections
    let config = Config::default();
    let server = ServerConfig::default();
    let polling = PollingConfig::default();

    // Then: Values should match the documented defaults
    assert_eq!(config.device.command, "meshtastic");
    assert_eq!(config.device.mode, Transport::Serial);
    assert_eq!(config.device.port, "/dev/ttyACM0");
    assert_eq!(config.device.timeout_seconds, 60);
    assert_eq!(polling.dwell_seconds, 10);
    assert_eq!(polling.telemetry_keys, vec!["Battery", "Voltage", "utilization"]);
    assert_eq!(polling.liveness_threshold, 3);
    assert_eq!(config.output.namespace, "meshtastic");
    assert_eq!(config.output.node_id_format, NodeIdFormat::Default);
    assert!(config.output.directory.is_none());
    assert!(!config.output.individual_files);
    assert!(config.push.url.is_none());
    assert_eq!(config.push.timeout_seconds, 30);
    assert_eq!(config.daemon.poll_interval_seconds, 300);
    assert!(!server.enabled);
    assert_eq!(server.port, 9464);
}

#[test]
fn test_devices_source_dash_is_stdin() {
    // Given: A roster file of "-"
    let mut config = Config::default();
    config.devices.file = "-".to_string();

    // Then: The roster is read from standard input
    assert_eq!(config.devices.source(), RosterSource::Stdin);
}

#[test]
fn test_empty_command_rejected() {
    // Given: An empty device command
    let mut config = Config::default();
    config.device.command = "  ".to_string();

    // When: Validating
    let result = config.validate();

    // Then: Should fail with a configuration error
    assert!(matches!(result, Err(ExporterError::Config(_))));
}

#[test]
fn test_zero_device_timeout_rejected() {
    let mut config = Config::default();
    config.device.timeout_seconds = 0;

    assert!(matches!(config.validate(), Err(ExporterError::Config(_))));
}

#[test]
fn test_empty_telemetry_keys_rejected() {
    // Given: Only blank telemetry keys
    let mut config = Config::default();
    config.polling.telemetry_keys = vec![String::new(), " ".to_string()];

    // When: Validating
    let result = config.validate();

    // Then: Nothing could ever match, so the config is rejected
    let message = result.unwrap_err().to_string();
    assert!(message.contains("telemetry_keys"));
}

#[test]
fn test_invalid_namespace_rejected() {
    let mut config = Config::default();
    config.output.namespace = "mesh-tastic".to_string();

    assert!(matches!(config.validate(), Err(ExporterError::Config(_))));
}

#[test]
fn test_unparsable_push_url_rejected() {
    // Given: A push URL that is not a URL
    let mut config = Config::default();
    config.push.url = Some("not a url".to_string());

    // When: Validating
    let result = config.validate();

    // Then: Should fail before any device is polled
    let error = result.unwrap_err();
    assert!(error.is_fatal_setup());
    assert!(error.to_string().contains("push.url"));
}

#[test]
fn test_malformed_push_header_rejected() {
    // Given: A header name with a space in it
    let mut config = Config::default();
    config.push.url = Some("http://localhost:9091".to_string());
    config
        .push
        .headers
        .insert("Bad Header".to_string(), "value".to_string());

    // Then: Validation should reject it
    assert!(matches!(config.validate(), Err(ExporterError::Config(_))));
}

#[test]
fn test_zero_push_timeout_rejected_only_when_pushing() {
    // Given: A zero push timeout
    let mut config = Config::default();
    config.push.timeout_seconds = 0;

    // Then: Irrelevant while push is disabled
    assert!(config.validate().is_ok());

    // When: Push is enabled
    config.push.url = Some("http://localhost:9091".to_string());

    // Then: Should be rejected
    assert!(matches!(config.validate(), Err(ExporterError::Config(_))));
}

#[test]
fn test_zero_poll_interval_rejected() {
    let mut config = Config::default();
    config.daemon.poll_interval_seconds = 0;

    assert!(matches!(config.validate(), Err(ExporterError::Config(_))));
}
