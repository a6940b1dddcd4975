//! Error message quality tests
//!
//! Tests that verify error messages are helpful and distinguishable.

use mesh_metrics::error::ExporterError;

#[test]
fn test_config_error_message_clarity() {
    // Given: A configuration error
    let error = ExporterError::Config("device.command must not be empty".to_string());

    // When: Converting to string
    let message = format!("{}", error);

    // Then: Message should clearly indicate configuration issue
    assert!(message.contains("Configuration error"));
    assert!(message.contains("device.command"));
}

#[test]
fn test_roster_error_message_clarity() {
    // Given: A roster error
    let error = ExporterError::Roster("cannot open /etc/devices.csv: not found".to_string());

    // When: Converting to string
    let message = format!("{}", error);

    // Then: Message should name the roster and the cause
    assert!(message.contains("Device roster error"));
    assert!(message.contains("/etc/devices.csv"));
}

#[test]
fn test_decrypt_error_does_not_leak_details() {
    // Given: A decryption failure
    let error = ExporterError::Decrypt;

    // When: Converting to string
    let message = format!("{}", error);

    // Then: Message should point at the pass-phrase without echoing anything secret
    assert!(message.contains("decryption failed"));
    assert!(message.contains("pass-phrase"));
}

#[test]
fn test_device_interface_error_names_node() {
    // Given: A device interface failure
    let error = ExporterError::DeviceInterface {
        node: "!2f67c123".to_string(),
        reason: "timed out after 60s".to_string(),
    };

    // When: Converting to string
    let message = format!("{}", error);

    // Then: Message should identify the device and the reason
    assert!(message.contains("!2f67c123"));
    assert!(message.contains("timed out"));
}

#[test]
fn test_json_error_message_clarity() {
    // Given: A JSON error
    let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
    let error = ExporterError::Json(json_err);

    // When: Converting to string
    let message = format!("{}", error);

    // Then: Message should clearly indicate JSON issue
    assert!(message.contains("JSON error"));
}

#[test]
fn test_io_error_conversion() {
    // Given: An IO error
    let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");

    // When: Converting into ExporterError
    let error: ExporterError = io_err.into();

    // Then: Message should keep the cause
    let message = format!("{}", error);
    assert!(message.contains("IO error"));
    assert!(message.contains("access denied"));
}

#[test]
fn test_fatal_setup_classification() {
    // Given: Errors from every category
    let fatal = [
        ExporterError::Config("x".to_string()),
        ExporterError::Roster("x".to_string()),
        ExporterError::Decrypt,
        ExporterError::EmptyRoster,
        ExporterError::InterfaceUnavailable("x".to_string()),
    ];
    let non_fatal = [
        ExporterError::DeviceInterface {
            node: "!00000001".to_string(),
            reason: "x".to_string(),
        },
        ExporterError::Push("x".to_string()),
        ExporterError::Output("x".to_string()),
    ];

    // Then: Only setup errors stop a run before polling
    for error in &fatal {
        assert!(error.is_fatal_setup(), "{} should be fatal", error);
    }
    for error in &non_fatal {
        assert!(!error.is_fatal_setup(), "{} should not be fatal", error);
    }
}

#[test]
fn test_error_messages_are_distinguishable() {
    // Given: Different error types
    let errors = [
        ExporterError::Config("x".to_string()).to_string(),
        ExporterError::Roster("x".to_string()).to_string(),
        ExporterError::EmptyRoster.to_string(),
        ExporterError::InterfaceUnavailable("x".to_string()).to_string(),
        ExporterError::Output("x".to_string()).to_string(),
        ExporterError::Push("x".to_string()).to_string(),
        ExporterError::Server("x".to_string()).to_string(),
    ];

    // Then: No two messages should be identical
    for (i, a) in errors.iter().enumerate() {
        for b in errors.iter().skip(i + 1) {
            assert_ne!(a, b);
        }
    }
}
