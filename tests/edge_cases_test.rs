//! Edge case tests
//!
//! Tests for unusual but valid roster lines and device output.

use std::collections::HashSet;

use mesh_metrics::config::NodeIdFormat;
use mesh_metrics::exposition::MetricFormatter;
use mesh_metrics::roster::{parse_line, DeviceRecord, LineOutcome, NodeId, Roster};
use mesh_metrics::telemetry::{SampleKind, TelemetryParser, TelemetrySample, UnitSuffix};

fn default_parser() -> TelemetryParser {
    TelemetryParser::new(
        vec![
            "Battery".to_string(),
            "Voltage".to_string(),
            "utilization".to_string(),
        ],
        3,
    )
}

fn record(line: &str) -> DeviceRecord {
    match parse_line(line) {
        LineOutcome::Record(record) => record,
        other => panic!("expected record for {:?}, got {:?}", line, other),
    }
}

#[test]
fn test_record_without_metadata_emits_only_telemetry_and_up() {
    // Given: A roster line with every optional field empty
    let record = record("!56a58b6a,,,,");
    let parser = default_parser();

    // When: The device answers with telemetry
    let telemetry = parser.device_samples(
        &record,
        Some("Battery level: 50%\nVoltage: 3.7V\nChannel utilization: 1.5%\n"),
    );

    // Then: No metadata samples are produced
    let names: Vec<&str> = telemetry
        .samples
        .iter()
        .map(|s| s.metric_name.as_str())
        .collect();
    assert_eq!(
        names,
        vec!["Battery_level", "Voltage", "Channel_utilization", "up"]
    );
    assert!(telemetry.live);
}

#[test]
fn test_whitespace_around_fields_is_trimmed() {
    let record = record("  !2f67c123 ,  Jon  , Derp Hill ,21.1234 , -122.56789  ");

    assert_eq!(record.id.as_str(), "!2f67c123");
    assert_eq!(record.contact.as_deref(), Some("Jon"));
    assert_eq!(record.location.as_deref(), Some("Derp Hill"));
    assert_eq!(record.longitude.as_deref(), Some("-122.56789"));
}

#[test]
fn test_node_id_only_line() {
    let record = record("!2f67c123");

    assert!(record.contact.is_none());
    assert!(record.longitude.is_none());
}

#[test]
fn test_roster_dedup_keeps_first_and_sorts() {
    // Given: A roster with a duplicate in different case and unsorted ids
    let input = "\
# NodeID,Contact,Location,Latitude,Longitude
!ffff0000,Last,,,
!2F67C123,First,,,
not-a-node,,,,
!2f67c123,Second,,,
";

    // When: Loading it
    let roster = Roster::from_reader(input.as_bytes()).unwrap();

    // Then: Duplicates keep the first occurrence, order is by key
    assert_eq!(roster.len(), 2);
    assert_eq!(roster.duplicates, 1);
    assert_eq!(roster.devices[0].id.as_str(), "!2F67C123");
    assert_eq!(roster.devices[0].contact.as_deref(), Some("First"));
    assert_eq!(roster.devices[1].id.as_str(), "!ffff0000");
    assert_eq!(roster.rejected.len(), 1);
    assert_eq!(roster.rejected[0].line_number, 4);
}

#[test]
fn test_non_utf8_roster_is_a_roster_error() {
    let bytes: &[u8] = b"!2f67c123,\xff\xfe,,,\n";

    let result = Roster::from_reader(bytes);

    assert!(result.unwrap_err().to_string().contains("UTF-8"));
}

#[test]
fn test_value_without_colon_is_matched_but_ignored() {
    // Given: A line containing a key but no `Label: value` shape
    let parser = default_parser();

    // When: Parsing
    let (samples, matched) = parser.parse("Battery unknown\nVoltage:\nVoltage: 4.1 V\n");

    // Then: All three lines count toward liveness, one yields a sample
    assert_eq!(matched, 3);
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].raw_value, "4.1");
    assert_eq!(samples[0].stripped_unit, Some(UnitSuffix::Volts));
}

#[test]
fn test_key_matching_is_case_sensitive() {
    let parser = default_parser();

    let (_, matched) = parser.parse("battery level: 87%\nVOLTAGE: 3.8V\n");

    assert_eq!(matched, 0);
}

#[test]
fn test_non_numeric_telemetry_becomes_categorical() {
    // Given: A value that is not a number
    let parser = default_parser();
    let sample = parser.parse_line("Battery level: Powered").unwrap();

    // When: Formatting it
    let node = NodeId::parse("!2f67c123").unwrap();
    let line = MetricFormatter::default().format_sample(&node, &sample);

    // Then: The value travels in the str label with value 1
    assert_eq!(sample.kind, SampleKind::Categorical);
    assert_eq!(
        line,
        "meshtastic_Battery_level{node=\"!2f67c123\",str=\"Powered\"} 1"
    );
}

#[test]
fn test_label_values_are_escaped() {
    let node = NodeId::parse("!2f67c123").unwrap();
    let sample = TelemetrySample::categorical("location", "Roof \"A\"\\B\nC");

    let line = MetricFormatter::default().format_sample(&node, &sample);

    assert_eq!(
        line,
        r#"meshtastic_location{node="!2f67c123",str="Roof \"A\"\\B\nC"} 1"#
    );
}

#[test]
fn test_non_numeric_coordinates_are_categorical() {
    let record = record("!2f67c123,,,unknown,-122.5");
    let parser = default_parser();

    let telemetry = parser.device_samples(&record, None);

    let latitude = &telemetry.samples[0];
    let longitude = &telemetry.samples[1];
    assert_eq!(latitude.kind, SampleKind::Categorical);
    assert_eq!(longitude.kind, SampleKind::Numeric);
}

#[test]
fn test_failed_device_still_reports_metadata_and_up_zero() {
    // Given: A device whose interface call failed
    let record = record("!2f67c123,Jon,Derp Hill,21.1234,-122.56789");
    let parser = default_parser();

    // When: Building its samples without a response
    let telemetry = parser.device_samples(&record, None);
    let lines = MetricFormatter::default()
        .with_version("test")
        .format_device(&record.id, &telemetry.samples);

    // Then: Metadata is still exported and liveness is 0
    assert!(!telemetry.live);
    assert_eq!(lines.len(), 5);
    assert_eq!(
        lines.last().unwrap(),
        "meshtastic_up{node=\"!2f67c123\",version=\"test\"} 0"
    );
}

#[test]
fn test_custom_namespace() {
    let node = NodeId::parse("!2f67c123").unwrap();
    let formatter = MetricFormatter::new("mesh");

    let line = formatter.format_sample(&node, &TelemetrySample::from_value("Voltage", "3.8"));

    assert_eq!(line, "mesh_Voltage{node=\"!2f67c123\"} 3.8");
}

#[test]
fn test_repeated_labels_yield_one_series_per_name() {
    // Given: A noisy response repeating the battery line with a new value
    let record = record("!2f67c123,Jon,,,");
    let raw = "\
Battery level: 90%
Voltage: 3.9V
Channel utilization: 2.0%
Battery level: 91%
";

    // When: Formatting the device
    let telemetry = default_parser().device_samples(&record, Some(raw));
    let lines = MetricFormatter::default().format_device(&record.id, &telemetry.samples);

    // Then: Every series is unique and the first battery value is kept
    let series: HashSet<&str> = lines
        .iter()
        .map(|line| line.rsplit_once(' ').unwrap().0)
        .collect();
    assert_eq!(series.len(), lines.len());
    assert!(lines.contains(&"meshtastic_Battery_level{node=\"!2f67c123\"} 90".to_string()));

    // And: The repeat still counts as a matched line
    assert_eq!(telemetry.matched_lines, 4);
    assert!(telemetry.live);
}

#[test]
fn test_telemetry_cannot_shadow_metadata_or_up() {
    // Given: Keys that also match lines named like roster fields and liveness
    let parser = TelemetryParser::new(
        vec!["Battery".to_string(), "contact".to_string(), "up".to_string()],
        3,
    );
    let record = record("!2f67c123,Jon,,,");

    // When: The device reports those names itself
    let telemetry = parser.device_samples(
        &record,
        Some("Battery level: 80%\ncontact: Mallory\nup: 7\n"),
    );
    let lines = MetricFormatter::default()
        .with_version("test")
        .format_device(&record.id, &telemetry.samples);

    // Then: Only the roster contact and the computed liveness are exported
    assert_eq!(
        lines,
        vec![
            "meshtastic_Battery_level{node=\"!2f67c123\"} 80",
            "meshtastic_contact{node=\"!2f67c123\",str=\"Jon\"} 1",
            "meshtastic_up{node=\"!2f67c123\",version=\"test\"} 1",
        ]
    );
}

#[test]
fn test_clean_node_id_format_drops_prefix() {
    // Given: A formatter set to clean node ids
    let formatter = MetricFormatter::default()
        .with_version("test")
        .with_node_id_format(NodeIdFormat::Clean);
    let prefixed = NodeId::parse("!2f67c123").unwrap();
    let plain = NodeId::parse("56a58b6a").unwrap();

    // When: Formatting samples for both spellings
    let numeric =
        formatter.format_sample(&prefixed, &TelemetrySample::from_value("Voltage", "3.8"));
    let up = formatter.format_sample(&plain, &TelemetrySample::liveness(true));

    // Then: Neither label carries the `!`
    assert_eq!(numeric, "meshtastic_Voltage{node=\"2f67c123\"} 3.8");
    assert_eq!(up, "meshtastic_up{node=\"56a58b6a\",version=\"test\"} 1");
}
