use std::sync::Arc;

use rstest::rstest;

use rust_eventstream::EventstreamError;
use rust_eventstream::eventstream::EventstreamContext;
use rust_eventstream::ingestion::{IngestionFormat, IngestionOptions, ingest_eventstream_from_path};
use rust_eventstream::observability::{PipelineEvent, RecordingObserver, Severity};
use rust_eventstream::schema::RawDataSchema;
use rust_eventstream::types::Value;

fn raw_schema() -> RawDataSchema {
    RawDataSchema::default().with_custom_col("platform", "platform")
}

#[rstest]
#[case::csv("tests/fixtures/events.csv")]
#[case::ndjson("tests/fixtures/events.ndjson")]
fn ingests_fixture_into_a_marked_stream(#[case] path: &str) {
    let ctx = EventstreamContext::new();
    let stream =
        ingest_eventstream_from_path(path, &raw_schema(), &IngestionOptions::default(), &ctx)
            .unwrap();

    // six raw events plus path_start/path_end for two users
    assert_eq!(stream.len(), 10);
    assert_eq!(stream.schema().custom_cols, vec!["platform".to_string()]);

    let user_two: Vec<(&str, &Value)> = stream
        .events()
        .filter(|e| e.user_id.to_string() == "2")
        .map(|e| (e.name.as_str(), e.custom("platform")))
        .collect();
    let ios = Value::from("ios");
    assert_eq!(
        user_two,
        vec![
            ("path_start", &ios),
            ("catalog", &ios),
            ("catalog", &ios),
            ("product", &ios),
            ("path_end", &ios),
        ]
    );
    let indices: Vec<u64> = stream.events().map(|e| e.index).collect();
    assert_eq!(indices, (0..10).collect::<Vec<_>>());
}

#[test]
fn observer_sees_success_with_event_count() {
    let obs = Arc::new(RecordingObserver::new());
    let opts = IngestionOptions {
        observer: Some(obs.clone()),
        ..Default::default()
    };
    let ctx = EventstreamContext::new();
    ingest_eventstream_from_path("tests/fixtures/events.csv", &raw_schema(), &opts, &ctx)
        .unwrap();
    assert_eq!(
        obs.events(),
        vec![PipelineEvent::IngestionFinished {
            path: "tests/fixtures/events.csv".into(),
            format: IngestionFormat::Csv,
            rows: 10,
        }]
    );
    assert!(obs.alerts().is_empty());
}

#[test]
fn missing_column_fails_without_alerting() {
    let obs = Arc::new(RecordingObserver::new());
    let opts = IngestionOptions {
        observer: Some(obs.clone()),
        ..Default::default()
    };
    let schema = RawDataSchema::default().with_custom_col("country", "country");
    let ctx = EventstreamContext::new();
    let err = ingest_eventstream_from_path("tests/fixtures/events.csv", &schema, &opts, &ctx)
        .unwrap_err();
    assert!(matches!(err, EventstreamError::Schema { .. }));
    assert!(err.to_string().contains("country"));

    let events = obs.events();
    assert!(matches!(
        events.as_slice(),
        [PipelineEvent::IngestionFailed { severity: Severity::Error, .. }]
    ));
    assert!(obs.alerts().is_empty());
}

#[test]
fn missing_file_is_critical_and_alerts() {
    let obs = Arc::new(RecordingObserver::new());
    let opts = IngestionOptions {
        observer: Some(obs.clone()),
        ..Default::default()
    };
    let ctx = EventstreamContext::new();
    let err =
        ingest_eventstream_from_path("tests/fixtures/absent.csv", &raw_schema(), &opts, &ctx)
            .unwrap_err();
    assert!(matches!(err, EventstreamError::Io(_)));
    assert_eq!(obs.alerts().len(), 1);
}

#[test]
fn unknown_extension_needs_a_forced_format() {
    let ctx = EventstreamContext::new();
    let err = ingest_eventstream_from_path(
        "tests/fixtures/events.txt",
        &raw_schema(),
        &IngestionOptions::default(),
        &ctx,
    )
    .unwrap_err();
    assert!(err.to_string().contains("cannot infer format"));
}
