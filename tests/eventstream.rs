use std::sync::Arc;

use rust_eventstream::EventstreamError;
use rust_eventstream::event_type::{EventType, IndexOrder};
use rust_eventstream::eventstream::{Eventstream, EventstreamContext, EventstreamOptions, UserId};
use rust_eventstream::schema::RawDataSchema;
use rust_eventstream::types::{DataSet, DataType, Field, Schema, Value};

fn clicks() -> DataSet {
    DataSet::new(
        Schema::new(vec![
            Field::new("client", DataType::Utf8),
            Field::new("action", DataType::Utf8),
            Field::new("at", DataType::Float64),
            Field::new("kind", DataType::Utf8),
            Field::new("page_url", DataType::Utf8),
        ]),
        vec![
            vec![
                Value::from("u-7"),
                Value::from("open"),
                Value::Float64(1.5),
                Value::from("raw"),
                Value::from("/home"),
            ],
            vec![
                Value::from("u-7"),
                Value::from("buy"),
                Value::Float64(3.0),
                Value::from("positive_target"),
                Value::from("/cart"),
            ],
        ],
    )
}

fn clicks_schema() -> RawDataSchema {
    RawDataSchema::new("action", "at", "client")
        .with_event_type("kind")
        .with_custom_col("page_url", "url")
}

#[test]
fn raw_columns_map_onto_semantic_roles() {
    let ctx = EventstreamContext::new();
    let stream =
        Eventstream::new(&clicks(), &clicks_schema(), EventstreamOptions::default(), &ctx)
            .unwrap();

    let rows: Vec<(&str, EventType, &Value)> = stream
        .events()
        .map(|e| (e.name.as_str(), e.event_type, e.custom("url")))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("path_start", EventType::PathStart, &Value::from("/home")),
            ("open", EventType::Raw, &Value::from("/home")),
            ("buy", EventType::PositiveTarget, &Value::from("/cart")),
            ("path_end", EventType::PathEnd, &Value::from("/cart")),
        ]
    );
    assert!(stream.events().all(|e| e.user_id == UserId::Str("u-7".to_string())));

    let df = stream.to_dataframe();
    let cols: Vec<&str> = df.schema.field_names().collect();
    assert_eq!(
        cols,
        vec!["event_id", "event_type", "event_index", "event", "timestamp", "user_id", "url"]
    );
    assert_eq!(df.value(1, "timestamp"), Some(&Value::Timestamp(1_500_000_000)));
}

#[test]
fn missing_raw_column_is_a_schema_error() {
    let ctx = EventstreamContext::new();
    let schema = RawDataSchema::new("action", "when", "client");
    let err = Eventstream::new(&clicks(), &schema, EventstreamOptions::default(), &ctx)
        .unwrap_err();
    assert!(matches!(err, EventstreamError::Schema { .. }));
    assert!(err.to_string().contains("when"));
}

#[test]
fn custom_index_order_changes_tie_breaks() {
    let ctx = EventstreamContext::new();
    let raw = DataSet::new(
        Schema::new(vec![
            Field::new("user_id", DataType::Int64),
            Field::new("event", DataType::Utf8),
            Field::new("timestamp", DataType::Int64),
        ]),
        vec![vec![Value::Int64(1), Value::from("A"), Value::Int64(0)]],
    );
    let options = EventstreamOptions {
        index_order: Some(IndexOrder::new(vec![
            EventType::PathEnd,
            EventType::Raw,
            EventType::PathStart,
        ])),
        ..Default::default()
    };
    let stream = Eventstream::new(&raw, &RawDataSchema::default(), options, &ctx).unwrap();
    let names: Vec<&str> = stream.events().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["path_end", "A", "path_start"]);
}

#[test]
fn delta_join_rewrites_and_tracks_lineage() {
    let ctx = EventstreamContext::new();
    let parent = Arc::new(
        Eventstream::new(
            &clicks(),
            &clicks_schema(),
            EventstreamOptions {
                add_start_end_events: false,
                ..Default::default()
            },
            &ctx,
        )
        .unwrap(),
    );
    let open = parent.events().next().unwrap().clone();
    let buy = parent.events().nth(1).unwrap().clone();

    let mut delta = Eventstream::delta(&parent);
    delta
        .replace(&open, open.derive(&ctx, "landing", EventType::GroupAlias))
        .delete(&buy);
    let delta = delta.finish().unwrap();

    let mut child = Eventstream::derive(&parent);
    let ref_col = delta.relations()[0].ref_col.clone();
    child.join(&delta, &ref_col).unwrap();

    let live: Vec<&str> = child.events().map(|e| e.name.as_str()).collect();
    assert_eq!(live, vec!["landing"]);
    assert!(child.is_deleted(open.id));
    assert!(child.is_deleted(buy.id));

    let landing = child.events().next().unwrap();
    assert_eq!(child.origin(landing.id), Some(open.id));
    let chain: Vec<_> = child.lineage(landing.id).into_iter().map(|(s, _)| s).collect();
    assert_eq!(chain, vec![child.id(), parent.id()]);

    child.drop_soft_deleted();
    assert_eq!(child.events_with_deleted().count(), 1);
}

#[test]
fn contexts_are_independent_and_resettable() {
    let a = EventstreamContext::new();
    let b = EventstreamContext::new();
    assert_eq!(a.next_event_id(), b.next_event_id());
    assert!(!a.same_as(&b));
    assert!(a.same_as(&a.clone()));

    a.next_event_id();
    a.reset();
    assert_eq!(a.next_event_id().0, 0);
}

#[test]
fn add_custom_col_rejects_wrong_lengths_and_role_names() {
    let ctx = EventstreamContext::new();
    let mut stream =
        Eventstream::new(&clicks(), &clicks_schema(), EventstreamOptions::default(), &ctx)
            .unwrap();
    let len = stream.len();
    assert!(stream.add_custom_col("score", vec![Value::Int64(1)]).is_err());
    assert!(stream
        .add_custom_col("event", vec![Value::Null; len])
        .is_err());
    stream
        .add_custom_col("score", (0..len as i64).map(Value::Int64).collect())
        .unwrap();
    let scores: Vec<Value> = stream.events().map(|e| e.custom("score").clone()).collect();
    assert_eq!(scores, (0..len as i64).map(Value::Int64).collect::<Vec<_>>());
}
