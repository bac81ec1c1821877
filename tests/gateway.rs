//! Integration tests for the outbound path: samples, events, logs and resource updates.

mod common;

use std::sync::Arc;

use approx::assert_relative_eq;
use common::*;
use driver_sdk::session::{CommandMethod, CommandRequest, Outbound};
use driver_sdk::{
    ConnectionState, Delivery, DropReason, Event, Field, FieldStage, FieldType, LogLevel, Sample, SampleOutcome,
    SdkError, StageContext, StageError, StageOutput, TagSpec,
};
use serde_json::{json, Map, Value};

fn points(harness: &Harness) -> Vec<Value> {
    harness
        .transport
        .sent()
        .into_iter()
        .filter_map(|message| match message {
            Outbound::Point { data } => Some(serde_json::from_slice(&data).unwrap()),
            _ => None,
        })
        .collect()
}

fn number(point: &Value, field: &str) -> f64 {
    point["fields"][field]
        .as_f64()
        .unwrap_or_else(|| panic!("field {} missing in {}", field, point))
}

#[tokio::test]
async fn test_outbound_calls_fail_fast_when_not_running() {
    let harness = harness();
    let gateway = harness.sdk.gateway();

    let err = gateway
        .write_sample(Sample::new("b-1").with_field(Field::by_id("temp", 1)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SdkError::NotRunning {
            state: ConnectionState::Closed
        }
    ));

    let err = gateway
        .write_log("boiler", "b-1", LogLevel::Info, "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, SdkError::NotRunning { .. }));
    assert!(harness.transport.sent().is_empty());
}

#[tokio::test]
async fn test_sample_is_processed_with_registered_tags() {
    let harness = harness();
    running(&harness).await;

    let outcome = harness
        .sdk
        .gateway()
        .write_sample(
            Sample::new("b-1")
                .with_field(Field::by_id("temp", 2358))
                .with_field(Field::by_id("level", 1.2346))
                .with_field(Field::by_id("pressure", 12))
                .with_field(Field::by_id("note", "ok")),
        )
        .await
        .unwrap();
    assert_eq!(
        outcome,
        SampleOutcome::Sent {
            fields_in: 4,
            fields_out: 4,
            delivery: Delivery::Accepted
        }
    );

    let points = points(&harness);
    assert_eq!(points.len(), 1);
    let point = &points[0];
    assert_eq!(point["table"], "boiler");
    assert_eq!(point["id"], "b-1");
    assert!(point.get("subId").is_none());
    assert_relative_eq!(number(point, "temp"), 23.58, epsilon = 1e-9);
    assert_relative_eq!(number(point, "level"), 12.3, epsilon = 1e-9);
    assert_relative_eq!(number(point, "pressure"), -1.0);
    assert_eq!(point["fields"]["note"], "ok");
}

#[tokio::test]
async fn test_explicit_table_and_inline_tag_are_used_as_given() {
    let harness = harness();
    running(&harness).await;

    let tag = Arc::new(TagSpec {
        scale: Some(2.0),
        ..TagSpec::bare("temp")
    });
    harness
        .sdk
        .gateway()
        .write_sample(
            Sample::new("b-1")
                .with_table("archive")
                .with_sub_id("line-2")
                .with_field(Field::new(tag, 4)),
        )
        .await
        .unwrap();

    let point = &points(&harness)[0];
    assert_eq!(point["table"], "archive");
    assert_eq!(point["subId"], "line-2");
    assert_relative_eq!(number(point, "temp"), 8.0);
}

#[tokio::test]
async fn test_unknown_device_is_dropped() {
    let harness = harness();
    running(&harness).await;

    let outcome = harness
        .sdk
        .gateway()
        .write_sample(Sample::new("ghost").with_field(Field::by_id("temp", 1)))
        .await
        .unwrap();
    assert_eq!(outcome, SampleOutcome::Dropped(DropReason::UnknownDevice));
    assert!(harness.transport.sent().is_empty());
}

#[tokio::test]
async fn test_declared_types_are_applied() {
    let harness = harness();
    running(&harness).await;

    let outcome = harness
        .sdk
        .gateway()
        .write_sample(
            Sample::new("b-1")
                .with_field(Field::by_id("running", "1"))
                .with_field(Field::by_id("setpoint", "42.5"))
                .with_field(Field::by_id("mode", "auto"))
                .with_field_type("running", FieldType::Boolean)
                .with_field_type("setpoint", FieldType::Number)
                .with_field_type("mode", FieldType::Number),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, SampleOutcome::Sent { fields_in: 3, fields_out: 2, .. }));

    let point = &points(&harness)[0];
    assert_eq!(point["fields"]["running"], json!(true));
    assert_relative_eq!(number(point, "setpoint"), 42.5);
    assert!(point["fields"].get("mode").is_none());
}

#[tokio::test]
async fn test_sample_without_surviving_fields_is_not_sent() {
    let harness = harness();
    running(&harness).await;

    let outcome = harness
        .sdk
        .gateway()
        .write_sample(
            Sample::new("b-1")
                .with_field(Field::by_id("temp", Value::Null))
                .with_field(Field::by_id("mode", "auto"))
                .with_field_type("mode", FieldType::Boolean),
        )
        .await
        .unwrap();
    assert_eq!(outcome, SampleOutcome::Dropped(DropReason::NoFieldsLeft));
    assert!(harness.transport.sent().is_empty());
}

#[tokio::test]
async fn test_invalid_arguments_are_rejected() {
    let harness = harness();
    running(&harness).await;
    let gateway = harness.sdk.gateway();

    let blank = gateway
        .write_sample(Sample::new("  ").with_field(Field::by_id("temp", 1)))
        .await;
    assert!(matches!(blank, Err(SdkError::InvalidArgument(_))));

    let empty = gateway.write_sample(Sample::new("b-1")).await;
    assert!(matches!(empty, Err(SdkError::InvalidArgument(_))));

    let no_fields = gateway.update_resource("boiler", "b-1", Map::new()).await;
    assert!(matches!(no_fields, Err(SdkError::InvalidArgument(_))));

    let event = Event {
        table: "boiler".into(),
        id: "b-1".into(),
        event_id: String::new(),
        time: chrono::Utc::now(),
        data: Value::Null,
    };
    assert!(matches!(gateway.write_event(event).await, Err(SdkError::InvalidArgument(_))));
    assert!(harness.transport.sent().is_empty());
}

#[tokio::test]
async fn test_transport_failure_is_reported_not_raised() {
    let harness = harness();
    running(&harness).await;
    harness.transport.set_sends_failing(true);

    let outcome = harness
        .sdk
        .gateway()
        .write_sample(Sample::new("b-1").with_field(Field::by_id("temp", 100)))
        .await
        .unwrap();
    match outcome {
        SampleOutcome::Sent {
            delivery: Delivery::Failed(reason),
            ..
        } => assert!(reason.contains("writePoint")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(harness.sdk.state(), ConnectionState::Running);
}

#[tokio::test]
async fn test_events_logs_and_resource_updates() {
    let harness = harness();
    running(&harness).await;
    let gateway = harness.sdk.gateway();

    let event = Event {
        table: "boiler".into(),
        id: "b-1".into(),
        event_id: "overheat".into(),
        time: chrono::Utc::now(),
        data: json!({"temp": 130}),
    };
    assert!(gateway.write_event(event).await.unwrap().is_accepted());
    assert!(gateway
        .write_log("boiler", "b-1", LogLevel::Warn, "valve stuck")
        .await
        .unwrap()
        .is_accepted());
    let mut fields = Map::new();
    fields.insert("firmware".into(), json!("2.1.0"));
    assert!(gateway
        .update_resource("boiler", "b-1", fields)
        .await
        .unwrap()
        .is_accepted());

    let sent = harness.transport.sent();
    assert_eq!(sent.len(), 3);
    let event: Value = serde_json::from_slice(sent[0].data()).unwrap();
    assert_eq!(event["eventId"], "overheat");
    let log: Value = serde_json::from_slice(sent[1].data()).unwrap();
    assert_eq!(log["level"], "warn");
    assert_eq!(log["message"], "valve stuck");
    match &sent[2] {
        Outbound::UpdateTableData { table_id, row_id, data } => {
            assert_eq!(table_id, "boiler");
            assert_eq!(row_id, "b-1");
            assert_eq!(serde_json::from_slice::<Value>(data).unwrap(), json!({"firmware": "2.1.0"}));
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn test_start_clears_last_valid_values() {
    let harness = harness();
    running(&harness).await;

    harness
        .sdk
        .gateway()
        .write_sample(Sample::new("b-1").with_field(Field::by_id("pressure", 5)))
        .await
        .unwrap();
    assert_eq!(harness.sdk.pipeline().cache().len(), 1);

    let envelope = call(
        &harness.transport,
        CommandMethod::Start,
        CommandRequest::new("start-2").with_payload(START_DOCUMENT.as_bytes().to_vec()),
    )
    .await;
    assert!(envelope.is_ok());
    assert!(harness.sdk.pipeline().cache().is_empty());
}

/// Converts Celsius readings to Kelvin before scaling.
struct Kelvin;

impl FieldStage for Kelvin {
    fn name(&self) -> &str {
        "kelvin"
    }

    fn applies(&self, tag: &TagSpec, value: &Value) -> bool {
        tag.id.ends_with("_c") && value.is_number()
    }

    fn handle(&self, _ctx: &StageContext<'_>, _tag: &TagSpec, value: Value) -> Result<StageOutput, StageError> {
        let celsius = value.as_f64().unwrap_or_default();
        Ok(StageOutput::Value(json!(celsius + 273.15)))
    }
}

#[tokio::test]
async fn test_custom_stage_runs_in_priority_order() {
    let transport = driver_sdk::MockTransport::new();
    let sdk = driver_sdk::DriverSdk::builder(Valve::default(), identity())
        .settings(fast_settings())
        .stage(Arc::new(Kelvin), 50)
        .build(Arc::new(transport.clone()));
    assert_eq!(
        sdk.pipeline().stage_names(),
        vec!["linear_mapping", "kelvin", "scale_round", "range_validity"]
    );

    sdk.start().await.unwrap();
    wait_for_state(&sdk, ConnectionState::Running).await;

    let tag = Arc::new(TagSpec {
        fixed: Some(0),
        ..TagSpec::bare("water_c")
    });
    sdk.gateway()
        .write_sample(
            Sample::new("b-1")
                .with_table("boiler")
                .with_field(Field::new(tag, 20)),
        )
        .await
        .unwrap();

    let sent = transport.sent();
    let point: Value = serde_json::from_slice(sent[0].data()).unwrap();
    assert_relative_eq!(point["fields"]["water_c"].as_f64().unwrap(), 293.0);
}
