//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use driver_sdk::session::{CommandMethod, CommandRequest, MockTransport};
use driver_sdk::{
    CommandContext, ConnectionState, Driver, DriverError, DriverErrorKind, DriverSdk, Envelope, Identity,
    SessionSettings,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(3);

/// Start document with one table, one device and a few processed tags.
pub const START_DOCUMENT: &str = r#"{
    "tables": [{
        "id": "boiler",
        "device": {"tags": [
            {"id": "temp", "tagValue": {"minRaw": 0, "maxRaw": 10000, "minValue": 0, "maxValue": 100}},
            {"id": "level", "scale": 10, "fixed": 1},
            {"id": "pressure", "range": {"minValue": 0, "maxValue": 10, "action": "fixed", "fixedValue": -1}}
        ]},
        "devices": [{"id": "b-1"}]
    }]
}"#;

#[derive(Debug, Deserialize)]
pub struct ValveConfig {
    #[serde(default)]
    pub reject: bool,
}

#[derive(Debug, Deserialize)]
pub struct Actuate {
    pub open: bool,
    /// Simulated actuation time
    #[serde(default)]
    pub delay_ms: u64,
    /// Makes the callback panic
    #[serde(default)]
    pub jam: bool,
}

/// Test driver counting its lifecycle callbacks. Clones share the counters.
#[derive(Clone, Default)]
pub struct Valve {
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
}

impl Valve {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for Valve {
    type Config = ValveConfig;
    type Command = Actuate;
    type Tag = Value;

    async fn start(&self, config: ValveConfig) -> Result<(), DriverError> {
        if config.reject {
            return Err(DriverError::new(DriverErrorKind::Configuration, "rejected by valve"));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), DriverError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn schema(&self) -> Result<String, DriverError> {
        Ok(r#"{"commands":["actuate"]}"#.into())
    }

    async fn run(&self, ctx: &CommandContext, command: Actuate) -> Result<Value, DriverError> {
        if command.jam {
            panic!("valve jammed");
        }
        if command.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(command.delay_ms)).await;
        }
        Ok(json!({"device": ctx.device_id(), "open": command.open}))
    }
}

pub fn fast_settings() -> SessionSettings {
    SessionSettings {
        retry_interval: Duration::from_millis(20),
        keepalive_interval: Duration::from_millis(20),
        health_timeout: Duration::from_millis(200),
        stream_buffer: 16,
    }
}

pub fn identity() -> Identity {
    Identity {
        project_id: "plant-7".into(),
        driver_id: "valve".into(),
        driver_name: "Valve Driver".into(),
        service_id: "edge-01".into(),
    }
}

pub struct Harness {
    pub sdk: DriverSdk,
    pub transport: MockTransport,
    pub driver: Valve,
}

pub fn harness() -> Harness {
    harness_with(fast_settings())
}

pub fn harness_with(settings: SessionSettings) -> Harness {
    let transport = MockTransport::new();
    let driver = Valve::default();
    let sdk = DriverSdk::builder(driver.clone(), identity())
        .settings(settings)
        .build(Arc::new(transport.clone()));
    Harness { sdk, transport, driver }
}

pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("timed out waiting")
}

pub async fn wait_for_state(sdk: &DriverSdk, state: ConnectionState) {
    within(sdk.session().wait_for(state))
        .await
        .expect("session manager exited");
}

/// Poll `condition` until it holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

/// Send a request on `method` and decode the envelope answering it.
pub async fn call(transport: &MockTransport, method: CommandMethod, request: CommandRequest) -> Envelope {
    assert!(transport.push_request(method, request), "no open {} stream", method);
    let response = transport
        .next_response(method)
        .await
        .expect("no response");
    serde_json::from_slice(&response.payload).expect("response is not an envelope")
}

/// Bring the harness to `Running` and load [`START_DOCUMENT`].
pub async fn running(harness: &Harness) {
    harness.sdk.start().await.expect("start");
    wait_for_state(&harness.sdk, ConnectionState::Running).await;
    let envelope = call(
        &harness.transport,
        CommandMethod::Start,
        CommandRequest::new("start-1").with_payload(START_DOCUMENT.as_bytes().to_vec()),
    )
    .await;
    assert!(envelope.is_ok(), "start failed: {:?}", envelope);
}
