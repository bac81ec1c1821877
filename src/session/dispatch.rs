//! Routing of inbound commands to driver callbacks.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::transport::{CommandMethod, CommandRequest};
use crate::driver::{CommandContext, Driver, Envelope};
use crate::error::{DriverError, DriverErrorKind};
use crate::pipeline::LastValidValueCache;
use crate::registry::{DeviceDocument, DeviceRegistry};

/// Object-safe handler the stream listeners call.
///
/// [`DriverDispatcher`] adapts any [`Driver`]; the session manager itself is not
/// generic over the driver type.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    /// Handle one request and return the encoded response envelope.
    async fn handle(&self, method: CommandMethod, request: &CommandRequest) -> Vec<u8>;

    /// Driver shutdown hook.
    async fn shutdown(&self) -> Result<(), DriverError>;
}

/// Decodes payloads into a driver's types and invokes its callbacks.
pub struct DriverDispatcher<D: Driver> {
    driver: Arc<D>,
    registry: Arc<DeviceRegistry>,
    cache: Arc<LastValidValueCache>,
}

impl<D: Driver> DriverDispatcher<D> {
    pub fn new(driver: Arc<D>, registry: Arc<DeviceRegistry>, cache: Arc<LastValidValueCache>) -> Self {
        Self {
            driver,
            registry,
            cache,
        }
    }

    async fn dispatch(&self, method: CommandMethod, request: &CommandRequest) -> Envelope {
        let ctx = CommandContext {
            request_id: request.request_id.clone(),
            serial_no: request.serial_no.clone(),
            table_id: request.table_id.clone(),
            device_ids: request.targets.clone(),
        };

        match method {
            CommandMethod::Start => self.start(&request.payload).await,
            CommandMethod::Schema => match self.driver.schema().await {
                Ok(schema) => Envelope::ok(Value::String(schema)),
                Err(err) => Envelope::driver_error(&err),
            },
            CommandMethod::Run => match decode::<D::Command>(&request.payload) {
                Ok(command) => Envelope::from_result(self.driver.run(&ctx, command).await),
                Err(envelope) => envelope,
            },
            CommandMethod::WriteTag => match decode::<D::Tag>(&request.payload) {
                Ok(tag) => Envelope::from_result(self.driver.write_tag(&ctx, tag).await),
                Err(envelope) => envelope,
            },
            CommandMethod::BatchRun => match decode::<D::Command>(&request.payload) {
                Ok(command) => Envelope::from_result(self.driver.batch_run(&ctx, command).await),
                Err(envelope) => envelope,
            },
            CommandMethod::Debug => {
                let value = if request.payload.is_empty() {
                    Value::Null
                } else {
                    // Debug payloads need not be JSON; keep them as text then.
                    serde_json::from_slice(&request.payload).unwrap_or_else(|_| {
                        Value::String(String::from_utf8_lossy(&request.payload).into_owned())
                    })
                };
                Envelope::from_result(self.driver.debug(value).await)
            }
        }
    }

    /// Decode the device document and the driver config from the same payload,
    /// start the driver, then swap the registry and drop every cached value.
    async fn start(&self, payload: &[u8]) -> Envelope {
        let document = match DeviceDocument::from_slice(payload) {
            Ok(document) => document,
            Err(err) => {
                tracing::warn!(error = %err, "Rejecting start: invalid device document");
                return Envelope::bad_request(format!("invalid device document: {}", err));
            }
        };
        let config = match decode::<D::Config>(payload) {
            Ok(config) => config,
            Err(envelope) => return envelope,
        };

        if let Err(err) = self.driver.start(config).await {
            tracing::error!(error = %err, "Driver start callback failed");
            return Envelope::driver_error(&err);
        }

        self.registry.replace(&document);
        self.cache.clear();
        Envelope::ok(Value::Null)
    }
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, Envelope> {
    // An empty payload decodes as JSON null so unit-like command types still work.
    let payload: &[u8] = if payload.is_empty() { b"null" } else { payload };
    serde_json::from_slice(payload).map_err(|err| {
        tracing::debug!(error = %err, "Command payload does not match the driver's type");
        Envelope::bad_request(format!("invalid payload: {}", err))
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[async_trait]
impl<D: Driver> CommandHandler for DriverDispatcher<D> {
    async fn handle(&self, method: CommandMethod, request: &CommandRequest) -> Vec<u8> {
        // A panicking callback must not take the stream listener down with it.
        let envelope = match AssertUnwindSafe(self.dispatch(method, request))
            .catch_unwind()
            .await
        {
            Ok(envelope) => envelope,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    method = %method,
                    request_id = %request.request_id,
                    panic = %message,
                    "Driver callback panicked"
                );
                Envelope::driver_error(&DriverError::new(
                    DriverErrorKind::Unknown,
                    format!("driver callback panicked: {}", message),
                ))
            }
        };
        tracing::debug!(
            method = %method,
            request_id = %request.request_id,
            code = envelope.code,
            "Command handled"
        );
        envelope.to_bytes()
    }

    async fn shutdown(&self) -> Result<(), DriverError> {
        self.driver.stop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{CODE_BAD_REQUEST, CODE_DRIVER_ERROR, CODE_OK};
    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Settings {
        #[serde(default)]
        fail: bool,
    }

    #[derive(Deserialize)]
    struct Move {
        position: f64,
    }

    #[derive(Default)]
    struct Positioner {
        started: Mutex<u32>,
    }

    #[async_trait]
    impl Driver for Positioner {
        type Config = Settings;
        type Command = Move;
        type Tag = Value;

        async fn start(&self, config: Settings) -> Result<(), DriverError> {
            if config.fail {
                return Err(DriverError::new(DriverErrorKind::Configuration, "refused"));
            }
            *self.started.lock() += 1;
            Ok(())
        }

        async fn schema(&self) -> Result<String, DriverError> {
            Ok("{}".into())
        }

        async fn run(&self, ctx: &CommandContext, command: Move) -> Result<Value, DriverError> {
            if command.position < 0.0 {
                return Err(DriverError::new(DriverErrorKind::InvalidParameter, "negative position"));
            }
            if command.position > 1000.0 {
                panic!("axis overrun");
            }
            Ok(json!({"device": ctx.device_id(), "position": command.position}))
        }
    }

    struct Fixture {
        driver: Arc<Positioner>,
        registry: Arc<DeviceRegistry>,
        cache: Arc<LastValidValueCache>,
        dispatcher: DriverDispatcher<Positioner>,
    }

    fn fixture() -> Fixture {
        let driver = Arc::new(Positioner::default());
        let registry = Arc::new(DeviceRegistry::new());
        let cache = Arc::new(LastValidValueCache::new());
        let dispatcher = DriverDispatcher::new(Arc::clone(&driver), Arc::clone(&registry), Arc::clone(&cache));
        Fixture {
            driver,
            registry,
            cache,
            dispatcher,
        }
    }

    async fn call(dispatcher: &DriverDispatcher<Positioner>, method: CommandMethod, request: CommandRequest) -> Envelope {
        serde_json::from_slice(&dispatcher.handle(method, &request).await).unwrap()
    }

    #[tokio::test]
    async fn test_run_success_and_failure() {
        let f = fixture();
        let ok = call(
            &f.dispatcher,
            CommandMethod::Run,
            CommandRequest::new("1").with_target("axes", "x").with_payload(br#"{"position": 2.5}"#.to_vec()),
        )
        .await;
        assert_eq!(ok.code, CODE_OK);
        assert_eq!(ok.result, json!({"device": "x", "position": 2.5}));

        let failed = call(
            &f.dispatcher,
            CommandMethod::Run,
            CommandRequest::new("2").with_payload(br#"{"position": -1}"#.to_vec()),
        )
        .await;
        assert_eq!(failed.code, CODE_DRIVER_ERROR);
        assert_eq!(failed.result, json!("invalid_parameter error: negative position"));
    }

    #[tokio::test]
    async fn test_panicking_callback_becomes_driver_error() {
        let f = fixture();
        let panicked = call(
            &f.dispatcher,
            CommandMethod::Run,
            CommandRequest::new("1").with_payload(br#"{"position": 5000}"#.to_vec()),
        )
        .await;
        assert_eq!(panicked.code, CODE_DRIVER_ERROR);
        assert!(panicked.result.as_str().unwrap_or_default().contains("axis overrun"));

        let next = call(
            &f.dispatcher,
            CommandMethod::Run,
            CommandRequest::new("2").with_payload(br#"{"position": 1}"#.to_vec()),
        )
        .await;
        assert_eq!(next.code, CODE_OK);
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "unknown panic payload");
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_bad_request() {
        let f = fixture();
        let envelope = call(
            &f.dispatcher,
            CommandMethod::Run,
            CommandRequest::new("1").with_payload(b"not json".to_vec()),
        )
        .await;
        assert_eq!(envelope.code, CODE_BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_default_callbacks() {
        let f = fixture();
        let batch = call(
            &f.dispatcher,
            CommandMethod::BatchRun,
            CommandRequest::new("1").with_payload(br#"{"position": 1}"#.to_vec()),
        )
        .await;
        assert_eq!(batch.code, CODE_DRIVER_ERROR);

        let echo = call(
            &f.dispatcher,
            CommandMethod::Debug,
            CommandRequest::new("2").with_payload(br#"{"ping": 1}"#.to_vec()),
        )
        .await;
        assert_eq!(echo, Envelope::ok(json!({"ping": 1})));

        let text = call(
            &f.dispatcher,
            CommandMethod::Debug,
            CommandRequest::new("3").with_payload(b"hello".to_vec()),
        )
        .await;
        assert_eq!(text.result, json!("hello"));
    }

    #[tokio::test]
    async fn test_start_rebuilds_registry_and_clears_cache() {
        let f = fixture();
        f.cache.put("old", "d", "t", 1.0).unwrap();

        let document = json!({"tables": [{"id": "axes", "devices": [{"id": "x"}]}]});
        let envelope = call(
            &f.dispatcher,
            CommandMethod::Start,
            CommandRequest::new("1").with_payload(serde_json::to_vec(&document).unwrap()),
        )
        .await;

        assert_eq!(envelope.code, CODE_OK);
        assert_eq!(*f.driver.started.lock(), 1);
        assert_eq!(f.registry.lookup("x").as_deref(), Some("axes"));
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn test_failed_start_keeps_previous_configuration() {
        let f = fixture();
        f.cache.put("old", "d", "t", 1.0).unwrap();

        let document = json!({"fail": true, "tables": [{"id": "axes", "devices": [{"id": "x"}]}]});
        let envelope = call(
            &f.dispatcher,
            CommandMethod::Start,
            CommandRequest::new("1").with_payload(serde_json::to_vec(&document).unwrap()),
        )
        .await;

        assert_eq!(envelope.code, CODE_DRIVER_ERROR);
        assert_eq!(f.registry.lookup("x"), None);
        assert_eq!(f.cache.len(), 1);
    }

    #[tokio::test]
    async fn test_start_with_bad_document_is_bad_request() {
        let f = fixture();
        let document = json!({"tables": [{"id": "axes", "device": {"tags": [{"id": "t", "range": {"action": "nope"}}]}}]});
        let envelope = call(
            &f.dispatcher,
            CommandMethod::Start,
            CommandRequest::new("1").with_payload(serde_json::to_vec(&document).unwrap()),
        )
        .await;
        assert_eq!(envelope.code, CODE_BAD_REQUEST);
        assert_eq!(*f.driver.started.lock(), 0);
    }
}
