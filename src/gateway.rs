//! Outbound calls from the driver to the platform.
//!
//! Every call first checks, without blocking, that the session is `Running` and
//! fails fast with [`SdkError::NotRunning`] otherwise. Argument errors are
//! returned as [`SdkError::InvalidArgument`]. Transport failures are not errors
//! at this level: they are logged and reported as [`Delivery::Failed`], the
//! session manager's reconnect path deals with the connection itself.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::error::{SdkError, SdkResult};
use crate::model::{Event, Field, FieldType, LogLevel, ProcessedSample, Sample};
use crate::pipeline::ProcessingPipeline;
use crate::registry::DeviceRegistry;
use crate::session::{ConnectionState, Identity, Outbound, Transport};

/// What happened to a unary call once it left the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The platform accepted the call.
    Accepted,
    /// The platform answered with a negative status.
    Rejected { info: String, detail: String },
    /// The call did not complete; the reason is the transport error.
    Failed(String),
}

impl Delivery {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Delivery::Accepted)
    }
}

/// Why a sample was not transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The device has no table in the registry and the sample named none.
    UnknownDevice,
    /// Processing removed every field.
    NoFieldsLeft,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::UnknownDevice => write!(f, "device is not registered to any table"),
            DropReason::NoFieldsLeft => write!(f, "no field survived processing"),
        }
    }
}

/// Result of [`OutboundGateway::write_sample`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleOutcome {
    /// The processed sample was handed to the transport.
    Sent {
        fields_in: usize,
        fields_out: usize,
        delivery: Delivery,
    },
    /// Nothing was transmitted.
    Dropped(DropReason),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PointPayload<'a> {
    table: &'a str,
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub_id: Option<&'a str>,
    time: String,
    fields: Map<String, Value>,
}

#[derive(Serialize)]
struct LogPayload<'a> {
    table: &'a str,
    id: &'a str,
    level: LogLevel,
    message: &'a str,
    time: String,
}

fn timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn encode<T: Serialize + ?Sized>(payload: &T) -> SdkResult<Vec<u8>> {
    serde_json::to_vec(payload).map_err(SdkError::Encode)
}

fn require(name: &str, value: &str) -> SdkResult<()> {
    if value.trim().is_empty() {
        return Err(SdkError::InvalidArgument(format!("{} must not be blank", name)));
    }
    Ok(())
}

/// Entry point for samples, events, logs and resource updates.
#[derive(Clone)]
pub struct OutboundGateway {
    state: watch::Receiver<ConnectionState>,
    transport: Arc<dyn Transport>,
    identity: Identity,
    registry: Arc<DeviceRegistry>,
    pipeline: Arc<ProcessingPipeline>,
}

impl OutboundGateway {
    pub fn new(
        state: watch::Receiver<ConnectionState>,
        transport: Arc<dyn Transport>,
        identity: Identity,
        registry: Arc<DeviceRegistry>,
        pipeline: Arc<ProcessingPipeline>,
    ) -> Self {
        Self {
            state,
            transport,
            identity,
            registry,
            pipeline,
        }
    }

    fn ensure_running(&self) -> SdkResult<()> {
        let state = *self.state.borrow();
        if state.is_running() {
            Ok(())
        } else {
            Err(SdkError::NotRunning { state })
        }
    }

    /// Process a sample through the pipeline and send it.
    ///
    /// A missing table id is looked up in the device registry, fields that only
    /// name their tag get the registered tag configuration, and declared field
    /// types are applied before processing.
    pub async fn write_sample(&self, sample: Sample) -> SdkResult<SampleOutcome> {
        self.ensure_running()?;
        require("device id", &sample.device_id)?;
        if sample.fields.is_empty() {
            return Err(SdkError::InvalidArgument("sample has no fields".into()));
        }

        let table_id = sample
            .table_id
            .clone()
            .filter(|table| !table.trim().is_empty())
            .or_else(|| self.registry.lookup(&sample.device_id));
        let Some(table_id) = table_id else {
            tracing::warn!(device = %sample.device_id, "Dropping sample: device has no table");
            return Ok(SampleOutcome::Dropped(DropReason::UnknownDevice));
        };

        let fields_in = sample.fields.len();
        let prepared = self.prepare(sample);
        let processed = self.pipeline.process(&table_id, &prepared);
        let fields_out = processed.fields.len();
        if fields_out == 0 {
            tracing::debug!(table = %table_id, device = %processed.device_id, "Dropping sample: no fields left");
            return Ok(SampleOutcome::Dropped(DropReason::NoFieldsLeft));
        }

        let data = encode(&point_payload(&processed))?;
        let delivery = self.deliver(Outbound::Point { data }).await;
        Ok(SampleOutcome::Sent {
            fields_in,
            fields_out,
            delivery,
        })
    }

    /// Resolve bare tags from the registry and apply declared field types.
    fn prepare(&self, sample: Sample) -> Sample {
        let Sample {
            device_id,
            sub_id,
            table_id,
            time,
            fields,
            field_types,
        } = sample;

        let fields = fields
            .into_iter()
            .filter_map(|field| {
                let tag = if field.tag.is_bare() {
                    self.registry
                        .tag(&device_id, &field.tag.id)
                        .unwrap_or(field.tag)
                } else {
                    field.tag
                };

                let value = match field_types.get(&tag.id) {
                    Some(field_type) => match coerce(field.value, *field_type) {
                        Some(value) => value,
                        None => {
                            tracing::warn!(
                                device = %device_id,
                                tag = %tag.id,
                                field_type = ?field_type,
                                "Dropping field: value does not match its declared type"
                            );
                            return None;
                        }
                    },
                    None => field.value,
                };
                Some(Field { tag, value })
            })
            .collect();

        Sample {
            device_id,
            sub_id,
            table_id,
            time,
            fields,
            field_types,
        }
    }

    /// Send a device event.
    pub async fn write_event(&self, event: Event) -> SdkResult<Delivery> {
        self.ensure_running()?;
        require("table", &event.table)?;
        require("device id", &event.id)?;
        require("event id", &event.event_id)?;

        let data = encode(&event)?;
        Ok(self.deliver(Outbound::Event { data }).await)
    }

    /// Send a command log line.
    pub async fn write_log(&self, table: &str, device_id: &str, level: LogLevel, message: &str) -> SdkResult<Delivery> {
        self.ensure_running()?;
        require("table", table)?;
        require("device id", device_id)?;

        let data = encode(&LogPayload {
            table,
            id: device_id,
            level,
            message,
            time: timestamp(Utc::now()),
        })?;
        Ok(self.deliver(Outbound::CommandLog { data }).await)
    }

    /// Update fields of one row of a platform table.
    pub async fn update_resource(&self, table: &str, row_id: &str, fields: Map<String, Value>) -> SdkResult<Delivery> {
        self.ensure_running()?;
        require("table", table)?;
        require("row id", row_id)?;
        if fields.is_empty() {
            return Err(SdkError::InvalidArgument("no fields to update".into()));
        }

        let data = encode(&fields)?;
        Ok(self
            .deliver(Outbound::UpdateTableData {
                table_id: table.to_string(),
                row_id: row_id.to_string(),
                data,
            })
            .await)
    }

    async fn deliver(&self, message: Outbound) -> Delivery {
        let operation = message.name();
        match self.transport.send(&self.identity, message).await {
            Ok(reply) if reply.status => Delivery::Accepted,
            Ok(reply) => {
                tracing::warn!(operation, info = %reply.info, detail = %reply.detail, "Platform rejected call");
                Delivery::Rejected {
                    info: reply.info,
                    detail: reply.detail,
                }
            }
            Err(err) => {
                tracing::warn!(operation, error = %err, "Outbound call failed");
                Delivery::Failed(err.to_string())
            }
        }
    }
}

fn point_payload(sample: &ProcessedSample) -> PointPayload<'_> {
    PointPayload {
        table: &sample.table_id,
        id: &sample.device_id,
        sub_id: sample.sub_id.as_deref(),
        time: timestamp(sample.time),
        fields: sample
            .fields
            .iter()
            .map(|field| (field.id.clone(), field.value.clone()))
            .collect(),
    }
}

/// Convert `value` to the declared type; `None` when it cannot be represented.
pub(crate) fn coerce(value: Value, field_type: FieldType) -> Option<Value> {
    match (field_type, value) {
        (_, Value::Null) => None,
        (FieldType::Number, Value::Number(n)) => Some(Value::Number(n)),
        (FieldType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        (FieldType::Number, Value::Bool(b)) => Some(Value::from(u8::from(b))),
        (FieldType::String, Value::String(s)) => Some(Value::String(s)),
        (FieldType::String, other) => Some(Value::String(other.to_string())),
        (FieldType::Boolean, Value::Bool(b)) => Some(Value::Bool(b)),
        (FieldType::Boolean, Value::Number(n)) => match n.as_f64() {
            Some(v) if v == 0.0 => Some(Value::Bool(false)),
            Some(v) if v == 1.0 => Some(Value::Bool(true)),
            _ => None,
        },
        (FieldType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        (_, _) => None,
    }
}
