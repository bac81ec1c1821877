//! Domain types shared by the processing pipeline, the gateway and the registry.
//!
//! Tag configuration arrives from the platform as JSON inside the `start`
//! command, so every configuration type here is `serde`-decodable with the
//! platform's camelCase field names. Unknown enum strings (for example an
//! unrecognized range action) fail decoding: that is the fatal configuration
//! path, distinct from the per-field configuration warnings the pipeline logs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

//==============================================================================
// Tag configuration
//==============================================================================

/// Processing configuration of a single tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagSpec {
    /// Tag identifier, unique within a device
    pub id: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Raw range → engineering range mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_value: Option<LinearMapping>,
    /// Validity rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeSpec>,
    /// Multiplier applied before rounding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// Number of fractional digits to keep
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<u32>,
}

impl TagSpec {
    /// A tag with no processing configured.
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// True when the tag carries nothing but its identifier.
    #[must_use]
    pub fn is_bare(&self) -> bool {
        self.tag_value.is_none() && self.range.is_none() && self.scale.is_none() && self.fixed.is_none()
    }
}

/// Linear mapping from a raw range into an engineering-unit range.
///
/// All four bounds are optional on the wire; the mapping only applies when
/// every one of them is present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearMapping {
    pub min_raw: Option<f64>,
    pub max_raw: Option<f64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

impl LinearMapping {
    pub fn new(min_raw: f64, max_raw: f64, min_value: f64, max_value: f64) -> Self {
        Self {
            min_raw: Some(min_raw),
            max_raw: Some(max_raw),
            min_value: Some(min_value),
            max_value: Some(max_value),
        }
    }

    /// Returns `(min_raw, max_raw, min_value, max_value)` if all bounds are set.
    #[must_use]
    pub fn complete(&self) -> Option<(f64, f64, f64, f64)> {
        Some((self.min_raw?, self.max_raw?, self.min_value?, self.max_value?))
    }
}

/// Validity rules for a tag.
///
/// Either the simple form (`minValue`/`maxValue`) or the conditional form
/// (`conditions`) is used; carrying both is a configuration error that the
/// range stage reports instead of picking one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// What to emit when the value is invalid
    pub action: RangeAction,
    /// Value emitted by [`RangeAction::Fixed`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_value: Option<f64>,
    /// Whether rejections are recorded as marker fields
    #[serde(default)]
    pub invalid_action: InvalidAction,
    /// Whether the rejected raw value is recorded as well (needs `invalidAction: save`)
    #[serde(default)]
    pub save_invalid_value: bool,
}

impl RangeSpec {
    /// True when `minValue` or `maxValue` is configured.
    #[must_use]
    pub fn has_simple_bounds(&self) -> bool {
        self.min_value.is_some() || self.max_value.is_some()
    }

    /// True when at least one condition is configured.
    #[must_use]
    pub fn is_conditional(&self) -> bool {
        !self.conditions.is_empty()
    }
}

/// Action applied to an invalid value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RangeAction {
    /// Emit the configured fixed value
    Fixed,
    /// Emit the value sitting exactly at the violated threshold
    Boundary,
    /// Emit the last accepted value
    #[serde(alias = "latest")]
    HoldLast,
    /// Emit nothing
    #[default]
    Discard,
}

/// Whether rejections leave a trace in the emitted fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvalidAction {
    #[default]
    Ignore,
    Save,
}

/// One validity rule of the conditional form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Identifier reported in rejection markers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub mode: ConditionMode,
    #[serde(flatten)]
    pub kind: ConditionKind,
    /// Selects the boundary emitted by [`RangeAction::Boundary`]
    #[serde(default, rename = "default")]
    pub is_default: bool,
}

impl Condition {
    pub fn new(mode: ConditionMode, kind: ConditionKind) -> Self {
        Self {
            id: None,
            mode,
            kind,
            is_default: false,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Identifier used in markers: the configured id, else the position.
    #[must_use]
    pub fn label(&self, index: usize) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("condition-{}", index))
    }
}

/// What a condition compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionMode {
    /// The raw value itself
    Number,
    /// Percent change against the last accepted value
    Rate,
    /// Absolute change against the last accepted value
    Delta,
}

impl fmt::Display for ConditionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionMode::Number => write!(f, "number"),
            ConditionMode::Rate => write!(f, "rate"),
            ConditionMode::Delta => write!(f, "delta"),
        }
    }
}

/// How a condition compares, with its thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "camelCase")]
pub enum ConditionKind {
    /// Inclusive `[min, max]`
    Range {
        #[serde(rename = "minValue")]
        min: f64,
        #[serde(rename = "maxValue")]
        max: f64,
    },
    /// Strictly greater than `value`
    Greater { value: f64 },
    /// Strictly less than `value`
    Less { value: f64 },
}

//==============================================================================
// Samples
//==============================================================================

/// Declared type of a sample field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    Number,
    String,
    Boolean,
}

/// One raw reading inside a sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub tag: Arc<TagSpec>,
    pub value: Value,
}

impl Field {
    pub fn new(tag: Arc<TagSpec>, value: impl Into<Value>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    /// A field that only names its tag; the gateway resolves its configuration.
    pub fn by_id(tag_id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(Arc::new(TagSpec::bare(tag_id)), value)
    }
}

/// One timestamped set of tag readings for a device.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub device_id: String,
    pub sub_id: Option<String>,
    /// Filled in from the device registry when absent
    pub table_id: Option<String>,
    pub time: DateTime<Utc>,
    pub fields: Vec<Field>,
    pub field_types: HashMap<String, FieldType>,
}

impl Sample {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            sub_id: None,
            table_id: None,
            time: Utc::now(),
            fields: Vec::new(),
            field_types: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_table(mut self, table_id: impl Into<String>) -> Self {
        self.table_id = Some(table_id.into());
        self
    }

    #[must_use]
    pub fn with_sub_id(mut self, sub_id: impl Into<String>) -> Self {
        self.sub_id = Some(sub_id.into());
        self
    }

    #[must_use]
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn with_field_type(mut self, tag_id: impl Into<String>, field_type: FieldType) -> Self {
        self.field_types.insert(tag_id.into(), field_type);
        self
    }
}

/// A field produced by the pipeline, ready to be transmitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedField {
    pub id: String,
    pub value: Value,
}

impl ProcessedField {
    pub fn new(id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// Sample after processing. Its field list is new; the input sample is untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedSample {
    pub table_id: String,
    pub device_id: String,
    pub sub_id: Option<String>,
    pub time: DateTime<Utc>,
    pub fields: Vec<ProcessedField>,
}

//==============================================================================
// Events and logs
//==============================================================================

/// A device event forwarded to the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub table: String,
    pub id: String,
    pub event_id: String,
    pub time: DateTime<Utc>,
    pub data: Value,
}

/// Severity of a command log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        write!(f, "{}", label)
    }
}
