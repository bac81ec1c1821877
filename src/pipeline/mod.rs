//! Value-processing pipeline for outgoing samples.
//!
//! Every field of a sample walks an ordered list of [`Stage`]s:
//!
//! | Priority | Stage |
//! |---|---|
//! | 0 | [`LinearMappingStage`]: raw range to engineering range |
//! | 100 | [`ScaleRoundStage`]: scale factor then fixed decimals |
//! | 200 | [`RangeValidityStage`]: validity rules, boundary synthesis |
//!
//! Externally supplied stages ([`FieldStage`]) are merged into the same ordering.
//! Stages never mutate their inputs; the only side effect of a pipeline run is the
//! [`LastValidValueCache`] update done by the range stage.
//!
//! Configuration faults and non-finite values cost only the affected field: they
//! are logged and the rest of the sample continues.

mod cache;
mod linear;
mod range;
mod scale;

pub use cache::{CacheEntry, CacheError, LastValidValueCache};
pub use linear::LinearMappingStage;
pub use range::{RangeValidityStage, INVALID_CONDITION_SUFFIX, INVALID_VALUE_SUFFIX};
pub use scale::ScaleRoundStage;

use std::sync::Arc;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

use crate::model::{Field, ProcessedField, ProcessedSample, Sample, TagSpec};

/// Priority of the built-in linear mapping stage.
pub const LINEAR_MAPPING_PRIORITY: i32 = 0;
/// Priority of the built-in scale/round stage.
pub const SCALE_ROUND_PRIORITY: i32 = 100;
/// Priority of the built-in range validity stage.
pub const RANGE_VALIDITY_PRIORITY: i32 = 200;

/// Result of running one stage on one field value.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    /// The (possibly transformed) value continues to the next stage.
    Value(Value),
    /// The field is dropped; later stages do not run.
    Dropped,
    /// The stage produced extra fields next to the primary value.
    ///
    /// The extra fields go straight into the processed sample. Only `value`
    /// continues through later stages; `None` ends processing of the primary value.
    FanOut {
        value: Option<Value>,
        extra: Vec<ProcessedField>,
    },
}

/// Faults a stage can report for a single field.
#[derive(Error, Debug)]
pub enum StageError {
    /// The tag's processing configuration is unusable.
    #[error("Tag '{tag}' is misconfigured: {reason}")]
    Configuration { tag: String, reason: String },

    /// The cache rejected the sample's key.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl StageError {
    /// Configuration fault attributed to `tag`.
    pub fn configuration(tag: &TagSpec, reason: impl Into<String>) -> Self {
        StageError::Configuration {
            tag: tag.id.clone(),
            reason: reason.into(),
        }
    }
}

/// Per-sample context handed to every stage.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub table_id: &'a str,
    pub device_id: &'a str,
    pub cache: &'a LastValidValueCache,
}

/// An externally supplied processing stage.
///
/// Implementations must be pure functions of `(tag, value)` apart from reads and
/// writes through `ctx.cache`.
pub trait FieldStage: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Whether the stage handles this `(tag, value)` pair. Rejected pairs skip the stage.
    fn applies(&self, tag: &TagSpec, value: &Value) -> bool;

    /// Process one value.
    fn handle(
        &self,
        ctx: &StageContext<'_>,
        tag: &TagSpec,
        value: Value,
    ) -> Result<StageOutput, StageError>;
}

/// A pipeline stage: one of the built-ins or an external one with its priority.
#[derive(Clone)]
pub enum Stage {
    LinearMapping(LinearMappingStage),
    ScaleRound(ScaleRoundStage),
    RangeValidity(RangeValidityStage),
    External {
        stage: Arc<dyn FieldStage>,
        priority: i32,
    },
}

impl Stage {
    /// Wrap an externally supplied stage.
    pub fn external(stage: Arc<dyn FieldStage>, priority: i32) -> Self {
        Stage::External { stage, priority }
    }

    #[must_use]
    pub fn priority(&self) -> i32 {
        match self {
            Stage::LinearMapping(_) => LINEAR_MAPPING_PRIORITY,
            Stage::ScaleRound(_) => SCALE_ROUND_PRIORITY,
            Stage::RangeValidity(_) => RANGE_VALIDITY_PRIORITY,
            Stage::External { priority, .. } => *priority,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Stage::LinearMapping(_) => "linear_mapping",
            Stage::ScaleRound(_) => "scale_round",
            Stage::RangeValidity(_) => "range_validity",
            Stage::External { stage, .. } => stage.name(),
        }
    }

    fn applies(&self, tag: &TagSpec, value: &Value) -> bool {
        match self {
            Stage::LinearMapping(s) => s.applies(tag, value),
            Stage::ScaleRound(s) => s.applies(tag, value),
            Stage::RangeValidity(s) => s.applies(tag, value),
            Stage::External { stage, .. } => stage.applies(tag, value),
        }
    }

    fn handle(
        &self,
        ctx: &StageContext<'_>,
        tag: &TagSpec,
        value: Value,
    ) -> Result<StageOutput, StageError> {
        match self {
            Stage::LinearMapping(s) => Ok(s.handle(tag, value)),
            Stage::ScaleRound(s) => Ok(s.handle(tag, value)),
            Stage::RangeValidity(s) => s.handle(ctx, tag, value),
            Stage::External { stage, .. } => stage.handle(ctx, tag, value),
        }
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name())
            .field("priority", &self.priority())
            .finish()
    }
}

/// Ordered chain of stages applied to every outgoing field.
#[derive(Debug)]
pub struct ProcessingPipeline {
    stages: Vec<Stage>,
    cache: Arc<LastValidValueCache>,
}

impl ProcessingPipeline {
    /// Pipeline with the three built-in stages.
    pub fn new(cache: Arc<LastValidValueCache>) -> Self {
        let mut pipeline = Self::empty(cache);
        pipeline.register(Stage::LinearMapping(LinearMappingStage));
        pipeline.register(Stage::ScaleRound(ScaleRoundStage));
        pipeline.register(Stage::RangeValidity(RangeValidityStage));
        pipeline
    }

    /// Pipeline without any stage.
    pub fn empty(cache: Arc<LastValidValueCache>) -> Self {
        Self {
            stages: Vec::new(),
            cache,
        }
    }

    /// Add a stage. Equal priorities keep registration order.
    pub fn register(&mut self, stage: Stage) {
        tracing::debug!(stage = stage.name(), priority = stage.priority(), "Registering pipeline stage");
        self.stages.push(stage);
        // sort_by_key is stable
        self.stages.sort_by_key(Stage::priority);
    }

    /// Builder form of [`register`](Self::register) for external stages.
    #[must_use]
    pub fn with_stage(mut self, stage: Arc<dyn FieldStage>, priority: i32) -> Self {
        self.register(Stage::external(stage, priority));
        self
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// Cache shared with the session's `start` handler.
    pub fn cache(&self) -> &Arc<LastValidValueCache> {
        &self.cache
    }

    /// Process every field of `sample`, which belongs to `table_id`.
    ///
    /// Returns a new sample; `sample` itself is not modified. The processed field
    /// list may be longer (rejection markers) or shorter (dropped fields).
    pub fn process(&self, table_id: &str, sample: &Sample) -> ProcessedSample {
        let ctx = StageContext {
            table_id,
            device_id: &sample.device_id,
            cache: &self.cache,
        };

        let mut fields = Vec::with_capacity(sample.fields.len());
        for field in &sample.fields {
            self.process_field(&ctx, field, &mut fields);
        }

        if fields.len() != sample.fields.len() {
            tracing::debug!(
                table = table_id,
                device = %sample.device_id,
                fields_in = sample.fields.len(),
                fields_out = fields.len(),
                "Field count changed during processing"
            );
        }

        ProcessedSample {
            table_id: table_id.to_string(),
            device_id: sample.device_id.clone(),
            sub_id: sample.sub_id.clone(),
            time: sample.time,
            fields,
        }
    }

    fn process_field(&self, ctx: &StageContext<'_>, field: &Field, out: &mut Vec<ProcessedField>) {
        let tag = field.tag.as_ref();
        let mut value = field.value.clone();

        for stage in &self.stages {
            if value.is_null() {
                break;
            }
            if !stage.applies(tag, &value) {
                continue;
            }

            match stage.handle(ctx, tag, value) {
                Ok(StageOutput::Value(next)) => value = next,
                Ok(StageOutput::Dropped) => {
                    tracing::debug!(
                        table = ctx.table_id,
                        device = ctx.device_id,
                        tag = %tag.id,
                        stage = stage.name(),
                        "Field dropped"
                    );
                    return;
                }
                Ok(StageOutput::FanOut { value: next, extra }) => {
                    out.extend(extra);
                    match next {
                        Some(next) => value = next,
                        None => return,
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        table = ctx.table_id,
                        device = ctx.device_id,
                        tag = %tag.id,
                        stage = stage.name(),
                        error = %err,
                        "Discarding field"
                    );
                    return;
                }
            }
        }

        // Absent values are never transmitted.
        if value.is_null() {
            tracing::debug!(
                table = ctx.table_id,
                device = ctx.device_id,
                tag = %tag.id,
                "Discarding field with absent or non-finite value"
            );
            return;
        }
        out.push(ProcessedField::new(tag.id.clone(), value));
    }
}

//==============================================================================
// Numeric helpers shared by the built-in stages
//==============================================================================

/// Finite numeric value of a JSON field, if any.
pub(crate) fn finite_number(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

/// JSON value for a stage result. Non-finite results become `None`.
pub(crate) fn number_value(value: f64) -> Option<Value> {
    serde_json::Number::from_f64(value).map(Value::Number)
}

pub(crate) fn to_decimal(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value)
}

pub(crate) fn from_decimal(value: Decimal) -> Option<f64> {
    value.to_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LinearMapping, RangeAction, RangeSpec};
    use serde_json::json;

    struct Offset(f64);

    impl FieldStage for Offset {
        fn name(&self) -> &str {
            "offset"
        }

        fn applies(&self, _tag: &TagSpec, value: &Value) -> bool {
            value.is_number()
        }

        fn handle(
            &self,
            _ctx: &StageContext<'_>,
            _tag: &TagSpec,
            value: Value,
        ) -> Result<StageOutput, StageError> {
            let v = value.as_f64().unwrap_or_default();
            Ok(StageOutput::Value(json!(v + self.0)))
        }
    }

    struct Splitter;

    impl FieldStage for Splitter {
        fn name(&self) -> &str {
            "splitter"
        }

        fn applies(&self, _tag: &TagSpec, _value: &Value) -> bool {
            true
        }

        fn handle(
            &self,
            _ctx: &StageContext<'_>,
            tag: &TagSpec,
            value: Value,
        ) -> Result<StageOutput, StageError> {
            Ok(StageOutput::FanOut {
                value: Some(value.clone()),
                extra: vec![ProcessedField::new(format!("{}_copy", tag.id), value)],
            })
        }
    }

    fn pipeline() -> ProcessingPipeline {
        ProcessingPipeline::new(Arc::new(LastValidValueCache::new()))
    }

    #[test]
    fn test_builtin_order() {
        assert_eq!(
            pipeline().stage_names(),
            vec!["linear_mapping", "scale_round", "range_validity"]
        );
    }

    #[test]
    fn test_external_stage_ordering() {
        let pipeline = pipeline()
            .with_stage(Arc::new(Offset(1.0)), 100)
            .with_stage(Arc::new(Splitter), -10);
        assert_eq!(
            pipeline.stage_names(),
            vec!["splitter", "linear_mapping", "scale_round", "offset", "range_validity"]
        );
    }

    #[test]
    fn test_equal_priority_keeps_registration_order() {
        let pipeline = ProcessingPipeline::empty(Arc::new(LastValidValueCache::new()))
            .with_stage(Arc::new(Offset(1.0)), 5)
            .with_stage(Arc::new(Splitter), 5);
        assert_eq!(pipeline.stage_names(), vec!["offset", "splitter"]);
    }

    #[test]
    fn test_stages_chain() {
        let tag = Arc::new(TagSpec {
            tag_value: Some(LinearMapping::new(0.0, 100.0, 0.0, 10.0)),
            fixed: Some(1),
            ..TagSpec::bare("level")
        });
        let sample = Sample::new("d1").with_field(Field::new(tag, 33.333));

        let processed = pipeline().process("tank", &sample);
        assert_eq!(processed.table_id, "tank");
        assert_eq!(processed.fields.len(), 1);
        assert_eq!(processed.fields[0].id, "level");
        approx::assert_relative_eq!(processed.fields[0].value.as_f64().unwrap(), 3.3);
    }

    #[test]
    fn test_input_sample_untouched() {
        let tag = Arc::new(TagSpec {
            scale: Some(10.0),
            ..TagSpec::bare("t")
        });
        let sample = Sample::new("d1").with_field(Field::new(tag, 2.0));
        let before = sample.clone();

        let processed = pipeline().process("tbl", &sample);
        assert_eq!(processed.fields[0].value, json!(20.0));
        assert_eq!(sample, before);
    }

    #[test]
    fn test_null_value_dropped() {
        let sample = Sample::new("d1")
            .with_field(Field::by_id("a", Value::Null))
            .with_field(Field::by_id("b", f64::NAN))
            .with_field(Field::by_id("c", 1));

        let processed = pipeline().process("tbl", &sample);
        assert_eq!(processed.fields, vec![ProcessedField::new("c", 1)]);
    }

    #[test]
    fn test_fan_out_extras_merged() {
        let pipeline = pipeline().with_stage(Arc::new(Splitter), 50);
        let sample = Sample::new("d1").with_field(Field::by_id("t", 4.0));

        let processed = pipeline.process("tbl", &sample);
        assert_eq!(
            processed.fields,
            vec![ProcessedField::new("t_copy", 4.0), ProcessedField::new("t", 4.0)]
        );
    }

    #[test]
    fn test_misconfigured_field_does_not_stop_others() {
        let broken = Arc::new(TagSpec {
            range: Some(RangeSpec {
                min_value: Some(0.0),
                conditions: vec![crate::model::Condition::new(
                    crate::model::ConditionMode::Number,
                    crate::model::ConditionKind::Greater { value: 1.0 },
                )],
                action: RangeAction::Discard,
                ..Default::default()
            }),
            ..TagSpec::bare("broken")
        });
        let sample = Sample::new("d1")
            .with_field(Field::new(broken, 5.0))
            .with_field(Field::by_id("ok", "text"));

        let processed = pipeline().process("tbl", &sample);
        assert_eq!(processed.fields, vec![ProcessedField::new("ok", "text")]);
    }
}
