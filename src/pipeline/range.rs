//! Validity rules engine.
//!
//! A tag's [`RangeSpec`] comes in one of two forms:
//!
//! - **Simple**: `minValue`/`maxValue` bounds, inclusive. Either bound may be omitted.
//! - **Conditional**: an ordered list of [`Condition`]s. The first condition that
//!   matches validates the value; rate and delta conditions without a usable cached
//!   value are skipped.
//!
//! When a value is invalid, the range's [`RangeAction`] decides what is emitted in
//! its place. With `invalidAction: save`, every rejection also emits
//! `<tag>__invalid_condition` naming what rejected the value, plus
//! `<tag>__invalid` with the raw value when `saveInvalidValue` is set.
//!
//! Whatever value is finally emitted becomes the tag's last valid value, unless
//! nothing was emitted.

use serde_json::Value;

use super::{finite_number, number_value, StageContext, StageError, StageOutput};
use crate::model::{
    Condition, ConditionKind, ConditionMode, InvalidAction, ProcessedField, RangeAction, RangeSpec,
    TagSpec,
};

/// Suffix of the synthesized field carrying a rejected raw value.
pub const INVALID_VALUE_SUFFIX: &str = "__invalid";
/// Suffix of the synthesized field naming what rejected a value.
pub const INVALID_CONDITION_SUFFIX: &str = "__invalid_condition";

/// Marker value for rejections by the simple `minValue`/`maxValue` form.
const SIMPLE_RANGE_MARKER: &str = "range";
/// Marker value when every condition was skipped.
const NO_CONDITION_MARKER: &str = "none";

/// Applies a tag's validity rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeValidityStage;

/// Outcome of evaluating the rules, before the action is applied.
#[derive(Debug, Clone, PartialEq)]
enum Verdict {
    Valid,
    Invalid {
        /// Value to emit instead of the raw one
        replacement: Option<f64>,
        /// Marker value naming the rejecting rule
        rejected_by: String,
    },
}

/// A condition that was evaluated and did not match.
#[derive(Debug)]
struct Violation<'a> {
    index: usize,
    condition: &'a Condition,
    /// Tag-space value sitting exactly at the violated threshold
    boundary: f64,
}

impl RangeValidityStage {
    /// True for numeric values of tags with validity rules.
    pub fn applies(&self, tag: &TagSpec, value: &Value) -> bool {
        tag.range.is_some() && value.is_number()
    }

    /// Validate one value and apply the range action, updating the last valid value.
    pub fn handle(
        &self,
        ctx: &StageContext<'_>,
        tag: &TagSpec,
        value: Value,
    ) -> Result<StageOutput, StageError> {
        let Some(range) = tag.range.as_ref() else {
            return Ok(StageOutput::Value(value));
        };
        let Some(raw) = finite_number(&value) else {
            return Ok(StageOutput::Dropped);
        };
        if range.has_simple_bounds() && range.is_conditional() {
            return Err(StageError::configuration(
                tag,
                "both minValue/maxValue and a condition list are configured",
            ));
        }

        // Evaluation and cache write happen under one lock, so concurrent samples of
        // the same tag never judge against the same stale value.
        let verdict = ctx.cache.update(ctx.table_id, ctx.device_id, &tag.id, |last| {
            let verdict = if range.is_conditional() {
                evaluate_conditions(tag, range, raw, last)
            } else {
                evaluate_simple(range, raw, last)
            };
            let next = match &verdict {
                Verdict::Valid => Some(raw),
                Verdict::Invalid { replacement, .. } => replacement.filter(|v| v.is_finite()),
            };
            (next, verdict)
        })?;

        let (replacement, rejected_by) = match verdict {
            Verdict::Valid => return Ok(StageOutput::Value(value)),
            Verdict::Invalid {
                replacement,
                rejected_by,
            } => (replacement, rejected_by),
        };

        tracing::debug!(
            table = ctx.table_id,
            device = ctx.device_id,
            tag = %tag.id,
            raw,
            rejected_by = %rejected_by,
            action = ?range.action,
            replacement = ?replacement,
            "Value rejected by range rules"
        );

        let emitted = replacement.and_then(number_value);

        let mut extra = Vec::new();
        if range.invalid_action == InvalidAction::Save {
            extra.push(ProcessedField::new(
                format!("{}{}", tag.id, INVALID_CONDITION_SUFFIX),
                rejected_by,
            ));
            if range.save_invalid_value {
                extra.push(ProcessedField::new(
                    format!("{}{}", tag.id, INVALID_VALUE_SUFFIX),
                    value,
                ));
            }
        }

        Ok(match (emitted, extra.is_empty()) {
            (Some(v), true) => StageOutput::Value(v),
            (None, true) => StageOutput::Dropped,
            (value, false) => StageOutput::FanOut { value, extra },
        })
    }
}

fn evaluate_simple(range: &RangeSpec, raw: f64, last: Option<f64>) -> Verdict {
    let below = range.min_value.filter(|min| raw < *min);
    let above = range.max_value.filter(|max| raw > *max);
    let Some(boundary) = below.or(above) else {
        return Verdict::Valid;
    };

    let replacement = match range.action {
        RangeAction::Fixed => range.fixed_value,
        RangeAction::Boundary => Some(boundary),
        RangeAction::HoldLast => Some(last.unwrap_or(raw)),
        RangeAction::Discard => None,
    };
    Verdict::Invalid {
        replacement,
        rejected_by: SIMPLE_RANGE_MARKER.to_string(),
    }
}

fn evaluate_conditions(tag: &TagSpec, range: &RangeSpec, raw: f64, last: Option<f64>) -> Verdict {
    let mut violations = Vec::new();

    for (index, condition) in range.conditions.iter().enumerate() {
        let Some(comparand) = comparand(condition.mode, raw, last) else {
            tracing::trace!(tag = %tag.id, condition = %condition.label(index), "Condition skipped, no usable cached value");
            continue;
        };
        if matches(&condition.kind, comparand) {
            return Verdict::Valid;
        }
        let threshold = violated_threshold(&condition.kind, comparand);
        violations.push(Violation {
            index,
            condition,
            boundary: invert(condition.mode, threshold, last),
        });
    }

    let default = violations.iter().find(|v| v.condition.is_default);
    let rejected_by = default
        .or_else(|| violations.first())
        .map(|v| v.condition.label(v.index))
        .unwrap_or_else(|| NO_CONDITION_MARKER.to_string());

    let replacement = match range.action {
        RangeAction::Fixed => range.fixed_value,
        RangeAction::Boundary => match default {
            Some(violation) => Some(violation.boundary),
            None if !range.conditions.iter().any(|c| c.is_default) => {
                tracing::warn!(
                    tag = %tag.id,
                    "Range action is boundary but no condition is flagged default; emitting nothing"
                );
                None
            }
            None => None,
        },
        RangeAction::HoldLast => Some(last.unwrap_or(raw)),
        RangeAction::Discard => None,
    };

    Verdict::Invalid {
        replacement,
        rejected_by,
    }
}

/// Value a condition compares, or `None` when the condition must be skipped.
fn comparand(mode: ConditionMode, raw: f64, last: Option<f64>) -> Option<f64> {
    match mode {
        ConditionMode::Number => Some(raw),
        ConditionMode::Rate => last
            .filter(|last| *last != 0.0)
            .map(|last| (raw - last) / last * 100.0),
        ConditionMode::Delta => last.map(|last| raw - last),
    }
}

fn matches(kind: &ConditionKind, comparand: f64) -> bool {
    match *kind {
        ConditionKind::Range { min, max } => comparand >= min && comparand <= max,
        ConditionKind::Greater { value } => comparand > value,
        ConditionKind::Less { value } => comparand < value,
    }
}

/// Threshold the comparand failed against. For ranges, the side it fell out of.
fn violated_threshold(kind: &ConditionKind, comparand: f64) -> f64 {
    match *kind {
        ConditionKind::Range { min, max } => {
            if comparand < min {
                min
            } else {
                max
            }
        }
        ConditionKind::Greater { value } | ConditionKind::Less { value } => value,
    }
}

/// Map a comparand-space threshold back into tag space.
fn invert(mode: ConditionMode, threshold: f64, last: Option<f64>) -> f64 {
    match (mode, last) {
        (ConditionMode::Rate, Some(last)) => last + (threshold / 100.0) * last,
        (ConditionMode::Delta, Some(last)) => last + threshold,
        _ => threshold,
    }
}
