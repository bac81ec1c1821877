//! Raw range to engineering-unit range conversion.

use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;

use super::{finite_number, from_decimal, number_value, to_decimal, StageOutput};
use crate::model::TagSpec;

/// Fractional digits kept by the division step.
const DIVISION_SCALE: u32 = 16;

/// Maps `[minRaw, maxRaw]` linearly onto `[minValue, maxValue]`.
///
/// Only applies when the tag carries all four bounds and the value is numeric.
/// The arithmetic runs in decimal so repeated conversions of the same quantity
/// do not accumulate binary rounding error.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearMappingStage;

impl LinearMappingStage {
    /// True for numeric values of tags with a complete mapping.
    pub fn applies(&self, tag: &TagSpec, value: &Value) -> bool {
        value.is_number() && tag.tag_value.and_then(|m| m.complete()).is_some()
    }

    /// Map one value; non-finite input or output drops the field.
    pub fn handle(&self, tag: &TagSpec, value: Value) -> StageOutput {
        let Some((min_raw, max_raw, min_value, max_value)) =
            tag.tag_value.and_then(|m| m.complete())
        else {
            return StageOutput::Value(value);
        };
        let Some(raw) = finite_number(&value) else {
            return StageOutput::Dropped;
        };

        match number_value(map(raw, min_raw, max_raw, min_value, max_value)) {
            Some(mapped) => StageOutput::Value(mapped),
            None => {
                tracing::debug!(tag = %tag.id, raw, "Linear mapping produced a non-finite value");
                StageOutput::Dropped
            }
        }
    }
}

/// Clamp `raw` into the raw range and map it onto the value range.
///
/// A degenerate raw range (`min_raw == max_raw`) returns the clamped input.
pub(crate) fn map(raw: f64, min_raw: f64, max_raw: f64, min_value: f64, max_value: f64) -> f64 {
    let (lo, hi) = if min_raw <= max_raw {
        (min_raw, max_raw)
    } else {
        (max_raw, min_raw)
    };
    let clamped = raw.max(lo).min(hi);
    if min_raw == max_raw {
        return clamped;
    }

    map_decimal(clamped, min_raw, max_raw, min_value, max_value).unwrap_or_else(|| {
        // Outside the decimal range; fall back to binary floating point.
        (clamped - min_raw) / (max_raw - min_raw) * (max_value - min_value) + min_value
    })
}

fn map_decimal(clamped: f64, min_raw: f64, max_raw: f64, min_value: f64, max_value: f64) -> Option<f64> {
    let clamped = to_decimal(clamped)?;
    let min_raw = to_decimal(min_raw)?;
    let max_raw = to_decimal(max_raw)?;
    let min_value = to_decimal(min_value)?;
    let max_value = to_decimal(max_value)?;

    let ratio: Decimal = clamped
        .checked_sub(min_raw)?
        .checked_div(max_raw.checked_sub(min_raw)?)?
        .round_dp_with_strategy(DIVISION_SCALE, RoundingStrategy::MidpointTowardZero);
    let result = ratio
        .checked_mul(max_value.checked_sub(min_value)?)?
        .checked_add(min_value)?;
    from_decimal(result)
}
