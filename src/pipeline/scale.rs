//! Scale factor and fixed-decimals rounding.

use rust_decimal::RoundingStrategy;
use serde_json::Value;

use super::{finite_number, from_decimal, number_value, to_decimal, StageOutput};
use crate::model::TagSpec;

/// Multiplies by `scale`, then rounds half-up to `fixed` fractional digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaleRoundStage;

impl ScaleRoundStage {
    /// True for numeric values of tags with `scale` or `fixed`.
    pub fn applies(&self, tag: &TagSpec, value: &Value) -> bool {
        value.is_number() && (tag.scale.is_some() || tag.fixed.is_some())
    }

    /// Scale and round one value; non-finite input or output drops the field.
    pub fn handle(&self, tag: &TagSpec, value: Value) -> StageOutput {
        let Some(raw) = finite_number(&value) else {
            return StageOutput::Dropped;
        };

        match number_value(scale_round(raw, tag.scale, tag.fixed)) {
            Some(result) => StageOutput::Value(result),
            None => {
                tracing::debug!(tag = %tag.id, raw, "Scaling produced a non-finite value");
                StageOutput::Dropped
            }
        }
    }
}

pub(crate) fn scale_round(raw: f64, scale: Option<f64>, fixed: Option<u32>) -> f64 {
    let decimal = to_decimal(raw).and_then(|value| {
        let scaled = match scale {
            Some(factor) => value.checked_mul(to_decimal(factor)?)?,
            None => value,
        };
        let rounded = match fixed {
            Some(dp) => scaled.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero),
            None => scaled,
        };
        from_decimal(rounded)
    });

    decimal.unwrap_or_else(|| {
        let scaled = raw * scale.unwrap_or(1.0);
        match fixed {
            Some(dp) => {
                let factor = 10f64.powi(dp.min(i32::MAX as u32) as i32);
                (scaled * factor).round() / factor
            }
            None => scaled,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn tag(scale: Option<f64>, fixed: Option<u32>) -> TagSpec {
        TagSpec {
            scale,
            fixed,
            ..TagSpec::bare("t")
        }
    }

    #[test]
    fn test_scale_then_round() {
        assert_relative_eq!(scale_round(1.2346, Some(10.0), Some(2)), 12.35);
        assert_relative_eq!(scale_round(3.0, Some(0.5), None), 1.5);
        assert_relative_eq!(scale_round(2.71828, None, Some(3)), 2.718);
    }

    #[test]
    fn test_round_half_up() {
        assert_relative_eq!(scale_round(2.5, None, Some(0)), 3.0);
        assert_relative_eq!(scale_round(-2.5, None, Some(0)), -3.0);
        assert_relative_eq!(scale_round(0.125, None, Some(2)), 0.13);
    }

    #[test]
    fn test_identity_when_precision_matches() {
        for value in [12.34, -0.5, 100.0, 7.07] {
            assert_relative_eq!(scale_round(value, Some(1.0), Some(2)), value);
        }
    }

    #[test]
    fn test_applicability() {
        assert!(!ScaleRoundStage.applies(&tag(None, None), &json!(1.0)));
        assert!(ScaleRoundStage.applies(&tag(Some(2.0), None), &json!(1.0)));
        assert!(ScaleRoundStage.applies(&tag(None, Some(1)), &json!(1.0)));
        assert!(!ScaleRoundStage.applies(&tag(Some(2.0), None), &json!(true)));
    }

    #[test]
    fn test_overflow_is_dropped() {
        let output = ScaleRoundStage.handle(&tag(Some(f64::MAX), None), json!(f64::MAX));
        assert_eq!(output, StageOutput::Dropped);
    }
}
