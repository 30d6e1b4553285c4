use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Numeric thresholds for one water-quality parameter. Either bound may be
/// absent; evaluation is a pure function of a value and this rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityRule {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl QualityRule {
    pub const fn range(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub const fn max_only(max: f64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    pub const fn min_only(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }
}

/// Drinking-water limits as published by the authority (mirroring directive
/// 98/83/EC parametric values where applicable).
fn rules() -> &'static HashMap<&'static str, QualityRule> {
    static RULES: OnceLock<HashMap<&'static str, QualityRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        HashMap::from([
            ("ph", QualityRule::range(6.5, 9.5)),
            ("turbidity", QualityRule::max_only(4.0)),
            ("residual chlorine", QualityRule::range(0.2, 2.0)),
            ("chlorine", QualityRule::range(0.2, 2.0)),
            ("conductivity", QualityRule::max_only(2500.0)),
            ("nitrates", QualityRule::max_only(50.0)),
            ("aluminium", QualityRule::max_only(0.2)),
            ("iron", QualityRule::max_only(0.2)),
            ("manganese", QualityRule::max_only(0.05)),
            ("coliforms", QualityRule::max_only(0.0)),
            ("e. coli", QualityRule::max_only(0.0)),
        ])
    })
}

/// Threshold rule for a parameter name, matched case-insensitively.
/// `None` means the parameter has no published limit.
pub fn rule_for(parameter: &str) -> Option<&'static QualityRule> {
    rules().get(parameter.trim().to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_and_whitespace_insensitive() {
        assert!(rule_for("pH").is_some());
        assert!(rule_for("  Turbidity ").is_some());
        assert!(rule_for("unobtainium").is_none());
    }

    #[test]
    fn ph_rule_carries_both_bounds() {
        let rule = rule_for("ph").expect("ph is a published parameter");
        assert_eq!(rule.min, Some(6.5));
        assert_eq!(rule.max, Some(9.5));
    }
}
