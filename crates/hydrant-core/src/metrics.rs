//! Derived figures: production comparisons, quality banding and the
//! reserve depletion projection. All pure; the ticker that animates the
//! projection lives in `countdown`.

use std::time::Duration;

use crate::domain::{ProductionRecord, QualityRule, SourceKind};

pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Production for one month, split by source kind.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProductionTotals {
    pub dams: f64,
    pub wells: f64,
}

impl ProductionTotals {
    pub fn total(&self) -> f64 {
        self.dams + self.wells
    }
}

pub fn monthly_totals(records: &[ProductionRecord], year: i32, month: u8) -> ProductionTotals {
    let mut totals = ProductionTotals::default();
    for record in records {
        if record.year == year && record.month == month {
            match record.source_kind() {
                SourceKind::Dam => totals.dams += record.amount,
                SourceKind::Well => totals.wells += record.amount,
            }
        }
    }
    totals
}

/// Year-over-year production comparison for one month.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum YoyComparison {
    /// The prior year has no data for this month (or a zero total), so no
    /// percentage can be formed.
    NoPriorData { current: f64 },
    Delta {
        current: f64,
        previous: f64,
        percent_change: f64,
    },
}

/// Compares this month's total against the same month a year earlier.
/// A missing or zero prior total yields `NoPriorData`; the percentage is
/// always finite.
pub fn year_over_year(records: &[ProductionRecord], year: i32, month: u8) -> YoyComparison {
    compare(
        monthly_totals(records, year, month).total(),
        monthly_totals(records, year - 1, month).total(),
    )
}

/// The year-over-year comparison with the per-source split alongside the
/// overall figure. Each category signals missing prior data on its own, so
/// dams with a prior year still get a delta when the wells do not.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoyBreakdown {
    pub overall: YoyComparison,
    pub dams: YoyComparison,
    pub wells: YoyComparison,
}

pub fn year_over_year_breakdown(records: &[ProductionRecord], year: i32, month: u8) -> YoyBreakdown {
    let current = monthly_totals(records, year, month);
    let previous = monthly_totals(records, year - 1, month);

    YoyBreakdown {
        overall: compare(current.total(), previous.total()),
        dams: compare(current.dams, previous.dams),
        wells: compare(current.wells, previous.wells),
    }
}

fn compare(current: f64, previous: f64) -> YoyComparison {
    if previous <= 0.0 {
        YoyComparison::NoPriorData { current }
    } else {
        YoyComparison::Delta {
            current,
            previous,
            percent_change: (current - previous) / previous * 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityBand {
    Good,
    Warning,
    Danger,
    /// No rule covers this parameter.
    Unknown,
}

/// Bands a measurement against its rule. Outside `[min, max]` is danger.
/// Warning marks values closing in on a bound: at or above 80% of the
/// maximum, at or below 110% of the minimum (120% when the minimum is the
/// only bound). A zero maximum has no warning band; any excess is danger.
pub fn classify(value: f64, rule: Option<&QualityRule>) -> QualityBand {
    let Some(rule) = rule else {
        return QualityBand::Unknown;
    };

    if let Some(min) = rule.min {
        if value < min {
            return QualityBand::Danger;
        }
    }
    if let Some(max) = rule.max {
        if value > max {
            return QualityBand::Danger;
        }
    }

    match (rule.min, rule.max) {
        (Some(min), Some(max)) => {
            if (max > 0.0 && value >= 0.8 * max) || value <= 1.1 * min {
                QualityBand::Warning
            } else {
                QualityBand::Good
            }
        }
        (None, Some(max)) => {
            if max > 0.0 && value >= 0.8 * max {
                QualityBand::Warning
            } else {
                QualityBand::Good
            }
        }
        (Some(min), None) => {
            if value <= 1.2 * min {
                QualityBand::Warning
            } else {
                QualityBand::Good
            }
        }
        (None, None) => QualityBand::Unknown,
    }
}

/// A linear drain of the current reserve at the observed daily consumption.
/// Anchored once; `remaining_at` extrapolates from the anchor so successive
/// renders never drift.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepletionProjection {
    pub anchor_volume: f64,
    pub per_second: f64,
}

impl DepletionProjection {
    pub fn new(anchor_volume: f64, daily_consumption: f64) -> Self {
        Self {
            anchor_volume: anchor_volume.max(0.0),
            per_second: (daily_consumption / SECONDS_PER_DAY).max(0.0),
        }
    }

    /// Remaining volume after `elapsed`, floored at zero.
    pub fn remaining_at(&self, elapsed: Duration) -> f64 {
        (self.anchor_volume - self.per_second * elapsed.as_secs_f64()).max(0.0)
    }

    /// Seconds until the reserve hits zero, if it is draining at all.
    pub fn seconds_to_empty(&self) -> Option<f64> {
        if self.per_second > 0.0 {
            Some(self.anchor_volume / self.per_second)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rule_for;

    fn record(year: i32, month: u8, name: &str, amount: f64) -> ProductionRecord {
        ProductionRecord {
            year,
            month,
            source_name: name.to_owned(),
            amount,
        }
    }

    #[test]
    fn monthly_totals_split_dams_from_wells() {
        let records = vec![
            record(2026, 7, "Kouris Dam", 120.0),
            record(2026, 7, "Akrotiri Borehole", 30.0),
            record(2026, 6, "Kouris Dam", 999.0),
        ];
        let totals = monthly_totals(&records, 2026, 7);
        assert_eq!(totals.dams, 120.0);
        assert_eq!(totals.wells, 30.0);
        assert_eq!(totals.total(), 150.0);
    }

    #[test]
    fn yoy_reports_a_finite_percentage() {
        let records = vec![
            record(2026, 7, "Kouris Dam", 110.0),
            record(2025, 7, "Kouris Dam", 100.0),
        ];
        match year_over_year(&records, 2026, 7) {
            YoyComparison::Delta {
                percent_change, ..
            } => assert!((percent_change - 10.0).abs() < 1e-9),
            other => panic!("expected a delta, got {other:?}"),
        }
    }

    #[test]
    fn yoy_without_a_prior_year_is_no_prior_data() {
        let records = vec![record(2026, 7, "Kouris Dam", 110.0)];
        assert_eq!(
            year_over_year(&records, 2026, 7),
            YoyComparison::NoPriorData { current: 110.0 }
        );
    }

    #[test]
    fn yoy_breakdown_handles_missing_prior_data_per_category() {
        // Dams have a prior July; the wells only started reporting in 2026.
        let records = vec![
            record(2026, 7, "Kouris Dam", 110.0),
            record(2026, 7, "Akrotiri Borehole", 40.0),
            record(2025, 7, "Kouris Dam", 100.0),
        ];

        let breakdown = year_over_year_breakdown(&records, 2026, 7);
        match breakdown.dams {
            YoyComparison::Delta {
                current,
                previous,
                percent_change,
            } => {
                assert_eq!(current, 110.0);
                assert_eq!(previous, 100.0);
                assert!((percent_change - 10.0).abs() < 1e-9);
            }
            other => panic!("expected a dam delta, got {other:?}"),
        }
        assert_eq!(
            breakdown.wells,
            YoyComparison::NoPriorData { current: 40.0 }
        );
        match breakdown.overall {
            YoyComparison::Delta {
                current, previous, ..
            } => {
                assert_eq!(current, 150.0);
                assert_eq!(previous, 100.0);
            }
            other => panic!("expected an overall delta, got {other:?}"),
        }
    }

    #[test]
    fn yoy_with_a_zero_prior_total_is_no_prior_data() {
        let records = vec![
            record(2026, 7, "Kouris Dam", 110.0),
            record(2025, 7, "Kouris Dam", 0.0),
        ];
        assert!(matches!(
            year_over_year(&records, 2026, 7),
            YoyComparison::NoPriorData { .. }
        ));
    }

    #[test]
    fn ph_bands_cover_good_warning_and_danger() {
        let rule = rule_for("ph");
        assert_eq!(classify(7.2, rule), QualityBand::Good);
        // 0.8 * 9.5 = 7.6
        assert_eq!(classify(7.6, rule), QualityBand::Warning);
        // 1.1 * 6.5 = 7.15
        assert_eq!(classify(7.1, rule), QualityBand::Warning);
        assert_eq!(classify(6.4, rule), QualityBand::Danger);
        assert_eq!(classify(9.6, rule), QualityBand::Danger);
    }

    #[test]
    fn chlorine_lower_warning_boundary_is_inclusive() {
        // 1.1 * 0.2 = 0.22, so 0.21 warns and 0.23 is good.
        let rule = rule_for("chlorine");
        assert_eq!(classify(0.21, rule), QualityBand::Warning);
        assert_eq!(classify(0.23, rule), QualityBand::Good);
    }

    #[test]
    fn a_zero_maximum_has_no_warning_band() {
        let rule = rule_for("coliforms");
        assert_eq!(classify(0.0, rule), QualityBand::Good);
        assert_eq!(classify(1.0, rule), QualityBand::Danger);
    }

    #[test]
    fn unknown_parameters_get_the_unknown_band() {
        assert_eq!(classify(5.0, rule_for("unobtainium")), QualityBand::Unknown);
        assert_eq!(classify(5.0, None), QualityBand::Unknown);
    }

    #[test]
    fn projection_drains_linearly_and_floors_at_zero() {
        // Daily consumption chosen so the drain is 400 units per second.
        let projection = DepletionProjection::new(1_000.0, 400.0 * SECONDS_PER_DAY);
        assert_eq!(projection.per_second, 400.0);
        assert_eq!(projection.remaining_at(Duration::from_secs(1)), 600.0);
        assert_eq!(projection.remaining_at(Duration::from_secs(2_000)), 0.0);
        assert_eq!(projection.seconds_to_empty(), Some(2.5));
    }

    #[test]
    fn an_idle_projection_never_empties() {
        let projection = DepletionProjection::new(1_000.0, 0.0);
        assert_eq!(projection.remaining_at(Duration::from_secs(3_600)), 1_000.0);
        assert_eq!(projection.seconds_to_empty(), None);
    }
}
