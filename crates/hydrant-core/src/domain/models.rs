use serde::{Deserialize, Serialize};

/// Whether a production source is a dam or a well. Upstreams never send this
/// explicitly; it is inferred from the source name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Dam,
    Well,
}

impl SourceKind {
    /// Substring inference on the upstream name/type field.
    pub fn infer(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("well") || lower.contains("borehole") || lower.contains("γεώτρηση") {
            Self::Well
        } else {
            Self::Dam
        }
    }
}

/// One dam's current storage picture.
///
/// Usable figures are meaningful only when `max_capacity > min_capacity`
/// (the dead-storage floor); both accessors return `None` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamStatusRecord {
    #[serde(alias = "dam_name", alias = "dam")]
    pub name: String,
    #[serde(default, alias = "storage", alias = "current_storage")]
    pub current_volume: f64,
    #[serde(default, alias = "dead_storage")]
    pub min_capacity: f64,
    #[serde(default, alias = "capacity", alias = "total_capacity")]
    pub max_capacity: f64,
    #[serde(default, alias = "fill_rate", alias = "percentage")]
    pub fill_rate_percent: f64,
    #[serde(default, alias = "measurement_date")]
    pub date: Option<String>,
}

impl DamStatusRecord {
    pub fn usable_volume(&self) -> Option<f64> {
        (self.max_capacity > self.min_capacity)
            .then(|| (self.current_volume - self.min_capacity).max(0.0))
    }

    pub fn usable_capacity(&self) -> Option<f64> {
        (self.max_capacity > self.min_capacity).then(|| self.max_capacity - self.min_capacity)
    }
}

/// Registry entry for a dam or well operated by the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterSourceRecord {
    #[serde(alias = "source_name")]
    pub name: String,
    #[serde(default, alias = "type", alias = "kind")]
    pub source_type: Option<String>,
    #[serde(default, alias = "region")]
    pub district: Option<String>,
}

impl WaterSourceRecord {
    pub fn kind(&self) -> SourceKind {
        match &self.source_type {
            Some(explicit) => SourceKind::infer(explicit),
            None => SourceKind::infer(&self.name),
        }
    }
}

/// Monthly production amount attributed to one source. Several records share
/// a (year, month) across differing source names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionRecord {
    pub year: i32,
    /// Calendar month, 1-12.
    pub month: u8,
    #[serde(alias = "source", alias = "name")]
    pub source_name: String,
    #[serde(default, alias = "quantity", alias = "volume")]
    pub amount: f64,
}

impl ProductionRecord {
    pub fn source_kind(&self) -> SourceKind {
        SourceKind::infer(&self.source_name)
    }
}

/// One day of total water production.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyProductionRecord {
    #[serde(alias = "production_date")]
    pub date: String,
    #[serde(default, alias = "quantity", alias = "volume")]
    pub amount: f64,
    #[serde(default, alias = "source")]
    pub source_name: Option<String>,
}

/// A scheduled or unplanned supply interruption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutageRecord {
    #[serde(alias = "location", alias = "affected_area")]
    pub area: String,
    #[serde(default, alias = "region")]
    pub district: Option<String>,
    #[serde(default, alias = "start", alias = "start_time")]
    pub start_date: Option<String>,
    #[serde(default, alias = "end", alias = "end_time")]
    pub end_date: Option<String>,
    #[serde(default, alias = "cause", alias = "description")]
    pub reason: Option<String>,
}

/// One water-quality measurement: a named parameter, its value and where it
/// was sampled. Used by weekly, district and dam analyses alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    #[serde(alias = "param", alias = "parameter_name")]
    pub parameter: String,
    #[serde(default, alias = "result")]
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, alias = "sample_date", alias = "analysis_date")]
    pub date: Option<String>,
    #[serde(default, alias = "region", alias = "sampling_point")]
    pub district: Option<String>,
}

/// Billed consumption for one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub year: i32,
    pub month: u8,
    #[serde(default, alias = "quantity", alias = "volume")]
    pub amount: f64,
}

/// Non-revenue water for one year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterLossRecord {
    pub year: i32,
    #[serde(default, alias = "loss_percent", alias = "percentage")]
    pub percent: f64,
    #[serde(default, alias = "loss_volume")]
    pub volume: Option<f64>,
}

/// One tariff block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TariffRecord {
    #[serde(alias = "customer_category")]
    pub category: String,
    #[serde(default, alias = "tier")]
    pub block: Option<String>,
    #[serde(default, alias = "price", alias = "rate")]
    pub price_per_cubic_meter: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_kind_is_inferred_from_name_substrings() {
        assert_eq!(SourceKind::infer("Kouris Dam"), SourceKind::Dam);
        assert_eq!(SourceKind::infer("Akrotiri Borehole 3"), SourceKind::Well);
        assert_eq!(SourceKind::infer("Garyllis well field"), SourceKind::Well);
        assert_eq!(SourceKind::infer("Γεώτρηση Λεμεσού"), SourceKind::Well);
    }

    #[test]
    fn usable_figures_require_max_above_min() {
        let dam = DamStatusRecord {
            name: String::from("Kouris"),
            current_volume: 60.0,
            min_capacity: 10.0,
            max_capacity: 115.0,
            fill_rate_percent: 52.2,
            date: None,
        };
        assert_eq!(dam.usable_volume(), Some(50.0));
        assert_eq!(dam.usable_capacity(), Some(105.0));

        let degenerate = DamStatusRecord {
            min_capacity: 115.0,
            max_capacity: 115.0,
            ..dam
        };
        assert_eq!(degenerate.usable_volume(), None);
        assert_eq!(degenerate.usable_capacity(), None);
    }

    #[test]
    fn usable_volume_floors_below_dead_storage() {
        let dam = DamStatusRecord {
            name: String::from("Almyros"),
            current_volume: 5.0,
            min_capacity: 10.0,
            max_capacity: 100.0,
            fill_rate_percent: 5.0,
            date: None,
        };
        assert_eq!(dam.usable_volume(), Some(0.0));
    }

    #[test]
    fn upstream_aliases_deserialize_into_the_normalized_shape() {
        let record: DamStatusRecord = serde_json::from_value(json!({
            "dam_name": "Asprokremmos",
            "storage": 30.5,
            "dead_storage": 2.0,
            "capacity": 52.4,
            "fill_rate": 58.2
        }))
        .expect("aliases should apply");

        assert_eq!(record.name, "Asprokremmos");
        assert!((record.max_capacity - 52.4).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_optional_fields_default_instead_of_failing() {
        let record: OutageRecord =
            serde_json::from_value(json!({"area": "Mesa Geitonia"})).expect("minimal outage");
        assert_eq!(record.area, "Mesa Geitonia");
        assert!(record.start_date.is_none());
    }
}
