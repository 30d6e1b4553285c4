//! Normalized record schemas shared by every consumer of the data service.
//!
//! Upstream field-name variants are absorbed here via serde aliases so the
//! rest of the system never sees raw upstream shapes.

mod models;
mod quality;

pub use models::{
    AnalysisRecord, ConsumptionRecord, DailyProductionRecord, DamStatusRecord, OutageRecord,
    ProductionRecord, SourceKind, TariffRecord, WaterLossRecord, WaterSourceRecord,
};
pub use quality::{rule_for, QualityRule};
