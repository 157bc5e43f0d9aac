//! Record types persisted by the local store.
//!
//! Identifiers are assigned by the store on insert; a freshly entered record
//! carries `id: None`. All interchange types serialize camelCase for the UI
//! and for export snapshots.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three collections held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Activities,
    Factors,
    Standards,
}

impl RecordKind {
    /// Every kind, in the order `clear_all_data` walks them.
    pub const ALL: [RecordKind; 3] = [
        RecordKind::Activities,
        RecordKind::Factors,
        RecordKind::Standards,
    ];

    pub(crate) fn table(self) -> &'static str {
        match self {
            RecordKind::Activities => "activities",
            RecordKind::Factors => "factors",
            RecordKind::Standards => "standards",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

/// Calculation method of an emission factor. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodType {
    FuelBased,
    DistanceBased,
    SpendBased,
    AverageData,
    SupplierSpecific,
    DirectMeasurement,
}

#[derive(Debug, Error)]
#[error("unknown method type: {0}")]
pub struct UnknownMethodType(String);

impl std::fmt::Display for MethodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MethodType::FuelBased => "fuel_based",
            MethodType::DistanceBased => "distance_based",
            MethodType::SpendBased => "spend_based",
            MethodType::AverageData => "average_data",
            MethodType::SupplierSpecific => "supplier_specific",
            MethodType::DirectMeasurement => "direct_measurement",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for MethodType {
    type Err = UnknownMethodType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fuel_based" => Ok(MethodType::FuelBased),
            "distance_based" => Ok(MethodType::DistanceBased),
            "spend_based" => Ok(MethodType::SpendBased),
            "average_data" => Ok(MethodType::AverageData),
            "supplier_specific" => Ok(MethodType::SupplierSpecific),
            "direct_measurement" => Ok(MethodType::DirectMeasurement),
            other => Err(UnknownMethodType(other.to_string())),
        }
    }
}

/// Factor data copied into an activity at entry time, so the stored emission
/// figure survives later edits to the referenced factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorSnapshot {
    pub description: String,
    pub co2e_per_unit: f64,
    pub unit: String,
    pub factor_unit: String,
}

/// One reporting activity row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingActivity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub period_start: String,
    pub period_end: String,
    pub scope: String,
    pub category: String,
    pub name: String,
    pub location: String,
    pub quantity: f64,
    /// Reference to an [`EmissionFactor`] by id, or —
    #[serde(default)]
    pub factor_ref: Option<i64>,
    /// — an embedded copy of the factor captured when the row was entered.
    #[serde(default)]
    pub factor_snapshot: Option<FactorSnapshot>,
    #[serde(default)]
    pub remarks: Option<String>,
    /// `quantity * co2e_per_unit` as known at write time. Stored, never
    /// recomputed on read.
    #[serde(default)]
    pub calculated_emissions: f64,
}

/// One emission factor row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissionFactor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub description: String,
    pub scope: String,
    pub category: String,
    pub location: String,
    pub unit: String,
    pub data_source: String,
    pub method_type: MethodType,
    pub co2e_per_unit: f64,
    pub factor_unit: String,
    /// Name of the GHG reporting standard this factor belongs to.
    pub standard: String,
    pub source_reference: String,
}

/// A GHG reporting standard. Names are unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GhgReportingStandard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
}

/// Bulk export/import structure covering all three kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSnapshot {
    #[serde(default)]
    pub activities: Vec<ReportingActivity>,
    #[serde(default)]
    pub factors: Vec<EmissionFactor>,
    #[serde(default)]
    pub standards: Vec<GhgReportingStandard>,
}
