use serde::{Deserialize, Serialize};

/// Material name used when the model could not identify the material.
pub const UNIDENTIFIED_MATERIAL: &str = "NO IDENTIFICADO";

/// Placeholder for free-text descriptors the source did not state.
pub const UNSPECIFIED: &str = "NO ESPECIFICADO";

/// Unit of measure assumed when none is given.
pub const DEFAULT_UNIT: &str = "KILOGRAMO";

/// One normalized waste-material entry, ready to be inserted as a single row.
///
/// Numeric fields are always finite and non-negative. The analysis
/// sub-structures are stored as compact JSON text that has been validated
/// before serialization (`[]` / `{}` when the model's value was unusable).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// 1-based position in the consolidated result, assigned on insertion.
    pub sequence: u32,
    pub material_name: String,
    pub waste_type: String,
    pub quantity: f64,
    pub unit: String,
    pub volume: f64,
    pub total_weight: f64,
    pub generating_unit: String,
    pub frequency: String,
    /// Basel Convention code (`A1180`, `B3010`, `Y46`).
    pub basel_code: Option<String>,
    /// Model confidence, 0-100.
    pub confidence: f64,
    pub disposal_cost: f64,
    pub circular_income: f64,
    /// Circular-economy viability, 0-100.
    pub circular_viability: f64,
    pub physicochemical: String,
    pub elemental: String,
    pub engineering_context: String,
    pub valorization_routes: String,
    pub elemental_summary: Option<String>,
    /// Label of the chunk the record was extracted from (e.g. `p3-4`).
    pub source_chunk: String,
}
