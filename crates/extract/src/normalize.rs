//! Turn loosely-shaped model output into [`Record`]s.
//!
//! Models answer with the Spanish persistence names (`tipo_residuo`,
//! `cantidad`, ...), the camelCase analysis names (`materialName`,
//! `baselCode`, ...) or snake_case English. Every field is looked up through
//! an alias list, coerced, and defaulted.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use cerebro_core::record::{Record, DEFAULT_UNIT, UNIDENTIFIED_MATERIAL, UNSPECIFIED};

use crate::error::RecordIssue;

const MATERIAL_NAME: &[&str] = &["material_name", "materialName", "caracteristica", "material"];
const WASTE_TYPE: &[&str] = &["waste_type", "wasteType", "tipo_residuo", "category", "categoria"];
const QUANTITY: &[&str] = &["quantity", "cantidad"];
const UNIT: &[&str] = &["unit", "unidad_medida", "unidad"];
const VOLUME: &[&str] = &["volume", "volumen"];
const TOTAL_WEIGHT: &[&str] = &["total_weight", "totalWeight", "peso_total"];
const GENERATING_UNIT: &[&str] = &["generating_unit", "generatingUnit", "unidad_generadora"];
const FREQUENCY: &[&str] = &["frequency", "frecuencia"];
const BASEL_CODE: &[&str] = &["basel_code", "baselCode", "codigo_basilea"];
const CONFIDENCE: &[&str] = &["confidence", "confianza"];
const DISPOSAL_COST: &[&str] = &["disposal_cost", "disposalCost", "costo_disposicion_final"];
const CIRCULAR_INCOME: &[&str] =
    &["circular_income", "circularIncome", "ingreso_economia_circular"];
const CIRCULAR_VIABILITY: &[&str] = &["circular_viability", "circularViability", "viabilidad_ec"];
const PHYSICOCHEMICAL: &[&str] = &["physicochemical", "fisicoquimico"];
const ELEMENTAL: &[&str] = &["elemental"];
const ENGINEERING_CONTEXT: &[&str] = &["engineering_context", "engineeringContext"];
const VALORIZATION_ROUTES: &[&str] = &["valorization_routes", "valorizationRoutes"];
const ELEMENTAL_SUMMARY: &[&str] = &["elemental_summary", "elementalSummary"];

/// One element of the records array exactly as the model produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord(Value);

impl RawRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    fn object(&self) -> Option<&Map<String, Value>> {
        self.0.as_object()
    }

    /// First alias holding a meaningful value. `null` and blank strings count
    /// as absent.
    fn field(&self, aliases: &[&str]) -> Option<&Value> {
        let obj = self.object()?;
        aliases
            .iter()
            .filter_map(|name| obj.get(*name))
            .find(|v| match v {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                _ => true,
            })
    }

    fn text(&self, aliases: &[&str]) -> Option<String> {
        match self.field(aliases)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Present fields that do not parse degrade to zero.
    fn amount(&self, aliases: &[&str]) -> f64 {
        non_negative(self.field(aliases).and_then(number).unwrap_or(0.0))
    }

    fn percentage(&self, aliases: &[&str]) -> f64 {
        self.amount(aliases).min(100.0)
    }
}

/// Normalize one raw record. `index` is its position in the chunk's array,
/// used only for diagnostics.
pub fn normalize_record(raw: &RawRecord, index: usize, chunk_label: &str) -> Result<Record, RecordIssue> {
    if raw.object().is_none() {
        return Err(RecordIssue::NotAnObject { index });
    }

    let waste_type = raw.text(WASTE_TYPE);
    let quantity = raw.field(QUANTITY);

    let mut missing = Vec::new();
    if waste_type.is_none() {
        missing.push("waste_type");
    }
    if quantity.is_none() {
        missing.push("quantity");
    }
    let (Some(waste_type), Some(quantity)) = (waste_type, quantity) else {
        return Err(RecordIssue::Incomplete { index, missing });
    };

    Ok(Record {
        sequence: 0,
        material_name: raw
            .text(MATERIAL_NAME)
            .unwrap_or_else(|| UNIDENTIFIED_MATERIAL.to_string()),
        waste_type,
        quantity: non_negative(number(quantity).unwrap_or(0.0)),
        unit: raw.text(UNIT).unwrap_or_else(|| DEFAULT_UNIT.to_string()),
        volume: raw.amount(VOLUME),
        total_weight: raw.amount(TOTAL_WEIGHT),
        generating_unit: raw
            .text(GENERATING_UNIT)
            .unwrap_or_else(|| UNSPECIFIED.to_string()),
        frequency: raw.text(FREQUENCY).unwrap_or_else(|| UNSPECIFIED.to_string()),
        basel_code: raw.text(BASEL_CODE).and_then(|c| basel_code(&c)),
        confidence: raw.percentage(CONFIDENCE),
        disposal_cost: raw.amount(DISPOSAL_COST),
        circular_income: raw.amount(CIRCULAR_INCOME),
        circular_viability: raw.percentage(CIRCULAR_VIABILITY),
        physicochemical: nested(raw.field(PHYSICOCHEMICAL), Shape::List),
        elemental: nested(raw.field(ELEMENTAL), Shape::List),
        engineering_context: nested(raw.field(ENGINEERING_CONTEXT), Shape::Object),
        valorization_routes: nested(raw.field(VALORIZATION_ROUTES), Shape::List),
        elemental_summary: raw.text(ELEMENTAL_SUMMARY),
        source_chunk: chunk_label.to_string(),
    })
}

/// Normalize every element of a chunk's records array. Returns the kept
/// records and the number dropped.
pub fn normalize_records(values: Vec<Value>, chunk_label: &str) -> (Vec<Record>, usize) {
    let mut records = Vec::with_capacity(values.len());
    let mut dropped = 0;

    for (index, value) in values.into_iter().enumerate() {
        match normalize_record(&RawRecord::new(value), index, chunk_label) {
            Ok(record) => records.push(record),
            Err(issue) => {
                warn!(chunk = %chunk_label, %issue, "record dropped");
                dropped += 1;
            }
        }
    }

    (records, dropped)
}

// ── Numbers ─────────────────────────────────────────────────────────────────

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_locale_number(s),
        _ => None,
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 { v } else { 0.0 }
}

/// Parse a number written with either decimal convention, ignoring
/// surrounding units and currency (`"S/. 1.234,56"`, `"25 kg"`, `"80%"`).
///
/// With both separators present the rightmost one is the decimal point. A
/// separator repeated between digit groups is a thousands separator. A lone
/// separator is a decimal point.
pub fn parse_locale_number(input: &str) -> Option<f64> {
    let compact: Vec<char> = input.chars().filter(|c| !c.is_whitespace()).collect();

    let first_digit = compact.iter().position(|c| c.is_ascii_digit())?;
    let mut start = first_digit;
    if start > 0 && matches!(compact[start - 1], '.' | ',') {
        let lead_ok = start == 1 || matches!(compact[start - 2], '-' | '+');
        if lead_ok {
            start -= 1;
        }
    }
    let negative = start > 0 && compact[start - 1] == '-';

    let run: String = compact[start..]
        .iter()
        .take_while(|c| c.is_ascii_digit() || matches!(**c, '.' | ','))
        .collect();
    let run = run.trim_end_matches(['.', ',']);

    let digits = resolve_separators(run);
    let value: f64 = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Rewrite a digit run into `1234.56` form.
fn resolve_separators(run: &str) -> String {
    let dots = run.matches('.').count();
    let commas = run.matches(',').count();

    let decimal = match (dots, commas) {
        (0, 0) => None,
        (_, 0) if dots > 1 => None,
        (0, _) if commas > 1 => None,
        (_, 0) => Some('.'),
        (0, _) => Some(','),
        _ => run.rfind(['.', ',']).and_then(|i| run[i..].chars().next()),
    };

    let decimal_at = decimal.and_then(|sep| run.rfind(sep));
    if ambiguous_thousands(run) {
        debug!(value = run, "lone separator before three digits read as decimal point");
    }
    run.char_indices()
        .filter_map(|(i, c)| match c {
            '.' | ',' if Some(i) == decimal_at => Some('.'),
            '.' | ',' => None,
            d => Some(d),
        })
        .collect()
}

/// `1,500` or `1.234`: a single separator followed by exactly three digits
/// could also be an English or Spanish thousands separator.
fn ambiguous_thousands(run: &str) -> bool {
    let mut seps = run.match_indices(['.', ',']);
    match (seps.next(), seps.next()) {
        (Some((at, _)), None) => at > 0 && run.len() - at - 1 == 3,
        _ => false,
    }
}

// ── Codes and nested structures ─────────────────────────────────────────────

/// Uppercased Basel Convention code (`A1180`, `B3010`, `Y46`), or `None`
/// when the value does not look like one.
fn basel_code(raw: &str) -> Option<String> {
    let code: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    let mut chars = code.chars();
    let prefix = chars.next()?;
    let digits = chars.as_str();
    let valid = matches!(prefix, 'A' | 'B' | 'Y')
        && (1..=4).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit());
    valid.then_some(code)
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    /// Array of objects.
    List,
    Object,
}

impl Shape {
    fn placeholder(self) -> &'static str {
        match self {
            Shape::List => "[]",
            Shape::Object => "{}",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Shape::List, Value::Array(items)) => items.iter().all(Value::is_object),
            (Shape::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

/// Compact JSON text for a nested field. A string holding JSON is decoded
/// first; anything of the wrong shape becomes the empty placeholder.
fn nested(value: Option<&Value>, shape: Shape) -> String {
    let decoded;
    let value = match value {
        Some(Value::String(s)) => {
            decoded = serde_json::from_str::<Value>(s).ok();
            decoded.as_ref()
        }
        other => other,
    };

    match value {
        Some(v) if shape.accepts(v) => v.to_string(),
        _ => shape.placeholder().to_string(),
    }
}
