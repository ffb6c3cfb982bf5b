//! Output schema and default instruction sent with every chunk.

use serde_json::{json, Value};

use crate::repair::RECORDS_FIELD;

/// Instruction used when no instruction file is configured.
pub const DEFAULT_INSTRUCTION: &str = "\
You are an expert material scientist auditing industrial waste declarations.
The user message is a fragment of a technical document (waste inventory,
safety data sheet or generation report). Identify every waste material the
fragment declares and return one record per material.

Rules:
- Use only information present in the fragment. Never invent quantities.
- `tipo_residuo` is the waste category (PELIGROSO, NO PELIGROSO, ESPECIAL...).
- `cantidad` is the declared quantity as a number, in `unidad_medida`.
- `codigo_basilea` is the Basel Convention code (A1180, B3010, Y46) when stated.
- `confidence` and `viabilidad_ec` are scores from 0 to 100.
- Keep each record compact; omit fields you cannot determine.
- If the fragment declares no waste, return an empty records array.
Translate descriptive values to Spanish.";

/// JSON Schema for `{"records": [...]}`. Only the load-bearing fields are
/// required so the service can still answer for sparse fragments.
pub fn records_schema() -> Value {
    let text = json!({ "type": "string" });
    let number = json!({ "type": "number" });

    json!({
        "type": "object",
        "properties": {
            RECORDS_FIELD: {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "caracteristica": text,
                        "tipo_residuo": text,
                        "cantidad": number,
                        "unidad_medida": text,
                        "volumen": number,
                        "peso_total": number,
                        "unidad_generadora": text,
                        "frecuencia": text,
                        "codigo_basilea": text,
                        "confidence": number,
                        "costo_disposicion_final": number,
                        "ingreso_economia_circular": number,
                        "viabilidad_ec": number,
                        "physicochemical": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": { "name": text, "value": text, "method": text },
                            },
                        },
                        "elemental": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "label": text,
                                    "value": number,
                                    "description": text,
                                    "trace": { "type": "boolean" },
                                },
                            },
                        },
                        "elementalSummary": text,
                        "engineeringContext": {
                            "type": "object",
                            "properties": {
                                "structure": text,
                                "processability": text,
                                "impurities": text,
                            },
                        },
                        "valorizationRoutes": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "role": text,
                                    "method": text,
                                    "output": text,
                                    "score": number,
                                },
                            },
                        },
                    },
                    "required": ["tipo_residuo", "cantidad"],
                },
            },
        },
        "required": [RECORDS_FIELD],
    })
}
