//! Recover the complete leading records of a truncated JSON response.
//!
//! The expected payload is `{"records": [ {...}, {...}, ... ]}`. When the
//! model hits its output cap the text stops somewhere inside the array. Each
//! strategy below proposes cut points, closes the array and its enclosing
//! containers, and keeps the first candidate that parses. A candidate can
//! only parse if the cut lands exactly on an element boundary of the records
//! array, so a parsed repair never contains a half-written record.
//!
//! Limitation: anchors are found by plain text search. A `}` or `},` inside a
//! string value is a false anchor; most of them fail the parse check, but a
//! string holding a brace sequence that happens to balance can still produce
//! a valid yet wrong split.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Name of the array field holding the records.
pub const RECORDS_FIELD: &str = "records";

/// Cut points tried per strategy before moving on.
const MAX_CANDIDATES: usize = 64;

/// Repair strategies in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStrategy {
    /// Cut after the last `}` that ends an array element (`},`, `}]` or end
    /// of text).
    LastCompleteElement,
    /// Cut after the last `}` found after the array opener.
    LastClosingBrace,
    /// No `}` after the opener: close the array empty.
    ForceClose,
}

impl RepairStrategy {
    pub const ORDER: [RepairStrategy; 3] = [
        RepairStrategy::LastCompleteElement,
        RepairStrategy::LastClosingBrace,
        RepairStrategy::ForceClose,
    ];

    /// Candidate texts for this strategy, best first.
    pub fn candidates(self, text: &str, anchor: &ArrayAnchor) -> Vec<String> {
        let body = &text[anchor.open + 1..];
        let close_at = |brace: usize| {
            let cut = anchor.open + 1 + brace + 1;
            format!("{}{}", &text[..cut], anchor.closers)
        };

        match self {
            RepairStrategy::LastCompleteElement => brace_positions(body)
                .filter(|&i| ends_element(&body[i + 1..]))
                .take(MAX_CANDIDATES)
                .map(close_at)
                .collect(),
            RepairStrategy::LastClosingBrace => brace_positions(body)
                .take(MAX_CANDIDATES)
                .map(close_at)
                .collect(),
            RepairStrategy::ForceClose => {
                if body.contains('}') {
                    Vec::new()
                } else {
                    vec![format!("{}{}", &text[..=anchor.open], anchor.closers)]
                }
            }
        }
    }
}

/// Where the records array opens and what closes everything around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayAnchor {
    /// Byte offset of the array's `[`.
    pub open: usize,
    /// Closers for every container open at that point, innermost first
    /// (`]}` for the usual payload, `]` for a bare array).
    pub closers: String,
}

/// Result of a repair run.
#[derive(Debug, Clone, PartialEq)]
pub struct Repair {
    pub text: String,
    /// Strategy that produced `text`; `None` when repair gave up.
    pub strategy: Option<RepairStrategy>,
}

/// Try each strategy in priority order; return the first candidate that
/// parses. Gives up (returns the input unchanged) when no structural anchor
/// exists or no candidate parses.
pub fn repair_truncated(text: &str) -> Repair {
    let gave_up = Repair {
        text: text.to_string(),
        strategy: None,
    };

    let Some(anchor) = locate_array(text) else {
        debug!("no records array anchor, repair gives up");
        return gave_up;
    };

    for strategy in RepairStrategy::ORDER {
        let found = strategy
            .candidates(text, &anchor)
            .into_iter()
            .find(|candidate| serde_json::from_str::<Value>(candidate).is_ok());
        if let Some(text) = found {
            debug!(?strategy, chars = text.len(), "truncated response repaired");
            return Repair {
                text,
                strategy: Some(strategy),
            };
        }
    }

    gave_up
}

/// Find the records array: the `"records"` key followed by `:` and `[`, or a
/// bare top-level array.
pub fn locate_array(text: &str) -> Option<ArrayAnchor> {
    let key = format!("\"{RECORDS_FIELD}\"");
    let keyed = text.match_indices(&key).find_map(|(at, _)| {
        let rest = text[at + key.len()..].trim_start();
        let rest = rest.strip_prefix(':')?.trim_start();
        rest.starts_with('[').then(|| text.len() - rest.len())
    });

    let open = keyed.or_else(|| {
        let trimmed = text.trim_start();
        trimmed.starts_with('[').then(|| text.len() - trimmed.len())
    })?;

    Some(ArrayAnchor {
        open,
        closers: closers_for(&text[..=open]),
    })
}

/// Closers for all containers still open at the end of `prefix`.
fn closers_for(prefix: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in prefix.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    stack.into_iter().rev().collect()
}

/// Byte offsets of every `}` in `body`, rightmost first.
fn brace_positions(body: &str) -> impl Iterator<Item = usize> + '_ {
    body.rmatch_indices('}').map(|(i, _)| i)
}

/// A `}` ends an array element when a comma or the array's `]` follows it,
/// or when nothing does (the sanitizer slices everything after the last
/// closer away). A `}]` closing an array nested inside a record leaves the
/// record open, so that candidate never parses.
fn ends_element(after: &str) -> bool {
    let after = after.trim_start();
    after.is_empty() || after.starts_with(',') || after.starts_with(']')
}
