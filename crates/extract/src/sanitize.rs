//! Strip formatting artifacts around a JSON payload.
//!
//! Models wrap JSON in Markdown fences, add a sentence of prose before or
//! after it, and leave trailing commas that strict parsers reject. All three
//! are handled here as a pure, idempotent text transformation.

/// Clean a raw model response so it has the best chance of parsing.
///
/// Steps: strip code fences, slice from the first `{`/`[` to the last
/// `}`/`]`, drop commas that sit directly before a closer. Never fails: with
/// no JSON delimiters the trimmed, fence-less input comes back unchanged.
pub fn sanitize(raw: &str) -> String {
    let text = strip_code_fences(raw);
    match json_span(text) {
        Some(span) => remove_trailing_commas(span),
        None => text.to_string(),
    }
}

/// Remove leading/trailing Markdown fence markers until none are left.
fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    loop {
        let before = text.len();
        if let Some(rest) = text.strip_prefix("```") {
            text = skip_fence_tag(rest).trim();
        }
        if let Some(rest) = text.strip_suffix("```") {
            text = rest.trim();
        }
        if text.len() == before {
            return text;
        }
    }
}

/// Drop an info string such as `json` that follows an opening fence.
fn skip_fence_tag(rest: &str) -> &str {
    let is_tag_char = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
    match rest.find('\n') {
        Some(nl) if rest[..nl].trim().chars().all(is_tag_char) => &rest[nl + 1..],
        _ => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    }
}

/// Slice from the first opener to the last closer, if both exist in order.
fn json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let end = text.rfind(['}', ']'])?;
    (start < end).then(|| &text[start..=end])
}

/// Remove commas (and the whitespace around them) that directly precede a
/// `}` or `]`. String literals are left untouched.
fn remove_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            out.push(ch);
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
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '}' | ']' => {
                let kept = out
                    .trim_end_matches(|c: char| c == ',' || c.is_whitespace())
                    .len();
                if out[kept..].contains(',') {
                    out.truncate(kept);
                }
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}
