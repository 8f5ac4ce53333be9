//! Textual repair of near-JSON model output into a [`ChangeDecision`].
//!
//! Models are told to answer with a single-line object but routinely wrap
//! it in markdown fences, break lines inside string values, add prose or
//! stop mid-object. Everything here is pure text transformation; callers
//! only ever see a decision or [`MalformedResponse`].

use serde::Deserialize;
use thiserror::Error;

use super::types::ChangeDecision;

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
#[error("Malformed model response ({reason}): {preview}")]
pub struct MalformedResponse {
    pub reason: String,
    pub preview: String,
}

#[derive(Deserialize)]
struct WireDecision {
    #[serde(default)]
    change_needed: Option<bool>,
    #[serde(default)]
    suggested_change: Option<String>,
    #[serde(default)]
    response: Option<String>,
}

/// Turn raw model output into a decision, repairing what can be repaired.
pub fn extract(raw: &str) -> Result<ChangeDecision, MalformedResponse> {
    let repaired = repair(raw);
    let wire: WireDecision =
        serde_json::from_str(&repaired).map_err(|e| MalformedResponse {
            reason: e.to_string(),
            preview: preview(&repaired),
        })?;

    Ok(ChangeDecision {
        change_needed: wire.change_needed.unwrap_or(false),
        suggested_change: wire.suggested_change.filter(|s| !s.is_empty()),
        response: wire.response.unwrap_or_default(),
    })
}

/// Remove a surrounding markdown code fence (optionally language-tagged).
pub fn strip_code_fence(text: &str) -> &str {
    let mut clean = text.trim();
    if let Some(rest) = clean.strip_prefix("```") {
        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.')))
            .unwrap_or(rest.len());
        clean = &rest[tag_len..];
    }
    if let Some(rest) = clean.trim_end().strip_suffix("```") {
        clean = rest;
    }
    clean.trim()
}

/// Best-effort repair of a single JSON object:
/// fences removed, leading prose dropped, whitespace outside strings
/// collapsed, raw control characters inside strings escaped, unterminated
/// strings closed, and missing outer braces added.
pub fn repair(raw: &str) -> String {
    let mut text = strip_code_fence(raw);
    if !text.starts_with('{') {
        if let Some(open) = text.find('{') {
            if !text[..open].contains('"') {
                text = &text[open..];
            }
        }
    }

    let mut out = String::with_capacity(text.len() + 2);
    let mut in_string = false;
    let mut escaped = false;
    let mut pending_space = false;
    let mut depth = 0usize;
    let mut opened = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                out.push(c);
                escaped = false;
                continue;
            }
            match c {
                '\\' => {
                    out.push(c);
                    escaped = true;
                }
                '"' => {
                    out.push(c);
                    in_string = false;
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
                c => out.push(c),
            }
            continue;
        }

        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);

        match c {
            '"' => in_string = true,
            '{' => {
                depth += 1;
                opened = true;
            }
            '}' => {
                depth = depth.saturating_sub(1);
                // Anything after the object closes is trailing prose.
                if opened && depth == 0 {
                    break;
                }
            }
            _ => {}
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    if !out.starts_with('{') {
        out.insert(0, '{');
    }
    if !out.ends_with('}') {
        out.push('}');
    }
    out
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
