//! Line grammar for reasoning service responses.
//!
//! A conforming response is a list of lines of the form
//!
//! ```text
//! <name>,<type>,<value>
//! ```
//!
//! plus at most one `explanation: <text>` line. The scanner is tolerant at
//! the line level and strict within a line: any line that does not match is
//! dropped and recorded as a [`ParseWarning`], and the rest of the response
//! still parses. Blank lines are skipped silently.
//!
//! Values by type:
//! - `Float`: a number; magnitudes beyond `f32` saturate, `inf`/`NaN` do not parse
//! - `Int`: an integer; digits beyond `i64` saturate
//! - `Bool`: `true` or `false`
//! - `Vector3`: three numbers
//! - `Color`: three or four numbers (alpha defaults to 1)
//!
//! Vector and color components may be separated by spaces or commas and may
//! be wrapped in `()`, `[]` or `{}`.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::param::{ParameterType, ParameterValue};
use crate::plan::ChangePlanEntry;

static RE_LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*•]|\d{1,3}[.)])\s+").unwrap());

static RE_EXPLANATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^explanation\s*:\s*(.*)$").unwrap());

static RE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.:\-]*$").unwrap());

/// Longest excerpt of a dropped line kept in a warning.
const EXCERPT_CHARS: usize = 120;

/// A response line that did not match the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    /// 1-based line number in the (possibly truncated) response.
    pub line: usize,
    /// The offending line, shortened.
    pub excerpt: String,
    pub reason: String,
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {} ({:?})", self.line, self.reason, self.excerpt)
    }
}

/// Everything recognised in one response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    pub entries: Vec<ChangePlanEntry>,
    pub warnings: Vec<ParseWarning>,
    pub explanation: Option<String>,
}

/// Scan a response line by line.
pub fn parse_response(text: &str) -> ParsedResponse {
    let mut out = ParsedResponse::default();

    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let line = RE_LIST_MARKER.replace(line, "");
        let line = line.trim();

        if let Some(caps) = RE_EXPLANATION.captures(line) {
            let text = caps.get(1).map_or("", |m| m.as_str()).trim();
            if out.explanation.is_none() && !text.is_empty() {
                out.explanation = Some(text.to_string());
            } else {
                out.warnings.push(warning(i, raw, "extra or empty explanation line"));
            }
            continue;
        }

        match parse_line(line) {
            Ok(entry) => out.entries.push(entry),
            Err(reason) => {
                tracing::debug!(line = i + 1, reason = %reason, "dropped response line");
                out.warnings.push(warning(i, raw, reason));
            }
        }
    }

    out
}

fn warning(index: usize, raw: &str, reason: impl Into<String>) -> ParseWarning {
    let trimmed = raw.trim();
    let mut excerpt: String = trimmed.chars().take(EXCERPT_CHARS).collect();
    if trimmed.chars().count() > EXCERPT_CHARS {
        excerpt.push('…');
    }
    ParseWarning {
        line: index + 1,
        excerpt,
        reason: reason.into(),
    }
}

/// Parse one `<name>,<type>,<value>` line.
fn parse_line(line: &str) -> Result<ChangePlanEntry, String> {
    let mut fields = line.splitn(3, ',');
    let (Some(name), Some(tag), Some(value)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err("expected <name>,<type>,<value>".into());
    };

    let name = name.trim();
    if !RE_NAME.is_match(name) {
        return Err(format!("invalid parameter name {name:?}"));
    }
    let declared =
        ParameterType::from_tag(tag).ok_or_else(|| format!("unknown type tag {:?}", tag.trim()))?;
    let value = parse_value(declared, value)?;

    Ok(ChangePlanEntry {
        name: name.to_string(),
        declared,
        value,
    })
}

/// Parse a value of the declared type.
pub fn parse_value(ty: ParameterType, raw: &str) -> Result<ParameterValue, String> {
    let raw = raw.trim();
    match ty {
        ParameterType::Float => parse_float(raw).map(ParameterValue::Float),
        ParameterType::Int => parse_int(raw).map(ParameterValue::Int),
        ParameterType::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(ParameterValue::Bool(true)),
            "false" => Ok(ParameterValue::Bool(false)),
            _ => Err(format!("{raw:?} is not true or false")),
        },
        ParameterType::Vector3 => match components(raw)?.as_slice() {
            [x, y, z] => Ok(ParameterValue::Vector3([*x, *y, *z])),
            other => Err(format!("Vector3 needs 3 components, got {}", other.len())),
        },
        ParameterType::Color => match components(raw)?.as_slice() {
            [r, g, b] => Ok(ParameterValue::Color([*r, *g, *b, 1.0])),
            [r, g, b, a] => Ok(ParameterValue::Color([*r, *g, *b, *a])),
            other => Err(format!("Color needs 3 or 4 components, got {}", other.len())),
        },
    }
}

/// Out-of-range magnitudes saturate so the validator can clamp them.
fn parse_float(raw: &str) -> Result<f32, String> {
    let unsigned = raw.trim_start_matches(['+', '-']).to_ascii_lowercase();
    if unsigned.starts_with("inf") || unsigned.starts_with("nan") {
        return Err(format!("{raw:?} is not finite"));
    }
    let v = raw
        .parse::<f64>()
        .map_err(|_| format!("{raw:?} is not a number"))?;
    Ok(v.clamp(-f64::from(f32::MAX), f64::from(f32::MAX)) as f32)
}

fn parse_int(raw: &str) -> Result<i64, String> {
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(v);
    }
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("{raw:?} is not an integer"));
    }
    Ok(if negative { i64::MIN } else { i64::MAX })
}

fn components(raw: &str) -> Result<Vec<f32>, String> {
    let inner = strip_brackets(raw);
    inner
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(parse_float)
        .collect()
}

fn strip_brackets(raw: &str) -> &str {
    for (open, close) in [('(', ')'), ('[', ']'), ('{', '}')] {
        if let Some(inner) = raw.strip_prefix(open).and_then(|s| s.strip_suffix(close)) {
            return inner.trim();
        }
    }
    raw
}
