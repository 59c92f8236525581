// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Request body normalization.
//!
//! Game clients have posted records in several shapes over time. Every shape
//! is reduced here to one [`Record`] with exactly the types the Bitable
//! columns accept:
//! - text columns are trimmed strings, even if a single-select option object
//!   leaked into the payload
//! - the move count is a finite, non-negative integer (rounded half-up)
//! - the video flag is a strict boolean, defaulting to "not seen"

use crate::models::record::columns;
use crate::models::Record;
use serde_json::{Map, Value};

/// Reserved key for a nested object keyed by the Chinese column names.
pub const FIELDS_KEY: &str = "fields";
/// Second reserved key accepted for the same nested layout.
pub const DATA_KEY: &str = "data";

/// Keys that may carry the inner scalar of a single-select option object.
const OPTION_INNER_KEYS: [&str; 3] = ["name", "text", "value"];

const FLAT_MOVES_KEYS: [&str; 3] = ["l3_moves", "moves", "level3_moves"];
const FLAT_VIDEO_KEYS: [&str; 2] = ["v_seen", "seen"];
const NESTED_MOVES_KEYS: [&str; 2] = [columns::LEVEL3_MOVES, columns::LEVEL3_MOVES_ALT];

/// Tokens (lowercased) that mean the video was watched.
const AFFIRMATIVE_TOKENS: [&str; 8] = ["是", "yes", "y", "true", "1", "seen", "看过", "已看"];

/// Which accepted layout a request body used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// `{"fields": {"昵称": ...}}`
    Fields,
    /// `{"data": {"昵称": ...}}`
    Data,
    /// `{"name": ..., "grade": ..., "class": ...}`
    Flat,
}

impl PayloadShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadShape::Fields => "fields",
            PayloadShape::Data => "data",
            PayloadShape::Flat => "flat",
        }
    }
}

/// A normalized body plus the layout it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub record: Record,
    pub shape: PayloadShape,
}

/// Normalization errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("Request body must be a JSON object")]
    NotAnObject,
}

/// Normalize a parsed request body into a canonical record.
///
/// Shapes are tried in priority order: `fields`, then `data`, then flat
/// English keys. Identity completeness is not checked here.
pub fn normalize(body: &Value) -> Result<Normalized, NormalizeError> {
    let obj = body.as_object().ok_or(NormalizeError::NotAnObject)?;

    if let Some(nested) = obj.get(FIELDS_KEY).and_then(Value::as_object) {
        return Ok(Normalized {
            record: normalize_nested(nested),
            shape: PayloadShape::Fields,
        });
    }

    if let Some(nested) = obj.get(DATA_KEY).and_then(Value::as_object) {
        return Ok(Normalized {
            record: normalize_nested(nested),
            shape: PayloadShape::Data,
        });
    }

    Ok(Normalized {
        record: normalize_flat(obj),
        shape: PayloadShape::Flat,
    })
}

fn normalize_nested(fields: &Map<String, Value>) -> Record {
    Record {
        nickname: coerce_text(fields.get(columns::NICKNAME)),
        grade: coerce_text(fields.get(columns::GRADE)),
        class_name: coerce_text(fields.get(columns::CLASS)),
        level3_moves: coerce_moves(first_present(fields, &NESTED_MOVES_KEYS)),
        video_seen: coerce_video_seen(fields.get(columns::VIDEO_SEEN)),
    }
}

fn normalize_flat(body: &Map<String, Value>) -> Record {
    Record {
        nickname: coerce_text(body.get("name")),
        grade: coerce_text(body.get("grade")),
        class_name: coerce_text(body.get("class")),
        level3_moves: coerce_moves(first_present(body, &FLAT_MOVES_KEYS)),
        video_seen: coerce_video_seen(first_present(body, &FLAT_VIDEO_KEYS)),
    }
}

/// First alias whose value is present and not `null`.
fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|v| !v.is_null())
}

/// Unwrap a single-select option (`{"name": "是"}`, `{"text": ...}`) or a
/// one-element cell array down to the value inside.
fn option_inner(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(obj) => OPTION_INNER_KEYS.iter().find_map(|key| obj.get(*key)),
        Value::Array(items) => items.first(),
        _ => None,
    }
}

/// Coerce a loosely-typed value to a trimmed string.
pub fn coerce_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => coerce_text(option_inner(other)),
    }
}

/// Coerce a loosely-typed value to a move count.
///
/// Non-numeric, non-finite and negative input all become 0. Fractions round
/// half-up, so `"7.9"` and `7.5` both become 8.
pub fn coerce_moves(value: Option<&Value>) -> u64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(other @ (Value::Object(_) | Value::Array(_))) => {
            return coerce_moves(option_inner(other));
        }
        _ => None,
    };

    match parsed {
        Some(n) if n.is_finite() && n > 0.0 => n.round() as u64,
        _ => 0,
    }
}

/// Coerce a loosely-typed value to the video-seen flag.
///
/// Only explicit affirmative input counts; anything else, including a
/// missing value, means "not seen".
pub fn coerce_video_seen(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64() == Some(1.0),
        Some(Value::String(s)) => {
            let token = s.trim().to_lowercase();
            AFFIRMATIVE_TOKENS.contains(&token.as_str())
        }
        Some(other @ (Value::Object(_) | Value::Array(_))) => {
            coerce_video_seen(option_inner(other))
        }
        _ => false,
    }
}
