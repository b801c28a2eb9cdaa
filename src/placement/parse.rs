//! Best-effort extraction of a [`Placement`] from free-form model output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::Placement;

// Greedy: first `{` through the last `}`, across newlines.
static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid placement regex"));

/// Returns the first JSON-looking substring of `text`, if any.
pub fn extract_json_object(text: &str) -> Option<&str> {
    JSON_OBJECT.find(text).map(|found| found.as_str())
}

/// Parses the model's response text into a placement.
///
/// A located and parsed JSON object fills each field on its own, falling back
/// to that field's default when the key is missing or not numeric. Anything
/// else (no braces, invalid JSON, a non-object value) yields
/// [`Placement::default`] as a whole.
pub fn parse_placement_response(text: &str) -> Placement {
    let Some(candidate) = extract_json_object(text) else {
        debug!("No JSON object found in placement response; using defaults.");
        return Placement::default();
    };

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(fields)) => placement_from_fields(&fields),
        Ok(other) => {
            warn!("Placement response is not a JSON object ({other}); using defaults.");
            Placement::default()
        }
        Err(err) => {
            warn!("Failed to parse placement JSON: {err}; using defaults.");
            Placement::default()
        }
    }
}

fn placement_from_fields(fields: &Map<String, Value>) -> Placement {
    let defaults = Placement::default();
    Placement {
        x: int_field(fields, "x").unwrap_or(defaults.x),
        y: int_field(fields, "y").unwrap_or(defaults.y),
        scale: float_field(fields, "scale").unwrap_or(defaults.scale),
        rotation: float_field(fields, "rotation").unwrap_or(defaults.rotation),
        wall_height: int_field(fields, "wall_height").unwrap_or(defaults.wall_height),
    }
}

fn int_field(fields: &Map<String, Value>, key: &str) -> Option<i64> {
    let value = fields.get(key)?;
    let coerced = coerce_int(value);
    if coerced.is_none() {
        warn!("Placement field '{key}' is not an integer ({value}); using default.");
    }
    coerced
}

fn float_field(fields: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = fields.get(key)?;
    let coerced = coerce_float(value);
    if coerced.is_none() {
        warn!("Placement field '{key}' is not a number ({value}); using default.");
    }
    coerced
}

/// Integers pass through; floats and numeric strings truncate toward zero.
fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|v| v.is_finite()).map(|v| v.trunc() as i64)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>().ok().or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .map(|v| v.trunc() as i64)
            })
        }
        _ => None,
    }
}

fn coerce_float(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}
