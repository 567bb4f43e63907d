use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar value held by one cell / record field.
///
/// The enum uses an explicit `{type, value}` tagged layout so JSON payloads
/// stay stable across schema revisions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Empty / unset cell value.
    Empty,
    /// IEEE-754 double precision number.
    Number(f64),
    /// Plain text.
    Text(String),
    /// Boolean (rendered as a checkbox by the grid).
    Bool(bool),
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::Empty
    }
}

impl FieldValue {
    /// Returns true if the value is [`FieldValue::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Empty)
    }

    /// Returns true for the grid's notion of a blank cell: either an unset
    /// value or the empty string. Source sheets represent absent data as `""`.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Empty => true,
            FieldValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Boolean-like coercion covering the grid's checkbox conventions:
    /// `Bool(true)`, the text `TRUE`/`true`, and the number `1` all read as
    /// true; everything else reads as false.
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::Bool(b) => *b,
            FieldValue::Text(s) => s.eq_ignore_ascii_case("true"),
            FieldValue::Number(n) => *n == 1.0,
            FieldValue::Empty => false,
        }
    }

    /// The display string the grid would render for this value.
    ///
    /// Numbers drop a trailing `.0`; booleans render as `TRUE`/`FALSE` to
    /// match checkbox cells.
    pub fn display(&self) -> String {
        match self {
            FieldValue::Empty => String::new(),
            FieldValue::Number(n) => format_number(*n),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Bool(true) => "TRUE".to_string(),
            FieldValue::Bool(false) => "FALSE".to_string(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}
