use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single cell payload as it travels between the live source, the override
/// store and the table view.
///
/// Stored documents are JSON, so the variants mirror JSON scalars. Arrays and
/// objects are kept verbatim in `Json` so that a stored slot is never lost
/// even when it does not fit the column type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum CellValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(CompactString),
    Json(serde_json::Value),
}

impl CellValue {
    pub fn text(value: impl Into<CompactString>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_empty_text(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.is_empty())
    }

    /// Boolean interpretation used by checkbox cells: empty strings, zero,
    /// `NaN` and null are false, everything else is true.
    pub fn truthy(&self) -> bool {
        match self {
            CellValue::Null => false,
            CellValue::Bool(b) => *b,
            CellValue::Number(n) => *n != 0.0 && !n.is_nan(),
            CellValue::Text(s) => !s.is_empty(),
            CellValue::Json(_) => true,
        }
    }

    /// Numeric interpretation used by number cells. Text is parsed by its
    /// longest numeric prefix (`"12px"` is 12); anything unparseable is 0.
    pub fn lenient_number(&self) -> f64 {
        let parsed = match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => parse_float_prefix(s),
            _ => None,
        };
        match parsed {
            Some(n) if !n.is_nan() => n,
            _ => 0.0,
        }
    }

    pub fn display_string(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.to_string(),
            CellValue::Json(v) => v.to_string(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_string())
    }
}

impl From<serde_json::Value> for CellValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CellValue::Null,
            serde_json::Value::Bool(b) => CellValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => CellValue::Number(f),
                None => CellValue::Json(serde_json::Value::Number(n)),
            },
            serde_json::Value::String(s) => CellValue::Text(s.into()),
            other => CellValue::Json(other),
        }
    }
}

impl From<&serde_json::Value> for CellValue {
    fn from(value: &serde_json::Value) -> Self {
        CellValue::from(value.clone())
    }
}

impl From<CellValue> for serde_json::Value {
    fn from(value: CellValue) -> Self {
        match value {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Bool(b) => serde_json::Value::Bool(b),
            CellValue::Number(n) => number_to_json(n),
            CellValue::Text(s) => serde_json::Value::String(s.into()),
            CellValue::Json(v) => v,
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.into())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value.into())
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

fn is_integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER
}

fn number_to_json(n: f64) -> serde_json::Value {
    if is_integral(n) {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

fn format_number(n: f64) -> String {
    if is_integral(n) {
        return (n as i64).to_string();
    }
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    n.to_string()
}

/// Parses the longest leading decimal literal of `input`, skipping leading
/// whitespace. Returns `None` when no digits are found.
pub fn parse_float_prefix(input: &str) -> Option<f64> {
    let s = input.trim_start();
    let bytes = s.as_bytes();
    let mut pos = 0;
    let mut negative = false;
    if let Some(&sign) = bytes.first()
        && (sign == b'+' || sign == b'-')
    {
        negative = sign == b'-';
        pos = 1;
    }
    if s[pos..].starts_with("Infinity") {
        return Some(if negative {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }

    let int_start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    let int_digits = &s[int_start..pos];

    let mut frac_digits = "";
    if pos < bytes.len() && bytes[pos] == b'.' {
        let frac_start = pos + 1;
        let mut end = frac_start;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        frac_digits = &s[frac_start..end];
        pos = end;
    }
    if int_digits.is_empty() && frac_digits.is_empty() {
        return None;
    }

    let mut exponent = "";
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        let mut end = pos + 1;
        if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
            end += 1;
        }
        let digits_start = end;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        if end > digits_start {
            exponent = &s[pos..end];
        }
    }

    let mut literal = String::with_capacity(int_digits.len() + frac_digits.len() + 8);
    if negative {
        literal.push('-');
    }
    if int_digits.is_empty() {
        literal.push('0');
    } else {
        literal.push_str(int_digits);
    }
    if !frac_digits.is_empty() {
        literal.push('.');
        literal.push_str(frac_digits);
    }
    literal.push_str(exponent);
    literal.parse::<f64>().ok()
}
