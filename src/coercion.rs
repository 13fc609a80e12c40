use crate::catalog::dates::{DateFormat, parse_date};
use crate::catalog::schema::{Column, ColumnKind};
use crate::catalog::types::{CellValue, parse_float_prefix};
use chrono::NaiveDateTime;

/// Characters that would be interpreted by the host's template engine.
const TEMPLATE_CHARS: [char; 4] = ['{', '}', '$', '%'];

/// Inputs shared by default resolution and sanitization.
#[derive(Debug, Clone, Copy)]
pub struct CoercionContext<'a> {
    pub date_format: &'a DateFormat,
    pub now: NaiveDateTime,
}

impl<'a> CoercionContext<'a> {
    pub fn new(date_format: &'a DateFormat, now: NaiveDateTime) -> Self {
        Self { date_format, now }
    }
}

pub fn default_value(column: &Column, ctx: &CoercionContext<'_>) -> CellValue {
    match &column.kind {
        ColumnKind::Checkbox => CellValue::Bool(false),
        ColumnKind::Number { min, .. } => CellValue::Number(min.unwrap_or(0.0)),
        ColumnKind::Dropdown { options } | ColumnKind::Cycle { options } => options
            .first()
            .map(|first| CellValue::text(first.as_str()))
            .unwrap_or_else(|| CellValue::text("")),
        ColumnKind::Date => CellValue::Text(ctx.date_format.format(&ctx.now).into()),
        ColumnKind::Text | ColumnKind::Content | ColumnKind::Unknown(_) => CellValue::text(""),
    }
}

/// Display value for a stored slot. Text columns keep `""` as a real value;
/// every other type treats a missing, null or empty-string slot as unset and
/// shows the column default instead.
pub fn fill_slot(
    stored: Option<&CellValue>,
    column: &Column,
    ctx: &CoercionContext<'_>,
) -> CellValue {
    if column.is_text() {
        return match stored {
            None | Some(CellValue::Null) => CellValue::text(""),
            Some(value) => value.clone(),
        };
    }
    match stored {
        None | Some(CellValue::Null) => default_value(column, ctx),
        Some(value) if value.is_empty_text() => default_value(column, ctx),
        Some(value) => value.clone(),
    }
}

pub fn strip_template_chars(input: &str) -> String {
    input.chars().filter(|c| !TEMPLATE_CHARS.contains(c)).collect()
}

fn find_ascii_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.is_empty() || hay.len() < needle.len() {
        return None;
    }
    (from..=hay.len() - needle.len())
        .find(|&start| hay[start..start + needle.len()].eq_ignore_ascii_case(needle))
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Removes every `<script ...> ... </script>` block (case-insensitive). An
/// opening tag without a closing tag is left untouched.
pub fn strip_script_blocks(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;
    let mut search = 0;
    while let Some(open) = find_ascii_ci(input, "<script", search) {
        let after = open + "<script".len();
        if after < bytes.len() && is_word_byte(bytes[after]) {
            search = after;
            continue;
        }
        let Some(close) = find_ascii_ci(input, "</script>", after) else {
            break;
        };
        out.push_str(&input[cursor..open]);
        cursor = close + "</script>".len();
        search = cursor;
    }
    out.push_str(&input[cursor..]);
    out
}

/// Sanitizes a proposed cell value before it is written. Non-string values
/// pass through untouched; strings lose template characters and script
/// blocks, are trimmed, then coerced to the column type.
pub fn sanitize(value: CellValue, kind: &ColumnKind, ctx: &CoercionContext<'_>) -> CellValue {
    let CellValue::Text(raw) = value else {
        return value;
    };
    let cleaned = strip_template_chars(&raw);
    let cleaned = strip_script_blocks(&cleaned);
    let cleaned = cleaned.trim();
    match kind {
        ColumnKind::Number { .. } => CellValue::Number(
            parse_float_prefix(cleaned)
                .filter(|n| !n.is_nan())
                .unwrap_or(0.0),
        ),
        ColumnKind::Checkbox => CellValue::Bool(!cleaned.is_empty()),
        ColumnKind::Date => match parse_date(cleaned) {
            Some(date) => CellValue::Text(ctx.date_format.format(&date).into()),
            None => CellValue::text(""),
        },
        _ => CellValue::text(cleaned),
    }
}
