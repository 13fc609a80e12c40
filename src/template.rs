use crate::error::PowerTableError;
use crate::source::HostStates;
use chrono::NaiveDateTime;
use chrono::format::{Item, StrftimeItems};
use std::fmt::Write;
use tracing::warn;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Values an inline expression may refer to.
#[derive(Clone, Copy)]
pub struct TemplateContext<'a> {
    pub now: NaiveDateTime,
    /// Display name of the current user.
    pub user: Option<&'a str>,
    pub states: Option<&'a dyn HostStates>,
}

impl<'a> TemplateContext<'a> {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now,
            user: None,
            states: None,
        }
    }

    pub fn with_user(mut self, user: Option<&'a str>) -> Self {
        self.user = user;
        self
    }

    pub fn with_states(mut self, states: &'a dyn HostStates) -> Self {
        self.states = Some(states);
        self
    }
}

/// Replaces every `{{ expr }}` in `text`. Expressions that cannot be
/// evaluated render as `[expr]`; an unterminated `{{` is left as is.
pub fn expand(text: &str, ctx: &TemplateContext<'_>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        let body_start = start + OPEN.len();
        let Some(len) = rest[body_start..].find(CLOSE) else {
            break;
        };
        let raw = &rest[body_start..body_start + len];
        if raw.is_empty() || raw.contains('\n') {
            out.push_str(&rest[..body_start]);
            rest = &rest[body_start..];
            continue;
        }
        out.push_str(&rest[..start]);
        match evaluate(raw.trim(), ctx) {
            Ok(value) => out.push_str(&value),
            Err(err) => {
                warn!(expression = raw, error = %err, "template expression not evaluated");
                out.push('[');
                out.push_str(raw);
                out.push(']');
            }
        }
        rest = &rest[body_start + len + CLOSE.len()..];
    }
    out.push_str(rest);
    out
}

/// Evaluates one trimmed expression: `user`, `states('<entity>')` or
/// `now().strftime('<format>')`.
pub fn evaluate(expr: &str, ctx: &TemplateContext<'_>) -> Result<String, PowerTableError> {
    if expr == "user" {
        return Ok(ctx.user.unwrap_or("unknown").to_string());
    }
    if let Some(format) = call_argument(expr, "now().strftime(") {
        return strftime(&ctx.now, format).ok_or_else(|| PowerTableError::Expression {
            expression: expr.to_string(),
            message: format!("invalid strftime format '{format}'"),
        });
    }
    if let Some(entity_id) = call_argument(expr, "states(") {
        let state = ctx
            .states
            .and_then(|states| states.entity_state(entity_id))
            .filter(|state| !state.is_empty());
        return Ok(state.unwrap_or_else(|| "unavailable".to_string()));
    }
    Err(PowerTableError::Expression {
        expression: expr.to_string(),
        message: "unsupported expression".to_string(),
    })
}

/// Extracts `<arg>` from `<prefix>'<arg>')` (single or double quotes).
fn call_argument<'e>(expr: &'e str, prefix: &str) -> Option<&'e str> {
    let inner = expr.strip_prefix(prefix)?.strip_suffix(')')?;
    let quote = inner.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let arg = inner[1..].strip_suffix(quote)?;
    (!arg.is_empty()).then_some(arg)
}

fn strftime(now: &NaiveDateTime, format: &str) -> Option<String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }
    let mut out = String::new();
    write!(out, "{}", now.format_with_items(items.iter())).ok()?;
    Some(out)
}
