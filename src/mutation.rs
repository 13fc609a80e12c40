use crate::catalog::schema::{Column, TableSchema};
use crate::catalog::types::CellValue;
use crate::coercion::{CoercionContext, default_value};
use crate::migration::default_row;
use crate::persist::PendingSave;
use crate::store::OverrideStore;
use std::collections::HashSet;

/// Why a mutation was turned into a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    UnknownColumn,
    ContentColumn,
    NotEditable,
    /// `if_missing: disable` and the row has no live record.
    MissingRowDisabled,
    /// The identity collides with the reserved timestamp key.
    ReservedIdentity,
    /// Row structure changes need standalone mode.
    NotStandalone,
    /// Pure-readonly tables have no store to write.
    ReadOnlyTable,
    RowOutOfRange,
    UnknownRow,
    /// Deletion was not confirmed.
    NotConfirmed,
    /// Cycling a column that has no options.
    NoOptions,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::UnknownColumn => "unknown_column",
            RejectReason::ContentColumn => "content_column",
            RejectReason::NotEditable => "not_editable",
            RejectReason::MissingRowDisabled => "missing_row_disabled",
            RejectReason::ReservedIdentity => "reserved_identity",
            RejectReason::NotStandalone => "not_standalone",
            RejectReason::ReadOnlyTable => "read_only_table",
            RejectReason::RowOutOfRange => "row_out_of_range",
            RejectReason::UnknownRow => "unknown_row",
            RejectReason::NotConfirmed => "not_confirmed",
            RejectReason::NoOptions => "no_options",
        }
    }
}

/// Result of a mutation request. An applied mutation has already replaced
/// the in-memory store and dispatched the save; awaiting the handle only
/// reports how the save went.
#[derive(Debug)]
pub enum MutationOutcome {
    Applied(PendingSave),
    Rejected(RejectReason),
}

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied(_))
    }

    pub fn rejection(&self) -> Option<RejectReason> {
        match self {
            MutationOutcome::Applied(_) => None,
            MutationOutcome::Rejected(reason) => Some(*reason),
        }
    }

    pub fn into_pending(self) -> Option<PendingSave> {
        match self {
            MutationOutcome::Applied(pending) => Some(pending),
            MutationOutcome::Rejected(_) => None,
        }
    }
}

/// Writes `value` into the slot of column `column_index`, creating the row
/// with defaults when the identity has none yet. Content columns own no
/// slot and are ignored.
pub fn write_cell(
    store: &mut OverrideStore,
    schema: &TableSchema,
    item_id: &str,
    column_index: usize,
    value: CellValue,
    ctx: &CoercionContext<'_>,
) -> bool {
    let Some(slot) = schema.layout().slot_of(column_index) else {
        return false;
    };
    if !store.contains(item_id) {
        store.insert(item_id, default_row(schema, ctx));
    }
    let Some(row) = store.get_mut(item_id) else {
        return false;
    };
    let stored: Vec<&Column> = schema.stored_columns().collect();
    while row.len() <= slot {
        let fill = stored
            .get(row.len())
            .map(|column| default_value(column, ctx))
            .unwrap_or_default();
        row.push(fill);
    }
    row[slot] = value;
    true
}

/// Deletes every stored identity that is not live. Returns the removed ids.
pub fn prune_missing(store: &mut OverrideStore, live_ids: &HashSet<String>) -> Vec<String> {
    let mut removed = Vec::new();
    store.retain(|id| {
        let keep = live_ids.contains(id);
        if !keep {
            removed.push(id.to_string());
        }
        keep
    });
    removed
}

/// Gives every live identity a stored row, creating defaulted rows in live
/// order. Returns how many rows were created.
pub fn ensure_live_rows<'a>(
    store: &mut OverrideStore,
    live_ids: impl IntoIterator<Item = &'a str>,
    schema: &TableSchema,
    ctx: &CoercionContext<'_>,
) -> usize {
    let mut created = 0;
    for id in live_ids {
        if !store.contains(id) {
            store.insert(id, default_row(schema, ctx));
            created += 1;
        }
    }
    created
}

/// Option following `current`, wrapping at the end. A value that is not
/// one of the options moves to the first option.
pub fn next_cycle_value(options: &[String], current: &CellValue) -> Option<CellValue> {
    if options.is_empty() {
        return None;
    }
    let next = current
        .as_text()
        .and_then(|text| options.iter().position(|o| o == text))
        .map_or(0, |idx| (idx + 1) % options.len());
    Some(CellValue::text(options[next].as_str()))
}

/// `current + delta * step`, clamped to the configured bounds.
pub fn stepped_number(
    current: &CellValue,
    delta: f64,
    min: Option<f64>,
    max: Option<f64>,
    step: Option<f64>,
) -> f64 {
    let step = step.filter(|s| *s != 0.0 && s.is_finite()).unwrap_or(1.0);
    let mut next = current.lenient_number() + delta * step;
    if let Some(min) = min {
        next = next.max(min);
    }
    if let Some(max) = max {
        next = next.min(max);
    }
    next
}

/// Identifier for a new standalone row: `row_<millis>_<9 alphanumerics>`.
pub fn generate_row_id(now_millis: i64) -> String {
    let entropy = uuid::Uuid::new_v4().simple().to_string();
    format!("row_{now_millis}_{}", &entropy[..9])
}
