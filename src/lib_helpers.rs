use super::*;
use crate::source::record_identity;

/// Mutation reads must not run against an empty store just because the read
/// failed: the save would wipe every override.
pub(crate) fn store_unavailable(entity: &str, err: PowerTableError) -> PowerTableError {
    match err {
        PowerTableError::StoreUnavailable { .. } => err,
        other => PowerTableError::StoreUnavailable {
            entity: entity.to_string(),
            message: other.to_string(),
        },
    }
}

/// Live identities in feed order, first occurrence only.
pub(crate) fn live_ids_in_order(records: &[LiveRecord], primary_key: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|record| record_identity(record, primary_key))
        .filter(|id| id != LAST_UPDATED_KEY && seen.insert(id.clone()))
        .collect()
}

/// The value a cell helper starts from. The row index is trusted only when
/// it still points at `item_id`; otherwise the row is looked up by identity.
pub(crate) fn current_cell<'v>(
    view: &'v TableView,
    row_index: usize,
    col_index: usize,
    item_id: &str,
) -> Option<&'v CellValue> {
    let row = view
        .rows
        .get(row_index)
        .filter(|row| row.item_id == item_id)
        .or_else(|| view.row_by_id(item_id))?;
    row.cell(col_index)
}
