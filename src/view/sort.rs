use crate::catalog::dates::cell_date;
use crate::catalog::schema::{ColumnKind, TableSchema};
use crate::catalog::types::CellValue;
use crate::config::{SortColumn, SortDirection};
use crate::view::ViewRow;
use chrono::NaiveDateTime;
use std::cmp::Ordering;

/// Resolves the configured sort column to a display index. Names must match
/// a visible column; indices past the end clamp to the last column and
/// negative indices disable sorting.
pub fn resolve_sort_column(
    sort_column: Option<&SortColumn>,
    schema: &TableSchema,
) -> Option<usize> {
    let len = schema.display_len();
    if len == 0 {
        return None;
    }
    match sort_column? {
        SortColumn::Name(name) => schema.display_columns().position(|(_, c)| &c.name == name),
        SortColumn::Index(index) => usize::try_from(*index).ok().map(|idx| idx.min(len - 1)),
    }
}

/// Sort key of one cell. `Unknown` cells always trail, whatever the
/// direction, and keep their relative order.
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Known(Known),
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
enum Known {
    Rank(usize),
    Instant(NaiveDateTime),
    Text(String),
    Number(f64),
    Flag(bool),
}

fn sort_key(kind: &ColumnKind, value: &CellValue) -> SortKey {
    match kind {
        ColumnKind::Dropdown { options } | ColumnKind::Cycle { options } => value
            .as_text()
            .and_then(|text| options.iter().position(|o| o == text))
            .map_or(SortKey::Unknown, |rank| SortKey::Known(Known::Rank(rank))),
        ColumnKind::Date => {
            cell_date(value).map_or(SortKey::Unknown, |date| SortKey::Known(Known::Instant(date)))
        }
        ColumnKind::Text | ColumnKind::Content => {
            SortKey::Known(Known::Text(value.display_string()))
        }
        ColumnKind::Number { .. } => SortKey::Known(Known::Number(value.lenient_number())),
        ColumnKind::Checkbox => SortKey::Known(Known::Flag(value.truthy())),
        // Columns of unknown type are skipped by `sort_rows`.
        ColumnKind::Unknown(_) => SortKey::Unknown,
    }
}

fn compare_known(a: &Known, b: &Known) -> Ordering {
    match (a, b) {
        (Known::Rank(a), Known::Rank(b)) => a.cmp(b),
        (Known::Instant(a), Known::Instant(b)) => a.cmp(b),
        (Known::Text(a), Known::Text(b)) => locale_compare(a, b),
        (Known::Number(a), Known::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Known::Flag(a), Known::Flag(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

/// Case-insensitive ordering; among strings that differ only in case the
/// lowercase form comes first.
pub fn locale_compare(a: &str, b: &str) -> Ordering {
    let folded = a.to_lowercase().cmp(&b.to_lowercase());
    if folded != Ordering::Equal {
        return folded;
    }
    b.cmp(a)
}

/// Stable in-place sort by the display column at `display_index`.
pub fn sort_rows(
    rows: &mut [ViewRow],
    schema: &TableSchema,
    display_index: usize,
    direction: SortDirection,
) {
    let Some((_, column)) = schema.display_column(display_index) else {
        return;
    };
    if matches!(column.kind, ColumnKind::Unknown(_)) {
        return;
    }
    let null = CellValue::Null;
    rows.sort_by(|a, b| {
        let a = sort_key(&column.kind, a.cell(display_index).unwrap_or(&null));
        let b = sort_key(&column.kind, b.cell(display_index).unwrap_or(&null));
        match (&a, &b) {
            (SortKey::Known(a), SortKey::Known(b)) => match direction {
                SortDirection::Asc => compare_known(a, b),
                SortDirection::Desc => compare_known(b, a),
            },
            (SortKey::Known(_), SortKey::Unknown) => Ordering::Less,
            (SortKey::Unknown, SortKey::Known(_)) => Ordering::Greater,
            (SortKey::Unknown, SortKey::Unknown) => Ordering::Equal,
        }
    });
}

#[cfg(test)]
mod tests {
    use super::{locale_compare, resolve_sort_column, sort_rows};
    use crate::catalog::schema::{Column, ColumnKind, TableSchema};
    use crate::catalog::types::CellValue;
    use crate::config::{SortColumn, SortDirection};
    use crate::view::ViewRow;
    use proptest::prelude::*;
    use std::cmp::Ordering;

    fn rows(values: Vec<CellValue>) -> Vec<ViewRow> {
        values
            .into_iter()
            .enumerate()
            .map(|(idx, value)| ViewRow {
                item_id: format!("r{idx}"),
                data: vec![value],
                is_missing: false,
            })
            .collect()
    }

    fn ids(rows: &[ViewRow]) -> Vec<&str> {
        rows.iter().map(|r| r.item_id.as_str()).collect()
    }

    #[test]
    fn resolves_names_and_clamps_indices() {
        let schema = TableSchema::new(vec![
            Column::text("A"),
            Column::text("Hidden").hidden(true),
            Column::text("B"),
        ]);
        assert_eq!(resolve_sort_column(None, &schema), None);
        assert_eq!(
            resolve_sort_column(Some(&SortColumn::Name("B".into())), &schema),
            Some(1)
        );
        assert_eq!(
            resolve_sort_column(Some(&SortColumn::Name("Hidden".into())), &schema),
            None
        );
        assert_eq!(resolve_sort_column(Some(&SortColumn::Index(9)), &schema), Some(1));
        assert_eq!(resolve_sort_column(Some(&SortColumn::Index(-1)), &schema), None);
    }

    #[test]
    fn options_sort_by_rank_with_unknown_trailing() {
        let schema = TableSchema::new(vec![Column::cycle("State", &["low", "mid", "high"])]);
        let mut asc = rows(vec![
            CellValue::text("high"),
            CellValue::text("weird"),
            CellValue::text("low"),
            CellValue::text("mid"),
        ]);
        let mut desc = asc.clone();
        sort_rows(&mut asc, &schema, 0, SortDirection::Asc);
        assert_eq!(ids(&asc), vec!["r2", "r3", "r0", "r1"]);
        sort_rows(&mut desc, &schema, 0, SortDirection::Desc);
        assert_eq!(ids(&desc), vec!["r0", "r3", "r2", "r1"]);
    }

    #[test]
    fn dates_numbers_and_checkboxes() {
        let schema = TableSchema::new(vec![Column::date("Due")]);
        let mut dated = rows(vec![
            CellValue::text("2024-03-01"),
            CellValue::text("never"),
            CellValue::text("2023-12-31"),
        ]);
        sort_rows(&mut dated, &schema, 0, SortDirection::Desc);
        assert_eq!(ids(&dated), vec!["r0", "r2", "r1"]);

        let schema = TableSchema::new(vec![Column::number("Qty", None, None)]);
        let mut numbers = rows(vec![
            CellValue::text("10"),
            CellValue::text("abc"),
            CellValue::Number(-2.0),
            CellValue::text("3.5kg"),
        ]);
        sort_rows(&mut numbers, &schema, 0, SortDirection::Asc);
        assert_eq!(ids(&numbers), vec!["r2", "r1", "r3", "r0"]);

        let schema = TableSchema::new(vec![Column::checkbox("Done")]);
        let mut flags = rows(vec![
            CellValue::Bool(true),
            CellValue::Bool(false),
            CellValue::Bool(true),
        ]);
        sort_rows(&mut flags, &schema, 0, SortDirection::Asc);
        assert_eq!(ids(&flags), vec!["r1", "r0", "r2"]);
    }

    #[test]
    fn unknown_column_type_keeps_order() {
        let schema = TableSchema::new(vec![Column::new("Pic", ColumnKind::Unknown("image".into()))]);
        let mut unsorted = rows(vec![CellValue::text("b"), CellValue::text("a")]);
        sort_rows(&mut unsorted, &schema, 0, SortDirection::Asc);
        assert_eq!(ids(&unsorted), vec!["r0", "r1"]);
    }

    #[test]
    fn locale_compare_folds_case() {
        assert_eq!(locale_compare("apple", "Banana"), Ordering::Less);
        assert_eq!(locale_compare("a", "A"), Ordering::Less);
        assert_eq!(locale_compare("same", "same"), Ordering::Equal);
    }

    proptest! {
        #[test]
        fn sorting_is_idempotent_and_reversible(values in prop::collection::vec(-50i64..50, 0..20)) {
            let schema = TableSchema::new(vec![Column::number("N", None, None)]);
            let mut distinct = values.clone();
            distinct.sort_unstable();
            distinct.dedup();
            let cells: Vec<CellValue> = distinct.iter().map(|v| CellValue::from(*v)).collect();

            let mut once = rows(cells.clone());
            sort_rows(&mut once, &schema, 0, SortDirection::Asc);
            let mut twice = once.clone();
            sort_rows(&mut twice, &schema, 0, SortDirection::Asc);
            prop_assert_eq!(&once, &twice);

            let mut reversed = rows(cells);
            sort_rows(&mut reversed, &schema, 0, SortDirection::Desc);
            reversed.reverse();
            prop_assert_eq!(once, reversed);
        }

        #[test]
        fn unparseable_dates_always_trail(
            valid in prop::collection::vec(1u32..28, 0..6),
            invalid in 0usize..4,
            desc in any::<bool>(),
        ) {
            let schema = TableSchema::new(vec![Column::date("Due")]);
            let mut cells: Vec<CellValue> = valid
                .iter()
                .map(|day| CellValue::text(format!("2024-01-{day:02}")))
                .collect();
            cells.extend((0..invalid).map(|_| CellValue::text("not a date")));
            let mut sorted = rows(cells);
            let direction = if desc { SortDirection::Desc } else { SortDirection::Asc };
            sort_rows(&mut sorted, &schema, 0, direction);
            let tail = &sorted[valid.len()..];
            prop_assert!(tail.iter().all(|r| r.data[0] == CellValue::text("not a date")));
        }
    }
}
