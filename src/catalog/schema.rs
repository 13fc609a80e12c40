use crate::permission::EditPolicy;
use serde::{Deserialize, Serialize};

/// Column type together with the configuration only that type understands.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    Text,
    Number {
        min: Option<f64>,
        max: Option<f64>,
        step: Option<f64>,
    },
    Checkbox,
    Dropdown {
        options: Vec<String>,
    },
    Cycle {
        options: Vec<String>,
    },
    Date,
    /// Read-only value taken from the live record on every render.
    Content,
    /// A type name this version does not know. Behaves like text for
    /// defaults and sanitization and is never reordered by sorting.
    Unknown(String),
}

impl ColumnKind {
    pub fn from_parts(
        type_name: Option<&str>,
        options: Vec<String>,
        min: Option<f64>,
        max: Option<f64>,
        step: Option<f64>,
    ) -> Self {
        match type_name.unwrap_or("text") {
            "text" => ColumnKind::Text,
            "number" => ColumnKind::Number { min, max, step },
            "checkbox" => ColumnKind::Checkbox,
            "dropdown" => ColumnKind::Dropdown { options },
            "cycle" => ColumnKind::Cycle { options },
            "date" => ColumnKind::Date,
            "content" => ColumnKind::Content,
            other => ColumnKind::Unknown(other.to_string()),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            ColumnKind::Text => "text",
            ColumnKind::Number { .. } => "number",
            ColumnKind::Checkbox => "checkbox",
            ColumnKind::Dropdown { .. } => "dropdown",
            ColumnKind::Cycle { .. } => "cycle",
            ColumnKind::Date => "date",
            ColumnKind::Content => "content",
            ColumnKind::Unknown(name) => name,
        }
    }

    pub fn options(&self) -> &[String] {
        match self {
            ColumnKind::Dropdown { options } | ColumnKind::Cycle { options } => options,
            _ => &[],
        }
    }
}

/// Column as written in the card configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(default, alias = "source_key", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub col_type: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editable: Option<EditPolicy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ColumnDef", into = "ColumnDef")]
pub struct Column {
    pub name: String,
    /// Live record field read by content columns.
    pub source: Option<String>,
    pub kind: ColumnKind,
    pub hidden: bool,
    /// Column-level policy; replaces the table-level policy when set.
    pub editable: Option<EditPolicy>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            source: None,
            kind,
            hidden: false,
            editable: None,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Text)
    }

    pub fn number(name: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self::new(
            name,
            ColumnKind::Number {
                min,
                max,
                step: None,
            },
        )
    }

    pub fn checkbox(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Checkbox)
    }

    pub fn dropdown(name: impl Into<String>, options: &[&str]) -> Self {
        Self::new(
            name,
            ColumnKind::Dropdown {
                options: options.iter().map(|o| (*o).to_string()).collect(),
            },
        )
    }

    pub fn cycle(name: impl Into<String>, options: &[&str]) -> Self {
        Self::new(
            name,
            ColumnKind::Cycle {
                options: options.iter().map(|o| (*o).to_string()).collect(),
            },
        )
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Date)
    }

    pub fn content(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Content).with_source(source)
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_editable(mut self, editable: EditPolicy) -> Self {
        self.editable = Some(editable);
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn is_content(&self) -> bool {
        matches!(self.kind, ColumnKind::Content)
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, ColumnKind::Text)
    }

    pub fn options(&self) -> &[String] {
        self.kind.options()
    }
}

impl From<ColumnDef> for Column {
    fn from(def: ColumnDef) -> Self {
        let kind = ColumnKind::from_parts(
            def.col_type.as_deref(),
            def.options,
            def.min,
            def.max,
            def.step,
        );
        Self {
            name: def.name,
            source: def.source,
            kind,
            hidden: def.hidden,
            editable: def.editable,
        }
    }
}

impl From<Column> for ColumnDef {
    fn from(column: Column) -> Self {
        let type_name = column.kind.type_name().to_string();
        let (options, min, max, step) = match column.kind {
            ColumnKind::Dropdown { options } | ColumnKind::Cycle { options } => {
                (options, None, None, None)
            }
            ColumnKind::Number { min, max, step } => (Vec::new(), min, max, step),
            _ => (Vec::new(), None, None, None),
        };
        Self {
            name: column.name,
            source: column.source,
            col_type: Some(type_name),
            hidden: column.hidden,
            editable: column.editable,
            options,
            min,
            max,
            step,
        }
    }
}

/// Maps column positions to positions inside an override row. Every
/// non-content column owns one slot, in column order; hidden columns keep
/// their slot so hiding a column never shifts stored data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotLayout {
    slot_by_column: Vec<Option<usize>>,
    column_by_slot: Vec<usize>,
}

impl SlotLayout {
    pub fn new(columns: &[Column]) -> Self {
        let mut slot_by_column = Vec::with_capacity(columns.len());
        let mut column_by_slot = Vec::new();
        for (idx, column) in columns.iter().enumerate() {
            if column.is_content() {
                slot_by_column.push(None);
            } else {
                slot_by_column.push(Some(column_by_slot.len()));
                column_by_slot.push(idx);
            }
        }
        Self {
            slot_by_column,
            column_by_slot,
        }
    }

    pub fn len(&self) -> usize {
        self.column_by_slot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.column_by_slot.is_empty()
    }

    pub fn slot_of(&self, column_index: usize) -> Option<usize> {
        self.slot_by_column.get(column_index).copied().flatten()
    }
}

/// Column list plus the two projections derived from it: the stored slot
/// layout and the visible display order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    columns: Vec<Column>,
    layout: SlotLayout,
    display: Vec<usize>,
}

impl TableSchema {
    pub fn new(columns: Vec<Column>) -> Self {
        let layout = SlotLayout::new(&columns);
        let display = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.hidden)
            .map(|(idx, _)| idx)
            .collect();
        Self {
            columns,
            layout,
            display,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    pub fn slot_count(&self) -> usize {
        self.layout.len()
    }

    /// Columns that own an override slot, in slot order.
    pub fn stored_columns(&self) -> impl Iterator<Item = &Column> + '_ {
        self.layout
            .column_by_slot
            .iter()
            .map(move |idx| &self.columns[*idx])
    }

    pub fn display_len(&self) -> usize {
        self.display.len()
    }

    /// Visible columns as `(column index, column)` pairs in display order.
    pub fn display_columns(&self) -> impl Iterator<Item = (usize, &Column)> + '_ {
        self.display.iter().map(move |idx| (*idx, &self.columns[*idx]))
    }

    pub fn display_column(&self, display_index: usize) -> Option<(usize, &Column)> {
        self.display
            .get(display_index)
            .map(|idx| (*idx, &self.columns[*idx]))
    }
}
