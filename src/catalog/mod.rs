pub mod dates;
pub mod schema;
pub mod types;

pub use schema::{Column, ColumnDef, ColumnKind, SlotLayout, TableSchema};
pub use types::CellValue;
