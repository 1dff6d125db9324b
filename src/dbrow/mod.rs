pub mod layout;
mod read_op;
pub mod row;
mod write_op;

pub use layout::{ColumnDescriptor, ColumnType, RowLayout, SLOT_WIDTH, SizeClass, build_layout};
pub use read_op::ColumnKey;
pub use row::Row;

#[cfg(test)]
mod tests;
