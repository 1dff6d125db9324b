use super::layout::{ColumnDescriptor, ColumnType};
use super::row::Row;
use crate::error::RowError;
use crate::value::Value;

/// Addresses a column by name or by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKey<'a> {
    Name(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for ColumnKey<'a> {
    fn from(name: &'a str) -> Self {
        ColumnKey::Name(name)
    }
}

impl<'a> From<&'a String> for ColumnKey<'a> {
    fn from(name: &'a String) -> Self {
        ColumnKey::Name(name)
    }
}

impl From<usize> for ColumnKey<'_> {
    fn from(index: usize) -> Self {
        ColumnKey::Index(index)
    }
}

impl Row {
    // ════════════════════════════════════════════════════════════════════════
    // Internal: raw reads
    // ════════════════════════════════════════════════════════════════════════

    #[inline]
    fn read_bytes<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.data[offset..offset + N]);
        buf
    }

    #[inline]
    pub(super) fn read_bit(&self, bit: usize) -> bool {
        self.data[bit >> 3] & (1 << (bit & 7)) != 0
    }

    pub(super) fn locate(&self, key: ColumnKey<'_>) -> Result<ColumnDescriptor, RowError> {
        match key {
            ColumnKey::Name(name) => self
                .layout
                .find(name)
                .map(|(_, c)| c.clone())
                .ok_or_else(|| RowError::ColumnNotFound(name.into())),
            ColumnKey::Index(index) => {
                self.layout
                    .column(index)
                    .cloned()
                    .ok_or(RowError::IndexOutOfRange {
                        index,
                        count: self.layout.len(),
                    })
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Public API
    // ════════════════════════════════════════════════════════════════════════

    /// Read a column by name or index.
    pub fn get<'a>(&self, key: impl Into<ColumnKey<'a>>) -> Result<Value, RowError> {
        let column = self.locate(key.into())?;
        Ok(self.get_column(&column))
    }

    /// Read a column from its planned descriptor.
    pub(crate) fn get_column(&self, column: &ColumnDescriptor) -> Value {
        let off = column.offset;
        match column.ty {
            ColumnType::I1 => Value::Int(i64::from(i8::from_le_bytes(self.read_bytes(off)))),
            ColumnType::UI1 => Value::Int(i64::from(self.data[off])),
            ColumnType::I2 => Value::Int(i64::from(i16::from_le_bytes(self.read_bytes(off)))),
            ColumnType::UI2 => Value::Int(i64::from(u16::from_le_bytes(self.read_bytes(off)))),
            ColumnType::I4 => Value::Int(i64::from(i32::from_le_bytes(self.read_bytes(off)))),
            ColumnType::UI4 => Value::Int(i64::from(u32::from_le_bytes(self.read_bytes(off)))),
            ColumnType::I8 => Value::Int(i64::from_le_bytes(self.read_bytes(off))),
            ColumnType::UI8 | ColumnType::FileTime | ColumnType::Timestamp => {
                Value::from(u64::from_le_bytes(self.read_bytes(off)))
            }
            ColumnType::R4 => Value::Float(f64::from(f32::from_le_bytes(self.read_bytes(off)))),
            ColumnType::R8 => Value::Float(f64::from_le_bytes(self.read_bytes(off))),
            ColumnType::Currency => {
                Value::Float(i64::from_le_bytes(self.read_bytes(off)) as f64 / 10000.0)
            }
            ColumnType::Bool => Value::Bool(self.read_bit(off)),
            ColumnType::Bytes | ColumnType::Str | ColumnType::WStr => {
                self.objects[self.layout.slot_index(column)].clone()
            }
            ColumnType::Empty => Value::Null,
        }
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).ok()?.as_i64()
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).ok()?.as_f64()
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).ok()?.as_bool()
    }
}
