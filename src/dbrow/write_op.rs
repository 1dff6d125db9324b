use super::layout::{ColumnDescriptor, ColumnType};
use super::read_op::ColumnKey;
use super::row::Row;
use crate::error::{NumericTruncation, RowError};
use crate::value::Value;

/// Narrow `$raw` to `$ty`, store it little-endian and report whether the
/// stored value differs from the input.
macro_rules! store_int {
    ($buf:expr, $raw:expr, $ty:ty) => {{
        let raw: i128 = $raw;
        let stored = raw as $ty;
        let bytes = stored.to_le_bytes();
        $buf[..bytes.len()].copy_from_slice(&bytes);
        i128::from(stored) != raw
    }};
}

impl Row {
    // ════════════════════════════════════════════════════════════════════════
    // Internal: input coercion
    // ════════════════════════════════════════════════════════════════════════

    fn integer_input(column: &ColumnDescriptor, value: &Value) -> Result<i128, RowError> {
        let mismatch = || RowError::TypeMismatch {
            column: column.name.clone(),
            expected: "integer",
        };
        match value {
            Value::Int(i) => Ok(i128::from(*i)),
            Value::Bool(b) => Ok(i128::from(*b)),
            Value::BigInt(b) => i128::try_from(b).map_err(|_| mismatch()),
            Value::Float(f) if f.is_finite() => Ok(f.trunc() as i128),
            _ => Err(mismatch()),
        }
    }

    fn float_input(column: &ColumnDescriptor, value: &Value) -> Result<f64, RowError> {
        value.as_f64().ok_or_else(|| RowError::TypeMismatch {
            column: column.name.clone(),
            expected: "number",
        })
    }

    #[inline]
    fn write_bit(&mut self, bit: usize, on: bool) {
        let mask = 1u8 << (bit & 7);
        if on {
            self.data[bit >> 3] |= mask;
        } else {
            self.data[bit >> 3] &= !mask;
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Public API
    // ════════════════════════════════════════════════════════════════════════

    /// Write a column by name or index.
    ///
    /// Narrowing conversions still store the narrowed value; they are logged
    /// and reported as a [`NumericTruncation`].
    pub fn set<'a>(
        &mut self,
        key: impl Into<ColumnKey<'a>>,
        value: Value,
    ) -> Result<Option<NumericTruncation>, RowError> {
        let column = self.locate(key.into())?;
        self.set_column(&column, value)
    }

    pub(crate) fn set_column(
        &mut self,
        column: &ColumnDescriptor,
        value: Value,
    ) -> Result<Option<NumericTruncation>, RowError> {
        let off = column.offset;
        let truncated = match column.ty {
            ColumnType::I1 => store_int!(self.data[off..], Self::integer_input(column, &value)?, i8),
            ColumnType::UI1 => store_int!(self.data[off..], Self::integer_input(column, &value)?, u8),
            ColumnType::I2 => store_int!(self.data[off..], Self::integer_input(column, &value)?, i16),
            ColumnType::UI2 => store_int!(self.data[off..], Self::integer_input(column, &value)?, u16),
            ColumnType::I4 => store_int!(self.data[off..], Self::integer_input(column, &value)?, i32),
            ColumnType::UI4 => store_int!(self.data[off..], Self::integer_input(column, &value)?, u32),
            ColumnType::I8 => store_int!(self.data[off..], Self::integer_input(column, &value)?, i64),
            ColumnType::UI8 | ColumnType::FileTime | ColumnType::Timestamp => {
                store_int!(self.data[off..], Self::integer_input(column, &value)?, u64)
            }
            ColumnType::R4 => {
                let input = Self::float_input(column, &value)?;
                let stored = input as f32;
                self.data[off..off + 4].copy_from_slice(&stored.to_le_bytes());
                !input.is_nan() && f64::from(stored) != input
            }
            ColumnType::R8 => {
                let input = Self::float_input(column, &value)?;
                self.data[off..off + 8].copy_from_slice(&input.to_le_bytes());
                false
            }
            ColumnType::Currency => {
                let scaled = Self::float_input(column, &value)? * 10000.0;
                let stored = scaled.round() as i64;
                self.data[off..off + 8].copy_from_slice(&stored.to_le_bytes());
                stored as f64 != scaled
            }
            ColumnType::Bool => {
                self.write_bit(off, value.is_truthy());
                false
            }
            ColumnType::Bytes | ColumnType::Str | ColumnType::WStr => {
                let slot = self.layout.slot_index(column);
                self.objects[slot] = value;
                false
            }
            ColumnType::Empty => return Err(RowError::VirtualColumn(column.name.clone())),
        };

        if !truncated {
            return Ok(None);
        }
        let truncation = NumericTruncation {
            column: column.name.clone(),
            target: column.ty.name(),
        };
        tracing::warn!(column = %column.name, target = truncation.target, "numeric value was truncated");
        Ok(Some(truncation))
    }
}
