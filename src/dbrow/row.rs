use super::layout::{ColumnType, RowLayout};
use crate::error::RowError;
use crate::rle;
use crate::value::Value;
use smol_str::SmolStr;
use std::sync::Arc;

// ─── Row ────────────────────────────────────────────────────────────────────

/// A fixed-layout record: an unpacked byte area for scalar and boolean
/// columns plus an object table for variable-length columns.
///
/// Unset object slots read back as [`Value::Null`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub(super) layout: Arc<RowLayout>,
    pub(super) data: Vec<u8>,
    pub(super) objects: Vec<Value>,
    pub(super) appended: usize,
}

impl Row {
    /// A zeroed row with every object slot unset.
    pub fn new(layout: Arc<RowLayout>) -> Self {
        Self {
            data: vec![0; layout.unpacked_size()],
            objects: vec![Value::Null; layout.object_count()],
            appended: 0,
            layout,
        }
    }

    /// Rebuild a row from its RLE-packed fixed area and the stored objects.
    pub fn from_packed<I>(layout: Arc<RowLayout>, packed: &[u8], objects: I) -> Result<Self, RowError>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut row = Row::new(layout);
        rle::unpack(packed, &mut row.data)?;
        for object in objects {
            row.append(object)?;
        }
        Ok(row)
    }

    /// Build a row by setting every column from `values`, in column order.
    ///
    /// Virtual columns are skipped. All object slots count as appended
    /// afterwards.
    pub fn from_values(layout: Arc<RowLayout>, values: Vec<Value>) -> Result<Self, RowError> {
        if values.len() != layout.len() {
            return Err(RowError::InvalidDescriptor(format!(
                "expected {} values, got {}",
                layout.len(),
                values.len()
            )));
        }
        let mut row = Row::new(layout.clone());
        for (column, value) in layout.columns().iter().zip(values) {
            if column.ty == ColumnType::Empty {
                continue;
            }
            row.set_column(column, value)?;
        }
        row.appended = row.objects.len();
        Ok(row)
    }

    #[inline]
    pub fn layout(&self) -> &Arc<RowLayout> {
        &self.layout
    }

    /// The unpacked fixed area.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of objects appended to the object table so far.
    #[inline]
    pub fn appended(&self) -> usize {
        self.appended
    }

    /// Store the next object in the object table.
    pub fn append(&mut self, value: Value) -> Result<(), RowError> {
        if self.appended >= self.objects.len() {
            return Err(RowError::ObjectTableFull {
                capacity: self.objects.len(),
            });
        }
        self.objects[self.appended] = value;
        self.appended += 1;
        Ok(())
    }

    /// The `index`-th appended object.
    pub fn object(&self, index: usize) -> Result<&Value, RowError> {
        if index >= self.appended {
            return Err(RowError::IndexOutOfRange {
                index,
                count: self.appended,
            });
        }
        Ok(&self.objects[index])
    }

    pub(crate) fn objects(&self) -> &[Value] {
        &self.objects
    }

    pub(crate) fn objects_mut(&mut self) -> &mut [Value] {
        &mut self.objects
    }

    /// RLE-pack the fixed area.
    pub fn pack(&self) -> Vec<u8> {
        rle::pack(&self.data)
    }

    /// Replace the row's contents from a state value.
    ///
    /// Accepts `(packed bytes, object list)`, the packed bytes alone, or the
    /// object list alone.
    pub fn set_state(&mut self, state: Value) -> Result<(), RowError> {
        let (packed, objects) = match state {
            Value::Tuple(items) => {
                let mut items = items.into_iter();
                match (items.next(), items.next()) {
                    (Some(Value::Bytes(packed)), Some(Value::List(objects))) => {
                        (Some(packed), Some(objects))
                    }
                    _ => return Err(RowError::InvalidState("expected (bytes, list)")),
                }
            }
            Value::Bytes(packed) => (Some(packed), None),
            Value::List(objects) => (None, Some(objects)),
            _ => {
                return Err(RowError::InvalidState(
                    "expected bytes, a list or a (bytes, list) tuple",
                ));
            }
        };

        if let Some(packed) = packed {
            rle::unpack(&packed, &mut self.data)?;
        }
        if let Some(objects) = objects {
            for object in objects {
                self.append(object)?;
            }
        }
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &SmolStr> + '_ {
        self.layout.keys()
    }

    /// Every column with its current value, in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, Value)> + '_ {
        self.layout
            .columns()
            .iter()
            .map(|c| (&c.name, self.get_column(c)))
    }
}
