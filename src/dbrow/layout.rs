use crate::error::RowError;
use smol_str::SmolStr;

// ─── Column Type Codes ──────────────────────────────────────────────────────

pub const DBTYPE_EMPTY: i64 = 0;
pub const DBTYPE_I2: i64 = 2;
pub const DBTYPE_I4: i64 = 3;
pub const DBTYPE_R4: i64 = 4;
pub const DBTYPE_R8: i64 = 5;
pub const DBTYPE_CY: i64 = 6;
pub const DBTYPE_BOOL: i64 = 11;
pub const DBTYPE_I1: i64 = 16;
pub const DBTYPE_UI1: i64 = 17;
pub const DBTYPE_UI2: i64 = 18;
pub const DBTYPE_UI4: i64 = 19;
pub const DBTYPE_I8: i64 = 20;
pub const DBTYPE_UI8: i64 = 21;
pub const DBTYPE_FILETIME: i64 = 64;
pub const DBTYPE_BYTES: i64 = 128;
pub const DBTYPE_STR: i64 = 129;
pub const DBTYPE_WSTR: i64 = 130;
pub const DBTYPE_DBTIMESTAMP: i64 = 135;

/// Width of one variable-length object slot in the row's trailing area.
pub const SLOT_WIDTH: usize = std::mem::size_of::<usize>();

#[inline]
fn align_slot(n: usize) -> usize {
    (n + SLOT_WIDTH - 1) & !(SLOT_WIDTH - 1)
}

// ─── ColumnType ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Empty,
    I1,
    UI1,
    I2,
    UI2,
    I4,
    UI4,
    I8,
    UI8,
    R4,
    R8,
    Currency,
    FileTime,
    Timestamp,
    Bool,
    Bytes,
    Str,
    WStr,
}

impl ColumnType {
    pub fn from_code(code: i64) -> Result<Self, RowError> {
        Ok(match code {
            DBTYPE_EMPTY => ColumnType::Empty,
            DBTYPE_I1 => ColumnType::I1,
            DBTYPE_UI1 => ColumnType::UI1,
            DBTYPE_I2 => ColumnType::I2,
            DBTYPE_UI2 => ColumnType::UI2,
            DBTYPE_I4 => ColumnType::I4,
            DBTYPE_UI4 => ColumnType::UI4,
            DBTYPE_I8 => ColumnType::I8,
            DBTYPE_UI8 => ColumnType::UI8,
            DBTYPE_R4 => ColumnType::R4,
            DBTYPE_R8 => ColumnType::R8,
            DBTYPE_CY => ColumnType::Currency,
            DBTYPE_FILETIME => ColumnType::FileTime,
            DBTYPE_DBTIMESTAMP => ColumnType::Timestamp,
            DBTYPE_BOOL => ColumnType::Bool,
            DBTYPE_BYTES => ColumnType::Bytes,
            DBTYPE_STR => ColumnType::Str,
            DBTYPE_WSTR => ColumnType::WStr,
            other => return Err(RowError::UnsupportedColumnType(other)),
        })
    }

    pub fn code(self) -> i64 {
        match self {
            ColumnType::Empty => DBTYPE_EMPTY,
            ColumnType::I1 => DBTYPE_I1,
            ColumnType::UI1 => DBTYPE_UI1,
            ColumnType::I2 => DBTYPE_I2,
            ColumnType::UI2 => DBTYPE_UI2,
            ColumnType::I4 => DBTYPE_I4,
            ColumnType::UI4 => DBTYPE_UI4,
            ColumnType::I8 => DBTYPE_I8,
            ColumnType::UI8 => DBTYPE_UI8,
            ColumnType::R4 => DBTYPE_R4,
            ColumnType::R8 => DBTYPE_R8,
            ColumnType::Currency => DBTYPE_CY,
            ColumnType::FileTime => DBTYPE_FILETIME,
            ColumnType::Timestamp => DBTYPE_DBTIMESTAMP,
            ColumnType::Bool => DBTYPE_BOOL,
            ColumnType::Bytes => DBTYPE_BYTES,
            ColumnType::Str => DBTYPE_STR,
            ColumnType::WStr => DBTYPE_WSTR,
        }
    }

    pub fn size_class(self) -> SizeClass {
        match self {
            ColumnType::Bool => SizeClass::Bit,
            ColumnType::I1 | ColumnType::UI1 => SizeClass::Byte1,
            ColumnType::I2 | ColumnType::UI2 => SizeClass::Byte2,
            ColumnType::I4 | ColumnType::UI4 | ColumnType::R4 => SizeClass::Byte4,
            ColumnType::I8
            | ColumnType::UI8
            | ColumnType::R8
            | ColumnType::Currency
            | ColumnType::FileTime
            | ColumnType::Timestamp => SizeClass::Byte8,
            ColumnType::Bytes | ColumnType::Str | ColumnType::WStr => SizeClass::Object,
            ColumnType::Empty => SizeClass::Virtual,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Empty => "empty",
            ColumnType::I1 => "int8",
            ColumnType::UI1 => "uint8",
            ColumnType::I2 => "int16",
            ColumnType::UI2 => "uint16",
            ColumnType::I4 => "int32",
            ColumnType::UI4 => "uint32",
            ColumnType::I8 => "int64",
            ColumnType::UI8 => "uint64",
            ColumnType::R4 => "float",
            ColumnType::R8 => "double",
            ColumnType::Currency => "currency",
            ColumnType::FileTime => "filetime",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Bool => "bool",
            ColumnType::Bytes => "bytes",
            ColumnType::Str => "str",
            ColumnType::WStr => "wstr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    Bit,
    Byte1,
    Byte2,
    Byte4,
    Byte8,
    Object,
    Virtual,
}

impl SizeClass {
    /// Position in the fixed-area packing order, `None` outside that area.
    fn rank(self) -> Option<usize> {
        match self {
            SizeClass::Bit => Some(0),
            SizeClass::Byte1 => Some(1),
            SizeClass::Byte2 => Some(2),
            SizeClass::Byte4 => Some(3),
            SizeClass::Byte8 => Some(4),
            SizeClass::Object | SizeClass::Virtual => None,
        }
    }
}

// ─── ColumnDescriptor ───────────────────────────────────────────────────────

/// One planned column.
///
/// `offset` is a byte offset for scalars, a bit position for booleans, a
/// sequential index for virtual columns and the slot offset (past the aligned
/// fixed area) for variable-length columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: SmolStr,
    pub ty: ColumnType,
    pub size: SizeClass,
    pub offset: usize,
}

// ─── RowLayout ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RowLayout {
    columns: Vec<ColumnDescriptor>,
    object_count: usize,
    unpacked_size: usize,
    total_size: usize,
}

/// Plan a layout from `(name, type code)` pairs.
pub fn build_layout<I, S>(columns: I) -> Result<RowLayout, RowError>
where
    I: IntoIterator<Item = (S, i64)>,
    S: Into<SmolStr>,
{
    RowLayout::new(columns)
}

impl RowLayout {
    pub fn new<I, S>(specs: I) -> Result<Self, RowError>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<SmolStr>,
    {
        let mut columns: Vec<ColumnDescriptor> = Vec::new();
        let mut counts = [0usize; 5];
        let mut object_count = 0usize;

        for (name, code) in specs {
            let name = name.into();
            let ty = ColumnType::from_code(code)?;
            if columns.iter().any(|c| c.name == name) {
                return Err(RowError::InvalidDescriptor(format!("duplicate column `{name}`")));
            }
            let size = ty.size_class();
            match size.rank() {
                Some(rank) => counts[rank] += 1,
                None if size == SizeClass::Object => object_count += 1,
                None => {}
            }
            columns.push(ColumnDescriptor {
                name,
                ty,
                size,
                offset: 0,
            });
        }

        // Widest class first, no padding inside or between classes.
        let mut next = [0usize; 5];
        let mut offset = 0usize;
        for rank in (1..=4).rev() {
            next[rank] = offset;
            offset += counts[rank] * (1 << (rank - 1));
        }

        // Boolean bits follow the scalars, plus one reserved bit per column.
        let mut bits = offset * 8;
        next[0] = bits;
        bits += counts[0] + columns.len();
        let unpacked_size = bits.div_ceil(8);

        let slot_base = align_slot(unpacked_size);
        let total_size = if object_count > 0 {
            slot_base + object_count * SLOT_WIDTH
        } else {
            unpacked_size
        };

        let mut slots = 0usize;
        let mut virtuals = 0usize;
        for column in columns.iter_mut() {
            column.offset = match column.size {
                SizeClass::Object => {
                    slots += 1;
                    slot_base + (slots - 1) * SLOT_WIDTH
                }
                SizeClass::Virtual => {
                    virtuals += 1;
                    virtuals - 1
                }
                SizeClass::Bit => {
                    next[0] += 1;
                    next[0] - 1
                }
                sized => {
                    // rank() is Some for every remaining class
                    let rank = sized.rank().unwrap_or(1);
                    let at = next[rank];
                    next[rank] += 1 << (rank - 1);
                    at
                }
            };
        }

        Ok(Self {
            columns,
            object_count,
            unpacked_size,
            total_size,
        })
    }

    #[inline]
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Number of variable-length (object) columns.
    #[inline]
    pub fn object_count(&self) -> usize {
        self.object_count
    }

    /// Size of the RLE-coded fixed area in bytes.
    #[inline]
    pub fn unpacked_size(&self) -> usize {
        self.unpacked_size
    }

    /// Fixed area plus the word-aligned object slot area.
    #[inline]
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    #[inline]
    pub fn column(&self, index: usize) -> Option<&ColumnDescriptor> {
        self.columns.get(index)
    }

    /// Linear scan by name. Layouts are small.
    pub fn find(&self, name: &str) -> Option<(usize, &ColumnDescriptor)> {
        self.columns.iter().enumerate().find(|(_, c)| c.name == name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &SmolStr> + '_ {
        self.columns.iter().map(|c| &c.name)
    }

    /// Slot index of a variable-length column.
    pub(crate) fn slot_index(&self, column: &ColumnDescriptor) -> usize {
        (column.offset - align_slot(self.unpacked_size)) / SLOT_WIDTH
    }

    /// The `(name, type code)` pairs this layout was planned from.
    pub fn specs(&self) -> Vec<(SmolStr, i64)> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.ty.code()))
            .collect()
    }
}
