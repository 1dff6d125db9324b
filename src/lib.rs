//! Decoder for the blue marshal binary serialization format.
//!
//! A stream is decoded into an [`ObjectGraph`]: a root [`Value`] plus the
//! shared objects it references. Database rows arrive as [`Row`]s backed by a
//! packed byte buffer and a [`RowLayout`] planned from the row descriptor.
//!
//! ```no_run
//! use blue_marshal::Decoder;
//!
//! let decoder = Decoder::new();
//! let graph = decoder.decode(&[0x7e, 0, 0, 0, 0, 0x09])?;
//! assert_eq!(graph.root().as_i64(), Some(1));
//! # Ok::<(), blue_marshal::MarshalError>(())
//! ```

pub mod builder;
pub mod dbrow;
pub mod error;
pub mod legacy;
pub mod marshal;
pub mod resolver;
pub mod rle;
pub mod string_table;
pub mod types;
pub mod value;

pub use builder::{DefaultBuilder, ObjectBuilder};
pub use dbrow::{ColumnDescriptor, ColumnKey, ColumnType, Row, RowLayout, build_layout};
pub use error::{BuildError, MarshalError, NumericTruncation, Position, ResolveError, RowError};
pub use legacy::{LegacyDecoder, PassThrough};
pub use marshal::{Decoder, DecoderBuilder, MarshalConfig, ObjectGraph, SharedTable, decode};
pub use resolver::{GlobalResolver, Namespace};
pub use string_table::StringTable;
pub use value::{ClassHandle, ClassKind, Object, SharedRef, Value, ValueMap};
