// ─── Error ──────────────────────────────────────────────────────────────────
use smol_str::SmolStr;
use thiserror::Error;

/// Where in a stream a decode error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Raw tag byte of the token being processed (shared flag stripped).
    pub token: u8,
    /// Kind of the innermost open frame.
    pub frame: &'static str,
    pub offset: usize,
    pub size: usize,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = crate::types::Token::from_u8(self.token).map_or("???", |t| t.name());
        write!(
            f,
            "type:{name}(0x{:02x}) ctype:{} pos:{} size:{}",
            self.token, self.frame, self.offset, self.size
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RowError {
    #[error("unsupported column type {0}")]
    UnsupportedColumnType(i64),
    #[error("invalid row descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("invalid RLE string: {reason} (input:{input_len} output:{output_len})")]
    TruncatedRle {
        reason: &'static str,
        input_len: usize,
        output_len: usize,
    },
    #[error("row object table full ({capacity} slots)")]
    ObjectTableFull { capacity: usize },
    #[error("column not found: {0}")]
    ColumnNotFound(SmolStr),
    #[error("column index {index} out of range ({count} columns)")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("column `{column}` expects a {expected} value")]
    TypeMismatch {
        column: SmolStr,
        expected: &'static str,
    },
    #[error("column `{0}` is virtual and has no storage")]
    VirtualColumn(SmolStr),
    #[error("invalid row state: {0}")]
    InvalidState(&'static str),
}

/// Non-fatal outcome of a row set operation that lost precision.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericTruncation {
    pub column: SmolStr,
    pub target: &'static str,
}

impl std::fmt::Display for NumericTruncation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "numeric value was truncated to {} in column `{}`", self.target, self.column)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    #[error("unable to locate object `{name}`: {reason}")]
    NameResolutionFailed { name: SmolStr, reason: String },
    #[error("no fallback resolver configured to locate `{0}`")]
    NoResolverConfigured(SmolStr),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("object of kind {0} is not callable")]
    NotCallable(&'static str),
    #[error("invalid arguments for {class}: {reason}")]
    InvalidArguments { class: SmolStr, reason: String },
    #[error("{operation} is not supported on {kind}")]
    Unsupported {
        operation: &'static str,
        kind: &'static str,
    },
    #[error(transparent)]
    Row(#[from] RowError),
}

#[derive(Debug, Error)]
pub enum MarshalError {
    #[error("unexpected end of data - {at}")]
    TruncatedInput { at: Position },
    #[error("invalid length {length} - {at}")]
    InvalidLength { length: i64, at: Position },
    #[error("bogus shared map: {reason} (count:{count} size:{size})")]
    MalformedSharedMap {
        reason: &'static str,
        count: i64,
        size: usize,
    },
    #[error("shared object table overflow (size:{capacity}) - {at}")]
    SharedTableOverflow { capacity: usize, at: Position },
    #[error("shared reference #{index} points to invalid object - {at}")]
    DanglingReference { index: i64, at: Position },
    #[error("unsupported type - {at}")]
    UnsupportedToken { at: Position },
    #[error("invalid string table index {index} (table size {len}) - {at}")]
    InvalidStringTableIndex { index: i64, len: usize, at: Position },
    #[error("checksum error: stored 0x{stored:08x}, computed 0x{computed:08x} - {at}")]
    ChecksumError {
        stored: u32,
        computed: u32,
        at: Position,
    },
    #[error("object hierarchy too deep - {at}")]
    MaxDepthExceeded { at: Position },
    #[error("invalid text data - {at}")]
    InvalidText { at: Position },
    #[error("invalid container state: {reason} - {at}")]
    InvalidFrameState { reason: &'static str, at: Position },
    #[error("not enough objects in stream - {at}")]
    IncompleteStream { at: Position },
    #[error("{source} - {at}")]
    Row { source: RowError, at: Position },
    #[error("{source} - {at}")]
    Resolve { source: ResolveError, at: Position },
    #[error("{source} - {at}")]
    Build { source: BuildError, at: Position },
    #[error("shared reference #{index} is part of a cycle")]
    CyclicReference { index: u32 },
    #[error("materialized graph exceeds {limit} {what}")]
    MaterializeLimit { what: &'static str, limit: usize },
    #[error("stream is not a marshal stream and no legacy decoder is configured")]
    NoLegacyDecoder,
    #[error("legacy decoder failed: {0}")]
    Legacy(String),
}

impl MarshalError {
    /// Position in the stream, for errors raised by the token loop.
    pub fn position(&self) -> Option<Position> {
        use MarshalError::*;
        match self {
            TruncatedInput { at }
            | InvalidLength { at, .. }
            | SharedTableOverflow { at, .. }
            | DanglingReference { at, .. }
            | UnsupportedToken { at }
            | InvalidStringTableIndex { at, .. }
            | ChecksumError { at, .. }
            | MaxDepthExceeded { at }
            | InvalidText { at }
            | InvalidFrameState { at, .. }
            | IncompleteStream { at }
            | Row { at, .. }
            | Resolve { at, .. }
            | Build { at, .. } => Some(*at),
            MalformedSharedMap { .. }
            | CyclicReference { .. }
            | MaterializeLimit { .. }
            | NoLegacyDecoder
            | Legacy(_) => None,
        }
    }
}
