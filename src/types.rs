// ─── Stream Constants ───────────────────────────────────────────────────────

pub const PROTOCOL_ID: u8 = 0x7e;
pub const SHARED_FLAG: u8 = 0x40;

/// Maximum number of open container frames below the root.
pub const MAX_DEPTH: usize = 64;

/// Marker byte plus the little-endian shared-table count.
pub const HEADER_SIZE: usize = 5;

/// Streams shorter than this are never marshal streams.
pub const MIN_STREAM_SIZE: usize = 6;

// ─── Binary Layout ──────────────────────────────────────────────────────────
//
//  ┌──────────────────────────────────────────────┐
//  │ Header (5 bytes)                             │
//  │   protocol marker: u8 (0x7e)                 │
//  │   shared count N:  i32 (LE)                  │
//  ├──────────────────────────────────────────────┤
//  │ Token stream (variable)                      │
//  │   tag: u8  (bit 6 = shared flag)             │
//  │   length: u8, or 0xff + i32 (LE), if needed  │
//  │   payload                                    │
//  ├──────────────────────────────────────────────┤
//  │ Shared index map (4 × N bytes)               │
//  │   slot: i32 (LE), each in [1, N]             │
//  └──────────────────────────────────────────────┘

// ─── Token ──────────────────────────────────────────────────────────────────

/// Token type ids of the historical registry.
///
/// Ids 0x0c, 0x1a, 0x1d and 0x1e were retired upstream and never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Token {
    None = 0x01,
    Global = 0x02,
    Int64 = 0x03,
    Int32 = 0x04,
    Int16 = 0x05,
    Int8 = 0x06,
    MinusOne = 0x07,
    Zero = 0x08,
    One = 0x09,
    Float = 0x0a,
    Float0 = 0x0b,
    StringLong = 0x0d,
    String0 = 0x0e,
    String1 = 0x0f,
    String = 0x10,
    StringRef = 0x11,
    Unicode = 0x12,
    Buffer = 0x13,
    Tuple = 0x14,
    List = 0x15,
    Dict = 0x16,
    Instance = 0x17,
    Blue = 0x18,
    Callback = 0x19,
    Ref = 0x1b,
    Checksum = 0x1c,
    True = 0x1f,
    False = 0x20,
    Pickler = 0x21,
    Reduce = 0x22,
    NewObj = 0x23,
    Tuple0 = 0x24,
    Tuple1 = 0x25,
    List0 = 0x26,
    List1 = 0x27,
    Unicode0 = 0x28,
    Unicode1 = 0x29,
    DbRow = 0x2a,
    Stream = 0x2b,
    Tuple2 = 0x2c,
    Mark = 0x2d,
    Utf8 = 0x2e,
    Long = 0x2f,
}

impl Token {
    pub fn from_u8(id: u8) -> Option<Token> {
        use Token::*;
        Some(match id {
            0x01 => None,
            0x02 => Global,
            0x03 => Int64,
            0x04 => Int32,
            0x05 => Int16,
            0x06 => Int8,
            0x07 => MinusOne,
            0x08 => Zero,
            0x09 => One,
            0x0a => Float,
            0x0b => Float0,
            0x0d => StringLong,
            0x0e => String0,
            0x0f => String1,
            0x10 => String,
            0x11 => StringRef,
            0x12 => Unicode,
            0x13 => Buffer,
            0x14 => Tuple,
            0x15 => List,
            0x16 => Dict,
            0x17 => Instance,
            0x18 => Blue,
            0x19 => Callback,
            0x1b => Ref,
            0x1c => Checksum,
            0x1f => True,
            0x20 => False,
            0x21 => Pickler,
            0x22 => Reduce,
            0x23 => NewObj,
            0x24 => Tuple0,
            0x25 => Tuple1,
            0x26 => List0,
            0x27 => List1,
            0x28 => Unicode0,
            0x29 => Unicode1,
            0x2a => DbRow,
            0x2b => Stream,
            0x2c => Tuple2,
            0x2d => Mark,
            0x2e => Utf8,
            0x2f => Long,
            _ => return Option::None,
        })
    }

    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Tokens whose tag byte is followed by a generic length field.
    pub fn needs_length(self) -> bool {
        matches!(
            self,
            Token::Tuple
                | Token::Dict
                | Token::List
                | Token::StringLong
                | Token::StringRef
                | Token::Unicode
                | Token::Global
                | Token::Stream
                | Token::Utf8
                | Token::Long
                | Token::Ref
                | Token::Blue
                | Token::Buffer
        )
    }

    pub fn name(self) -> &'static str {
        use Token::*;
        match self {
            None => "NONE",
            Global => "GLOBAL",
            Int64 => "INT64",
            Int32 => "INT32",
            Int16 => "INT16",
            Int8 => "INT8",
            MinusOne => "MINUSONE",
            Zero => "ZERO",
            One => "ONE",
            Float => "FLOAT",
            Float0 => "FLOAT0",
            StringLong => "STRINGL",
            String0 => "STRING0",
            String1 => "STRING1",
            String => "STRING",
            StringRef => "STRINGR",
            Unicode => "UNICODE",
            Buffer => "BUFFER",
            Tuple => "TUPLE",
            List => "LIST",
            Dict => "DICT",
            Instance => "INSTANCE",
            Blue => "BLUE",
            Callback => "CALLBACK",
            Ref => "REF",
            Checksum => "CHECKSUM",
            True => "TRUE",
            False => "FALSE",
            Pickler => "PICKLER",
            Reduce => "REDUCE",
            NewObj => "NEWOBJ",
            Tuple0 => "TUPLE0",
            Tuple1 => "TUPLE1",
            List0 => "LIST0",
            List1 => "LIST1",
            Unicode0 => "UNICODE0",
            Unicode1 => "UNICODE1",
            DbRow => "DBROW",
            Stream => "STREAM",
            Tuple2 => "TUPLE2",
            Mark => "MARK",
            Utf8 => "UTF8",
            Long => "LONG",
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(0x{:02x})", self.name(), self.id())
    }
}
