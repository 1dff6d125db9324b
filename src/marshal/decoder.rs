use super::Decoder;
use super::frame::{Construct, Frame, FrameState};
use super::reader::Reader;
use super::shared::SharedTable;
use crate::dbrow::Row;
use crate::error::{BuildError, MarshalError, Position, ResolveError, RowError};
use crate::types::{MAX_DEPTH, SHARED_FLAG, Token};
use crate::value::{SharedRef, Value, ValueMap};
use arrayvec::ArrayVec;
use num_bigint::BigInt;
use smol_str::SmolStr;

/// Outcome of reading one token.
enum Produced {
    Value(Value),
    Open(FrameState),
    Mark,
    /// Tokens that yield nothing (checksum).
    Skip,
}

/// Outcome of handing a value to the innermost frame.
enum Accept {
    /// Frame wants more.
    Pending,
    /// Frame finished; its value goes to the parent.
    Done(Value),
    /// The root received its value.
    Root(Value),
}

/// One decode call over one buffer.
pub(crate) struct Session<'a> {
    ctx: &'a Decoder,
    reader: Reader<'a>,
    size: usize,
    verify_checksum: bool,
    shared: SharedTable,
    frames: ArrayVec<Frame, { MAX_DEPTH + 1 }>,
    /// Tag of the token being processed, shared flag stripped.
    token: u8,
    /// Frame kind reported in errors.
    ctype: &'static str,
}

impl<'a> Session<'a> {
    pub(crate) fn new(
        ctx: &'a Decoder,
        buf: &'a [u8],
        start: usize,
        end: usize,
        shared: SharedTable,
        verify_checksum: bool,
    ) -> Self {
        Self {
            ctx,
            reader: Reader::new(buf, start, end),
            size: buf.len(),
            verify_checksum,
            shared,
            frames: ArrayVec::new(),
            token: 0,
            ctype: FrameState::Root.name(),
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Internal: errors
    // ════════════════════════════════════════════════════════════════════════

    fn at(&self) -> Position {
        Position {
            token: self.token,
            frame: self.ctype,
            offset: self.reader.pos(),
            size: self.size,
        }
    }

    fn truncated(&self) -> MarshalError {
        MarshalError::TruncatedInput { at: self.at() }
    }

    fn row_err(&self, source: RowError) -> MarshalError {
        MarshalError::Row {
            source,
            at: self.at(),
        }
    }

    fn build_err(&self, source: BuildError) -> MarshalError {
        MarshalError::Build {
            source,
            at: self.at(),
        }
    }

    fn resolve_err(&self, source: ResolveError) -> MarshalError {
        MarshalError::Resolve {
            source,
            at: self.at(),
        }
    }

    fn frame_err(&self, reason: &'static str) -> MarshalError {
        MarshalError::InvalidFrameState {
            reason,
            at: self.at(),
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Internal: checked reads
    // ════════════════════════════════════════════════════════════════════════

    fn read_u8(&mut self) -> Result<u8, MarshalError> {
        match self.reader.u8() {
            Some(b) => Ok(b),
            None => Err(self.truncated()),
        }
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], MarshalError> {
        match self.reader.bytes(n) {
            Some(b) => Ok(b),
            None => Err(self.truncated()),
        }
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], MarshalError> {
        match self.reader.array::<N>() {
            Some(b) => Ok(b),
            None => Err(self.truncated()),
        }
    }

    fn read_length(&mut self) -> Result<i64, MarshalError> {
        match self.reader.length() {
            Some(n) => Ok(n),
            None => Err(self.truncated()),
        }
    }

    /// A length that must be non-negative.
    fn size_of(&self, length: i64) -> Result<usize, MarshalError> {
        usize::try_from(length).map_err(|_| MarshalError::InvalidLength {
            length,
            at: self.at(),
        })
    }

    /// Fail unless at least `n` bytes remain.
    fn check_size(&self, n: usize) -> Result<(), MarshalError> {
        if n > self.reader.remaining() {
            return Err(self.truncated());
        }
        Ok(())
    }

    fn read_text(&mut self, n: usize) -> Result<SmolStr, MarshalError> {
        let bytes = self.read_bytes(n)?;
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(SmolStr::new(s)),
            Err(_) => Err(MarshalError::InvalidText { at: self.at() }),
        }
    }

    fn read_utf16(&mut self, units: usize) -> Result<SmolStr, MarshalError> {
        let byte_len = units.checked_mul(2).ok_or_else(|| self.truncated())?;
        let bytes = self.read_bytes(byte_len)?;
        let decoded: Result<String, _> = char::decode_utf16(
            bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]])),
        )
        .collect();
        match decoded {
            Ok(s) => Ok(SmolStr::from(s)),
            Err(_) => Err(MarshalError::InvalidText { at: self.at() }),
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Internal: shared slots and frames
    // ════════════════════════════════════════════════════════════════════════

    fn reserve(&mut self) -> Result<SharedRef, MarshalError> {
        match self.shared.reserve() {
            Some(slot) => Ok(slot),
            None => Err(MarshalError::SharedTableOverflow {
                capacity: self.shared.capacity(),
                at: self.at(),
            }),
        }
    }

    /// Store a finished value in its slot, handing back the reference.
    fn finish(&mut self, slot: Option<SharedRef>, value: Value) -> Value {
        match slot {
            Some(slot) => {
                self.shared.fill(slot, value);
                Value::Ref(slot)
            }
            None => value,
        }
    }

    fn open(&mut self, state: FrameState, shared: bool) -> Result<(), MarshalError> {
        if self.frames.is_full() {
            return Err(MarshalError::MaxDepthExceeded { at: self.at() });
        }
        let slot = if shared { Some(self.reserve()?) } else { None };
        tracing::trace!(frame = state.name(), depth = self.frames.len(), ?slot, "push frame");
        self.frames.push(Frame::new(state, slot));
        Ok(())
    }

    // ════════════════════════════════════════════════════════════════════════
    // Main loop
    // ════════════════════════════════════════════════════════════════════════

    /// Decode the root value. The shared table is returned for the graph.
    pub(crate) fn run(mut self) -> Result<(Value, SharedTable), MarshalError> {
        self.frames.push(Frame::new(FrameState::Root, None));

        loop {
            self.ctype = self.frames.last().map_or("ROOT", |f| f.state.name());
            if self.reader.is_empty() {
                return Err(MarshalError::IncompleteStream { at: self.at() });
            }

            let tag = self.read_u8()?;
            let shared = tag & SHARED_FLAG != 0;
            self.token = tag & !SHARED_FLAG;
            let Some(token) = Token::from_u8(self.token) else {
                return Err(MarshalError::UnsupportedToken { at: self.at() });
            };
            let length = if token.needs_length() {
                self.read_length()?
            } else {
                0
            };
            tracing::trace!(%token, shared, length, offset = self.reader.pos(), "token");

            let value = match self.read_token(token, length)? {
                Produced::Skip => continue,
                Produced::Open(state) => {
                    self.open(state, shared)?;
                    continue;
                }
                Produced::Mark => match self.mark()? {
                    Some(done) => done,
                    None => continue,
                },
                Produced::Value(value) if shared && token != Token::Ref => {
                    let slot = self.reserve()?;
                    self.finish(Some(slot), value)
                }
                Produced::Value(value) => value,
            };

            if let Some(root) = self.deliver(value)? {
                return Ok((root, self.shared));
            }
        }
    }

    fn read_token(&mut self, token: Token, length: i64) -> Result<Produced, MarshalError> {
        use Produced::{Open, Value as V};

        Ok(match token {
            Token::None => V(Value::Null),
            Token::True => V(Value::Bool(true)),
            Token::False => V(Value::Bool(false)),
            Token::MinusOne => V(Value::Int(-1)),
            Token::Zero => V(Value::Int(0)),
            Token::One => V(Value::Int(1)),
            Token::Float0 => V(Value::Float(0.0)),
            Token::String0 => V(Value::Bytes(Vec::new())),
            Token::Unicode0 => V(Value::Str(SmolStr::default())),
            Token::Tuple0 => V(Value::Tuple(Vec::new())),
            Token::List0 => V(Value::List(Vec::new())),

            Token::Int8 => V(Value::Int(i64::from(i8::from_le_bytes(self.read_array()?)))),
            Token::Int16 => V(Value::Int(i64::from(i16::from_le_bytes(self.read_array()?)))),
            Token::Int32 => V(Value::Int(i64::from(i32::from_le_bytes(self.read_array()?)))),
            Token::Int64 => V(Value::Int(i64::from_le_bytes(self.read_array()?))),
            Token::Float => V(Value::Float(f64::from_le_bytes(self.read_array()?))),
            Token::Long => {
                let n = self.size_of(length)?;
                let bytes = self.read_bytes(n)?;
                V(Value::from(BigInt::from_signed_bytes_le(bytes)))
            }

            Token::Checksum => {
                let stored = u32::from_le_bytes(self.read_array()?);
                if self.verify_checksum {
                    let computed = adler2::adler32_slice(self.reader.rest());
                    if stored != computed {
                        return Err(MarshalError::ChecksumError {
                            stored,
                            computed,
                            at: self.at(),
                        });
                    }
                }
                Produced::Skip
            }

            Token::String => {
                let n = usize::from(self.read_u8()?);
                V(Value::Bytes(self.read_bytes(n)?.to_vec()))
            }
            Token::String1 => V(Value::Bytes(self.read_bytes(1)?.to_vec())),
            Token::StringLong | Token::Buffer | Token::Stream => {
                let n = self.size_of(length)?;
                V(Value::Bytes(self.read_bytes(n)?.to_vec()))
            }
            Token::StringRef => {
                let table = &self.ctx.strings;
                match usize::try_from(length).ok().and_then(|i| table.get(i)) {
                    Some(s) => V(Value::Str(s.clone())),
                    None => {
                        return Err(MarshalError::InvalidStringTableIndex {
                            index: length,
                            len: table.slots(),
                            at: self.at(),
                        });
                    }
                }
            }
            Token::Unicode => {
                let n = self.size_of(length)?;
                V(Value::Str(self.read_utf16(n)?))
            }
            Token::Unicode1 => V(Value::Str(self.read_utf16(1)?)),
            Token::Utf8 => {
                let n = self.size_of(length)?;
                V(Value::Str(self.read_text(n)?))
            }

            Token::Tuple | Token::Tuple1 | Token::Tuple2 | Token::List | Token::List1 => {
                let len = match token {
                    Token::Tuple1 | Token::List1 => 1,
                    Token::Tuple2 => 2,
                    _ => self.size_of(length)?,
                };
                let tuple = matches!(token, Token::Tuple | Token::Tuple1 | Token::Tuple2);
                if len == 0 {
                    return Ok(V(if tuple {
                        Value::Tuple(Vec::new())
                    } else {
                        Value::List(Vec::new())
                    }));
                }
                // every item takes at least one byte
                self.check_size(len)?;
                Open(FrameState::Seq {
                    items: Vec::with_capacity(len),
                    len,
                    tuple,
                })
            }
            Token::Dict => {
                let len = self.size_of(length)?;
                if len == 0 {
                    return Ok(V(Value::Map(ValueMap::new())));
                }
                self.check_size(len.saturating_mul(2))?;
                Open(FrameState::Map {
                    map: ValueMap::with_capacity(len),
                    pending: None,
                    remaining: len,
                })
            }

            Token::Ref => {
                if !self.shared.is_claimed(length) {
                    return Err(MarshalError::DanglingReference {
                        index: length,
                        at: self.at(),
                    });
                }
                // is_claimed bounds the index to the table
                V(Value::Ref(SharedRef(length as u32)))
            }
            Token::Global => {
                let n = self.size_of(length)?;
                let name = self.read_text(n)?;
                match self.ctx.resolver.resolve(&name) {
                    Ok(class) => V(Value::Class(class)),
                    Err(e) => return Err(self.resolve_err(e)),
                }
            }

            Token::DbRow => Open(FrameState::RowHeader),
            Token::Instance => Open(FrameState::InstanceClass),
            Token::NewObj => Open(FrameState::Construct(Construct::NewObj)),
            Token::Reduce => Open(FrameState::Construct(Construct::Reduce)),
            Token::Mark => Produced::Mark,

            Token::Blue | Token::Callback | Token::Pickler => {
                return Err(MarshalError::UnsupportedToken { at: self.at() });
            }
        })
    }

    // ════════════════════════════════════════════════════════════════════════
    // Frame transitions
    // ════════════════════════════════════════════════════════════════════════

    /// Hand `value` up the stack until a frame wants more or the root is
    /// reached.
    fn deliver(&mut self, mut value: Value) -> Result<Option<Value>, MarshalError> {
        loop {
            match self.accept(value)? {
                Accept::Pending => return Ok(None),
                Accept::Done(done) => value = done,
                Accept::Root(root) => return Ok(Some(root)),
            }
        }
    }

    /// `MARK` moves an iterator frame from extend to insert, or closes it.
    fn mark(&mut self) -> Result<Option<Value>, MarshalError> {
        let Some(frame) = self.frames.pop() else {
            return Err(self.frame_err("MARK with no open frame"));
        };
        match frame.state {
            FrameState::Extend { object } => {
                self.frames.push(Frame::new(
                    FrameState::Insert {
                        object,
                        pending: None,
                    },
                    frame.slot,
                ));
                Ok(None)
            }
            FrameState::Insert { object, .. } => Ok(Some(self.finish(frame.slot, object))),
            _ => Err(self.frame_err("MARK outside an iterator phase")),
        }
    }

    fn accept(&mut self, value: Value) -> Result<Accept, MarshalError> {
        let Some(mut frame) = self.frames.pop() else {
            return Err(self.frame_err("value with no open frame"));
        };
        self.ctype = frame.state.name();

        let next = match frame.state {
            FrameState::Root => return Ok(Accept::Root(value)),

            FrameState::Seq {
                mut items,
                len,
                tuple,
            } => {
                items.push(value);
                if items.len() < len {
                    Err(FrameState::Seq { items, len, tuple })
                } else if tuple {
                    Ok(Value::Tuple(items))
                } else {
                    Ok(Value::List(items))
                }
            }

            FrameState::Map {
                mut map,
                pending,
                remaining,
            } => match pending {
                None => Err(FrameState::Map {
                    map,
                    pending: Some(value),
                    remaining,
                }),
                Some(item) => {
                    map.insert(value, item);
                    if remaining > 1 {
                        Err(FrameState::Map {
                            map,
                            pending: None,
                            remaining: remaining - 1,
                        })
                    } else {
                        Ok(Value::Map(map))
                    }
                }
            },

            FrameState::RowHeader => {
                let layout = match self.shared.resolve(&value) {
                    Value::Descriptor(layout) => layout.clone(),
                    other => {
                        let reason = format!("expected a row descriptor, got {}", other.type_name());
                        return Err(self.row_err(RowError::InvalidDescriptor(reason)));
                    }
                };
                let length = self.read_length()?;
                let n = self.size_of(length)?;
                let packed = self.read_bytes(n)?;
                let row = Row::from_packed(layout.clone(), packed, std::iter::empty())
                    .map_err(|e| self.row_err(e))?;
                match layout.object_count() {
                    0 => Ok(Value::from(row)),
                    remaining => Err(FrameState::RowObjects {
                        row: Box::new(row),
                        remaining,
                    }),
                }
            }

            FrameState::RowObjects { mut row, remaining } => {
                row.append(value).map_err(|e| self.row_err(e))?;
                if remaining > 1 {
                    Err(FrameState::RowObjects {
                        row,
                        remaining: remaining - 1,
                    })
                } else {
                    Ok(Value::Row(row))
                }
            }

            FrameState::InstanceClass => {
                let Some(name) = self.shared.resolve(&value).as_text() else {
                    return Err(self.frame_err("INSTANCE expects a class name"));
                };
                let class = self
                    .ctx
                    .resolver
                    .resolve(name)
                    .map_err(|e| self.resolve_err(e))?;
                let object = self
                    .ctx
                    .builder
                    .allocate(&class, Vec::new(), &self.shared)
                    .map_err(|e| self.build_err(e))?;
                Err(FrameState::InstanceState { object })
            }

            FrameState::InstanceState { mut object } => {
                self.ctx
                    .builder
                    .apply_state(&mut object, value, &self.shared)
                    .map_err(|e| self.build_err(e))?;
                Ok(object)
            }

            FrameState::Construct(kind) => {
                let object = self.construct(kind, value)?;
                Err(FrameState::Extend { object })
            }

            FrameState::Extend { mut object } => {
                self.ctx
                    .builder
                    .extend(&mut object, value)
                    .map_err(|e| self.build_err(e))?;
                Err(FrameState::Extend { object })
            }

            FrameState::Insert {
                mut object,
                pending,
            } => match pending {
                None => Err(FrameState::Insert {
                    object,
                    pending: Some(value),
                }),
                Some(item) => {
                    self.ctx
                        .builder
                        .insert(&mut object, value, item)
                        .map_err(|e| self.build_err(e))?;
                    Err(FrameState::Insert {
                        object,
                        pending: None,
                    })
                }
            },
        };

        // Ok: the frame is complete. Err: it stays open in its new state.
        match next {
            Ok(done) => {
                tracing::trace!(frame = self.ctype, depth = self.frames.len(), "pop frame");
                Ok(Accept::Done(self.finish(frame.slot, done)))
            }
            Err(state) => {
                frame.state = state;
                self.frames.push(frame);
                Ok(Accept::Pending)
            }
        }
    }

    /// Build the object for a `NEWOBJ` or `REDUCE` argument tuple.
    fn construct(&self, kind: Construct, payload: Value) -> Result<Value, MarshalError> {
        let items = match self.shared.resolve_owned(payload) {
            Value::Tuple(items) | Value::List(items) => items,
            _ => return Err(self.frame_err("object construction expects a tuple")),
        };
        let mut items = items.into_iter();
        let builder = &self.ctx.builder;

        let mut object = match kind {
            Construct::NewObj => {
                let args = match items.next().map(|a| self.shared.resolve_owned(a)) {
                    Some(Value::Tuple(args)) | Some(Value::List(args)) => args,
                    _ => return Err(self.frame_err("NEWOBJ expects an argument tuple")),
                };
                let mut args = args.into_iter();
                let class = match args.next().map(|c| self.shared.resolve_owned(c)) {
                    Some(Value::Class(class)) => class,
                    Some(other) => {
                        return Err(self.build_err(BuildError::NotCallable(other.type_name())));
                    }
                    None => return Err(self.frame_err("NEWOBJ expects a class")),
                };
                builder
                    .allocate(&class, args.collect(), &self.shared)
                    .map_err(|e| self.build_err(e))?
            }
            Construct::Reduce => {
                let Some(callable) = items.next() else {
                    return Err(self.frame_err("REDUCE expects a callable"));
                };
                let args = match items.next().map(|a| self.shared.resolve_owned(a)) {
                    Some(Value::Tuple(args)) | Some(Value::List(args)) => args,
                    Some(Value::Null) | None => Vec::new(),
                    Some(_) => return Err(self.frame_err("REDUCE expects an argument tuple")),
                };
                builder
                    .call(&callable, args, &self.shared)
                    .map_err(|e| self.build_err(e))?
            }
        };

        if let Some(state) = items.next() {
            builder
                .apply_state(&mut object, state, &self.shared)
                .map_err(|e| self.build_err(e))?;
        }
        Ok(object)
    }
}
