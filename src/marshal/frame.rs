use crate::dbrow::Row;
use crate::value::{SharedRef, Value, ValueMap};

/// Which object-construction token opened a [`FrameState::Construct`] frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Construct {
    /// `((class, *args), [state])`
    NewObj,
    /// `(callable, args, [state])`
    Reduce,
}

/// What an open frame is waiting for.
#[derive(Debug)]
pub(crate) enum FrameState {
    /// Bottom of the stack. Its first value is the decode result.
    Root,
    /// Tuple or list collecting `len` items.
    Seq {
        items: Vec<Value>,
        len: usize,
        tuple: bool,
    },
    /// Dict collecting `remaining` pairs, each sent value first then key.
    Map {
        map: ValueMap,
        pending: Option<Value>,
        remaining: usize,
    },
    /// `DBROW` waiting for its descriptor.
    RowHeader,
    /// `DBROW` appending `remaining` variable-length column values.
    RowObjects { row: Box<Row>, remaining: usize },
    /// `INSTANCE` waiting for the class name.
    InstanceClass,
    /// `INSTANCE` waiting for the state of a bare instance.
    InstanceState { object: Value },
    /// `NEWOBJ` or `REDUCE` waiting for the argument tuple.
    Construct(Construct),
    /// List iterator phase, until `MARK`.
    Extend { object: Value },
    /// Dict iterator phase (value then key), until `MARK`.
    Insert {
        object: Value,
        pending: Option<Value>,
    },
}

impl FrameState {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            FrameState::Root => "ROOT",
            FrameState::Seq { tuple: true, .. } => "TUPLE",
            FrameState::Seq { tuple: false, .. } => "LIST",
            FrameState::Map { .. } => "DICT",
            FrameState::RowHeader | FrameState::RowObjects { .. } => "DBROW",
            FrameState::InstanceClass | FrameState::InstanceState { .. } => "INSTANCE",
            FrameState::Construct(Construct::NewObj) => "NEWOBJ",
            FrameState::Construct(Construct::Reduce) => "REDUCE",
            FrameState::Extend { .. } => "LIST_ITERATOR",
            FrameState::Insert { .. } => "DICT_ITERATOR",
        }
    }
}

/// An open container on the decode stack.
#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) state: FrameState,
    /// Shared slot claimed when the frame was opened.
    pub(crate) slot: Option<SharedRef>,
}

impl Frame {
    pub(crate) fn new(state: FrameState, slot: Option<SharedRef>) -> Self {
        Self { state, slot }
    }
}
