use crate::error::MarshalError;
use crate::value::{SharedRef, Value};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Result of a decode: the root value and the shared-object slots it refers
/// to.
///
/// Shared values appear in the graph as [`Value::Ref`]. Cycles are only
/// possible through references, so an `ObjectGraph` is always finite.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectGraph {
    root: Value,
    shared: Vec<Option<Value>>,
}

impl ObjectGraph {
    pub(crate) fn new(root: Value, shared: Vec<Option<Value>>) -> Self {
        Self { root, shared }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn into_root(self) -> Value {
        self.root
    }

    /// Number of shared slots declared by the stream.
    pub fn shared_len(&self) -> usize {
        self.shared.len()
    }

    pub fn shared(&self, slot: SharedRef) -> Option<&Value> {
        self.shared
            .get((slot.0 as usize).checked_sub(1)?)
            .and_then(Option::as_ref)
    }

    pub fn shared_mut(&mut self, slot: SharedRef) -> Option<&mut Value> {
        self.shared
            .get_mut((slot.0 as usize).checked_sub(1)?)
            .and_then(Option::as_mut)
    }

    /// Iterate over the filled slots.
    pub fn shared_values(&self) -> impl Iterator<Item = (SharedRef, &Value)> {
        self.shared
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| Some((SharedRef(i as u32 + 1), slot.as_ref()?)))
    }

    /// Follow references until a non-reference value.
    pub fn resolve<'a>(&'a self, mut value: &'a Value) -> &'a Value {
        for _ in 0..=self.shared.len() {
            match value {
                Value::Ref(r) => match self.shared(*r) {
                    Some(target) => value = target,
                    None => return value,
                },
                _ => return value,
            }
        }
        value
    }

    /// The root with every reference replaced by a copy of its target.
    ///
    /// Values reachable through several references are copied each time.
    /// Fails with [`MarshalError::CyclicReference`] when a reference leads
    /// back into itself. Fails with [`MarshalError::MaterializeLimit`] once
    /// more than [`MATERIALIZE_LIMIT`] values have been copied or the result
    /// would nest deeper than [`MATERIALIZE_MAX_DEPTH`].
    pub fn materialize(&self) -> Result<Value, MarshalError> {
        self.materialize_with_limit(MATERIALIZE_LIMIT)
    }

    /// [`ObjectGraph::materialize`] with an explicit value budget.
    pub fn materialize_with_limit(&self, limit: usize) -> Result<Value, MarshalError> {
        let mut expansion = Expansion {
            graph: self,
            slots: self.shared.iter().map(|_| Expanded::Unvisited).collect(),
            budget: limit,
            limit,
        };
        for slot in self.refs_in(&self.root) {
            expansion.expand_slot(slot)?;
        }
        Ok(expansion.substitute(&self.root)?.value)
    }

    /// Zero-based indexes of the filled slots referenced below `value`,
    /// without following the references themselves.
    fn refs_in(&self, value: &Value) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![value];
        while let Some(value) = stack.pop() {
            match value {
                Value::Ref(r) => {
                    if self.shared(*r).is_some() {
                        out.push(r.0 as usize - 1);
                    }
                }
                _ => stack.extend(value.children()),
            }
        }
        out
    }
}

// ─── Materialize ────────────────────────────────────────────────────────────

/// Default value budget for [`ObjectGraph::materialize`].
pub const MATERIALIZE_LIMIT: usize = 1 << 20;

/// Deepest nesting [`ObjectGraph::materialize`] will build.
pub const MATERIALIZE_MAX_DEPTH: usize = 1024;

/// An expanded value with its size and nesting depth.
struct Tree {
    value: Value,
    nodes: usize,
    depth: usize,
}

enum Expanded {
    Unvisited,
    /// On the current walk; meeting it again is a cycle.
    Open,
    Done(Tree),
}

/// Slot-by-slot expansion. Each slot is expanded once and copied from
/// there, and every copy is charged against one budget.
struct Expansion<'a> {
    graph: &'a ObjectGraph,
    slots: Vec<Expanded>,
    budget: usize,
    limit: usize,
}

impl Expansion<'_> {
    /// Expand `start` and every slot it depends on, deepest first.
    fn expand_slot(&mut self, start: usize) -> Result<(), MarshalError> {
        if !matches!(self.slots[start], Expanded::Unvisited) {
            return self.check_open(start);
        }
        let mut walk = vec![self.open(start)];

        while let Some((slot, pending)) = walk.last_mut() {
            let Some(next) = pending.pop() else {
                let slot = *slot;
                walk.pop();
                let graph = self.graph;
                let tree = match &graph.shared[slot] {
                    Some(target) => self.substitute(target)?,
                    None => Tree {
                        value: Value::Null,
                        nodes: 1,
                        depth: 1,
                    },
                };
                self.slots[slot] = Expanded::Done(tree);
                continue;
            };
            match self.slots[next] {
                Expanded::Done(_) => {}
                Expanded::Open => return self.check_open(next),
                Expanded::Unvisited => {
                    let opened = self.open(next);
                    walk.push(opened);
                }
            }
        }
        Ok(())
    }

    fn open(&mut self, slot: usize) -> (usize, Vec<usize>) {
        self.slots[slot] = Expanded::Open;
        let pending = match &self.graph.shared[slot] {
            Some(target) => self.graph.refs_in(target),
            None => Vec::new(),
        };
        (slot, pending)
    }

    fn check_open(&self, slot: usize) -> Result<(), MarshalError> {
        match self.slots[slot] {
            Expanded::Open => Err(MarshalError::CyclicReference {
                index: slot as u32 + 1,
            }),
            _ => Ok(()),
        }
    }

    fn too_large(&self) -> MarshalError {
        MarshalError::MaterializeLimit {
            what: "values",
            limit: self.limit,
        }
    }

    /// Copy `value` with every reference replaced by its expanded slot.
    /// Referenced slots must already be expanded.
    fn substitute(&mut self, value: &Value) -> Result<Tree, MarshalError> {
        if let Value::Ref(r) = value {
            let done = (r.0 as usize)
                .checked_sub(1)
                .and_then(|i| self.slots.get(i));
            let Some(Expanded::Done(tree)) = done else {
                return Ok(Tree {
                    value: Value::Null,
                    nodes: 1,
                    depth: 1,
                });
            };
            if tree.nodes > self.budget {
                return Err(self.too_large());
            }
            self.budget -= tree.nodes;
            return Ok(Tree {
                value: tree.value.clone(),
                nodes: tree.nodes,
                depth: tree.depth,
            });
        }

        if self.budget == 0 {
            return Err(self.too_large());
        }
        self.budget -= 1;

        let mut out = value.clone();
        let mut nodes = 1usize;
        let mut depth = 1usize;
        for child in out.children_mut() {
            let tree = self.substitute(child)?;
            *child = tree.value;
            nodes += tree.nodes;
            depth = depth.max(tree.depth + 1);
        }
        if depth > MATERIALIZE_MAX_DEPTH {
            return Err(MarshalError::MaterializeLimit {
                what: "levels of nesting",
                limit: MATERIALIZE_MAX_DEPTH,
            });
        }
        Ok(Tree {
            value: out,
            nodes,
            depth,
        })
    }
}

impl Serialize for ObjectGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Slots<'a>(&'a ObjectGraph);

        impl Serialize for Slots<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(None)?;
                for (slot, value) in self.0.shared_values() {
                    map.serialize_entry(&slot.0, value)?;
                }
                map.end()
            }
        }

        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("root", &self.root)?;
        map.serialize_entry("shared", &Slots(self))?;
        map.end()
    }
}
