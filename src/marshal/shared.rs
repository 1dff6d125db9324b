use crate::value::{SharedRef, Value};

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Vacant,
    /// Claimed by an object still under construction.
    Pending,
    Ready(Value),
}

/// The per-decode shared-object table.
///
/// Slots are claimed in encounter order, each claim taking the next entry of
/// the stream's index map. A slot can be referenced as soon as it is claimed.
#[derive(Debug, Clone)]
pub struct SharedTable {
    slots: Vec<Slot>,
    map: Vec<u32>,
    claimed: usize,
}

impl SharedTable {
    /// `map` entries must already be validated to lie in `[1, map.len()]`.
    pub(crate) fn new(map: Vec<u32>) -> Self {
        Self {
            slots: vec![Slot::Vacant; map.len()],
            map,
            claimed: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Claim the next slot, marking it pending. `None` once the map is used up.
    pub(crate) fn reserve(&mut self) -> Option<SharedRef> {
        let index = *self.map.get(self.claimed)?;
        self.claimed += 1;
        self.slots[index as usize - 1] = Slot::Pending;
        Some(SharedRef(index))
    }

    pub(crate) fn fill(&mut self, slot: SharedRef, value: Value) {
        self.slots[slot.0 as usize - 1] = Slot::Ready(value);
    }

    /// Whether a REF to `index` may be taken. Out-of-range indices are never
    /// referenceable.
    pub(crate) fn is_claimed(&self, index: i64) -> bool {
        usize::try_from(index)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| self.slots.get(i))
            .is_some_and(|slot| !matches!(slot, Slot::Vacant))
    }

    /// The finished value in a slot.
    pub fn get(&self, slot: SharedRef) -> Option<&Value> {
        match self.slots.get((slot.0 as usize).checked_sub(1)?)? {
            Slot::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// Follow `value` through finished slots. References to pending slots
    /// come back unchanged.
    pub fn resolve<'a>(&'a self, mut value: &'a Value) -> &'a Value {
        for _ in 0..=self.slots.len() {
            match value {
                Value::Ref(r) => match self.get(*r) {
                    Some(target) => value = target,
                    None => return value,
                },
                _ => return value,
            }
        }
        value
    }

    /// Owned form of [`SharedTable::resolve`].
    pub fn resolve_owned(&self, value: Value) -> Value {
        match value {
            Value::Ref(_) => self.resolve(&value).clone(),
            other => other,
        }
    }

    pub(crate) fn into_slots(self) -> Vec<Option<Value>> {
        self.slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Ready(value) => Some(value),
                Slot::Vacant | Slot::Pending => None,
            })
            .collect()
    }
}
