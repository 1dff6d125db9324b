use crate::dbrow::{Row, RowLayout};
use num_bigint::BigInt;
use rustc_hash::FxHashMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use smol_str::SmolStr;
use std::sync::Arc;

pub type FastMap<K, V> = FxHashMap<K, V>;

// ─── ClassHandle ────────────────────────────────────────────────────────────

/// What a resolved global name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    /// `blue.DBRowDescriptor`
    RowDescriptor,
    /// `blue.DBRow`
    Row,
    /// A builtin type such as `__builtin__.set`.
    Builtin,
    /// Anything handed out by a host namespace or fallback resolver.
    Host,
}

/// A resolved global: dotted path plus what kind of constructor it is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassHandle {
    path: SmolStr,
    kind: ClassKind,
}

impl ClassHandle {
    pub fn new(path: impl Into<SmolStr>, kind: ClassKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn host(path: impl Into<SmolStr>) -> Self {
        Self::new(path, ClassKind::Host)
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    /// Module part of the path, `None` for bare names.
    pub fn module(&self) -> Option<&str> {
        self.path.rsplit_once('.').map(|(m, _)| m)
    }

    pub fn name(&self) -> &str {
        self.path.rsplit_once('.').map_or(self.path.as_str(), |(_, n)| n)
    }
}

// ─── SharedRef ──────────────────────────────────────────────────────────────

/// Index of a slot in the shared-object table, 1-based as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SharedRef(pub u32);

impl SharedRef {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

// ─── Object ─────────────────────────────────────────────────────────────────

/// A generic reconstructed instance.
///
/// `state` holds a non-mapping state argument, mapping states are merged
/// into `attributes`. `items` and `entries` collect the list and dict
/// iterator phases of a NEWOBJ or REDUCE construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub class: ClassHandle,
    pub args: Vec<Value>,
    pub state: Option<Value>,
    pub attributes: ValueMap,
    pub items: Vec<Value>,
    pub entries: ValueMap,
}

impl Object {
    pub fn new(class: ClassHandle, args: Vec<Value>) -> Self {
        Self {
            class,
            args,
            state: None,
            attributes: ValueMap::new(),
            items: Vec::new(),
            entries: ValueMap::new(),
        }
    }

    /// Look up an attribute set through a mapping state.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attributes.get(&Value::from(name))
    }
}

// ─── MapKey ─────────────────────────────────────────────────────────────────

/// Hashable projection of a [`Value`] used to index a [`ValueMap`].
///
/// Numerically equal keys collapse: `True`, `1` and `1.0` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Null,
    Int(i64),
    BigInt(BigInt),
    Float(u64),
    Bytes(Vec<u8>),
    Str(SmolStr),
    Tuple(Vec<MapKey>),
    Class(SmolStr),
    Ref(u32),
}

impl MapKey {
    /// `None` for values that cannot key a map (lists, maps, rows, objects).
    pub fn from_value(value: &Value) -> Option<MapKey> {
        Some(match value {
            Value::Null => MapKey::Null,
            Value::Bool(b) => MapKey::Int(i64::from(*b)),
            Value::Int(i) => MapKey::Int(*i),
            Value::BigInt(b) => match i64::try_from(b) {
                Ok(i) => MapKey::Int(i),
                Err(_) => MapKey::BigInt(b.clone()),
            },
            Value::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                    MapKey::Int(*f as i64)
                } else {
                    MapKey::Float(f.to_bits())
                }
            }
            Value::Bytes(b) => MapKey::Bytes(b.clone()),
            Value::Str(s) => MapKey::Str(s.clone()),
            Value::Tuple(items) => {
                MapKey::Tuple(items.iter().map(MapKey::from_value).collect::<Option<_>>()?)
            }
            Value::Class(c) => MapKey::Class(c.path.clone()),
            Value::Descriptor(_) => return None,
            Value::Ref(r) => MapKey::Ref(r.0),
            Value::List(_) | Value::Map(_) | Value::Row(_) | Value::Object(_) => return None,
        })
    }
}

// ─── ValueMap ───────────────────────────────────────────────────────────────

/// Insertion-ordered map with arbitrary [`Value`] keys.
///
/// Hashable keys are deduplicated through an index. Unhashable keys are
/// appended as-is and can only be reached by iteration.
#[derive(Debug, Clone, Default)]
pub struct ValueMap {
    entries: Vec<(Value, Value)>,
    index: FastMap<MapKey, usize>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: FastMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    /// Insert, returning the previous value under an equal key.
    pub fn insert(&mut self, key: Value, value: Value) -> Option<Value> {
        match MapKey::from_value(&key) {
            Some(hashed) => {
                if let Some(&pos) = self.index.get(&hashed) {
                    return Some(std::mem::replace(&mut self.entries[pos].1, value));
                }
                self.index.insert(hashed, self.entries.len());
                self.entries.push((key, value));
                None
            }
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        let hashed = MapKey::from_value(key)?;
        self.index.get(&hashed).map(|&pos| &self.entries[pos].1)
    }

    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.index
            .get(&MapKey::Str(SmolStr::new(key)))
            .map(|&pos| &self.entries[pos].1)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.entries.iter_mut().map(|(_, v)| v)
    }

    /// Merge every entry of `other` into `self`, later keys winning.
    pub fn update(&mut self, other: ValueMap) {
        for (k, v) in other.entries {
            self.insert(k, v);
        }
    }
}

impl PartialEq for ValueMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl IntoIterator for ValueMap {
    type Item = (Value, Value);
    type IntoIter = std::vec::IntoIter<(Value, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(Value, Value)> for ValueMap {
    fn from_iter<T: IntoIterator<Item = (Value, Value)>>(iter: T) -> Self {
        let mut map = ValueMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

// ─── Value ──────────────────────────────────────────────────────────────────

/// A decoded value.
///
/// Values marked shared on the wire live in the decoder's shared table and
/// appear in the graph as [`Value::Ref`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    BigInt(BigInt),
    Float(f64),
    Bytes(Vec<u8>),
    Str(SmolStr),
    Tuple(Vec<Value>),
    List(Vec<Value>),
    Map(ValueMap),
    Row(Box<Row>),
    Descriptor(Arc<RowLayout>),
    Class(ClassHandle),
    Object(Box<Object>),
    Ref(SharedRef),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::BigInt(_) => "long",
            Value::Float(_) => "float",
            Value::Bytes(_) => "bytes",
            Value::Str(_) => "str",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
            Value::Row(_) => "row",
            Value::Descriptor(_) => "row descriptor",
            Value::Class(_) => "class",
            Value::Object(_) => "object",
            Value::Ref(_) => "shared reference",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness in the sense of the source object model.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::BigInt(b) => *b != BigInt::from(0),
            Value::Float(f) => *f != 0.0,
            Value::Bytes(b) => !b.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::Tuple(v) | Value::List(v) => !v.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Row(_)
            | Value::Descriptor(_)
            | Value::Class(_)
            | Value::Object(_)
            | Value::Ref(_) => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::BigInt(b) => i64::try_from(b).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(i) => u64::try_from(*i).ok(),
            Value::BigInt(b) => u64::try_from(b).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            Value::BigInt(b) => i128::try_from(b).ok().map(|i| i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Text from either a string or UTF-8 bytes.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Elements of a tuple or list.
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(v) | Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_row(&self) -> Option<&Row> {
        match self {
            Value::Row(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassHandle> {
        match self {
            Value::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_ref_index(&self) -> Option<SharedRef> {
        match self {
            Value::Ref(r) => Some(*r),
            _ => None,
        }
    }

    /// Map lookup by string key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?.get_str(key)
    }

    /// Direct child values. Map keys are not children.
    pub(crate) fn children(&self) -> Vec<&Value> {
        match self {
            Value::Tuple(v) | Value::List(v) => v.iter().collect(),
            Value::Map(m) => m.values().collect(),
            Value::Object(o) => o
                .args
                .iter()
                .chain(o.state.iter())
                .chain(o.attributes.values())
                .chain(o.items.iter())
                .chain(o.entries.values())
                .collect(),
            Value::Row(r) => r.objects().iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Visit every direct child value.
    pub(crate) fn children_mut(&mut self) -> Vec<&mut Value> {
        match self {
            Value::Tuple(v) | Value::List(v) => v.iter_mut().collect(),
            Value::Map(m) => m.values_mut().collect(),
            Value::Object(o) => {
                let Object {
                    args,
                    state,
                    attributes,
                    items,
                    entries,
                    ..
                } = o.as_mut();
                args.iter_mut()
                    .chain(state.iter_mut())
                    .chain(attributes.values_mut())
                    .chain(items.iter_mut())
                    .chain(entries.values_mut())
                    .collect()
            }
            Value::Row(r) => r.objects_mut().iter_mut().collect(),
            _ => Vec::new(),
        }
    }
}

// ─── Serialize ──────────────────────────────────────────────────────────────

/// String form of a map key, for formats that only allow string keys.
fn key_label(key: &Value) -> String {
    match key {
        Value::Str(s) => s.to_string(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        Value::Int(i) => i.to_string(),
        Value::BigInt(b) => b.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => (if *b { "True" } else { "False" }).to_owned(),
        Value::Null => "None".to_owned(),
        Value::Class(c) => c.path().to_owned(),
        Value::Ref(r) => format!("#{}", r.0),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.type_name().to_owned()),
    }
}

struct Pairs<'a, I>(&'a [(I, Value)]);

impl<I: AsRef<str>> Serialize for Pairs<'_, I> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut m = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in self.0 {
            m.serialize_entry(k.as_ref(), v)?;
        }
        m.end()
    }
}

impl Serialize for ValueMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut m = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            m.serialize_entry(&key_label(k), v)?;
        }
        m.end()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::BigInt(b) => match i128::try_from(b) {
                Ok(i) => serializer.serialize_i128(i),
                Err(_) => serializer.serialize_str(&b.to_string()),
            },
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => serializer.serialize_str(s),
                Err(_) => serializer.serialize_bytes(b),
            },
            Value::Str(s) => serializer.serialize_str(s.as_str()),
            Value::Tuple(items) | Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for v in items {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Value::Map(map) => map.serialize(serializer),
            Value::Row(row) => {
                let mut m = serializer.serialize_map(Some(row.layout().len()))?;
                for (name, value) in row.iter() {
                    m.serialize_entry(name.as_str(), &value)?;
                }
                m.end()
            }
            Value::Descriptor(layout) => {
                let columns: Vec<(SmolStr, Value)> = layout
                    .columns()
                    .iter()
                    .map(|c| (c.name.clone(), Value::from(c.ty.name())))
                    .collect();
                let mut m = serializer.serialize_map(Some(1))?;
                m.serialize_entry("descriptor", &Pairs(&columns))?;
                m.end()
            }
            Value::Class(c) => {
                let mut m = serializer.serialize_map(Some(1))?;
                m.serialize_entry("class", c.path())?;
                m.end()
            }
            Value::Object(o) => {
                let mut m = serializer.serialize_map(None)?;
                m.serialize_entry("class", o.class.path())?;
                if !o.args.is_empty() {
                    m.serialize_entry("args", &o.args)?;
                }
                if let Some(state) = &o.state {
                    m.serialize_entry("state", state)?;
                }
                if !o.attributes.is_empty() {
                    m.serialize_entry("attributes", &o.attributes)?;
                }
                if !o.items.is_empty() {
                    m.serialize_entry("items", &o.items)?;
                }
                if !o.entries.is_empty() {
                    m.serialize_entry("entries", &o.entries)?;
                }
                m.end()
            }
            Value::Ref(r) => {
                let mut m = serializer.serialize_map(Some(1))?;
                m.serialize_entry("ref", &r.0)?;
                m.end()
            }
        }
    }
}

// ─── From impls ─────────────────────────────────────────────────────────────

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        match i64::try_from(n) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::BigInt(BigInt::from(n)),
        }
    }
}

impl From<BigInt> for Value {
    fn from(n: BigInt) -> Self {
        match i64::try_from(&n) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::BigInt(n),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(SmolStr::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(SmolStr::from(s))
    }
}

impl From<SmolStr> for Value {
    fn from(s: SmolStr) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Row> for Value {
    fn from(r: Row) -> Self {
        Value::Row(Box::new(r))
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(Box::new(o))
    }
}

impl From<ClassHandle> for Value {
    fn from(c: ClassHandle) -> Self {
        Value::Class(c)
    }
}

impl From<ValueMap> for Value {
    fn from(m: ValueMap) -> Self {
        Value::Map(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_keys_collapse() {
        let mut map = ValueMap::new();
        map.insert(Value::Int(1), Value::from("int"));
        let prev = map.insert(Value::Bool(true), Value::from("bool"));
        assert_eq!(prev, Some(Value::from("int")));
        map.insert(Value::Float(1.0), Value::from("float"));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&Value::Int(1)), Some(&Value::from("float")));
    }

    #[test]
    fn test_map_keeps_insertion_order() {
        let map: ValueMap = [("b", 2i64), ("a", 1), ("c", 3)]
            .into_iter()
            .map(|(k, v)| (Value::from(k), Value::from(v)))
            .collect();
        let keys: Vec<_> = map.keys().filter_map(Value::as_str).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_unhashable_keys_are_appended() {
        let mut map = ValueMap::new();
        map.insert(Value::List(vec![]), Value::Int(1));
        map.insert(Value::List(vec![]), Value::Int(2));
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&Value::List(vec![])), None);
    }

    #[test]
    fn test_tuple_keys_hash() {
        let key = Value::Tuple(vec![Value::from("a"), Value::Int(7)]);
        let mut map = ValueMap::new();
        map.insert(key.clone(), Value::Null);
        assert!(map.contains_key(&key));
        let nested = Value::Tuple(vec![Value::List(vec![])]);
        assert!(MapKey::from_value(&nested).is_none());
    }

    #[test]
    fn test_u64_above_i64_is_bigint() {
        assert_eq!(Value::from(5u64), Value::Int(5));
        let big = Value::from(u64::MAX);
        assert!(matches!(big, Value::BigInt(_)));
        assert_eq!(big.as_u64(), Some(u64::MAX));
        assert_eq!(big.as_i64(), None);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::Float(0.5).is_truthy());
        assert!(Value::Tuple(vec![Value::Null]).is_truthy());
    }

    #[test]
    fn test_class_handle_parts() {
        let c = ClassHandle::host("foo.bar.Baz");
        assert_eq!(c.module(), Some("foo.bar"));
        assert_eq!(c.name(), "Baz");
        let bare = ClassHandle::new("set", ClassKind::Builtin);
        assert_eq!(bare.module(), None);
        assert_eq!(bare.name(), "set");
    }

    #[test]
    fn test_serialize_to_json() {
        let mut map = ValueMap::new();
        map.insert(Value::Int(3), Value::Tuple(vec![Value::Bool(true), Value::Null]));
        map.insert(Value::from("s"), Value::Bytes(b"hi".to_vec()));
        let json = serde_json::to_string(&Value::Map(map)).unwrap();
        assert_eq!(json, r#"{"3":[true,null],"s":"hi"}"#);

        let obj = Object::new(ClassHandle::host("m.C"), vec![Value::Int(1)]);
        let json = serde_json::to_string(&Value::from(obj)).unwrap();
        assert_eq!(json, r#"{"class":"m.C","args":[1]}"#);
        assert_eq!(serde_json::to_string(&Value::Ref(SharedRef(2))).unwrap(), r#"{"ref":2}"#);
    }
}
