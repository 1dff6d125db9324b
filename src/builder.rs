//! Object construction hooks used by `INSTANCE`, `NEWOBJ`, `REDUCE` and the
//! iterator phases that follow them.

use crate::dbrow::{Row, RowLayout};
use crate::error::BuildError;
use crate::marshal::SharedTable;
use crate::value::{ClassHandle, ClassKind, Object, Value};
use smol_str::SmolStr;
use std::sync::Arc;

/// Builds objects for the decoder.
///
/// Arguments and states may contain [`Value::Ref`] entries; `shared` resolves
/// the finished ones.
pub trait ObjectBuilder: Send + Sync {
    /// Create a fresh instance of `class` from constructor arguments.
    fn allocate(
        &self,
        class: &ClassHandle,
        args: Vec<Value>,
        shared: &SharedTable,
    ) -> Result<Value, BuildError>;

    /// Invoke `callable(*args)`.
    fn call(&self, callable: &Value, args: Vec<Value>, shared: &SharedTable) -> Result<Value, BuildError> {
        match shared.resolve(callable) {
            Value::Class(class) => self.allocate(class, args, shared),
            other => Err(BuildError::NotCallable(other.type_name())),
        }
    }

    /// Apply a decoded state to a fresh object.
    fn apply_state(&self, target: &mut Value, state: Value, shared: &SharedTable) -> Result<(), BuildError>;

    /// List iterator phase.
    fn extend(&self, target: &mut Value, item: Value) -> Result<(), BuildError>;

    /// Dict iterator phase.
    fn insert(&self, target: &mut Value, key: Value, value: Value) -> Result<(), BuildError>;
}

// ─── DefaultBuilder ─────────────────────────────────────────────────────────

/// Builds row descriptors, rows and a few builtin containers natively and
/// everything else as a generic [`Object`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBuilder;

/// Plan a layout from a `((name, type), ...)` sequence.
pub fn layout_from_value(columns: &Value, shared: &SharedTable) -> Result<RowLayout, BuildError> {
    let invalid = |reason: &str| BuildError::InvalidArguments {
        class: SmolStr::new_static("blue.DBRowDescriptor"),
        reason: reason.to_owned(),
    };
    let columns = shared
        .resolve(columns)
        .as_seq()
        .ok_or_else(|| invalid("columns must be a sequence"))?;

    let mut specs: Vec<(SmolStr, i64)> = Vec::with_capacity(columns.len());
    for column in columns {
        let pair = shared
            .resolve(column)
            .as_seq()
            .filter(|pair| pair.len() >= 2)
            .ok_or_else(|| invalid("column must be a (name, type) pair"))?;
        let name = shared
            .resolve(&pair[0])
            .as_text()
            .ok_or_else(|| invalid("column name must be a string"))?;
        let ty = shared
            .resolve(&pair[1])
            .as_i64()
            .ok_or_else(|| invalid("column type must be an integer"))?;
        specs.push((SmolStr::new(name), ty));
    }
    Ok(RowLayout::new(specs)?)
}

fn descriptor_of(value: &Value, shared: &SharedTable) -> Result<Arc<RowLayout>, BuildError> {
    match shared.resolve(value) {
        Value::Descriptor(layout) => Ok(layout.clone()),
        other => Err(BuildError::InvalidArguments {
            class: SmolStr::new_static("blue.DBRow"),
            reason: format!("expected a row descriptor, got {}", other.type_name()),
        }),
    }
}

impl ObjectBuilder for DefaultBuilder {
    fn allocate(
        &self,
        class: &ClassHandle,
        args: Vec<Value>,
        shared: &SharedTable,
    ) -> Result<Value, BuildError> {
        match class.kind() {
            ClassKind::RowDescriptor => {
                if args.is_empty() {
                    return Ok(Value::from(Object::new(class.clone(), args)));
                }
                let layout = layout_from_value(&args[0], shared)?;
                Ok(Value::Descriptor(Arc::new(layout)))
            }
            ClassKind::Row => {
                let mut args = args.into_iter();
                let Some(descriptor) = args.next() else {
                    return Err(BuildError::InvalidArguments {
                        class: class.path().into(),
                        reason: "missing row descriptor".to_owned(),
                    });
                };
                let layout = descriptor_of(&descriptor, shared)?;
                let row = match args.next().map(|v| shared.resolve_owned(v)) {
                    Some(Value::List(values)) | Some(Value::Tuple(values)) => {
                        Row::from_values(layout, values)?
                    }
                    Some(Value::Null) | None => Row::new(layout),
                    Some(other) => {
                        return Err(BuildError::InvalidArguments {
                            class: class.path().into(),
                            reason: format!("expected a list of values, got {}", other.type_name()),
                        });
                    }
                };
                Ok(Value::from(row))
            }
            ClassKind::Builtin => Ok(match class.name() {
                "dict" => Value::Map(Default::default()),
                "list" => Value::List(
                    args.first()
                        .and_then(|a| shared.resolve(a).as_seq())
                        .map(<[Value]>::to_vec)
                        .unwrap_or_default(),
                ),
                "tuple" => Value::Tuple(
                    args.first()
                        .and_then(|a| shared.resolve(a).as_seq())
                        .map(<[Value]>::to_vec)
                        .unwrap_or_default(),
                ),
                _ => Value::from(Object::new(class.clone(), args)),
            }),
            ClassKind::Host => Ok(Value::from(Object::new(class.clone(), args))),
        }
    }

    fn apply_state(&self, target: &mut Value, state: Value, shared: &SharedTable) -> Result<(), BuildError> {
        if state.is_null() {
            return Ok(());
        }
        match target {
            Value::Row(row) => Ok(row.set_state(shared.resolve_owned(state))?),
            Value::Descriptor(_) => {
                tracing::debug!(state = state.type_name(), "ignoring row descriptor state");
                Ok(())
            }
            Value::Object(object) => {
                match shared.resolve_owned(state) {
                    Value::Map(map) => object.attributes.update(map),
                    other => object.state = Some(other),
                }
                Ok(())
            }
            Value::Map(map) => match shared.resolve_owned(state) {
                Value::Map(other) => {
                    map.update(other);
                    Ok(())
                }
                _ => Err(BuildError::Unsupported {
                    operation: "non-mapping state",
                    kind: "dict",
                }),
            },
            other => Err(BuildError::Unsupported {
                operation: "set state",
                kind: other.type_name(),
            }),
        }
    }

    fn extend(&self, target: &mut Value, item: Value) -> Result<(), BuildError> {
        match target {
            Value::Object(object) => object.items.push(item),
            Value::List(items) => items.push(item),
            other => {
                return Err(BuildError::Unsupported {
                    operation: "extend",
                    kind: other.type_name(),
                });
            }
        }
        Ok(())
    }

    fn insert(&self, target: &mut Value, key: Value, value: Value) -> Result<(), BuildError> {
        match target {
            Value::Object(object) => {
                object.entries.insert(key, value);
            }
            Value::Map(map) => {
                map.insert(key, value);
            }
            other => {
                return Err(BuildError::Unsupported {
                    operation: "insert",
                    kind: other.type_name(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbrow::layout::{DBTYPE_I4, DBTYPE_STR};

    fn columns() -> Value {
        Value::Tuple(vec![
            Value::Tuple(vec![Value::from("id"), Value::Int(DBTYPE_I4)]),
            Value::Tuple(vec![Value::Bytes(b"name".to_vec()), Value::Int(DBTYPE_STR)]),
        ])
    }

    fn empty() -> SharedTable {
        SharedTable::new(Vec::new())
    }

    #[test]
    fn test_descriptor_from_columns() {
        let class = ClassHandle::new("blue.DBRowDescriptor", ClassKind::RowDescriptor);
        let value = DefaultBuilder.allocate(&class, vec![columns()], &empty()).unwrap();
        let Value::Descriptor(layout) = value else {
            panic!("expected descriptor");
        };
        assert_eq!(layout.len(), 2);
        assert_eq!(layout.object_count(), 1);
    }

    #[test]
    fn test_descriptor_rejects_bad_columns() {
        let class = ClassHandle::new("blue.DBRowDescriptor", ClassKind::RowDescriptor);
        let bad = Value::Tuple(vec![Value::Int(1)]);
        assert!(matches!(
            DefaultBuilder.allocate(&class, vec![bad], &empty()),
            Err(BuildError::InvalidArguments { .. })
        ));
        let unknown = Value::Tuple(vec![Value::Tuple(vec![Value::from("a"), Value::Int(99)])]);
        assert!(matches!(
            DefaultBuilder.allocate(&class, vec![unknown], &empty()),
            Err(BuildError::Row(_))
        ));
    }

    #[test]
    fn test_row_from_descriptor_and_values() {
        let shared = empty();
        let desc_class = ClassHandle::new("blue.DBRowDescriptor", ClassKind::RowDescriptor);
        let descriptor = DefaultBuilder.allocate(&desc_class, vec![columns()], &shared).unwrap();
        let row_class = ClassHandle::new("blue.DBRow", ClassKind::Row);
        let row = DefaultBuilder
            .call(
                &Value::Class(row_class),
                vec![descriptor, Value::List(vec![Value::Int(7), Value::from("seven")])],
                &shared,
            )
            .unwrap();
        let row = row.as_row().unwrap();
        assert_eq!(row.get("id").unwrap(), Value::Int(7));
        assert_eq!(row.get("name").unwrap(), Value::from("seven"));
    }

    #[test]
    fn test_call_requires_class() {
        let err = DefaultBuilder.call(&Value::Int(1), vec![], &empty()).unwrap_err();
        assert_eq!(err, BuildError::NotCallable("int"));
    }

    #[test]
    fn test_mapping_state_merges_into_attributes() {
        let mut obj = Value::from(Object::new(ClassHandle::host("m.C"), vec![]));
        let state: crate::value::ValueMap =
            [(Value::from("a"), Value::Int(1))].into_iter().collect();
        DefaultBuilder.apply_state(&mut obj, Value::Map(state), &empty()).unwrap();
        DefaultBuilder.apply_state(&mut obj, Value::Int(9), &empty()).unwrap();
        let obj = obj.as_object().unwrap();
        assert_eq!(obj.attr("a"), Some(&Value::Int(1)));
        assert_eq!(obj.state, Some(Value::Int(9)));
    }

    #[test]
    fn test_iterator_phases() {
        let mut obj = Value::from(Object::new(ClassHandle::host("m.C"), vec![]));
        DefaultBuilder.extend(&mut obj, Value::Int(1)).unwrap();
        DefaultBuilder.insert(&mut obj, Value::from("k"), Value::Int(2)).unwrap();
        let o = obj.as_object().unwrap();
        assert_eq!(o.items, vec![Value::Int(1)]);
        assert_eq!(o.entries.get_str("k"), Some(&Value::Int(2)));

        let mut scalar = Value::Int(0);
        assert!(DefaultBuilder.extend(&mut scalar, Value::Null).is_err());
    }

    #[test]
    fn test_builtin_dict_and_list() {
        let dict = ClassHandle::new("__builtin__.dict", ClassKind::Builtin);
        assert_eq!(
            DefaultBuilder.allocate(&dict, vec![], &empty()).unwrap(),
            Value::Map(Default::default())
        );
        let list = ClassHandle::new("__builtin__.list", ClassKind::Builtin);
        assert_eq!(
            DefaultBuilder
                .allocate(&list, vec![Value::Tuple(vec![Value::Int(1)])], &empty())
                .unwrap(),
            Value::List(vec![Value::Int(1)])
        );
    }
}
