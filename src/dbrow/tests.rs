// ═══════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════
mod dbrow_tests {
    use crate::dbrow::layout::*;
    use crate::dbrow::{ColumnKey, Row};
    use crate::error::RowError;
    use crate::value::Value;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn mixed_specs() -> Vec<(&'static str, i64)> {
        vec![
            ("id", DBTYPE_I4),
            ("flag", DBTYPE_BOOL),
            ("name", DBTYPE_STR),
            ("price", DBTYPE_CY),
            ("qty", DBTYPE_I2),
            ("small", DBTYPE_UI1),
            ("v", DBTYPE_EMPTY),
            ("other", DBTYPE_BOOL),
        ]
    }

    fn mixed_layout() -> Arc<RowLayout> {
        Arc::new(RowLayout::new(mixed_specs()).unwrap())
    }

    fn offset_of(layout: &RowLayout, name: &str) -> usize {
        layout.find(name).unwrap().1.offset
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Layout planning
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_layout_orders_by_width() {
        let layout = mixed_layout();
        assert_eq!(offset_of(&layout, "price"), 0);
        assert_eq!(offset_of(&layout, "id"), 8);
        assert_eq!(offset_of(&layout, "qty"), 12);
        assert_eq!(offset_of(&layout, "small"), 14);
    }

    #[test]
    fn test_layout_bits_follow_scalars() {
        let layout = mixed_layout();
        assert_eq!(offset_of(&layout, "flag"), 15 * 8);
        assert_eq!(offset_of(&layout, "other"), 15 * 8 + 1);
        // 120 bits of scalars, 2 booleans, 8 reserved bits
        assert_eq!(layout.unpacked_size(), 17);
    }

    #[test]
    fn test_layout_object_slots() {
        let layout = mixed_layout();
        let base = 17usize.div_ceil(SLOT_WIDTH) * SLOT_WIDTH;
        assert_eq!(layout.object_count(), 1);
        assert_eq!(offset_of(&layout, "name"), base);
        assert_eq!(layout.total_size(), base + SLOT_WIDTH);
    }

    #[test]
    fn test_layout_virtual_column() {
        let layout = mixed_layout();
        let (_, v) = layout.find("v").unwrap();
        assert_eq!(v.size, SizeClass::Virtual);
        assert_eq!(v.offset, 0);
    }

    #[test]
    fn test_layout_is_deterministic() {
        let a = RowLayout::new(mixed_specs()).unwrap();
        let b = build_layout(mixed_specs()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_layout_without_objects() {
        let layout = RowLayout::new([("a", DBTYPE_I8), ("b", DBTYPE_UI2)]).unwrap();
        assert_eq!(layout.object_count(), 0);
        assert_eq!(layout.total_size(), layout.unpacked_size());
        // 10 bytes plus two reserved bits
        assert_eq!(layout.unpacked_size(), 11);
    }

    #[test]
    fn test_layout_empty() {
        let layout = RowLayout::new(Vec::<(&str, i64)>::new()).unwrap();
        assert!(layout.is_empty());
        assert_eq!(layout.unpacked_size(), 0);
        assert_eq!(layout.total_size(), 0);
    }

    #[test]
    fn test_layout_bool_only() {
        let layout = RowLayout::new([("a", DBTYPE_BOOL), ("b", DBTYPE_BOOL), ("c", DBTYPE_BOOL)])
            .unwrap();
        assert_eq!(offset_of(&layout, "c"), 2);
        assert_eq!(layout.unpacked_size(), 1);
    }

    #[test]
    fn test_layout_rejects_unknown_type() {
        let err = RowLayout::new([("a", 99)]).unwrap_err();
        assert_eq!(err, RowError::UnsupportedColumnType(99));
    }

    #[test]
    fn test_layout_rejects_duplicate_names() {
        let err = RowLayout::new([("a", DBTYPE_I4), ("a", DBTYPE_I8)]).unwrap_err();
        assert!(matches!(err, RowError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_layout_specs_roundtrip() {
        let layout = mixed_layout();
        let again = RowLayout::new(layout.specs()).unwrap();
        assert_eq!(*layout, again);
    }

    #[test]
    fn test_column_type_codes() {
        for code in [0, 2, 3, 4, 5, 6, 11, 16, 17, 18, 19, 20, 21, 64, 128, 129, 130, 135] {
            assert_eq!(ColumnType::from_code(code).unwrap().code(), code);
        }
        assert!(ColumnType::from_code(1).is_err());
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Get / set
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_new_row_reads_defaults() {
        let row = Row::new(mixed_layout());
        assert_eq!(row.get("id").unwrap(), Value::Int(0));
        assert_eq!(row.get("flag").unwrap(), Value::Bool(false));
        assert_eq!(row.get("name").unwrap(), Value::Null);
        assert_eq!(row.get("price").unwrap(), Value::Float(0.0));
        assert_eq!(row.get("v").unwrap(), Value::Null);
    }

    #[test]
    fn test_set_and_get_every_kind() {
        let mut row = Row::new(mixed_layout());
        assert_eq!(row.set("id", Value::Int(-70000)).unwrap(), None);
        row.set("flag", Value::Bool(true)).unwrap();
        row.set("name", Value::from("widget")).unwrap();
        row.set("price", Value::Float(12.5)).unwrap();
        row.set("qty", Value::Int(-3)).unwrap();
        row.set("small", Value::Int(200)).unwrap();

        assert_eq!(row.get_i64("id"), Some(-70000));
        assert_eq!(row.get_bool("flag"), Some(true));
        assert_eq!(row.get_bool("other"), Some(false));
        assert_eq!(row.get("name").unwrap(), Value::from("widget"));
        assert_eq!(row.get_f64("price"), Some(12.5));
        assert_eq!(row.get_i64("qty"), Some(-3));
        assert_eq!(row.get_i64("small"), Some(200));
    }

    #[test]
    fn test_currency_is_scaled_integer() {
        let mut row = Row::new(mixed_layout());
        row.set("price", Value::Float(12.5)).unwrap();
        let raw = i64::from_le_bytes(row.data()[0..8].try_into().unwrap());
        assert_eq!(raw, 125_000);

        let lossy = row.set("price", Value::Float(0.000_01)).unwrap();
        assert!(lossy.is_some());
        assert_eq!(row.get_f64("price"), Some(0.0));
    }

    #[test]
    fn test_integer_truncation_is_reported() {
        let layout = Arc::new(
            RowLayout::new([("a", DBTYPE_I1), ("b", DBTYPE_UI1), ("c", DBTYPE_UI4)]).unwrap(),
        );
        let mut row = Row::new(layout);

        let t = row.set("a", Value::Int(300)).unwrap().unwrap();
        assert_eq!(t.column, "a");
        assert_eq!(t.target, "int8");
        assert_eq!(row.get_i64("a"), Some(44));

        assert!(row.set("b", Value::Int(-1)).unwrap().is_some());
        assert_eq!(row.get_i64("b"), Some(255));

        assert!(row.set("c", Value::Int(u32::MAX as i64)).unwrap().is_none());
        assert_eq!(row.get_i64("c"), Some(u32::MAX as i64));
    }

    #[test]
    fn test_float_into_integer_column_truncates_silently() {
        let layout = Arc::new(RowLayout::new([("a", DBTYPE_I4)]).unwrap());
        let mut row = Row::new(layout);
        assert_eq!(row.set("a", Value::Float(7.9)).unwrap(), None);
        assert_eq!(row.get_i64("a"), Some(7));
    }

    #[test]
    fn test_single_precision_loss() {
        let layout = Arc::new(RowLayout::new([("f", DBTYPE_R4), ("d", DBTYPE_R8)]).unwrap());
        let mut row = Row::new(layout);
        assert!(row.set("f", Value::Float(0.1)).unwrap().is_some());
        assert!(row.set("f", Value::Float(0.5)).unwrap().is_none());
        assert_eq!(row.get_f64("f"), Some(0.5));
        assert!(row.set("d", Value::Float(0.1)).unwrap().is_none());
        assert_eq!(row.get_f64("d"), Some(0.1));
    }

    #[test]
    fn test_unsigned_64_bit_above_signed_range() {
        let layout = Arc::new(RowLayout::new([("t", DBTYPE_FILETIME)]).unwrap());
        let mut row = Row::new(layout);
        row.set("t", Value::from(u64::MAX)).unwrap();
        assert_eq!(row.get("t").unwrap().as_u64(), Some(u64::MAX));
    }

    #[test]
    fn test_bool_bits_are_independent() {
        let mut row = Row::new(mixed_layout());
        row.set("flag", Value::Int(5)).unwrap();
        row.set("other", Value::from("yes")).unwrap();
        row.set("flag", Value::Null).unwrap();
        assert_eq!(row.get_bool("flag"), Some(false));
        assert_eq!(row.get_bool("other"), Some(true));
    }

    #[test]
    fn test_set_wrong_type() {
        let mut row = Row::new(mixed_layout());
        let err = row.set("id", Value::from("nope")).unwrap_err();
        assert!(matches!(err, RowError::TypeMismatch { .. }));
    }

    #[test]
    fn test_virtual_column_cannot_be_set() {
        let mut row = Row::new(mixed_layout());
        assert!(matches!(
            row.set("v", Value::Int(1)),
            Err(RowError::VirtualColumn(_))
        ));
    }

    #[test]
    fn test_column_addressing() {
        let mut row = Row::new(mixed_layout());
        row.set(0usize, Value::Int(9)).unwrap();
        assert_eq!(row.get("id").unwrap(), Value::Int(9));
        assert_eq!(row.get(ColumnKey::Index(0)).unwrap(), Value::Int(9));
        assert!(matches!(
            row.get(99usize),
            Err(RowError::IndexOutOfRange { index: 99, count: 8 })
        ));
        assert!(matches!(row.get("missing"), Err(RowError::ColumnNotFound(_))));
    }

    #[test]
    fn test_columns_of_a_wider_layout_are_rejected() {
        let small = Arc::new(RowLayout::new([("id", DBTYPE_I4)]).unwrap());
        let mut row = Row::new(small);
        // every column after `id` belongs to the wider layout only
        for (index, column) in mixed_layout().columns().iter().enumerate().skip(1) {
            assert!(matches!(
                row.get(index),
                Err(RowError::IndexOutOfRange { count: 1, .. })
            ));
            assert!(row.set(index, Value::Int(1)).is_err());
            assert!(matches!(
                row.get(column.name.as_str()),
                Err(RowError::ColumnNotFound(_))
            ));
        }
    }

    #[test]
    fn test_keys_in_column_order() {
        let row = Row::new(mixed_layout());
        let keys: Vec<&str> = row.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["id", "flag", "name", "price", "qty", "small", "v", "other"]);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Object table
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_append_until_full() {
        let mut row = Row::new(mixed_layout());
        row.append(Value::from("first")).unwrap();
        assert_eq!(row.object(0).unwrap(), &Value::from("first"));
        assert_eq!(row.get("name").unwrap(), Value::from("first"));
        assert_eq!(
            row.append(Value::from("second")),
            Err(RowError::ObjectTableFull { capacity: 1 })
        );
    }

    #[test]
    fn test_object_index_past_appended() {
        let row = Row::new(mixed_layout());
        assert!(matches!(
            row.object(0),
            Err(RowError::IndexOutOfRange { index: 0, count: 0 })
        ));
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Packed form
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_pack_then_rebuild() {
        let layout = mixed_layout();
        let mut row = Row::new(layout.clone());
        row.set("id", Value::Int(42)).unwrap();
        row.set("other", Value::Bool(true)).unwrap();
        row.set("price", Value::Float(-3.25)).unwrap();
        row.set("name", Value::from("n")).unwrap();

        let packed = row.pack();
        let rebuilt = Row::from_packed(layout, &packed, [Value::from("n")]).unwrap();
        assert_eq!(rebuilt.data(), row.data());
        for (name, value) in row.iter() {
            assert_eq!(rebuilt.get(name.as_str()).unwrap(), value, "{name}");
        }
    }

    #[test]
    fn test_from_packed_too_many_objects() {
        let err = Row::from_packed(mixed_layout(), &[], [Value::Null, Value::Null]).unwrap_err();
        assert!(matches!(err, RowError::ObjectTableFull { .. }));
    }

    #[test]
    fn test_from_packed_overflowing_rle() {
        let layout = Arc::new(RowLayout::new([("a", DBTYPE_I1)]).unwrap());
        let err = Row::from_packed(layout, &[0xff], Vec::new()).unwrap_err();
        assert!(matches!(err, RowError::TruncatedRle { .. }));
    }

    #[test]
    fn test_from_values() {
        let values = vec![
            Value::Int(1),
            Value::Bool(true),
            Value::from("x"),
            Value::Float(2.5),
            Value::Int(3),
            Value::Int(4),
            Value::Null,
            Value::Bool(false),
        ];
        let row = Row::from_values(mixed_layout(), values).unwrap();
        assert_eq!(row.appended(), 1);
        assert_eq!(row.object(0).unwrap(), &Value::from("x"));
        assert_eq!(row.get_f64("price"), Some(2.5));

        let short = Row::from_values(mixed_layout(), vec![Value::Int(1)]);
        assert!(matches!(short, Err(RowError::InvalidDescriptor(_))));
    }

    #[test]
    fn test_set_state_variants() {
        let layout = mixed_layout();
        let mut source = Row::new(layout.clone());
        source.set("id", Value::Int(77)).unwrap();
        let packed = source.pack();

        let mut row = Row::new(layout.clone());
        row.set_state(Value::Tuple(vec![
            Value::Bytes(packed.clone()),
            Value::List(vec![Value::from("s")]),
        ]))
        .unwrap();
        assert_eq!(row.get_i64("id"), Some(77));
        assert_eq!(row.get("name").unwrap(), Value::from("s"));

        let mut bytes_only = Row::new(layout.clone());
        bytes_only.set_state(Value::Bytes(packed)).unwrap();
        assert_eq!(bytes_only.get_i64("id"), Some(77));
        assert_eq!(bytes_only.appended(), 0);

        let mut list_only = Row::new(layout.clone());
        list_only.set_state(Value::List(vec![Value::from("t")])).unwrap();
        assert_eq!(list_only.get("name").unwrap(), Value::from("t"));

        let mut bad = Row::new(layout);
        assert!(matches!(
            bad.set_state(Value::Int(1)),
            Err(RowError::InvalidState(_))
        ));
    }

    fn column_value(ty: ColumnType) -> BoxedStrategy<Value> {
        match ty {
            ColumnType::I1 => any::<i8>().prop_map(|v| Value::Int(v.into())).boxed(),
            ColumnType::UI1 => any::<u8>().prop_map(|v| Value::Int(v.into())).boxed(),
            ColumnType::I2 => any::<i16>().prop_map(|v| Value::Int(v.into())).boxed(),
            ColumnType::UI2 => any::<u16>().prop_map(|v| Value::Int(v.into())).boxed(),
            ColumnType::I4 => any::<i32>().prop_map(|v| Value::Int(v.into())).boxed(),
            ColumnType::UI4 => any::<u32>().prop_map(|v| Value::Int(v.into())).boxed(),
            ColumnType::I8 => any::<i64>().prop_map(Value::Int).boxed(),
            ColumnType::UI8 | ColumnType::FileTime | ColumnType::Timestamp => {
                any::<u64>().prop_map(Value::from).boxed()
            }
            ColumnType::R4 => any::<i16>().prop_map(|v| Value::Float(f64::from(v) / 4.0)).boxed(),
            ColumnType::R8 => (-1.0e12f64..1.0e12).prop_map(Value::Float).boxed(),
            ColumnType::Currency => any::<i32>()
                .prop_map(|v| Value::Float(f64::from(v) / 10000.0))
                .boxed(),
            ColumnType::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
            ColumnType::Bytes | ColumnType::Str | ColumnType::WStr => {
                "[a-z]{0,8}".prop_map(|s| Value::from(s.as_str())).boxed()
            }
            ColumnType::Empty => Just(Value::Null).boxed(),
        }
    }

    fn row_case() -> impl Strategy<Value = (Arc<RowLayout>, Vec<Value>)> {
        let codes = [
            DBTYPE_I1, DBTYPE_UI1, DBTYPE_I2, DBTYPE_UI2, DBTYPE_I4, DBTYPE_UI4, DBTYPE_I8,
            DBTYPE_UI8, DBTYPE_R4, DBTYPE_R8, DBTYPE_CY, DBTYPE_BOOL, DBTYPE_FILETIME,
            DBTYPE_STR, DBTYPE_WSTR, DBTYPE_BYTES, DBTYPE_EMPTY,
        ];
        proptest::collection::vec(proptest::sample::select(codes.to_vec()), 0..24).prop_flat_map(
            |types| {
                let layout = Arc::new(
                    RowLayout::new(types.iter().enumerate().map(|(i, &t)| (format!("c{i}"), t)))
                        .unwrap(),
                );
                let values: Vec<_> = layout.columns().iter().map(|c| column_value(c.ty)).collect();
                (Just(layout), values)
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_row_pack_roundtrip((layout, values) in row_case()) {
            let row = Row::from_values(layout.clone(), values.clone()).unwrap();
            let objects: Vec<Value> = (0..row.appended())
                .map(|i| row.object(i).unwrap().clone())
                .collect();
            let rebuilt = Row::from_packed(layout.clone(), &row.pack(), objects).unwrap();

            for (column, expected) in layout.columns().iter().zip(values) {
                let got = rebuilt.get_column(column);
                prop_assert_eq!(got, expected, "column {}", column.name);
            }
        }
    }
}
