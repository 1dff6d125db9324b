use blue_marshal::dbrow::layout::{DBTYPE_BOOL, DBTYPE_CY, DBTYPE_I4, DBTYPE_R8, DBTYPE_STR};
use blue_marshal::{Decoder, Row, RowLayout, Value, rle};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

// ─── Test Data ──────────────────────────────────────────────────────────────

const COLUMNS: &[(&str, i64)] = &[
    ("itemID", DBTYPE_I4),
    ("price", DBTYPE_CY),
    ("volume", DBTYPE_R8),
    ("singleton", DBTYPE_BOOL),
    ("name", DBTYPE_STR),
];

fn layout() -> Arc<RowLayout> {
    Arc::new(RowLayout::new(COLUMNS.iter().copied()).unwrap())
}

fn utf8(out: &mut Vec<u8>, s: &str) {
    out.push(0x2e);
    out.push(s.len() as u8);
    out.extend_from_slice(s.as_bytes());
}

fn sample_row(i: i64) -> Row {
    let mut row = Row::new(layout());
    row.set("itemID", Value::Int(i)).unwrap();
    row.set("price", Value::Float(i as f64 * 1.25)).unwrap();
    row.set("volume", Value::Float(0.5)).unwrap();
    row.set("singleton", Value::Bool(i % 2 == 0)).unwrap();
    row
}

/// A tuple of `rows` DBROWs sharing one descriptor.
///
/// Structure:
/// (
///   DBROW(REDUCE(blue.DBRowDescriptor, ((name, type), ...)), packed, name),
///   DBROW(REF 1, packed, name),
///   ...
/// )
fn make_row_stream(rows: usize) -> Vec<u8> {
    let mut body = vec![0x14, 0xff];
    body.extend_from_slice(&(rows as i32).to_le_bytes());
    for i in 0..rows {
        body.push(0x2a);
        if i == 0 {
            body.extend([0x62, 0x2c, 0x02, 20]);
            body.extend_from_slice(b"blue.DBRowDescriptor");
            body.extend([0x25, 0x14, COLUMNS.len() as u8]);
            for (name, ty) in COLUMNS {
                body.push(0x2c);
                utf8(&mut body, name);
                body.push(0x05);
                body.extend_from_slice(&(*ty as i16).to_le_bytes());
            }
            body.extend([0x2d, 0x2d]);
        } else {
            body.extend([0x1b, 1]);
        }
        let packed = sample_row(i as i64).pack();
        body.push(packed.len() as u8);
        body.extend(packed);
        utf8(&mut body, &format!("item {i}"));
    }

    let mut out = vec![0x7e];
    out.extend_from_slice(&1i32.to_le_bytes());
    out.extend(body);
    out.extend_from_slice(&1i32.to_le_bytes());
    out
}

/// Nested dicts and lists with no rows.
fn make_tree_stream(width: u8) -> Vec<u8> {
    let mut body = vec![0x16, width];
    for i in 0..width {
        body.extend([0x15, 3, 0x04]);
        body.extend_from_slice(&i32::from(i).to_le_bytes());
        body.push(0x1f);
        utf8(&mut body, "value");
        utf8(&mut body, &format!("key{i}"));
    }
    let mut out = vec![0x7e, 0, 0, 0, 0];
    out.extend(body);
    out
}

// ═══════════════════════════════════════════════════════════════════════════
// Group 1: Decoding streams
// ═══════════════════════════════════════════════════════════════════════════

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let decoder = Decoder::new();

    let rows = make_row_stream(500);
    group.bench_function("rows_500", |b| {
        b.iter(|| decoder.decode(black_box(&rows)).unwrap())
    });

    let tree = make_tree_stream(200);
    group.bench_function("dict_200", |b| {
        b.iter(|| decoder.decode(black_box(&tree)).unwrap())
    });

    let graph = decoder.decode(&rows).unwrap();
    group.bench_function("materialize_rows_500", |b| {
        b.iter(|| black_box(&graph).materialize().unwrap())
    });

    group.finish();
}

// ═══════════════════════════════════════════════════════════════════════════
// Group 2: Row access
// ═══════════════════════════════════════════════════════════════════════════

fn bench_row_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_access");
    let row = sample_row(42);

    group.bench_function("Row::get (name)", |b| {
        b.iter(|| black_box(row.get(black_box("price"))))
    });

    group.bench_function("Row::get (index)", |b| {
        b.iter(|| black_box(row.get(black_box(2usize))))
    });

    group.bench_function("Row::set", |b| {
        let mut row = row.clone();
        b.iter(|| row.set(black_box("itemID"), Value::Int(7)).unwrap())
    });

    group.finish();
}

// ═══════════════════════════════════════════════════════════════════════════
// Group 3: RLE
// ═══════════════════════════════════════════════════════════════════════════

fn bench_rle(c: &mut Criterion) {
    let mut group = c.benchmark_group("rle");
    let sparse: Vec<u8> = (0..4096).map(|i| if i % 64 == 0 { i as u8 } else { 0 }).collect();
    let packed = rle::pack(&sparse);

    group.bench_function("pack_sparse_4k", |b| b.iter(|| rle::pack(black_box(&sparse))));
    group.bench_function("unpack_sparse_4k", |b| {
        b.iter(|| rle::unpack_to_vec(black_box(&packed), sparse.len()).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_row_access, bench_rle);
criterion_main!(benches);
