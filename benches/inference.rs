use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use table_query_engine::coerce::coerce_row;
use table_query_engine::infer::infer_schema;
use table_query_engine::types::Table;
use table_query_engine::value::Value;

/// Text-only rows the way a CSV parse produces them: integers, names,
/// fractions, and dates all arrive as strings.
fn text_table(rows: usize) -> Table {
    let columns = vec![
        "id".to_owned(),
        "name".to_owned(),
        "score".to_owned(),
        "joined".to_owned(),
    ];
    let data = (0..rows)
        .map(|i| {
            vec![
                Value::Str(i.to_string()),
                Value::Str(format!("user-{i}")),
                Value::Str(format!("{}.5", i % 100)),
                Value::Str(format!("2024-01-{:02}", (i % 28) + 1)),
            ]
        })
        .collect();
    Table::new(columns, data)
}

fn bench_infer(c: &mut Criterion) {
    let mut group = c.benchmark_group("infer_schema");
    for rows in [100usize, 10_000] {
        let table = text_table(rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &table, |b, table| {
            b.iter(|| infer_schema(black_box(table)))
        });
    }
    group.finish();
}

fn bench_coerce(c: &mut Criterion) {
    let table = text_table(10_000);
    let schema = infer_schema(&table);
    c.bench_function("coerce_rows_10k", |b| {
        b.iter(|| {
            table
                .rows()
                .iter()
                .map(|row| coerce_row(black_box(row), &schema))
                .collect::<Result<Vec<_>, _>>()
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_infer, bench_coerce);
criterion_main!(benches);
