use chrono::{TimeZone, Utc};
use table_query_engine::operations::{
    FilterEntry, FilterOp, NameOverride, Operand, Operations, Select, Slice, SortCriterion,
    TypeOverride,
};
use table_query_engine::table::transform;
use table_query_engine::types::ColumnType;
use table_query_engine::{Table, Value};

fn n(value: f64) -> Value {
    Value::Number(value)
}

fn s(value: &str) -> Value {
    Value::Str(value.to_owned())
}

/// A small file listing, the shape a CSV source produces: every cell text,
/// types left to inference.
fn files_table() -> Table {
    Table::new(
        vec!["name".into(), "type".into(), "size".into()],
        vec![
            vec![s("notes.txt"), s("file"), s("20")],
            vec![s("src"), s("dir"), s("4096")],
            vec![s("readme.md"), s("file"), s("5")],
            vec![s("build.log"), s("file"), s("20")],
            vec![s("empty.bin"), s("file"), s("")],
        ],
    )
}

#[test]
fn a_full_pipeline_filters_sorts_slices_and_projects() {
    let operations = Operations {
        select: Select::columns(["name", "size"]),
        filter: vec![FilterEntry::new(
            FilterOp::Eq,
            vec![Operand::column("type"), Operand::literal("file")],
        )],
        sort: vec![
            SortCriterion::desc("size"),
            SortCriterion::asc("name"),
        ],
        slice: Slice {
            from: Some(0),
            to: Some(3),
        },
        names: Some(vec![NameOverride::new("size", "bytes")]),
        ..Operations::default()
    };

    let result = transform(&files_table(), &operations).unwrap();

    // Size ties at 20 break by name; the empty-string size coerces to 0 and
    // would land last, but the window cuts it off.
    assert_eq!(result.table.columns(), ["name", "bytes"]);
    assert_eq!(
        result.rows(),
        [
            vec![s("build.log"), n(20.0)],
            vec![s("notes.txt"), n(20.0)],
            vec![s("readme.md"), n(5.0)],
        ]
    );
    assert_eq!(result.schema.names(), ["name", "bytes"]);
    // The deselected column is still in the full schema, renamed alongside.
    assert_eq!(result.full_schema.names(), ["name", "type", "bytes"]);
    assert!(result.errors.is_empty());
}

#[test]
fn missing_values_sort_last_in_both_directions() {
    let table = Table::new(
        vec!["v".into(), "tag".into()],
        vec![
            vec![Value::Null, s("null")],
            vec![n(20.0), s("twenty")],
            vec![Value::nan(), s("nan")],
            vec![n(5.0), s("five")],
            vec![Value::Undefined, s("undef")],
            vec![n(10.0), s("ten")],
        ],
    );

    let ascending = Operations {
        sort: vec![SortCriterion::asc("v")],
        ..Operations::default()
    };
    let result = transform(&table, &ascending).unwrap();
    let tags: Vec<&Value> = result.rows().iter().map(|row| &row[1]).collect();
    // Defined values in order, then the missing ones in their original
    // relative order: the sort is stable.
    assert_eq!(
        tags,
        [
            &s("five"),
            &s("ten"),
            &s("twenty"),
            &s("null"),
            &s("nan"),
            &s("undef"),
        ]
    );

    let descending = Operations {
        sort: vec![SortCriterion::desc("v")],
        ..Operations::default()
    };
    let result = transform(&table, &descending).unwrap();
    let tags: Vec<&Value> = result.rows().iter().map(|row| &row[1]).collect();
    assert_eq!(
        tags,
        [
            &s("twenty"),
            &s("ten"),
            &s("five"),
            &s("null"),
            &s("nan"),
            &s("undef"),
        ]
    );
}

#[test]
fn slices_clamp_to_the_available_rows() {
    let table = files_table();

    let negative_start = Operations {
        slice: Slice {
            from: Some(-3),
            to: Some(2),
        },
        ..Operations::default()
    };
    let result = transform(&table, &negative_start).unwrap();
    assert_eq!(result.table.row_count(), 2);

    let oversized_end = Operations {
        slice: Slice {
            from: Some(3),
            to: Some(100),
        },
        ..Operations::default()
    };
    let result = transform(&table, &oversized_end).unwrap();
    assert_eq!(result.table.row_count(), 2);

    let inverted = Operations {
        slice: Slice {
            from: Some(4),
            to: Some(2),
        },
        ..Operations::default()
    };
    let result = transform(&table, &inverted).unwrap();
    assert_eq!(result.table.row_count(), 0);
}

#[test]
fn type_assertions_override_inference() {
    let table = Table::new(
        vec!["when".into(), "count".into()],
        vec![
            vec![s("2024-01-02"), s("3")],
            vec![s("2024-01-01"), s("wat")],
        ],
    );
    let operations = Operations {
        types: Some(vec![
            TypeOverride::new("when", ColumnType::Date),
            TypeOverride::new("count", ColumnType::Number),
            TypeOverride::new("absent", ColumnType::Boolean),
        ]),
        sort: vec![SortCriterion::asc("when")],
        ..Operations::default()
    };

    let result = transform(&table, &operations).unwrap();
    let when = result.schema.column("when").unwrap();
    assert_eq!(when.column_type, ColumnType::Date);
    // Inference ran first, so the original reading survives the assertion.
    assert_eq!(when.inferred, Some(ColumnType::Date));
    assert_eq!(
        result.rows()[0][0],
        Value::date(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    );
    // "wat" cannot become a number; the failure marker is NaN.
    assert!(matches!(&result.rows()[0][1], Value::Number(v) if v.is_nan()));
    assert_eq!(result.rows()[1][1], n(3.0));
    assert!(result.schema.column("absent").is_none());
}

#[test]
fn validity_filters_drop_failed_coercions() {
    let table = Table::new(
        vec!["count".into()],
        vec![vec![s("1")], vec![s("nope")], vec![s("3")]],
    );
    let operations = Operations {
        types: Some(vec![TypeOverride::new("count", ColumnType::Number)]),
        filter: vec![FilterEntry::new(
            FilterOp::IsValid,
            vec![Operand::column("count"), Operand::literal("number")],
        )],
        ..Operations::default()
    };
    let result = transform(&table, &operations).unwrap();
    assert_eq!(result.rows(), [vec![n(1.0)], vec![n(3.0)]]);
}

#[test]
fn filters_see_coerced_cells_not_source_text() {
    // Sizes arrive as text; inference makes the column numeric, so a numeric
    // comparison works without the caller coercing anything.
    let operations = Operations {
        filter: vec![FilterEntry::new(
            FilterOp::Gte,
            vec![Operand::column("size"), Operand::literal(20.0)],
        )],
        sort: vec![SortCriterion::asc("size")],
        ..Operations::default()
    };
    let result = transform(&files_table(), &operations).unwrap();
    let names: Vec<&Value> = result.rows().iter().map(|row| &row[0]).collect();
    assert_eq!(names, [&s("notes.txt"), &s("build.log"), &s("src")]);
}

#[test]
fn renames_do_not_cascade() {
    // Swapping two names must read both from the pre-rename state.
    let table = Table::new(
        vec!["a".into(), "b".into()],
        vec![vec![n(1.0), n(2.0)]],
    );
    let operations = Operations {
        names: Some(vec![
            NameOverride::new("a", "b"),
            NameOverride::new("b", "a"),
        ]),
        ..Operations::default()
    };
    let result = transform(&table, &operations).unwrap();
    assert_eq!(result.table.columns(), ["b", "a"]);
    assert_eq!(result.rows()[0], vec![n(1.0), n(2.0)]);
}
