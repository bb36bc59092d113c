//! Parquet reading for file attachments with a local path.

use std::collections::HashMap;
use std::path::Path;

use parquet::file::reader::FileReader;
use parquet::file::serialized_reader::SerializedFileReader;
use parquet::record::Field;

use crate::error::{EngineError, EngineResult};
use crate::types::{Row, Table};
use crate::value::{date_from_millis, Value};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Reads every leaf column of a Parquet file into an untyped table. Column
/// types are left to downstream inference, which sees the values already in
/// their semantic forms.
pub(crate) fn read_parquet(path: &Path) -> EngineResult<Table> {
    let reader = SerializedFileReader::try_from(path)?;

    let columns: Vec<String> = reader
        .metadata()
        .file_metadata()
        .schema_descr()
        .columns()
        .iter()
        .map(|c| c.path().string())
        .collect();

    let mut rows: Vec<Row> = Vec::new();
    for (idx0, row_res) in reader.into_iter().enumerate() {
        let row_num = idx0 + 1;
        let row = row_res?;

        let mut by_name: HashMap<&str, &Field> = HashMap::new();
        for (name, field) in row.get_column_iter() {
            by_name.insert(name.as_str(), field);
        }

        let mut out: Row = Vec::with_capacity(columns.len());
        for column in &columns {
            out.push(match by_name.get(column.as_str()) {
                Some(field) => convert_field(row_num, column, field)?,
                None => Value::Undefined,
            });
        }
        rows.push(out);
    }

    Ok(Table::new(columns, rows))
}

fn convert_field(row: usize, column: &str, f: &Field) -> EngineResult<Value> {
    Ok(match f {
        Field::Null => Value::Null,
        Field::Bool(b) => Value::Bool(*b),
        Field::Byte(v) => Value::Number(f64::from(*v)),
        Field::Short(v) => Value::Number(f64::from(*v)),
        Field::Int(v) => Value::Number(f64::from(*v)),
        Field::Long(v) => Value::Number(*v as f64),
        Field::UByte(v) => Value::Number(f64::from(*v)),
        Field::UShort(v) => Value::Number(f64::from(*v)),
        Field::UInt(v) => Value::Number(f64::from(*v)),
        Field::ULong(v) => Value::Number(*v as f64),
        Field::Float(v) => Value::Number(f64::from(*v)),
        Field::Double(v) => Value::Number(*v),
        Field::Str(s) => Value::Str(s.clone()),
        Field::Bytes(b) => Value::Buffer(b.data().to_vec()),
        Field::Date(days) => Value::Date(date_from_millis(
            (i64::from(*days) * MILLIS_PER_DAY) as f64,
        )),
        Field::TimestampMillis(ms) => Value::Date(date_from_millis(*ms as f64)),
        Field::TimestampMicros(us) => Value::Date(date_from_millis((*us / 1_000) as f64)),
        other => {
            return Err(EngineError::ParseError {
                row,
                column: column.to_owned(),
                raw: other.to_string(),
                message: "unsupported parquet value".to_owned(),
            });
        }
    })
}
