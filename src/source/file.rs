//! Local file attachments and the text-format parsers behind the
//! [`FileAttachment`] helpers.

use std::fs;
use std::path::{Path, PathBuf};

use crate::coerce::coerce_row;
use crate::error::{EngineError, EngineResult};
use crate::infer::infer_schema;
use crate::source::{CsvOptions, CsvTyping, FileAttachment};
use crate::types::{Row, Table};
use crate::value::Value;

/// A file on the local filesystem, named after its base name with the
/// MIME type read off the extension.
#[derive(Debug, Clone)]
pub struct LocalFileAttachment {
    path: PathBuf,
    name: String,
    mime_type: String,
}

impl LocalFileAttachment {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_owned();
        let mime_type = mime_type_for_name(&name).to_owned();
        Self {
            path,
            name,
            mime_type,
        }
    }

    /// Overrides the MIME type read from the extension.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}

impl FileAttachment for LocalFileAttachment {
    fn name(&self) -> &str {
        &self.name
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn local_path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn text(&self) -> EngineResult<String> {
        Ok(fs::read_to_string(&self.path)?)
    }

    fn bytes(&self) -> EngineResult<Vec<u8>> {
        Ok(fs::read(&self.path)?)
    }
}

fn mime_type_for_name(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "json" | "ndjson" => "application/json",
        "db" | "sqlite" | "sqlite3" => "application/x-sqlite3",
        "parquet" => "application/vnd.apache.parquet",
        "arrow" => "application/vnd.apache.arrow.file",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Parses delimiter-separated text. Cells come out as strings; with
/// [`CsvTyping::Auto`] the table then goes through schema inference and
/// coercion.
///
/// Rows shorter than the header are padded with undefined cells; extra
/// cells are dropped.
pub(crate) fn parse_csv(text: &str, delimiter: u8, options: CsvOptions) -> EngineResult<Table> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = rdr.headers()?.clone();
    let columns: Vec<String> = headers.iter().map(|h| h.to_owned()).collect();

    let mut rows: Vec<Row> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let mut row: Row = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            row.push(match record.get(idx) {
                Some(cell) => Value::Str(cell.to_owned()),
                None => Value::Undefined,
            });
        }
        rows.push(row);
    }

    let mut table = Table::new(columns, rows);
    if options.typed == CsvTyping::Auto {
        let schema = infer_schema(&table);
        let rows = table
            .rows()
            .iter()
            .map(|row| coerce_row(row, &schema))
            .collect::<EngineResult<Vec<Row>>>()?;
        table = Table::with_schema(schema, rows);
    }
    Ok(table)
}

/// Parses JSON text into a table. The document must be an array; when it is
/// not valid JSON at all, each non-blank line is tried as its own object
/// (newline-delimited JSON).
pub(crate) fn parse_json(text: &str) -> EngineResult<Table> {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(text) {
        return match json {
            serde_json::Value::Array(items) => {
                Table::from_value_rows(items.iter().map(Value::from_json).collect())
            }
            _ => Err(EngineError::InvalidDataSource),
        };
    }

    let mut values = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let json: serde_json::Value = serde_json::from_str(line)?;
        values.push(Value::from_json(&json));
    }
    Table::from_value_rows(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;

    #[test]
    fn untyped_csv_keeps_strings_and_pads_short_rows() {
        let table = parse_csv("a,b\n1,x\n2\n", b',', CsvOptions::default()).unwrap();
        assert_eq!(table.columns(), ["a", "b"]);
        assert_eq!(table.rows()[0], vec![Value::from("1"), Value::from("x")]);
        assert_eq!(table.rows()[1], vec![Value::from("2"), Value::Undefined]);
        assert!(table.schema().is_none());
    }

    #[test]
    fn auto_typed_csv_is_inferred_and_coerced() {
        let table = parse_csv(
            "id,when\n1,2001-02-03\n2,2004-05-06\n",
            b',',
            CsvOptions {
                typed: CsvTyping::Auto,
            },
        )
        .unwrap();
        let schema = table.schema().unwrap();
        assert_eq!(schema.column("id").unwrap().column_type, ColumnType::Integer);
        assert_eq!(schema.column("when").unwrap().column_type, ColumnType::Date);
        assert_eq!(table.rows()[0][0], Value::Number(1.0));
        assert!(matches!(table.rows()[0][1], Value::Date(Some(_))));
    }

    #[test]
    fn tab_separated_text_uses_the_tab_delimiter() {
        let table = parse_csv("a\tb\n1\t2\n", b'\t', CsvOptions::default()).unwrap();
        assert_eq!(table.columns(), ["a", "b"]);
        assert_eq!(table.rows()[0][1], Value::from("2"));
    }

    #[test]
    fn a_json_array_of_objects_becomes_a_table() {
        let table = parse_json(r#"[{"a": 1, "b": "x"}, {"b": "y"}]"#).unwrap();
        assert_eq!(table.columns(), ["a", "b"]);
        assert_eq!(table.value(1, "a"), &Value::Undefined);
        assert_eq!(table.value(1, "b"), &Value::from("y"));
    }

    #[test]
    fn a_json_array_of_primitives_gets_a_value_column() {
        let table = parse_json("[1, 2, 3]").unwrap();
        assert_eq!(table.columns(), ["value"]);
        assert_eq!(table.rows()[2][0], Value::Number(3.0));
    }

    #[test]
    fn newline_delimited_json_is_a_fallback() {
        let table = parse_json("{\"a\": 1}\n\n{\"a\": 2}\n").unwrap();
        assert_eq!(table.columns(), ["a"]);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn a_lone_json_object_is_not_a_data_source() {
        assert!(matches!(
            parse_json(r#"{"a": 1}"#),
            Err(EngineError::InvalidDataSource)
        ));
    }

    #[test]
    fn mime_types_come_from_the_extension() {
        assert_eq!(LocalFileAttachment::new("x.csv").mime_type(), "text/csv");
        assert_eq!(
            LocalFileAttachment::new("x.TSV").mime_type(),
            "text/tab-separated-values"
        );
        assert_eq!(
            LocalFileAttachment::new("x.sqlite3").mime_type(),
            "application/x-sqlite3"
        );
        assert_eq!(
            LocalFileAttachment::new("dir/x.bin").mime_type(),
            "application/octet-stream"
        );
        assert_eq!(LocalFileAttachment::new("x.bin").name(), "x.bin");
    }
}
