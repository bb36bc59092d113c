//! Data sources: in-memory rows, file attachments, and database clients.
//!
//! A [`DataSource`] is anything the engine can turn into rows or a SQL
//! surface. [`FileAttachment`] abstracts file access so the same parse
//! helpers serve local files, uploads, and remote blobs; [`EmbeddedDatabase`]
//! is the bridge that makes rows and files queryable with SQL. The
//! [`SourceLoader`] registers sources and caches their resolved forms.

mod file;
mod loader;
#[cfg(feature = "parquet")]
mod parquet;

pub use file::LocalFileAttachment;
pub use loader::{LoaderOptions, LoaderStats, ResolvedSource, SourceLoader};

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::client::DatabaseClient;
use crate::error::{EngineError, EngineResult};
use crate::types::Table;

/// Table name an attached source falls back to when nothing better is known.
pub const DEFAULT_TABLE_NAME: &str = "__table";

/// Identifier the loader assigns to a registered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a registered source is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadMode {
    /// Typed rows for plotting: text formats get schema inference.
    Chart,
    /// Raw rows for tabular display: text formats stay untyped strings.
    Table,
    /// A database client that SQL can run against.
    Sql,
}

/// How CSV/TSV cells should be typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsvTyping {
    /// Leave every cell a string.
    #[default]
    Untyped,
    /// Infer column types from a sample and coerce.
    Auto,
}

/// Options for parsing delimiter-separated files.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvOptions {
    pub typed: CsvTyping,
}

/// A named file the engine can read.
///
/// `text` and `bytes` are the required readers; the format helpers have
/// defaults built on them, so implementors only provide access.
pub trait FileAttachment: Send + Sync {
    fn name(&self) -> &str;

    fn mime_type(&self) -> &str;

    /// A remote location for the file, when it has one.
    fn url(&self) -> Option<String> {
        None
    }

    /// A path on the local filesystem, when the file is local. Format
    /// readers that want a file handle use this to skip the in-memory copy.
    fn local_path(&self) -> Option<&Path> {
        None
    }

    fn text(&self) -> EngineResult<String>;

    fn bytes(&self) -> EngineResult<Vec<u8>>;

    /// Parses the file as comma-separated rows.
    fn csv(&self, options: CsvOptions) -> EngineResult<Table> {
        file::parse_csv(&self.text()?, b',', options)
    }

    /// Parses the file as tab-separated rows.
    fn tsv(&self, options: CsvOptions) -> EngineResult<Table> {
        file::parse_csv(&self.text()?, b'\t', options)
    }

    /// Parses the file as a JSON array of objects, falling back to one
    /// object per line.
    fn json(&self) -> EngineResult<Table> {
        file::parse_json(&self.text()?)
    }

    /// Opens the file as a SQLite database. There is no built-in reader;
    /// attachments backed by one override this.
    fn sqlite(&self) -> EngineResult<Arc<dyn DatabaseClient>> {
        Err(EngineError::UnsupportedFileType {
            mime_type: self.mime_type().to_owned(),
        })
    }
}

/// What a registered source is backed by.
#[derive(Clone)]
pub enum DataSource {
    /// Rows already in memory.
    Rows(Arc<Table>),
    /// A file to parse on demand.
    File(Arc<dyn FileAttachment>),
    /// A live database connection.
    Client(Arc<dyn DatabaseClient>),
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Rows(table) => write!(f, "Rows({} rows)", table.row_count()),
            DataSource::File(file) => write!(f, "File({})", file.name()),
            DataSource::Client(_) => write!(f, "Client"),
        }
    }
}

impl From<Table> for DataSource {
    fn from(table: Table) -> Self {
        DataSource::Rows(Arc::new(table))
    }
}

impl From<Arc<Table>> for DataSource {
    fn from(table: Arc<Table>) -> Self {
        DataSource::Rows(table)
    }
}

impl From<Arc<dyn FileAttachment>> for DataSource {
    fn from(file: Arc<dyn FileAttachment>) -> Self {
        DataSource::File(file)
    }
}

impl From<Arc<dyn DatabaseClient>> for DataSource {
    fn from(client: Arc<dyn DatabaseClient>) -> Self {
        DataSource::Client(client)
    }
}

/// Data handed to an embedded database for attachment.
#[derive(Clone, Copy)]
pub enum AttachData<'a> {
    Rows(&'a Table),
    File(&'a dyn FileAttachment),
}

impl fmt::Debug for AttachData<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachData::Rows(table) => write!(f, "Rows({} rows)", table.row_count()),
            AttachData::File(file) => write!(f, "File({})", file.name()),
        }
    }
}

/// An embedded analytics database that can ingest rows and files and hand
/// back a client to query them through. This is what lets SQL run against
/// sources that are not databases themselves.
#[async_trait]
pub trait EmbeddedDatabase: Send + Sync {
    /// Makes `data` queryable under the table name `name`.
    async fn attach(
        &self,
        name: &str,
        data: AttachData<'_>,
    ) -> EngineResult<Arc<dyn DatabaseClient>>;
}

/// Derives the table name for an attached file: the upload version marker
/// (`@` plus digits before the extension) goes, then the extension.
pub fn file_source_name(name: &str) -> String {
    let stripped = strip_version(name);
    match stripped.rfind('.') {
        Some(dot)
            if dot + 1 < stripped.len()
                && stripped[dot + 1..]
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_') =>
        {
            stripped[..dot].to_owned()
        }
        _ => stripped,
    }
}

fn strip_version(name: &str) -> String {
    let bytes = name.as_bytes();
    let mut from = 0;
    while let Some(pos) = name[from..].find('@') {
        let at = from + pos;
        let mut end = at + 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        if end > at + 1 && (end == bytes.len() || bytes[end] == b'.') {
            let mut out = String::with_capacity(name.len());
            out.push_str(&name[..at]);
            out.push_str(&name[end..]);
            return out;
        }
        from = at + 1;
    }
    name.to_owned()
}
