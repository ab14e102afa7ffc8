//! Delimited-file row source for parameterized re-execution.

use super::expand::expand_path;
use crate::db::Value;
use crate::error::{BatchError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::fs::File;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Declared type of an imported field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportType {
    Number,
    Date,
    Timestamp,
    Text,
}

impl ImportType {
    /// Parses a type tag by prefix: `DECIMAL(18,2)` is a number, `DATE` a
    /// date, `TIMESTAMP(0)` a timestamp; anything else is text.
    pub fn parse(tag: &str) -> Self {
        let tag = tag.trim().to_ascii_uppercase();
        if tag.starts_with("DECIMAL") {
            ImportType::Number
        } else if tag.starts_with("DATE") {
            ImportType::Date
        } else if tag.starts_with("TIMESTAMP") {
            ImportType::Timestamp
        } else {
            ImportType::Text
        }
    }

    /// Value a variable holds until a field is read into it.
    pub fn default_value(self) -> Value {
        match self {
            ImportType::Number => Value::Int(0),
            ImportType::Date => Value::Date(NaiveDate::MIN),
            ImportType::Timestamp => Value::Timestamp(NaiveDateTime::MIN),
            ImportType::Text => Value::Null,
        }
    }

    fn coerce(self, field: &str) -> Option<Value> {
        match self {
            ImportType::Number => field
                .parse::<i64>()
                .map(Value::Int)
                .or_else(|_| field.parse::<f64>().map(Value::Float))
                .ok(),
            ImportType::Date => NaiveDate::parse_from_str(field, "%Y-%m-%d")
                .map(Value::Date)
                .ok(),
            ImportType::Timestamp => ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(field, fmt).ok())
                .map(Value::Timestamp),
            ImportType::Text => Some(Value::String(field.to_string())),
        }
    }
}

/// Builds a schema from parallel name and type-tag lists. Names without a
/// tag are text.
pub fn parse_schema(names: &[&str], types: &[&str]) -> Vec<(String, ImportType)> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let kind = types.get(i).map_or(ImportType::Text, |t| ImportType::parse(t));
            (name.to_string(), kind)
        })
        .collect()
}

/// Result of one read.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Row(HashMap<String, Value>),
    /// No more rows; not an error.
    Exhausted,
}

impl ImportOutcome {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, ImportOutcome::Exhausted)
    }

    pub fn into_row(self) -> Option<HashMap<String, Value>> {
        match self {
            ImportOutcome::Row(row) => Some(row),
            ImportOutcome::Exhausted => None,
        }
    }
}

#[derive(Debug)]
struct ImportSource {
    path: PathBuf,
    delimiter: u8,
    reader: Option<csv::Reader<File>>,
    exhausted: bool,
}

impl ImportSource {
    fn reader(&mut self) -> Result<&mut csv::Reader<File>> {
        let reader = match self.reader.take() {
            Some(reader) => reader,
            None => {
                let file = File::open(&self.path).map_err(|e| {
                    BatchError::import(format!("Cannot open {}: {e}", self.path.display()))
                })?;
                debug!("Opened import file {}", self.path.display());
                csv::ReaderBuilder::new()
                    .delimiter(self.delimiter)
                    .has_headers(false)
                    .flexible(true)
                    .trim(csv::Trim::All)
                    .from_reader(file)
            }
        };
        Ok(self.reader.insert(reader))
    }
}

/// Reads one delimited row per call into named, typed values.
#[derive(Debug, Default)]
pub struct RowImporter {
    source: Option<ImportSource>,
    no_more_rows: bool,
}

impl RowImporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points the importer at `path`. The file is opened on the first read.
    pub fn configure(&mut self, path: &str, separator: &str) -> Result<()> {
        let delimiter = match separator.as_bytes() {
            [byte] => *byte,
            _ => {
                return Err(BatchError::import(format!(
                    "Import separator must be a single byte, got {separator:?}"
                )))
            }
        };

        let path = PathBuf::from(expand_path(path));
        info!("Import source set to {}", path.display());
        self.source = Some(ImportSource {
            path,
            delimiter,
            reader: None,
            exhausted: false,
        });
        self.no_more_rows = false;
        Ok(())
    }

    /// Forgets the source and the exhaustion flag.
    pub fn reset(&mut self) {
        self.source = None;
        self.no_more_rows = false;
    }

    pub fn is_configured(&self) -> bool {
        self.source.is_some()
    }

    /// True once a read has hit the end of the source.
    pub fn no_more_rows(&self) -> bool {
        self.no_more_rows
    }

    /// Reads the next row into a name → value map.
    ///
    /// Every schema name is present in the map: fields missing from the row,
    /// empty typed fields, and reads with no configured source leave the
    /// type's default. A field that does not parse as its type is kept as
    /// text.
    pub fn read_into<S: AsRef<str>>(&mut self, schema: &[(S, ImportType)]) -> Result<ImportOutcome> {
        let mut values: HashMap<String, Value> = schema
            .iter()
            .map(|(name, kind)| (name.as_ref().to_string(), kind.default_value()))
            .collect();

        let Some(source) = self.source.as_mut() else {
            debug!("No import source configured; using defaults");
            return Ok(ImportOutcome::Row(values));
        };
        if source.exhausted {
            return Ok(ImportOutcome::Exhausted);
        }

        let mut record = csv::StringRecord::new();
        let found = source
            .reader()?
            .read_record(&mut record)
            .map_err(|e| BatchError::import(format!("Cannot read import row: {e}")))?;
        if !found {
            info!("No more rows in {}", source.path.display());
            source.exhausted = true;
            self.no_more_rows = true;
            return Ok(ImportOutcome::Exhausted);
        }

        for ((name, kind), field) in schema.iter().zip(record.iter()) {
            if field.is_empty() && *kind != ImportType::Text {
                continue;
            }
            let value = kind.coerce(field).unwrap_or_else(|| {
                warn!(
                    "Field {} value {field:?} is not a valid {kind:?}; keeping it as text",
                    name.as_ref()
                );
                Value::String(field.to_string())
            });
            values.insert(name.as_ref().to_string(), value);
        }

        Ok(ImportOutcome::Row(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_type_tags_parse_by_prefix() {
        assert_eq!(ImportType::parse("DECIMAL(18,2)"), ImportType::Number);
        assert_eq!(ImportType::parse("date"), ImportType::Date);
        assert_eq!(ImportType::parse("TIMESTAMP(0)"), ImportType::Timestamp);
        assert_eq!(ImportType::parse("VARCHAR(10)"), ImportType::Text);
    }

    #[test]
    fn test_empty_file_is_exhausted_immediately() {
        let file = write_file("");
        let mut importer = RowImporter::new();
        importer
            .configure(file.path().to_str().unwrap(), ",")
            .unwrap();

        let schema = [("id", ImportType::Number)];
        assert!(importer.read_into(&schema).unwrap().is_exhausted());
        assert!(importer.no_more_rows());
    }

    #[test]
    fn test_n_rows_then_exhausted() {
        let file = write_file("1|2024-01-31|alpha\n2|2024-02-29|beta\n");
        let mut importer = RowImporter::new();
        importer
            .configure(file.path().to_str().unwrap(), "|")
            .unwrap();
        let schema = parse_schema(&["id", "run_dt", "name"], &["DECIMAL(10)", "DATE"]);

        let first = importer.read_into(&schema).unwrap().into_row().unwrap();
        assert_eq!(first["id"], Value::Int(1));
        assert_eq!(
            first["run_dt"],
            Value::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap())
        );
        assert_eq!(first["name"], Value::from("alpha"));

        let second = importer.read_into(&schema).unwrap().into_row().unwrap();
        assert_eq!(second["id"], Value::Int(2));

        assert!(importer.read_into(&schema).unwrap().is_exhausted());
        assert!(importer.read_into(&schema).unwrap().is_exhausted());
        assert!(importer.no_more_rows());
    }

    #[test]
    fn test_missing_and_bad_fields() {
        let file = write_file("abc\n");
        let mut importer = RowImporter::new();
        importer
            .configure(file.path().to_str().unwrap(), ",")
            .unwrap();
        let schema = [("amount", ImportType::Number), ("ts", ImportType::Timestamp)];

        let row = importer.read_into(&schema).unwrap().into_row().unwrap();
        assert_eq!(row["amount"], Value::from("abc"));
        assert_eq!(row["ts"], Value::Timestamp(NaiveDateTime::MIN));
    }

    #[test]
    fn test_unconfigured_returns_defaults() {
        let mut importer = RowImporter::new();
        let schema = [("n", ImportType::Number), ("t", ImportType::Text)];
        let row = importer.read_into(&schema).unwrap().into_row().unwrap();
        assert_eq!(row["n"], Value::Int(0));
        assert_eq!(row["t"], Value::Null);
        assert!(!importer.no_more_rows());
    }

    #[test]
    fn test_reset_clears_exhaustion() {
        let file = write_file("");
        let mut importer = RowImporter::new();
        importer
            .configure(file.path().to_str().unwrap(), ",")
            .unwrap();
        importer.read_into(&[("x", ImportType::Text)]).unwrap();
        assert!(importer.no_more_rows());

        importer.reset();
        assert!(!importer.is_configured());
        assert!(!importer.no_more_rows());
    }

    #[test]
    fn test_multibyte_separator_rejected() {
        let mut importer = RowImporter::new();
        assert!(importer.configure("/tmp/x.txt", "||").is_err());
    }

    #[test]
    fn test_missing_file_is_import_error() {
        let mut importer = RowImporter::new();
        importer.configure("/nonexistent/dir/rows.txt", ",").unwrap();
        let err = importer.read_into(&[("x", ImportType::Text)]).unwrap_err();
        assert!(matches!(err, BatchError::Import(_)));
    }
}
