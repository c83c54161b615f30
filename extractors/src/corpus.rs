use csv::{ReaderBuilder, StringRecord};
use shared_types::CorpusEntry;
use std::fs::File;
use std::path::Path;

/// Default cap on a single corpus field, in bytes
pub const DEFAULT_MAX_FIELD_SIZE: usize = 5_000_000;

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("Failed to read corpus: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corpus header is missing column '{0}'")]
    MissingColumn(String),

    #[error("Malformed corpus row at line {line}: {reason}")]
    Malformed { line: u64, reason: String },

    #[error("Corpus row at line {line} has a {size}-byte field (limit {limit})")]
    FieldTooLarge { line: u64, size: usize, limit: usize },
}

impl CorpusError {
    /// Row-level problems that only cost the affected row
    pub fn is_row_error(&self) -> bool {
        matches!(
            self,
            CorpusError::Malformed { .. } | CorpusError::FieldTooLarge { .. }
        )
    }

    fn from_csv(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        if err.is_io_error() {
            match err.into_kind() {
                csv::ErrorKind::Io(io) => CorpusError::Io(io),
                other => CorpusError::Malformed {
                    line,
                    reason: format!("{:?}", other),
                },
            }
        } else {
            CorpusError::Malformed {
                line,
                reason: err.to_string(),
            }
        }
    }
}

/// Reads `id`/`content` pairs out of a header-having delimited file
#[derive(Debug, Clone)]
pub struct CorpusReader {
    delimiter: u8,
    id_column: String,
    content_column: String,
    max_field_size: usize,
}

impl CorpusReader {
    pub fn new(id_column: impl Into<String>, content_column: impl Into<String>) -> Self {
        Self {
            delimiter: b',',
            id_column: id_column.into(),
            content_column: content_column.into(),
            max_field_size: DEFAULT_MAX_FIELD_SIZE,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_max_field_size(mut self, max_field_size: usize) -> Self {
        self.max_field_size = max_field_size;
        self
    }

    pub fn open(&self, path: &Path) -> Result<CorpusRows<File>, CorpusError> {
        let file = File::open(path)?;
        self.from_reader(file)
    }

    pub fn from_reader<R: std::io::Read>(&self, source: R) -> Result<CorpusRows<R>, CorpusError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .from_reader(source);

        let headers = reader.headers().map_err(CorpusError::from_csv)?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| CorpusError::MissingColumn(name.to_string()))
        };
        let id_index = column(&self.id_column)?;
        let content_index = column(&self.content_column)?;

        Ok(CorpusRows {
            reader,
            record: StringRecord::new(),
            id_index,
            content_index,
            max_field_size: self.max_field_size,
        })
    }
}

/// Streaming iterator over corpus entries, in file order
pub struct CorpusRows<R> {
    reader: csv::Reader<R>,
    record: StringRecord,
    id_index: usize,
    content_index: usize,
    max_field_size: usize,
}

impl<R: std::io::Read> CorpusRows<R> {
    fn entry_from_record(&self) -> Result<CorpusEntry, CorpusError> {
        let line = self.record.position().map(|p| p.line()).unwrap_or(0);

        if let Some(size) = self
            .record
            .iter()
            .map(str::len)
            .find(|len| *len > self.max_field_size)
        {
            return Err(CorpusError::FieldTooLarge {
                line,
                size,
                limit: self.max_field_size,
            });
        }

        let field = |index: usize, name: &str| {
            self.record
                .get(index)
                .map(str::to_string)
                .ok_or_else(|| CorpusError::Malformed {
                    line,
                    reason: format!("missing {} field", name),
                })
        };

        Ok(CorpusEntry {
            id: field(self.id_index, "id")?,
            content: field(self.content_index, "content")?,
        })
    }
}

impl<R: std::io::Read> Iterator for CorpusRows<R> {
    type Item = Result<CorpusEntry, CorpusError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record(&mut self.record) {
            Ok(true) => Some(self.entry_from_record()),
            Ok(false) => None,
            Err(e) => Some(Err(CorpusError::from_csv(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(reader: &CorpusReader, csv: &str) -> Vec<Result<CorpusEntry, CorpusError>> {
        reader.from_reader(csv.as_bytes()).unwrap().collect()
    }

    #[test]
    fn test_reads_entries_in_order() {
        let reader = CorpusReader::new("id", "content");
        let csv = "id,title,content\n1,a,first text\n2,b,\"second, quoted\"\n3,c,third\n";

        let ids: Vec<_> = entries(&reader, csv)
            .into_iter()
            .map(|e| e.unwrap().id)
            .collect();
        assert_eq!(ids, ["1", "2", "3"]);

        let second = reader.from_reader(csv.as_bytes()).unwrap().nth(1).unwrap().unwrap();
        assert_eq!(second.content, "second, quoted");
    }

    #[test]
    fn test_custom_column_names() {
        let reader = CorpusReader::new("pmc_id", "content");
        let rows = entries(&reader, "pmc_id,content\nPMC1,text\n");
        assert_eq!(rows[0].as_ref().unwrap(), &CorpusEntry::new("PMC1", "text"));
    }

    #[test]
    fn test_missing_column() {
        let reader = CorpusReader::new("id", "content");
        match reader.from_reader("id,body\n1,x\n".as_bytes()) {
            Err(CorpusError::MissingColumn(name)) => assert_eq!(name, "content"),
            _ => panic!("Expected MissingColumn"),
        }
    }

    #[test]
    fn test_oversized_field_is_a_row_error() {
        let reader = CorpusReader::new("id", "content").with_max_field_size(8);
        let rows = entries(&reader, "id,content\n1,short\n2,much too long\n3,fine\n");

        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_ok());
        let err = rows[1].as_ref().unwrap_err();
        assert!(err.is_row_error());
        assert!(matches!(err, CorpusError::FieldTooLarge { size: 13, limit: 8, .. }));
        assert_eq!(rows[2].as_ref().unwrap().id, "3");
    }

    #[test]
    fn test_ragged_row_is_a_row_error() {
        let reader = CorpusReader::new("id", "content");
        let rows = entries(&reader, "id,content\n1,a\n2\n3,c\n");

        assert!(rows[0].is_ok());
        assert!(rows[1].as_ref().unwrap_err().is_row_error());
        assert_eq!(rows[2].as_ref().unwrap().id, "3");
    }

    #[test]
    fn test_tab_delimited() {
        let reader = CorpusReader::new("id", "content").with_delimiter(b'\t');
        let rows = entries(&reader, "id\tcontent\n7\ta, b\n");
        assert_eq!(rows[0].as_ref().unwrap().content, "a, b");
    }
}
