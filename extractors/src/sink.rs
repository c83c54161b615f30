use serde::Serialize;
use shared_types::AbbreviationRecord;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Output file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode output row: {0}")]
    Encode(#[from] csv::Error),
}

/// One output ledger row, in `OUTPUT_COLUMNS` order
#[derive(Debug, Serialize)]
pub struct LedgerRow<'a> {
    pub id: &'a str,
    pub short_form: &'a str,
    pub long_form: &'a str,
    pub short_form_offset: u32,
    pub long_form_offset: u32,
    pub precision: f64,
}

impl<'a> LedgerRow<'a> {
    pub fn new(id: &'a str, record: &'a AbbreviationRecord) -> Self {
        Self {
            id,
            short_form: &record.short_form,
            long_form: &record.long_form,
            short_form_offset: record.short_form_offset,
            long_form_offset: record.long_form_offset,
            precision: record.precision,
        }
    }
}

/// Append-only CSV writer. The header goes out only when this sink created
/// the file, and every `append_rows` call reaches the file as a single write.
pub struct IncrementalCsvSink {
    path: PathBuf,
    file: File,
    needs_header: bool,
}

impl IncrementalCsvSink {
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        let existed = path.exists();
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            needs_header: !existed,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `write_header` would still write
    pub fn needs_header(&self) -> bool {
        self.needs_header
    }

    /// Write the header row if the file was created by this sink and no header
    /// has been written yet. Returns whether a header was written.
    pub fn write_header(&mut self, columns: &[&str]) -> Result<bool, SinkError> {
        if !self.needs_header {
            return Ok(false);
        }
        let mut buffer = buffered_writer();
        buffer.write_record(columns)?;
        self.flush_buffer(buffer)?;
        self.needs_header = false;
        Ok(true)
    }

    /// Append a group of rows and flush it before returning
    pub fn append_rows<S, I>(&mut self, rows: I) -> Result<usize, SinkError>
    where
        S: Serialize,
        I: IntoIterator<Item = S>,
    {
        let mut buffer = buffered_writer();
        let mut count = 0;
        for row in rows {
            buffer.serialize(row)?;
            count += 1;
        }
        if count > 0 {
            self.flush_buffer(buffer)?;
        }
        Ok(count)
    }

    fn flush_buffer(&mut self, buffer: csv::Writer<Vec<u8>>) -> Result<(), SinkError> {
        let bytes = buffer
            .into_inner()
            .map_err(|e| SinkError::Io(e.into_error()))?;
        self.file.write_all(&bytes)?;
        self.file.flush()?;
        Ok(())
    }
}

fn buffered_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new())
}
