//! Record writers: JSON / JSON Lines via serde, and CSV.
//!
//! CSV is written by hand: a header row, then one row per record, with
//! fields quoted only when they contain a comma, a quote or a line break.

use serde::Serialize;
use std::io::{self, Write};

/// JSON output flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Single JSON document (an array for batches)
    Json,
    /// One JSON object per line
    JsonLines,
}

/// Serializes records as JSON or JSONL.
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
    items_written: usize,
}

impl<W: Write> OutputWriter<W> {
    /// `pretty` only affects [`OutputFormat::Json`].
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
            items_written: 0,
        }
    }

    /// Write one record.
    pub fn write<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        if self.pretty && self.format == OutputFormat::Json {
            serde_json::to_writer_pretty(&mut self.writer, item).map_err(io::Error::other)?;
        } else {
            serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?;
        }
        writeln!(self.writer)?;
        self.items_written += 1;
        Ok(())
    }

    /// Write a batch: a JSON array, or one line per record for JSONL.
    pub fn write_all<T: Serialize>(&mut self, items: &[T]) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                if self.pretty {
                    serde_json::to_writer_pretty(&mut self.writer, items)
                        .map_err(io::Error::other)?;
                } else {
                    serde_json::to_writer(&mut self.writer, items).map_err(io::Error::other)?;
                }
                writeln!(self.writer)?;
                self.items_written += items.len();
            }
            OutputFormat::JsonLines => {
                for item in items {
                    self.write(item)?;
                }
            }
        }
        Ok(())
    }

    pub fn items_written(&self) -> usize {
        self.items_written
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Quote a CSV field if it needs it.
pub fn escape_csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Row-oriented CSV writer. Missing values become empty cells.
pub struct CsvWriter<W: Write> {
    writer: W,
    rows_written: usize,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            rows_written: 0,
        }
    }

    pub fn write_header<S: AsRef<str>>(&mut self, columns: &[S]) -> io::Result<()> {
        let line: Vec<String> = columns
            .iter()
            .map(|c| escape_csv_field(c.as_ref()))
            .collect();
        writeln!(self.writer, "{}", line.join(","))
    }

    pub fn write_row(&mut self, cells: &[Option<String>]) -> io::Result<()> {
        let line: Vec<String> = cells
            .iter()
            .map(|cell| cell.as_deref().map(escape_csv_field).unwrap_or_default())
            .collect();
        writeln!(self.writer, "{}", line.join(","))?;
        self.rows_written += 1;
        Ok(())
    }

    /// Data rows written so far (header excluded).
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
