use crate::source::parser::{LineParser, ParseError};
use crate::source::record::CounterRecord;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed measurement at line {line}: {source}")]
    Parse {
        line: u64,
        #[source]
        source: ParseError,
    },
}

/// Streams [`CounterRecord`]s out of one rotated log file.
///
/// Lines that do not follow the grammar are skipped. Bytes are decoded
/// lossily so binary junk is just another non-matching line.
pub struct LogFileReader<'a> {
    path: PathBuf,
    parser: &'a LineParser,
    file: BufReader<File>,
    buf: Vec<u8>,
    line_number: u64,
    skipped: u64,
}

impl<'a> LogFileReader<'a> {
    pub fn open(path: &Path, parser: &'a LineParser) -> Result<Self, ReaderError> {
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            parser,
            file: BufReader::new(file),
            buf: Vec::with_capacity(512),
            line_number: 0,
            skipped: 0,
        })
    }

    /// Read the next measurement record, or `None` at end of file.
    pub fn next_record(&mut self) -> Result<Option<CounterRecord>, ReaderError> {
        loop {
            self.buf.clear();
            let bytes_read = self.file.read_until(b'\n', &mut self.buf)?;
            if bytes_read == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let text = String::from_utf8_lossy(&self.buf);
            let line = text.trim_end_matches(&['\n', '\r'][..]);

            match self.parser.parse(line) {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => {
                    tracing::trace!(line = self.line_number, "Skipping non-measurement line");
                    self.skipped += 1;
                }
                Err(source) => {
                    return Err(ReaderError::Parse {
                        line: self.line_number,
                        source,
                    })
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines read so far, matching or not.
    pub fn lines_read(&self) -> u64 {
        self.line_number
    }

    /// Lines that did not follow the grammar.
    pub fn lines_skipped(&self) -> u64 {
        self.skipped
    }
}
