//! Lazy splitting of a query stream into marker-delimited records.
//!
//! A record starts at a line beginning with the record marker (`>` for FASTA)
//! and runs until the next marker line or end of stream. The feeder looks at
//! the first buffered byte of the following line to decide where a record
//! ends, so it never consumes bytes belonging to the next record and works on
//! non-seekable streams such as stdin.

use crate::error::{Error, Result};
use crate::record::QueryRecord;
use std::io::{BufRead, ErrorKind};

pub const DEFAULT_RECORD_MARKER: u8 = b'>';

/// Reads query records from a blocking `BufRead` one at a time.
pub struct QueryFeeder<R> {
    reader: R,
    marker: u8,
    offset: u64,
}

impl<R: BufRead> QueryFeeder<R> {
    pub fn new(reader: R) -> Self {
        Self::with_marker(reader, DEFAULT_RECORD_MARKER)
    }

    pub fn with_marker(reader: R, marker: u8) -> Self {
        Self {
            reader,
            marker,
            offset: 0,
        }
    }

    /// Number of bytes consumed from the underlying stream so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next record.
    ///
    /// Returns `Ok(None)` once the stream is exhausted. A record whose first line
    /// does not start with the marker is an [`Error::Feeder`].
    pub fn next_query(&mut self) -> Result<Option<QueryRecord>> {
        let mut buf = Vec::new();
        if self.read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        if buf[0] != self.marker {
            return Err(Error::Feeder {
                offset: self.offset - buf.len() as u64,
                marker: self.marker as char,
            });
        }

        while let Some(next) = self.peek_byte()? {
            if next == self.marker {
                break;
            }
            self.read_line(&mut buf)?;
        }

        Ok(Some(QueryRecord::new(buf)))
    }

    /// Append one line (with terminator, if any) to `buf`.
    fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let n = self.reader.read_until(b'\n', buf)?;
        self.offset += n as u64;
        Ok(n)
    }

    /// First byte of the next line without consuming it.
    fn peek_byte(&mut self) -> Result<Option<u8>> {
        loop {
            match self.reader.fill_buf() {
                Ok(bytes) => return Ok(bytes.first().copied()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<R: BufRead> Iterator for QueryFeeder<R> {
    type Item = Result<QueryRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_query().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor, Read};

    fn feeder(input: &str) -> QueryFeeder<Cursor<Vec<u8>>> {
        QueryFeeder::new(Cursor::new(input.as_bytes().to_vec()))
    }

    #[test]
    fn test_empty_stream_is_end_of_input() {
        let mut f = feeder("");
        assert!(f.next_query().unwrap().is_none());
        assert!(f.next_query().unwrap().is_none());
    }

    #[test]
    fn test_splits_on_marker_lines() {
        let mut f = feeder(">q1\nACGT\n>q2\nTT\nTT\n");
        let q1 = f.next_query().unwrap().unwrap();
        assert_eq!(q1.as_bytes(), b">q1\nACGT\n");
        assert_eq!(f.offset(), 9);
        let q2 = f.next_query().unwrap().unwrap();
        assert_eq!(q2.as_bytes(), b">q2\nTT\nTT\n");
        assert!(f.next_query().unwrap().is_none());
    }

    #[test]
    fn test_last_record_without_newline() {
        let mut f = feeder(">q1\nAC\n>q2\nGT");
        f.next_query().unwrap().unwrap();
        let q2 = f.next_query().unwrap().unwrap();
        assert_eq!(q2.as_bytes(), b">q2\nGT");
    }

    #[test]
    fn test_header_only_record() {
        let mut f = feeder(">q1\n>q2\n");
        assert_eq!(f.next_query().unwrap().unwrap().as_bytes(), b">q1\n");
        assert_eq!(f.next_query().unwrap().unwrap().as_bytes(), b">q2\n");
    }

    #[test]
    fn test_missing_marker_is_fatal() {
        let mut f = feeder("ACGT\n>q1\nAC\n");
        let err = f.next_query().unwrap_err();
        assert!(matches!(err, Error::Feeder { offset: 0, marker: '>' }));
    }

    #[test]
    fn test_stream_left_at_next_record() {
        let mut f = feeder(">q1\nAC\n>q2\nGT\n");
        f.next_query().unwrap().unwrap();
        let mut rest = String::new();
        f.reader.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, ">q2\nGT\n");
    }

    #[test]
    fn test_tiny_buffer_reader() {
        let input = ">q1 first\nACGTACGT\nACGT\n>q2\nTTTT\n";
        let reader = BufReader::with_capacity(1, Cursor::new(input.as_bytes().to_vec()));
        let records: Vec<_> = QueryFeeder::new(reader)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].header(), "q1 first");
        assert_eq!(records[1].as_bytes(), b">q2\nTTTT\n");
    }

    #[test]
    fn test_custom_marker() {
        let mut f = QueryFeeder::with_marker(Cursor::new(b"@r1\nAC\n@r2\n".to_vec()), b'@');
        assert_eq!(f.next_query().unwrap().unwrap().as_bytes(), b"@r1\nAC\n");
        assert_eq!(f.next_query().unwrap().unwrap().as_bytes(), b"@r2\n");
    }
}
