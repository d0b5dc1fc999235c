//! Incremental parser for tabular-with-comments (outfmt 7) worker output.
//!
//! Each query produces a block of the form:
//!
//! ```text
//! # BLASTN 2.15.0+
//! # Query: q1 optional description
//! # Database: nt
//! # Fields: subject id, % identity      (optional)
//! # 2 hits found
//! hitA\t99.1
//! hitB\t87.0
//! ```
//!
//! The parser works on a growing byte buffer. An incomplete block yields
//! `Ok(None)` and consumes nothing; a block that breaks the grammar is an error.

use crate::error::ParseError;
use crate::record::{Hit, ResultRecord};

pub const DEFAULT_HEADER_PREFIX: &str = "# BLAST";

const QUERY_PREFIX: &str = "# Query: ";
const DATABASE_PREFIX: &str = "# Database: ";
const FIELDS_PREFIX: &str = "# Fields: ";
const HITS_SUFFIX: &str = " hits found";
const TRAILER_MARKER: &str = " processed ";

/// Splits worker output into [`ResultRecord`]s.
#[derive(Debug, Clone)]
pub struct ResultParser {
    header_prefix: String,
    default_fields: Vec<String>,
}

/// Line cursor over a byte slice. Only fully terminated lines are returned.
struct Lines<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Lines<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Next `\n`-terminated line with `\n`/`\r\n` removed, or `None` if the
    /// buffer ends first.
    fn next_bytes(&mut self) -> Option<&'a [u8]> {
        let buf = self.buf;
        let rest = &buf[self.pos..];
        let nl = rest.iter().position(|&b| b == b'\n')?;
        self.pos += nl + 1;
        Some(rest[..nl].strip_suffix(b"\r").unwrap_or(&rest[..nl]))
    }

    /// Next complete data line. Hit columns are kept verbatim, so the line
    /// must be valid UTF-8.
    fn next_data(&mut self) -> Option<Result<&'a str, ParseError>> {
        self.next_bytes().map(|line| {
            std::str::from_utf8(line).map_err(|_| {
                ParseError::InvalidUtf8(String::from_utf8_lossy(line).into_owned())
            })
        })
    }

    /// Next complete comment line with surrounding whitespace trimmed.
    fn next_trimmed(&mut self) -> Option<String> {
        self.next_bytes()
            .map(|l| String::from_utf8_lossy(l).trim().to_string())
    }
}

impl ResultParser {
    pub fn new(header_prefix: impl Into<String>, default_fields: Vec<String>) -> Self {
        Self {
            header_prefix: header_prefix.into(),
            default_fields,
        }
    }

    pub fn default_fields(&self) -> &[String] {
        &self.default_fields
    }

    /// Try to parse one complete block from the start of `buf`.
    ///
    /// On success returns the record and the number of bytes it occupied; the
    /// remainder is `&buf[consumed..]`. Returns `Ok(None)` if the buffer ends
    /// before the block does.
    pub fn try_extract(&self, buf: &[u8]) -> Result<Option<(ResultRecord, usize)>, ParseError> {
        let mut lines = Lines::new(buf);

        let Some(header) = lines.next_trimmed() else {
            return Ok(None);
        };
        if !header.starts_with(&self.header_prefix) {
            return Err(ParseError::BadHeader {
                expected: self.header_prefix.clone(),
                line: header,
            });
        }

        let Some(query) = lines.next_trimmed() else {
            return Ok(None);
        };
        let (id, description) = parse_query_line(&query)?;

        let Some(database) = lines.next_trimmed() else {
            return Ok(None);
        };
        if !database.starts_with(DATABASE_PREFIX.trim_end()) {
            return Err(ParseError::BadDatabaseLine(database));
        }

        let Some(mut line) = lines.next_trimmed() else {
            return Ok(None);
        };
        let declared: Option<Vec<String>> = match line.strip_prefix(FIELDS_PREFIX) {
            Some(names) => {
                let names = names.split(", ").map(|s| s.trim().to_string()).collect();
                let Some(next) = lines.next_trimmed() else {
                    return Ok(None);
                };
                line = next;
                Some(names)
            }
            None => None,
        };
        let fields = declared.as_deref().unwrap_or(&self.default_fields);
        if let Some(dup) = first_duplicate(fields) {
            return Err(ParseError::DuplicateField(dup.to_string()));
        }

        // The count comes from the worker; hits are only allocated as lines arrive.
        let nhits = parse_hit_count(&line)?;
        let mut hits = Vec::new();
        for _ in 0..nhits {
            let Some(data) = lines.next_data() else {
                return Ok(None);
            };
            let data = data?;
            let columns: Vec<&str> = data.split('\t').collect();
            if columns.len() != fields.len() {
                return Err(ParseError::FieldCountMismatch {
                    expected: fields.len(),
                    actual: columns.len(),
                    line: data.to_string(),
                });
            }
            hits.push(Hit::from_columns(fields, &columns));
        }

        let record = ResultRecord {
            id,
            description,
            hits,
        };
        Ok(Some((record, lines.pos)))
    }

    /// Check the bytes left over after a worker closed its output.
    ///
    /// Blank space and the run trailer (`# BLAST processed 3 queries`) are
    /// accepted; anything else is a record the worker never finished.
    pub fn finish(&self, leftover: &[u8]) -> Result<(), ParseError> {
        let mut lines = Lines::new(leftover);
        while let Some(line) = lines.next_trimmed() {
            let is_trailer =
                line.starts_with(&self.header_prefix) && line.contains(TRAILER_MARKER);
            if !line.is_empty() && !is_trailer {
                return Err(ParseError::Truncated {
                    bytes: leftover.len(),
                });
            }
        }
        if leftover[lines.pos..].iter().all(u8::is_ascii_whitespace) {
            Ok(())
        } else {
            Err(ParseError::Truncated {
                bytes: leftover.len(),
            })
        }
    }
}

fn parse_query_line(line: &str) -> Result<(Option<String>, Option<String>), ParseError> {
    let value = match line.strip_prefix(QUERY_PREFIX) {
        Some(v) => v.trim(),
        // "# Query:" with nothing after it is trimmed down to the bare label.
        None if line == QUERY_PREFIX.trim_end() => "",
        None => return Err(ParseError::BadQueryLine(line.to_string())),
    };
    if value.is_empty() {
        return Ok((None, None));
    }
    match value.split_once(char::is_whitespace) {
        Some((id, desc)) => Ok((Some(id.to_string()), Some(desc.trim().to_string()))),
        None => Ok((Some(value.to_string()), None)),
    }
}

fn first_duplicate(fields: &[String]) -> Option<&str> {
    fields
        .iter()
        .enumerate()
        .find(|(i, f)| fields[..*i].contains(*f))
        .map(|(_, f)| f.as_str())
}

fn parse_hit_count(line: &str) -> Result<usize, ParseError> {
    line.strip_prefix("# ")
        .and_then(|s| s.strip_suffix(HITS_SUFFIX))
        .and_then(|n| n.trim().parse().ok())
        .ok_or_else(|| ParseError::BadHitCount(line.to_string()))
}
