//! Query and result record types.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::fmt;

/// One marker-delimited input record, exactly as read from the query stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRecord {
    bytes: Vec<u8>,
}

impl QueryRecord {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Raw bytes of the record, including the marker line.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The marker line without the marker byte and line terminator.
    pub fn header(&self) -> String {
        let end = self
            .bytes
            .iter()
            .position(|&b| b == b'\n')
            .unwrap_or(self.bytes.len());
        let line = self.bytes.get(1..end).unwrap_or_default();
        String::from_utf8_lossy(line).trim_end().to_string()
    }
}

/// A typed hit column value.
///
/// Conversion tries integer, then float, then falls back to the raw string.
/// Parsing uses Rust's locale-independent `str::parse`, so a value that parses
/// as an integer is never stored as a float.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl FieldValue {
    pub fn parse(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            Self::Int(i)
        } else if let Ok(f) = raw.parse::<f64>() {
            Self::Float(f)
        } else {
            Self::Str(raw.to_string())
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value, widening integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Str(s) => f.write_str(s),
        }
    }
}

/// A single hit in the searched database.
///
/// Field names keep their column order; the raw column text is retained so the
/// worker's data line can be reproduced exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    names: Vec<String>,
    raw: Vec<String>,
    values: HashMap<String, FieldValue>,
}

impl Hit {
    /// Build a hit from parallel name/column lists.
    ///
    /// Callers guarantee `names.len() == columns.len()`; extra entries on either
    /// side are ignored.
    pub fn from_columns<S: AsRef<str>>(names: &[S], columns: &[&str]) -> Self {
        let mut hit = Self {
            names: Vec::with_capacity(names.len()),
            raw: Vec::with_capacity(columns.len()),
            values: HashMap::with_capacity(names.len()),
        };
        for (name, col) in names.iter().zip(columns) {
            let name = name.as_ref().to_string();
            hit.values.insert(name.clone(), FieldValue::parse(col));
            hit.names.push(name);
            hit.raw.push((*col).to_string());
        }
        hit
    }

    /// Look up a field. Unknown names yield `None`.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    /// Field names in column order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// `(name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.names
            .iter()
            .filter_map(|n| self.values.get(n).map(|v| (n.as_str(), v)))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The tab-separated data line this hit was parsed from, without terminator.
    pub fn to_line(&self) -> String {
        self.raw.join("\t")
    }
}

impl Serialize for Hit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.names.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// The result of a worker processing a single query.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ResultRecord {
    /// Query identifier, if the worker reported one.
    pub id: Option<String>,
    /// Free-text query description following the identifier.
    pub description: Option<String>,
    /// Hits in the order the worker emitted them.
    pub hits: Vec<Hit>,
}
