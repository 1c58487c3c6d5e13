//! Error aggregation
//!
//! Everything the parser reports about a document is reduced here: messages are
//! normalized into [`ErrorKey`]s, each key keeps the ordered list of positions
//! where it was observed, and a [`Report`] collects one [`ErrorAccumulator`] per
//! document of a batch.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::error::{Result, ValidationError};

/// Cached regex recognising messages about completely disallowed elements
static NOT_ALLOWED_ANYWHERE_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_not_allowed_anywhere_regex() -> &'static Regex {
    NOT_ALLOWED_ANYWHERE_REGEX.get_or_init(|| {
        Regex::new(r"^(.*?not allowed anywhere)\p{P}")
            .expect("Failed to compile not-allowed-anywhere regex")
    })
}

/// Severity of a parser event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
    FatalError,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::FatalError => "FATAL_ERROR",
        }
    }

    /// Whether an event of this severity makes the document invalid
    pub fn invalidates(&self) -> bool {
        !matches!(self, Severity::Warning)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed error key: {0}")]
pub struct ErrorKeyParseError(String);

impl FromStr for Severity {
    type Err = ErrorKeyParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "WARNING" => Ok(Severity::Warning),
            "ERROR" => Ok(Severity::Error),
            "FATAL_ERROR" => Ok(Severity::FatalError),
            other => Err(ErrorKeyParseError(other.to_string())),
        }
    }
}

/// The unit of aggregation: a severity plus a normalized message.
///
/// Rendered as `[SEVERITY] message`, which is also its serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorKey {
    severity: Severity,
    message: String,
}

impl ErrorKey {
    /// Build a key from an already normalized message. Use [`normalize`] for raw parser output.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ErrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}

impl FromStr for ErrorKey {
    type Err = ErrorKeyParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (severity, message) = s
            .strip_prefix('[')
            .and_then(|rest| rest.split_once("] "))
            .ok_or_else(|| ErrorKeyParseError(s.to_string()))?;

        Ok(ErrorKey::new(severity.parse()?, message))
    }
}

impl Serialize for ErrorKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ErrorKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Normalize a raw parser message into an [`ErrorKey`].
///
/// Messages of the form `... not allowed anywhere<punctuation>...` are cut
/// right before the punctuation, so that the many variants differing only in
/// their trailing detail collapse into one key. Any other message is kept as is.
pub fn normalize(severity: Severity, raw_message: &str) -> ErrorKey {
    let message = match get_not_allowed_anywhere_regex().captures(raw_message) {
        Some(caps) => caps[1].to_string(),
        None => raw_message.to_string(),
    };
    ErrorKey::new(severity, message)
}

/// A position at which an error was observed. `None` means the parser gave no position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Occurrence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(rename = "col", default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl Occurrence {
    pub fn new(line: Option<u32>, column: Option<u32>) -> Self {
        Self { line, column }
    }

    pub fn at(line: u32, column: u32) -> Self {
        Self::new(Some(line), Some(column))
    }
}

impl fmt::Display for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}", line)?,
            None => f.write_str("?")?,
        }
        match self.column {
            Some(column) => write!(f, ":{}", column),
            None => f.write_str(":?"),
        }
    }
}

/// Per-document mapping from [`ErrorKey`] to the positions where it was seen.
///
/// Keys iterate in sorted order; the occurrences of one key stay in the order
/// they were recorded. A disabled accumulator drops everything it is given.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorAccumulator {
    entries: BTreeMap<ErrorKey, Vec<Occurrence>>,
    enabled: bool,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            enabled: true,
        }
    }

    /// An accumulator that skips recording, for runs that only need pass/fail.
    pub fn disabled() -> Self {
        Self {
            entries: BTreeMap::new(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, key: ErrorKey, occurrence: Occurrence) {
        if !self.enabled {
            return;
        }
        self.entries.entry(key).or_default().push(occurrence);
    }

    pub fn occurrence_count(&self, key: &ErrorKey) -> usize {
        self.entries.get(key).map_or(0, Vec::len)
    }

    pub fn occurrences(&self, key: &ErrorKey) -> &[Occurrence] {
        self.entries.get(key).map_or(&[], Vec::as_slice)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&ErrorKey, &[Occurrence])> {
        self.entries.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &ErrorKey> {
        self.entries.keys()
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_occurrences(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Whether any recorded key has a severity that invalidates the document
    pub fn has_errors(&self) -> bool {
        self.entries.keys().any(|k| k.severity().invalidates())
    }
}

impl Default for ErrorAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct ErrorInfoRef<'a> {
    occurrences: &'a [Occurrence],
}

#[derive(Deserialize)]
struct ErrorInfo {
    occurrences: Vec<Occurrence>,
}

impl Serialize for ErrorAccumulator {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.entries
                .iter()
                .map(|(key, occurrences)| (key, ErrorInfoRef { occurrences })),
        )
    }
}

impl<'de> Deserialize<'de> for ErrorAccumulator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = BTreeMap::<ErrorKey, ErrorInfo>::deserialize(deserializer)?;
        Ok(Self {
            entries: raw
                .into_iter()
                .map(|(key, info)| (key, info.occurrences))
                .collect(),
            enabled: true,
        })
    }
}

/// Batch-wide mapping from document id to that document's [`ErrorAccumulator`].
///
/// Safe for concurrent insertion; each document id is written at most once.
#[derive(Debug, Default)]
pub struct Report {
    documents: RwLock<BTreeMap<String, ErrorAccumulator>>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the accumulator of a finished document.
    ///
    /// Returns `false` and keeps the existing entry if the id was already present.
    pub fn insert(&self, document_id: impl Into<String>, accumulator: ErrorAccumulator) -> bool {
        let document_id = document_id.into();
        let mut documents = self.documents.write();
        if documents.contains_key(&document_id) {
            log::warn!(
                "{} already present in the report, keeping the first result",
                document_id
            );
            return false;
        }
        documents.insert(document_id, accumulator);
        true
    }

    pub fn get(&self, document_id: &str) -> Option<ErrorAccumulator> {
        self.documents.read().get(document_id).cloned()
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.documents.read().contains_key(document_id)
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    pub fn document_ids(&self) -> Vec<String> {
        self.documents.read().keys().cloned().collect()
    }

    pub fn snapshot(&self) -> BTreeMap<String, ErrorAccumulator> {
        self.documents.read().clone()
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        log::info!("number of checked files: {}", self.len());

        let to_report_error = |source| ValidationError::ReportWrite {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(to_report_error)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n").map_err(to_report_error)?;
        writer.flush().map_err(to_report_error)?;
        Ok(())
    }
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let documents = self.documents.read();
        serializer.collect_map(documents.iter())
    }
}

impl<'de> Deserialize<'de> for Report {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let documents = BTreeMap::<String, ErrorAccumulator>::deserialize(deserializer)?;
        Ok(Self {
            documents: RwLock::new(documents),
        })
    }
}
