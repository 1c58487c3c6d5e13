//! The validating-parser capability the validation session drives.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::handler::ErrorHandler;

/// Cached regex for xsi:schemaLocation extraction
static SCHEMA_LOCATION_REGEX: OnceLock<Regex> = OnceLock::new();

/// Cached regex for xsi:noNamespaceSchemaLocation extraction
static NO_NAMESPACE_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_schema_location_regex() -> &'static Regex {
    SCHEMA_LOCATION_REGEX.get_or_init(|| {
        Regex::new(r#"xsi:schemaLocation\s*=\s*["']\s*[^"'\s]+\s+([^"'\s]+)"#)
            .expect("Failed to compile schemaLocation regex")
    })
}

fn get_no_namespace_regex() -> &'static Regex {
    NO_NAMESPACE_REGEX.get_or_init(|| {
        Regex::new(r#"xsi:noNamespaceSchemaLocation\s*=\s*["']\s*([^"'\s]+)"#)
            .expect("Failed to compile noNamespaceSchemaLocation regex")
    })
}

/// How the document is walked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// Streaming: events are produced while reading, no tree is built
    #[default]
    Sax,
    /// A full tree is built, then validated
    Dom,
}

impl fmt::Display for ParseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseMode::Sax => f.write_str("SAX"),
            ParseMode::Dom => f.write_str("DOM"),
        }
    }
}

/// Which grammar declared in the document is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaPreference {
    /// Internal or external DTD from the DOCTYPE declaration
    #[default]
    Dtd,
    /// XML Schema referenced by xsi:schemaLocation or xsi:noNamespaceSchemaLocation
    Xsd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParseOptions {
    pub mode: ParseMode,
    pub schema: SchemaPreference,
}

impl ParseOptions {
    pub fn new(mode: ParseMode, schema: SchemaPreference) -> Self {
        Self { mode, schema }
    }
}

/// How a parse ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// The whole input was consumed
    Completed,
    /// The parser stopped early; the reported events may be incomplete
    Aborted,
}

/// A grammar-validating XML parser.
///
/// The parser must keep going after recoverable validity errors and deliver
/// every diagnostic to `handler`. An `Err` is reserved for failures to run the
/// parse at all (context creation, unusable input); problems with the document
/// itself are reported through the handler.
pub trait ValidatingParser: Send + Sync {
    fn parse(
        &self,
        document: &[u8],
        document_id: &str,
        options: &ParseOptions,
        handler: &mut dyn ErrorHandler,
    ) -> Result<ParseStatus>;
}

impl<P: ValidatingParser + ?Sized> ValidatingParser for &P {
    fn parse(
        &self,
        document: &[u8],
        document_id: &str,
        options: &ParseOptions,
        handler: &mut dyn ErrorHandler,
    ) -> Result<ParseStatus> {
        (**self).parse(document, document_id, options, handler)
    }
}

impl<P: ValidatingParser + ?Sized> ValidatingParser for Box<P> {
    fn parse(
        &self,
        document: &[u8],
        document_id: &str,
        options: &ParseOptions,
        handler: &mut dyn ErrorHandler,
    ) -> Result<ParseStatus> {
        (**self).parse(document, document_id, options, handler)
    }
}

/// Find the XML Schema location declared on the root element of a document.
///
/// `xsi:schemaLocation` wins over `xsi:noNamespaceSchemaLocation`; for the
/// former only the location of the first namespace/location pair is used.
pub fn extract_schema_location(document: &[u8]) -> Option<String> {
    let tag = root_start_tag(document)?;
    get_schema_location_regex()
        .captures(tag)
        .or_else(|| get_no_namespace_regex().captures(tag))
        .map(|caps| String::from_utf8_lossy(&caps[1]).into_owned())
}

/// The start tag of the root element, skipping the prolog.
///
/// An unterminated start tag runs to the end of the input.
fn root_start_tag(document: &[u8]) -> Option<&[u8]> {
    let mut rest = document.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(document);
    loop {
        let start = rest.iter().position(|b| !b.is_ascii_whitespace())?;
        rest = &rest[start..];
        if rest.starts_with(b"<?") {
            rest = skip_past(&rest[2..], b"?>")?;
        } else if rest.starts_with(b"<!--") {
            rest = skip_past(&rest[4..], b"-->")?;
        } else if rest.starts_with(b"<!") {
            rest = skip_declaration(rest)?;
        } else if rest.starts_with(b"<") {
            let end = start_tag_end(rest).unwrap_or(rest.len());
            return Some(&rest[..end]);
        } else {
            return None;
        }
    }
}

fn skip_past<'a>(input: &'a [u8], terminator: &[u8]) -> Option<&'a [u8]> {
    input
        .windows(terminator.len())
        .position(|window| window == terminator)
        .map(|at| &input[at + terminator.len()..])
}

/// Skip a `<!DOCTYPE ...>` declaration including its internal subset.
fn skip_declaration(input: &[u8]) -> Option<&[u8]> {
    let mut depth = 0usize;
    let mut quote = None;
    let mut i = 2;
    while i < input.len() {
        let b = input[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'[' => depth += 1,
                b']' => depth = depth.saturating_sub(1),
                b'<' if input[i..].starts_with(b"<!--") => {
                    let rest = skip_past(&input[i + 4..], b"-->")?;
                    i = input.len() - rest.len();
                    continue;
                }
                b'>' if depth == 0 => return Some(&input[i + 1..]),
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Index just past the `>` closing a start tag, ignoring `>` in attribute values.
fn start_tag_end(tag: &[u8]) -> Option<usize> {
    let mut quote = None;
    for (i, &b) in tag.iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => return Some(i + 1),
                _ => {}
            },
        }
    }
    None
}

/// Resolve a schema location relative to the directory of the document id.
///
/// URLs and absolute paths are returned unchanged.
pub fn resolve_schema_location(location: &str, document_id: &str) -> String {
    if location.contains("://") || Path::new(location).is_absolute() {
        return location.to_string();
    }

    match Path::new(document_id).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(location).to_string_lossy().into_owned(),
        _ => location.to_string(),
    }
}
