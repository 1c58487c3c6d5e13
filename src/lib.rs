//! # i5validator Library
//!
//! Validates XML documents against the DTD or XML Schema they declare and
//! aggregates every validation finding per document, keyed by normalized
//! message, into a report that can be written as JSON.
//!
//! The pieces, bottom-up:
//!
//! - [`report`]: severities, normalized error keys, occurrences, the
//!   per-document [`ErrorAccumulator`] and the shared [`Report`]
//! - [`handler`]: the [`ErrorHandler`] callback surface a parser reports into
//! - [`parser`]: the [`ValidatingParser`] capability and its options
//! - [`libxml2`]: the libxml2-backed parser
//! - [`session`]: validation of one document
//! - [`batch`]: sequential or parallel validation of many documents

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod handler;
pub mod input;
pub mod libxml2;
pub mod output;
pub mod parser;
pub mod report;
pub mod session;

pub use batch::{BatchConfig, BatchCoordinator, BatchResult, DocumentFailure, Execution};
pub use cli::Cli;
pub use config::{Config, ConfigError, ConfigManager, VerbosityLevel};
pub use error::ValidationError;
pub use handler::{CollectingHandler, ErrorHandler, ParseEvent};
pub use input::{Compression, Document, DocumentSource};
pub use libxml2::LibXml2Parser;
pub use output::Output;
pub use parser::{ParseMode, ParseOptions, ParseStatus, SchemaPreference, ValidatingParser};
pub use report::{ErrorAccumulator, ErrorKey, Occurrence, Report, Severity, normalize};
pub use session::{ValidationOutcome, ValidationSession};
