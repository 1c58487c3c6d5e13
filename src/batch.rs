//! Batch validation
//!
//! Runs a [`ValidationSession`] over many documents, either one after the
//! other or on a rayon worker pool, and merges every document's accumulator
//! into a shared [`Report`]. Validation of one document never affects another:
//! the report is the only state the workers share, and each document id is
//! written to it once.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{Result, ValidationError};
use crate::input::Document;
use crate::parser::{ParseOptions, ValidatingParser};
use crate::report::Report;
use crate::session::{ValidationOutcome, ValidationSession};

/// How documents are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Execution {
    /// One at a time, in input order, on the calling thread
    #[default]
    Sequential,
    /// On a dedicated worker pool; completion order is unspecified
    Parallel { threads: usize },
}

impl Execution {
    /// Parallel execution sized to the machine
    pub fn parallel() -> Self {
        Execution::Parallel {
            threads: num_cpus::get(),
        }
    }
}

/// Batch configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchConfig {
    pub execution: Execution,
    pub options: ParseOptions,
    /// Keep per-document error details in the report
    pub record_errors: bool,
}

/// A document that could not be validated at all
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
    pub document_id: String,
    pub message: String,
}

/// Result of a batch run
#[derive(Debug)]
pub struct BatchResult {
    pub report: Report,
    /// Invalid documents plus documents that failed to validate at all
    pub failure_count: usize,
    pub documents: usize,
    pub valid_count: usize,
    pub failures: Vec<DocumentFailure>,
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }

    pub fn invalid_count(&self) -> usize {
        self.failure_count - self.failures.len()
    }
}

/// Shared state of one run
struct Collector {
    report: Report,
    failure_count: AtomicUsize,
    valid_count: AtomicUsize,
    failures: Mutex<Vec<DocumentFailure>>,
    record_errors: bool,
}

impl Collector {
    fn new(record_errors: bool) -> Self {
        Self {
            report: Report::new(),
            failure_count: AtomicUsize::new(0),
            valid_count: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
            record_errors,
        }
    }

    fn collect(&self, document_id: &str, result: Result<ValidationOutcome>) {
        match result {
            Ok(outcome) => {
                if outcome.is_valid {
                    self.valid_count.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.failure_count.fetch_add(1, Ordering::Relaxed);
                }
                if self.record_errors {
                    self.report.insert(outcome.document_id, outcome.accumulator);
                }
            }
            Err(e) => {
                log::error!("{} could not be validated: {}", document_id, e);
                self.failure_count.fetch_add(1, Ordering::Relaxed);
                self.failures.lock().push(DocumentFailure {
                    document_id: document_id.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    fn finish(self, documents: usize) -> BatchResult {
        let mut failures = self.failures.into_inner();
        failures.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        BatchResult {
            report: self.report,
            failure_count: self.failure_count.into_inner(),
            documents,
            valid_count: self.valid_count.into_inner(),
            failures,
        }
    }
}

/// Validates sets of documents and assembles the [`Report`]
pub struct BatchCoordinator<P> {
    session: ValidationSession<P>,
    execution: Execution,
}

impl<P: ValidatingParser> BatchCoordinator<P> {
    pub fn new(parser: P, config: BatchConfig) -> Self {
        Self {
            session: ValidationSession::new(parser, config.options, config.record_errors),
            execution: config.execution,
        }
    }

    pub fn session(&self) -> &ValidationSession<P> {
        &self.session
    }

    pub fn execution(&self) -> Execution {
        self.execution
    }

    /// Read and validate one document
    pub fn validate_document(&self, document: &Document) -> Result<ValidationOutcome> {
        let bytes = document.read()?;
        self.session.validate(&bytes, &document.id)
    }

    /// Validate all documents.
    ///
    /// Per-document failures are counted and listed in the result; the only
    /// error returned here is a failure to set up the worker pool.
    pub fn run_batch(&self, documents: &[Document]) -> Result<BatchResult> {
        let collector = Collector::new(self.session.records_errors());

        match self.execution {
            Execution::Sequential => {
                log::debug!("Validating {} documents sequentially", documents.len());
                for document in documents {
                    collector.collect(&document.id, self.validate_document(document));
                }
            }
            Execution::Parallel { threads } => {
                log::debug!(
                    "Validating {} documents on {} threads",
                    documents.len(),
                    threads
                );
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("validate-{}", i))
                    .build()
                    .map_err(|e| ValidationError::ThreadPool(e.to_string()))?;

                pool.install(|| {
                    documents.par_iter().for_each(|document| {
                        collector.collect(&document.id, self.validate_document(document));
                    });
                });
            }
        }

        Ok(collector.finish(documents.len()))
    }
}
