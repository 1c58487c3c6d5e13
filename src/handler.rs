//! Listener interface between a validating parser and the error accumulator.

use crate::report::{ErrorAccumulator, Occurrence, Severity, normalize};

/// A single diagnostic delivered by the parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEvent {
    pub message: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl ParseEvent {
    pub fn new(message: impl Into<String>, line: Option<u32>, column: Option<u32>) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }

    /// An event without position information
    pub fn unpositioned(message: impl Into<String>) -> Self {
        Self::new(message, None, None)
    }

    pub fn occurrence(&self) -> Occurrence {
        Occurrence::new(self.line, self.column)
    }
}

/// Receives the three kinds of parser diagnostics.
///
/// Implementations must not panic: the parser may call them from inside a C callback.
pub trait ErrorHandler {
    fn warning(&mut self, event: ParseEvent);
    fn error(&mut self, event: ParseEvent);
    fn fatal_error(&mut self, event: ParseEvent);

    fn report(&mut self, severity: Severity, event: ParseEvent) {
        match severity {
            Severity::Warning => self.warning(event),
            Severity::Error => self.error(event),
            Severity::FatalError => self.fatal_error(event),
        }
    }
}

/// Handler that logs every event, tracks validity and records normalized keys.
pub struct CollectingHandler<'a> {
    document_id: &'a str,
    accumulator: ErrorAccumulator,
    is_valid: bool,
    saw_fatal: bool,
}

impl<'a> CollectingHandler<'a> {
    pub fn new(document_id: &'a str, record_errors: bool) -> Self {
        Self {
            document_id,
            accumulator: if record_errors {
                ErrorAccumulator::new()
            } else {
                ErrorAccumulator::disabled()
            },
            is_valid: true,
            saw_fatal: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn saw_fatal(&self) -> bool {
        self.saw_fatal
    }

    pub fn accumulator(&self) -> &ErrorAccumulator {
        &self.accumulator
    }

    pub fn into_accumulator(self) -> ErrorAccumulator {
        self.accumulator
    }

    fn add(&mut self, severity: Severity, event: ParseEvent) {
        let occurrence = event.occurrence();
        let key = normalize(severity, &event.message);
        log::error!(
            "{} at {} {} {}",
            self.document_id,
            occurrence,
            severity,
            key.message()
        );
        self.accumulator.record(key, occurrence);
    }
}

impl ErrorHandler for CollectingHandler<'_> {
    fn warning(&mut self, event: ParseEvent) {
        self.add(Severity::Warning, event);
    }

    fn error(&mut self, event: ParseEvent) {
        self.add(Severity::Error, event);
        self.is_valid = false;
    }

    fn fatal_error(&mut self, event: ParseEvent) {
        self.add(Severity::FatalError, event);
        self.is_valid = false;
        self.saw_fatal = true;
    }
}
