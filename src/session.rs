//! Validation of a single document.

use serde::Serialize;

use crate::error::Result;
use crate::handler::{CollectingHandler, ErrorHandler, ParseEvent};
use crate::parser::{ParseOptions, ParseStatus, SchemaPreference, ValidatingParser};
use crate::report::ErrorAccumulator;

/// Result of validating one document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub document_id: String,
    pub is_valid: bool,
    /// The parse stopped on a fatal error; `accumulator` may not hold every error.
    pub incomplete: bool,
    pub accumulator: ErrorAccumulator,
}

/// Runs a [`ValidatingParser`] over one document and reduces its diagnostics
/// to a [`ValidationOutcome`].
///
/// The session holds no per-document state: every call to [`validate`](Self::validate)
/// builds its own handler and accumulator, so one session can serve many
/// documents concurrently.
pub struct ValidationSession<P> {
    parser: P,
    options: ParseOptions,
    record_errors: bool,
}

impl<P: ValidatingParser> ValidationSession<P> {
    pub fn new(parser: P, options: ParseOptions, record_errors: bool) -> Self {
        Self {
            parser,
            options,
            record_errors,
        }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn records_errors(&self) -> bool {
        self.record_errors
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    /// Validate one document.
    ///
    /// Validation findings never produce an `Err`; they are recorded in the
    /// outcome. An `Err` means the document could not be validated at all.
    pub fn validate(&self, document: &[u8], document_id: &str) -> Result<ValidationOutcome> {
        log::info!(
            "Validating {} using {}{}",
            document_id,
            self.options.mode,
            if self.options.schema == SchemaPreference::Xsd {
                " and XSD from xsi:schemaLocation"
            } else {
                ""
            }
        );

        let mut handler = CollectingHandler::new(document_id, self.record_errors);
        let status = self
            .parser
            .parse(document, document_id, &self.options, &mut handler)?;

        if status == ParseStatus::Aborted && !handler.saw_fatal() {
            handler.fatal_error(ParseEvent::unpositioned(
                "parsing stopped before the end of the document",
            ));
        }

        let incomplete = handler.saw_fatal();
        if incomplete {
            log::error!(
                "{} fatally invalid / not well-formed - error list may not be complete",
                document_id
            );
        }

        let is_valid = handler.is_valid();
        if is_valid {
            log::info!("Document {} validated", document_id);
        } else {
            log::info!("Document {} did not validate", document_id);
        }

        Ok(ValidationOutcome {
            document_id: document_id.to_string(),
            is_valid,
            incomplete,
            accumulator: handler.into_accumulator(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::parser::ParseMode;
    use crate::report::{ErrorKey, Occurrence, Severity};

    /// Replays a fixed list of events regardless of the input
    struct Replay {
        events: Vec<(Severity, ParseEvent)>,
        status: ParseStatus,
    }

    impl Replay {
        fn new(events: Vec<(Severity, ParseEvent)>) -> Self {
            Self {
                events,
                status: ParseStatus::Completed,
            }
        }
    }

    impl ValidatingParser for Replay {
        fn parse(
            &self,
            _document: &[u8],
            _document_id: &str,
            _options: &ParseOptions,
            handler: &mut dyn ErrorHandler,
        ) -> Result<ParseStatus> {
            for (severity, event) in &self.events {
                handler.report(*severity, event.clone());
            }
            Ok(self.status)
        }
    }

    struct Broken;

    impl ValidatingParser for Broken {
        fn parse(
            &self,
            _document: &[u8],
            _document_id: &str,
            _options: &ParseOptions,
            _handler: &mut dyn ErrorHandler,
        ) -> Result<ParseStatus> {
            Err(ValidationError::ParserConfiguration {
                details: "no parser available".to_string(),
            })
        }
    }

    fn session(parser: Replay, record: bool) -> ValidationSession<Replay> {
        ValidationSession::new(parser, ParseOptions::default(), record)
    }

    #[test]
    fn test_no_events_is_valid() {
        let outcome = session(Replay::new(vec![]), true)
            .validate(b"<a/>", "a.xml")
            .unwrap();
        assert!(outcome.is_valid);
        assert!(!outcome.incomplete);
        assert!(outcome.accumulator.is_empty());
        assert_eq!(outcome.document_id, "a.xml");
    }

    #[test]
    fn test_warnings_alone_keep_valid() {
        let events = vec![
            (Severity::Warning, ParseEvent::new("w1", Some(1), Some(1))),
            (Severity::Warning, ParseEvent::new("w2", Some(2), None)),
        ];
        let outcome = session(Replay::new(events), true)
            .validate(b"", "w.xml")
            .unwrap();
        assert!(outcome.is_valid);
        assert_eq!(outcome.accumulator.len(), 2);
    }

    #[test]
    fn test_repeated_error_aggregates_in_order() {
        let events = vec![
            (Severity::Warning, ParseEvent::new("w", Some(1), Some(1))),
            (Severity::Error, ParseEvent::new("No declaration for element x", Some(4), Some(2))),
            (Severity::Error, ParseEvent::new("No declaration for element x", Some(8), Some(5))),
            (Severity::Error, ParseEvent::new("No declaration for element x", Some(9), None)),
        ];
        let outcome = session(Replay::new(events), true)
            .validate(b"", "b.xml")
            .unwrap();

        assert!(!outcome.is_valid);
        let key = ErrorKey::new(Severity::Error, "No declaration for element x");
        assert_eq!(
            outcome.accumulator.occurrences(&key),
            &[
                Occurrence::at(4, 2),
                Occurrence::at(8, 5),
                Occurrence::new(Some(9), None)
            ]
        );
    }

    #[test]
    fn test_fatal_error_marks_incomplete() {
        let events = vec![(
            Severity::FatalError,
            ParseEvent::new("Opening and ending tag mismatch", Some(3), Some(9)),
        )];
        let outcome = session(Replay::new(events), true)
            .validate(b"", "c.xml")
            .unwrap();
        assert!(!outcome.is_valid);
        assert!(outcome.incomplete);
        assert!(
            outcome
                .accumulator
                .keys()
                .any(|k| k.severity() == Severity::FatalError)
        );
    }

    #[test]
    fn test_aborted_parse_is_invalid_and_incomplete() {
        let mut parser = Replay::new(vec![]);
        parser.status = ParseStatus::Aborted;
        let outcome = session(parser, true).validate(b"", "d.xml").unwrap();
        assert!(!outcome.is_valid);
        assert!(outcome.incomplete);
        let key = ErrorKey::new(
            Severity::FatalError,
            "parsing stopped before the end of the document",
        );
        assert_eq!(outcome.accumulator.occurrence_count(&key), 1);
    }

    #[test]
    fn test_recording_disabled_keeps_validity() {
        let events = vec![(Severity::Error, ParseEvent::unpositioned("bad"))];
        let outcome = session(Replay::new(events), false)
            .validate(b"", "e.xml")
            .unwrap();
        assert!(!outcome.is_valid);
        assert!(outcome.accumulator.is_empty());
        assert!(!outcome.accumulator.is_enabled());
    }

    #[test]
    fn test_not_allowed_anywhere_messages_collapse() {
        let events = vec![
            (
                Severity::Error,
                ParseEvent::new("Element \"x\" not allowed anywhere; expected a", Some(1), Some(1)),
            ),
            (
                Severity::Error,
                ParseEvent::new("Element \"x\" not allowed anywhere; expected b", Some(2), Some(1)),
            ),
        ];
        let outcome = session(Replay::new(events), true)
            .validate(b"", "f.xml")
            .unwrap();
        let key = ErrorKey::new(Severity::Error, "Element \"x\" not allowed anywhere");
        assert_eq!(outcome.accumulator.len(), 1);
        assert_eq!(outcome.accumulator.occurrence_count(&key), 2);
    }

    #[test]
    fn test_parser_failure_propagates() {
        let session = ValidationSession::new(
            Broken,
            ParseOptions::new(ParseMode::Dom, SchemaPreference::Xsd),
            true,
        );
        let result = session.validate(b"<a/>", "g.xml");
        assert!(matches!(
            result,
            Err(ValidationError::ParserConfiguration { .. })
        ));
    }
}
