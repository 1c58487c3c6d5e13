mod common;

use common::test_helpers::*;
use i5validator::{
    ErrorKey, LibXml2Parser, ParseMode, ParseOptions, SchemaPreference, Severity,
    ValidationOutcome, ValidationSession,
};
use tempfile::TempDir;

fn validate(xml: &str, id: &str, mode: ParseMode) -> ValidationOutcome {
    ValidationSession::new(
        LibXml2Parser::new(),
        ParseOptions::new(mode, SchemaPreference::Dtd),
        true,
    )
    .validate(xml.as_bytes(), id)
    .unwrap()
}

#[test]
fn test_valid_document_has_no_findings() {
    for mode in [ParseMode::Sax, ParseMode::Dom] {
        let outcome = validate(VALID_DTD_XML, "valid.xml", mode);
        assert!(outcome.is_valid, "{}: {:?}", mode, outcome.accumulator);
        assert!(!outcome.incomplete);
        assert!(outcome.accumulator.is_empty());
    }
}

#[test]
fn test_repeated_violation_aggregates_under_one_key() {
    let outcome = validate(REPEATED_VIOLATION_XML, "repeated.xml", ParseMode::Dom);
    assert!(!outcome.is_valid);

    let key = ErrorKey::new(Severity::Error, "No declaration for element bogus");
    let occurrences = outcome.accumulator.occurrences(&key);
    assert_eq!(occurrences.len(), 3, "{:?}", outcome.accumulator);

    let lines: Vec<u32> = occurrences.iter().filter_map(|o| o.line).collect();
    assert_eq!(lines, vec![7, 8, 9]);
}

#[test]
fn test_repeated_violation_in_streaming_mode() {
    let outcome = validate(REPEATED_VIOLATION_XML, "repeated.xml", ParseMode::Sax);
    assert!(!outcome.is_valid);

    let key = ErrorKey::new(Severity::Error, "No declaration for element bogus");
    assert!(outcome.accumulator.occurrence_count(&key) >= 3);
    assert_eq!(
        outcome
            .accumulator
            .keys()
            .filter(|k| k.message().starts_with("No declaration for element bogus"))
            .count(),
        1
    );
}

#[test]
fn test_not_well_formed_document_is_fatal() {
    for mode in [ParseMode::Sax, ParseMode::Dom] {
        let outcome = validate(NOT_WELL_FORMED_XML, "broken.xml", mode);
        assert!(!outcome.is_valid);
        assert!(outcome.incomplete);
        assert!(
            outcome
                .accumulator
                .keys()
                .any(|k| k.severity() == Severity::FatalError),
            "{}: {:?}",
            mode,
            outcome.accumulator
        );
    }
}

#[test]
fn test_unresolvable_dtd_is_invalid() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(dir.path(), "missing-dtd.xml", MISSING_DTD_XML);
    let id = path.to_string_lossy().into_owned();

    let outcome = validate(MISSING_DTD_XML, &id, ParseMode::Dom);
    assert!(!outcome.is_valid);
    assert!(outcome.accumulator.has_errors());
}

#[test]
fn test_unresolved_external_entity_is_invalid() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(dir.path(), "entity.xml", UNRESOLVED_ENTITY_XML);
    let id = path.to_string_lossy().into_owned();

    for mode in [ParseMode::Sax, ParseMode::Dom] {
        let outcome = validate(UNRESOLVED_ENTITY_XML, &id, mode);
        assert!(!outcome.is_valid, "{}: {:?}", mode, outcome.accumulator);
        assert!(outcome.accumulator.has_errors());
        assert!(
            outcome
                .accumulator
                .keys()
                .all(|k| k.severity() != Severity::Warning || !k.message().contains("load")),
            "{}: {:?}",
            mode,
            outcome.accumulator
        );
    }
}

#[test]
fn test_streaming_mode_checks_declared_schema_alongside_dtd() {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path(), "simple.xsd", SIMPLE_XSD);
    let path = write_fixture(dir.path(), "invalid.xml", XSD_INVALID_XML);
    let id = path.to_string_lossy().into_owned();

    let schema_finding = |outcome: &ValidationOutcome| {
        outcome
            .accumulator
            .keys()
            .any(|k| k.message().contains("Element 'other'"))
    };

    let streaming = validate(XSD_INVALID_XML, &id, ParseMode::Sax);
    assert!(!streaming.is_valid);
    assert!(schema_finding(&streaming), "{:?}", streaming.accumulator);

    let tree = validate(XSD_INVALID_XML, &id, ParseMode::Dom);
    assert!(!tree.is_valid);
    assert!(!schema_finding(&tree), "{:?}", tree.accumulator);
}

#[test]
fn test_recording_disabled_still_decides_validity() {
    let outcome = ValidationSession::new(LibXml2Parser::new(), ParseOptions::default(), false)
        .validate(REPEATED_VIOLATION_XML.as_bytes(), "repeated.xml")
        .unwrap();
    assert!(!outcome.is_valid);
    assert!(outcome.accumulator.is_empty());
}

#[test]
fn test_xsd_validation_with_relative_schema_location() {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path(), "simple.xsd", SIMPLE_XSD);
    let valid = write_fixture(dir.path(), "valid.xml", XSD_VALID_XML);
    let invalid = write_fixture(dir.path(), "invalid.xml", XSD_INVALID_XML);

    for mode in [ParseMode::Dom, ParseMode::Sax] {
        let session = ValidationSession::new(
            LibXml2Parser::new(),
            ParseOptions::new(mode, SchemaPreference::Xsd),
            true,
        );

        let outcome = session
            .validate(XSD_VALID_XML.as_bytes(), &valid.to_string_lossy())
            .unwrap();
        assert!(outcome.is_valid, "{}: {:?}", mode, outcome.accumulator);

        let outcome = session
            .validate(XSD_INVALID_XML.as_bytes(), &invalid.to_string_lossy())
            .unwrap();
        assert!(!outcome.is_valid);
        assert!(outcome.accumulator.has_errors());

        assert_eq!(session.parser().cached_schemas(), 1);
    }
}

#[test]
fn test_xsd_mode_without_schema_location_is_invalid() {
    let session = ValidationSession::new(
        LibXml2Parser::new(),
        ParseOptions::new(ParseMode::Dom, SchemaPreference::Xsd),
        true,
    );
    let outcome = session
        .validate(b"<?xml version=\"1.0\"?>\n<root/>\n", "plain.xml")
        .unwrap();

    assert!(!outcome.is_valid);
    assert!(
        outcome
            .accumulator
            .keys()
            .any(|k| k.message().starts_with("no XML Schema location"))
    );
}

#[test]
fn test_unloadable_schema_is_reported_once_per_document() {
    let dir = TempDir::new().unwrap();
    let doc = write_fixture(dir.path(), "orphan.xml", XSD_VALID_XML);
    let id = doc.to_string_lossy().into_owned();

    let session = ValidationSession::new(
        LibXml2Parser::new(),
        ParseOptions::new(ParseMode::Dom, SchemaPreference::Xsd),
        true,
    );

    for _ in 0..2 {
        let outcome = session.validate(XSD_VALID_XML.as_bytes(), &id).unwrap();
        assert!(!outcome.is_valid);
        let failed: Vec<&ErrorKey> = outcome
            .accumulator
            .keys()
            .filter(|k| k.message().starts_with("failed to load XML Schema"))
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(outcome.accumulator.occurrence_count(failed[0]), 1);
    }
}
