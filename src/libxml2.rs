//! LibXML2 FFI Wrapper Module
//!
//! Provides a [`ValidatingParser`] backed by libxml2, called through direct FFI.
//!
//! ## Modes
//!
//! - **DOM**: `xmlCtxtReadMemory` builds the tree (validating against the DTD
//!   while parsing), XIncludes are processed, then the tree is optionally
//!   validated against the XML Schema with `xmlSchemaValidateDoc`.
//! - **SAX**: an `xmlTextReader` streams through the document without keeping
//!   the tree, validating against the DTD and, when the document declares one,
//!   the XML Schema set on the reader.
//!
//! Both modes parse with recovery enabled so that validation continues after
//! errors and the complete set of diagnostics reaches the handler.
//!
//! ## Thread Safety
//!
//! - Initialization happens exactly once (`std::sync::Once`).
//! - Every parse owns its parser context / reader, so documents validate in parallel.
//! - Schema *parsing* is not thread-safe in libxml2: schemas are parsed under a
//!   mutex and cached; the parsed schema is then shared read-only (Arc-wrapped)
//!   by all validations, which libxml2 allows.
//! - Diagnostics outside a parser context (entity and schema loading) go to
//!   libxml2's structured error handler, which is per-thread state; it is
//!   installed for the duration of one parse by an RAII guard.
//! - I/O warnings (an entity, DTD or schema that cannot be loaded) are
//!   reported as errors.

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::ptr;
use std::sync::{Arc, Once, OnceLock};

use libc::{c_char, c_int, c_void};
use parking_lot::Mutex;

use crate::error::{LibXml2Error, Result, ValidationError};
use crate::handler::{ErrorHandler, ParseEvent};
use crate::report::Severity;
use crate::parser::{
    ParseMode, ParseOptions, ParseStatus, SchemaPreference, ValidatingParser,
    extract_schema_location, resolve_schema_location,
};

/// Global initialization flag for libxml2
static LIBXML2_INIT: Once = Once::new();

/// The loader libxml2 had before ours was installed; every entity load is forwarded to it.
static DEFAULT_ENTITY_LOADER: OnceLock<XmlExternalEntityLoader> = OnceLock::new();

// xmlParserOption
const XML_PARSE_RECOVER: c_int = 1 << 0;
const XML_PARSE_NOENT: c_int = 1 << 1;
const XML_PARSE_DTDLOAD: c_int = 1 << 2;
const XML_PARSE_DTDATTR: c_int = 1 << 3;
const XML_PARSE_DTDVALID: c_int = 1 << 4;
const XML_PARSE_XINCLUDE: c_int = 1 << 10;
const XML_PARSE_HUGE: c_int = 1 << 19;
const XML_PARSE_BIG_LINES: c_int = 1 << 22;

// xmlErrorLevel
const XML_ERR_WARNING: c_int = 1;
const XML_ERR_ERROR: c_int = 2;
const XML_ERR_FATAL: c_int = 3;

// xmlErrorDomain
const XML_FROM_IO: c_int = 8;

/// ## Opaque libxml2 structures
#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlParserInput {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlTextReader {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *const XmlError)>;

pub type XmlExternalEntityLoader = Option<
    unsafe extern "C" fn(
        url: *const c_char,
        id: *const c_char,
        ctxt: *mut XmlParserCtxt,
    ) -> *mut XmlParserInput,
>;

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();

    pub fn xmlGetExternalEntityLoader() -> XmlExternalEntityLoader;
    pub fn xmlSetExternalEntityLoader(f: XmlExternalEntityLoader);
    pub fn xmlSetStructuredErrorFunc(ctx: *mut c_void, handler: XmlStructuredErrorFunc);

    // Tree (DOM) parsing
    pub fn xmlNewParserCtxt() -> *mut XmlParserCtxt;
    pub fn xmlFreeParserCtxt(ctxt: *mut XmlParserCtxt);
    pub fn xmlCtxtReadMemory(
        ctxt: *mut XmlParserCtxt,
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);
    pub fn xmlXIncludeProcessFlags(doc: *mut XmlDoc, flags: c_int) -> c_int;

    // Streaming (SAX-style) parsing
    pub fn xmlReaderForMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlTextReader;
    pub fn xmlTextReaderSetStructuredErrorHandler(
        reader: *mut XmlTextReader,
        f: XmlStructuredErrorFunc,
        arg: *mut c_void,
    );
    pub fn xmlTextReaderSetSchema(reader: *mut XmlTextReader, schema: *mut XmlSchema) -> c_int;
    pub fn xmlTextReaderRead(reader: *mut XmlTextReader) -> c_int;
    pub fn xmlFreeTextReader(reader: *mut XmlTextReader);

    // Schema parsing functions
    pub fn xmlSchemaNewParserCtxt(url: *const c_char) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaSetParserStructuredErrors(
        ctxt: *mut XmlSchemaParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaParse(ctxt: *mut XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);

    // Schema validation functions
    pub fn xmlSchemaNewValidCtxt(schema: *mut XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaValidateDoc(ctxt: *mut XmlSchemaValidCtxt, doc: *mut XmlDoc) -> c_int;
}

fn lossy(s: *const c_char) -> String {
    if s.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned()
    }
}

/// libxml2 uses 0 for "unknown position"
fn position(value: c_int) -> Option<u32> {
    u32::try_from(value).ok().filter(|&v| v > 0)
}

type HandlerSlot<'a> = &'a mut dyn ErrorHandler;

fn user_data(slot: &mut HandlerSlot<'_>) -> *mut c_void {
    slot as *mut HandlerSlot<'_> as *mut c_void
}

/// Callback for libxml2 to report diagnostics (structured)
unsafe extern "C" fn structured_error_callback(user_data: *mut c_void, error: *const XmlError) {
    if user_data.is_null() || error.is_null() {
        return;
    }
    let handler = unsafe { &mut *(user_data as *mut HandlerSlot<'_>) };
    let error = unsafe { &*error };

    let message = lossy(error.message).trim_end().to_string();
    let event = ParseEvent::new(message, position(error.line), position(error.int2));

    match error.level {
        // An entity, DTD or schema that cannot be loaded leaves the document
        // unchecked; libxml2 only warns about it.
        XML_ERR_WARNING if error.domain == XML_FROM_IO => handler.error(event),
        XML_ERR_WARNING => handler.warning(event),
        XML_ERR_ERROR => handler.error(event),
        XML_ERR_FATAL => handler.fatal_error(event),
        _ => {}
    }
}

/// Logs every external entity (including external DTD subsets) and forwards to the default loader
unsafe extern "C" fn logging_entity_loader(
    url: *const c_char,
    id: *const c_char,
    ctxt: *mut XmlParserCtxt,
) -> *mut XmlParserInput {
    log::info!(
        "LOADING ENTITY public: '{}' system: '{}'",
        lossy(id),
        lossy(url)
    );

    match DEFAULT_ENTITY_LOADER.get().copied().flatten() {
        Some(loader) => unsafe { loader(url, id, ctxt) },
        None => ptr::null_mut(),
    }
}

/// Installs the per-thread structured error handler for the lifetime of the guard
struct StructuredErrorGuard {
    _not_send: PhantomData<*mut ()>,
}

impl StructuredErrorGuard {
    fn install(user_data: *mut c_void) -> Self {
        unsafe { xmlSetStructuredErrorFunc(user_data, Some(structured_error_callback)) };
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for StructuredErrorGuard {
    fn drop(&mut self) {
        unsafe { xmlSetStructuredErrorFunc(ptr::null_mut(), None) };
    }
}

struct ParserContext(*mut XmlParserCtxt);

impl ParserContext {
    fn new() -> std::result::Result<Self, LibXml2Error> {
        let ctxt = unsafe { xmlNewParserCtxt() };
        if ctxt.is_null() {
            return Err(LibXml2Error::ParserContextCreationFailed);
        }
        Ok(Self(ctxt))
    }
}

impl Drop for ParserContext {
    fn drop(&mut self) {
        unsafe { xmlFreeParserCtxt(self.0) };
    }
}

struct DocPtr(*mut XmlDoc);

impl Drop for DocPtr {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { xmlFreeDoc(self.0) };
        }
    }
}

struct TextReader(*mut XmlTextReader);

impl Drop for TextReader {
    fn drop(&mut self) {
        unsafe { xmlFreeTextReader(self.0) };
    }
}

/// Thread-safe wrapper for a parsed libxml2 schema, freed when the last clone is dropped
#[derive(Debug, Clone)]
pub struct XmlSchemaPtr {
    inner: Arc<XmlSchemaInner>,
}

#[derive(Debug)]
struct XmlSchemaInner {
    ptr: *mut XmlSchema,
}

// Safety: libxml2 schema structures are read-only after parsing and may be
// shared by concurrent validations (http://xmlsoft.org/threads.html).
unsafe impl Send for XmlSchemaInner {}
unsafe impl Sync for XmlSchemaInner {}

impl XmlSchemaPtr {
    /// # Safety
    ///
    /// `ptr` must be a non-null schema returned by `xmlSchemaParse` that nobody else frees.
    unsafe fn from_raw(ptr: *mut XmlSchema) -> Self {
        Self {
            inner: Arc::new(XmlSchemaInner { ptr }),
        }
    }

    fn as_ptr(&self) -> *mut XmlSchema {
        self.inner.ptr
    }
}

impl Drop for XmlSchemaInner {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { xmlSchemaFree(self.ptr) };
        }
    }
}

/// Result of parsing one schema location, replayed into every document that refers to it
#[derive(Clone)]
struct SchemaEntry {
    schema: Option<XmlSchemaPtr>,
    events: Vec<(Severity, ParseEvent)>,
}

/// Keeps events for replay instead of judging a document
#[derive(Default)]
struct RecordingHandler {
    events: Vec<(Severity, ParseEvent)>,
}

impl ErrorHandler for RecordingHandler {
    fn warning(&mut self, event: ParseEvent) {
        self.events.push((Severity::Warning, event));
    }

    fn error(&mut self, event: ParseEvent) {
        self.events.push((Severity::Error, event));
    }

    fn fatal_error(&mut self, event: ParseEvent) {
        self.events.push((Severity::FatalError, event));
    }
}

/// libxml2-backed validating parser
///
/// Parsed schemas are cached by location for the lifetime of the parser, so a
/// batch of documents sharing one XSD parses it once. The diagnostics of that
/// parse are cached with it and reported to every document using the schema.
pub struct LibXml2Parser {
    schemas: Mutex<HashMap<String, SchemaEntry>>,
}

impl LibXml2Parser {
    /// Create a parser, initializing libxml2 on first use
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
            let _ = DEFAULT_ENTITY_LOADER.set(xmlGetExternalEntityLoader());
            xmlSetExternalEntityLoader(Some(logging_entity_loader));
        });

        Self {
            schemas: Mutex::new(HashMap::new()),
        }
    }

    /// Number of schema locations seen so far (parsed or failed)
    pub fn cached_schemas(&self) -> usize {
        self.schemas.lock().len()
    }

    fn parse_flags(options: &ParseOptions) -> c_int {
        let mut flags = XML_PARSE_RECOVER
            | XML_PARSE_NOENT
            | XML_PARSE_DTDLOAD
            | XML_PARSE_DTDATTR
            | XML_PARSE_XINCLUDE
            | XML_PARSE_HUGE
            | XML_PARSE_BIG_LINES;
        if options.schema == SchemaPreference::Dtd {
            flags |= XML_PARSE_DTDVALID;
        }
        flags
    }

    /// Locate, parse (once) and return the schema a document refers to.
    ///
    /// The schema's own diagnostics are reported to `handler` on every call.
    /// A missing location is an error only when `required`. `None` means no
    /// schema is available.
    fn schema_for(
        &self,
        document: &[u8],
        document_id: &str,
        required: bool,
        handler: &mut HandlerSlot<'_>,
    ) -> Option<XmlSchemaPtr> {
        let Some(location) = extract_schema_location(document) else {
            if required {
                handler.error(ParseEvent::unpositioned(
                    "no XML Schema location (xsi:schemaLocation or xsi:noNamespaceSchemaLocation) found",
                ));
            }
            return None;
        };
        let location = resolve_schema_location(&location, document_id);

        // Parsing is serialized: libxml2's schema parser is not thread-safe.
        let entry = self
            .schemas
            .lock()
            .entry(location)
            .or_insert_with_key(|location| Self::parse_schema(location))
            .clone();

        for (severity, event) in entry.events {
            handler.report(severity, event);
        }
        entry.schema
    }

    fn parse_schema(location: &str) -> SchemaEntry {
        log::debug!("Parsing XML Schema {}", location);

        let mut recorder = RecordingHandler::default();
        let schema = match CString::new(location) {
            Ok(c_location) => {
                let mut slot: HandlerSlot<'_> = &mut recorder;
                // Loader I/O errors bypass the schema parser context.
                let _guard = StructuredErrorGuard::install(user_data(&mut slot));
                unsafe {
                    let parser_ctxt = xmlSchemaNewParserCtxt(c_location.as_ptr());
                    if parser_ctxt.is_null() {
                        None
                    } else {
                        xmlSchemaSetParserStructuredErrors(
                            parser_ctxt,
                            Some(structured_error_callback),
                            user_data(&mut slot),
                        );
                        let schema = xmlSchemaParse(parser_ctxt);
                        xmlSchemaFreeParserCtxt(parser_ctxt);

                        if schema.is_null() {
                            None
                        } else {
                            Some(XmlSchemaPtr::from_raw(schema))
                        }
                    }
                }
            }
            Err(_) => None,
        };

        let mut events = recorder.events;
        if schema.is_none() {
            events.push((
                Severity::Error,
                ParseEvent::unpositioned(format!("failed to load XML Schema {}", location)),
            ));
        }
        SchemaEntry { schema, events }
    }

    fn parse_dom(
        &self,
        document: &[u8],
        document_id: &str,
        c_id: &CString,
        size: c_int,
        options: &ParseOptions,
        mut handler: HandlerSlot<'_>,
    ) -> Result<ParseStatus> {
        let flags = Self::parse_flags(options);
        let ctxt = ParserContext::new()?;

        let doc = {
            let _guard = StructuredErrorGuard::install(user_data(&mut handler));
            let doc = DocPtr(unsafe {
                xmlCtxtReadMemory(
                    ctxt.0,
                    document.as_ptr() as *const c_char,
                    size,
                    c_id.as_ptr(),
                    ptr::null(),
                    flags,
                )
            });
            if !doc.0.is_null() {
                unsafe { xmlXIncludeProcessFlags(doc.0, flags) };
            }
            doc
        };

        if doc.0.is_null() {
            return Ok(ParseStatus::Aborted);
        }

        if options.schema == SchemaPreference::Xsd {
            let Some(schema) = self.schema_for(document, document_id, true, &mut handler) else {
                return Ok(ParseStatus::Completed);
            };

            unsafe {
                let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
                if valid_ctxt.is_null() {
                    return Err(ValidationError::ParserConfiguration {
                        details: "schema validation context creation failed".to_string(),
                    });
                }
                xmlSchemaSetValidStructuredErrors(
                    valid_ctxt,
                    Some(structured_error_callback),
                    user_data(&mut handler),
                );
                let code = xmlSchemaValidateDoc(valid_ctxt, doc.0);
                xmlSchemaFreeValidCtxt(valid_ctxt);

                if code < 0 {
                    handler.error(ParseEvent::unpositioned(format!(
                        "internal error during XML Schema validation (code {})",
                        code
                    )));
                }
            }
        }

        Ok(ParseStatus::Completed)
    }

    fn parse_sax(
        &self,
        document: &[u8],
        document_id: &str,
        c_id: &CString,
        size: c_int,
        options: &ParseOptions,
        mut handler: HandlerSlot<'_>,
    ) -> Result<ParseStatus> {
        // With DTD preference a declared schema is still checked alongside the DTD.
        let required = options.schema == SchemaPreference::Xsd;
        let schema = self.schema_for(document, document_id, required, &mut handler);

        let reader = unsafe {
            xmlReaderForMemory(
                document.as_ptr() as *const c_char,
                size,
                c_id.as_ptr(),
                ptr::null(),
                Self::parse_flags(options),
            )
        };
        if reader.is_null() {
            return Err(LibXml2Error::ReaderCreationFailed.into());
        }
        let reader = TextReader(reader);

        unsafe {
            xmlTextReaderSetStructuredErrorHandler(
                reader.0,
                Some(structured_error_callback),
                user_data(&mut handler),
            );
            if let Some(schema) = &schema
                && xmlTextReaderSetSchema(reader.0, schema.as_ptr()) != 0
            {
                return Err(ValidationError::ParserConfiguration {
                    details: "failed to attach XML Schema to the reader".to_string(),
                });
            }
        }

        // Entity loading reports through the per-thread handler, not the reader's.
        let _guard = StructuredErrorGuard::install(user_data(&mut handler));
        loop {
            match unsafe { xmlTextReaderRead(reader.0) } {
                1 => continue,
                0 => return Ok(ParseStatus::Completed),
                _ => return Ok(ParseStatus::Aborted),
            }
        }
    }
}

impl Default for LibXml2Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidatingParser for LibXml2Parser {
    fn parse(
        &self,
        document: &[u8],
        document_id: &str,
        options: &ParseOptions,
        handler: &mut dyn ErrorHandler,
    ) -> Result<ParseStatus> {
        let size = c_int::try_from(document.len()).map_err(|_| ValidationError::DocumentTooLarge {
            document: document_id.to_string(),
            size: document.len(),
        })?;
        let c_id = CString::new(document_id).map_err(|_| ValidationError::InvalidDocumentId {
            document: document_id.to_string(),
        })?;

        match options.mode {
            ParseMode::Dom => self.parse_dom(document, document_id, &c_id, size, options, handler),
            ParseMode::Sax => self.parse_sax(document, document_id, &c_id, size, options, handler),
        }
    }
}
