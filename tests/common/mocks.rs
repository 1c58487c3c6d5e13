use std::collections::HashMap;

use i5validator::{
    ErrorHandler, ParseEvent, ParseOptions, ParseStatus, Severity, ValidatingParser,
    ValidationError,
};
use parking_lot::Mutex;

/// Scripted outcome of one document
#[derive(Clone, Debug)]
pub struct Script {
    pub events: Vec<(Severity, ParseEvent)>,
    pub status: ParseStatus,
    pub fail: bool,
}

impl Script {
    pub fn clean() -> Self {
        Self {
            events: Vec::new(),
            status: ParseStatus::Completed,
            fail: false,
        }
    }

    pub fn with_events(events: Vec<(Severity, ParseEvent)>) -> Self {
        Self {
            events,
            ..Self::clean()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::clean()
        }
    }
}

/// Mock parser replaying per-document scripts, for exercising sessions and
/// batches without libxml2
#[derive(Default)]
pub struct ScriptedParser {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, document_id: &str, script: Script) -> Self {
        self.scripts.insert(document_id.to_string(), script);
        self
    }

    /// Document ids in the order they were parsed
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl ValidatingParser for ScriptedParser {
    fn parse(
        &self,
        _document: &[u8],
        document_id: &str,
        _options: &ParseOptions,
        handler: &mut dyn ErrorHandler,
    ) -> Result<ParseStatus, ValidationError> {
        self.calls.lock().push(document_id.to_string());

        let Some(script) = self.scripts.get(document_id) else {
            return Ok(ParseStatus::Completed);
        };
        if script.fail {
            return Err(ValidationError::ParserConfiguration {
                details: format!("scripted failure for {}", document_id),
            });
        }
        for (severity, event) in &script.events {
            handler.report(*severity, event.clone());
        }
        Ok(script.status)
    }
}
