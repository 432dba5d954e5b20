//! JSON emitter

use serde::Serialize;

use super::Emitter;
use crate::prelude::{Query, Schema, SchemataError};

/// Pretty-printed JSON mirror of the IR
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEmitter;

impl JsonEmitter {
    pub fn new() -> Self {
        Self
    }

    fn render<T: Serialize>(&self, target: &str, value: &T) -> Result<String, SchemataError> {
        let mut out = serde_json::to_string_pretty(value).map_err(|e| SchemataError::Emit {
            target: target.to_string(),
            message: format!("Serialization error: {}", e),
        })?;
        out.push('\n');
        Ok(out)
    }
}

impl Emitter for JsonEmitter {
    fn emit_schema(&self, schema: &Schema) -> Result<String, SchemataError> {
        self.render(&schema.name, schema)
    }

    fn emit_query(&self, query: &Query) -> Result<String, SchemataError> {
        self.render(&query.name, query)
    }
}
