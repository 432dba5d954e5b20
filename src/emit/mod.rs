//! IR emission
//!
//! Renders the assembled [`Schema`] or [`Query`] into text and writes it to
//! a file or stdout.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::prelude::{Query, Schema, SchemataError};

pub mod dot;
pub mod json;

pub use dot::DotEmitter;
pub use json::JsonEmitter;

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed JSON mirror of the IR
    #[default]
    Json,
    /// Graphviz digraph
    Dot,
}

/// Configuration for emission
#[derive(Debug, Clone, Default)]
pub struct EmitConfig {
    /// Output file; stdout when `None`
    pub output_path: Option<PathBuf>,
    pub format: OutputFormat,
}

impl EmitConfig {
    pub fn new(output_path: Option<PathBuf>) -> Self {
        Self {
            output_path,
            format: OutputFormat::default(),
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }
}

/// Trait for IR renderers
pub trait Emitter {
    fn emit_schema(&self, schema: &Schema) -> Result<String, SchemataError>;

    fn emit_query(&self, query: &Query) -> Result<String, SchemataError>;
}

/// Build the emitter for a format
pub fn emitter(format: OutputFormat) -> Result<Box<dyn Emitter>, SchemataError> {
    Ok(match format {
        OutputFormat::Json => Box::new(JsonEmitter::new()),
        OutputFormat::Dot => Box::new(DotEmitter::new()?),
    })
}

/// Write rendered output to the configured file, or stdout
pub fn write_output(config: &EmitConfig, content: &str) -> Result<(), SchemataError> {
    match &config.output_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    fs::create_dir_all(parent)?;
                    debug!(path = ?parent, "Created output directory");
                }
            }
            fs::write(path, content)?;
            info!(path = ?path, bytes = ?content.len(), "Wrote output");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(content.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_output_creates_parent() {
        let dir = std::env::temp_dir().join(format!("schemata-emit-{}", std::process::id()));
        let path = dir.join("nested").join("schema.json");
        let config = EmitConfig::new(Some(path.clone()));

        write_output(&config, "{}\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{}\n");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_emitter_for_format() {
        assert!(emitter(OutputFormat::Json).is_ok());
        assert!(emitter(OutputFormat::Dot).is_ok());
        assert_eq!(EmitConfig::default().format, OutputFormat::Json);
    }
}
