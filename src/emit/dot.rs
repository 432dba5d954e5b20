//! Graphviz emitter
//!
//! Draws tables and views as record nodes and foreign keys as edges between
//! column ports.

use minijinja::{context, Environment, Value};
use tracing::debug;

use super::Emitter;
use crate::prelude::{Query, Schema, SchemataError};
use crate::schema::{Datatype, Field, Table, TableKind};

/// Graphviz DOT renderer
pub struct DotEmitter {
    env: Environment<'static>,
}

impl DotEmitter {
    pub fn new() -> Result<Self, SchemataError> {
        let mut env = Environment::new();

        env.add_template("schema", include_str!("templates/schema.dot.jinja"))
            .map_err(|e| template_error("schema", e))?;
        env.add_template("query", include_str!("templates/query.dot.jinja"))
            .map_err(|e| template_error("query", e))?;

        Ok(Self { env })
    }

    fn render(&self, name: &str, target: &str, ctx: Value) -> Result<String, SchemataError> {
        let template = self
            .env
            .get_template(name)
            .map_err(|e| template_error(target, e))?;

        template.render(ctx).map_err(|e| SchemataError::Emit {
            target: target.to_string(),
            message: format!("Render error: {}", e),
        })
    }
}

impl Emitter for DotEmitter {
    fn emit_schema(&self, schema: &Schema) -> Result<String, SchemataError> {
        let tables: Vec<&Table> = schema.tables.iter().chain(schema.views.iter()).collect();

        let nodes: Vec<Value> = tables.iter().map(|t| table_context(t)).collect();

        let mut edges = Vec::new();
        for table in &tables {
            for fk in &table.foreign_keys {
                edges.push(context! {
                    from => quote(&table.name),
                    from_port => quote(&fk.field.column_name),
                    to => quote(&fk.ref_table),
                    to_port => quote(&fk.ref_field.column_name),
                    label => quote(&fk.resolved_name),
                });
            }
        }
        debug!(nodes = ?nodes.len(), edges = ?edges.len(), "Rendering schema graph");

        let ctx = context! {
            name => quote(&schema.name),
            tables => nodes,
            edges => edges,
        };
        self.render("schema", &schema.name, ctx)
    }

    fn emit_query(&self, query: &Query) -> Result<String, SchemataError> {
        let label = if query.type_name.is_empty() {
            &query.name
        } else {
            &query.type_name
        };

        let ctx = context! {
            name => quote(&query.name),
            label => html(label),
            params => query.params.iter().map(field_context).collect::<Vec<_>>(),
            fields => query.fields.iter().map(field_context).collect::<Vec<_>>(),
        };
        self.render("query", &query.name, ctx)
    }
}

fn table_context(table: &Table) -> Value {
    context! {
        id => quote(&table.name),
        label => html(&table.name),
        view => table.kind == TableKind::View,
        columns => table.columns.iter().map(|c| context! {
            port => html(&c.column_name),
            name => html(&c.column_name),
            ty => html(&type_label(&c.datatype)),
            primary => c.is_primary,
        }).collect::<Vec<_>>(),
    }
}

fn field_context(field: &Field) -> Value {
    context! {
        name => html(&field.name),
        ty => html(&type_label(&field.datatype)),
    }
}

/// `numeric(10,2)[]?` style label
fn type_label(dt: &Datatype) -> String {
    let mut label = dt.type_name.clone();
    match (dt.prec, dt.scale) {
        (0, _) => {}
        (p, 0) => label.push_str(&format!("({})", p)),
        (p, s) => label.push_str(&format!("({},{})", p, s)),
    }
    if dt.array {
        label.push_str("[]");
    }
    if dt.nullable {
        label.push('?');
    }
    label
}

/// DOT quoted identifier
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Escape text placed inside an HTML-like label
fn html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn template_error(target: &str, e: minijinja::Error) -> SchemataError {
    SchemataError::Emit {
        target: target.to_string(),
        message: format!("Template error: {}", e),
    }
}
