//! # schemata
//!
//! Load database schemas and ad hoc queries into a typed intermediate
//! representation
//!
//! This crate provides a CLI tool and library for introspecting database
//! schemas, resolving foreign key and index accessor names, and rewriting
//! parameterized queries, producing IR ready for code generation.

pub mod assemble;
pub mod config;
pub mod datatype;
pub mod dialect;
pub mod emit;
pub mod error;
pub mod introspect;
pub mod naming;
pub mod query;
pub mod resolve;
pub mod schema;

pub mod prelude {
    pub use crate::assemble::load_schema;
    pub use crate::config::{DbConfig, FkMode, ManualField, QueryOptions, SchemaOptions, TypeFilter};
    pub use crate::dialect::Dialect;
    pub use crate::emit::{EmitConfig, Emitter, OutputFormat};
    pub use crate::error::SchemataError;
    pub use crate::introspect::{Capabilities, Loader, Registry};
    pub use crate::query::{load_query, IdSource, RandomIds, SequentialIds};
    pub use crate::schema::{
        Datatype, Enum, Field, ForeignKey, Index, Proc, Query, Schema, Table, TableKind, TypeKind,
    };
}

#[cfg(feature = "postgres")]
pub use introspect::PostgresLoader;
