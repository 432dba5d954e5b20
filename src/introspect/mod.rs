//! Database introspection
//!
//! This module defines the [`Loader`] contract each database adapter
//! implements, the raw metadata rows adapters return, and the [`Registry`]
//! used to pick an adapter for a connection URL. Each supported database has
//! its own feature-gated submodule.

use std::collections::BTreeMap;

use tracing::{debug, error, info};

use crate::config::DbConfig;
use crate::dialect::Dialect;
use crate::prelude::SchemataError;
use crate::schema::{ProcKind, TableKind};

/// Optional capabilities of a loader.
///
/// Schema assembly and query introspection check these before calling the
/// matching [`Loader`] method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub enums: bool,
    pub procs: bool,
    pub sequences: bool,
    /// Temporary views may land in a schema other than the requested one
    pub view_schema: bool,
    /// Temporary objects must be truncated before they are dropped
    pub view_truncate: bool,
}

/// An enum type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumRaw {
    pub name: String,
}

/// One enum label and its ordinal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValueRaw {
    pub value: String,
    pub const_value: i64,
}

/// One return row of a stored routine; routines returning several columns
/// produce several rows sharing an `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcRaw {
    pub id: String,
    pub name: String,
    pub kind: ProcKind,
    /// Empty when the database does not name return values
    pub return_name: String,
    pub return_type: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcParamRaw {
    /// Empty when the database does not name parameters
    pub name: String,
    pub param_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRaw {
    pub name: String,
    pub kind: TableKind,
    pub comment: String,
    /// View definition
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRaw {
    pub ordinal: i32,
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    pub is_primary_key: bool,
    pub default: Option<String>,
    pub comment: String,
}

/// A database-managed sequence or identity backing a table column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRaw {
    pub table_name: String,
    /// Empty when the database only reports the table
    pub column_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRaw {
    /// Constraint name; empty when the database does not name constraints
    pub name: String,
    pub column_name: String,
    pub ref_table_name: String,
    /// Empty when the database does not report the referenced column
    pub ref_column_name: String,
    /// Rows sort by this. Unnamed rows sharing a key id form one key.
    pub key_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRaw {
    pub name: String,
    pub is_unique: bool,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumnRaw {
    pub seq_no: i32,
    pub column_name: String,
}

/// Metadata source for one database dialect.
///
/// Methods guarded by a [`Capabilities`] flag default to returning
/// [`SchemataError::Unsupported`].
pub trait Loader {
    fn dialect(&self) -> Dialect;

    fn capabilities(&self) -> Capabilities;

    /// Current (default) schema
    fn schema(&mut self) -> Result<String, SchemataError>;

    fn enums(&mut self, _schema: &str) -> Result<Vec<EnumRaw>, SchemataError> {
        Err(unsupported(self.dialect(), "enums"))
    }

    fn enum_values(
        &mut self,
        _schema: &str,
        _enum_name: &str,
    ) -> Result<Vec<EnumValueRaw>, SchemataError> {
        Err(unsupported(self.dialect(), "enums"))
    }

    fn procs(&mut self, _schema: &str) -> Result<Vec<ProcRaw>, SchemataError> {
        Err(unsupported(self.dialect(), "stored procedures"))
    }

    fn proc_params(
        &mut self,
        _schema: &str,
        _proc_id: &str,
    ) -> Result<Vec<ProcParamRaw>, SchemataError> {
        Err(unsupported(self.dialect(), "stored procedures"))
    }

    fn tables(&mut self, schema: &str, kind: TableKind) -> Result<Vec<TableRaw>, SchemataError>;

    fn table_columns(&mut self, schema: &str, table: &str)
        -> Result<Vec<ColumnRaw>, SchemataError>;

    fn table_sequences(&mut self, _schema: &str) -> Result<Vec<SequenceRaw>, SchemataError> {
        Err(unsupported(self.dialect(), "sequences"))
    }

    fn table_foreign_keys(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ForeignKeyRaw>, SchemataError>;

    fn table_indexes(&mut self, schema: &str, table: &str)
        -> Result<Vec<IndexRaw>, SchemataError>;

    fn index_columns(
        &mut self,
        schema: &str,
        table: &str,
        index: &str,
    ) -> Result<Vec<IndexColumnRaw>, SchemataError>;

    /// Create a temporary view named `id` over `query`
    fn view_create(&mut self, schema: &str, id: &str, query: &[String])
        -> Result<(), SchemataError>;

    /// Schema the temporary view `id` was created in
    fn view_schema(&mut self, _id: &str) -> Result<String, SchemataError> {
        Err(unsupported(self.dialect(), "view schema lookup"))
    }

    fn view_truncate(&mut self, _schema: &str, _id: &str) -> Result<(), SchemataError> {
        Err(unsupported(self.dialect(), "view truncation"))
    }

    fn view_drop(&mut self, schema: &str, id: &str) -> Result<(), SchemataError>;

    /// 0-based positional parameter token
    fn nth_param(&self, i: usize) -> String {
        self.dialect().nth_param(i)
    }
}

/// Error for a capability the loader does not provide
pub fn unsupported(dialect: Dialect, capability: &'static str) -> SchemataError {
    SchemataError::Unsupported {
        driver: dialect.name(),
        capability,
    }
}

/// Opens a loader for a connection
pub type OpenFn = fn(&DbConfig) -> Result<Box<dyn Loader>, SchemataError>;

/// Loaders available to this process, keyed by dialect
#[derive(Debug, Clone, Default)]
pub struct Registry {
    openers: BTreeMap<Dialect, OpenFn>,
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every adapter compiled into this build
    pub fn with_builtin() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "postgres")]
        registry.register(Dialect::Postgres, postgres::open);
        registry
    }

    pub fn register(&mut self, dialect: Dialect, open: OpenFn) {
        debug!(driver = %dialect, "Registering loader");
        self.openers.insert(dialect, open);
    }

    pub fn contains(&self, dialect: Dialect) -> bool {
        self.openers.contains_key(&dialect)
    }

    /// Registered dialects, in a stable order
    pub fn dialects(&self) -> Vec<Dialect> {
        self.openers.keys().copied().collect()
    }

    /// Open a loader for the dialect named by the config's URL
    pub fn open(&self, config: &DbConfig) -> Result<Box<dyn Loader>, SchemataError> {
        let dialect = config.dialect()?;
        let open = self.openers.get(&dialect).ok_or_else(|| {
            error!(driver = %dialect, available = ?self.dialects(), "No loader for driver");
            SchemataError::UnknownDriver(format!(
                "{} (no adapter compiled in; available: {:?})",
                dialect,
                self.dialects()
            ))
        })?;

        info!(driver = %dialect, url = %config.redacted_url(), "Opening database");
        open(config)
    }
}

// Feature-gated database implementations
#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresLoader;

#[cfg(test)]
mod tests {
    use super::*;

    struct NullLoader;

    impl Loader for NullLoader {
        fn dialect(&self) -> Dialect {
            Dialect::Sqlite3
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }

        fn schema(&mut self) -> Result<String, SchemataError> {
            Ok("main".to_string())
        }

        fn tables(&mut self, _: &str, _: TableKind) -> Result<Vec<TableRaw>, SchemataError> {
            Ok(vec![])
        }

        fn table_columns(&mut self, _: &str, _: &str) -> Result<Vec<ColumnRaw>, SchemataError> {
            Ok(vec![])
        }

        fn table_foreign_keys(
            &mut self,
            _: &str,
            _: &str,
        ) -> Result<Vec<ForeignKeyRaw>, SchemataError> {
            Ok(vec![])
        }

        fn table_indexes(&mut self, _: &str, _: &str) -> Result<Vec<IndexRaw>, SchemataError> {
            Ok(vec![])
        }

        fn index_columns(
            &mut self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<Vec<IndexColumnRaw>, SchemataError> {
            Ok(vec![])
        }

        fn view_create(&mut self, _: &str, _: &str, _: &[String]) -> Result<(), SchemataError> {
            Ok(())
        }

        fn view_drop(&mut self, _: &str, _: &str) -> Result<(), SchemataError> {
            Ok(())
        }
    }

    fn open_null(_: &DbConfig) -> Result<Box<dyn Loader>, SchemataError> {
        Ok(Box::new(NullLoader))
    }

    #[test]
    fn test_optional_methods_unsupported() {
        let mut loader = NullLoader;

        let err = loader.enums("main").unwrap_err();
        assert!(matches!(
            err,
            SchemataError::Unsupported {
                driver: "sqlite3",
                capability: "enums"
            }
        ));
        assert!(loader.table_sequences("main").is_err());
        assert!(loader.view_truncate("main", "_xo_x").is_err());
        assert_eq!(loader.nth_param(0), "$1");
    }

    #[test]
    fn test_registry_open() {
        let mut registry = Registry::new();
        registry.register(Dialect::Sqlite3, open_null);

        assert!(registry.contains(Dialect::Sqlite3));
        assert_eq!(registry.dialects(), vec![Dialect::Sqlite3]);

        let mut loader = registry.open(&DbConfig::new("sqlite:booktest.db")).unwrap();
        assert_eq!(loader.dialect(), Dialect::Sqlite3);
        assert_eq!(loader.schema().unwrap(), "main");
    }

    #[test]
    fn test_registry_unknown_driver() {
        let registry = Registry::new();

        let result = registry.open(&DbConfig::new("mysql://localhost/booktest"));
        assert!(matches!(result, Err(SchemataError::UnknownDriver(_))));

        let result = registry.open(&DbConfig::new("redis://localhost"));
        assert!(matches!(result, Err(SchemataError::UnknownDriver(_))));
    }
}
