//! Schema data structures
//!
//! These types are the intermediate representation shared between
//! introspection (produces) and emission (consumes). They are built once per
//! run and never mutated after being handed out.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;

/// Normalized type category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Bool,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Double,
    Decimal,
    Text,
    Bytes,
    /// Any date, time or timestamp variant
    Timestamp,
    Interval,
    Json,
    Uuid,
    Void,
    /// Schema-local named type (domain, enum, composite), schema prefix removed
    Named(String),
    /// Set-returning proc result (`SETOF inner`)
    SetOf(Box<TypeKind>),
}

/// A normalized column/parameter type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datatype {
    /// Lower-cased base type name with modifiers removed
    #[serde(rename = "type")]
    pub type_name: String,
    pub kind: TypeKind,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub prec: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub scale: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub array: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unsigned: bool,
}

impl Datatype {
    /// A caller-declared type that is not interpreted (query params, manual fields)
    pub fn declared(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            kind: TypeKind::Named(type_name.to_string()),
            prec: 0,
            scale: 0,
            nullable: false,
            array: false,
            unsigned: false,
        }
    }
}

/// A column, enum value, proc parameter/return, or query column/parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Generated identifier
    pub name: String,
    /// Name as known to the database (empty for query parameters)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub column_name: String,
    pub datatype: Datatype,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_primary: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_sequence: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub const_value: Option<i64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub interpolate: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub join: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

impl Field {
    pub fn new(name: impl Into<String>, column_name: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            name: name.into(),
            column_name: column_name.into(),
            datatype,
            default: None,
            is_primary: false,
            is_sequence: false,
            const_value: None,
            interpolate: false,
            join: false,
            comment: String::new(),
        }
    }
}

/// Table or view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Table,
    View,
}

impl TableKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TableKind::Table => "table",
            TableKind::View => "view",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database table or view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    #[serde(rename = "type")]
    pub kind: TableKind,
    /// Name as known to the database
    pub name: String,
    /// Singularized, camelized type name ("books" -> "Book")
    pub type_name: String,
    pub columns: Vec<Field>,
    /// Primary key columns, in column order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_keys: Vec<Field>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Index>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
    /// Primary key is not database managed; callers supply it on insert
    #[serde(default, skip_serializing_if = "is_false")]
    pub manual: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
    /// View definition (empty for tables)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub definition: String,
}

impl Table {
    /// Find a column by its database name
    pub fn column(&self, column_name: &str) -> Option<&Field> {
        self.columns.iter().find(|col| col.column_name == column_name)
    }

    /// First primary key column, if any
    pub fn primary_key(&self) -> Option<&Field> {
        self.primary_keys.first()
    }

    /// The primary index, if one was reported or synthesized
    pub fn primary_index(&self) -> Option<&Index> {
        self.indexes.iter().find(|ix| ix.is_primary)
    }
}

/// An index into a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    /// Generated accessor name ("BookByIsbn", "BooksByAuthorID")
    pub func_name: String,
    /// Indexed columns, in key order
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_unique: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_primary: bool,
}

/// A resolved foreign key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name
    pub name: String,
    /// Generated accessor name, per the foreign key naming mode
    pub resolved_name: String,
    /// Local column
    pub field: Field,
    /// Referenced table, by database name
    pub ref_table: String,
    /// Referenced table's type name
    pub ref_type: String,
    pub ref_field: Field,
    /// Referenced table's index covering `ref_field` (empty when none)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ref_index: String,
    pub ref_func_name: String,
}

/// An enum type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enum {
    pub name: String,
    pub type_name: String,
    pub values: Vec<Field>,
}

/// Stored routine kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcKind {
    Function,
    Procedure,
}

/// A stored procedure or function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proc {
    #[serde(skip)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ProcKind,
    pub name: String,
    pub func_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Field>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub returns: Vec<Field>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub void: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub definition: String,
}

/// A complete database schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub driver: Dialect,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enums: Vec<Enum>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub procs: Vec<Proc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<Table>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub views: Vec<Table>,
}

impl Schema {
    /// Find a table or view by its database name
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .chain(self.views.iter())
            .find(|table| table.name == name)
    }

    pub fn enum_by_name(&self, name: &str) -> Option<&Enum> {
        self.enums.iter().find(|e| e.name == name)
    }
}

/// A custom query and its result type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub driver: Dialect,
    /// Generated function name
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
    /// Generated result type name
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub type_comment: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    /// Fields were supplied by the caller instead of introspected
    #[serde(default, skip_serializing_if = "is_false")]
    pub manual_fields: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Field>,
    /// Rewritten SQL, one entry per line
    pub query: Vec<String>,
    /// Parallel to `query`: annotations stripped from each line
    pub comments: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub one: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub flat: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub exec: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub interpolate: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}
