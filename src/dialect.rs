//! SQL dialects
//!
//! Everything that differs between the supported databases but is not a
//! metadata query lives here: URL schemes, positional parameter tokens,
//! temporary view naming and the query strip quirks required by each
//! database's `CREATE VIEW`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SchemataError;

/// A supported SQL dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    Mysql,
    Sqlite3,
    Sqlserver,
    Oracle,
}

/// Result of applying a dialect's strip hook to a rewritten query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrippedQuery {
    pub query: Vec<String>,
    pub inspect: Vec<String>,
    /// Parallel to `query`; holds whatever was removed from each line
    pub comments: Vec<String>,
}

/// Matches the `::type AS name` annotation postgres queries need for typing.
static PG_CAST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)::[a-z][a-z0-9_\.]+\s+AS\s+[a-z][a-z0-9_\.]+").unwrap()
});

impl Dialect {
    pub const ALL: [Dialect; 5] = [
        Dialect::Postgres,
        Dialect::Mysql,
        Dialect::Sqlite3,
        Dialect::Sqlserver,
        Dialect::Oracle,
    ];

    /// Driver name
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Mysql => "mysql",
            Dialect::Sqlite3 => "sqlite3",
            Dialect::Sqlserver => "sqlserver",
            Dialect::Oracle => "oracle",
        }
    }

    /// URL schemes accepted for this dialect
    pub fn schemes(self) -> &'static [&'static str] {
        match self {
            Dialect::Postgres => &["postgres", "postgresql", "pg", "pgsql"],
            Dialect::Mysql => &["mysql", "my", "mariadb"],
            Dialect::Sqlite3 => &["sqlite3", "sqlite", "file"],
            Dialect::Sqlserver => &["sqlserver", "mssql", "ms"],
            Dialect::Oracle => &["oracle", "ora", "oci", "oci8"],
        }
    }

    /// Look up a dialect by URL scheme. A `+transport` suffix is ignored.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        let scheme = scheme.to_lowercase();
        let scheme = scheme.split('+').next().unwrap_or_default();
        Self::ALL
            .into_iter()
            .find(|dialect| dialect.schemes().contains(&scheme))
    }

    /// Determine the dialect from a connection URL
    pub fn from_url(url: &str) -> Result<Self, SchemataError> {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| SchemataError::UnknownDriver(format!("no scheme in '{}'", url)))?;

        Self::from_scheme(scheme).ok_or_else(|| SchemataError::UnknownDriver(scheme.to_string()))
    }

    /// 0-based positional parameter token
    pub fn nth_param(self, i: usize) -> String {
        let n = i + 1;
        match self {
            Dialect::Postgres | Dialect::Sqlite3 => format!("${}", n),
            Dialect::Mysql => "?".to_string(),
            Dialect::Sqlserver => format!("@p{}", n),
            Dialect::Oracle => format!(":{}", n),
        }
    }

    /// Prefix for temporary introspection views/tables
    pub fn temp_prefix(self) -> &'static str {
        match self {
            Dialect::Oracle => "XO$",
            _ => "_xo_",
        }
    }

    /// Whether `type[]` columns are native arrays
    pub fn supports_arrays(self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Whether the index catalog flags primary key indexes.
    ///
    /// When it does not, schema assembly must not synthesize a primary
    /// index; it marks the matching reported index instead.
    pub fn reports_primary_indexes(self) -> bool {
        !matches!(self, Dialect::Oracle)
    }

    /// Apply this dialect's strip hook.
    ///
    /// Postgres removes `::type AS name` from both the rewritten and the
    /// inspect query. The text removed from each rewritten line becomes that
    /// line's comment. SQL Server drops `ORDER BY` lines from the inspect
    /// query only, as they are illegal in a view.
    pub fn strip_query(self, query: Vec<String>, inspect: Vec<String>) -> StrippedQuery {
        match self {
            Dialect::Postgres => {
                let (query, comments) = strip_pg_casts(query);
                let (inspect, _) = strip_pg_casts(inspect);
                StrippedQuery {
                    query,
                    inspect,
                    comments,
                }
            }
            Dialect::Sqlserver => {
                let comments = vec![String::new(); query.len()];
                StrippedQuery {
                    query,
                    inspect: strip_order_by(inspect),
                    comments,
                }
            }
            _ => unstripped(query, inspect),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Wrap query lines with empty comments
pub fn unstripped(query: Vec<String>, inspect: Vec<String>) -> StrippedQuery {
    let comments = vec![String::new(); query.len()];
    StrippedQuery {
        query,
        inspect,
        comments,
    }
}

fn strip_pg_casts(query: Vec<String>) -> (Vec<String>, Vec<String>) {
    let mut comments = Vec::with_capacity(query.len());
    let lines = query
        .into_iter()
        .map(|line| match PG_CAST_RE.find(&line) {
            Some(m) => {
                comments.push(m.as_str().to_string());
                format!("{}{}", &line[..m.start()], &line[m.end()..])
            }
            None => {
                comments.push(String::new());
                line
            }
        })
        .collect();
    (lines, comments)
}

fn strip_order_by(inspect: Vec<String>) -> Vec<String> {
    inspect
        .into_iter()
        .filter(|line| !line.to_uppercase().starts_with("ORDER BY "))
        .collect()
}
