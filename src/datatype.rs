//! Datatype normalization
//!
//! Turns a driver-native type string such as `numeric(10,2)`,
//! `int(10) unsigned` or `character varying[]` into a [`Datatype`].

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use crate::dialect::Dialect;
use crate::error::SchemataError;
use crate::schema::{Datatype, TypeKind};

/// Trailing `(…)` modifier
static PREC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(([^()]*)\)$").unwrap());

/// `timestamp(n) with [local] time zone` and friends, where the precision sits
/// in the middle of the type name.
static ZONED_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(timestamp|time)\s*\((\d+)\)\s+(with(?: local)? time zone|without time zone)$")
        .unwrap()
});

/// Normalizes raw type strings for one dialect and schema
#[derive(Debug, Clone)]
pub struct Normalizer {
    dialect: Dialect,
    schema: String,
}

impl Normalizer {
    pub fn new(dialect: Dialect, schema: impl Into<String>) -> Self {
        Self {
            dialect,
            schema: schema.into(),
        }
    }

    /// Normalize a raw type string.
    ///
    /// Only a malformed precision/scale specifier is an error; unknown base
    /// types fall back to a named type.
    pub fn normalize(&self, raw: &str, nullable: bool) -> Result<Datatype, SchemataError> {
        let trimmed = raw.trim();
        let lower = trimmed.to_lowercase();

        if let Some(inner) = strip_prefix_ci(trimmed, &lower, "setof ") {
            let inner = self.normalize(inner, nullable)?;
            return Ok(Datatype {
                kind: TypeKind::SetOf(Box::new(inner.kind.clone())),
                ..inner
            });
        }

        if let Some(caps) = ZONED_TIME_RE.captures(&lower) {
            let prec = parse_number(raw, &caps[2], "precision")?;
            return Ok(Datatype {
                type_name: format!("{} {}", &caps[1], &caps[3]),
                kind: TypeKind::Timestamp,
                prec,
                scale: 0,
                nullable,
                array: false,
                unsigned: false,
            });
        }

        let mut typ = lower.as_str();

        let mut array = false;
        if self.dialect.supports_arrays() {
            if let Some(rest) = typ.strip_suffix("[]") {
                typ = rest.trim_end();
                array = true;
            }
        }

        let mut unsigned = false;
        if let Some(rest) = typ.strip_suffix(" unsigned") {
            typ = rest.trim_end();
            unsigned = true;
        }

        let (typ, prec, scale) = parse_prec(raw, typ)?;

        let type_name = typ.trim().to_string();
        let (type_name, kind) = self.classify(type_name, prec, scale);
        trace!(raw = %raw, kind = ?kind, prec, scale, "normalized datatype");

        Ok(Datatype {
            type_name,
            kind,
            prec,
            scale,
            nullable,
            array,
            unsigned,
        })
    }

    fn classify(&self, type_name: String, prec: u32, scale: u32) -> (String, TypeKind) {
        let kind = match self.dialect {
            Dialect::Postgres => postgres_kind(&type_name),
            Dialect::Mysql => mysql_kind(&type_name, prec),
            Dialect::Sqlite3 => {
                // sqlite column types are free-form; anything unknown has text affinity
                return match sqlite_kind(&type_name) {
                    Some(kind) => (type_name, kind),
                    None => (type_name, TypeKind::Text),
                };
            }
            Dialect::Sqlserver => sqlserver_kind(&type_name, prec),
            Dialect::Oracle => oracle_kind(&type_name, prec, scale),
        };

        match kind {
            Some(kind) => (type_name, kind),
            None => {
                let name = self.strip_schema(&type_name).to_string();
                (name.clone(), TypeKind::Named(name))
            }
        }
    }

    fn strip_schema<'a>(&self, type_name: &'a str) -> &'a str {
        if self.schema.is_empty() {
            return type_name;
        }
        let schema = self.schema.to_lowercase();
        match type_name.strip_prefix(schema.as_str()) {
            Some(rest) if rest.starts_with('.') => &rest[1..],
            _ => type_name,
        }
    }
}

fn strip_prefix_ci<'a>(s: &'a str, lower: &str, prefix: &str) -> Option<&'a str> {
    if lower.starts_with(prefix) && s.is_char_boundary(prefix.len()) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Split a trailing `(precision[, scale])` off a type name.
///
/// Parenthesized value lists (`enum('a','b')`) are removed without being
/// parsed.
fn parse_prec<'a>(raw: &str, typ: &'a str) -> Result<(&'a str, u32, u32), SchemataError> {
    let Some(caps) = PREC_RE.captures(typ) else {
        return Ok((typ, 0, 0));
    };
    let (whole, inner) = match (caps.get(0), caps.get(1)) {
        (Some(whole), Some(inner)) => (whole, inner.as_str()),
        _ => return Ok((typ, 0, 0)),
    };
    let base = &typ[..whole.start()];
    if inner.contains('\'') {
        return Ok((base, 0, 0));
    }

    let (prec, scale) = match inner.rsplit_once(',') {
        Some((p, s)) => (p, Some(s)),
        None => (inner, None),
    };
    let prec = parse_number(raw, prec, "precision")?;
    let scale = match scale {
        Some(s) => parse_number(raw, s, "scale")?,
        None => 0,
    };
    Ok((base, prec, scale))
}

fn parse_number(raw: &str, s: &str, what: &str) -> Result<u32, SchemataError> {
    s.trim().parse().map_err(|e| SchemataError::Datatype {
        raw: raw.to_string(),
        message: format!("could not parse {}: {}", what, e),
    })
}

fn is_time(t: &str) -> bool {
    matches!(
        t,
        "date"
            | "time"
            | "timestamp"
            | "datetime"
            | "datetime2"
            | "smalldatetime"
            | "datetimeoffset"
            | "timestamptz"
            | "timetz"
            | "timestamp with time zone"
            | "timestamp without time zone"
            | "timestamp with local time zone"
            | "time with time zone"
            | "time without time zone"
            | "timestamp with timezone"
            | "timestamp without timezone"
            | "time with timezone"
            | "time without timezone"
    )
}

fn postgres_kind(t: &str) -> Option<TypeKind> {
    let kind = match t {
        "boolean" | "bool" => TypeKind::Bool,
        "bpchar" | "char" | "character" | "character varying" | "varchar" | "text" | "citext"
        | "name" | "inet" | "cidr" | "money" | "xml" => TypeKind::Text,
        "smallint" | "int2" | "smallserial" => TypeKind::SmallInt,
        "integer" | "int" | "int4" | "serial" => TypeKind::Integer,
        "bigint" | "int8" | "bigserial" => TypeKind::BigInt,
        "real" | "float4" => TypeKind::Float,
        "double precision" | "float8" => TypeKind::Double,
        "numeric" | "decimal" => TypeKind::Decimal,
        "bit" | "bit varying" | "varbit" | "bytea" => TypeKind::Bytes,
        "interval" => TypeKind::Interval,
        "json" | "jsonb" => TypeKind::Json,
        "uuid" => TypeKind::Uuid,
        "void" => TypeKind::Void,
        t if is_time(t) => TypeKind::Timestamp,
        _ => return None,
    };
    Some(kind)
}

fn mysql_kind(t: &str, prec: u32) -> Option<TypeKind> {
    let kind = match t {
        "bool" | "boolean" => TypeKind::Bool,
        "bit" if prec == 1 => TypeKind::Bool,
        "bit" => TypeKind::Bytes,
        "tinyint" if prec == 1 => TypeKind::Bool,
        "tinyint" | "smallint" | "year" => TypeKind::SmallInt,
        "mediumint" | "int" | "integer" => TypeKind::Integer,
        "bigint" => TypeKind::BigInt,
        "float" => TypeKind::Float,
        "double" | "real" => TypeKind::Double,
        "decimal" | "numeric" => TypeKind::Decimal,
        "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "enum" | "set" => {
            TypeKind::Text
        }
        "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" => TypeKind::Bytes,
        "json" => TypeKind::Json,
        t if is_time(t) => TypeKind::Timestamp,
        _ => return None,
    };
    Some(kind)
}

fn sqlite_kind(t: &str) -> Option<TypeKind> {
    let kind = match t {
        "bool" | "boolean" => TypeKind::Bool,
        "int" | "integer" | "tinyint" | "smallint" | "mediumint" => TypeKind::Integer,
        "bigint" => TypeKind::BigInt,
        "numeric" | "real" | "double" | "float" | "decimal" => TypeKind::Double,
        "blob" => TypeKind::Bytes,
        t if is_time(t) => TypeKind::Timestamp,
        _ => return None,
    };
    Some(kind)
}

fn sqlserver_kind(t: &str, prec: u32) -> Option<TypeKind> {
    let kind = match t {
        "bit" => TypeKind::Bool,
        "tinyint" if prec == 1 => TypeKind::Bool,
        "tinyint" | "smallint" => TypeKind::SmallInt,
        "int" => TypeKind::Integer,
        "bigint" => TypeKind::BigInt,
        "real" => TypeKind::Float,
        "float" => TypeKind::Double,
        "numeric" | "decimal" | "money" | "smallmoney" => TypeKind::Decimal,
        "char" | "nchar" | "varchar" | "nvarchar" | "text" | "ntext" | "xml" => TypeKind::Text,
        "binary" | "varbinary" | "image" => TypeKind::Bytes,
        "uniqueidentifier" => TypeKind::Uuid,
        t if is_time(t) => TypeKind::Timestamp,
        _ => return None,
    };
    Some(kind)
}

fn oracle_kind(t: &str, prec: u32, scale: u32) -> Option<TypeKind> {
    let kind = match t {
        "char" | "nchar" | "varchar" | "varchar2" | "nvarchar2" | "long" | "clob" | "nclob"
        | "rowid" => TypeKind::Text,
        "shortint" => TypeKind::SmallInt,
        "integer" => TypeKind::Integer,
        "longinteger" => TypeKind::BigInt,
        "float" | "shortdecimal" | "binary_float" => TypeKind::Float,
        "binary_double" => TypeKind::Double,
        "number" | "decimal" => match (prec, scale) {
            (1, 0) => TypeKind::Bool,
            (p, s) if p > 0 && p < 18 && s != 0 => TypeKind::Double,
            (p, 0) if p > 0 && p <= 19 => TypeKind::BigInt,
            _ => TypeKind::Decimal,
        },
        "blob" | "raw" | "long raw" => TypeKind::Bytes,
        t if t.starts_with("interval") => TypeKind::Interval,
        t if is_time(t) => TypeKind::Timestamp,
        _ => return None,
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg() -> Normalizer {
        Normalizer::new(Dialect::Postgres, "public")
    }

    #[test]
    fn test_precision_roundtrip() {
        let n = pg();
        for (raw, base, prec, scale) in [
            ("numeric(10,2)", "numeric", 10, 2),
            ("numeric(10, 2)", "numeric", 10, 2),
            ("character varying(255)", "character varying", 255, 0),
            ("integer", "integer", 0, 0),
            ("bit(8)", "bit", 8, 0),
        ] {
            let dt = n.normalize(raw, false).unwrap();
            assert_eq!(dt.type_name, base, "{}", raw);
            assert_eq!(dt.prec, prec, "{}", raw);
            assert_eq!(dt.scale, scale, "{}", raw);
        }
    }

    #[test]
    fn test_tinyint_bool() {
        let mysql = Normalizer::new(Dialect::Mysql, "booktest");
        assert_eq!(mysql.normalize("tinyint(1)", false).unwrap().kind, TypeKind::Bool);
        assert_eq!(
            mysql.normalize("tinyint(4)", false).unwrap().kind,
            TypeKind::SmallInt
        );

        let mssql = Normalizer::new(Dialect::Sqlserver, "dbo");
        assert_eq!(mssql.normalize("tinyint(1)", false).unwrap().kind, TypeKind::Bool);
        assert_eq!(
            mssql.normalize("tinyint(4)", false).unwrap().kind,
            TypeKind::SmallInt
        );
    }

    #[test]
    fn test_unsigned() {
        let mysql = Normalizer::new(Dialect::Mysql, "booktest");
        let dt = mysql.normalize("int(10) unsigned", true).unwrap();
        assert_eq!(dt.type_name, "int");
        assert_eq!(dt.prec, 10);
        assert!(dt.unsigned);
        assert!(dt.nullable);
        assert_eq!(dt.kind, TypeKind::Integer);
    }

    #[test]
    fn test_array() {
        let dt = pg().normalize("character varying(32)[]", false).unwrap();
        assert!(dt.array);
        assert_eq!(dt.type_name, "character varying");
        assert_eq!(dt.prec, 32);
        assert_eq!(dt.kind, TypeKind::Text);

        // only dialects with native arrays strip the marker
        let mysql = Normalizer::new(Dialect::Mysql, "booktest");
        assert!(!mysql.normalize("text", false).unwrap().array);
        let odd = mysql.normalize("text[]", false).unwrap();
        assert!(!odd.array);
        assert_eq!(odd.kind, TypeKind::Named("text[]".to_string()));
    }

    #[test]
    fn test_setof() {
        let dt = pg().normalize("SETOF integer", false).unwrap();
        assert_eq!(dt.kind, TypeKind::SetOf(Box::new(TypeKind::Integer)));
        assert_eq!(dt.type_name, "integer");
    }

    #[test]
    fn test_zoned_timestamp() {
        let oracle = Normalizer::new(Dialect::Oracle, "XO");
        let dt = oracle
            .normalize("TIMESTAMP(6) WITH LOCAL TIME ZONE", false)
            .unwrap();
        assert_eq!(dt.type_name, "timestamp with local time zone");
        assert_eq!(dt.prec, 6);
        assert_eq!(dt.kind, TypeKind::Timestamp);

        let dt = pg().normalize("timestamp(3) without time zone", false).unwrap();
        assert_eq!(dt.type_name, "timestamp without time zone");
        assert_eq!(dt.prec, 3);
    }

    #[test]
    fn test_named_fallback_strips_schema() {
        let dt = pg().normalize("public.book_type", false).unwrap();
        assert_eq!(dt.kind, TypeKind::Named("book_type".to_string()));
        assert_eq!(dt.type_name, "book_type");

        let dt = pg().normalize("other.book_type", false).unwrap();
        assert_eq!(dt.kind, TypeKind::Named("other.book_type".to_string()));

        let dt = pg().normalize("publicity", false).unwrap();
        assert_eq!(dt.kind, TypeKind::Named("publicity".to_string()));
    }

    #[test]
    fn test_sqlite_text_affinity() {
        let sqlite = Normalizer::new(Dialect::Sqlite3, "");
        assert_eq!(
            sqlite.normalize("varchar(255)", false).unwrap().kind,
            TypeKind::Text
        );
        assert_eq!(sqlite.normalize("whatever", false).unwrap().kind, TypeKind::Text);
        assert_eq!(sqlite.normalize("INTEGER", false).unwrap().kind, TypeKind::Integer);
    }

    #[test]
    fn test_oracle_number() {
        let oracle = Normalizer::new(Dialect::Oracle, "XO");
        assert_eq!(oracle.normalize("NUMBER(1)", false).unwrap().kind, TypeKind::Bool);
        assert_eq!(oracle.normalize("NUMBER(10)", false).unwrap().kind, TypeKind::BigInt);
        assert_eq!(oracle.normalize("NUMBER(10,2)", false).unwrap().kind, TypeKind::Double);
        assert_eq!(oracle.normalize("NUMBER", false).unwrap().kind, TypeKind::Decimal);
    }

    #[test]
    fn test_value_list_not_parsed() {
        let mysql = Normalizer::new(Dialect::Mysql, "booktest");
        let dt = mysql.normalize("enum('FICTION','NONFICTION')", false).unwrap();
        assert_eq!(dt.type_name, "enum");
        assert_eq!(dt.prec, 0);
        assert_eq!(dt.kind, TypeKind::Text);
    }

    #[test]
    fn test_malformed_precision() {
        let err = pg().normalize("numeric(ten,2)", false).unwrap_err();
        assert!(matches!(err, SchemataError::Datatype { .. }));
        assert!(err.to_string().contains("numeric(ten,2)"));

        assert!(pg().normalize("numeric(10,x)", false).is_err());
    }
}
