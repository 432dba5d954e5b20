use postgres::types::ToSql;
use postgres::{Client, NoTls, Row};
use tracing::{debug, error, info, trace};

use super::{
    Capabilities, ColumnRaw, EnumRaw, EnumValueRaw, ForeignKeyRaw, IndexColumnRaw, IndexRaw,
    Loader, ProcParamRaw, ProcRaw, SequenceRaw, TableRaw,
};
use crate::config::DbConfig;
use crate::dialect::Dialect;
use crate::prelude::SchemataError;
use crate::schema::{ProcKind, TableKind};

/// PostgreSQL loader
pub struct PostgresLoader {
    client: Client,
}

impl PostgresLoader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using a `postgres://` style URL (any postgres scheme alias)
    pub fn connect(config: &DbConfig) -> Result<Self, SchemataError> {
        info!(url = %config.redacted_url(), "Connecting to PostgreSQL");

        let client = Client::connect(&connection_url(&config.url), NoTls).map_err(|e| {
            error!(url = %config.redacted_url(), error = ?e, "Failed to connect");
            SchemataError::Connection(format!("{}: {}", config.redacted_url(), e))
        })?;

        info!("Connected to database");
        Ok(Self::new(client))
    }

    fn query(
        &mut self,
        schema: &str,
        what: &str,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, SchemataError> {
        trace!(schema = ?schema, what = what, "Querying");
        self.client.query(sql, params).map_err(|e| {
            error!(schema = ?schema, error = ?e, "Failed to query {}", what);
            SchemataError::introspection(schema, format!("Failed to query {}: {}", what, e))
        })
    }

    fn execute(&mut self, schema: &str, what: &str, sql: &str) -> Result<(), SchemataError> {
        debug!(sql = %sql, "Executing");
        self.client.batch_execute(sql).map_err(|e| {
            error!(schema = ?schema, error = ?e, "Failed to {}", what);
            SchemataError::introspection(schema, format!("Failed to {}: {}", what, e))
        })
    }
}

/// Open a boxed loader for the registry
pub(crate) fn open(config: &DbConfig) -> Result<Box<dyn Loader>, SchemataError> {
    Ok(Box::new(PostgresLoader::connect(config)?))
}

/// Rewrite scheme aliases (`pg://`, `pgsql://`) to one libpq understands
fn connection_url(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) if !matches!(scheme, "postgres" | "postgresql") => {
            format!("postgres://{}", rest)
        }
        _ => url.to_string(),
    }
}

impl Loader for PostgresLoader {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            enums: true,
            procs: true,
            sequences: true,
            view_schema: true,
            view_truncate: false,
        }
    }

    fn schema(&mut self) -> Result<String, SchemataError> {
        let rows = self.query("", "current schema", "SELECT current_schema()", &[])?;
        rows.first()
            .map(|row| row.get(0))
            .ok_or_else(|| SchemataError::introspection("", "no current schema"))
    }

    fn enums(&mut self, schema: &str) -> Result<Vec<EnumRaw>, SchemataError> {
        let sql = r#"
            SELECT DISTINCT t.typname AS enum_name
            FROM pg_type t
            JOIN pg_namespace n ON n.oid = t.typnamespace
            JOIN pg_enum e ON e.enumtypid = t.oid
            WHERE n.nspname = $1
            ORDER BY t.typname
        "#;

        let rows = self.query(schema, "enums", sql, &[&schema])?;
        Ok(rows
            .iter()
            .map(|row| EnumRaw {
                name: row.get("enum_name"),
            })
            .collect())
    }

    fn enum_values(
        &mut self,
        schema: &str,
        enum_name: &str,
    ) -> Result<Vec<EnumValueRaw>, SchemataError> {
        let sql = r#"
            SELECT
                e.enumlabel AS enum_value,
                ROW_NUMBER() OVER (ORDER BY e.enumsortorder)::int8 AS const_value
            FROM pg_type t
            JOIN pg_namespace n ON n.oid = t.typnamespace
            JOIN pg_enum e ON e.enumtypid = t.oid
            WHERE n.nspname = $1
                AND t.typname = $2
            ORDER BY e.enumsortorder
        "#;

        let rows = self.query(schema, "enum values", sql, &[&schema, &enum_name])?;
        Ok(rows
            .iter()
            .map(|row| EnumValueRaw {
                value: row.get("enum_value"),
                const_value: row.get("const_value"),
            })
            .collect())
    }

    fn procs(&mut self, schema: &str) -> Result<Vec<ProcRaw>, SchemataError> {
        // one row per OUT/TABLE column, or a single row for the plain return type
        let sql = r#"
            SELECT
                p.oid::text AS proc_id,
                p.proname AS proc_name,
                CASE WHEN p.prokind = 'p' THEN 'procedure' ELSE 'function' END AS proc_type,
                COALESCE(o.name, '') AS return_name,
                COALESCE(
                    format_type(o.type, NULL),
                    CASE WHEN p.proretset THEN 'SETOF ' ELSE '' END || format_type(p.prorettype, NULL)
                ) AS return_type,
                COALESCE(p.prosrc, '') AS proc_def
            FROM pg_proc p
            JOIN pg_namespace n ON n.oid = p.pronamespace
            LEFT JOIN LATERAL (
                SELECT a.name, a.type, a.ord
                FROM unnest(
                    COALESCE(p.proallargtypes, p.proargtypes::oid[]),
                    p.proargmodes,
                    p.proargnames
                ) WITH ORDINALITY AS a(type, mode, name, ord)
                WHERE a.mode IN ('o', 'b', 't')
            ) o ON true
            WHERE n.nspname = $1
                AND p.prokind IN ('f', 'p')
            ORDER BY p.proname, p.oid, o.ord
        "#;

        let rows = self.query(schema, "procs", sql, &[&schema])?;
        Ok(rows
            .iter()
            .map(|row| {
                let kind: String = row.get("proc_type");
                ProcRaw {
                    id: row.get("proc_id"),
                    name: row.get("proc_name"),
                    kind: if kind == "procedure" {
                        ProcKind::Procedure
                    } else {
                        ProcKind::Function
                    },
                    return_name: row.get("return_name"),
                    return_type: row.get("return_type"),
                    definition: row.get("proc_def"),
                }
            })
            .collect())
    }

    fn proc_params(
        &mut self,
        schema: &str,
        proc_id: &str,
    ) -> Result<Vec<ProcParamRaw>, SchemataError> {
        let sql = r#"
            SELECT
                COALESCE(a.name, '') AS param_name,
                format_type(a.type, NULL) AS param_type
            FROM pg_proc p
            CROSS JOIN LATERAL unnest(
                COALESCE(p.proallargtypes, p.proargtypes::oid[]),
                p.proargmodes,
                p.proargnames
            ) WITH ORDINALITY AS a(type, mode, name, ord)
            WHERE p.oid = $1::text::oid
                AND COALESCE(a.mode, 'i') IN ('i', 'b', 'v')
            ORDER BY a.ord
        "#;

        let rows = self.query(schema, "proc params", sql, &[&proc_id])?;
        Ok(rows
            .iter()
            .map(|row| ProcParamRaw {
                name: row.get("param_name"),
                param_type: row.get("param_type"),
            })
            .collect())
    }

    fn tables(&mut self, schema: &str, kind: TableKind) -> Result<Vec<TableRaw>, SchemataError> {
        let sql = r#"
            SELECT
                c.relname AS table_name,
                COALESCE(obj_description(c.oid, 'pg_class'), '') AS table_comment,
                CASE WHEN c.relkind IN ('v', 'm')
                    THEN COALESCE(pg_get_viewdef(c.oid, true), '')
                    ELSE ''
                END AS view_def
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1
                AND c.relkind::text = ANY($2::text[])
            ORDER BY c.relname
        "#;

        let relkinds: Vec<&str> = match kind {
            TableKind::Table => vec!["r", "p"],
            TableKind::View => vec!["v", "m"],
        };
        let rows = self.query(schema, kind.as_str(), sql, &[&schema, &relkinds])?;

        let tables: Vec<TableRaw> = rows
            .iter()
            .map(|row| TableRaw {
                name: row.get("table_name"),
                kind,
                comment: row.get("table_comment"),
                definition: row.get("view_def"),
            })
            .collect();
        trace!(kind = %kind, count = ?tables.len(), "Tables found");
        Ok(tables)
    }

    fn table_columns(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnRaw>, SchemataError> {
        let sql = r#"
            SELECT
                a.attnum::int4 AS ordinal,
                a.attname AS column_name,
                format_type(a.atttypid, a.atttypmod) AS data_type,
                a.attnotnull AS not_null,
                COALESCE(i.indisprimary, false) AS is_primary_key,
                pg_get_expr(d.adbin, d.adrelid) AS default_value,
                COALESCE(col_description(c.oid, a.attnum), '') AS column_comment
            FROM pg_attribute a
            JOIN pg_class c ON c.oid = a.attrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            LEFT JOIN pg_attrdef d ON d.adrelid = c.oid AND d.adnum = a.attnum
            LEFT JOIN pg_index i ON i.indrelid = c.oid
                AND i.indisprimary
                AND a.attnum = ANY(i.indkey)
            WHERE n.nspname = $1
                AND c.relname = $2
                AND a.attnum > 0
                AND NOT a.attisdropped
            ORDER BY a.attnum
        "#;

        let rows = self.query(schema, "columns", sql, &[&schema, &table])?;
        let columns: Vec<ColumnRaw> = rows
            .iter()
            .map(|row| ColumnRaw {
                ordinal: row.get("ordinal"),
                name: row.get("column_name"),
                data_type: row.get("data_type"),
                not_null: row.get("not_null"),
                is_primary_key: row.get("is_primary_key"),
                default: row.get("default_value"),
                comment: row.get("column_comment"),
            })
            .collect();
        trace!(table = ?table, columns = ?columns.len(), "Found columns");
        Ok(columns)
    }

    fn table_sequences(&mut self, schema: &str) -> Result<Vec<SequenceRaw>, SchemataError> {
        // serial columns own their sequence ('a'); identity columns are internal ('i')
        let sql = r#"
            SELECT t.relname AS table_name, a.attname AS column_name
            FROM pg_class s
            JOIN pg_depend d ON d.objid = s.oid
                AND d.classid = 'pg_class'::regclass
                AND d.refclassid = 'pg_class'::regclass
            JOIN pg_class t ON t.oid = d.refobjid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = d.refobjsubid
            WHERE s.relkind = 'S'
                AND d.deptype IN ('a', 'i')
                AND n.nspname = $1
            ORDER BY t.relname, a.attname
        "#;

        let rows = self.query(schema, "sequences", sql, &[&schema])?;
        Ok(rows
            .iter()
            .map(|row| SequenceRaw {
                table_name: row.get("table_name"),
                column_name: row.get("column_name"),
            })
            .collect())
    }

    fn table_foreign_keys(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ForeignKeyRaw>, SchemataError> {
        let sql = r#"
            SELECT
                con.conname AS fk_name,
                a.attname AS column_name,
                rc.relname AS ref_table,
                ra.attname AS ref_column,
                k.ord::int4 AS key_id
            FROM pg_constraint con
            JOIN pg_class c ON c.oid = con.conrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            JOIN pg_class rc ON rc.oid = con.confrelid
            CROSS JOIN LATERAL unnest(con.conkey, con.confkey)
                WITH ORDINALITY AS k(attnum, refnum, ord)
            JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
            JOIN pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = k.refnum
            WHERE con.contype = 'f'
                AND n.nspname = $1
                AND c.relname = $2
            ORDER BY con.conname, k.ord
        "#;

        let rows = self.query(schema, "foreign keys", sql, &[&schema, &table])?;
        Ok(rows
            .iter()
            .map(|row| ForeignKeyRaw {
                name: row.get("fk_name"),
                column_name: row.get("column_name"),
                ref_table_name: row.get("ref_table"),
                ref_column_name: row.get("ref_column"),
                key_id: row.get("key_id"),
            })
            .collect())
    }

    fn table_indexes(&mut self, schema: &str, table: &str) -> Result<Vec<IndexRaw>, SchemataError> {
        let sql = r#"
            SELECT
                ic.relname AS index_name,
                i.indisunique AS is_unique,
                i.indisprimary AS is_primary
            FROM pg_index i
            JOIN pg_class c ON c.oid = i.indrelid
            JOIN pg_class ic ON ic.oid = i.indexrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1
                AND c.relname = $2
            ORDER BY ic.relname
        "#;

        let rows = self.query(schema, "indexes", sql, &[&schema, &table])?;
        Ok(rows
            .iter()
            .map(|row| IndexRaw {
                name: row.get("index_name"),
                is_unique: row.get("is_unique"),
                is_primary: row.get("is_primary"),
            })
            .collect())
    }

    fn index_columns(
        &mut self,
        schema: &str,
        table: &str,
        index: &str,
    ) -> Result<Vec<IndexColumnRaw>, SchemataError> {
        // expression columns have attnum 0 and come back unnamed
        let sql = r#"
            SELECT
                k.ord::int4 AS seq_no,
                COALESCE(a.attname::text, '') AS column_name
            FROM pg_index i
            JOIN pg_class c ON c.oid = i.indrelid
            JOIN pg_class ic ON ic.oid = i.indexrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            CROSS JOIN LATERAL unnest(i.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
            LEFT JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = k.attnum
            WHERE n.nspname = $1
                AND c.relname = $2
                AND ic.relname = $3
            ORDER BY k.ord
        "#;

        let rows = self.query(schema, "index columns", sql, &[&schema, &table, &index])?;
        Ok(rows
            .iter()
            .map(|row| IndexColumnRaw {
                seq_no: row.get("seq_no"),
                column_name: row.get("column_name"),
            })
            .collect())
    }

    fn view_create(&mut self, schema: &str, id: &str, query: &[String]) -> Result<(), SchemataError> {
        let sql = format!(
            "CREATE TEMPORARY VIEW {} AS {}",
            quote_ident(id),
            query.join("\n")
        );
        self.execute(schema, "create introspection view", &sql)
    }

    fn view_schema(&mut self, id: &str) -> Result<String, SchemataError> {
        let sql = r#"
            SELECT n.nspname AS schema_name
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE c.relname = $1
                AND n.oid = pg_my_temp_schema()
        "#;

        let rows = self.query("pg_temp", "view schema", sql, &[&id])?;
        rows.first()
            .map(|row| row.get("schema_name"))
            .ok_or_else(|| SchemataError::introspection("pg_temp", format!("view '{}' not found", id)))
    }

    fn view_drop(&mut self, schema: &str, id: &str) -> Result<(), SchemataError> {
        let sql = format!("DROP VIEW IF EXISTS pg_temp.{}", quote_ident(id));
        self.execute(schema, "drop introspection view", &sql)
    }
}

fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url() {
        assert_eq!(
            connection_url("postgres://u:p@localhost/db"),
            "postgres://u:p@localhost/db"
        );
        assert_eq!(
            connection_url("postgresql://localhost/db"),
            "postgresql://localhost/db"
        );
        assert_eq!(connection_url("pg://localhost/db"), "postgres://localhost/db");
        assert_eq!(
            connection_url("pgsql://u@localhost/db"),
            "postgres://u@localhost/db"
        );
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("_xo_abc"), "\"_xo_abc\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
