#![allow(dead_code)]

use std::collections::HashMap;

use schemata::dialect::Dialect;
use schemata::error::SchemataError;
use schemata::introspect::{
    Capabilities, ColumnRaw, EnumRaw, EnumValueRaw, ForeignKeyRaw, IndexColumnRaw, IndexRaw,
    Loader, ProcParamRaw, ProcRaw, SequenceRaw, TableRaw,
};
use schemata::schema::{ProcKind, TableKind};

/// In-memory loader serving canned metadata
pub struct FakeLoader {
    pub dialect: Dialect,
    pub caps: Capabilities,
    pub schema: String,
    pub enums: Vec<(String, Vec<EnumValueRaw>)>,
    pub procs: Vec<ProcRaw>,
    pub proc_params: HashMap<String, Vec<ProcParamRaw>>,
    pub tables: Vec<TableRaw>,
    pub columns: HashMap<String, Vec<ColumnRaw>>,
    pub sequences: Vec<SequenceRaw>,
    pub foreign_keys: HashMap<String, Vec<ForeignKeyRaw>>,
    pub indexes: HashMap<String, Vec<(IndexRaw, Vec<IndexColumnRaw>)>>,
    /// Columns reported for any temporary view
    pub view_columns: Vec<ColumnRaw>,
    pub fail_view_columns: bool,
    pub fail_view_truncate: bool,
    /// Schema reported by `view_schema`
    pub temp_schema: String,
    /// Every view operation, e.g. `create main._xo_00000000`
    pub log: Vec<String>,
}

impl FakeLoader {
    pub fn new(dialect: Dialect, schema: &str) -> Self {
        Self {
            dialect,
            caps: Capabilities::default(),
            schema: schema.to_string(),
            enums: Vec::new(),
            procs: Vec::new(),
            proc_params: HashMap::new(),
            tables: Vec::new(),
            columns: HashMap::new(),
            sequences: Vec::new(),
            foreign_keys: HashMap::new(),
            indexes: HashMap::new(),
            view_columns: Vec::new(),
            fail_view_columns: false,
            fail_view_truncate: false,
            temp_schema: String::new(),
            log: Vec::new(),
        }
    }

    pub fn postgres() -> Self {
        let mut loader = Self::new(Dialect::Postgres, "public");
        loader.caps = Capabilities {
            enums: true,
            procs: true,
            sequences: true,
            view_schema: true,
            view_truncate: false,
        };
        loader.temp_schema = "pg_temp_3".to_string();
        loader
    }

    pub fn with_table(mut self, name: &str, kind: TableKind, columns: Vec<ColumnRaw>) -> Self {
        self.tables.push(TableRaw {
            name: name.to_string(),
            kind,
            comment: String::new(),
            definition: if kind == TableKind::View {
                format!("SELECT * FROM {}_source", name)
            } else {
                String::new()
            },
        });
        self.columns.insert(name.to_string(), columns);
        self
    }

    pub fn with_index(mut self, table: &str, index: IndexRaw, columns: &[&str]) -> Self {
        let columns = columns
            .iter()
            .enumerate()
            .map(|(i, c)| IndexColumnRaw {
                seq_no: i as i32 + 1,
                column_name: c.to_string(),
            })
            .collect();
        self.indexes
            .entry(table.to_string())
            .or_default()
            .push((index, columns));
        self
    }

    pub fn with_foreign_key(
        mut self,
        table: &str,
        name: &str,
        column: &str,
        ref_table: &str,
        ref_column: &str,
    ) -> Self {
        let keys = self.foreign_keys.entry(table.to_string()).or_default();
        let key_id = keys.len() as i32 + 1;
        keys.push(ForeignKeyRaw {
            name: name.to_string(),
            column_name: column.to_string(),
            ref_table_name: ref_table.to_string(),
            ref_column_name: ref_column.to_string(),
            key_id,
        });
        self
    }

    pub fn with_sequence(mut self, table: &str, column: &str) -> Self {
        self.sequences.push(SequenceRaw {
            table_name: table.to_string(),
            column_name: column.to_string(),
        });
        self
    }

    pub fn with_enum(mut self, name: &str, labels: &[&str]) -> Self {
        let values = labels
            .iter()
            .enumerate()
            .map(|(i, l)| EnumValueRaw {
                value: l.to_string(),
                const_value: i as i64 + 1,
            })
            .collect();
        self.enums.push((name.to_string(), values));
        self
    }

    /// One proc row per return type; an empty `returns` means void
    pub fn with_proc(mut self, id: &str, name: &str, params: &[(&str, &str)], returns: &[(&str, &str)]) -> Self {
        let rows: Vec<(&str, &str)> = if returns.is_empty() {
            vec![("", "void")]
        } else {
            returns.to_vec()
        };
        for (return_name, return_type) in rows {
            self.procs.push(ProcRaw {
                id: id.to_string(),
                name: name.to_string(),
                kind: ProcKind::Function,
                return_name: return_name.to_string(),
                return_type: return_type.to_string(),
                definition: "SELECT 1".to_string(),
            });
        }
        self.proc_params.insert(
            id.to_string(),
            params
                .iter()
                .map(|(n, t)| ProcParamRaw {
                    name: n.to_string(),
                    param_type: t.to_string(),
                })
                .collect(),
        );
        self
    }

    fn is_temp(&self, name: &str) -> bool {
        name.starts_with(self.dialect.temp_prefix())
    }
}

pub fn column(ordinal: i32, name: &str, data_type: &str, not_null: bool) -> ColumnRaw {
    ColumnRaw {
        ordinal,
        name: name.to_string(),
        data_type: data_type.to_string(),
        not_null,
        is_primary_key: false,
        default: None,
        comment: String::new(),
    }
}

pub fn pk_column(ordinal: i32, name: &str, data_type: &str) -> ColumnRaw {
    ColumnRaw {
        is_primary_key: true,
        ..column(ordinal, name, data_type, true)
    }
}

fn failure(schema: &str, message: &str) -> SchemataError {
    SchemataError::Introspection {
        schema: schema.to_string(),
        message: message.to_string(),
    }
}

pub fn index(name: &str, is_unique: bool, is_primary: bool) -> IndexRaw {
    IndexRaw {
        name: name.to_string(),
        is_unique,
        is_primary,
    }
}

impl Loader for FakeLoader {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn schema(&mut self) -> Result<String, SchemataError> {
        Ok(self.schema.clone())
    }

    fn enums(&mut self, _schema: &str) -> Result<Vec<EnumRaw>, SchemataError> {
        Ok(self
            .enums
            .iter()
            .map(|(name, _)| EnumRaw { name: name.clone() })
            .collect())
    }

    fn enum_values(
        &mut self,
        _schema: &str,
        enum_name: &str,
    ) -> Result<Vec<EnumValueRaw>, SchemataError> {
        Ok(self
            .enums
            .iter()
            .find(|(name, _)| name == enum_name)
            .map(|(_, values)| values.clone())
            .unwrap_or_default())
    }

    fn procs(&mut self, _schema: &str) -> Result<Vec<ProcRaw>, SchemataError> {
        Ok(self.procs.clone())
    }

    fn proc_params(
        &mut self,
        _schema: &str,
        proc_id: &str,
    ) -> Result<Vec<ProcParamRaw>, SchemataError> {
        Ok(self.proc_params.get(proc_id).cloned().unwrap_or_default())
    }

    fn tables(&mut self, _schema: &str, kind: TableKind) -> Result<Vec<TableRaw>, SchemataError> {
        Ok(self
            .tables
            .iter()
            .filter(|t| t.kind == kind)
            .cloned()
            .collect())
    }

    fn table_columns(&mut self, schema: &str, table: &str) -> Result<Vec<ColumnRaw>, SchemataError> {
        if self.is_temp(table) {
            self.log.push(format!("columns {}.{}", schema, table));
            if self.fail_view_columns {
                return Err(failure(schema, "view columns unavailable"));
            }
            return Ok(self.view_columns.clone());
        }
        Ok(self.columns.get(table).cloned().unwrap_or_default())
    }

    fn table_sequences(&mut self, _schema: &str) -> Result<Vec<SequenceRaw>, SchemataError> {
        Ok(self.sequences.clone())
    }

    fn table_foreign_keys(
        &mut self,
        _schema: &str,
        table: &str,
    ) -> Result<Vec<ForeignKeyRaw>, SchemataError> {
        Ok(self.foreign_keys.get(table).cloned().unwrap_or_default())
    }

    fn table_indexes(&mut self, _schema: &str, table: &str) -> Result<Vec<IndexRaw>, SchemataError> {
        Ok(self
            .indexes
            .get(table)
            .map(|ixs| ixs.iter().map(|(ix, _)| ix.clone()).collect())
            .unwrap_or_default())
    }

    fn index_columns(
        &mut self,
        _schema: &str,
        table: &str,
        index: &str,
    ) -> Result<Vec<IndexColumnRaw>, SchemataError> {
        Ok(self
            .indexes
            .get(table)
            .and_then(|ixs| ixs.iter().find(|(ix, _)| ix.name == index))
            .map(|(_, cols)| cols.clone())
            .unwrap_or_default())
    }

    fn view_create(&mut self, schema: &str, id: &str, query: &[String]) -> Result<(), SchemataError> {
        self.log.push(format!("create {}.{} AS {}", schema, id, query.join("\n")));
        Ok(())
    }

    fn view_schema(&mut self, id: &str) -> Result<String, SchemataError> {
        self.log.push(format!("schema {}", id));
        Ok(self.temp_schema.clone())
    }

    fn view_truncate(&mut self, schema: &str, id: &str) -> Result<(), SchemataError> {
        self.log.push(format!("truncate {}.{}", schema, id));
        if self.fail_view_truncate {
            return Err(failure(schema, "truncate failed"));
        }
        Ok(())
    }

    fn view_drop(&mut self, schema: &str, id: &str) -> Result<(), SchemataError> {
        self.log.push(format!("drop {}.{}", schema, id));
        Ok(())
    }
}

/// The authors/books fixture used across tests
pub fn booktest() -> FakeLoader {
    FakeLoader::postgres()
        .with_enum("book_type", &["FICTION", "NONFICTION"])
        .with_table(
            "authors",
            TableKind::Table,
            vec![
                ColumnRaw {
                    default: Some("nextval('authors_author_id_seq'::regclass)".to_string()),
                    ..pk_column(1, "author_id", "integer")
                },
                column(2, "name", "text", true),
            ],
        )
        .with_table(
            "books",
            TableKind::Table,
            vec![
                pk_column(1, "book_id", "integer"),
                column(2, "author_id", "integer", true),
                column(3, "isbn", "varchar(255)", true),
                column(4, "book_type", "book_type", false),
                ColumnRaw {
                    default: Some("NULL".to_string()),
                    ..column(5, "title", "text", false)
                },
                ColumnRaw {
                    default: Some("now()".to_string()),
                    ..column(6, "published", "timestamp with time zone", true)
                },
            ],
        )
        .with_sequence("authors", "author_id")
        .with_sequence("books", "book_id")
        .with_index("authors", index("authors_pkey", true, true), &["author_id"])
        .with_index("books", index("books_pkey", true, true), &["book_id"])
        .with_index("books", index("books_isbn_key", true, false), &["isbn"])
        .with_index("books", index("books_author_id_idx", false, false), &["author_id"])
        .with_foreign_key("books", "books_author_id_fkey", "author_id", "authors", "author_id")
        .with_proc("16401", "say_hello", &[("name", "text")], &[("", "text")])
        .with_proc("16402", "touch_book", &[("", "integer")], &[])
}
