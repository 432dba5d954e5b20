//! Foreign key and index resolution
//!
//! Matches raw index and foreign key rows to the fields of assembled tables
//! and computes accessor names. Everything here is a pure function over the
//! table map, so it can be driven without a database.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace, warn};

use crate::config::{FkMode, TypeFilter};
use crate::dialect::Dialect;
use crate::error::SchemataError;
use crate::introspect::{ForeignKeyRaw, IndexColumnRaw, IndexRaw};
use crate::naming::{camelize, index_param_name, pluralize};
use crate::schema::{Field, ForeignKey, Index, Table};

/// A raw index together with its key columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSource {
    pub index: IndexRaw,
    pub columns: Vec<IndexColumnRaw>,
}

/// Resolve the indexes of every table, keyed `<table>_<index>`
pub fn resolve_indexes(
    dialect: Dialect,
    use_index_names: bool,
    tables: &BTreeMap<String, Table>,
    raw: &BTreeMap<String, Vec<IndexSource>>,
) -> BTreeMap<String, Index> {
    let mut resolved = BTreeMap::new();
    for (name, table) in tables {
        let sources = raw.get(name).map(Vec::as_slice).unwrap_or_default();
        for index in resolve_table_indexes(dialect, use_index_names, table, sources) {
            resolved.insert(format!("{}_{}", name, index.name), index);
        }
    }
    resolved
}

/// Resolve one table's indexes, ordered by index name.
///
/// A primary index is synthesized last when the table has primary key
/// columns but none of the reported indexes is primary.
pub fn resolve_table_indexes(
    dialect: Dialect,
    use_index_names: bool,
    table: &Table,
    sources: &[IndexSource],
) -> Vec<Index> {
    let mut indexes = Vec::with_capacity(sources.len() + 1);

    let mut sources: Vec<&IndexSource> = sources.iter().collect();
    sources.sort_by(|a, b| a.index.name.cmp(&b.index.name));

    for source in sources {
        let mut columns = source.columns.clone();
        columns.sort_by_key(|c| c.seq_no);

        let fields: Vec<Field> = columns
            .iter()
            .filter_map(|c| {
                let field = table.column(&c.column_name);
                if field.is_none() {
                    trace!(
                        table = ?table.name,
                        index = ?source.index.name,
                        column = ?c.column_name,
                        "Index column not in table"
                    );
                }
                field.cloned()
            })
            .collect();

        if fields.is_empty() {
            debug!(table = ?table.name, index = ?source.index.name, "Skipping index with no columns");
            continue;
        }

        let is_unique = source.index.is_unique || source.index.is_primary;
        let func_name = index_func_name(table, &source.index.name, &fields, is_unique, use_index_names);
        trace!(table = ?table.name, index = ?source.index.name, func = ?func_name, "Resolved index");

        indexes.push(Index {
            name: source.index.name.clone(),
            func_name,
            fields,
            is_unique,
            is_primary: source.index.is_primary,
        });
    }

    if !dialect.reports_primary_indexes() {
        mark_primary(table, &mut indexes);
    }

    let has_primary = indexes.iter().any(|ix| ix.is_primary);
    if !has_primary && !table.primary_keys.is_empty() && dialect.reports_primary_indexes() {
        let index = primary_index(table);
        debug!(table = ?table.name, index = ?index.name, "Synthesized primary key index");
        indexes.push(index);
    }

    indexes
}

/// Flag the first index covering only primary key columns
fn mark_primary(table: &Table, indexes: &mut [Index]) {
    if table.primary_keys.is_empty() {
        return;
    }
    let candidate = indexes.iter_mut().find(|ix| {
        ix.is_unique
            && ix.fields.len() == table.primary_keys.len()
            && ix.fields.iter().all(|f| f.is_primary)
    });
    if let Some(index) = candidate {
        trace!(table = ?table.name, index = ?index.name, "Marked primary index");
        index.is_primary = true;
    }
}

fn primary_index(table: &Table) -> Index {
    let columns: Vec<&str> = table
        .primary_keys
        .iter()
        .map(|f| f.column_name.as_str())
        .collect();
    let params: String = table.primary_keys.iter().map(|f| f.name.as_str()).collect();

    Index {
        name: format!("{}_{}_pkey", table.name, columns.join("_")),
        func_name: format!("{}By{}", table.type_name, params),
        fields: table.primary_keys.clone(),
        is_unique: true,
        is_primary: true,
    }
}

fn index_func_name(
    table: &Table,
    index_name: &str,
    fields: &[Field],
    is_unique: bool,
    use_index_names: bool,
) -> String {
    let prefix = if is_unique {
        table.type_name.clone()
    } else {
        pluralize(&table.type_name)
    };

    if use_index_names {
        let name = index_param_name(index_name, &table.name);
        if !name.is_empty() {
            return format!("{}By{}", prefix, name);
        }
    }

    let params: String = fields.iter().map(|f| f.name.as_str()).collect();
    format!("{}By{}", prefix, params)
}

/// Resolve every foreign key, keyed by constraint name
pub fn resolve_foreign_keys(
    mode: FkMode,
    tables: &BTreeMap<String, Table>,
    raw: &BTreeMap<String, Vec<ForeignKeyRaw>>,
    filter: &TypeFilter,
) -> Result<BTreeMap<String, ForeignKey>, SchemataError> {
    let by_table = resolve_table_foreign_keys(mode, tables, raw, filter)?;
    Ok(by_table
        .into_values()
        .flatten()
        .map(|fk| (fk.name.clone(), fk))
        .collect())
}

/// Resolve every foreign key, grouped by owning table and sorted by name
/// within each table.
pub fn resolve_table_foreign_keys(
    mode: FkMode,
    tables: &BTreeMap<String, Table>,
    raw: &BTreeMap<String, Vec<ForeignKeyRaw>>,
    filter: &TypeFilter,
) -> Result<BTreeMap<String, Vec<ForeignKey>>, SchemataError> {
    // (owning table, source type, key)
    let mut resolved: Vec<(String, String, ForeignKey)> = Vec::new();

    for (table_name, rows) in raw {
        let Some(table) = tables.get(table_name) else {
            continue;
        };

        let rows = name_unnamed_keys(table, rows);

        let mut seen: Vec<String> = Vec::new();
        for row in &rows {
            let Some(fk) = resolve_one(table, row, tables, filter)? else {
                continue;
            };
            if seen.contains(&fk.name) {
                debug!(
                    table = ?table.name,
                    constraint = ?fk.name,
                    column = ?row.column_name,
                    "Keeping first column of composite foreign key"
                );
                continue;
            }
            seen.push(fk.name.clone());
            resolved.push((table.name.clone(), table.type_name.clone(), fk));
        }
    }

    let mut pairs: HashMap<(String, String), usize> = HashMap::new();
    for (_, source_type, fk) in &resolved {
        *pairs
            .entry((source_type.clone(), fk.ref_type.clone()))
            .or_default() += 1;
    }

    let mut by_table: BTreeMap<String, Vec<ForeignKey>> = BTreeMap::new();
    for (table_name, source_type, mut fk) in resolved {
        let collides = pairs
            .get(&(source_type, fk.ref_type.clone()))
            .is_some_and(|n| *n > 1);
        fk.resolved_name = foreign_key_name(mode, &fk, collides);
        trace!(table = ?table_name, constraint = ?fk.name, name = ?fk.resolved_name, "Named foreign key");
        by_table.entry(table_name).or_default().push(fk);
    }

    for keys in by_table.values_mut() {
        keys.sort_by(|a, b| a.name.cmp(&b.name));
    }

    Ok(by_table)
}

/// Sort rows by key id and give unnamed keys the name
/// `<table>_<first column>_fkey`, shared by every column of the same key id.
fn name_unnamed_keys(table: &Table, rows: &[ForeignKeyRaw]) -> Vec<ForeignKeyRaw> {
    let mut rows = rows.to_vec();
    rows.sort_by_key(|r| r.key_id);

    let mut synthesized: HashMap<i32, String> = HashMap::new();
    for row in rows.iter_mut().filter(|r| r.name.is_empty()) {
        row.name = synthesized
            .entry(row.key_id)
            .or_insert_with(|| format!("{}_{}_fkey", table.name, row.column_name))
            .clone();
    }
    rows
}

/// Match one raw row to fields. `None` means the row was skipped.
fn resolve_one(
    table: &Table,
    row: &ForeignKeyRaw,
    tables: &BTreeMap<String, Table>,
    filter: &TypeFilter,
) -> Result<Option<ForeignKey>, SchemataError> {
    let constraint = row.name.clone();
    let fail = |message: String| SchemataError::ForeignKey {
        table: table.name.clone(),
        constraint: constraint.clone(),
        message,
    };

    if !filter.should_include(&row.ref_table_name) && !tables.contains_key(&row.ref_table_name) {
        warn!(
            table = ?table.name,
            constraint = ?constraint,
            ref_table = ?row.ref_table_name,
            "Skipping foreign key to excluded table"
        );
        return Ok(None);
    }
    if !filter.should_include_column(&table.name, &row.column_name) {
        warn!(
            table = ?table.name,
            constraint = ?constraint,
            column = ?row.column_name,
            "Skipping foreign key on excluded column"
        );
        return Ok(None);
    }

    let field = table
        .column(&row.column_name)
        .ok_or_else(|| fail(format!("column '{}' not found", row.column_name)))?;

    let ref_table = tables
        .get(&row.ref_table_name)
        .ok_or_else(|| fail(format!("referenced table '{}' not found", row.ref_table_name)))?;

    let ref_field = match ref_table.column(&row.ref_column_name) {
        Some(f) => f,
        None => {
            let pk = ref_table.primary_key().ok_or_else(|| {
                fail(format!(
                    "referenced column '{}' not found and '{}' has no primary key",
                    row.ref_column_name, ref_table.name
                ))
            })?;
            debug!(
                table = ?table.name,
                constraint = ?constraint,
                ref_table = ?ref_table.name,
                ref_column = ?pk.column_name,
                "Referenced column unresolved, using primary key"
            );
            pk
        }
    };

    let covering =
        |ix: &&Index| ix.fields.len() == 1 && ix.fields[0].column_name == ref_field.column_name;
    let ref_index = ref_table
        .indexes
        .iter()
        .filter(covering)
        .find(|ix| ix.is_primary)
        .or_else(|| ref_table.indexes.iter().filter(covering).find(|ix| ix.is_unique));

    Ok(Some(ForeignKey {
        name: constraint.clone(),
        resolved_name: String::new(),
        field: field.clone(),
        ref_table: ref_table.name.clone(),
        ref_type: ref_table.type_name.clone(),
        ref_field: ref_field.clone(),
        ref_index: ref_index.map(|ix| ix.name.clone()).unwrap_or_default(),
        ref_func_name: match ref_index {
            Some(ix) => ix.func_name.clone(),
            None => format!("{}By{}", ref_table.type_name, ref_field.name),
        },
    }))
}

fn foreign_key_name(mode: FkMode, fk: &ForeignKey, collides: bool) -> String {
    match mode {
        FkMode::Parent => fk.ref_type.clone(),
        FkMode::Field => format!("{}By{}", fk.ref_type, fk.field.name),
        FkMode::Key => format!("{}By{}", fk.ref_type, camelize(&fk.name)),
        FkMode::Smart if collides => format!("{}By{}", fk.ref_type, fk.field.name),
        FkMode::Smart => fk.ref_type.clone(),
    }
}
