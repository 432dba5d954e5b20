//! Schema assembly
//!
//! Drives a [`Loader`] through every metadata category and builds the
//! [`Schema`] IR: enums, procs, tables and views with their columns, then
//! indexes and foreign keys via [`crate::resolve`].

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, trace};

use crate::config::{SchemaOptions, TypeFilter};
use crate::datatype::Normalizer;
use crate::error::SchemataError;
use crate::introspect::{Loader, ProcRaw};
use crate::naming::{camelize, singularize_identifier};
use crate::resolve::{resolve_table_foreign_keys, resolve_table_indexes, IndexSource};
use crate::schema::{Datatype, Enum, Field, Proc, Schema, Table, TableKind};

/// Load and assemble the complete schema
pub fn load_schema(loader: &mut dyn Loader, opts: &SchemaOptions) -> Result<Schema, SchemataError> {
    let dialect = loader.dialect();
    let schema_name = match &opts.schema {
        Some(name) => name.clone(),
        None => loader.schema()?,
    };
    info!(driver = %dialect, schema = ?schema_name, "Starting schema introspection");

    let normalizer = Normalizer::new(dialect, &schema_name);
    let caps = loader.capabilities();

    let enums = if caps.enums {
        load_enums(loader, &schema_name, &opts.filter)?
    } else {
        debug!(driver = %dialect, "Driver has no enums");
        Vec::new()
    };

    let procs = if caps.procs {
        load_procs(loader, &schema_name, &normalizer, &opts.filter)?
    } else {
        debug!(driver = %dialect, "Driver has no stored procedures");
        Vec::new()
    };

    let sequences = if caps.sequences {
        loader
            .table_sequences(&schema_name)?
            .into_iter()
            .map(|s| (s.table_name, s.column_name))
            .collect()
    } else {
        BTreeSet::new()
    };
    trace!(sequences = ?sequences, "Loaded sequences");

    let mut merged: BTreeMap<String, Table> = BTreeMap::new();
    for kind in [TableKind::Table, TableKind::View] {
        for table in load_tables(loader, &schema_name, kind, &normalizer, &opts.filter, &sequences)? {
            if let Some(prev) = merged.insert(table.name.clone(), table) {
                debug!(name = ?prev.name, "View replaces table of the same name");
            }
        }
    }

    for (name, table) in merged.iter_mut() {
        let mut sources = Vec::new();
        for index in loader.table_indexes(&schema_name, name)? {
            let columns = loader.index_columns(&schema_name, name, &index.name)?;
            sources.push(IndexSource { index, columns });
        }
        table.indexes = resolve_table_indexes(dialect, opts.use_index_names, table, &sources);
        trace!(table = ?name, indexes = ?table.indexes.len(), "Resolved indexes");
    }

    let mut raw_keys = BTreeMap::new();
    for name in merged.keys() {
        let keys = loader.table_foreign_keys(&schema_name, name)?;
        if !keys.is_empty() {
            raw_keys.insert(name.clone(), keys);
        }
    }
    let mut keys = resolve_table_foreign_keys(opts.fk_mode, &merged, &raw_keys, &opts.filter)?;
    for (name, table) in merged.iter_mut() {
        table.foreign_keys = keys.remove(name).unwrap_or_default();
    }

    let (tables, views): (Vec<Table>, Vec<Table>) = merged
        .into_values()
        .partition(|t| t.kind == TableKind::Table);

    info!(
        schema = ?schema_name,
        enums = ?enums.len(),
        procs = ?procs.len(),
        tables = ?tables.len(),
        views = ?views.len(),
        "Schema introspection complete"
    );

    Ok(Schema {
        driver: dialect,
        name: schema_name,
        enums,
        procs,
        tables,
        views,
    })
}

fn load_enums(
    loader: &mut dyn Loader,
    schema: &str,
    filter: &TypeFilter,
) -> Result<Vec<Enum>, SchemataError> {
    let mut raw = loader.enums(schema)?;
    raw.retain(|e| filter.should_include(&e.name));
    raw.sort_by(|a, b| a.name.cmp(&b.name));

    let mut enums = Vec::with_capacity(raw.len());
    for e in raw {
        let type_name = singularize_identifier(&e.name);
        let mut values = loader.enum_values(schema, &e.name)?;
        values.sort_by_key(|v| v.const_value);

        let values: Vec<Field> = values
            .into_iter()
            .map(|v| {
                let mut field = Field::new(
                    enum_value_name(&v.value, &type_name),
                    v.value.as_str(),
                    Datatype::declared(&e.name),
                );
                field.const_value = Some(v.const_value);
                field
            })
            .collect();
        debug!(name = ?e.name, values = ?values.len(), "Loaded enum");

        enums.push(Enum {
            name: e.name,
            type_name,
            values,
        });
    }
    Ok(enums)
}

/// Camelize an enum label, dropping a redundant enum-name suffix
fn enum_value_name(label: &str, type_name: &str) -> String {
    let name = camelize(label);
    let lower = name.to_lowercase();
    let suffix = type_name.to_lowercase();
    if lower.len() == name.len() && lower.len() > suffix.len() && lower.ends_with(&suffix) {
        return name[..name.len() - suffix.len()].to_string();
    }
    name
}

fn load_procs(
    loader: &mut dyn Loader,
    schema: &str,
    normalizer: &Normalizer,
    filter: &TypeFilter,
) -> Result<Vec<Proc>, SchemataError> {
    // rows sharing an id describe the same routine
    let mut groups: BTreeMap<String, Vec<ProcRaw>> = BTreeMap::new();
    for row in loader.procs(schema)? {
        if filter.should_include(&row.name) {
            groups.entry(row.id.clone()).or_default().push(row);
        }
    }

    let mut procs = Vec::with_capacity(groups.len());
    for (id, rows) in groups {
        let first = &rows[0];

        let params = loader
            .proc_params(schema, &id)?
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                let name = positional(&p.name, 'p', i);
                Ok(Field::new(name.clone(), name, normalizer.normalize(&p.param_type, false)?))
            })
            .collect::<Result<Vec<_>, SchemataError>>()?;

        let void = rows.len() == 1 && first.return_type.trim().eq_ignore_ascii_case("void");
        let returns = if void {
            Vec::new()
        } else {
            rows.iter()
                .enumerate()
                .map(|(i, r)| {
                    let name = positional(&r.return_name, 'r', i);
                    Ok(Field::new(name.clone(), name, normalizer.normalize(&r.return_type, false)?))
                })
                .collect::<Result<Vec<_>, SchemataError>>()?
        };

        trace!(proc = ?first.name, id = ?id, params = ?params.len(), returns = ?returns.len(), "Loaded proc");
        procs.push(Proc {
            func_name: camelize(first.name.trim_start_matches('_')),
            id: id.clone(),
            kind: first.kind,
            name: first.name.clone(),
            params,
            returns,
            void,
            definition: first.definition.clone(),
        });
    }

    procs.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    debug!(count = ?procs.len(), "Loaded procs");
    Ok(procs)
}

fn positional(name: &str, prefix: char, i: usize) -> String {
    if name.is_empty() {
        format!("{}{}", prefix, i)
    } else {
        name.to_string()
    }
}

fn load_tables(
    loader: &mut dyn Loader,
    schema: &str,
    kind: TableKind,
    normalizer: &Normalizer,
    filter: &TypeFilter,
    sequences: &BTreeSet<(String, String)>,
) -> Result<Vec<Table>, SchemataError> {
    let mut raw = loader.tables(schema, kind)?;
    let found = raw.len();
    raw.retain(|t| filter.should_include(&t.name));
    raw.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(kind = %kind, found = ?found, included = ?raw.len(), "Found tables");

    let mut tables = Vec::with_capacity(raw.len());
    for t in raw {
        let mut columns = loader.table_columns(schema, &t.name)?;
        columns.sort_by_key(|c| c.ordinal);

        let mut fields = Vec::with_capacity(columns.len());
        for col in columns {
            if !filter.should_include_column(&t.name, &col.name) {
                trace!(table = ?t.name, column = ?col.name, "Column excluded");
                continue;
            }

            let is_sequence = sequences.contains(&(t.name.clone(), col.name.clone()))
                || (col.is_primary_key && sequences.contains(&(t.name.clone(), String::new())));
            let default = col
                .default
                .filter(|d| !is_sequence && !d.trim().eq_ignore_ascii_case("null"));

            let mut field = Field::new(
                camelize(&col.name),
                col.name.as_str(),
                normalizer.normalize(&col.data_type, !col.not_null)?,
            );
            field.default = default;
            field.is_primary = col.is_primary_key;
            field.is_sequence = is_sequence;
            field.comment = col.comment;
            trace!(table = ?t.name, column = ?col.name, datatype = ?field.datatype, "Loaded column");
            fields.push(field);
        }

        let primary_keys: Vec<Field> = fields.iter().filter(|f| f.is_primary).cloned().collect();
        let manual = !primary_keys.iter().any(|f| f.is_sequence);

        debug!(
            table = ?t.name,
            columns = ?fields.len(),
            primary_keys = ?primary_keys.len(),
            manual = ?manual,
            "Loaded table"
        );

        tables.push(Table {
            kind,
            type_name: singularize_identifier(&t.name),
            name: t.name,
            columns: fields,
            primary_keys,
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            manual,
            comment: t.comment,
            definition: t.definition,
        });
    }
    Ok(tables)
}
