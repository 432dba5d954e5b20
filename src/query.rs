//! Query mode
//!
//! Rewrites a query containing delimited placeholders (`%%name type%%`) into
//! positional form, introspects its result columns through a temporary view
//! and builds the [`Query`] IR.

use std::collections::HashMap;

use rand::Rng;
use regex::Regex;
use tracing::{debug, info, trace, warn};

use crate::config::QueryOptions;
use crate::datatype::Normalizer;
use crate::dialect::{unstripped, Dialect};
use crate::error::SchemataError;
use crate::introspect::{ColumnRaw, Loader};
use crate::naming::{camelize, lower_camelize, pluralize, upper_first};
use crate::schema::{Datatype, Field, Query};

/// Placeholder substituted into the inspect query
const INSPECT_PLACEHOLDER: &str = "NULL";

/// Source of temporary view identifiers
pub trait IdSource {
    fn next_id(&mut self) -> String;
}

/// Random 8 character identifiers
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn next_id(&mut self) -> String {
        const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
        let mut rng = rand::thread_rng();
        (0..8)
            .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
            .collect()
    }
}

/// Zero-padded counter, for reproducible view names
#[derive(Debug, Default, Clone)]
pub struct SequentialIds {
    next: u32,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdSource for SequentialIds {
    fn next_id(&mut self) -> String {
        let id = format!("{:08}", self.next);
        self.next += 1;
        id
    }
}

/// A query after placeholder rewriting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    /// Rewritten query lines
    pub query: Vec<String>,
    /// Lines used to create the introspection view
    pub inspect: Vec<String>,
    /// Parallel to `query`
    pub comments: Vec<String>,
    pub params: Vec<Field>,
}

/// Rewrite placeholders, then split, trim and strip the query
pub fn parse_query(
    raw: &str,
    opts: &QueryOptions,
    dialect: Dialect,
    nth: &dyn Fn(usize) -> String,
) -> Result<ParsedQuery, SchemataError> {
    let (query, inspect, params) = rewrite_params(raw, &opts.delimiter, opts.interpolate, nth)?;

    let query = split_lines(query.trim_end_matches(['\r', '\n']), opts.trim);
    let inspect = split_lines(inspect.trim_end_matches(['\r', '\n']), opts.trim);

    let stripped = if opts.strip {
        dialect.strip_query(query, inspect)
    } else {
        unstripped(query, inspect)
    };
    trace!(lines = ?stripped.query.len(), params = ?params.len(), "Parsed query");

    Ok(ParsedQuery {
        query: stripped.query,
        inspect: stripped.inspect,
        comments: stripped.comments,
        params,
    })
}

/// Substitute placeholders.
///
/// Returns the rewritten text, the inspect text and the extracted params.
/// A name seen again reuses its first slot and type.
pub fn rewrite_params(
    raw: &str,
    delimiter: &str,
    interpolate_enabled: bool,
    nth: &dyn Fn(usize) -> String,
) -> Result<(String, String, Vec<Field>), SchemataError> {
    let re = placeholder_regex(delimiter)?;

    let mut query = String::with_capacity(raw.len());
    let mut inspect = String::with_capacity(raw.len());
    let mut params: Vec<Field> = Vec::new();
    // name -> (param index, positional slot)
    let mut seen: HashMap<String, (usize, Option<usize>)> = HashMap::new();
    let mut slots = 0;
    let mut last = 0;

    for m in re.find_iter(raw) {
        query.push_str(&raw[last..m.start()]);
        inspect.push_str(&raw[last..m.start()]);
        last = m.end();

        let inner = &m.as_str()[delimiter.len()..m.as_str().len() - delimiter.len()];
        let param = parse_placeholder(inner, interpolate_enabled)?;

        let (index, slot) = match seen.get(&param.name) {
            Some(entry) => *entry,
            None => {
                let slot = if param.interpolate {
                    None
                } else {
                    slots += 1;
                    Some(slots - 1)
                };
                params.push(param);
                let entry = (params.len() - 1, slot);
                seen.insert(params[entry.0].name.clone(), entry);
                entry
            }
        };

        match slot {
            Some(i) => query.push_str(&nth(i)),
            None => query.push_str(&splice(&params[index])),
        }
        inspect.push_str(INSPECT_PLACEHOLDER);
    }
    query.push_str(&raw[last..]);
    inspect.push_str(&raw[last..]);

    Ok((query, inspect, params))
}

fn placeholder_regex(delimiter: &str) -> Result<Regex, SchemataError> {
    let first = delimiter.chars().next().ok_or_else(|| SchemataError::QueryParam {
        param: String::new(),
        message: "delimiter must not be empty".to_string(),
    })?;
    let d = regex::escape(delimiter);
    let pattern = format!("{}[^{}]+{}", d, regex::escape(&first.to_string()), d);
    Regex::new(&pattern).map_err(|e| SchemataError::QueryParam {
        param: delimiter.to_string(),
        message: format!("invalid delimiter: {}", e),
    })
}

/// Parse `name type[,option...]`
fn parse_placeholder(inner: &str, interpolate_enabled: bool) -> Result<Field, SchemataError> {
    let inner = inner.trim();
    let fail = |message: &str| SchemataError::QueryParam {
        param: inner.to_string(),
        message: message.to_string(),
    };

    let (name, rest) = inner
        .split_once(char::is_whitespace)
        .ok_or_else(|| fail("missing type"))?;
    let mut parts = rest.split(',').map(str::trim);
    let type_name = parts
        .next()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| fail("missing type"))?;

    let mut field = Field::new(name, "", Datatype::declared(type_name));
    for opt in parts {
        match opt {
            "interpolate" if !interpolate_enabled => {
                return Err(fail("query interpolate is not enabled"))
            }
            "interpolate" => field.interpolate = true,
            "join" => field.join = true,
            other => return Err(fail(&format!("unknown option '{}'", other))),
        }
    }
    Ok(field)
}

/// Template expression that splices an interpolated param into the query
fn splice(field: &Field) -> String {
    if field.join {
        format!("{{{{ {} | join(\"\\n\") }}}}", field.name)
    } else if field.datatype.type_name == "string" {
        format!("{{{{ {} }}}}", field.name)
    } else {
        format!("{{{{ {} | string }}}}", field.name)
    }
}

fn split_lines(s: &str, trim: bool) -> Vec<String> {
    let lines: Vec<&str> = s.split('\n').collect();
    if !trim {
        return lines.into_iter().map(str::to_string).collect();
    }
    let n = lines.len();
    lines
        .into_iter()
        .enumerate()
        .map(|(i, l)| {
            let l = l.trim();
            if i + 1 < n {
                format!("{} ", l)
            } else {
                l.to_string()
            }
        })
        .collect()
}

/// A temporary view created for column introspection.
///
/// Dropped on every exit path; [`IntrospectionView::close`] drops it
/// explicitly and reports truncation failures.
pub struct IntrospectionView<'a> {
    loader: &'a mut dyn Loader,
    schema: String,
    id: String,
    dropped: bool,
}

impl<'a> IntrospectionView<'a> {
    pub fn create(
        loader: &'a mut dyn Loader,
        schema: &str,
        id: String,
        query: &[String],
    ) -> Result<Self, SchemataError> {
        debug!(schema = ?schema, view = ?id, "Creating introspection view");
        loader.view_create(schema, &id, query)?;
        Ok(Self {
            loader,
            schema: schema.to_string(),
            id,
            dropped: false,
        })
    }

    /// Columns of the view, in ordinal order
    pub fn columns(&mut self) -> Result<Vec<ColumnRaw>, SchemataError> {
        if self.loader.capabilities().view_schema {
            self.schema = self.loader.view_schema(&self.id)?;
            trace!(view = ?self.id, schema = ?self.schema, "View schema");
        }
        let mut columns = self.loader.table_columns(&self.schema, &self.id)?;
        columns.sort_by_key(|c| c.ordinal);
        Ok(columns)
    }

    /// Truncate (when required) and drop the view.
    ///
    /// The drop is attempted even when truncation fails; drop failures are
    /// only logged.
    pub fn close(mut self) -> Result<(), SchemataError> {
        self.dropped = true;
        let truncated = self.truncate();
        self.drop_view();
        truncated
    }

    fn truncate(&mut self) -> Result<(), SchemataError> {
        if self.loader.capabilities().view_truncate {
            self.loader.view_truncate(&self.schema, &self.id)?;
        }
        Ok(())
    }

    fn drop_view(&mut self) {
        match self.loader.view_drop(&self.schema, &self.id) {
            Ok(()) => debug!(view = ?self.id, "Dropped introspection view"),
            Err(e) => warn!(view = ?self.id, error = %e, "Failed to drop introspection view"),
        }
    }
}

impl Drop for IntrospectionView<'_> {
    fn drop(&mut self) {
        if self.dropped {
            return;
        }
        self.dropped = true;
        if let Err(e) = self.truncate() {
            warn!(view = ?self.id, error = %e, "Failed to truncate introspection view");
        }
        self.drop_view();
    }
}

/// Parse a query and build its IR
pub fn load_query(
    loader: &mut dyn Loader,
    raw: &str,
    opts: &QueryOptions,
    ids: &mut dyn IdSource,
) -> Result<Query, SchemataError> {
    let dialect = loader.dialect();
    let parsed = {
        let nth = |i: usize| loader.nth_param(i);
        parse_query(raw, opts, dialect, &nth)?
    };

    let one = opts.one || opts.exec || opts.flat;
    let type_name = match &opts.type_name {
        Some(t) if !t.is_empty() => t.clone(),
        _ if opts.exec => String::new(),
        _ => return Err(SchemataError::Query("query type name is required".to_string())),
    };
    let name = match &opts.func_name {
        Some(f) if !f.is_empty() => f.clone(),
        _ if type_name.is_empty() => {
            return Err(SchemataError::Query(
                "query function name is required in exec mode".to_string(),
            ))
        }
        _ => func_name(&type_name, one, &parsed.params),
    };

    let schema = match &opts.schema {
        Some(s) => s.clone(),
        None => loader.schema()?,
    };

    let field_name = |col: &str| {
        if opts.flat {
            lower_camelize(col)
        } else {
            camelize(col)
        }
    };

    let (fields, manual_fields) = if opts.exec {
        (Vec::new(), false)
    } else if !opts.fields.is_empty() {
        let fields = opts
            .fields
            .iter()
            .map(|f| Field::new(field_name(&f.name), f.name.as_str(), Datatype::declared(&f.type_name)))
            .collect();
        (fields, true)
    } else {
        let normalizer = Normalizer::new(dialect, &schema);
        let id = format!("{}{}", dialect.temp_prefix(), ids.next_id());
        info!(view = ?id, "Introspecting query columns");

        let mut view = IntrospectionView::create(loader, &schema, id, &parsed.inspect)?;
        let columns = view.columns()?;
        view.close()?;

        let fields = columns
            .into_iter()
            .map(|col| {
                let nullable = opts.allow_nulls && !col.not_null;
                Ok(Field::new(
                    field_name(&col.name),
                    col.name.as_str(),
                    normalizer.normalize(&col.data_type, nullable)?,
                ))
            })
            .collect::<Result<Vec<_>, SchemataError>>()?;
        (fields, false)
    };

    debug!(name = ?name, fields = ?fields.len(), params = ?parsed.params.len(), "Query loaded");

    Ok(Query {
        driver: dialect,
        name,
        comment: opts.func_comment.clone(),
        type_name,
        type_comment: opts.type_comment.clone(),
        fields,
        manual_fields,
        params: parsed.params,
        query: parsed.query,
        comments: parsed.comments,
        one,
        flat: opts.flat,
        exec: opts.exec,
        interpolate: opts.interpolate,
    })
}

/// Default function name: `GetBooks`, `BookByIsbn`, `BooksByAuthorIDTitle`
fn func_name(type_name: &str, one: bool, params: &[Field]) -> String {
    let base = if one {
        type_name.to_string()
    } else {
        pluralize(type_name)
    };
    if params.is_empty() {
        return format!("Get{}", base);
    }
    let suffix: String = params.iter().map(|p| upper_first(&p.name)).collect();
    format!("{}By{}", base, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg_nth(i: usize) -> String {
        Dialect::Postgres.nth_param(i)
    }

    #[test]
    fn test_rewrite_dedup() {
        let (query, inspect, params) =
            rewrite_params("SELECT * FROM t WHERE a = %%x int%% OR b = %%x int%%", "%%", false, &pg_nth)
                .unwrap();

        assert_eq!(query, "SELECT * FROM t WHERE a = $1 OR b = $1");
        assert_eq!(inspect, "SELECT * FROM t WHERE a = NULL OR b = NULL");
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "x");
        assert_eq!(params[0].datatype.type_name, "int");
    }

    #[test]
    fn test_rewrite_numbering() {
        let (query, _, params) = rewrite_params(
            "%%a int%%, %%b string%%, %%a text%%, %%c bool%%",
            "%%",
            false,
            &pg_nth,
        )
        .unwrap();

        assert_eq!(query, "$1, $2, $1, $3");
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        // first occurrence decides the type
        assert_eq!(params[0].datatype.type_name, "int");
    }

    #[test]
    fn test_rewrite_interpolate() {
        let (query, inspect, params) = rewrite_params(
            "SELECT * FROM %%tbl string,interpolate%% WHERE id = %%id int%% AND n IN (%%ns []string,interpolate,join%%) LIMIT %%lim int,interpolate%%",
            "%%",
            true,
            &pg_nth,
        )
        .unwrap();

        assert_eq!(
            query,
            "SELECT * FROM {{ tbl }} WHERE id = $1 AND n IN ({{ ns | join(\"\\n\") }}) LIMIT {{ lim | string }}"
        );
        assert_eq!(
            inspect,
            "SELECT * FROM NULL WHERE id = NULL AND n IN (NULL) LIMIT NULL"
        );
        assert!(params[0].interpolate);
        assert!(!params[1].interpolate);
        assert!(params[2].join);
    }

    #[test]
    fn test_rewrite_interpolate_not_enabled() {
        let err = rewrite_params("SELECT %%tbl string,interpolate%%", "%%", false, &pg_nth).unwrap_err();

        assert!(matches!(err, SchemataError::QueryParam { .. }));
        assert!(err.to_string().contains("query interpolate is not enabled"));
        assert!(err.to_string().contains("tbl string,interpolate"));
    }

    #[test]
    fn test_rewrite_errors() {
        assert!(rewrite_params("SELECT %%a int,bogus%%", "%%", true, &pg_nth).is_err());
        assert!(rewrite_params("SELECT %%a%%", "%%", true, &pg_nth).is_err());
        assert!(rewrite_params("SELECT 1", "", true, &pg_nth).is_err());
    }

    #[test]
    fn test_rewrite_custom_delimiter() {
        let nth = |i: usize| Dialect::Mysql.nth_param(i);
        let (query, _, params) = rewrite_params("WHERE a = $$a int$$ AND b = $$b int$$", "$$", false, &nth).unwrap();

        assert_eq!(query, "WHERE a = ? AND b = ?");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_parse_query_trim_and_strip() {
        let opts = QueryOptions::new().with_trim(true).with_strip(true);
        let raw = "  SELECT count(*)::integer AS count  \n  FROM books\n  WHERE author_id = %%author_id int%%\n";

        let parsed = parse_query(raw, &opts, Dialect::Postgres, &pg_nth).unwrap();

        assert_eq!(
            parsed.query,
            vec!["SELECT count(*) ", "FROM books ", "WHERE author_id = $1"]
        );
        assert_eq!(parsed.comments, vec!["::integer AS count", "", ""]);
        assert_eq!(
            parsed.inspect,
            vec![
                "SELECT count(*) ",
                "FROM books ",
                "WHERE author_id = NULL"
            ]
        );
    }

    #[test]
    fn test_parse_query_untrimmed() {
        let opts = QueryOptions::new();
        let parsed = parse_query("SELECT 1\n  FROM t", &opts, Dialect::Sqlite3, &pg_nth).unwrap();

        assert_eq!(parsed.query, vec!["SELECT 1", "  FROM t"]);
        assert_eq!(parsed.comments, vec!["", ""]);
    }

    #[test]
    fn test_func_name() {
        let param = |n: &str| Field::new(n, "", Datatype::declared("int"));

        assert_eq!(func_name("Book", false, &[]), "GetBooks");
        assert_eq!(func_name("Book", true, &[param("isbn")]), "BookByIsbn");
        assert_eq!(
            func_name("Book", false, &[param("authorID"), param("title")]),
            "BooksByAuthorIDTitle"
        );
    }

    #[test]
    fn test_sequential_ids() {
        let mut ids = SequentialIds::new();
        assert_eq!(ids.next_id(), "00000000");
        assert_eq!(ids.next_id(), "00000001");
    }

    #[test]
    fn test_random_ids() {
        let mut ids = RandomIds;
        let id = ids.next_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
