use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use schemata::assemble::load_schema;
use schemata::config::{DbConfig, FkMode, ManualField, QueryOptions, SchemaOptions, TypeFilter};
use schemata::emit::{self, EmitConfig, OutputFormat};
use schemata::introspect::Registry;
use schemata::query::{load_query, RandomIds};

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum CliFormat {
    /// JSON mirror of the loaded IR
    #[default]
    Json,
    /// Graphviz digraph
    Dot,
}

impl From<CliFormat> for OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Json => OutputFormat::Json,
            CliFormat::Dot => OutputFormat::Dot,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "schemata")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a database schema
    Schema(SchemaArgs),
    /// Load a custom query
    Query(QueryArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Database URL (default: DATABASE_URL)
    url: Option<String>,

    /// Path to .env file for connection config
    #[arg(long, default_value = "./.env")]
    env_file: PathBuf,

    /// Database schema (default: the connection's current schema)
    #[arg(short, long)]
    schema: Option<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = CliFormat::Json)]
    format: CliFormat,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Foreign key accessor naming mode: smart, parent, field or key
    #[arg(long, default_value_t = FkMode::Smart)]
    fk_mode: FkMode,

    /// Use index names for index accessor names
    #[arg(long)]
    use_index_names: bool,

    /// Comma-separated glob patterns of types to include (default: all)
    #[arg(long, value_delimiter = ',')]
    include: Vec<String>,

    /// Comma-separated glob patterns of types (or table.column) to exclude
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,
}

#[derive(Args, Debug)]
struct QueryArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Query text (default: read from stdin)
    #[arg(short = 'Q', long)]
    query: Option<String>,

    /// Result type name
    #[arg(short = 'T', long = "type")]
    type_name: Option<String>,

    /// Result type comment
    #[arg(long, default_value = "")]
    type_comment: String,

    /// Function name
    #[arg(short = 'F', long = "func")]
    func_name: Option<String>,

    /// Function comment
    #[arg(long, default_value = "")]
    func_comment: String,

    /// Query returns a single row
    #[arg(short = '1', long)]
    one: bool,

    /// Query returns flat values instead of a type
    #[arg(long)]
    flat: bool,

    /// Query is executed only (no result)
    #[arg(long)]
    exec: bool,

    /// Enable interpolated parameters
    #[arg(short = 'I', long)]
    interpolate: bool,

    /// Trim whitespace around query lines
    #[arg(short = 'M', long)]
    trim: bool,

    /// Strip dialect-specific annotations from the query
    #[arg(short = 'B', long)]
    strip: bool,

    /// Placeholder delimiter
    #[arg(short = 'D', long, default_value = "%%")]
    delimiter: String,

    /// Result fields instead of introspection ("name type, ...")
    #[arg(short = 'Z', long)]
    fields: Option<String>,

    /// Allow nullable result fields
    #[arg(short = 'U', long)]
    allow_nulls: bool,
}

fn main() {
    if let Err(e) = run() {
        error!(error = ?e, "Fatal error");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose)?;

    info!("schemata v{}", env!("CARGO_PKG_VERSION"));

    let registry = Registry::with_builtin();
    if registry.dialects().is_empty() {
        bail!("No database drivers enabled. Rebuild with --features postgres")
    }

    match cli.command {
        Command::Schema(args) => run_schema(&registry, args),
        Command::Query(args) => run_query(&registry, args),
    }
}

fn run_schema(registry: &Registry, args: SchemaArgs) -> Result<()> {
    let config = DbConfig::load(&args.common.env_file, args.common.url.clone())
        .context("Failed to load database configuration")?;

    let filter = TypeFilter::new(&args.include, &args.exclude).context("Invalid type filter")?;
    if !filter.is_empty() {
        debug!(include = ?args.include, exclude = ?args.exclude, "Type filter configured");
    }

    let opts = SchemaOptions::new()
        .with_schema(args.common.schema.clone())
        .with_fk_mode(args.fk_mode)
        .with_use_index_names(args.use_index_names)
        .with_filter(filter);
    info!(
        fk_mode = %opts.fk_mode,
        use_index_names = ?opts.use_index_names,
        "Starting schema load"
    );

    let mut loader = registry
        .open(&config)
        .with_context(|| format!("Failed to open {}", config.redacted_url()))?;
    let schema = load_schema(loader.as_mut(), &opts).context("Failed to load schema")?;

    if schema.tables.is_empty() && schema.views.is_empty() {
        warn!("No tables found after filtering");
    }

    let emit_config = EmitConfig::new(args.common.out).with_format(args.common.format.into());
    debug!(emit_config = ?emit_config, "Emit config");

    let emitter = emit::emitter(emit_config.format)?;
    let out = emitter.emit_schema(&schema).context("Failed to render schema")?;
    emit::write_output(&emit_config, &out).context("Failed to write output")?;

    Ok(())
}

fn run_query(registry: &Registry, args: QueryArgs) -> Result<()> {
    let config = DbConfig::load(&args.common.env_file, args.common.url.clone())
        .context("Failed to load database configuration")?;

    let raw = match args.query {
        Some(query) => query,
        None => {
            debug!("Reading query from stdin");
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read query from stdin")?;
            buf
        }
    };
    let raw = raw.trim_end_matches(['\r', '\n']).to_string();
    if raw.trim().is_empty() {
        bail!("Query is empty")
    }

    let mut opts = QueryOptions::new()
        .with_schema(args.common.schema.clone())
        .with_delimiter(args.delimiter)
        .with_interpolate(args.interpolate)
        .with_trim(args.trim)
        .with_strip(args.strip)
        .with_type_comment(args.type_comment)
        .with_func_comment(args.func_comment)
        .with_one(args.one)
        .with_flat(args.flat)
        .with_exec(args.exec)
        .with_allow_nulls(args.allow_nulls);
    if let Some(type_name) = args.type_name {
        opts = opts.with_type_name(type_name);
    }
    if let Some(func_name) = args.func_name {
        opts = opts.with_func_name(func_name);
    }
    if let Some(fields) = args.fields {
        opts = opts.with_fields(ManualField::parse_list(&fields));
    }
    debug!(opts = ?opts, "Query options");

    let mut loader = registry
        .open(&config)
        .with_context(|| format!("Failed to open {}", config.redacted_url()))?;
    let query = load_query(loader.as_mut(), &raw, &opts, &mut RandomIds)
        .context("Failed to load query")?;

    let emit_config = EmitConfig::new(args.common.out).with_format(args.common.format.into());
    let emitter = emit::emitter(emit_config.format)?;
    let out = emitter.emit_query(&query).context("Failed to render query")?;
    emit::write_output(&emit_config, &out).context("Failed to write output")?;

    Ok(())
}

fn init_tracing(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")
}
