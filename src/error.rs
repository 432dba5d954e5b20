use thiserror::Error;

/// schemata errors
#[derive(Error, Debug)]
pub enum SchemataError {
    #[error("Failed to connect to database: {0}")]
    Connection(String),

    #[error("Failed to introspect schema '{schema}': {message}")]
    Introspection { schema: String, message: String },

    #[error("Driver '{driver}' does not support {capability}")]
    Unsupported {
        driver: &'static str,
        capability: &'static str,
    },

    #[error("Unknown or unavailable database driver: {0}")]
    UnknownDriver(String),

    #[error("Invalid datatype '{raw}': {message}")]
    Datatype { raw: String, message: String },

    #[error("Table '{table}' foreign key '{constraint}': {message}")]
    ForeignKey {
        table: String,
        constraint: String,
        message: String,
    },

    #[error("Query parameter '{param}': {message}")]
    QueryParam { param: String, message: String },

    #[error("Query error: {0}")]
    Query(String),

    #[error("Emit failed for '{target}': {message}")]
    Emit { target: String, message: String },

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SchemataError {
    pub(crate) fn introspection(schema: &str, message: impl Into<String>) -> Self {
        Self::Introspection {
            schema: schema.to_string(),
            message: message.into(),
        }
    }
}
