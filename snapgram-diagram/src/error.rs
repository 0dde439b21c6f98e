use std::io;
use std::path::PathBuf;

use snapgram_types::MetadataError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiagramError {
    #[error("DATABASE_URL is not configured")]
    MissingDatabaseUrl,

    /// Only SQLite and PostgreSQL databases can be introspected live
    #[error("unsupported database backend '{0}' (expected a sqlite:// or postgresql:// URL)")]
    UnsupportedBackend(String),

    #[error("could not open database {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to read schema: {0}")]
    Introspection(#[from] rusqlite::Error),

    /// `target` is the server address with the credentials stripped
    #[error("could not connect to {target}: {source}")]
    PostgresConnection {
        target: String,
        #[source]
        source: postgres::Error,
    },

    #[error("failed to read schema: {0}")]
    PostgresIntrospection(#[from] postgres::Error),

    #[error("database has no tables")]
    EmptySchema,

    #[error("invalid schema metadata: {0}")]
    InvalidMetadata(#[from] MetadataError),

    #[error("failed to render diagram: {0}")]
    Render(String),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write status output: {0}")]
    Console(#[from] io::Error),
}
