//! Reads the table structure of a live PostgreSQL database through
//! `information_schema`, scoped to the connection's current schema.

use std::time::Duration;

use postgres::config::Host;
use postgres::{Client, Config, NoTls};

use snapgram_types::{ColumnDef, ColumnType, ForeignKeyDef, ReferenceAction, SchemaMetadata, TableDef};

use crate::error::DiagramError;

const POSTGRES_PREFIXES: [&str; 2] = ["postgresql://", "postgres://"];
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// information_schema exposes its own domain types; every column is cast to a
// plain type so it decodes as String / i32.
const TABLES_SQL: &str = "
    SELECT table_name::text
    FROM information_schema.tables
    WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'
    ORDER BY (quote_ident(table_schema) || '.' || quote_ident(table_name))::regclass::oid";

const COLUMNS_SQL: &str = "
    SELECT column_name::text, data_type::text, character_maximum_length::int4, is_nullable::text
    FROM information_schema.columns
    WHERE table_schema = current_schema() AND table_name = $1
    ORDER BY ordinal_position";

const KEYS_SQL: &str = "
    SELECT tc.constraint_type::text, tc.constraint_name::text, kcu.column_name::text
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON kcu.constraint_schema = tc.constraint_schema
     AND kcu.constraint_name = tc.constraint_name
     AND kcu.table_name = tc.table_name
    WHERE tc.table_schema = current_schema() AND tc.table_name = $1
      AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE')
    ORDER BY tc.constraint_name, kcu.ordinal_position";

const FOREIGN_KEYS_SQL: &str = "
    SELECT kcu.column_name::text, ref.table_name::text, ref.column_name::text, rc.delete_rule::text
    FROM information_schema.referential_constraints rc
    JOIN information_schema.key_column_usage kcu
      ON kcu.constraint_schema = rc.constraint_schema
     AND kcu.constraint_name = rc.constraint_name
    JOIN information_schema.key_column_usage ref
      ON ref.constraint_schema = rc.unique_constraint_schema
     AND ref.constraint_name = rc.unique_constraint_name
     AND ref.ordinal_position = kcu.position_in_unique_constraint
    WHERE kcu.table_schema = current_schema() AND kcu.table_name = $1
    ORDER BY rc.constraint_name, kcu.ordinal_position";

/// Whether the connection string addresses a PostgreSQL server.
pub fn is_postgres_url(url: &str) -> bool {
    POSTGRES_PREFIXES.iter().any(|prefix| url.starts_with(prefix))
}

/// Host, port and database of a parsed connection string, without credentials.
fn display_target(config: &Config) -> String {
    let host = match config.get_hosts().first() {
        Some(Host::Tcp(host)) => host.clone(),
        #[cfg(unix)]
        Some(Host::Unix(path)) => path.display().to_string(),
        None => "localhost".to_string(),
    };
    let port = config
        .get_ports()
        .first()
        .map(|port| format!(":{port}"))
        .unwrap_or_default();
    let dbname = config.get_dbname().unwrap_or_default();
    format!("postgresql://{host}{port}/{dbname}")
}

/// The connection string as it is safe to print, or `None` if it does not parse.
pub fn redacted_url(url: &str) -> Option<String> {
    url.parse::<Config>().ok().map(|config| display_target(&config))
}

/// Connect to the server. Errors name the server but never the password.
pub fn connect(url: &str) -> Result<Client, DiagramError> {
    let mut config: Config = url.parse().map_err(|source| DiagramError::PostgresConnection {
        target: "postgresql://<invalid connection string>".to_string(),
        source,
    })?;
    if config.get_connect_timeout().is_none() {
        config.connect_timeout(CONNECT_TIMEOUT);
    }

    let target = display_target(&config);
    tracing::debug!(%target, "Connecting to live database");

    config
        .connect(NoTls)
        .map_err(|source| DiagramError::PostgresConnection { target, source })
}

/// Map an `information_schema.columns.data_type` onto the column types the
/// declared model uses.
fn column_type(data_type: &str, max_length: Option<i32>) -> ColumnType {
    match (data_type, max_length) {
        ("integer" | "bigint" | "smallint", _) => ColumnType::Integer,
        ("character varying", Some(len)) => u32::try_from(len)
            .map(ColumnType::Varchar)
            .unwrap_or_else(|_| ColumnType::Other(data_type.to_string())),
        ("text", _) => ColumnType::Text,
        (name, _) if name.starts_with("timestamp") => ColumnType::DateTime,
        (name, _) => ColumnType::Other(name.to_string()),
    }
}

/// Read every base table in the current schema with its columns, keys and
/// foreign keys.
pub fn introspect(client: &mut Client) -> Result<SchemaMetadata, DiagramError> {
    let names: Vec<String> = client
        .query(TABLES_SQL, &[])?
        .iter()
        .map(|row| row.try_get(0))
        .collect::<Result<_, _>>()?;

    if names.is_empty() {
        return Err(DiagramError::EmptySchema);
    }

    let tables = names
        .iter()
        .map(|name| read_table(client, name))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(tables = tables.len(), "Introspected live schema");
    Ok(SchemaMetadata { tables })
}

fn read_table(client: &mut Client, name: &str) -> Result<TableDef, DiagramError> {
    let mut columns = Vec::new();
    for row in client.query(COLUMNS_SQL, &[&name])? {
        let data_type: String = row.try_get(1)?;
        let is_nullable: String = row.try_get(3)?;
        columns.push(ColumnDef {
            name: row.try_get(0)?,
            column_type: column_type(&data_type, row.try_get(2)?),
            nullable: is_nullable == "YES",
            primary_key: false,
            unique: false,
        });
    }

    // (constraint type, constraint name, column), grouped by constraint
    let mut keys: Vec<(String, String, String)> = Vec::new();
    for row in client.query(KEYS_SQL, &[&name])? {
        keys.push((row.try_get(0)?, row.try_get(1)?, row.try_get(2)?));
    }

    for (kind, constraint, column) in &keys {
        let Some(def) = columns.iter_mut().find(|c| c.name == *column) else {
            continue;
        };
        if kind == "PRIMARY KEY" {
            def.primary_key = true;
        } else if keys.iter().filter(|(_, other, _)| other == constraint).count() == 1 {
            def.unique = true;
        }
    }

    let mut foreign_keys = Vec::new();
    for row in client.query(FOREIGN_KEYS_SQL, &[&name])? {
        let delete_rule: String = row.try_get(3)?;
        foreign_keys.push(ForeignKeyDef {
            column: row.try_get(0)?,
            references_table: row.try_get(1)?,
            references_column: row.try_get(2)?,
            on_delete: ReferenceAction::parse(&delete_rule).unwrap_or_default(),
            role: None,
        });
    }
    foreign_keys.sort_by_key(|fk| {
        columns
            .iter()
            .position(|c| c.name == fk.column)
            .unwrap_or(usize::MAX)
    });

    Ok(TableDef {
        name: name.to_string(),
        columns,
        foreign_keys,
    })
}
