//! Reads the table structure of a live SQLite database.

use std::path::PathBuf;

use rusqlite::{Connection, OpenFlags};

use snapgram_types::{ColumnDef, ColumnType, ForeignKeyDef, ReferenceAction, SchemaMetadata, TableDef};

use crate::error::DiagramError;

const SQLITE_PREFIXES: [&str; 2] = ["sqlite://", "sqlite:"];
const MEMORY_TARGET: &str = ":memory:";

/// Where a connection string points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveTarget {
    Memory,
    File(PathBuf),
}

/// Parse a `sqlite://path`, `sqlite:path` or `sqlite::memory:` connection string.
pub fn parse_target(url: &str) -> Result<LiveTarget, DiagramError> {
    let rest = SQLITE_PREFIXES
        .iter()
        .find_map(|prefix| url.strip_prefix(prefix))
        .ok_or_else(|| {
            let scheme = url.split_once("://").map(|(scheme, _)| scheme).unwrap_or("");
            DiagramError::UnsupportedBackend(scheme.to_string())
        })?;

    // Query parameters (e.g. `?mode=ro`) are not meaningful for introspection
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() {
        return Err(DiagramError::Connection {
            target: url.to_string(),
            source: rusqlite::Error::InvalidPath(PathBuf::new()),
        });
    }

    if path == MEMORY_TARGET {
        Ok(LiveTarget::Memory)
    } else {
        Ok(LiveTarget::File(PathBuf::from(path)))
    }
}

/// Open the database read-only. A missing file is an error, never created.
pub fn open(url: &str) -> Result<Connection, DiagramError> {
    let target = parse_target(url)?;
    tracing::debug!(?target, "Opening live database");

    let opened = match &target {
        LiveTarget::Memory => Connection::open_in_memory(),
        LiveTarget::File(path) => Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        ),
    };

    opened.map_err(|source| DiagramError::Connection {
        target: match target {
            LiveTarget::Memory => MEMORY_TARGET.to_string(),
            LiveTarget::File(path) => path.display().to_string(),
        },
        source,
    })
}

/// Read every user table with its columns, unique constraints and foreign keys.
pub fn introspect(conn: &Connection) -> Result<SchemaMetadata, DiagramError> {
    let mut stmt = conn.prepare(
        r"SELECT name FROM sqlite_master
          WHERE type = 'table' AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
          ORDER BY rowid",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    if names.is_empty() {
        return Err(DiagramError::EmptySchema);
    }

    let mut tables = names
        .iter()
        .map(|name| read_table(conn, name))
        .collect::<Result<Vec<_>, _>>()?;

    // `REFERENCES parent` without a column list targets the parent's primary key
    let primary_keys: Vec<(String, Option<String>)> = tables
        .iter()
        .map(|t| (t.name.clone(), t.primary_key().map(|c| c.name.clone())))
        .collect();
    for table in &mut tables {
        for fk in &mut table.foreign_keys {
            if fk.references_column.is_empty() {
                fk.references_column = primary_keys
                    .iter()
                    .find(|(name, _)| *name == fk.references_table)
                    .and_then(|(_, pk)| pk.clone())
                    .unwrap_or_default();
            }
        }
    }

    tracing::debug!(tables = tables.len(), "Introspected live schema");
    Ok(SchemaMetadata { tables })
}

fn read_table(conn: &Connection, name: &str) -> Result<TableDef, DiagramError> {
    let mut stmt = conn.prepare(
        r#"SELECT name, type, "notnull", pk FROM pragma_table_info(?1) ORDER BY cid"#,
    )?;
    let mut columns = stmt
        .query_map([name], |row| {
            let not_null: i64 = row.get(2)?;
            let pk: i64 = row.get(3)?;
            Ok(ColumnDef {
                name: row.get(0)?,
                column_type: ColumnType::parse(&row.get::<_, String>(1)?),
                nullable: not_null == 0 && pk == 0,
                primary_key: pk > 0,
                unique: false,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for column in unique_columns(conn, name)? {
        if let Some(def) = columns.iter_mut().find(|c| c.name == column) {
            def.unique = true;
        }
    }

    let mut stmt = conn.prepare(
        r#"SELECT "table", "from", "to", on_delete FROM pragma_foreign_key_list(?1) ORDER BY id, seq"#,
    )?;
    let mut foreign_keys = stmt
        .query_map([name], |row| {
            let on_delete: String = row.get(3)?;
            Ok(ForeignKeyDef {
                references_table: row.get(0)?,
                column: row.get(1)?,
                references_column: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                on_delete: ReferenceAction::parse(&on_delete).unwrap_or_default(),
                role: None,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    // SQLite lists foreign keys newest first; keep them in column order
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

/// Columns covered on their own by a UNIQUE constraint or unique index.
fn unique_columns(conn: &Connection, table: &str) -> Result<Vec<String>, DiagramError> {
    let mut stmt = conn.prepare(
        r#"SELECT name FROM pragma_index_list(?1) WHERE "unique" = 1 AND origin != 'pk'"#,
    )?;
    let indexes = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut columns = Vec::new();
    let mut stmt = conn.prepare("SELECT name FROM pragma_index_info(?1)")?;
    for index in indexes {
        let indexed = stmt
            .query_map([&index], |row| row.get::<_, Option<String>>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        if let [Some(column)] = indexed.as_slice() {
            columns.push(column.clone());
        }
    }
    Ok(columns)
}
