//! Declared shape of the Snapgram schema.
//!
//! This is the static metadata that both the store (for DDL and cascade
//! planning) and the diagram generator (as its fallback source) consume.
//! Relationships are stored once, as foreign keys on the owning side; every
//! reverse view (a user's posts, a post's likes) is derived by lookup.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const USER_TABLE: &str = "user";
pub const POST_TABLE: &str = "post";
pub const COMMENT_TABLE: &str = "comment";
pub const FOLLOWER_TABLE: &str = "follower";
pub const LIKE_TABLE: &str = "like";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Varchar(u32),
    Text,
    DateTime,
    /// A type name read from a live database that has no mapping here
    Other(String),
}

impl ColumnType {
    /// Parse a SQL type name as reported by the database.
    pub fn parse(s: &str) -> Self {
        let upper = s.trim().to_ascii_uppercase();
        match upper.as_str() {
            "INTEGER" | "INT" | "BIGINT" => ColumnType::Integer,
            "TEXT" => ColumnType::Text,
            "DATETIME" | "TIMESTAMP" => ColumnType::DateTime,
            _ => upper
                .strip_prefix("VARCHAR(")
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(|len| len.trim().parse().ok())
                .map(ColumnType::Varchar)
                .unwrap_or(ColumnType::Other(s.trim().to_string())),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => f.write_str("INTEGER"),
            ColumnType::Varchar(len) => write!(f, "VARCHAR({len})"),
            ColumnType::Text => f.write_str("TEXT"),
            ColumnType::DateTime => f.write_str("DATETIME"),
            ColumnType::Other(name) => f.write_str(name),
        }
    }
}

/// What happens to referencing rows when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReferenceAction {
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
    #[default]
    NoAction,
}

impl ReferenceAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferenceAction::Cascade => "CASCADE",
            ReferenceAction::SetNull => "SET NULL",
            ReferenceAction::SetDefault => "SET DEFAULT",
            ReferenceAction::Restrict => "RESTRICT",
            ReferenceAction::NoAction => "NO ACTION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CASCADE" => Some(ReferenceAction::Cascade),
            "SET NULL" => Some(ReferenceAction::SetNull),
            "SET DEFAULT" => Some(ReferenceAction::SetDefault),
            "RESTRICT" => Some(ReferenceAction::Restrict),
            "NO ACTION" => Some(ReferenceAction::NoAction),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
}

impl ColumnDef {
    fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            nullable: true,
            primary_key: false,
            unique: false,
        }
    }

    fn primary_key(name: &str) -> Self {
        Self {
            nullable: false,
            primary_key: true,
            ..Self::new(name, ColumnType::Integer)
        }
    }

    fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
    pub on_delete: ReferenceAction,
    /// Names the side of the relation when a table references the same
    /// parent more than once. Not recoverable from a live database.
    pub role: Option<String>,
}

impl ForeignKeyDef {
    fn cascade(column: &str, references_table: &str) -> Self {
        Self {
            column: column.to_string(),
            references_table: references_table.to_string(),
            references_column: "id".to_string(),
            on_delete: ReferenceAction::Cascade,
            role: None,
        }
    }

    fn with_role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub foreign_keys: Vec<ForeignKeyDef>,
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKeyDef> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    /// Describe how `other` departs from this table, column by column.
    ///
    /// Roles are ignored since a live database cannot report them.
    pub fn differences(&self, other: &TableDef) -> Vec<String> {
        let mut diffs = Vec::new();

        for column in &self.columns {
            match other.column(&column.name) {
                None => diffs.push(format!("column {} is missing", column.name)),
                Some(found) => {
                    if found.column_type != column.column_type {
                        diffs.push(format!(
                            "column {} has type {} (expected {})",
                            column.name, found.column_type, column.column_type
                        ));
                    }
                    if found.nullable != column.nullable {
                        diffs.push(format!(
                            "column {} nullability is {} (expected {})",
                            column.name, found.nullable, column.nullable
                        ));
                    }
                    if found.primary_key != column.primary_key {
                        diffs.push(format!("column {} primary key differs", column.name));
                    }
                    if found.unique != column.unique {
                        diffs.push(format!("column {} uniqueness differs", column.name));
                    }
                }
            }
        }
        for column in &other.columns {
            if self.column(&column.name).is_none() {
                diffs.push(format!("column {} is not declared", column.name));
            }
        }

        for fk in &self.foreign_keys {
            match other.foreign_key(&fk.column) {
                None => diffs.push(format!("foreign key on {} is missing", fk.column)),
                Some(found) => {
                    if found.references_table != fk.references_table
                        || found.references_column != fk.references_column
                    {
                        diffs.push(format!(
                            "foreign key on {} references {}.{} (expected {}.{})",
                            fk.column,
                            found.references_table,
                            found.references_column,
                            fk.references_table,
                            fk.references_column
                        ));
                    }
                    if found.on_delete != fk.on_delete {
                        diffs.push(format!(
                            "foreign key on {} deletes with {} (expected {})",
                            fk.column,
                            found.on_delete.as_sql(),
                            fk.on_delete.as_sql()
                        ));
                    }
                }
            }
        }

        diffs
    }
}

/// A foreign key seen as a directed edge from child to parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation<'a> {
    pub table: &'a TableDef,
    pub foreign_key: &'a ForeignKeyDef,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("schema declares no tables")]
    Empty,

    #[error("table {0} is not declared")]
    UnknownTable(String),

    #[error("table {0} is declared more than once")]
    DuplicateTable(String),

    #[error("table {0} has no primary key column")]
    MissingPrimaryKey(String),

    #[error("table {0} has more than one primary key column")]
    CompositePrimaryKey(String),

    #[error("foreign key {table}.{column} names a column that does not exist")]
    UnknownColumn { table: String, column: String },

    #[error("foreign key {table}.{column} references unknown {references}")]
    UnknownReference {
        table: String,
        column: String,
        references: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub tables: Vec<TableDef>,
}

impl SchemaMetadata {
    /// The five-table model: users, their posts, comments, follows and likes.
    pub fn declared() -> Self {
        let user = TableDef {
            name: USER_TABLE.to_string(),
            columns: vec![
                ColumnDef::primary_key("id"),
                ColumnDef::new("username", ColumnType::Varchar(50))
                    .required()
                    .unique(),
                ColumnDef::new("email", ColumnType::Varchar(100))
                    .required()
                    .unique(),
                ColumnDef::new("password", ColumnType::Varchar(255)).required(),
                ColumnDef::new("first_name", ColumnType::Varchar(50)),
                ColumnDef::new("last_name", ColumnType::Varchar(50)),
                ColumnDef::new("bio", ColumnType::Text),
                ColumnDef::new("profile_picture", ColumnType::Varchar(255)),
                ColumnDef::new("created_at", ColumnType::DateTime),
            ],
            foreign_keys: Vec::new(),
        };

        let post = TableDef {
            name: POST_TABLE.to_string(),
            columns: vec![
                ColumnDef::primary_key("id"),
                ColumnDef::new("user_id", ColumnType::Integer).required(),
                ColumnDef::new("image_url", ColumnType::Varchar(255)).required(),
                ColumnDef::new("caption", ColumnType::Text),
                ColumnDef::new("location", ColumnType::Varchar(100)),
                ColumnDef::new("created_at", ColumnType::DateTime),
            ],
            foreign_keys: vec![ForeignKeyDef::cascade("user_id", USER_TABLE)],
        };

        let comment = TableDef {
            name: COMMENT_TABLE.to_string(),
            columns: vec![
                ColumnDef::primary_key("id"),
                ColumnDef::new("user_id", ColumnType::Integer).required(),
                ColumnDef::new("post_id", ColumnType::Integer).required(),
                ColumnDef::new("comment_text", ColumnType::Text).required(),
                ColumnDef::new("created_at", ColumnType::DateTime),
            ],
            foreign_keys: vec![
                ForeignKeyDef::cascade("user_id", USER_TABLE),
                ForeignKeyDef::cascade("post_id", POST_TABLE),
            ],
        };

        let follower = TableDef {
            name: FOLLOWER_TABLE.to_string(),
            columns: vec![
                ColumnDef::primary_key("id"),
                ColumnDef::new("user_from_id", ColumnType::Integer).required(),
                ColumnDef::new("user_to_id", ColumnType::Integer).required(),
                ColumnDef::new("created_at", ColumnType::DateTime),
            ],
            foreign_keys: vec![
                ForeignKeyDef::cascade("user_from_id", USER_TABLE).with_role("follower"),
                ForeignKeyDef::cascade("user_to_id", USER_TABLE).with_role("followed"),
            ],
        };

        let like = TableDef {
            name: LIKE_TABLE.to_string(),
            columns: vec![
                ColumnDef::primary_key("id"),
                ColumnDef::new("user_id", ColumnType::Integer).required(),
                ColumnDef::new("post_id", ColumnType::Integer).required(),
                ColumnDef::new("created_at", ColumnType::DateTime),
            ],
            foreign_keys: vec![
                ForeignKeyDef::cascade("user_id", USER_TABLE),
                ForeignKeyDef::cascade("post_id", POST_TABLE),
            ],
        };

        Self {
            tables: vec![user, post, comment, follower, like],
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Every foreign key, in declaration order.
    pub fn relations(&self) -> Vec<Relation<'_>> {
        self.tables
            .iter()
            .flat_map(|table| {
                table
                    .foreign_keys
                    .iter()
                    .map(move |foreign_key| Relation { table, foreign_key })
            })
            .collect()
    }

    /// Foreign keys pointing at `table`, i.e. its reverse collections.
    pub fn dependents_of(&self, table: &str) -> Vec<Relation<'_>> {
        self.relations()
            .into_iter()
            .filter(|r| r.foreign_key.references_table == table)
            .collect()
    }

    /// Tables whose rows go away when a row of `table` is deleted, ordered
    /// so that each table comes after everything that depends on it.
    ///
    /// Only cascading foreign keys are followed. `table` itself is excluded.
    pub fn cascade_order(&self, table: &str) -> Vec<&str> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        if let Some(root) = self.table(table) {
            visited.insert(root.name.as_str());
        }
        self.visit_cascade(table, &mut visited, &mut order);
        order
    }

    fn visit_cascade<'a>(
        &'a self,
        table: &str,
        visited: &mut HashSet<&'a str>,
        order: &mut Vec<&'a str>,
    ) {
        for relation in self.dependents_of(table) {
            if relation.foreign_key.on_delete != ReferenceAction::Cascade {
                continue;
            }
            let child = relation.table.name.as_str();
            if visited.insert(child) {
                self.visit_cascade(child, visited, order);
                order.push(child);
            }
        }
    }

    /// Check that the metadata can be loaded by the store: structurally sound
    /// and every table keyed by exactly one primary-key column.
    pub fn validate(&self) -> Result<(), MetadataError> {
        self.validate_references()?;

        for table in &self.tables {
            match table.columns.iter().filter(|c| c.primary_key).count() {
                0 => return Err(MetadataError::MissingPrimaryKey(table.name.clone())),
                1 => {}
                _ => return Err(MetadataError::CompositePrimaryKey(table.name.clone())),
            }
        }
        Ok(())
    }

    /// Check that tables are declared once and every foreign key points at
    /// an existing table and column. Keyless and composite-key tables pass.
    pub fn validate_references(&self) -> Result<(), MetadataError> {
        if self.tables.is_empty() {
            return Err(MetadataError::Empty);
        }

        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(table.name.as_str()) {
                return Err(MetadataError::DuplicateTable(table.name.clone()));
            }
        }

        for relation in self.relations() {
            let fk = relation.foreign_key;
            if relation.table.column(&fk.column).is_none() {
                return Err(MetadataError::UnknownColumn {
                    table: relation.table.name.clone(),
                    column: fk.column.clone(),
                });
            }
            let target = self
                .table(&fk.references_table)
                .and_then(|t| t.column(&fk.references_column));
            if target.is_none() {
                return Err(MetadataError::UnknownReference {
                    table: relation.table.name.clone(),
                    column: fk.column.clone(),
                    references: format!("{}.{}", fk.references_table, fk.references_column),
                });
            }
        }

        Ok(())
    }
}
