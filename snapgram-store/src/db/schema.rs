use snapgram_types::{ColumnDef, SchemaMetadata, TableDef};

/// Quote an identifier. `user` and `like` are both reserved words in SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_sql(column: &ColumnDef) -> String {
    if column.primary_key {
        // INTEGER PRIMARY KEY aliases the rowid, so ids are assigned on insert
        return format!("{} INTEGER PRIMARY KEY", quote_ident(&column.name));
    }

    let mut sql = format!("{} {}", quote_ident(&column.name), column.column_type);
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    if column.unique {
        sql.push_str(" UNIQUE");
    }
    sql
}

fn create_table_sql(table: &TableDef) -> String {
    let mut lines: Vec<String> = table.columns.iter().map(column_sql).collect();
    for fk in &table.foreign_keys {
        lines.push(format!(
            "FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE {}",
            quote_ident(&fk.column),
            quote_ident(&fk.references_table),
            quote_ident(&fk.references_column),
            fk.on_delete.as_sql()
        ));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
        quote_ident(&table.name),
        lines.join(",\n    ")
    )
}

/// DDL for every table, parents before children, with an index per foreign key column.
pub fn create_statements(schema: &SchemaMetadata) -> Vec<String> {
    let mut statements = Vec::new();
    for table in &schema.tables {
        statements.push(create_table_sql(table));
        for fk in &table.foreign_keys {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {}({});",
                quote_ident(&format!("idx_{}_{}", table.name, fk.column)),
                quote_ident(&table.name),
                quote_ident(&fk.column)
            ));
        }
    }
    statements
}

/// The declared schema as a single SQL batch.
pub fn schema_sql() -> String {
    create_statements(&SchemaMetadata::declared()).join("\n")
}

/// Demo data for development and testing
/// - 3 users (alice, bob, charlie)
/// - 3 posts, 4 comments, 4 follows, 4 likes
pub const DEMO_DATA: &str = r#"
INSERT OR IGNORE INTO "user" (id, username, email, password, first_name, last_name, bio, profile_picture, created_at) VALUES
    (1, 'alice', 'alice@example.com', 'pbkdf2$alice', 'Alice', 'Liddell', 'Street photographer', 'https://img.example.com/u/1.jpg', '2024-01-01T00:00:00+00:00'),
    (2, 'bob', 'bob@example.com', 'pbkdf2$bob', 'Bob', NULL, NULL, NULL, '2024-01-02T00:00:00+00:00'),
    (3, 'charlie', 'charlie@example.com', 'pbkdf2$charlie', NULL, NULL, 'Mostly cats', NULL, '2024-01-03T00:00:00+00:00');

INSERT OR IGNORE INTO "post" (id, user_id, image_url, caption, location, created_at) VALUES
    (1, 1, 'https://img.example.com/p/1.jpg', 'Morning light', 'Lisbon', '2024-01-10T08:00:00+00:00'),
    (2, 1, 'https://img.example.com/p/2.jpg', NULL, NULL, '2024-01-11T09:30:00+00:00'),
    (3, 2, 'https://img.example.com/p/3.jpg', 'First post!', 'Porto', '2024-01-12T18:45:00+00:00');

INSERT OR IGNORE INTO "comment" (id, user_id, post_id, comment_text, created_at) VALUES
    (1, 2, 1, 'Great colours', '2024-01-10T09:00:00+00:00'),
    (2, 3, 1, 'Where is this?', '2024-01-10T10:00:00+00:00'),
    (3, 1, 3, 'Welcome!', '2024-01-12T19:00:00+00:00'),
    (4, 3, 3, 'Nice', '2024-01-12T20:00:00+00:00');

INSERT OR IGNORE INTO "follower" (id, user_from_id, user_to_id, created_at) VALUES
    (1, 2, 1, '2024-01-05T00:00:00+00:00'),
    (2, 3, 1, '2024-01-06T00:00:00+00:00'),
    (3, 1, 2, '2024-01-07T00:00:00+00:00'),
    (4, 3, 2, '2024-01-08T00:00:00+00:00');

INSERT OR IGNORE INTO "like" (id, user_id, post_id, created_at) VALUES
    (1, 2, 1, '2024-01-10T08:30:00+00:00'),
    (2, 3, 2, '2024-01-11T10:00:00+00:00'),
    (3, 1, 3, '2024-01-12T19:05:00+00:00'),
    (4, 3, 3, '2024-01-12T20:05:00+00:00');
"#;
