//! Explicit cascade deletes.
//!
//! A delete walks the declared foreign keys from the owner down, removes the
//! deepest dependents first and the owner last, all inside one transaction.
//! Nothing is committed unless every step succeeds.

use rusqlite::{Connection, Transaction};

use snapgram_types::{MetadataError, ReferenceAction, SchemaMetadata, TableDef};

use super::schema::quote_ident;
use crate::error::Result;

/// Rows removed by one cascade delete, per table, in deletion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeReport {
    pub table: String,
    pub id: i64,
    pub deleted: Vec<(String, usize)>,
}

impl CascadeReport {
    pub fn count(&self, table: &str) -> usize {
        self.deleted
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.deleted.iter().map(|(_, n)| n).sum()
    }

    fn record(&mut self, table: &str, rows: usize) {
        match self.deleted.iter_mut().find(|(name, _)| name == table) {
            Some((_, n)) => *n += rows,
            None => self.deleted.push((table.to_string(), rows)),
        }
    }
}

fn primary_key(table: &TableDef) -> Result<&str> {
    table
        .primary_key()
        .map(|c| c.name.as_str())
        .ok_or_else(|| MetadataError::MissingPrimaryKey(table.name.clone()).into())
}

/// Delete the row `id` of `table` and everything that cascades from it.
///
/// Returns `Ok(None)` when the row does not exist.
pub fn delete_cascading(
    conn: &mut Connection,
    schema: &SchemaMetadata,
    table: &str,
    id: i64,
) -> Result<Option<CascadeReport>> {
    let root = schema
        .table(table)
        .ok_or_else(|| MetadataError::UnknownTable(table.to_string()))?;
    let pk = primary_key(root)?;

    let tx = conn.transaction()?;

    let exists: bool = tx.query_row(
        &format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1)",
            quote_ident(&root.name),
            quote_ident(pk)
        ),
        [id],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(None);
    }

    let mut report = CascadeReport {
        table: root.name.clone(),
        id,
        deleted: schema
            .cascade_order(&root.name)
            .into_iter()
            .map(|t| (t.to_string(), 0))
            .collect(),
    };

    let selector = format!(
        "SELECT {pk} FROM {table} WHERE {pk} = ?1",
        pk = quote_ident(pk),
        table = quote_ident(&root.name)
    );
    let mut path = Vec::new();
    delete_rows(&tx, schema, root, &selector, id, &mut report, &mut path)?;

    tx.commit()?;

    tracing::debug!(
        table = %report.table,
        id,
        rows = report.total(),
        "Cascade delete committed"
    );
    Ok(Some(report))
}

/// Delete the rows of `table` whose keys `selector` yields, children first.
fn delete_rows<'a>(
    tx: &Transaction<'_>,
    schema: &'a SchemaMetadata,
    table: &'a TableDef,
    selector: &str,
    id: i64,
    report: &mut CascadeReport,
    path: &mut Vec<&'a str>,
) -> Result<()> {
    path.push(&table.name);

    for relation in schema.dependents_of(&table.name) {
        let child = relation.table;
        if relation.foreign_key.on_delete != ReferenceAction::Cascade
            || path.contains(&child.name.as_str())
        {
            continue;
        }

        let child_selector = format!(
            "SELECT {pk} FROM {child} WHERE {fk} IN ({selector})",
            pk = quote_ident(primary_key(child)?),
            child = quote_ident(&child.name),
            fk = quote_ident(&relation.foreign_key.column),
        );
        delete_rows(tx, schema, child, &child_selector, id, report, path)?;
    }

    let rows = tx.execute(
        &format!(
            "DELETE FROM {} WHERE {} IN ({selector})",
            quote_ident(&table.name),
            quote_ident(primary_key(table)?)
        ),
        [id],
    )?;
    report.record(&table.name, rows);

    path.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{schema_sql, DEMO_DATA};

    /// A raw connection with foreign key enforcement left off, so only the
    /// explicit cascade can remove dependents.
    fn unenforced_demo_connection() -> Connection {
        let conn = Connection::open_in_memory().expect("Failed to open database");
        conn.execute_batch(&schema_sql())
            .expect("Failed to create schema");
        conn.execute_batch(DEMO_DATA).expect("Failed to seed demo data");
        conn
    }

    fn count(conn: &Connection, sql: &str) -> i64 {
        conn.query_row(sql, [], |row| row.get(0))
            .expect("Failed to count rows")
    }

    #[test]
    fn test_user_delete_leaves_no_orphans_without_constraints() {
        let mut conn = unenforced_demo_connection();
        let schema = SchemaMetadata::declared();

        let report = delete_cascading(&mut conn, &schema, "user", 1)
            .expect("Failed to delete user")
            .expect("User should exist");

        assert_eq!(report.count("post"), 2);
        assert_eq!(report.count("comment"), 3);
        assert_eq!(report.count("like"), 3);
        assert_eq!(report.count("follower"), 3);
        assert_eq!(report.count("user"), 1);
        assert_eq!(report.total(), 12);

        let orphans = count(
            &conn,
            "SELECT
                (SELECT COUNT(*) FROM \"post\" WHERE user_id NOT IN (SELECT id FROM \"user\"))
              + (SELECT COUNT(*) FROM \"comment\" WHERE user_id NOT IN (SELECT id FROM \"user\")
                    OR post_id NOT IN (SELECT id FROM \"post\"))
              + (SELECT COUNT(*) FROM \"like\" WHERE user_id NOT IN (SELECT id FROM \"user\")
                    OR post_id NOT IN (SELECT id FROM \"post\"))
              + (SELECT COUNT(*) FROM \"follower\" WHERE user_from_id NOT IN (SELECT id FROM \"user\")
                    OR user_to_id NOT IN (SELECT id FROM \"user\"))",
        );
        assert_eq!(orphans, 0);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM \"comment\""), 1);
    }

    #[test]
    fn test_report_lists_tables_in_deletion_order() {
        let mut conn = unenforced_demo_connection();
        let schema = SchemaMetadata::declared();

        let report = delete_cascading(&mut conn, &schema, "user", 3)
            .expect("Failed to delete user")
            .expect("User should exist");

        let tables: Vec<&str> = report.deleted.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(tables, vec!["comment", "like", "post", "follower", "user"]);
        assert_eq!(report.count("post"), 0);
        assert_eq!(report.count("comment"), 2);
    }

    #[test]
    fn test_post_delete_removes_comments_and_likes() {
        let mut conn = unenforced_demo_connection();
        let schema = SchemaMetadata::declared();

        let report = delete_cascading(&mut conn, &schema, "post", 3)
            .expect("Failed to delete post")
            .expect("Post should exist");

        assert_eq!(report.count("comment"), 2);
        assert_eq!(report.count("like"), 2);
        assert_eq!(
            count(&conn, "SELECT COUNT(*) FROM \"comment\" WHERE post_id = 3"),
            0
        );
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM \"like\" WHERE post_id = 3"), 0);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM \"user\""), 3);
    }

    #[test]
    fn test_missing_row_is_none_and_changes_nothing() {
        let mut conn = unenforced_demo_connection();
        let schema = SchemaMetadata::declared();

        let report = delete_cascading(&mut conn, &schema, "user", 99).expect("Delete failed");
        assert!(report.is_none());
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM \"follower\""), 4);
    }

    #[test]
    fn test_failed_step_rolls_back_everything() {
        let mut conn = unenforced_demo_connection();
        let schema = SchemaMetadata::declared();

        // Make the last step (deleting the user row) fail
        conn.execute_batch(
            "CREATE TRIGGER block_user_delete BEFORE DELETE ON \"user\"
             BEGIN SELECT RAISE(ABORT, 'user rows are locked'); END;",
        )
        .expect("Failed to create trigger");

        let result = delete_cascading(&mut conn, &schema, "user", 1);
        assert!(result.is_err());

        assert_eq!(count(&conn, "SELECT COUNT(*) FROM \"post\""), 3);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM \"comment\""), 4);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM \"like\""), 4);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM \"follower\""), 4);
    }
}
