use chrono::Utc;
use rusqlite::{OptionalExtension, Row};

use snapgram_types::{Follower, NewFollower, FOLLOWER_TABLE};

use super::timestamp;
use crate::db::DbPool;
use crate::error::{Result, StoreError};

const SELECT_FOLLOWER: &str =
    r#"SELECT id, user_from_id, user_to_id, created_at FROM "follower""#;

fn map_follower(row: &Row<'_>) -> rusqlite::Result<Follower> {
    Ok(Follower {
        id: row.get(0)?,
        user_from_id: row.get(1)?,
        user_to_id: row.get(2)?,
        created_at: timestamp(row, 3)?,
    })
}

pub struct FollowerRepository {
    pool: DbPool,
}

impl FollowerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Record that `user_from_id` follows `user_to_id`.
    ///
    /// Repeated follows and self-follows are stored as given.
    pub fn follow(&self, follow: NewFollower) -> Result<Follower> {
        let conn = self.pool.get()?;
        let created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO "follower" (user_from_id, user_to_id, created_at) VALUES (?1, ?2, ?3)"#,
            (follow.user_from_id, follow.user_to_id, created_at.to_rfc3339()),
        )
        .map_err(|e| StoreError::from_write(FOLLOWER_TABLE, e))?;

        Ok(Follower {
            id: conn.last_insert_rowid(),
            user_from_id: follow.user_from_id,
            user_to_id: follow.user_to_id,
            created_at: Some(created_at),
        })
    }

    /// Remove every follow edge from one user to another
    pub fn unfollow(&self, user_from_id: i64, user_to_id: i64) -> Result<usize> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            r#"DELETE FROM "follower" WHERE user_from_id = ? AND user_to_id = ?"#,
            (user_from_id, user_to_id),
        )?;
        Ok(rows)
    }

    /// Check if one user follows another
    pub fn is_following(&self, user_from_id: i64, user_to_id: i64) -> Result<bool> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            r#"SELECT COUNT(*) FROM "follower" WHERE user_from_id = ? AND user_to_id = ?"#,
            (user_from_id, user_to_id),
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_by_id(&self, follower_id: i64) -> Result<Option<Follower>> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(&format!("{SELECT_FOLLOWER} WHERE id = ?"), [follower_id], map_follower)
            .optional()?;
        Ok(row)
    }

    /// Follow rows where the user is the one being followed
    pub fn get_followers(&self, user_id: i64) -> Result<Vec<Follower>> {
        self.query(
            &format!("{SELECT_FOLLOWER} WHERE user_to_id = ? ORDER BY created_at DESC, id DESC"),
            user_id,
        )
    }

    /// Follow rows where the user is the follower
    pub fn get_following(&self, user_id: i64) -> Result<Vec<Follower>> {
        self.query(
            &format!("{SELECT_FOLLOWER} WHERE user_from_id = ? ORDER BY created_at DESC, id DESC"),
            user_id,
        )
    }

    fn query(&self, sql: &str, user_id: i64) -> Result<Vec<Follower>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map([user_id], map_follower)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
