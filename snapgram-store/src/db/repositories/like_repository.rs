use chrono::Utc;
use rusqlite::{OptionalExtension, Row};

use snapgram_types::{Like, NewLike, LIKE_TABLE};

use super::timestamp;
use crate::db::DbPool;
use crate::error::{Result, StoreError};

const SELECT_LIKE: &str = r#"SELECT id, user_id, post_id, created_at FROM "like""#;

fn map_like(row: &Row<'_>) -> rusqlite::Result<Like> {
    Ok(Like {
        id: row.get(0)?,
        user_id: row.get(1)?,
        post_id: row.get(2)?,
        created_at: timestamp(row, 3)?,
    })
}

pub struct LikeRepository {
    pool: DbPool,
}

impl LikeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Like a post
    pub fn create(&self, like: NewLike) -> Result<Like> {
        let conn = self.pool.get()?;
        let created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO "like" (user_id, post_id, created_at) VALUES (?1, ?2, ?3)"#,
            (like.user_id, like.post_id, created_at.to_rfc3339()),
        )
        .map_err(|e| StoreError::from_write(LIKE_TABLE, e))?;

        Ok(Like {
            id: conn.last_insert_rowid(),
            user_id: like.user_id,
            post_id: like.post_id,
            created_at: Some(created_at),
        })
    }

    pub fn get_by_id(&self, like_id: i64) -> Result<Option<Like>> {
        let conn = self.pool.get()?;
        let like = conn
            .query_row(&format!("{SELECT_LIKE} WHERE id = ?"), [like_id], map_like)
            .optional()?;
        Ok(like)
    }

    pub fn get_by_post(&self, post_id: i64) -> Result<Vec<Like>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!("{SELECT_LIKE} WHERE post_id = ? ORDER BY id"))?;
        let likes = stmt
            .query_map([post_id], map_like)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(likes)
    }

    pub fn get_by_user(&self, user_id: i64) -> Result<Vec<Like>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!("{SELECT_LIKE} WHERE user_id = ? ORDER BY id"))?;
        let likes = stmt
            .query_map([user_id], map_like)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(likes)
    }

    pub fn count_for_post(&self, post_id: i64) -> Result<usize> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            r#"SELECT COUNT(*) FROM "like" WHERE post_id = ?"#,
            [post_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
