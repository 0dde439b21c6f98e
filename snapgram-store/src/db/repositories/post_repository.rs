use chrono::Utc;
use rusqlite::{OptionalExtension, Row};

use snapgram_types::{NewPost, Post, SchemaMetadata, POST_TABLE};

use super::timestamp;
use crate::db::cascade::{delete_cascading, CascadeReport};
use crate::db::DbPool;
use crate::error::{Result, StoreError};

const SELECT_POST: &str = r#"SELECT id, user_id, image_url, caption, location, created_at FROM "post""#;

fn map_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        user_id: row.get(1)?,
        image_url: row.get(2)?,
        caption: row.get(3)?,
        location: row.get(4)?,
        created_at: timestamp(row, 5)?,
    })
}

pub struct PostRepository {
    pool: DbPool,
    schema: SchemaMetadata,
}

impl PostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            schema: SchemaMetadata::declared(),
        }
    }

    /// Create a new post
    pub fn create(&self, post: &NewPost) -> Result<Post> {
        let conn = self.pool.get()?;
        let created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO "post" (user_id, image_url, caption, location, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)"#,
            (
                post.user_id,
                &post.image_url,
                &post.caption,
                &post.location,
                created_at.to_rfc3339(),
            ),
        )
        .map_err(|e| StoreError::from_write(POST_TABLE, e))?;

        Ok(Post {
            id: conn.last_insert_rowid(),
            user_id: post.user_id,
            image_url: post.image_url.clone(),
            caption: post.caption.clone(),
            location: post.location.clone(),
            created_at: Some(created_at),
        })
    }

    /// Get post by ID
    pub fn get_by_id(&self, post_id: i64) -> Result<Option<Post>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!("{SELECT_POST} WHERE id = ?"))?;
        let post = stmt.query_row([post_id], map_post).optional()?;
        Ok(post)
    }

    /// Get posts owned by a user, newest first
    pub fn get_by_user(&self, user_id: i64) -> Result<Vec<Post>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_POST} WHERE user_id = ? ORDER BY created_at DESC, id DESC"
        ))?;
        let posts = stmt
            .query_map([user_id], map_post)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(posts)
    }

    /// Get post count for a user
    pub fn get_post_count(&self, user_id: i64) -> Result<usize> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            r#"SELECT COUNT(*) FROM "post" WHERE user_id = ?"#,
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Delete a post together with its comments and likes
    pub fn delete(&self, post_id: i64) -> Result<Option<CascadeReport>> {
        let mut conn = self.pool.get()?;
        delete_cascading(&mut conn, &self.schema, POST_TABLE, post_id)
    }
}
