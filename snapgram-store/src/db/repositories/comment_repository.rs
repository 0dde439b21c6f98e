use chrono::Utc;
use rusqlite::{OptionalExtension, Row};

use snapgram_types::{Comment, NewComment, COMMENT_TABLE};

use super::timestamp;
use crate::db::DbPool;
use crate::error::{Result, StoreError};

const SELECT_COMMENT: &str =
    r#"SELECT id, user_id, post_id, comment_text, created_at FROM "comment""#;

fn map_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        post_id: row.get(2)?,
        comment_text: row.get(3)?,
        created_at: timestamp(row, 4)?,
    })
}

pub struct CommentRepository {
    pool: DbPool,
}

impl CommentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Add a comment to a post
    pub fn create(&self, comment: &NewComment) -> Result<Comment> {
        let conn = self.pool.get()?;
        let created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO "comment" (user_id, post_id, comment_text, created_at)
             VALUES (?1, ?2, ?3, ?4)"#,
            (
                comment.user_id,
                comment.post_id,
                &comment.comment_text,
                created_at.to_rfc3339(),
            ),
        )
        .map_err(|e| StoreError::from_write(COMMENT_TABLE, e))?;

        Ok(Comment {
            id: conn.last_insert_rowid(),
            user_id: comment.user_id,
            post_id: comment.post_id,
            comment_text: comment.comment_text.clone(),
            created_at: Some(created_at),
        })
    }

    pub fn get_by_id(&self, comment_id: i64) -> Result<Option<Comment>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COMMENT} WHERE id = ?"))?;
        let comment = stmt.query_row([comment_id], map_comment).optional()?;
        Ok(comment)
    }

    /// Comments on a post, oldest first
    pub fn get_by_post(&self, post_id: i64) -> Result<Vec<Comment>> {
        let sql = format!("{SELECT_COMMENT} WHERE post_id = ? ORDER BY created_at ASC, id ASC");
        self.query(&sql, post_id)
    }

    /// Comments written by a user, newest first
    pub fn get_by_user(&self, user_id: i64) -> Result<Vec<Comment>> {
        let sql = format!("{SELECT_COMMENT} WHERE user_id = ? ORDER BY created_at DESC, id DESC");
        self.query(&sql, user_id)
    }

    fn query(&self, sql: &str, key: i64) -> Result<Vec<Comment>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(sql)?;
        let comments = stmt
            .query_map([key], map_comment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(comments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::demo_db;

    #[test]
    fn test_create_and_list_by_post() {
        let db = demo_db();
        let repo = CommentRepository::new(db.pool.clone());

        let comment = repo
            .create(&NewComment {
                user_id: 2,
                post_id: 2,
                comment_text: "Love it".to_string(),
            })
            .expect("Failed to create comment");

        assert_eq!(repo.get_by_id(comment.id).unwrap(), Some(comment.clone()));
        assert_eq!(repo.get_by_post(2).unwrap(), vec![comment]);

        let texts: Vec<String> = repo
            .get_by_post(1)
            .unwrap()
            .into_iter()
            .map(|c| c.comment_text)
            .collect();
        assert_eq!(texts, vec!["Great colours", "Where is this?"]);
    }

    #[test]
    fn test_get_by_user() {
        let db = demo_db();
        let repo = CommentRepository::new(db.pool.clone());

        let ids: Vec<i64> = repo.get_by_user(3).unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![4, 2]);
    }

    #[test]
    fn test_comment_needs_existing_post() {
        let db = demo_db();
        let repo = CommentRepository::new(db.pool.clone());

        let result = repo.create(&NewComment {
            user_id: 1,
            post_id: 77,
            comment_text: "Hello?".to_string(),
        });
        assert!(matches!(result, Err(StoreError::MissingReference { .. })));
    }
}
