use chrono::Utc;
use rusqlite::{OptionalExtension, Row};

use snapgram_types::{NewUser, SchemaMetadata, User, USER_TABLE};

use super::timestamp;
use crate::db::cascade::{delete_cascading, CascadeReport};
use crate::db::DbPool;
use crate::error::{Result, StoreError};

const SELECT_USER: &str = r#"SELECT id, username, email, password, first_name, last_name, bio, profile_picture, created_at
     FROM "user""#;

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        bio: row.get(6)?,
        profile_picture: row.get(7)?,
        created_at: timestamp(row, 8)?,
    })
}

pub struct UserRepository {
    pool: DbPool,
    schema: SchemaMetadata,
}

impl UserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            schema: SchemaMetadata::declared(),
        }
    }

    /// Create a new user
    pub fn create(&self, user: &NewUser) -> Result<User> {
        let conn = self.pool.get()?;
        let created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO "user" (username, email, password, first_name, last_name, bio, profile_picture, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            (
                &user.username,
                &user.email,
                &user.password,
                &user.first_name,
                &user.last_name,
                &user.bio,
                &user.profile_picture,
                created_at.to_rfc3339(),
            ),
        )
        .map_err(|e| StoreError::from_write(USER_TABLE, e))?;

        Ok(User {
            id: conn.last_insert_rowid(),
            username: user.username.clone(),
            email: user.email.clone(),
            password: user.password.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            bio: user.bio.clone(),
            profile_picture: user.profile_picture.clone(),
            created_at: Some(created_at),
        })
    }

    /// Get user by ID
    pub fn get_by_id(&self, user_id: i64) -> Result<Option<User>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!("{SELECT_USER} WHERE id = ?"))?;
        let user = stmt.query_row([user_id], map_user).optional()?;
        Ok(user)
    }

    /// Get user by username
    pub fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!("{SELECT_USER} WHERE username = ?"))?;
        let user = stmt.query_row([username], map_user).optional()?;
        Ok(user)
    }

    /// Get all users ordered by username
    pub fn list_all(&self) -> Result<Vec<User>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!("{SELECT_USER} ORDER BY username"))?;
        let users = stmt
            .query_map([], map_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Update the free-text profile fields
    pub fn update_bio(&self, user_id: i64, bio: Option<&str>) -> Result<bool> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute(r#"UPDATE "user" SET bio = ?1 WHERE id = ?2"#, (bio, user_id))
            .map_err(|e| StoreError::from_write(USER_TABLE, e))?;
        Ok(rows > 0)
    }

    /// Delete a user together with their posts, comments, follows and likes
    pub fn delete(&self, user_id: i64) -> Result<Option<CascadeReport>> {
        let mut conn = self.pool.get()?;
        delete_cascading(&mut conn, &self.schema, USER_TABLE, user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::demo_db;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password: "secret".to_string(),
            ..NewUser::default()
        }
    }

    #[test]
    fn test_create_and_fetch() {
        let db = demo_db();
        let repo = UserRepository::new(db.pool.clone());

        let created = repo
            .create(&new_user("dora", "dora@example.com"))
            .expect("Failed to create user");
        assert_eq!(created.id, 4);

        let fetched = repo.get_by_id(created.id).unwrap().expect("User missing");
        assert_eq!(fetched, created);
        assert_eq!(
            repo.get_by_username("dora").unwrap().map(|u| u.id),
            Some(created.id)
        );
    }

    #[test]
    fn test_username_and_email_are_unique() {
        let db = demo_db();
        let repo = UserRepository::new(db.pool.clone());

        let dup_username = repo.create(&new_user("alice", "other@example.com"));
        assert!(matches!(dup_username, Err(StoreError::Conflict { table: "user", .. })));

        let dup_email = repo.create(&new_user("alicia", "alice@example.com"));
        assert!(matches!(dup_email, Err(StoreError::Conflict { .. })));
    }

    #[test]
    fn test_list_all_ordered() {
        let db = demo_db();
        let repo = UserRepository::new(db.pool.clone());

        let names: Vec<String> = repo
            .list_all()
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["alice", "bob", "charlie"]);
    }

    #[test]
    fn test_update_bio() {
        let db = demo_db();
        let repo = UserRepository::new(db.pool.clone());

        assert!(repo.update_bio(2, Some("Now on film")).unwrap());
        assert_eq!(
            repo.get_by_id(2).unwrap().unwrap().bio.as_deref(),
            Some("Now on film")
        );
        assert!(!repo.update_bio(99, None).unwrap());
    }

    #[test]
    fn test_delete_user_cascades() {
        let db = demo_db();
        let repo = UserRepository::new(db.pool.clone());

        let report = repo.delete(1).unwrap().expect("User should exist");
        assert_eq!(report.count("user"), 1);
        assert_eq!(report.count("post"), 2);
        assert!(repo.get_by_id(1).unwrap().is_none());

        let conn = db.connection().unwrap();
        let referencing: i64 = conn
            .query_row(
                r#"SELECT
                    (SELECT COUNT(*) FROM "post" WHERE user_id = 1)
                  + (SELECT COUNT(*) FROM "comment" WHERE user_id = 1 OR post_id IN (1, 2))
                  + (SELECT COUNT(*) FROM "like" WHERE user_id = 1 OR post_id IN (1, 2))
                  + (SELECT COUNT(*) FROM "follower" WHERE user_from_id = 1 OR user_to_id = 1)"#,
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(referencing, 0);
        drop(conn);

        assert!(repo.delete(1).unwrap().is_none());
    }
}
