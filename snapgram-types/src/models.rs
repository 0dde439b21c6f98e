use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// Custom serde module for optional DateTime to ensure RFC3339 string format
mod datetime_format {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(date) => serializer.serialize_str(&date.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| s.parse::<DateTime<Utc>>().map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Flatten a row struct into a plain field map.
///
/// The structs below only hold scalar columns, so their JSON form is always
/// an object.
fn to_mapping<T: Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Stored credential. Never part of the serialized form.
    #[serde(skip_serializing, default)]
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    /// Set by the store on insert; rows written elsewhere may lack it
    #[serde(with = "datetime_format", default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Field map of the public profile: every column except `password`.
    pub fn serialize(&self) -> Map<String, Value> {
        to_mapping(self)
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<User {}>", self.username)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    pub image_url: String,
    pub caption: Option<String>,
    pub location: Option<String>,
    #[serde(with = "datetime_format", default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn serialize(&self) -> Map<String, Value> {
        to_mapping(self)
    }
}

impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Post {}>", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    /// Author
    pub user_id: i64,
    pub post_id: i64,
    pub comment_text: String,
    #[serde(with = "datetime_format", default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Comment {
    pub fn serialize(&self) -> Map<String, Value> {
        to_mapping(self)
    }
}

impl fmt::Display for Comment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Comment {}>", self.id)
    }
}

/// A one-way follow edge between two users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Follower {
    pub id: i64,
    /// The user who follows (subject of the relation)
    pub user_from_id: i64,
    /// The user being followed (object of the relation)
    pub user_to_id: i64,
    #[serde(with = "datetime_format", default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Follower {
    pub fn serialize(&self) -> Map<String, Value> {
        to_mapping(self)
    }
}

impl fmt::Display for Follower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Follower {} -> {}>", self.user_from_id, self.user_to_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    pub id: i64,
    pub user_id: i64,
    pub post_id: i64,
    #[serde(with = "datetime_format", default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Like {
    pub fn serialize(&self) -> Map<String, Value> {
        to_mapping(self)
    }
}

impl fmt::Display for Like {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Like {}>", self.id)
    }
}

// Insert payloads. Ids and timestamps are assigned by the store.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub user_id: i64,
    pub image_url: String,
    pub caption: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub user_id: i64,
    pub post_id: i64,
    pub comment_text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NewFollower {
    pub user_from_id: i64,
    pub user_to_id: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NewLike {
    pub user_id: i64,
    pub post_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 10, 0, 0).unwrap()
    }

    fn keys(map: &Map<String, Value>) -> Vec<&str> {
        let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    fn sample_user() -> User {
        User {
            id: 1,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "hunter2".to_string(),
            first_name: Some("Alice".to_string()),
            last_name: None,
            bio: Some("Photographer".to_string()),
            profile_picture: None,
            created_at: Some(timestamp()),
        }
    }

    #[test]
    fn test_user_serialize_omits_password() {
        let map = sample_user().serialize();

        assert_eq!(
            keys(&map),
            vec![
                "bio",
                "created_at",
                "email",
                "first_name",
                "id",
                "last_name",
                "profile_picture",
                "username",
            ]
        );
        assert!(!map.contains_key("password"));
        assert!(!map.values().any(|v| v == "hunter2"));
    }

    #[test]
    fn test_user_serialize_keeps_absent_optionals_as_null() {
        let map = sample_user().serialize();
        assert_eq!(map["last_name"], Value::Null);
        assert_eq!(map["first_name"], "Alice");
        assert_eq!(map["created_at"], "2024-01-10T10:00:00+00:00");
    }

    #[test]
    fn test_post_serialize_fields() {
        let post = Post {
            id: 3,
            user_id: 1,
            image_url: "https://img.example.com/3.jpg".to_string(),
            caption: None,
            location: Some("Lisbon".to_string()),
            created_at: Some(timestamp()),
        };

        let map = post.serialize();
        assert_eq!(
            keys(&map),
            vec!["caption", "created_at", "id", "image_url", "location", "user_id"]
        );
        assert!(map.values().all(|v| !v.is_array() && !v.is_object()));
    }

    #[test]
    fn test_comment_follower_like_serialize_fields() {
        let comment = Comment {
            id: 4,
            user_id: 2,
            post_id: 3,
            comment_text: "Nice shot".to_string(),
            created_at: Some(timestamp()),
        };
        let follower = Follower {
            id: 5,
            user_from_id: 2,
            user_to_id: 1,
            created_at: Some(timestamp()),
        };
        let like = Like {
            id: 6,
            user_id: 2,
            post_id: 3,
            created_at: Some(timestamp()),
        };

        assert_eq!(
            keys(&comment.serialize()),
            vec!["comment_text", "created_at", "id", "post_id", "user_id"]
        );
        assert_eq!(
            keys(&follower.serialize()),
            vec!["created_at", "id", "user_from_id", "user_to_id"]
        );
        assert_eq!(
            keys(&like.serialize()),
            vec!["created_at", "id", "post_id", "user_id"]
        );
    }

    #[test]
    fn test_missing_timestamp_serializes_as_null() {
        let like = Like {
            id: 7,
            user_id: 1,
            post_id: 2,
            created_at: None,
        };

        let map = like.serialize();
        assert_eq!(map["created_at"], Value::Null);

        let json = serde_json::to_string(&like).unwrap();
        let back: Like = serde_json::from_str(&json).unwrap();
        assert_eq!(back, like);
    }

    #[test]
    fn test_display_forms() {
        let follower = Follower {
            id: 9,
            user_from_id: 2,
            user_to_id: 1,
            created_at: Some(timestamp()),
        };
        assert_eq!(sample_user().to_string(), "<User alice>");
        assert_eq!(follower.to_string(), "<Follower 2 -> 1>");
    }

    #[test]
    fn test_user_deserializes_without_password() {
        let json = serde_json::to_string(&sample_user()).unwrap();
        let user: User = serde_json::from_str(&json).unwrap();
        assert_eq!(user.username, "alice");
        assert!(user.password.is_empty());
    }
}
