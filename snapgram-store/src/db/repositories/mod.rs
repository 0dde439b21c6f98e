use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Row;

mod comment_repository;
mod follower_repository;
mod like_repository;
mod post_repository;
mod user_repository;

pub use comment_repository::CommentRepository;
pub use follower_repository::FollowerRepository;
pub use like_repository::LikeRepository;
pub use post_repository::PostRepository;
pub use user_repository::UserRepository;

/// Read a nullable RFC3339 timestamp column.
pub(crate) fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        raw.parse::<DateTime<Utc>>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}
