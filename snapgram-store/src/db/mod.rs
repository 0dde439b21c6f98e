pub mod cascade;
pub mod connection;
pub mod repositories;
pub mod schema;

pub use cascade::CascadeReport;
pub use connection::{Database, DbConnection, DbPool};
