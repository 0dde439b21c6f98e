pub mod metadata;
pub mod models;

pub use metadata::*;
pub use models::*;
