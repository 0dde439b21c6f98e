// Library exports for snapgram-store
// The diagram tools reuse the configuration layer and the connection wrapper

pub mod config;
pub mod db;
pub mod error;

pub use error::StoreError;
