//! Entity-relationship diagrams for the Snapgram data model.
//!
//! The generator reads the schema of a live SQLite or PostgreSQL database and
//! renders it as SVG. When the database cannot be read it falls back to the model
//! declared in `snapgram-types`.

pub mod error;
pub mod generator;
pub mod introspect;
pub mod pg;
pub mod render;
pub mod source;

pub use error::DiagramError;
pub use generator::{generate_diagram, DiagramGenerator, Outcome, Stage};
pub use source::{DeclaredModel, LiveDatabase, SchemaSource};
