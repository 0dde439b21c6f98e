use rusqlite::ffi;
use thiserror::Error;

use snapgram_types::MetadataError;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique column already holds the value
    #[error("{table}: {detail}")]
    Conflict { table: &'static str, detail: String },

    /// A foreign key names a row that does not exist
    #[error("{table}: referenced row does not exist")]
    MissingReference { table: &'static str },

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Pool(#[from] r2d2::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Map constraint failures raised by a write on `table` to their typed form.
    pub(crate) fn from_write(table: &'static str, err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, message) = &err {
            match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    return StoreError::Conflict {
                        table,
                        detail: message
                            .clone()
                            .unwrap_or_else(|| "unique constraint failed".to_string()),
                    };
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                    return StoreError::MissingReference { table };
                }
                _ => {}
            }
        }
        StoreError::Sqlite(err)
    }
}
