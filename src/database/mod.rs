pub mod models;
pub mod store;

pub use models::HashRecord;
pub use store::HashStore;

use thiserror::Error;

pub const DEFAULT_DATABASE_PATH: &str = "hashes.db";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store holds {0} rows with a repeated phash; cannot enforce uniqueness")]
    DuplicateRows(i64),
}
