pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use config::{AppConfig, CoreConfig, DedupConfig, SourcesConfig};
pub use error::{CoreError, ExitCode, Result};
pub use models::*;

pub use storage::database::{ConnectionPool, Database, ImportOutcome, open_database, open_in_memory};
pub use storage::repositories::{
    AuthorRepository, PaperRepository, Repository, SqliteAuthorRepository, SqlitePaperRepository,
};
