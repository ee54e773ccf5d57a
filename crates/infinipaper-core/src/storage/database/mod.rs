mod connection;
mod migrations;
mod schema;

pub use connection::ConnectionPool;
pub use migrations::{Migration, get_applied_versions, run_migrations};
pub use schema::SCHEMA_VERSION;

use std::path::Path;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{CoreError, Result};
use crate::models::{Author, AuthorId, AuthorshipLink, NewPaper, Paper, PaperId};

use super::repositories::{
    AuthorRepository, PaperRepository, Repository, SqliteAuthorRepository, SqlitePaperRepository,
};

pub fn open_database(path: &Path) -> Result<ConnectionPool> {
    let pool = ConnectionPool::open(path)?;
    {
        let conn = pool.get_connection();
        migrations::run_migrations(&conn)?;
    }
    Ok(pool)
}

pub fn open_in_memory() -> Result<ConnectionPool> {
    let pool = ConnectionPool::open_in_memory()?;
    {
        let conn = pool.get_connection();
        migrations::run_migrations(&conn)?;
    }
    Ok(pool)
}

/// Result of [`Database::import_paper`].
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub paper: Paper,
    /// `false` when an existing paper with the same DOI absorbed the import.
    pub created: bool,
    pub fields_filled: Vec<&'static str>,
    pub author_ids: Vec<AuthorId>,
}

pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let pool = open_database(path)?;
        Ok(Self { pool })
    }

    pub fn open_in_memory() -> Result<Self> {
        let pool = open_in_memory()?;
        Ok(Self { pool })
    }

    pub fn path(&self) -> Option<&str> {
        self.pool.path()
    }

    pub fn find_paper(&self, id: PaperId) -> Result<Option<Paper>> {
        let conn = self.pool.get_connection();
        SqlitePaperRepository::new(&conn).find_by_id(&id)
    }

    pub fn get_paper(&self, id: PaperId) -> Result<Paper> {
        self.find_paper(id)?.ok_or(CoreError::PaperNotFound(id))
    }

    pub fn find_by_doi(&self, doi: &str) -> Result<Option<Paper>> {
        let conn = self.pool.get_connection();
        SqlitePaperRepository::new(&conn).find_by_doi(doi)
    }

    pub fn list_papers(&self) -> Result<Vec<Paper>> {
        let conn = self.pool.get_connection();
        SqlitePaperRepository::new(&conn).list()
    }

    pub fn count_papers(&self) -> Result<usize> {
        let conn = self.pool.get_connection();
        SqlitePaperRepository::new(&conn).count()
    }

    pub fn insert_paper(&self, paper: &NewPaper) -> Result<Paper> {
        let conn = self.pool.get_connection();
        SqlitePaperRepository::new(&conn).insert(paper)
    }

    pub fn update_paper(&self, paper: &Paper) -> Result<()> {
        let conn = self.pool.get_connection();
        SqlitePaperRepository::new(&conn).save(paper)
    }

    pub fn delete_paper(&self, id: PaperId) -> Result<bool> {
        let conn = self.pool.get_connection();
        SqlitePaperRepository::new(&conn).delete(&id)
    }

    pub fn authors_of(&self, paper_id: PaperId) -> Result<Vec<Author>> {
        let conn = self.pool.get_connection();
        SqliteAuthorRepository::new(&conn).authors_of(paper_id)
    }

    pub fn authorship_links(&self, paper_id: PaperId) -> Result<Vec<AuthorshipLink>> {
        let conn = self.pool.get_connection();
        SqliteAuthorRepository::new(&conn).links_for_paper(paper_id)
    }

    /// Store a resolved paper. A paper already holding the same DOI
    /// (case-insensitive) is updated field by field where its values are
    /// empty; otherwise a new row is inserted. Authors are found or created
    /// by name and, when any are given, replace the paper's author list in
    /// order. Runs in one transaction.
    pub fn import_paper(&self, incoming: &NewPaper) -> Result<ImportOutcome> {
        self.transaction(|conn| {
            let papers = SqlitePaperRepository::new(conn);
            let authors = SqliteAuthorRepository::new(conn);

            let existing = match incoming.doi.as_deref() {
                Some(doi) => papers.find_by_doi(doi)?,
                None => None,
            };

            let (paper, created, fields_filled) = match existing {
                Some(mut paper) => {
                    let filled = paper.absorb_import(incoming);
                    if !filled.is_empty() {
                        papers.save(&paper)?;
                    }
                    debug!(paper_id = paper.id, ?filled, "import matched existing paper by DOI");
                    (paper, false, filled)
                }
                None => (papers.insert(incoming)?, true, Vec::new()),
            };

            let mut author_ids = Vec::new();
            for author in incoming.authors.iter().filter(|a| !a.name.trim().is_empty()) {
                let stored = authors.find_or_create(author)?;
                if !author_ids.contains(&stored.id) {
                    author_ids.push(stored.id);
                }
            }
            if !author_ids.is_empty() {
                authors.replace_links(paper.id, &author_ids)?;
            }

            info!(paper_id = paper.id, created, doi = ?paper.doi, "paper imported");
            Ok(ImportOutcome {
                paper,
                created,
                fields_filled,
                author_ids,
            })
        })
    }

    /// Run `f` inside a SQLite transaction. The transaction commits when `f`
    /// returns `Ok` and rolls back otherwise.
    pub fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, E>,
        E: From<CoreError>,
    {
        let mut conn = self.pool.get_connection();
        let tx = conn.transaction().map_err(CoreError::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(CoreError::from)?;
        Ok(value)
    }
}
