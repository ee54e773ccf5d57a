use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: u32 = 2;

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(())
}

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS papers (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            title       TEXT NOT NULL,
            abstract    TEXT,
            year        INTEGER,
            doi         TEXT,
            venue       TEXT,
            url         TEXT,
            pdf_url     TEXT,
            file_ref    TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS authors (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            affiliation TEXT,
            orcid       TEXT
        );

        CREATE TABLE IF NOT EXISTS paper_authors (
            paper_id    INTEGER NOT NULL REFERENCES papers(id) ON DELETE CASCADE,
            author_id   INTEGER NOT NULL REFERENCES authors(id) ON DELETE CASCADE,
            position    INTEGER,
            PRIMARY KEY (paper_id, author_id)
        );
        ",
    )?;
    Ok(())
}

pub fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_papers_year         ON papers(year);
        CREATE INDEX IF NOT EXISTS idx_authors_name        ON authors(name);
        CREATE INDEX IF NOT EXISTS idx_paper_authors_author ON paper_authors(author_id);
        ",
    )?;
    Ok(())
}

/// At most one paper per DOI, compared case-insensitively. Papers without a
/// DOI are unconstrained.
pub fn create_doi_unique_index(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE UNIQUE INDEX IF NOT EXISTS idx_papers_doi_unique
            ON papers(lower(doi))
            WHERE doi IS NOT NULL AND doi <> '';
        ",
    )?;
    Ok(())
}
