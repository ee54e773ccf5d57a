use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use crate::error::{CoreError, Result};
use crate::models::{NewPaper, Paper, PaperId};

use super::Repository;

const PAPER_COLUMNS: &str =
    "id, title, abstract, year, doi, venue, url, pdf_url, file_ref, created_at, updated_at";

pub trait PaperRepository: Repository<Entity = Paper, Id = PaperId> {
    fn insert(&self, paper: &NewPaper) -> Result<Paper>;
    fn find_by_doi(&self, doi: &str) -> Result<Option<Paper>>;
    fn list(&self) -> Result<Vec<Paper>>;
    fn count(&self) -> Result<usize>;
}

pub struct SqlitePaperRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqlitePaperRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn row_to_paper(row: &rusqlite::Row) -> rusqlite::Result<Paper> {
        Ok(Paper {
            id: row.get(0)?,
            title: row.get(1)?,
            abstract_text: row.get(2)?,
            year: row.get(3)?,
            doi: row.get(4)?,
            venue: row.get(5)?,
            url: row.get(6)?,
            pdf_url: row.get(7)?,
            file_ref: row.get(8)?,
            created_at: parse_timestamp(row, 9)?,
            updated_at: parse_timestamp(row, 10)?,
        })
    }
}

impl Repository for SqlitePaperRepository<'_> {
    type Entity = Paper;
    type Id = PaperId;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>> {
        let paper = self
            .conn
            .query_row(
                &format!("SELECT {PAPER_COLUMNS} FROM papers WHERE id = ?1"),
                params![id],
                Self::row_to_paper,
            )
            .optional()?;
        Ok(paper)
    }

    fn save(&self, paper: &Self::Entity) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE papers
                 SET title = ?2, abstract = ?3, year = ?4, doi = ?5, venue = ?6,
                     url = ?7, pdf_url = ?8, file_ref = ?9, updated_at = ?10
                 WHERE id = ?1",
                params![
                    paper.id,
                    paper.title,
                    paper.abstract_text,
                    paper.year,
                    paper.doi,
                    paper.venue,
                    paper.url,
                    paper.pdf_url,
                    paper.file_ref,
                    paper.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| map_doi_conflict(e, paper.doi.as_deref()))?;
        if changed == 0 {
            return Err(CoreError::PaperNotFound(paper.id));
        }
        Ok(())
    }

    fn delete(&self, id: &Self::Id) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM papers WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

impl PaperRepository for SqlitePaperRepository<'_> {
    fn insert(&self, paper: &NewPaper) -> Result<Paper> {
        let title = paper.title.trim();
        if title.is_empty() {
            return Err(CoreError::ValidationError(
                "paper title must not be empty".to_string(),
            ));
        }

        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO papers
                    (title, abstract, year, doi, venue, url, pdf_url, file_ref, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    title,
                    non_blank(paper.abstract_text.as_deref()),
                    paper.year.filter(|y| *y != 0),
                    non_blank(paper.doi.as_deref()),
                    non_blank(paper.venue.as_deref()),
                    non_blank(paper.url.as_deref()),
                    non_blank(paper.pdf_url.as_deref()),
                    non_blank(paper.file_ref.as_deref()),
                    now,
                ],
            )
            .map_err(|e| map_doi_conflict(e, paper.doi.as_deref()))?;

        let id = self.conn.last_insert_rowid();
        self.find_by_id(&id)?.ok_or(CoreError::PaperNotFound(id))
    }

    fn find_by_doi(&self, doi: &str) -> Result<Option<Paper>> {
        let doi = doi.trim();
        if doi.is_empty() {
            return Ok(None);
        }
        let paper = self
            .conn
            .query_row(
                &format!("SELECT {PAPER_COLUMNS} FROM papers WHERE lower(doi) = lower(?1)"),
                params![doi],
                Self::row_to_paper,
            )
            .optional()?;
        Ok(paper)
    }

    fn list(&self) -> Result<Vec<Paper>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {PAPER_COLUMNS} FROM papers ORDER BY id"))?;
        let rows = stmt.query_map([], Self::row_to_paper)?;
        let mut papers = Vec::new();
        for row in rows {
            papers.push(row?);
        }
        Ok(papers)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM papers", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn parse_timestamp(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn map_doi_conflict(err: rusqlite::Error, doi: Option<&str>) -> CoreError {
    match (&err, doi) {
        (rusqlite::Error::SqliteFailure(e, _), Some(doi))
            if e.code == ErrorCode::ConstraintViolation =>
        {
            CoreError::DuplicateDoi(doi.to_string())
        }
        _ => CoreError::Database(err),
    }
}
