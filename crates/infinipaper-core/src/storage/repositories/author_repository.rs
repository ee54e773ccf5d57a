use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{CoreError, Result};
use crate::models::{Author, AuthorId, AuthorshipLink, NewAuthor, PaperId};

use super::Repository;

pub trait AuthorRepository: Repository<Entity = Author, Id = AuthorId> {
    fn find_by_name(&self, name: &str) -> Result<Option<Author>>;
    /// Look an author up by exact name, creating it if absent. An existing
    /// author gains the incoming affiliation or ORCID only where it has none.
    fn find_or_create(&self, author: &NewAuthor) -> Result<Author>;
    fn links_for_paper(&self, paper_id: PaperId) -> Result<Vec<AuthorshipLink>>;
    fn authors_of(&self, paper_id: PaperId) -> Result<Vec<Author>>;
    fn replace_links(&self, paper_id: PaperId, author_ids: &[AuthorId]) -> Result<()>;
    /// Point every authorship link of `from` at `to`. Links that `to` already
    /// has for the same author are dropped. Returns the number of links moved.
    fn relink(&self, from: PaperId, to: PaperId) -> Result<usize>;
}

pub struct SqliteAuthorRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteAuthorRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn row_to_author(row: &rusqlite::Row) -> rusqlite::Result<Author> {
        Ok(Author {
            id: row.get(0)?,
            name: row.get(1)?,
            affiliation: row.get(2)?,
            orcid: row.get(3)?,
        })
    }
}

impl Repository for SqliteAuthorRepository<'_> {
    type Entity = Author;
    type Id = AuthorId;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>> {
        let author = self
            .conn
            .query_row(
                "SELECT id, name, affiliation, orcid FROM authors WHERE id = ?1",
                params![id],
                Self::row_to_author,
            )
            .optional()?;
        Ok(author)
    }

    fn save(&self, author: &Self::Entity) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE authors SET name = ?2, affiliation = ?3, orcid = ?4 WHERE id = ?1",
            params![author.id, author.name, author.affiliation, author.orcid],
        )?;
        if changed == 0 {
            return Err(CoreError::AuthorNotFound(author.id));
        }
        Ok(())
    }

    fn delete(&self, id: &Self::Id) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM authors WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

impl AuthorRepository for SqliteAuthorRepository<'_> {
    fn find_by_name(&self, name: &str) -> Result<Option<Author>> {
        let author = self
            .conn
            .query_row(
                "SELECT id, name, affiliation, orcid FROM authors WHERE name = ?1 ORDER BY id LIMIT 1",
                params![name.trim()],
                Self::row_to_author,
            )
            .optional()?;
        Ok(author)
    }

    fn find_or_create(&self, incoming: &NewAuthor) -> Result<Author> {
        let name = incoming.name.trim();
        if name.is_empty() {
            return Err(CoreError::ValidationError(
                "author name must not be empty".to_string(),
            ));
        }
        let affiliation = incoming
            .affiliation
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let orcid = incoming
            .orcid
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        if let Some(mut existing) = self.find_by_name(name)? {
            let mut changed = false;
            if existing.affiliation.is_none() && affiliation.is_some() {
                existing.affiliation = affiliation.map(ToOwned::to_owned);
                changed = true;
            }
            if existing.orcid.is_none() && orcid.is_some() {
                existing.orcid = orcid.map(ToOwned::to_owned);
                changed = true;
            }
            if changed {
                self.save(&existing)?;
            }
            return Ok(existing);
        }

        self.conn.execute(
            "INSERT INTO authors(name, affiliation, orcid) VALUES (?1, ?2, ?3)",
            params![name, affiliation, orcid],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(Author {
            id,
            name: name.to_string(),
            affiliation: affiliation.map(ToOwned::to_owned),
            orcid: orcid.map(ToOwned::to_owned),
        })
    }

    fn links_for_paper(&self, paper_id: PaperId) -> Result<Vec<AuthorshipLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT paper_id, author_id, position FROM paper_authors
             WHERE paper_id = ?1 ORDER BY position IS NULL, position, author_id",
        )?;
        let rows = stmt.query_map(params![paper_id], |row| {
            Ok(AuthorshipLink {
                paper_id: row.get(0)?,
                author_id: row.get(1)?,
                position: row.get(2)?,
            })
        })?;
        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }

    fn authors_of(&self, paper_id: PaperId) -> Result<Vec<Author>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.id, a.name, a.affiliation, a.orcid
             FROM paper_authors pa JOIN authors a ON a.id = pa.author_id
             WHERE pa.paper_id = ?1
             ORDER BY pa.position IS NULL, pa.position, a.id",
        )?;
        let rows = stmt.query_map(params![paper_id], Self::row_to_author)?;
        let mut authors = Vec::new();
        for row in rows {
            authors.push(row?);
        }
        Ok(authors)
    }

    fn replace_links(&self, paper_id: PaperId, author_ids: &[AuthorId]) -> Result<()> {
        self.conn.execute(
            "DELETE FROM paper_authors WHERE paper_id = ?1",
            params![paper_id],
        )?;
        let mut stmt = self.conn.prepare(
            "INSERT OR IGNORE INTO paper_authors(paper_id, author_id, position) VALUES (?1, ?2, ?3)",
        )?;
        for (position, author_id) in author_ids.iter().enumerate() {
            let position = i32::try_from(position).unwrap_or(i32::MAX);
            stmt.execute(params![paper_id, author_id, position])?;
        }
        Ok(())
    }

    fn relink(&self, from: PaperId, to: PaperId) -> Result<usize> {
        if from == to {
            return Ok(0);
        }
        let moved = self.conn.execute(
            "INSERT OR IGNORE INTO paper_authors(paper_id, author_id, position)
             SELECT ?2, author_id, position FROM paper_authors WHERE paper_id = ?1",
            params![from, to],
        )?;
        self.conn.execute(
            "DELETE FROM paper_authors WHERE paper_id = ?1",
            params![from],
        )?;
        Ok(moved)
    }
}
