use rusqlite::Connection;

use super::Migration;
use crate::error::Result;
use crate::storage::database::schema;

pub struct V2DoiUnique;

impl Migration for V2DoiUnique {
    fn version(&self) -> u32 {
        2
    }

    fn description(&self) -> &'static str {
        "Case-insensitive unique index on papers.doi"
    }

    fn up(&self, conn: &Connection) -> Result<()> {
        schema::create_doi_unique_index(conn)
    }
}
