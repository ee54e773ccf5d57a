mod author_repository;
mod paper_repository;

pub use author_repository::{AuthorRepository, SqliteAuthorRepository};
pub use paper_repository::{PaperRepository, SqlitePaperRepository};

use crate::error::Result;

pub trait Repository {
    type Entity;
    type Id;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>>;
    fn save(&self, entity: &Self::Entity) -> Result<()>;
    fn delete(&self, id: &Self::Id) -> Result<bool>;
}
