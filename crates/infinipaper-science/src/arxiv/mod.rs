pub mod client;
pub mod parser;
pub mod types;

pub use client::{ArxivClient, DEFAULT_BASE_URL};
pub use types::{ArxivAuthor, ArxivEntry};
