pub mod merge;
pub mod resolver;

pub use merge::merge_records;
pub use resolver::{EnrichmentReport, MetadataResolver, ResolveInput, Resolution};
