//! InfiniPaper science: identifiers, bibliographic sources, metadata
//! resolution and duplicate merging.

pub mod error;
pub mod http;
pub mod identifiers;
pub mod record;
pub mod sources;
pub mod arxiv;
pub mod grobid;
pub mod text;
pub mod enrichment;
pub mod dedup;

pub use error::{Result, ScienceError};
pub use record::{AuthorRecord, ResolvedMetadata, SourceKind, SourceRecord};
pub use enrichment::{
    EnrichmentReport, MetadataResolver, ResolveInput, Resolution, merge_records,
};
pub use dedup::{
    DuplicateGroup, DuplicateMerger, GreedyTitleGrouping, GroupingStrategy, MergeReport,
    preview_groups, token_set_ratio,
};
