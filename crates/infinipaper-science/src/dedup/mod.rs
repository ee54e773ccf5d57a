pub mod grouping;
pub mod merger;
pub mod similarity;

pub use grouping::{
    DEFAULT_THRESHOLD, DEFAULT_YEAR_PENALTY, DuplicateGroup, GreedyTitleGrouping,
    GroupingStrategy, preview_groups,
};
pub use merger::{DuplicateMerger, MergeReport};
pub use similarity::token_set_ratio;
