use infinipaper_core::{
    AuthorRepository, Database, Paper, PaperId, Repository, SqliteAuthorRepository,
    SqlitePaperRepository,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::dedup::grouping::DuplicateGroup;
use crate::error::{Result, ScienceError};

/// Outcome of merging one duplicate group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub keep: PaperId,
    /// Papers folded into `keep` and deleted.
    pub merged: Vec<PaperId>,
    /// Members that no longer existed when the merge reached them.
    pub skipped: Vec<PaperId>,
    /// Fields of `keep` that were filled from merged papers.
    pub fields_filled: Vec<&'static str>,
}

type Absorbed = (Paper, Vec<&'static str>);

/// Folds duplicate papers into one survivor.
pub struct DuplicateMerger<'a> {
    db: &'a Database,
}

impl<'a> DuplicateMerger<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Merge every member of `group` other than `keep` into `keep`.
    ///
    /// Each member is handled in its own transaction: its authorship links
    /// move to `keep`, the member row is deleted, then `keep` takes the
    /// member's `doi`, `abstract`, `venue` and `year` where its own are empty.
    /// Deleting first keeps the DOI unique index satisfied.
    pub fn merge(&self, group: &[PaperId], keep: PaperId) -> Result<MergeReport> {
        if !group.contains(&keep) {
            return Err(ScienceError::AmbiguousMerge(format!(
                "paper {keep} is not a member of the group"
            )));
        }
        let mut kept = self
            .db
            .find_paper(keep)?
            .ok_or_else(|| ScienceError::AmbiguousMerge(format!("paper {keep} does not exist")))?;

        let mut report = MergeReport {
            keep,
            merged: Vec::new(),
            skipped: Vec::new(),
            fields_filled: Vec::new(),
        };

        for &member in group {
            if member == keep || report.merged.contains(&member) || report.skipped.contains(&member)
            {
                continue;
            }

            match self.absorb(&kept, member)? {
                Some((updated, filled)) => {
                    kept = updated;
                    for field in filled {
                        if !report.fields_filled.contains(&field) {
                            report.fields_filled.push(field);
                        }
                    }
                    report.merged.push(member);
                }
                None => {
                    warn!(keep, member, "duplicate no longer exists, skipping");
                    report.skipped.push(member);
                }
            }
        }

        info!(
            keep,
            merged = ?report.merged,
            skipped = ?report.skipped,
            filled = ?report.fields_filled,
            "duplicate group merged"
        );
        Ok(report)
    }

    /// Merge a group whose `keep` has been chosen.
    pub fn merge_group(&self, group: &DuplicateGroup) -> Result<MergeReport> {
        let keep = group.keep.ok_or_else(|| {
            ScienceError::AmbiguousMerge("no paper chosen to keep".to_string())
        })?;
        self.merge(&group.members, keep)
    }

    /// Fold `member` into a copy of `kept` in one transaction. `None` when
    /// the member does not exist.
    fn absorb(&self, kept: &Paper, member: PaperId) -> Result<Option<Absorbed>> {
        self.db.transaction(|conn| -> Result<Option<Absorbed>> {
            let papers = SqlitePaperRepository::new(conn);
            let Some(victim) = papers.find_by_id(&member)? else {
                return Ok(None);
            };

            SqliteAuthorRepository::new(conn).relink(member, kept.id)?;
            papers.delete(&member)?;

            let mut updated = kept.clone();
            let filled = updated.absorb_missing(&victim);
            if !filled.is_empty() {
                papers.save(&updated)?;
            }
            Ok(Some((updated, filled)))
        })
    }
}
