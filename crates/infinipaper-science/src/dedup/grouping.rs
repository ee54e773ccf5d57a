use std::collections::HashSet;

use infinipaper_core::{DedupConfig, Paper, PaperId};
use serde::Serialize;
use tracing::debug;

use crate::dedup::similarity::token_set_ratio;

pub const DEFAULT_THRESHOLD: f64 = 90.0;
pub const DEFAULT_YEAR_PENALTY: f64 = 10.0;

/// A set of papers believed to describe the same work. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub members: Vec<PaperId>,
    /// The paper that survives a merge. Must be one of `members`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep: Option<PaperId>,
}

impl DuplicateGroup {
    pub fn new(members: Vec<PaperId>) -> Self {
        Self { members, keep: None }
    }

    pub fn with_keep(mut self, keep: PaperId) -> Self {
        self.keep = Some(keep);
        self
    }

    pub fn contains(&self, id: PaperId) -> bool {
        self.members.contains(&id)
    }
}

/// Partitions a paper list into candidate duplicate groups.
pub trait GroupingStrategy {
    /// Groups of two or more paper ids, in discovery order.
    fn group(&self, papers: &[Paper]) -> Vec<Vec<PaperId>>;
}

/// Single pass over DOI-less papers in input order. Each unvisited paper
/// seeds a group and pulls in every later unvisited paper whose title is
/// similar enough to the seed's. Grouping is not transitive.
#[derive(Debug, Clone, Copy)]
pub struct GreedyTitleGrouping {
    pub threshold: f64,
    pub year_penalty: f64,
}

impl Default for GreedyTitleGrouping {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            year_penalty: DEFAULT_YEAR_PENALTY,
        }
    }
}

impl GreedyTitleGrouping {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    pub fn from_config(config: &DedupConfig) -> Self {
        Self {
            threshold: config.threshold,
            year_penalty: config.year_penalty,
        }
    }

    /// Title similarity of two papers, lowered by the year penalty when both
    /// years are known and differ.
    pub fn score(&self, a: &Paper, b: &Paper) -> f64 {
        let similarity = token_set_ratio(&a.title.to_lowercase(), &b.title.to_lowercase());
        match (a.year, b.year) {
            (Some(ya), Some(yb)) if ya != yb => similarity - self.year_penalty,
            _ => similarity,
        }
    }
}

impl GroupingStrategy for GreedyTitleGrouping {
    fn group(&self, papers: &[Paper]) -> Vec<Vec<PaperId>> {
        let candidates: Vec<&Paper> = papers.iter().filter(|p| !p.has_doi()).collect();
        let mut visited: HashSet<PaperId> = HashSet::new();
        let mut groups = Vec::new();

        for (i, seed) in candidates.iter().enumerate() {
            if !visited.insert(seed.id) {
                continue;
            }
            let mut group = vec![seed.id];
            for other in &candidates[i + 1..] {
                if visited.contains(&other.id) {
                    continue;
                }
                let score = self.score(seed, other);
                if score >= self.threshold {
                    debug!(seed = seed.id, other = other.id, score, "titles match");
                    visited.insert(other.id);
                    group.push(other.id);
                }
            }
            if group.len() > 1 {
                groups.push(group);
            }
        }
        groups
    }
}

/// Candidate duplicate groups among `papers` using the greedy title pass.
pub fn preview_groups(papers: &[Paper], threshold: f64) -> Vec<Vec<PaperId>> {
    GreedyTitleGrouping::new(threshold).group(papers)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn paper(id: PaperId, title: &str, year: Option<i32>, doi: Option<&str>) -> Paper {
        let now = Utc::now();
        Paper {
            id,
            title: title.to_string(),
            abstract_text: None,
            year,
            doi: doi.map(ToOwned::to_owned),
            venue: None,
            url: None,
            pdf_url: None,
            file_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn case_differences_group_together() {
        let papers = vec![
            paper(1, "Attention Is All You Need", Some(2017), None),
            paper(2, "Unrelated Work On Compilers", Some(2017), None),
            paper(3, "attention is all you need", None, None),
        ];
        assert_eq!(preview_groups(&papers, 90.0), vec![vec![1, 3]]);
    }

    #[test]
    fn differing_years_apply_penalty() {
        let papers = vec![
            paper(1, "Attention Is All You Need", Some(2017), None),
            paper(2, "Attention Is All You Need", Some(2018), None),
        ];
        assert_eq!(preview_groups(&papers, 90.0), vec![vec![1, 2]]);
        assert!(preview_groups(&papers, 95.0).is_empty());
    }

    #[test]
    fn papers_with_doi_are_excluded() {
        let papers = vec![
            paper(1, "Same Title Here", None, Some("10.1000/a")),
            paper(2, "Same Title Here", None, None),
            paper(3, "Same Title Here", None, Some("  ")),
        ];
        assert_eq!(preview_groups(&papers, 90.0), vec![vec![2, 3]]);
    }

    #[test]
    fn grouping_is_greedy_not_transitive() {
        let papers = vec![
            paper(1, "deep learning for graphs", None, None),
            paper(2, "deep learning for graphs survey", None, None),
            paper(3, "graphs survey", None, None),
        ];
        // 3 matches 2 but not the seed 1, and 2 is already taken.
        assert_eq!(preview_groups(&papers, 90.0), vec![vec![1, 2]]);
    }

    #[test]
    fn preview_is_stable_for_fixed_input() {
        let papers = vec![
            paper(1, "Attention Is All You Need", Some(2017), None),
            paper(2, "BERT: Pre-training of Deep Bidirectional Transformers", None, None),
            paper(3, "attention is all you need", Some(2017), None),
            paper(4, "BERT Pre-training of Deep Bidirectional Transformers", None, None),
        ];
        let first = preview_groups(&papers, 90.0);
        assert_eq!(first, preview_groups(&papers, 90.0));
        assert_eq!(first, vec![vec![1, 3], vec![2, 4]]);
    }

    #[test]
    fn empty_titles_never_match() {
        let papers = vec![paper(1, "", None, None), paper(2, "", None, None)];
        assert!(preview_groups(&papers, 0.5).is_empty());
    }

    #[test]
    fn config_sets_threshold_and_penalty() {
        let grouping = GreedyTitleGrouping::from_config(&DedupConfig {
            threshold: 80.0,
            year_penalty: 25.0,
        });
        let a = paper(1, "Same Title", Some(2001), None);
        let b = paper(2, "Same Title", Some(2002), None);
        assert_eq!(grouping.score(&a, &b), 75.0);
        assert!(grouping.group(&[a, b]).is_empty());
    }

    #[test]
    fn duplicate_group_keep() {
        let group = DuplicateGroup::new(vec![4, 7]).with_keep(7);
        assert!(group.contains(4));
        assert_eq!(group.keep, Some(7));
    }
}
