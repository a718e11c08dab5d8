use super::Candidate;
use crate::graph::ReferenceSet;

/// Declared-minus-referenced per category
pub struct Differ;

impl Differ {
    /// Raw candidates for one category, sorted by address
    pub fn diff(set: &ReferenceSet) -> Vec<Candidate> {
        let mut unused: Vec<u64> = set.declared.difference(&set.referenced).copied().collect();
        unused.sort_unstable();

        unused
            .into_iter()
            .filter_map(|address| set.symbol(address))
            .cloned()
            .map(Candidate::new)
            .collect()
    }
}
