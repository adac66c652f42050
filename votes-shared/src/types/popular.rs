use serde::{Deserialize, Serialize};

/// Thresholds for the popularity query.
///
/// Entities qualify when `upvote_rate >= min_rate` and
/// `up_count >= min_up_count`; results are ordered by `up_count` descending.
/// A `limit` of `None` or `Some(0)` means unbounded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PopularFilter {
    pub min_rate: f64,
    pub min_up_count: i64,
    pub limit: Option<u32>,
}

impl PopularFilter {
    /// Returns the limit with the `Some(0)` sentinel normalized away.
    pub fn effective_limit(&self) -> Option<u32> {
        match self.limit {
            Some(0) | None => None,
            Some(n) => Some(n),
        }
    }
}

impl Default for PopularFilter {
    fn default() -> Self {
        Self {
            min_rate: 0.7,
            min_up_count: 10,
            limit: Some(20),
        }
    }
}
