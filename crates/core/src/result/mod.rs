//! Single logical views over multiple physical result sets.

mod future;
mod object_set;

pub use future::{CompositeResultFuture, LastResultParallelFuture};
pub use object_set::ObjectSet;

use crate::error::ExecutionError;
use crate::transport::{RawResultSet, RawRow};

/// An ordered list of backing result sets presented as one.
///
/// Rows drain from the first set until it is exhausted, then from the next;
/// ordering across sets is the statement input order, and ordering across
/// split keyspaces is whatever each physical statement returned — there is
/// no global merge.
pub struct CompositeResultSet {
    sets: Vec<Box<dyn RawResultSet>>,
    current: usize,
}

impl std::fmt::Debug for CompositeResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeResultSet")
            .field("sets", &self.sets.len())
            .field("current", &self.current)
            .finish()
    }
}

impl CompositeResultSet {
    pub fn new(sets: Vec<Box<dyn RawResultSet>>) -> Self {
        Self { sets, current: 0 }
    }

    /// The next row, fetching pages as needed.
    pub async fn one(&mut self) -> Result<Option<RawRow>, ExecutionError> {
        while self.current < self.sets.len() {
            let set = &mut self.sets[self.current];
            if let Some(row) = set.next_row() {
                return Ok(Some(row));
            }
            if !set.is_fully_fetched() {
                set.fetch_more().await?;
                continue;
            }
            self.current += 1;
        }
        Ok(None)
    }

    /// Rows readable without another fetch: the sum over the current and
    /// onward sets, stopping after the first set that still has pages out.
    pub fn available_without_fetching(&self) -> usize {
        let mut total = 0;
        for set in &self.sets[self.current.min(self.sets.len())..] {
            total += set.available_without_fetching();
            if !set.is_fully_fetched() {
                break;
            }
        }
        total
    }

    /// True only once every backing set has run dry.
    pub fn is_exhausted(&self) -> bool {
        self.sets[self.current.min(self.sets.len())..]
            .iter()
            .all(|set| set.is_fully_fetched() && set.available_without_fetching() == 0)
    }

    /// Conditional outcome of the whole composite: every backing statement
    /// must have applied.
    pub fn was_applied(&self) -> bool {
        self.sets.iter().all(|set| set.was_applied())
    }

    /// Number of backing result sets.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
