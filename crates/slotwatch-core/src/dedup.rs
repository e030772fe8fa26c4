//! In-memory record of identities already notified.
//!
//! Grows monotonically for the life of the process; nothing expires.

use std::collections::HashSet;

use crate::domain::{AvailabilityItem, IdentityKey};

#[derive(Debug, Default, Clone)]
pub struct DeduplicationStore {
    seen: HashSet<IdentityKey>,
}

impl DeduplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items whose identity has not been recorded yet, in input order.
    pub fn filter_new(&self, items: &[AvailabilityItem]) -> Vec<AvailabilityItem> {
        items
            .iter()
            .filter(|item| !self.seen.contains(&item.identity_key()))
            .cloned()
            .collect()
    }

    /// Record the identities of `items`. Returns how many were newly inserted.
    pub fn record(&mut self, items: &[AvailabilityItem]) -> usize {
        items
            .iter()
            .filter(|item| self.seen.insert(item.identity_key()))
            .count()
    }

    pub fn contains(&self, item: &AvailabilityItem) -> bool {
        self.seen.contains(&item.identity_key())
    }

    /// Number of distinct identities recorded.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
