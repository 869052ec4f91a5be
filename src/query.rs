//! Client-side search, filter and pagination over a dataset snapshot

use crate::dataset::DatasetSnapshot;
use crate::debounce::Debouncer;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Yields the searchable strings of one record.
pub type FieldExtractor<T> = Box<dyn Fn(&T) -> Vec<String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Pagination {
    Paged { page_size: usize },
    /// Every match on a single page
    Unpaged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryState {
    pub raw_term: String,
    pub debounced_term: String,
    pub page: usize,
    /// `None` when pagination is off
    pub page_size: Option<usize>,
    pub total_filtered_count: usize,
    pub total_pages: usize,
}

/// Case-insensitive substring match of `term` against any field. A blank
/// term matches everything.
pub fn matches_term(fields: &[String], term: &str) -> bool {
    let needle = term.trim().to_lowercase();
    needle.is_empty() || fields.iter().any(|f| f.to_lowercase().contains(&needle))
}

/// Indices of the records matching `term`, in snapshot order.
pub fn filter_indices<T>(
    records: &[T],
    extractor: &dyn Fn(&T) -> Vec<String>,
    term: &str,
) -> Vec<usize> {
    if term.trim().is_empty() {
        return (0..records.len()).collect();
    }

    records
        .iter()
        .enumerate()
        .filter(|(_, record)| matches_term(&extractor(record), term))
        .map(|(index, _)| index)
        .collect()
}

pub fn page_count(total: usize, pagination: Pagination) -> usize {
    match pagination {
        Pagination::Paged { page_size } => total.div_ceil(page_size.max(1)),
        Pagination::Unpaged if total == 0 => 0,
        Pagination::Unpaged => 1,
    }
}

/// Filters and pages one snapshot without touching the network.
///
/// Raw keystrokes go through a debouncer; only the term that survives the
/// quiet period is applied. Given the same snapshot, applied term, page and
/// pagination, `visible_page` always returns the same records.
pub struct QueryEngine<T> {
    snapshot: Option<DatasetSnapshot<T>>,
    extractor: FieldExtractor<T>,
    pagination: Pagination,
    debouncer: Debouncer<String>,
    raw_term: String,
    debounced_term: String,
    page: usize,
    filtered: Vec<usize>,
    recomputes: u64,
}

impl<T> QueryEngine<T> {
    pub fn new(extractor: FieldExtractor<T>, pagination: Pagination, quiet: Duration) -> Self {
        let pagination = match pagination {
            Pagination::Paged { page_size } => Pagination::Paged {
                page_size: page_size.max(1),
            },
            Pagination::Unpaged => Pagination::Unpaged,
        };

        Self {
            snapshot: None,
            extractor,
            pagination,
            debouncer: Debouncer::new(quiet),
            raw_term: String::new(),
            debounced_term: String::new(),
            page: 0,
            filtered: Vec::new(),
            recomputes: 0,
        }
    }

    /// Replace the snapshot wholesale. The applied term is kept and the
    /// page is clamped to the new result.
    pub fn load_snapshot(&mut self, snapshot: DatasetSnapshot<T>) {
        self.snapshot = Some(snapshot);
        self.recompute();
        self.page = self.clamp_page(self.page);
    }

    /// Drop the snapshot; every query then yields an empty result.
    pub fn clear_snapshot(&mut self) {
        self.snapshot = None;
        self.filtered.clear();
        self.page = 0;
    }

    pub fn snapshot(&self) -> Option<&DatasetSnapshot<T>> {
        self.snapshot.as_ref()
    }

    /// Record a keystroke and restart the quiet period.
    pub fn set_raw_term(&mut self, term: impl Into<String>, now: Instant) {
        let term = term.into();
        self.raw_term = term.clone();
        self.debouncer.arm(term, now);
    }

    /// Apply the pending term if its quiet period has elapsed at `now`.
    /// Returns whether the filtered set was recomputed.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.debouncer.poll(now) {
            Some(term) => self.apply_term(term),
            None => false,
        }
    }

    /// Apply the pending term immediately.
    pub fn flush_term(&mut self) -> bool {
        match self.debouncer.flush() {
            Some(term) => self.apply_term(term),
            None => false,
        }
    }

    /// When the pending term, if any, becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    fn apply_term(&mut self, term: String) -> bool {
        if term == self.debounced_term {
            return false;
        }

        debug!("Applying search term {:?}", term);
        self.debounced_term = term;
        self.page = 0;
        self.recompute();
        true
    }

    fn recompute(&mut self) {
        self.filtered = match &self.snapshot {
            Some(snapshot) => {
                filter_indices(snapshot.records(), &*self.extractor, &self.debounced_term)
            }
            None => Vec::new(),
        };
        self.recomputes += 1;
    }

    /// How many times the filtered set has been rebuilt.
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }

    fn clamp_page(&self, page: usize) -> usize {
        page.min(self.total_pages().saturating_sub(1))
    }

    pub fn set_page(&mut self, page: usize) -> usize {
        self.page = self.clamp_page(page);
        self.page
    }

    pub fn next_page(&mut self) -> usize {
        self.set_page(self.page.saturating_add(1))
    }

    pub fn previous_page(&mut self) -> usize {
        self.set_page(self.page.saturating_sub(1))
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    pub fn total_filtered_count(&self) -> usize {
        self.filtered.len()
    }

    pub fn total_pages(&self) -> usize {
        page_count(self.filtered.len(), self.pagination)
    }

    /// The records on the current page, in snapshot order.
    pub fn visible_page(&self) -> Vec<&T> {
        let Some(snapshot) = &self.snapshot else {
            return Vec::new();
        };

        let indices: &[usize] = match self.pagination {
            Pagination::Unpaged => &self.filtered,
            Pagination::Paged { page_size } => {
                let start = (self.page * page_size).min(self.filtered.len());
                let end = (start + page_size).min(self.filtered.len());
                &self.filtered[start..end]
            }
        };

        indices.iter().map(|&i| &snapshot.records()[i]).collect()
    }

    pub fn state(&self) -> QueryState {
        QueryState {
            raw_term: self.raw_term.clone(),
            debounced_term: self.debounced_term.clone(),
            page: self.page,
            page_size: match self.pagination {
                Pagination::Paged { page_size } => Some(page_size),
                Pagination::Unpaged => None,
            },
            total_filtered_count: self.filtered.len(),
            total_pages: self.total_pages(),
        }
    }
}

impl<T> std::fmt::Debug for QueryEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("records", &self.snapshot.as_ref().map(DatasetSnapshot::len))
            .field("pagination", &self.pagination)
            .field("raw_term", &self.raw_term)
            .field("debounced_term", &self.debounced_term)
            .field("page", &self.page)
            .field("filtered", &self.filtered.len())
            .finish()
    }
}
