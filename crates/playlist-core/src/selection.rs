//! Per-source page selection for the next merge
//!
//! Page indices are zero-based throughout. Note the parity presets:
//! [`PageSelection::select_odd_pages`] picks indices 0, 2, 4, which a viewer
//! displays as pages 1, 3, 5, and [`PageSelection::select_even_pages`] picks
//! indices 1, 3, 5 (displayed 2, 4, 6). The preset names describe displayed
//! page numbers while the indices are zero-based.

use crate::merge::MergeSource;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SourceSelection {
    page_count: usize,
    selected: BTreeSet<usize>,
}

impl SourceSelection {
    fn all(page_count: usize) -> Self {
        Self {
            page_count,
            selected: (0..page_count).collect(),
        }
    }

    fn is_complete(&self) -> bool {
        self.selected.len() == self.page_count
    }
}

/// Selected pages of one source, ready for the merge engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedPages {
    pub source: usize,
    /// Ascending zero-based page indices, never empty.
    pub pages: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSelection {
    sources: Vec<SourceSelection>,
}

impl PageSelection {
    /// Start with every page of every source selected.
    pub fn initialize(page_counts: &[usize]) -> Self {
        Self {
            sources: page_counts.iter().map(|&n| SourceSelection::all(n)).collect(),
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Flip one page. Out-of-range indices are ignored.
    pub fn toggle(&mut self, source: usize, page: usize) {
        let Some(entry) = self.sources.get_mut(source) else {
            return;
        };
        if page >= entry.page_count {
            return;
        }
        if !entry.selected.remove(&page) {
            entry.selected.insert(page);
        }
    }

    pub fn is_selected(&self, source: usize, page: usize) -> bool {
        self.sources
            .get(source)
            .is_some_and(|entry| entry.selected.contains(&page))
    }

    pub fn selected_count(&self, source: usize) -> usize {
        self.sources.get(source).map_or(0, |entry| entry.selected.len())
    }

    pub fn total_selected(&self) -> usize {
        self.sources.iter().map(|entry| entry.selected.len()).sum()
    }

    pub fn select_all(&mut self, source: usize) {
        self.select_where(source, |_| true);
    }

    pub fn select_none(&mut self, source: usize) {
        self.select_where(source, |_| false);
    }

    pub fn select_first(&mut self, source: usize) {
        self.select_where(source, |page| page == 0);
    }

    /// Zero-based even indices 0, 2, 4 (displayed pages 1, 3, 5).
    pub fn select_odd_pages(&mut self, source: usize) {
        self.select_where(source, |page| page % 2 == 0);
    }

    /// Zero-based odd indices 1, 3, 5 (displayed pages 2, 4, 6).
    pub fn select_even_pages(&mut self, source: usize) {
        self.select_where(source, |page| page % 2 == 1);
    }

    /// Sources with at least one selected page, in source order.
    pub fn to_selection_list(&self) -> Vec<SelectedPages> {
        self.sources
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.selected.is_empty())
            .map(|(source, entry)| SelectedPages {
                source,
                pages: entry.selected.iter().copied().collect(),
            })
            .collect()
    }

    /// Pair selections with source bytes. Sources with nothing selected are
    /// left out; fully selected sources carry no page filter.
    pub fn to_merge_sources(&self, bytes: &[Arc<[u8]>]) -> Vec<MergeSource> {
        self.to_selection_list()
            .into_iter()
            .filter_map(|selected| {
                let data = bytes.get(selected.source)?.clone();
                let complete = self.sources[selected.source].is_complete();
                Some(if complete {
                    MergeSource::all(data)
                } else {
                    MergeSource::with_pages(data, selected.pages)
                })
            })
            .collect()
    }

    fn select_where(&mut self, source: usize, keep: impl Fn(usize) -> bool) {
        if let Some(entry) = self.sources.get_mut(source) {
            entry.selected = (0..entry.page_count).filter(|&page| keep(page)).collect();
        }
    }
}
