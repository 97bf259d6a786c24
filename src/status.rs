//! Loading-state tracking for background ingestion and rebuilds.
//!
//! A single mutex guards the whole record, so readers always get one
//! consistent snapshot instead of field-by-field reads racing a writer.
//! Status reporting never touches the index or reindex locks.

use serde::Serialize;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    total: usize,
    loaded: usize,
    complete: bool,
    errors: Vec<String>,
}

/// Shared progress record for the ingestion pipeline, the reindex
/// coordinator, and the refresh scheduler.
#[derive(Debug, Default)]
pub struct LoadingState {
    inner: Mutex<Inner>,
}

/// One consistent snapshot of the loading state.
#[derive(Debug, Clone, Serialize)]
pub struct LoadingStatus {
    pub total: usize,
    pub loaded: usize,
    pub complete: bool,
    pub errors: Vec<String>,
}

impl LoadingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a rebuild as in progress: clears counters and the complete flag
    /// so concurrent status queries reflect the rebuild immediately.
    pub fn begin_rebuild(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.complete = false;
        inner.loaded = 0;
        inner.total = 0;
    }

    /// Update cumulative progress. `total` is a best-effort running estimate
    /// and is only ever revised upward mid-load.
    pub fn update_progress(&self, loaded: usize, total: Option<usize>) {
        let mut inner = self.inner.lock().unwrap();
        inner.loaded = loaded;
        if let Some(total) = total {
            if total > inner.total {
                inner.total = total;
            }
        }
    }

    pub fn record_error(&self, error: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        inner.errors.push(error.into());
    }

    /// Terminal state for a successful rebuild: counters settle at `count`.
    pub fn finish(&self, count: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.total = count;
        inner.loaded = count;
        inner.complete = true;
    }

    /// Force the complete flag without touching counters. Used on failure
    /// paths so the system never reports "still loading" forever.
    pub fn mark_complete(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.complete = true;
    }

    pub fn is_complete(&self) -> bool {
        self.inner.lock().unwrap().complete
    }

    pub fn status(&self) -> LoadingStatus {
        let inner = self.inner.lock().unwrap();
        LoadingStatus {
            total: inner.total,
            loaded: inner.loaded,
            complete: inner.complete,
            errors: inner.errors.clone(),
        }
    }

    /// Human-readable note for query responses while loading is underway.
    /// `None` once loading is complete.
    pub fn progress_note(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        if inner.complete {
            return None;
        }
        if inner.loaded == 0 {
            return Some("skills are being loaded in the background, please retry shortly".into());
        }
        if inner.total > 0 {
            return Some(format!(
                "{}/{} skills loaded, indexing in progress",
                inner.loaded, inner.total
            ));
        }
        Some(format!(
            "{} skills loaded so far, indexing in progress",
            inner.loaded
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_rebuild_clears_progress() {
        let state = LoadingState::new();
        state.finish(5);
        assert!(state.is_complete());

        state.begin_rebuild();
        let status = state.status();
        assert!(!status.complete);
        assert_eq!(status.loaded, 0);
        assert_eq!(status.total, 0);
    }

    #[test]
    fn total_is_never_revised_downward() {
        let state = LoadingState::new();
        state.update_progress(2, Some(10));
        state.update_progress(4, Some(7));
        let status = state.status();
        assert_eq!(status.loaded, 4);
        assert_eq!(status.total, 10);
    }

    #[test]
    fn errors_accumulate_in_order() {
        let state = LoadingState::new();
        state.record_error("first");
        state.record_error("second");
        assert_eq!(state.status().errors, vec!["first", "second"]);
    }

    #[test]
    fn progress_note_tracks_phases() {
        let state = LoadingState::new();
        assert!(state.progress_note().unwrap().contains("background"));

        state.update_progress(3, Some(9));
        assert!(state.progress_note().unwrap().contains("3/9"));

        state.finish(9);
        assert!(state.progress_note().is_none());
    }
}
