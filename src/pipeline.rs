//! Background ingestion pipeline.
//!
//! Populates the index at startup without delaying service readiness: the
//! worker runs on its own task, pulls skills from the configured sources in
//! order, and folds them into the index in bounded batches. Queries operate
//! over whatever has been appended so far.
//!
//! A failing source is recorded in the loading state and skipped; partial
//! availability beats total failure. Whatever happens, the loading state is
//! marked complete on exit so status queries never hang.

use std::sync::Arc;

use crate::config::SourceSpec;
use crate::index::SemanticIndex;
use crate::loader::loader_for;
use crate::status::LoadingState;

/// Spawn the startup ingestion worker.
pub fn spawn(
    sources: Vec<SourceSpec>,
    github_token: Option<String>,
    batch_size: usize,
    index: Arc<SemanticIndex>,
    state: Arc<LoadingState>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(sources, github_token, batch_size, index, state).await;
    })
}

async fn run(
    sources: Vec<SourceSpec>,
    github_token: Option<String>,
    batch_size: usize,
    index: Arc<SemanticIndex>,
    state: Arc<LoadingState>,
) {
    tracing::info!(sources = sources.len(), "background skill loading started");

    let mut loaded = 0usize;
    let mut estimated_total = 0usize;

    for spec in &sources {
        let loader = loader_for(spec, github_token.clone());
        let describe = loader.describe();

        let skills = match loader.load_skills().await {
            Ok(skills) => skills,
            Err(e) => {
                tracing::warn!(source = %describe, error = %e, "skill source failed, skipping");
                state.record_error(format!("{}: {}", describe, e));
                continue;
            }
        };

        // Revise the running estimate upward as each source is scanned.
        estimated_total += skills.len();
        state.update_progress(loaded, Some(estimated_total));
        tracing::info!(source = %describe, count = skills.len(), "source scanned");

        let mut batches = skills.into_iter().peekable();
        while batches.peek().is_some() {
            let batch: Vec<_> = batches.by_ref().take(batch_size.max(1)).collect();
            let batch_len = batch.len();
            match index.append(batch).await {
                Ok(_) => {
                    loaded += batch_len;
                    state.update_progress(loaded, None);
                }
                Err(e) => {
                    tracing::warn!(source = %describe, error = %e, "batch indexing failed");
                    state.record_error(format!("{}: {}", describe, e));
                    break;
                }
            }
        }
    }

    state.mark_complete();
    tracing::info!(loaded, "background skill loading complete");
}
