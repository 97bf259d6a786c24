//! The service context.
//!
//! One [`SkillService`] is constructed at startup and owns the semantic
//! index, the reindex coordinator, the loading state, the update checker,
//! the uploaded-skill store, and the refresh scheduler. Handlers receive it
//! explicitly; there is no ambient global state.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::index::SemanticIndex;
use crate::models::{QueryHit, Skill};
use crate::pipeline;
use crate::refresh::UpdateChecker;
use crate::reindex::ReindexCoordinator;
use crate::scheduler::RefreshScheduler;
use crate::status::{LoadingState, LoadingStatus};
use crate::storage::SkillStore;

/// Response for a semantic query: ranked hits plus a loading note while
/// background ingestion is still running.
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub hits: Vec<QueryHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loading: Option<String>,
}

pub struct SkillService {
    config: Config,
    index: Arc<SemanticIndex>,
    state: Arc<LoadingState>,
    coordinator: Arc<ReindexCoordinator>,
    checker: Arc<UpdateChecker>,
    store: SkillStore,
    scheduler: tokio::sync::Mutex<Option<RefreshScheduler>>,
    ingestion: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SkillService {
    pub fn new(config: Config) -> Result<Arc<Self>> {
        let embedder = create_embedder(&config.index)?;
        tracing::info!(provider = embedder.name(), dims = embedder.dims(), "embedder ready");

        let index = Arc::new(SemanticIndex::new(embedder));
        let state = Arc::new(LoadingState::new());
        let coordinator = Arc::new(ReindexCoordinator::new(index.clone(), state.clone()));
        let checker = Arc::new(UpdateChecker::new(
            config.refresh.github_token.clone(),
            config.refresh.api_budget_per_hour,
        ));
        let store = SkillStore::new(config.storage.root.clone());

        Ok(Arc::new(Self {
            config,
            index,
            state,
            coordinator,
            checker,
            store,
            scheduler: tokio::sync::Mutex::new(None),
            ingestion: tokio::sync::Mutex::new(None),
        }))
    }

    /// Start the background workers: the startup ingestion pipeline and,
    /// when enabled, the refresh scheduler. Returns immediately; the index
    /// serves queries while loading proceeds.
    pub async fn start(&self) {
        let handle = pipeline::spawn(
            self.config.sources.clone(),
            self.config.refresh.github_token.clone(),
            self.config.index.batch_size,
            self.index.clone(),
            self.state.clone(),
        );
        *self.ingestion.lock().await = Some(handle);

        if self.config.refresh.enabled {
            let scheduler = RefreshScheduler::start(
                Duration::from_secs(self.config.refresh.interval_minutes * 60),
                self.config.sources.clone(),
                self.config.refresh.github_token.clone(),
                self.checker.clone(),
                self.coordinator.clone(),
                self.state.clone(),
            );
            *self.scheduler.lock().await = Some(scheduler);
        } else {
            tracing::info!("auto-refresh disabled in configuration");
        }
    }

    /// Stop the background workers. The scheduler finishes any in-flight
    /// cycle first; startup ingestion, if still running, is abandoned
    /// between batches, so the installed snapshot always stays whole.
    pub async fn stop(&self) {
        if let Some(scheduler) = self.scheduler.lock().await.take() {
            scheduler.stop().await;
        }
        if let Some(handle) = self.ingestion.lock().await.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }

    /// Rank indexed skills against `text`.
    pub async fn query(
        &self,
        text: &str,
        top_k: Option<usize>,
        allowed_names: Option<&[String]>,
    ) -> Result<QueryResponse> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(QueryResponse {
                hits: Vec::new(),
                loading: self.state.progress_note(),
            });
        }

        let top_k = top_k.unwrap_or(self.config.query.default_top_k).max(1);
        let mut hits = self.index.query(trimmed, top_k, allowed_names).await?;

        if let Some(limit) = self.config.query.max_content_chars {
            for hit in &mut hits {
                truncate_chars(&mut hit.skill.content, limit);
            }
        }

        Ok(QueryResponse {
            hits,
            loading: self.state.progress_note(),
        })
    }

    /// Add or update skills by composite identity. Errors are recorded in
    /// the loading state and re-raised to the caller.
    pub async fn upsert_skills(&self, skills: Vec<Skill>) -> Result<usize> {
        self.coordinator.upsert(skills).await
    }

    /// Remove the skill matching the exact `(name, tenant_id, agent_id)`
    /// triple from the index.
    pub async fn remove_skill(
        &self,
        name: &str,
        tenant_id: Option<&str>,
        agent_id: Option<&str>,
    ) -> Result<usize> {
        self.coordinator.remove(name, tenant_id, agent_id).await
    }

    pub fn status(&self) -> LoadingStatus {
        self.state.status()
    }

    /// Whether initial loading has finished; mutation endpoints reject
    /// requests until it has.
    pub fn is_ready(&self) -> bool {
        self.state.is_complete()
    }

    pub fn skills(&self) -> Vec<Skill> {
        self.index.skills()
    }

    pub fn indexed_count(&self) -> usize {
        self.index.len()
    }

    pub fn store(&self) -> &SkillStore {
        &self.store
    }

    pub fn checker(&self) -> &UpdateChecker {
        &self.checker
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn loading_state(&self) -> &Arc<LoadingState> {
        &self.state
    }
}

fn truncate_chars(text: &mut String, limit: usize) {
    if text.chars().count() > limit {
        *text = text.chars().take(limit).collect();
        text.push_str("...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let mut text = "héllo wörld".to_string();
        truncate_chars(&mut text, 5);
        assert_eq!(text, "héllo...");

        let mut short = "hi".to_string();
        truncate_chars(&mut short, 5);
        assert_eq!(short, "hi");
    }
}
