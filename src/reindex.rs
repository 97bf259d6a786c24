//! Serialized rebuilds of the semantic index.
//!
//! Every full-snapshot replacement — upload, delete, or a scheduled full
//! reload — goes through the [`ReindexCoordinator`], which owns the single
//! reindex lock. At most one rebuild is in flight system-wide; operations
//! queue in arrival order. Queries never touch this lock.
//!
//! Acquisition order is reindex lock → index locks. The loading-state mutex
//! is independent and never held across either.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

use crate::index::SemanticIndex;
use crate::models::{Skill, SkillKey};
use crate::status::LoadingState;

pub struct ReindexCoordinator {
    index: Arc<SemanticIndex>,
    state: Arc<LoadingState>,
    lock: tokio::sync::Mutex<()>,
}

impl ReindexCoordinator {
    pub fn new(index: Arc<SemanticIndex>, state: Arc<LoadingState>) -> Self {
        Self {
            index,
            state,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Merge `new_skills` into the current snapshot and rebuild.
    ///
    /// Merging is keyed on the composite identity: an incoming skill
    /// replaces the existing skill with the same `(name, tenant_id,
    /// agent_id)` in place; genuinely new keys are appended in arrival
    /// order. Collisions resolve last-write-wins and are never an error.
    pub async fn upsert(&self, new_skills: Vec<Skill>) -> Result<usize> {
        self.rebuild(move |current| merge_by_key(current, new_skills))
            .await
    }

    /// Drop every skill matching the exact `(name, tenant_id, agent_id)`
    /// triple and rebuild. Partial-key matches are never removed.
    pub async fn remove(
        &self,
        name: &str,
        tenant_id: Option<&str>,
        agent_id: Option<&str>,
    ) -> Result<usize> {
        let name = name.to_string();
        let tenant_id = tenant_id.map(str::to_string);
        let agent_id = agent_id.map(str::to_string);
        self.rebuild(move |current| {
            current
                .into_iter()
                .filter(|s| {
                    !(s.name == name && s.tenant_id == tenant_id && s.agent_id == agent_id)
                })
                .collect()
        })
        .await
    }

    /// Replace the whole snapshot with a freshly loaded skill set. Used by
    /// the scheduled full reload.
    pub async fn replace_all(&self, skills: Vec<Skill>) -> Result<usize> {
        self.rebuild(move |_| skills).await
    }

    /// The shared rebuild path: acquire the reindex lock, flag the loading
    /// state, derive the new collection from the current snapshot, and
    /// install it. On failure the error is recorded, the loading state is
    /// still marked complete, and the error propagates to the caller.
    async fn rebuild<F>(&self, build: F) -> Result<usize>
    where
        F: FnOnce(Vec<Skill>) -> Vec<Skill>,
    {
        let _guard = self.lock.lock().await;
        self.state.begin_rebuild();

        let current = self.index.skills();
        let combined = build(current);

        match self.index.replace(combined).await {
            Ok(count) => {
                self.state.finish(count);
                tracing::info!(count, "reindex complete");
                Ok(count)
            }
            Err(e) => {
                tracing::warn!(error = %e, "reindex failed, previous snapshot preserved");
                self.state.record_error(e.to_string());
                self.state.mark_complete();
                Err(e)
            }
        }
    }
}

/// Overlay `incoming` onto `existing` by composite key. Survivors keep
/// their positions; new keys append in first-occurrence order.
fn merge_by_key(existing: Vec<Skill>, incoming: Vec<Skill>) -> Vec<Skill> {
    let mut incoming_by_key: HashMap<SkillKey, Skill> = HashMap::new();
    let mut arrival_order: Vec<SkillKey> = Vec::new();
    for skill in incoming {
        let key = skill.key();
        if !incoming_by_key.contains_key(&key) {
            arrival_order.push(key.clone());
        }
        incoming_by_key.insert(key, skill);
    }

    let mut merged: Vec<Skill> = existing
        .into_iter()
        .map(|skill| incoming_by_key.remove(&skill.key()).unwrap_or(skill))
        .collect();

    for key in arrival_order {
        if let Some(skill) = incoming_by_key.remove(&key) {
            merged.push(skill);
        }
    }

    merged
}
