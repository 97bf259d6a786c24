//! The in-memory semantic index.
//!
//! Holds the current skill set and a position-aligned vector per skill,
//! replaced only as a whole snapshot. Readers take a short read lock and
//! always observe a consistent (skills, vectors) pair; scoring for a
//! rebuild happens outside any lock readers touch, so queries keep running
//! while a rebuild embeds.
//!
//! Lock discipline, outermost first: reindex lock (coordinator) → index
//! writer lock → snapshot `RwLock`. The snapshot lock is never held across
//! an await.

use anyhow::{bail, Result};
use std::sync::{Arc, RwLock};

use crate::embedding::{cosine_similarity, Embedder};
use crate::models::{QueryHit, Skill};

#[derive(Default)]
struct Snapshot {
    skills: Vec<Skill>,
    vectors: Vec<Vec<f32>>,
}

/// Brute-force cosine index over skill descriptions.
pub struct SemanticIndex {
    embedder: Arc<dyn Embedder>,
    /// Serializes `replace`/`append` against each other. Queries never take
    /// this; they only read `snapshot`.
    writer: tokio::sync::Mutex<()>,
    snapshot: RwLock<Snapshot>,
}

impl SemanticIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            writer: tokio::sync::Mutex::new(()),
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    /// Number of currently indexed skills.
    pub fn len(&self) -> usize {
        self.snapshot.read().unwrap().skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone of the current skill list, in insertion order.
    pub fn skills(&self) -> Vec<Skill> {
        self.snapshot.read().unwrap().skills.clone()
    }

    /// Rank indexed skills against `text` and return the top `top_k`.
    ///
    /// `allowed_names` restricts ranking to the named skills: filtering
    /// happens before ranking, so the filter never short-changes `top_k`.
    /// Ties keep insertion order. Runs concurrently with rebuilds and sees
    /// either the whole old snapshot or the whole new one.
    pub async fn query(
        &self,
        text: &str,
        top_k: usize,
        allowed_names: Option<&[String]>,
    ) -> Result<Vec<QueryHit>> {
        let query_vector = self.embedder.embed_query(text).await?;

        let snapshot = self.snapshot.read().unwrap();
        let mut hits: Vec<QueryHit> = snapshot
            .skills
            .iter()
            .zip(snapshot.vectors.iter())
            .filter(|(skill, _)| match allowed_names {
                Some(names) => names.iter().any(|n| *n == skill.name),
                None => true,
            })
            .map(|(skill, vector)| QueryHit {
                skill: skill.clone(),
                score: cosine_similarity(&query_vector, vector),
            })
            .collect();
        drop(snapshot);

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    /// Discard the previous snapshot and install one built from `skills`.
    ///
    /// Embeds every description in a single batched call, then swaps the
    /// (skills, vectors) pair in atomically. An empty `skills` installs an
    /// empty snapshot. On embedding failure the prior snapshot stays live.
    pub async fn replace(&self, skills: Vec<Skill>) -> Result<usize> {
        let _writer = self.writer.lock().await;
        self.install(skills).await
    }

    /// Fold a batch of newly loaded skills into the current snapshot.
    ///
    /// Startup-pipeline path only; mutation endpoints go through the
    /// coordinator's `replace`. The scoring function is a dense batched
    /// operation, so scores are recomputed for the full resulting set
    /// rather than cached per skill across appends.
    pub async fn append(&self, batch: Vec<Skill>) -> Result<usize> {
        let _writer = self.writer.lock().await;

        if batch.is_empty() {
            return Ok(self.len());
        }

        let mut combined = self.snapshot.read().unwrap().skills.clone();
        combined.extend(batch);
        self.install(combined).await
    }

    /// Embed and swap in a new snapshot. Caller must hold the writer lock.
    async fn install(&self, skills: Vec<Skill>) -> Result<usize> {
        if skills.is_empty() {
            let mut snapshot = self.snapshot.write().unwrap();
            snapshot.skills = Vec::new();
            snapshot.vectors = Vec::new();
            tracing::info!("installed empty index snapshot");
            return Ok(0);
        }

        let descriptions: Vec<String> = skills.iter().map(|s| s.description.clone()).collect();
        let vectors = self.embedder.embed_batch(&descriptions).await?;
        if vectors.len() != skills.len() {
            bail!(
                "embedding provider returned {} vectors for {} skills",
                vectors.len(),
                skills.len()
            );
        }

        let count = skills.len();
        {
            let mut snapshot = self.snapshot.write().unwrap();
            snapshot.skills = skills;
            snapshot.vectors = vectors;
        }
        tracing::info!(count, "index snapshot installed");
        Ok(count)
    }
}
