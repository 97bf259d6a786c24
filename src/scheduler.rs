//! Periodic change-detection scheduler.
//!
//! Runs on a fixed wall-clock interval: each cycle asks the
//! [`UpdateChecker`] whether any configured source drifted, and if anything
//! changed performs a full reload of *all* sources through the reindex
//! coordinator. Reloading everything on any change deliberately trades
//! efficiency for simplicity; the reload path is identical to startup
//! ingestion plus an atomic snapshot replacement.
//!
//! Stopping interrupts only the timer wait. A cycle that is already
//! checking or reloading runs to completion, so a partial reload is never
//! installed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SourceSpec;
use crate::loader::loader_for;
use crate::models::Skill;
use crate::refresh::UpdateChecker;
use crate::reindex::ReindexCoordinator;
use crate::status::LoadingState;

pub struct RefreshScheduler {
    stop_tx: watch::Sender<bool>,
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    /// Start the scheduler loop. The first cycle runs one full interval
    /// after start, not immediately.
    pub fn start(
        interval: Duration,
        sources: Vec<SourceSpec>,
        github_token: Option<String>,
        checker: Arc<UpdateChecker>,
        coordinator: Arc<ReindexCoordinator>,
        state: Arc<LoadingState>,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(run_loop(
            interval,
            sources,
            github_token,
            checker,
            coordinator,
            state,
            stop_rx,
        ));

        Self {
            stop_tx,
            handle: tokio::sync::Mutex::new(Some(handle)),
        }
    }

    /// Stop the scheduler and wait for it to wind down. Interrupts a
    /// pending timer wait; an in-flight cycle finishes first. No further
    /// cycles run afterwards; restarting is not supported.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "refresh scheduler task failed");
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    interval: Duration,
    sources: Vec<SourceSpec>,
    github_token: Option<String>,
    checker: Arc<UpdateChecker>,
    coordinator: Arc<ReindexCoordinator>,
    state: Arc<LoadingState>,
    mut stop_rx: watch::Receiver<bool>,
) {
    tracing::info!(interval_secs = interval.as_secs(), "refresh scheduler started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick of a tokio interval completes immediately; consume it
    // so the first cycle runs one full interval after start.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop_rx.changed() => {
                // A closed channel means the handle is gone; stop either way.
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
                continue;
            }
        }

        // The cycle itself is not a cancellation point.
        run_cycle(&sources, &github_token, &checker, &coordinator, &state).await;

        if *stop_rx.borrow() {
            break;
        }
    }

    tracing::info!("refresh scheduler stopped");
}

async fn run_cycle(
    sources: &[SourceSpec],
    github_token: &Option<String>,
    checker: &UpdateChecker,
    coordinator: &ReindexCoordinator,
    state: &LoadingState,
) {
    tracing::debug!("running scheduled update check");
    let result = checker.check(sources).await;

    for error in &result.errors {
        state.record_error(error.clone());
    }
    tracing::info!(
        changed = result.changed_sources.len(),
        api_calls = result.api_calls_made,
        "update check complete"
    );

    if !result.has_updates() {
        return;
    }

    // Any change triggers a reload of every source, not just the changed
    // ones, then a wholesale snapshot replacement under the reindex lock.
    let skills = load_all_sources(sources, github_token.clone(), state).await;
    match coordinator.replace_all(skills).await {
        Ok(count) => tracing::info!(count, "index reloaded after source change"),
        Err(e) => tracing::warn!(error = %e, "scheduled reload failed, previous snapshot kept"),
    }
}

/// Load every configured source in order, absorbing per-source failures
/// into the loading state.
async fn load_all_sources(
    sources: &[SourceSpec],
    github_token: Option<String>,
    state: &LoadingState,
) -> Vec<Skill> {
    let mut skills = Vec::new();
    for spec in sources {
        let loader = loader_for(spec, github_token.clone());
        match loader.load_skills().await {
            Ok(loaded) => skills.extend(loaded),
            Err(e) => {
                let message = format!("{}: {}", loader.describe(), e);
                tracing::warn!("{}", message);
                state.record_error(message);
            }
        }
    }
    skills
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::index::SemanticIndex;
    use std::path::Path;

    const SKILL_TEMPLATE: &str = "---\nname: NAME\ndescription: NAME does things\n---\n";

    fn write_skill(root: &Path, name: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("SKILL.md"), SKILL_TEMPLATE.replace("NAME", name)).unwrap();
    }

    fn local_source(root: &Path) -> SourceSpec {
        SourceSpec::Local {
            path: root.to_path_buf(),
            include_globs: vec!["**/SKILL.md".to_string()],
            exclude_globs: Vec::new(),
        }
    }

    async fn poll_until<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn detected_change_triggers_full_reload() {
        let src = tempfile::tempdir().unwrap();
        write_skill(src.path(), "a");

        let index = Arc::new(SemanticIndex::new(Arc::new(HashEmbedder::new(32))));
        let state = Arc::new(LoadingState::new());
        let coordinator = Arc::new(ReindexCoordinator::new(index.clone(), state.clone()));
        let checker = Arc::new(UpdateChecker::new(None, 60));

        let scheduler = RefreshScheduler::start(
            Duration::from_millis(30),
            vec![local_source(src.path())],
            None,
            checker,
            coordinator,
            state.clone(),
        );

        // Let the first cycle establish the baseline, then drift the source.
        tokio::time::sleep(Duration::from_millis(100)).await;
        write_skill(src.path(), "b");

        let reloaded = poll_until(Duration::from_secs(5), || index.len() == 2).await;
        scheduler.stop().await;
        assert!(reloaded, "scheduler should reload after the source changed");
        assert!(state.is_complete());
    }

    #[tokio::test]
    async fn stop_interrupts_the_timer_wait() {
        let index = Arc::new(SemanticIndex::new(Arc::new(HashEmbedder::new(32))));
        let state = Arc::new(LoadingState::new());
        let coordinator = Arc::new(ReindexCoordinator::new(index, state.clone()));
        let checker = Arc::new(UpdateChecker::new(None, 60));

        let scheduler = RefreshScheduler::start(
            Duration::from_secs(3600),
            Vec::new(),
            None,
            checker,
            coordinator,
            state,
        );

        // Stopping must not wait out the hour-long interval.
        tokio::time::timeout(Duration::from_secs(2), scheduler.stop())
            .await
            .expect("stop should interrupt the pending timer wait");
    }

    #[tokio::test]
    async fn no_change_means_no_reload() {
        let src = tempfile::tempdir().unwrap();
        write_skill(src.path(), "a");

        let index = Arc::new(SemanticIndex::new(Arc::new(HashEmbedder::new(32))));
        let state = Arc::new(LoadingState::new());
        let coordinator = Arc::new(ReindexCoordinator::new(index.clone(), state.clone()));
        let checker = Arc::new(UpdateChecker::new(None, 60));

        let scheduler = RefreshScheduler::start(
            Duration::from_millis(30),
            vec![local_source(src.path())],
            None,
            checker,
            coordinator,
            state,
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.stop().await;

        // Baseline cycles ran but nothing changed, so nothing was installed.
        assert_eq!(index.len(), 0);
    }
}
