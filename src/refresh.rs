//! External change detection for configured skill sources.
//!
//! The [`UpdateChecker`] decides whether a source has drifted since the
//! last check. GitHub sources cost one API call each (latest commit SHA on
//! the configured branch) and are bounded by a rolling-hour call budget;
//! local sources are fingerprinted from file metadata at no API cost.
//!
//! Budget exhaustion is not an error: the affected source is skipped for
//! this cycle with a recorded warning, and the cycle completes with
//! whatever data was available.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

use crate::config::SourceSpec;

const ROLLING_WINDOW: Duration = Duration::from_secs(3600);

/// Result of one change-detection cycle.
#[derive(Debug, Default)]
pub struct UpdateCheck {
    /// Locators of sources whose fingerprint changed since the last cycle.
    pub changed_sources: Vec<String>,
    /// External API calls consumed by this cycle.
    pub api_calls_made: u32,
    /// Non-fatal per-source errors.
    pub errors: Vec<String>,
}

impl UpdateCheck {
    pub fn has_updates(&self) -> bool {
        !self.changed_sources.is_empty()
    }
}

/// Current call-budget usage, exposed for observability.
#[derive(Debug, Clone, Serialize)]
pub struct ApiUsage {
    pub calls_this_hour: u32,
    pub limit_per_hour: u32,
    pub authenticated: bool,
}

pub struct UpdateChecker {
    token: Option<String>,
    limit_per_hour: u32,
    /// Timestamps of API calls inside the rolling window.
    calls: Mutex<Vec<Instant>>,
    /// Last observed fingerprint per source locator.
    fingerprints: Mutex<HashMap<String, String>>,
}

impl UpdateChecker {
    pub fn new(token: Option<String>, limit_per_hour: u32) -> Self {
        Self {
            token,
            limit_per_hour,
            calls: Mutex::new(Vec::new()),
            fingerprints: Mutex::new(HashMap::new()),
        }
    }

    pub fn api_usage(&self) -> ApiUsage {
        ApiUsage {
            calls_this_hour: self.calls_in_window(),
            limit_per_hour: self.limit_per_hour,
            authenticated: self.token.is_some(),
        }
    }

    fn calls_in_window(&self) -> u32 {
        let mut calls = self.calls.lock().unwrap();
        if let Some(cutoff) = Instant::now().checked_sub(ROLLING_WINDOW) {
            calls.retain(|t| *t > cutoff);
        }
        calls.len() as u32
    }

    fn try_consume_call(&self) -> bool {
        if self.calls_in_window() >= self.limit_per_hour {
            return false;
        }
        self.calls.lock().unwrap().push(Instant::now());
        true
    }

    /// Run one change-detection cycle over the configured sources.
    pub async fn check(&self, sources: &[SourceSpec]) -> UpdateCheck {
        let mut result = UpdateCheck::default();

        for spec in sources {
            let locator = spec.locator();
            let fingerprint = match spec {
                SourceSpec::Local { path, .. } => match local_fingerprint(path) {
                    Ok(fp) => fp,
                    Err(e) => {
                        result.errors.push(format!("{}: {}", locator, e));
                        continue;
                    }
                },
                SourceSpec::Github { repo, branch } => {
                    if !self.try_consume_call() {
                        let warning = format!(
                            "{}: API call budget exhausted ({} calls this hour), skipping check",
                            locator, self.limit_per_hour
                        );
                        tracing::warn!("{}", warning);
                        result.errors.push(warning);
                        continue;
                    }
                    result.api_calls_made += 1;
                    match self.github_head_sha(repo, branch).await {
                        Ok(sha) => sha,
                        Err(e) => {
                            result.errors.push(format!("{}: {}", locator, e));
                            continue;
                        }
                    }
                }
            };

            let mut fingerprints = self.fingerprints.lock().unwrap();
            match fingerprints.get(&locator) {
                Some(previous) if *previous != fingerprint => {
                    tracing::info!(source = %locator, "source changed");
                    result.changed_sources.push(locator.clone());
                    fingerprints.insert(locator, fingerprint);
                }
                Some(_) => {}
                None => {
                    // First observation establishes the baseline.
                    fingerprints.insert(locator, fingerprint);
                }
            }
        }

        let usage = self.api_usage();
        if !usage.authenticated && usage.calls_this_hour * 6 >= usage.limit_per_hour * 5 {
            tracing::warn!(
                calls = usage.calls_this_hour,
                limit = usage.limit_per_hour,
                "approaching external API rate limit"
            );
        }

        result
    }

    /// Latest commit SHA on a branch, one API call.
    async fn github_head_sha(&self, repo: &str, branch: &str) -> Result<String> {
        let url = format!("https://api.github.com/repos/{}/commits/{}", repo, branch);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("skillbox/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut request = client.get(&url).header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("failed to query {}", url))?;
        let status = response.status();
        if !status.is_success() {
            bail!("GitHub API returned {} for {}", status, url);
        }

        let json: serde_json::Value = response.json().await?;
        json.get("sha")
            .and_then(|s| s.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("GitHub API response missing commit sha"))
    }
}

/// Fingerprint a local source from its file paths, sizes, and mtimes.
pub(crate) fn local_fingerprint(root: &Path) -> Result<String> {
    if !root.is_dir() {
        bail!("source directory does not exist: {}", root.display());
    }

    let mut hasher = Sha256::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .to_string();
        hasher.update(relative.as_bytes());
        if let Ok(metadata) = entry.metadata() {
            hasher.update(metadata.len().to_le_bytes());
            if let Ok(modified) = metadata.modified() {
                let stamp = chrono::DateTime::<chrono::Utc>::from(modified).to_rfc3339();
                hasher.update(stamp.as_bytes());
            }
        }
    }

    Ok(hex::encode(hasher.finalize()))
}
