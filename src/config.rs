use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

/// A configured skill source. Skills are loaded from sources in the order
/// they appear in the config file.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceSpec {
    /// A local directory scanned recursively for `SKILL.md` bundles.
    Local {
        path: PathBuf,
        #[serde(default = "default_include_globs")]
        include_globs: Vec<String>,
        #[serde(default)]
        exclude_globs: Vec<String>,
    },
    /// A GitHub repository, fetched as a ZIP archive of the given branch.
    Github {
        /// `owner/repo` slug.
        repo: String,
        #[serde(default = "default_branch")]
        branch: String,
    },
}

impl SourceSpec {
    /// Human-readable origin locator, also stored on loaded skills.
    pub fn locator(&self) -> String {
        match self {
            SourceSpec::Local { path, .. } => path.display().to_string(),
            SourceSpec::Github { repo, branch } => {
                format!("https://github.com/{}/tree/{}", repo, branch)
            }
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/SKILL.md".to_string()]
}

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Embedding provider: `hash` (deterministic, local) or `openai`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Skills per batch fed to the index during background ingestion.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    256
}
fn default_batch_size() -> usize {
    10
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory for uploaded skill bundles. Created on demand.
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshConfig {
    /// Whether the periodic change-detection scheduler runs at all.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// External API calls the update checker may spend per rolling hour.
    #[serde(default = "default_api_budget")]
    pub api_budget_per_hour: u32,
    /// Optional GitHub token; raises the effective rate limit upstream.
    #[serde(default)]
    pub github_token: Option<String>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: default_interval_minutes(),
            api_budget_per_hour: default_api_budget(),
            github_token: None,
        }
    }
}

fn default_interval_minutes() -> u64 {
    60
}
fn default_api_budget() -> u32 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    /// Truncate skill content in query responses to this many characters.
    #[serde(default)]
    pub max_content_chars: Option<usize>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_content_chars: None,
        }
    }
}

fn default_top_k() -> usize {
    3
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate index settings
    if config.index.dims == 0 {
        anyhow::bail!("index.dims must be > 0");
    }
    if config.index.batch_size == 0 {
        anyhow::bail!("index.batch_size must be > 0");
    }
    match config.index.provider.as_str() {
        "hash" => {}
        "openai" => {
            if config.index.model.is_none() {
                anyhow::bail!("index.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash or openai.",
            other
        ),
    }

    // Validate query settings
    if config.query.default_top_k < 1 {
        anyhow::bail!("query.default_top_k must be >= 1");
    }

    // Validate refresh settings
    if config.refresh.enabled {
        if config.refresh.interval_minutes < 1 {
            anyhow::bail!("refresh.interval_minutes must be >= 1");
        }
        if config.refresh.api_budget_per_hour < 1 {
            anyhow::bail!("refresh.api_budget_per_hour must be >= 1");
        }
    }

    for source in &config.sources {
        if let SourceSpec::Github { repo, .. } = source {
            if repo.split('/').filter(|p| !p.is_empty()).count() != 2 {
                anyhow::bail!("sources: github repo must be an 'owner/repo' slug, got '{}'", repo);
            }
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skillbox.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let (_dir, path) = write_config(
            r#"
[storage]
root = "./uploads"

[server]
bind = "127.0.0.1:8765"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.index.provider, "hash");
        assert_eq!(config.index.dims, 256);
        assert_eq!(config.query.default_top_k, 3);
        assert!(!config.refresh.enabled);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn openai_requires_model() {
        let (_dir, path) = write_config(
            r#"
[index]
provider = "openai"

[storage]
root = "./uploads"

[server]
bind = "127.0.0.1:8765"
"#,
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("index.model"));
    }

    #[test]
    fn github_source_requires_owner_repo_slug() {
        let (_dir, path) = write_config(
            r#"
[storage]
root = "./uploads"

[server]
bind = "127.0.0.1:8765"

[[sources]]
type = "github"
repo = "not-a-slug"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn sources_parse_in_order() {
        let (_dir, path) = write_config(
            r#"
[storage]
root = "./uploads"

[server]
bind = "127.0.0.1:8765"

[[sources]]
type = "local"
path = "./skills"

[[sources]]
type = "github"
repo = "acme/skills"
branch = "develop"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.sources.len(), 2);
        assert!(matches!(config.sources[0], SourceSpec::Local { .. }));
        assert_eq!(
            config.sources[1].locator(),
            "https://github.com/acme/skills/tree/develop"
        );
    }
}
