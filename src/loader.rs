//! Skill source loaders.
//!
//! A [`SourceLoader`] turns a configured source into a finite sequence of
//! [`Skill`] records. Two loaders are provided: a local-directory scanner
//! and a GitHub archive loader. Loaders fail per-source without crashing
//! the caller; the ingestion pipeline records the error and moves on.
//!
//! A skill is a directory containing a `SKILL.md` document with YAML-style
//! front matter (`name:` and `description:`) plus any number of bundled
//! files.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::SourceSpec;
use crate::models::{DocumentKind, Skill, SkillDocument, SkillScope};

/// Documents larger than this keep a URL instead of inline content.
const MAX_INLINE_BYTES: u64 = 64 * 1024;

const TEXT_EXTENSIONS: &[&str] = &[
    "md", "txt", "py", "json", "yaml", "yml", "sh", "r", "xml", "toml", "csv",
];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp"];

/// Produces skills from one configured source.
#[async_trait]
pub trait SourceLoader: Send + Sync {
    /// Human-readable description for logs and error messages.
    fn describe(&self) -> String;

    /// Load every skill this source currently provides, in discovery order.
    async fn load_skills(&self) -> Result<Vec<Skill>>;
}

/// Build the loader for a configured source.
pub fn loader_for(spec: &SourceSpec, github_token: Option<String>) -> Box<dyn SourceLoader> {
    match spec {
        SourceSpec::Local {
            path,
            include_globs,
            exclude_globs,
        } => Box::new(LocalDirSource::new(
            path.clone(),
            include_globs.clone(),
            exclude_globs.clone(),
        )),
        SourceSpec::Github { repo, branch } => Box::new(GithubSource {
            repo: repo.clone(),
            branch: branch.clone(),
            token: github_token,
        }),
    }
}

// ============ Front-matter parsing ============

/// Parse a `SKILL.md` document into a [`Skill`].
///
/// Expects front matter delimited by `---` lines with at least `name:` and
/// `description:` keys. Returns `None` for documents without valid front
/// matter; callers log and skip those.
pub fn parse_skill_md(content: &str, source: &str) -> Option<Skill> {
    let mut lines = content.lines();
    if lines.next()?.trim() != "---" {
        return None;
    }

    let mut name = None;
    let mut description = None;
    for line in lines {
        let trimmed = line.trim();
        if trimmed == "---" {
            break;
        }
        if let Some((key, value)) = trimmed.split_once(':') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            match key.trim() {
                "name" => name = Some(value.to_string()),
                "description" => description = Some(value.to_string()),
                _ => {}
            }
        }
    }

    let name = name.filter(|n| !n.is_empty())?;
    let description = description.filter(|d| !d.is_empty())?;

    Some(Skill {
        name,
        description,
        content: content.to_string(),
        documents: Vec::new(),
        source: source.to_string(),
        scope: SkillScope::Public,
        tenant_id: None,
        agent_id: None,
    })
}

fn kind_for_path(path: &Path) -> DocumentKind {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => {
            let ext = ext.to_lowercase();
            if TEXT_EXTENSIONS.contains(&ext.as_str()) {
                DocumentKind::Text
            } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                DocumentKind::Image
            } else {
                DocumentKind::Binary
            }
        }
        None => DocumentKind::Binary,
    }
}

// ============ Local directory source ============

/// Scans a directory tree for `SKILL.md` bundles.
pub struct LocalDirSource {
    root: PathBuf,
    include_globs: Vec<String>,
    exclude_globs: Vec<String>,
}

impl LocalDirSource {
    pub fn new(root: PathBuf, include_globs: Vec<String>, exclude_globs: Vec<String>) -> Self {
        Self {
            root,
            include_globs,
            exclude_globs,
        }
    }

    fn build_globset(patterns: &[String]) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern).with_context(|| format!("bad glob: {}", pattern))?);
        }
        Ok(builder.build()?)
    }

    fn scan(&self) -> Result<Vec<Skill>> {
        if !self.root.is_dir() {
            bail!("source directory does not exist: {}", self.root.display());
        }

        let include = Self::build_globset(&self.include_globs)?;
        let exclude = Self::build_globset(&self.exclude_globs)?;

        let mut skills = Vec::new();
        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = match entry.path().strip_prefix(&self.root) {
                Ok(r) => r,
                Err(_) => continue,
            };
            if !include.is_match(relative) || exclude.is_match(relative) {
                continue;
            }

            let content = match std::fs::read_to_string(entry.path()) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "failed to read skill file");
                    continue;
                }
            };

            let source = entry.path().display().to_string();
            match parse_skill_md(&content, &source) {
                Some(mut skill) => {
                    if let Some(dir) = entry.path().parent() {
                        skill.documents = collect_local_documents(dir);
                    }
                    skills.push(skill);
                }
                None => {
                    tracing::warn!(path = %entry.path().display(), "skipping invalid SKILL.md");
                }
            }
        }

        Ok(skills)
    }
}

/// Gather the bundle's sibling files, relative to the skill directory.
pub(crate) fn collect_local_documents(dir: &Path) -> Vec<SkillDocument> {
    let mut documents = Vec::new();
    for entry in WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = match entry.path().strip_prefix(dir) {
            Ok(r) => r.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        if relative == "SKILL.md" {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let kind = kind_for_path(entry.path());
        let content = if kind == DocumentKind::Text && size <= MAX_INLINE_BYTES {
            std::fs::read_to_string(entry.path()).ok()
        } else {
            None
        };
        let url = if content.is_none() {
            Some(entry.path().display().to_string())
        } else {
            None
        };

        documents.push(SkillDocument {
            path: relative,
            kind,
            size,
            content,
            url,
        });
    }
    documents
}

#[async_trait]
impl SourceLoader for LocalDirSource {
    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }

    async fn load_skills(&self) -> Result<Vec<Skill>> {
        self.scan()
    }
}

// ============ GitHub source ============

/// Loads skills from a GitHub repository via its branch ZIP archive.
pub struct GithubSource {
    repo: String,
    branch: String,
    token: Option<String>,
}

#[async_trait]
impl SourceLoader for GithubSource {
    fn describe(&self) -> String {
        format!("github:{}@{}", self.repo, self.branch)
    }

    async fn load_skills(&self) -> Result<Vec<Skill>> {
        let bytes = download_github_zip(&self.repo, &self.branch, self.token.as_deref()).await?;
        let locator = format!("https://github.com/{}/tree/{}", self.repo, self.branch);
        skills_from_zip_bytes(&bytes, &locator)
    }
}

/// Download `owner/repo` at `branch` as a ZIP archive.
pub async fn download_github_zip(repo: &str, branch: &str, token: Option<&str>) -> Result<Vec<u8>> {
    let url = format!(
        "https://github.com/{}/archive/refs/heads/{}.zip",
        repo, branch
    );

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .user_agent(concat!("skillbox/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let mut request = client.get(&url);
    if let Some(token) = token {
        request = request.header("Authorization", format!("Bearer {}", token));
    }

    let response = request
        .send()
        .await
        .with_context(|| format!("failed to download {}", url))?;

    let status = response.status();
    if status.as_u16() == 404 {
        bail!("repository or branch not found: {}@{}", repo, branch);
    }
    if !status.is_success() {
        bail!("GitHub archive download failed with {}: {}", status, url);
    }

    let bytes = response.bytes().await?;
    tracing::debug!(repo, branch, size = bytes.len(), "downloaded GitHub archive");
    Ok(bytes.to_vec())
}

/// Extract every skill bundle from ZIP archive bytes, entirely in memory.
///
/// Unsafe member names (absolute paths, `..` traversal) are skipped via the
/// archive's own sanitizer rather than trusted.
pub fn skills_from_zip_bytes(bytes: &[u8], locator: &str) -> Result<Vec<Skill>> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor).context("not a valid ZIP archive")?;

    // First pass: find SKILL.md entries and remember every safe file path.
    let mut skill_entries: Vec<(usize, PathBuf)> = Vec::new();
    let mut file_paths: Vec<(PathBuf, u64)> = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let Some(path) = entry.enclosed_name() else {
            tracing::warn!(name = entry.name(), "skipping unsafe archive member");
            continue;
        };
        if path.file_name().and_then(|n| n.to_str()) == Some("SKILL.md") {
            skill_entries.push((i, path.clone()));
        }
        file_paths.push((path, entry.size()));
    }

    let mut skills = Vec::new();
    for (index, skill_path) in skill_entries {
        let mut content = String::new();
        {
            let mut entry = archive.by_index(index)?;
            if entry.read_to_string(&mut content).is_err() {
                tracing::warn!(path = %skill_path.display(), "skipping non-UTF-8 SKILL.md");
                continue;
            }
        }

        let Some(mut skill) = parse_skill_md(&content, locator) else {
            tracing::warn!(path = %skill_path.display(), "skipping invalid SKILL.md");
            continue;
        };

        // Bundle siblings: entries under the same directory prefix.
        let bundle_dir = skill_path.parent().unwrap_or(Path::new(""));
        for (path, size) in &file_paths {
            let Ok(relative) = path.strip_prefix(bundle_dir) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if relative.is_empty() || relative == "SKILL.md" {
                continue;
            }
            let kind = kind_for_path(path);
            skill.documents.push(SkillDocument {
                path: relative,
                kind,
                size: *size,
                content: None,
                url: Some(format!("{}/{}", locator, path.display())),
            });
        }

        skills.push(skill);
    }

    Ok(skills)
}
