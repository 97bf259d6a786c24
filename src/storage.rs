//! On-disk storage for uploaded skill bundles.
//!
//! Uploaded skills live under a tenant-sharded layout:
//! `<root>/<tenant-slug>/<skill-slug>/` for tenant-scoped skills and
//! `<root>/<skill-slug>/` for public ones. Every path that touches this
//! tree is resolved through [`crate::paths::contain`]; nothing in this
//! module re-derives its own traversal check.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::loader::{collect_local_documents, parse_skill_md};
use crate::models::{Skill, SkillScope};
use crate::paths::{contain, is_within, slugify};

/// Uploaded-skill storage rooted at a configured directory.
pub struct SkillStore {
    root: PathBuf,
}

/// Summary of one stored bundle, for the list endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StoredBundle {
    pub name: String,
    pub description: String,
    pub directory: String,
    pub file_count: usize,
    pub tenant_id: Option<String>,
}

impl SkillStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination directory for a skill, derived from slugs only.
    fn bundle_dir(&self, skill_name: &str, tenant_id: Option<&str>) -> Result<PathBuf> {
        let mut relative = PathBuf::new();
        if let Some(tenant) = tenant_id {
            relative.push(slugify(tenant));
        }
        relative.push(slugify(skill_name));
        Ok(contain(&self.root, &relative)?)
    }

    /// Extract every skill bundle in a ZIP archive into storage, replacing
    /// bundles that already exist at the destination, then reload the
    /// stored copies tagged with the given tenant/agent scope.
    pub fn store_archive(
        &self,
        zip_bytes: &[u8],
        tenant_id: Option<&str>,
        agent_id: Option<&str>,
    ) -> Result<Vec<Skill>> {
        let cursor = std::io::Cursor::new(zip_bytes);
        let mut archive = zip::ZipArchive::new(cursor).context("not a valid ZIP archive")?;

        // Locate SKILL.md entries and collect safe member paths.
        let mut skill_entries: Vec<(usize, PathBuf)> = Vec::new();
        let mut members: Vec<(usize, PathBuf)> = Vec::new();
        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let Some(path) = entry.enclosed_name() else {
                bail!("archive contains unsafe member path: {}", entry.name());
            };
            if path.file_name().and_then(|n| n.to_str()) == Some("SKILL.md") {
                skill_entries.push((i, path.clone()));
            }
            members.push((i, path));
        }

        if skill_entries.is_empty() {
            bail!("no SKILL.md found in the archive");
        }

        let mut stored_dirs: Vec<PathBuf> = Vec::new();
        for (index, skill_path) in &skill_entries {
            let mut content = String::new();
            archive
                .by_index(*index)?
                .read_to_string(&mut content)
                .context("SKILL.md is not valid UTF-8")?;

            let Some(parsed) = parse_skill_md(&content, "upload") else {
                tracing::warn!(path = %skill_path.display(), "skipping invalid SKILL.md in upload");
                continue;
            };

            let dest = self.bundle_dir(&parsed.name, tenant_id)?;
            if dest.exists() {
                tracing::info!(dir = %dest.display(), "replacing existing skill bundle");
                std::fs::remove_dir_all(&dest)?;
            }
            std::fs::create_dir_all(&dest)?;

            // Extract this bundle: every member sharing the SKILL.md's
            // directory prefix, re-contained under the destination.
            let bundle_prefix = skill_path.parent().unwrap_or(Path::new("")).to_path_buf();
            for (member_index, member_path) in &members {
                let Ok(relative) = member_path.strip_prefix(&bundle_prefix) else {
                    continue;
                };
                if relative.as_os_str().is_empty() {
                    continue;
                }
                let target = contain(&dest, relative)?;
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut entry = archive.by_index(*member_index)?;
                let mut file = std::fs::File::create(&target)?;
                std::io::copy(&mut entry, &mut file)?;
            }

            stored_dirs.push(dest);
        }

        if stored_dirs.is_empty() {
            bail!("no valid skills could be loaded from the archive");
        }

        let mut skills = Vec::new();
        for dir in stored_dirs {
            skills.extend(self.load_bundle(&dir, tenant_id, agent_id)?);
        }
        Ok(skills)
    }

    /// Load the stored bundle at `dir` and tag it with its scope.
    fn load_bundle(
        &self,
        dir: &Path,
        tenant_id: Option<&str>,
        agent_id: Option<&str>,
    ) -> Result<Vec<Skill>> {
        let skill_file = dir.join("SKILL.md");
        let content = std::fs::read_to_string(&skill_file)
            .with_context(|| format!("missing SKILL.md in {}", dir.display()))?;

        let Some(mut skill) = parse_skill_md(&content, &skill_file.display().to_string()) else {
            bail!("stored SKILL.md failed to parse: {}", skill_file.display());
        };
        skill.documents = collect_local_documents(dir);
        tag_scope(&mut skill, tenant_id, agent_id);
        Ok(vec![skill])
    }

    /// Delete the stored bundle for a skill. Refuses anything that resolves
    /// outside the storage root. Returns `false` if no bundle exists.
    pub fn delete_bundle(&self, skill_name: &str, tenant_id: Option<&str>) -> Result<bool> {
        let dir = self.bundle_dir(skill_name, tenant_id)?;
        if !dir.exists() {
            return Ok(false);
        }
        if !is_within(&self.root, &dir) {
            bail!("refusing to delete outside the storage root: {}", dir.display());
        }
        std::fs::remove_dir_all(&dir)?;
        tracing::info!(dir = %dir.display(), "deleted skill bundle");
        Ok(true)
    }

    /// List every stored bundle, optionally filtered by tenant. Tenant
    /// attribution comes from the path layout: `<tenant>/<skill>` vs a
    /// root-level `<skill>` for public bundles.
    pub fn list(&self, tenant_filter: Option<&str>) -> Result<Vec<StoredBundle>> {
        let mut bundles = Vec::new();
        if !self.root.exists() {
            return Ok(bundles);
        }

        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_name() != "SKILL.md" || !entry.file_type().is_file() {
                continue;
            }
            let dir = match entry.path().parent() {
                Some(d) => d,
                None => continue,
            };
            let Ok(relative) = dir.strip_prefix(&self.root) else {
                continue;
            };

            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect();
            let tenant_id = if parts.len() >= 2 {
                Some(parts[0].clone())
            } else {
                None
            };
            if let Some(filter) = tenant_filter {
                if tenant_id.as_deref() != Some(filter) {
                    continue;
                }
            }

            let content = match std::fs::read_to_string(entry.path()) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "unreadable stored SKILL.md");
                    continue;
                }
            };
            let Some(parsed) = parse_skill_md(&content, "stored") else {
                continue;
            };

            let file_count = WalkDir::new(dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .count();

            bundles.push(StoredBundle {
                name: parsed.name,
                description: parsed.description,
                directory: dir.display().to_string(),
                file_count,
                tenant_id,
            });
        }

        Ok(bundles)
    }
}

/// Ingestion tagging: scope follows from the identifiers present.
fn tag_scope(skill: &mut Skill, tenant_id: Option<&str>, agent_id: Option<&str>) {
    skill.tenant_id = tenant_id.map(str::to_string);
    skill.agent_id = agent_id.map(str::to_string);
    skill.scope = if agent_id.is_some() {
        SkillScope::Agent
    } else if tenant_id.is_some() {
        SkillScope::Tenant
    } else {
        SkillScope::Public
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID_SKILL: &str =
        "---\nname: Data Analysis\ndescription: Analyze tabular data\n---\n\nBody.\n";

    fn archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            for (name, content) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn store_archive_extracts_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        let store = SkillStore::new(dir.path().to_path_buf());

        let bytes = archive(&[
            ("analysis/SKILL.md", VALID_SKILL),
            ("analysis/scripts/run.py", "print('hi')\n"),
        ]);

        let skills = store.store_archive(&bytes, Some("Team One"), Some("agent-7")).unwrap();
        assert_eq!(skills.len(), 1);
        let skill = &skills[0];
        assert_eq!(skill.name, "Data Analysis");
        assert_eq!(skill.tenant_id.as_deref(), Some("Team One"));
        assert_eq!(skill.agent_id.as_deref(), Some("agent-7"));
        assert_eq!(skill.scope, SkillScope::Agent);
        assert_eq!(skill.documents.len(), 1);

        // Tenant-sharded slug layout on disk.
        assert!(dir
            .path()
            .join("team-one/data-analysis/SKILL.md")
            .is_file());
        assert!(dir
            .path()
            .join("team-one/data-analysis/scripts/run.py")
            .is_file());
    }

    #[test]
    fn store_archive_replaces_existing_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let store = SkillStore::new(dir.path().to_path_buf());

        store
            .store_archive(
                &archive(&[
                    ("analysis/SKILL.md", VALID_SKILL),
                    ("analysis/old.txt", "old"),
                ]),
                None,
                None,
            )
            .unwrap();
        store
            .store_archive(&archive(&[("analysis/SKILL.md", VALID_SKILL)]), None, None)
            .unwrap();

        assert!(dir.path().join("data-analysis/SKILL.md").is_file());
        assert!(!dir.path().join("data-analysis/old.txt").exists());
    }

    #[test]
    fn store_archive_rejects_unsafe_members() {
        let dir = tempfile::tempdir().unwrap();
        let store = SkillStore::new(dir.path().to_path_buf());

        let bytes = archive(&[("../evil/SKILL.md", VALID_SKILL)]);
        assert!(store.store_archive(&bytes, None, None).is_err());
    }

    #[test]
    fn store_archive_without_skill_md_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = SkillStore::new(dir.path().to_path_buf());

        let bytes = archive(&[("docs/README.md", "nothing here")]);
        let err = store.store_archive(&bytes, None, None).unwrap_err();
        assert!(err.to_string().contains("no SKILL.md"));
    }

    #[test]
    fn delete_bundle_removes_only_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = SkillStore::new(dir.path().to_path_buf());

        store
            .store_archive(&archive(&[("analysis/SKILL.md", VALID_SKILL)]), Some("t1"), None)
            .unwrap();
        store
            .store_archive(&archive(&[("analysis/SKILL.md", VALID_SKILL)]), Some("t2"), None)
            .unwrap();

        assert!(store.delete_bundle("Data Analysis", Some("t1")).unwrap());
        assert!(!dir.path().join("t1/data-analysis").exists());
        assert!(dir.path().join("t2/data-analysis").exists());

        // Second delete is a no-op.
        assert!(!store.delete_bundle("Data Analysis", Some("t1")).unwrap());
    }

    #[test]
    fn list_reports_tenant_from_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = SkillStore::new(dir.path().to_path_buf());

        store
            .store_archive(&archive(&[("analysis/SKILL.md", VALID_SKILL)]), None, None)
            .unwrap();
        store
            .store_archive(&archive(&[("analysis/SKILL.md", VALID_SKILL)]), Some("t1"), None)
            .unwrap();

        let all = store.list(None).unwrap();
        assert_eq!(all.len(), 2);

        let tenant_only = store.list(Some("t1")).unwrap();
        assert_eq!(tenant_only.len(), 1);
        assert_eq!(tenant_only[0].tenant_id.as_deref(), Some("t1"));
    }
}
