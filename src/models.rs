//! Core data models used throughout Skillbox.
//!
//! These types represent the skills, their bundled documents, and the
//! composite identity that flows through the ingestion and retrieval
//! pipeline.

use serde::Serialize;

/// Visibility scope of a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillScope {
    /// Visible to everyone; no tenant or agent attached.
    Public,
    /// Belongs to a single tenant.
    Tenant,
    /// Belongs to a single agent within a tenant.
    Agent,
}

/// Kind of a document bundled with a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Text,
    Image,
    Binary,
}

/// A document bundled with a skill, addressed by its path relative to the
/// bundle root. Large or binary documents carry a URL instead of inline
/// content.
#[derive(Debug, Clone, Serialize)]
pub struct SkillDocument {
    pub path: String,
    pub kind: DocumentKind,
    pub size: u64,
    pub content: Option<String>,
    pub url: Option<String>,
}

/// A named, scoped document bundle indexed for semantic retrieval.
#[derive(Debug, Clone, Serialize)]
pub struct Skill {
    pub name: String,
    /// Text the scoring function embeds; ranking quality lives here.
    pub description: String,
    /// Raw `SKILL.md` text as loaded from the source.
    pub content: String,
    /// Bundled documents in the order they were discovered.
    pub documents: Vec<SkillDocument>,
    /// Origin locator: a local path or a remote URL.
    pub source: String,
    pub scope: SkillScope,
    pub tenant_id: Option<String>,
    pub agent_id: Option<String>,
}

impl Skill {
    /// The composite identity `(name, tenant_id, agent_id)`. Uniqueness in
    /// the index is enforced on this triple, never on name alone.
    pub fn key(&self) -> SkillKey {
        SkillKey {
            name: self.name.clone(),
            tenant_id: self.tenant_id.clone(),
            agent_id: self.agent_id.clone(),
        }
    }

    /// Look up a bundled document by its relative path.
    pub fn document(&self, path: &str) -> Option<&SkillDocument> {
        self.documents.iter().find(|d| d.path == path)
    }
}

/// Composite identity of a skill. Absent `tenant_id`/`agent_id` means the
/// public scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SkillKey {
    pub name: String,
    pub tenant_id: Option<String>,
    pub agent_id: Option<String>,
}

/// A single ranked query result.
#[derive(Debug, Clone, Serialize)]
pub struct QueryHit {
    pub skill: Skill,
    pub score: f32,
}

#[cfg(test)]
pub(crate) fn test_skill(name: &str) -> Skill {
    Skill {
        name: name.to_string(),
        description: format!("{} description", name),
        content: String::new(),
        documents: Vec::new(),
        source: format!("test://{}", name),
        scope: SkillScope::Public,
        tenant_id: None,
        agent_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_distinguishes_tenants() {
        let mut a = test_skill("deploy");
        let mut b = test_skill("deploy");
        a.tenant_id = Some("t1".to_string());
        b.tenant_id = Some("t2".to_string());
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn key_equal_for_same_triple() {
        let a = test_skill("deploy");
        let b = test_skill("deploy");
        assert_eq!(a.key(), b.key());
    }
}
