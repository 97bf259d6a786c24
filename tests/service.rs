//! End-to-end tests for the service context: background ingestion, queries
//! during and after loading, mutations, and status reporting, all against
//! the deterministic hash embedder and tempdir-backed sources.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use skillbox::config::{Config, IndexConfig, QueryConfig, RefreshConfig, ServerConfig, SourceSpec, StorageConfig};
use skillbox::models::{Skill, SkillScope};
use skillbox::service::SkillService;

const SKILL_TEMPLATE: &str = "---\nname: NAME\ndescription: NAME does things\n---\n\nBody of NAME.\n";

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

fn test_config(sources: Vec<SourceSpec>, storage_root: &Path) -> Config {
    Config {
        index: IndexConfig::default(),
        sources,
        storage: StorageConfig {
            root: storage_root.to_path_buf(),
        },
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
        refresh: RefreshConfig::default(),
        query: QueryConfig::default(),
    }
}

fn test_skill(name: &str) -> Skill {
    Skill {
        name: name.to_string(),
        description: format!("{} does things", name),
        content: String::new(),
        documents: Vec::new(),
        source: format!("test://{}", name),
        scope: SkillScope::Public,
        tenant_id: None,
        agent_id: None,
    }
}

async fn wait_until_ready(service: &SkillService) {
    let start = std::time::Instant::now();
    while !service.is_ready() {
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "loading did not complete in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn ingestion_across_two_sources() {
    let s1 = tempfile::tempdir().unwrap();
    write_skill(s1.path(), "a");
    write_skill(s1.path(), "b");
    let s2 = tempfile::tempdir().unwrap();
    write_skill(s2.path(), "c");
    let storage = tempfile::tempdir().unwrap();

    let service = SkillService::new(test_config(
        vec![local_source(s1.path()), local_source(s2.path())],
        storage.path(),
    ))
    .unwrap();
    service.start().await;
    wait_until_ready(&service).await;

    let mut names: Vec<String> = service.skills().into_iter().map(|s| s.name).collect();
    names.sort();
    assert_eq!(names, vec!["a", "b", "c"]);

    let status = service.status();
    assert_eq!(status.loaded, 3);
    assert_eq!(status.total, 3);
    assert!(status.complete);
    assert!(status.errors.is_empty());

    service.stop().await;
}

#[tokio::test]
async fn query_returns_ranked_hits_after_load() {
    let src = tempfile::tempdir().unwrap();
    let dir = src.path().join("csv");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("SKILL.md"),
        "---\nname: csv-analysis\ndescription: analyze csv files with pandas\n---\n",
    )
    .unwrap();
    write_skill(src.path(), "unrelated");
    let storage = tempfile::tempdir().unwrap();

    let service =
        SkillService::new(test_config(vec![local_source(src.path())], storage.path())).unwrap();
    service.start().await;
    wait_until_ready(&service).await;

    let response = service.query("analyze csv data", Some(2), None).await.unwrap();
    assert_eq!(response.hits.len(), 2);
    assert_eq!(response.hits[0].skill.name, "csv-analysis");
    assert!(response.loading.is_none());

    // Empty query text is not an error.
    let empty = service.query("   ", None, None).await.unwrap();
    assert!(empty.hits.is_empty());

    service.stop().await;
}

#[tokio::test]
async fn upsert_overlays_by_composite_key() {
    let storage = tempfile::tempdir().unwrap();
    let service = SkillService::new(test_config(Vec::new(), storage.path())).unwrap();
    service.start().await;
    wait_until_ready(&service).await;

    service.upsert_skills(vec![test_skill("a")]).await.unwrap();

    let mut replacement = test_skill("a");
    replacement.description = "a replaced".to_string();
    let total = service.upsert_skills(vec![replacement]).await.unwrap();

    assert_eq!(total, 1);
    assert_eq!(service.skills()[0].description, "a replaced");
    assert!(service.status().complete);

    service.stop().await;
}

#[tokio::test]
async fn remove_requires_exact_identity() {
    let storage = tempfile::tempdir().unwrap();
    let service = SkillService::new(test_config(Vec::new(), storage.path())).unwrap();
    service.start().await;
    wait_until_ready(&service).await;

    let mut t1 = test_skill("x");
    t1.tenant_id = Some("t1".to_string());
    let mut t2 = test_skill("x");
    t2.tenant_id = Some("t2".to_string());
    service.upsert_skills(vec![t1, t2]).await.unwrap();

    // Removing (x, t1, None) must not touch (x, t2, None).
    let total = service.remove_skill("x", Some("t1"), None).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(service.skills()[0].tenant_id.as_deref(), Some("t2"));

    // Removing the last skill leaves an empty, queryable index.
    service.remove_skill("x", Some("t2"), None).await.unwrap();
    let response = service.query("anything", None, None).await.unwrap();
    assert!(response.hits.is_empty());
    assert!(service.status().complete);

    service.stop().await;
}

#[tokio::test]
async fn uploaded_archive_lands_in_index_and_storage() {
    let storage = tempfile::tempdir().unwrap();
    let service = SkillService::new(test_config(Vec::new(), storage.path())).unwrap();
    service.start().await;
    wait_until_ready(&service).await;

    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default();
        writer
            .start_file("report/SKILL.md", options)
            .unwrap();
        writer
            .write_all(SKILL_TEMPLATE.replace("NAME", "report").as_bytes())
            .unwrap();
        writer.finish().unwrap();
    }

    let skills = service
        .store()
        .store_archive(&buf.into_inner(), Some("t1"), None)
        .unwrap();
    assert_eq!(skills.len(), 1);
    assert_eq!(skills[0].scope, SkillScope::Tenant);

    let total = service.upsert_skills(skills).await.unwrap();
    assert_eq!(total, 1);

    let stored = service.store().list(Some("t1")).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name, "report");

    let response = service.query("report does things", Some(1), None).await.unwrap();
    assert_eq!(response.hits[0].skill.name, "report");
    assert_eq!(response.hits[0].skill.tenant_id.as_deref(), Some("t1"));

    service.stop().await;
}

#[tokio::test]
async fn failing_source_reports_error_but_completes() {
    let good = tempfile::tempdir().unwrap();
    write_skill(good.path(), "survivor");
    let storage = tempfile::tempdir().unwrap();

    let missing = SourceSpec::Local {
        path: "/nonexistent/skillbox-service-test".into(),
        include_globs: vec!["**/SKILL.md".to_string()],
        exclude_globs: Vec::new(),
    };

    let service = SkillService::new(test_config(
        vec![missing, local_source(good.path())],
        storage.path(),
    ))
    .unwrap();
    service.start().await;
    wait_until_ready(&service).await;

    assert_eq!(service.indexed_count(), 1);
    let status = service.status();
    assert!(status.complete);
    assert_eq!(status.errors.len(), 1);

    service.stop().await;
}

#[tokio::test]
async fn allowed_names_scope_query_results() {
    let storage = tempfile::tempdir().unwrap();
    let service = SkillService::new(test_config(Vec::new(), storage.path())).unwrap();
    service.start().await;
    wait_until_ready(&service).await;

    service
        .upsert_skills(vec![test_skill("allowed"), test_skill("forbidden")])
        .await
        .unwrap();

    let allowed = vec!["allowed".to_string()];
    let response = service
        .query("does things", Some(5), Some(&allowed))
        .await
        .unwrap();
    assert_eq!(response.hits.len(), 1);
    assert_eq!(response.hits[0].skill.name, "allowed");

    service.stop().await;
}
