//! HTTP server for the skill index.
//!
//! Exposes querying, skill management, and status over a JSON API suitable
//! for integration with agent runtimes. The server is a thin adapter over
//! [`SkillService`]; no index or storage logic lives here.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/skills/query` | Rank skills against a task description |
//! | `POST` | `/skills/upload` | Upload a ZIP of skill bundles (base64) |
//! | `POST` | `/skills/upload-from-github` | Register skills from a GitHub repo |
//! | `DELETE` | `/skills/{name}` | Remove a skill from index and storage |
//! | `GET`  | `/skills/list` | List indexed skills |
//! | `GET`  | `/skills/stored` | List uploaded bundles on disk |
//! | `GET`  | `/skills/status` | Loading-state snapshot |
//! | `GET`  | `/health` | Health check with version and usage counters |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "text must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `loading` (409),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::loader::download_github_zip;
use crate::models::{Skill, SkillScope};
use crate::paths::ContainmentError;
use crate::service::SkillService;
use crate::status::LoadingStatus;
use crate::storage::StoredBundle;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    service: Arc<SkillService>,
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process terminates.
pub async fn run_server(service: Arc<SkillService>) -> anyhow::Result<()> {
    let bind_addr = service.config().server.bind.clone();
    let state = AppState { service };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/skills/query", post(handle_query))
        .route("/skills/upload", post(handle_upload))
        .route("/skills/upload-from-github", post(handle_upload_from_github))
        .route("/skills/{name}", delete(handle_delete))
        .route("/skills/list", get(handle_list))
        .route("/skills/stored", get(handle_stored))
        .route("/skills/status", get(handle_status))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!(bind = %bind_addr, "skill server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"loading"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// 409 while the initial background load is still in progress.
fn loading(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "loading".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Map service errors to the most appropriate HTTP status. Containment
/// violations and malformed archives are the client's fault; everything
/// else is a 500.
fn classify_error(err: anyhow::Error) -> AppError {
    if err.downcast_ref::<ContainmentError>().is_some() {
        return bad_request(err.to_string());
    }
    let msg = err.to_string();
    if msg.contains("not found") {
        not_found(msg)
    } else if msg.contains("not a valid ZIP")
        || msg.contains("no SKILL.md")
        || msg.contains("unsafe member path")
        || msg.contains("no valid skills")
    {
        bad_request(msg)
    } else {
        internal(msg)
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    skills_loaded: usize,
    loading_complete: bool,
    refresh_enabled: bool,
    api_calls_this_hour: u32,
    api_limit_per_hour: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    recent_errors: Vec<String>,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.service.status();
    let usage = state.service.checker().api_usage();
    let recent_errors = status.errors.iter().rev().take(5).rev().cloned().collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        skills_loaded: state.service.indexed_count(),
        loading_complete: status.complete,
        refresh_enabled: state.service.config().refresh.enabled,
        api_calls_this_hour: usage.calls_this_hour,
        api_limit_per_hour: usage.limit_per_hour,
        recent_errors,
    })
}

// ============ GET /skills/status ============

async fn handle_status(State(state): State<AppState>) -> Json<LoadingStatus> {
    Json(state.service.status())
}

// ============ POST /skills/query ============

#[derive(Deserialize)]
struct QueryRequest {
    text: String,
    top_k: Option<usize>,
    allowed_names: Option<Vec<String>>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let response = state
        .service
        .query(&request.text, request.top_k, request.allowed_names.as_deref())
        .await
        .map_err(classify_error)?;

    Ok(Json(serde_json::json!({ "result": response })))
}

// ============ GET /skills/list ============

#[derive(Serialize)]
struct SkillSummary {
    name: String,
    description: String,
    source: String,
    scope: SkillScope,
    tenant_id: Option<String>,
    agent_id: Option<String>,
    document_count: usize,
}

#[derive(Serialize)]
struct ListResponse {
    skills: Vec<SkillSummary>,
    count: usize,
}

async fn handle_list(State(state): State<AppState>) -> Json<ListResponse> {
    let skills: Vec<SkillSummary> = state
        .service
        .skills()
        .into_iter()
        .map(|s| SkillSummary {
            name: s.name,
            description: s.description,
            source: s.source,
            scope: s.scope,
            tenant_id: s.tenant_id,
            agent_id: s.agent_id,
            document_count: s.documents.len(),
        })
        .collect();
    let count = skills.len();

    Json(ListResponse { skills, count })
}

// ============ GET /skills/stored ============

#[derive(Deserialize)]
struct StoredQuery {
    tenant_id: Option<String>,
}

#[derive(Serialize)]
struct StoredResponse {
    skills: Vec<StoredBundle>,
    count: usize,
}

async fn handle_stored(
    State(state): State<AppState>,
    Query(query): Query<StoredQuery>,
) -> Result<Json<StoredResponse>, AppError> {
    let skills = state
        .service
        .store()
        .list(query.tenant_id.as_deref())
        .map_err(classify_error)?;
    let count = skills.len();
    Ok(Json(StoredResponse { skills, count }))
}

// ============ POST /skills/upload ============

#[derive(Deserialize)]
struct UploadRequest {
    /// ZIP archive containing one or more `SKILL.md` bundles.
    archive_base64: String,
    tenant_id: Option<String>,
    agent_id: Option<String>,
}

#[derive(Serialize)]
struct UploadResponse {
    status: String,
    skills_added: Vec<String>,
    total_skills: usize,
}

async fn handle_upload(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    if !state.service.is_ready() {
        return Err(loading("skill loading in progress, try again shortly"));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(request.archive_base64.as_bytes())
        .map_err(|e| bad_request(format!("invalid base64 archive: {}", e)))?;
    if bytes.is_empty() {
        return Err(bad_request("uploaded archive is empty"));
    }

    install_archive(
        &state,
        &bytes,
        request.tenant_id.as_deref(),
        request.agent_id.as_deref(),
    )
    .await
}

/// Shared tail of both upload paths: extract to storage, tag, reindex.
async fn install_archive(
    state: &AppState,
    zip_bytes: &[u8],
    tenant_id: Option<&str>,
    agent_id: Option<&str>,
) -> Result<Json<UploadResponse>, AppError> {
    let skills = state
        .service
        .store()
        .store_archive(zip_bytes, tenant_id, agent_id)
        .map_err(classify_error)?;

    let skill_names: Vec<String> = skills.iter().map(|s| s.name.clone()).collect();
    let total_skills = state
        .service
        .upsert_skills(skills)
        .await
        .map_err(classify_error)?;

    tracing::info!(added = skill_names.len(), total = total_skills, "skills uploaded");
    Ok(Json(UploadResponse {
        status: "ok".to_string(),
        skills_added: skill_names,
        total_skills,
    }))
}

// ============ POST /skills/upload-from-github ============

#[derive(Deserialize)]
struct GithubUploadRequest {
    url: String,
    tenant_id: Option<String>,
    agent_id: Option<String>,
}

async fn handle_upload_from_github(
    State(state): State<AppState>,
    Json(request): Json<GithubUploadRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    if !state.service.is_ready() {
        return Err(loading("skill loading in progress, try again shortly"));
    }

    let (repo, branch) = parse_github_url(&request.url)
        .ok_or_else(|| bad_request(format!("invalid GitHub repository URL: {}", request.url)))?;

    let token = state.service.config().refresh.github_token.clone();
    let bytes = download_github_zip(&repo, &branch, token.as_deref())
        .await
        .map_err(classify_error)?;

    install_archive(
        &state,
        &bytes,
        request.tenant_id.as_deref(),
        request.agent_id.as_deref(),
    )
    .await
}

/// Extract `owner/repo` and branch from a GitHub URL. Accepts a bare repo
/// URL or a `/tree/<branch>` form; the branch defaults to `main`.
fn parse_github_url(url: &str) -> Option<(String, String)> {
    let rest = url
        .strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("http://github.com/"))?;
    let parts: Vec<&str> = rest.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return None;
    }

    let repo = format!("{}/{}", parts[0], parts[1].trim_end_matches(".git"));
    let branch = if parts.len() > 3 && parts[2] == "tree" {
        parts[3].to_string()
    } else {
        "main".to_string()
    };
    Some((repo, branch))
}

// ============ DELETE /skills/{name} ============

#[derive(Deserialize)]
struct DeleteQuery {
    tenant_id: Option<String>,
    agent_id: Option<String>,
}

#[derive(Serialize)]
struct DeleteResponse {
    skill_name: String,
    total_skills: usize,
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<DeleteResponse>, AppError> {
    if !state.service.is_ready() {
        return Err(loading("skill loading in progress, try again shortly"));
    }

    let tenant_id = query.tenant_id.as_deref();
    let agent_id = query.agent_id.as_deref();

    let indexed = state.service.skills().iter().any(|s: &Skill| {
        s.name == name && s.tenant_id.as_deref() == tenant_id && s.agent_id.as_deref() == agent_id
    });
    let stored = state
        .service
        .store()
        .delete_bundle(&name, tenant_id)
        .map_err(classify_error)?;

    if !indexed && !stored {
        return Err(not_found(format!("skill '{}' not found", name)));
    }

    let total_skills = state
        .service
        .remove_skill(&name, tenant_id, agent_id)
        .await
        .map_err(classify_error)?;

    tracing::info!(skill = %name, total = total_skills, "skill deleted");
    Ok(Json(DeleteResponse {
        skill_name: name,
        total_skills,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_github_url_variants() {
        assert_eq!(
            parse_github_url("https://github.com/acme/skills"),
            Some(("acme/skills".to_string(), "main".to_string()))
        );
        assert_eq!(
            parse_github_url("https://github.com/acme/skills.git"),
            Some(("acme/skills".to_string(), "main".to_string()))
        );
        assert_eq!(
            parse_github_url("https://github.com/acme/skills/tree/develop"),
            Some(("acme/skills".to_string(), "develop".to_string()))
        );
        assert_eq!(
            parse_github_url("https://github.com/acme/skills/tree/develop/sub/path"),
            Some(("acme/skills".to_string(), "develop".to_string()))
        );
    }

    #[test]
    fn parse_github_url_rejects_garbage() {
        assert!(parse_github_url("https://example.com/acme/skills").is_none());
        assert!(parse_github_url("https://github.com/only-owner").is_none());
        assert!(parse_github_url("not a url").is_none());
    }
}
