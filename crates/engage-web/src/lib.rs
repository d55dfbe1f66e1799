//! Axum JSON API over Engage match-run reports.
//!
//! Read paths prefer the hosted database when `DATABASE_URL` is reachable
//! and fall back to the latest run's report files otherwise, so the surface
//! keeps working in fixture-only deployments.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use engage_pipeline::StagedNeedMatches;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tokio::net::TcpListener;

pub const CRATE_NAME: &str = "engage-web";

#[derive(Clone)]
pub struct AppState {
    pub workspace_root: PathBuf,
}

impl AppState {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct OrgsYaml {
    orgs: Vec<OrgRow>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrgRow {
    pub org_id: String,
    pub display_name: String,
    pub enabled: bool,
    pub access: String,
    pub mode: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebNeed {
    pub need_id: String,
    pub org_id: String,
    pub title: String,
    pub effective_preference: String,
    pub categories: Vec<String>,
    pub match_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebMatch {
    pub candidate_id: String,
    pub display_name: Option<String>,
    pub matching_tags: Vec<String>,
    pub availability_score: u32,
    pub total_score: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebNeedMatches {
    pub need_id: String,
    pub title: String,
    pub effective_preference: String,
    pub categories: Vec<String>,
    pub matches: Vec<WebMatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReportRow {
    pub run_id: String,
    pub needs: usize,
    pub matched_pairs: usize,
    pub has_parquet_manifest: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct MatchesDelta {
    needs: Vec<StagedNeedMatches>,
}

#[derive(Debug, Clone)]
struct DashboardData {
    orgs: Vec<OrgRow>,
    needs: Vec<StagedNeedMatches>,
    runs: Vec<RunReportRow>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/orgs", get(orgs_handler))
        .route("/needs", get(needs_handler))
        .route("/needs/{id}/matches", get(need_matches_handler))
        .route("/runs", get(runs_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("ENGAGE_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let state = AppState::new(".");
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    match load_dashboard_data(&state.workspace_root).await {
        Ok(data) => Json(serde_json::json!({
            "total_orgs": data.orgs.len(),
            "total_needs": data.needs.len(),
            "matched_pairs": data.needs.iter().map(|n| n.matches.len()).sum::<usize>(),
            "latest_run_id": data.runs.first().map(|r| r.run_id.clone()),
        }))
        .into_response(),
        Err(err) => server_error(err),
    }
}

async fn health_handler() -> Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

async fn orgs_handler(State(state): State<Arc<AppState>>) -> Response {
    match load_dashboard_data(&state.workspace_root).await {
        Ok(data) => Json(data.orgs).into_response(),
        Err(err) => server_error(err),
    }
}

async fn needs_handler(State(state): State<Arc<AppState>>) -> Response {
    match load_dashboard_data(&state.workspace_root).await {
        Ok(data) => {
            let needs: Vec<WebNeed> = data.needs.iter().map(web_need).collect();
            Json(needs).into_response()
        }
        Err(err) => server_error(err),
    }
}

async fn need_matches_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    match load_dashboard_data(&state.workspace_root).await {
        Ok(data) => {
            if let Some(staged) = data.needs.into_iter().find(|n| n.need_id == id) {
                Json(web_need_matches(&staged)).into_response()
            } else {
                (
                    StatusCode::NOT_FOUND,
                    Json(serde_json::json!({ "error": "need not found", "need_id": id })),
                )
                    .into_response()
            }
        }
        Err(err) => server_error(err),
    }
}

async fn runs_handler(State(state): State<Arc<AppState>>) -> Response {
    match load_dashboard_data(&state.workspace_root).await {
        Ok(data) => Json(data.runs).into_response(),
        Err(err) => server_error(err),
    }
}

fn web_need(staged: &StagedNeedMatches) -> WebNeed {
    WebNeed {
        need_id: staged.need_id.clone(),
        org_id: staged.org_id.clone(),
        title: staged.need_title.clone(),
        effective_preference: staged.effective_preference.as_str().to_string(),
        categories: staged.categories.clone(),
        match_count: staged.matches.len(),
    }
}

fn web_need_matches(staged: &StagedNeedMatches) -> WebNeedMatches {
    WebNeedMatches {
        need_id: staged.need_id.clone(),
        title: staged.need_title.clone(),
        effective_preference: staged.effective_preference.as_str().to_string(),
        categories: staged.categories.clone(),
        matches: staged
            .matches
            .iter()
            .map(|m| WebMatch {
                candidate_id: m.candidate.id.clone(),
                display_name: m.candidate.display_name.clone(),
                matching_tags: m.matching_tags.clone(),
                availability_score: m.availability_score,
                total_score: m.total_score,
            })
            .collect(),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": err.to_string() })),
    )
        .into_response()
}

async fn load_dashboard_data(workspace_root: &Path) -> anyhow::Result<DashboardData> {
    let runs = load_runs(workspace_root, 20)?;
    let db_pool = connect_db_from_env().await;
    let orgs = if let Some(pool) = &db_pool {
        match load_orgs_from_db(pool).await {
            Ok(rows) if !rows.is_empty() => rows,
            _ => load_orgs_from_yaml(workspace_root)?,
        }
    } else {
        load_orgs_from_yaml(workspace_root)?
    };
    let needs = if let Some(pool) = &db_pool {
        match load_latest_needs_from_db(pool).await {
            Ok(rows) if !rows.is_empty() => rows,
            _ => load_latest_needs_from_reports(workspace_root)?,
        }
    } else {
        load_latest_needs_from_reports(workspace_root)?
    };
    Ok(DashboardData { orgs, needs, runs })
}

async fn connect_db_from_env() -> Option<PgPool> {
    let database_url = std::env::var("DATABASE_URL").ok()?;
    PgPool::connect(&database_url).await.ok()
}

fn load_orgs_from_yaml(workspace_root: &Path) -> anyhow::Result<Vec<OrgRow>> {
    let path = workspace_root.join("orgs.yaml");
    let yaml = std::fs::read_to_string(&path)?;
    let parsed: OrgsYaml = serde_yaml::from_str(&yaml)?;
    Ok(parsed.orgs)
}

async fn load_orgs_from_db(pool: &PgPool) -> anyhow::Result<Vec<OrgRow>> {
    let rows = sqlx::query(
        r#"
        SELECT org_id, display_name, enabled, access, mode
          FROM orgs
         ORDER BY org_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(OrgRow {
            org_id: row.try_get("org_id")?,
            display_name: row.try_get("display_name")?,
            enabled: row.try_get("enabled")?,
            access: row.try_get("access")?,
            mode: row.try_get("mode")?,
        });
    }
    Ok(out)
}

fn load_runs(workspace_root: &Path, limit: usize) -> anyhow::Result<Vec<RunReportRow>> {
    let reports_root = workspace_root.join("reports");
    if !reports_root.exists() {
        return Ok(vec![]);
    }
    let mut entries = std::fs::read_dir(&reports_root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .collect::<Vec<_>>();
    entries.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    entries.reverse();

    let mut runs = Vec::new();
    for e in entries.into_iter().take(limit) {
        let run_id = e.file_name().to_string_lossy().to_string();
        let delta_path = e.path().join("matches_delta.json");
        let (needs, matched_pairs) = if delta_path.exists() {
            let delta: MatchesDelta =
                serde_json::from_str(&std::fs::read_to_string(&delta_path)?)?;
            let pairs = delta.needs.iter().map(|n| n.matches.len()).sum();
            (delta.needs.len(), pairs)
        } else {
            (0, 0)
        };
        runs.push(RunReportRow {
            run_id,
            needs,
            matched_pairs,
            has_parquet_manifest: e.path().join("snapshots/manifest.json").exists(),
        });
    }
    Ok(runs)
}

fn load_latest_needs_from_reports(
    workspace_root: &Path,
) -> anyhow::Result<Vec<StagedNeedMatches>> {
    let latest_run = load_runs(workspace_root, 1)?.into_iter().next();
    let Some(run) = latest_run else {
        return Ok(vec![]);
    };
    let delta_path = workspace_root
        .join("reports")
        .join(&run.run_id)
        .join("matches_delta.json");
    if !delta_path.exists() {
        return Ok(vec![]);
    }
    let delta: MatchesDelta = serde_json::from_str(&std::fs::read_to_string(&delta_path)?)?;
    Ok(delta.needs)
}

async fn load_latest_needs_from_db(pool: &PgPool) -> anyhow::Result<Vec<StagedNeedMatches>> {
    let rows = sqlx::query(
        r#"
        SELECT n.need_id,
               COALESCE(o.org_id, '') AS org_id,
               n.title,
               nr.data_json
          FROM needs n
          LEFT JOIN orgs o ON o.id = n.org_id
          LEFT JOIN need_match_results nr ON nr.id = n.latest_match_result_id
         ORDER BY n.updated_at DESC, n.created_at DESC
         LIMIT 500
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let data_json: Option<serde_json::Value> = row.try_get("data_json")?;
        if let Some(value) = data_json {
            if let Ok(staged) = serde_json::from_value::<StagedNeedMatches>(value) {
                out.push(staged);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .unwrap()
    }

    async fn body_text(resp: Response) -> String {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn handler_smoke_get_index() {
        let app = app(AppState::new(workspace_root()));
        let resp = app
            .oneshot(axum::http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let text = body_text(resp).await;
        assert!(text.contains("total_orgs"));
    }

    #[tokio::test]
    async fn handler_smoke_health_and_orgs() {
        let app = app(AppState::new(workspace_root()));
        let health = app
            .clone()
            .oneshot(axum::http::Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let orgs = app
            .oneshot(axum::http::Request::builder().uri("/orgs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(orgs.status(), StatusCode::OK);
        let text = body_text(orgs).await;
        assert!(text.contains("grace-community"));
    }

    #[tokio::test]
    async fn unknown_need_returns_not_found() {
        let app = app(AppState::new(workspace_root()));
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/needs/nope/matches")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn needs_and_matches_read_from_the_latest_run_report() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        std::fs::write(
            root.join("orgs.yaml"),
            "orgs:\n  - org_id: grace-community\n    display_name: Grace Community Church\n    enabled: true\n    access: Fixture\n    mode: fixture\n",
        )
        .unwrap();
        let run_dir = root.join("reports/run-1");
        std::fs::create_dir_all(&run_dir).unwrap();
        std::fs::write(
            run_dir.join("matches_delta.json"),
            serde_json::json!({
                "match_run": { "status": "completed" },
                "needs": [{
                    "org_id": "grace-community",
                    "need_id": "need-meal-train",
                    "need_title": "Meal Train",
                    "need_description": "Deliver dinners.",
                    "effective_preference": "Mornings",
                    "categories": ["meals"],
                    "matches": [{
                        "candidate": {
                            "id": "prof-ana",
                            "display_name": "Ana Reyes",
                            "contact": "ana@example.org",
                            "gift_tags": ["Cooking"],
                            "availability": ["Mornings"]
                        },
                        "gift_overlap_count": 1,
                        "matching_tags": ["Cooking"],
                        "availability_score": 3,
                        "availability_compatible": true,
                        "total_score": 5
                    }],
                    "notifications": []
                }],
                "duplicate_review": []
            })
            .to_string(),
        )
        .unwrap();

        let app = app(AppState::new(root));
        let needs = app
            .clone()
            .oneshot(axum::http::Request::builder().uri("/needs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(needs.status(), StatusCode::OK);
        let text = body_text(needs).await;
        assert!(text.contains("need-meal-train"));
        assert!(text.contains("\"match_count\":1"));

        let matches = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/needs/need-meal-train/matches")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(matches.status(), StatusCode::OK);
        let text = body_text(matches).await;
        assert!(text.contains("prof-ana"));
        assert!(text.contains("\"total_score\":5"));
    }
}
