use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::indexer;
use crate::models::{CreateRepoRequest, Repo};
use crate::state::AppState;

/// GET /api/repos - List all registered repos
pub async fn list_repos(
    State(state): State<AppState>,
) -> Result<Json<Vec<Repo>>, (StatusCode, String)> {
    let repos = state
        .db
        .list_repos()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;
    Ok(Json(repos))
}

/// GET /api/repos/:id - Fetch one repo, 404 if unknown
pub async fn get_repo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Repo>, (StatusCode, String)> {
    let repo = state
        .db
        .get_repo(id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;
    match repo {
        Some(repo) => Ok(Json(repo)),
        None => Err((StatusCode::NOT_FOUND, "Repo not found".to_string())),
    }
}

/// POST /api/repos - Register a repo and index it in the background
pub async fn create_repo(
    State(state): State<AppState>,
    Json(req): Json<CreateRepoRequest>,
) -> Result<(StatusCode, Json<Repo>), (StatusCode, String)> {
    let owner = req.owner.trim().to_string();
    let name = req.name.trim().to_string();
    if owner.is_empty() || name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Owner and name are required".to_string(),
        ));
    }
    if owner.contains('/') || name.contains('/') {
        return Err((
            StatusCode::BAD_REQUEST,
            "Owner and name must not contain '/'".to_string(),
        ));
    }

    let full_name = format!("{owner}/{name}");
    let existing = state
        .db
        .get_repo_by_full_name(&full_name)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;
    if existing.is_some() {
        return Err((
            StatusCode::CONFLICT,
            format!("Repo {full_name} has already been added"),
        ));
    }

    let clone_url = format!("https://github.com/{full_name}.git");
    let repo = state
        .db
        .create_repo(&owner, &name, &clone_url, "main")
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;

    // Index in the background; status lands in the repos table.
    let task_state = state.clone();
    let task_repo = repo.clone();
    tokio::spawn(async move {
        if let Err(e) = indexer::index_repo(
            &task_state.db,
            task_state.llm.clone(),
            task_state.fetcher.clone(),
            &task_repo,
        )
        .await
        {
            tracing::error!("Indexing {} failed: {e:#}", task_repo.full_name);
        }
    });

    Ok((StatusCode::CREATED, Json(repo)))
}

/// DELETE /api/repos/:id - Remove a repo and all derived rows
pub async fn delete_repo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, String)> {
    let deleted = state
        .db
        .delete_repo(id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;
    if !deleted {
        return Err((StatusCode::NOT_FOUND, "Repo not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
