use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::api::extract::{Json, Path};
use crate::auth::models::Role;
use crate::db::models::JobStatus;
use crate::db::user_repository::UserFilter;
use crate::error::AppError;
use crate::services::uploads::content_type_for;
use crate::state::{AppState, Repositories};
use crate::storage::client::validate_key;

/// Landing page counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicStats {
    pub students: u64,
    pub companies: u64,
    pub open_jobs: u64,
    pub applications: u64,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn process_public_stats(repos: &Repositories) -> Result<PublicStats, AppError> {
    Ok(PublicStats {
        students: repos
            .users
            .count(UserFilter {
                role: Some(Role::Student),
                status: None,
            })
            .await?,
        companies: repos.rosters.count().await?,
        open_jobs: repos.jobs.count_by_status(JobStatus::Open).await?,
        applications: repos.applications.count_all().await?,
    })
}

/// `GET /api/stats/public`
pub async fn public_stats_handler(
    State(state): State<AppState>,
) -> Result<Json<PublicStats>, AppError> {
    Ok(Json(process_public_stats(&state.repos).await?))
}

/// `GET /health`
pub async fn health_handler() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /uploads/{*key}`
///
/// Serves a stored upload with a content type inferred from its extension.
pub async fn serve_upload_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    if key.split('/').any(|segment| segment == "..") {
        return Err(AppError::BadRequest("Invalid upload path".into()));
    }
    validate_key(&key)?;

    let data = state
        .storage
        .get_object(&key)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".into()))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(&key)),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        data,
    )
        .into_response())
}
