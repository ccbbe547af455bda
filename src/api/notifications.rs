use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::api::extract::{Json, Path, Query};
use crate::auth::models::AuthenticatedUser;
use crate::db::models::Notification;
use crate::db::notification_repository::NotificationRepository;
use crate::error::AppError;
use crate::state::AppState;

pub const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

pub async fn process_list(
    notifications: &dyn NotificationRepository,
    caller: &AuthenticatedUser,
    query: ListQuery,
) -> Result<Vec<Notification>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    notifications
        .list_for(&caller.user_id, query.unread_only, limit)
        .await
}

/// Someone else's notification id is reported as missing.
pub async fn process_mark_read(
    notifications: &dyn NotificationRepository,
    caller: &AuthenticatedUser,
    id: &str,
) -> Result<(), AppError> {
    if notifications.mark_read(id, &caller.user_id).await? {
        Ok(())
    } else {
        Err(AppError::NotFound("Notification not found".into()))
    }
}

pub async fn process_delete(
    notifications: &dyn NotificationRepository,
    caller: &AuthenticatedUser,
    id: &str,
) -> Result<(), AppError> {
    if notifications.delete(id, &caller.user_id).await? {
        Ok(())
    } else {
        Err(AppError::NotFound("Notification not found".into()))
    }
}

// -- Handlers --

/// `GET /api/notifications`
pub async fn list_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Notification>>, AppError> {
    Ok(Json(
        process_list(state.repos.notifications.as_ref(), &caller, query).await?,
    ))
}

/// `GET /api/notifications/unread-count`
pub async fn unread_count_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> Result<Json<UnreadCount>, AppError> {
    let count = state
        .repos
        .notifications
        .unread_count(&caller.user_id)
        .await?;
    Ok(Json(UnreadCount { count }))
}

/// `PATCH /api/notifications/{id}/read`
pub async fn mark_read_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    process_mark_read(state.repos.notifications.as_ref(), &caller, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PATCH /api/notifications/read-all`
pub async fn mark_all_read_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> Result<Json<MarkedRead>, AppError> {
    let updated = state
        .repos
        .notifications
        .mark_all_read(&caller.user_id)
        .await?;
    Ok(Json(MarkedRead { updated }))
}

/// `DELETE /api/notifications/{id}`
pub async fn delete_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    process_delete(state.repos.notifications.as_ref(), &caller, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
