use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::api::extract::{Json, Path, Query};
use crate::api::jobs::{change_job_status, delete_job, parse_job_status};
use crate::auth::models::{AuthenticatedUser, Role, UserStatus};
use crate::db::models::{
    timestamp, ApplicationStatus, Job, JobStatus, NotificationKind, RosterPerson, UserView,
};
use crate::db::report_repository::{CompanyJobCount, MonthCount, StatusCount};
use crate::db::user_repository::UserFilter;
use crate::error::AppError;
use crate::services::notify::fan_out;
use crate::services::roster::leave_roster;
use crate::state::{AppState, Repositories};

const TOP_COMPANIES: i64 = 5;
const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub role: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserStatusRequest {
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct YearQuery {
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BroadcastResponse {
    pub recipients: usize,
}

#[derive(Debug, Serialize)]
pub struct CompanySummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub company_name: String,
    pub industry: String,
    pub owner: Option<RosterPerson>,
    pub employee_count: usize,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct JobStats {
    pub by_status: Vec<StatusCount>,
    pub top_companies: Vec<CompanyJobCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthBucket {
    pub month: u32,
    pub label: &'static str,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct MonthlyApplications {
    pub year: i32,
    pub months: Vec<MonthBucket>,
    pub totals: Vec<StatusCount>,
}

fn require_admin(caller: &AuthenticatedUser) -> Result<(), AppError> {
    caller.require_role(Role::Admin)
}

/// One entry per known status, in declaration order, missing ones as zero.
fn zero_filled(known: &[&str], counts: &[StatusCount]) -> Vec<StatusCount> {
    known
        .iter()
        .map(|status| StatusCount {
            status: status.to_string(),
            count: counts
                .iter()
                .filter(|c| c.status == *status)
                .map(|c| c.count)
                .sum(),
        })
        .collect()
}

/// Twelve buckets, January first, whatever months the data covers.
pub fn monthly_buckets(counts: &[MonthCount]) -> Vec<MonthBucket> {
    (1..=12u32)
        .zip(MONTH_LABELS)
        .map(|(month, label)| MonthBucket {
            month,
            label,
            count: counts
                .iter()
                .filter(|c| c.month == month)
                .map(|c| c.count)
                .sum(),
        })
        .collect()
}

pub async fn process_list_users(
    repos: &Repositories,
    query: UserListQuery,
) -> Result<Vec<UserView>, AppError> {
    let role = match query.role.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(r) => Some(
            Role::from_str_ci(r)
                .ok_or_else(|| AppError::BadRequest(format!("Invalid role '{r}'")))?,
        ),
    };
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => Some(
            UserStatus::from_str_ci(s)
                .ok_or_else(|| AppError::BadRequest(format!("Invalid status '{s}'")))?,
        ),
    };
    let users = repos.users.list(UserFilter { role, status }).await?;
    Ok(users.iter().map(UserView::from).collect())
}

pub async fn process_set_user_status(
    repos: &Repositories,
    caller: &AuthenticatedUser,
    user_id: &str,
    request: UserStatusRequest,
) -> Result<UserView, AppError> {
    let status = match UserStatus::from_str_ci(&request.status) {
        Some(status @ (UserStatus::Active | UserStatus::Suspended)) => status,
        _ => {
            return Err(AppError::BadRequest(format!(
                "Invalid status '{}'. Expected: active, suspended",
                request.status
            )))
        }
    };
    if user_id == caller.user_id && status == UserStatus::Suspended {
        return Err(AppError::BadRequest("You cannot suspend yourself".into()));
    }

    let mut user = repos
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    repos.users.set_status(user_id, status).await?;
    user.status = status;
    tracing::info!(user_id, %status, admin = %caller.user_id, "User status changed");
    Ok(UserView::from(&user))
}

/// Delete an account and everything hanging off it.
pub async fn process_delete_user(
    repos: &Repositories,
    caller: &AuthenticatedUser,
    user_id: &str,
) -> Result<(), AppError> {
    if user_id == caller.user_id {
        return Err(AppError::BadRequest("You cannot delete yourself".into()));
    }
    let user = repos
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    match user.role {
        Role::Student => {
            let applications = repos.applications.delete_by_student(user_id).await?;
            repos.students.delete_by_user_id(user_id).await?;
            tracing::info!(user_id, applications, "Removed student profile");
        }
        Role::Company => {
            if let Some(member) = repos.members.find_by_user_id(user_id).await? {
                leave_roster(repos.rosters.as_ref(), &member.roster_id, user_id).await?;
                repos.members.delete_by_user_id(user_id).await?;
            }
        }
        Role::Admin => {}
    }

    repos.notifications.delete_for(user_id).await?;
    repos.users.delete(user_id).await?;
    tracing::info!(user_id, role = %user.role, admin = %caller.user_id, "User deleted");
    Ok(())
}

pub async fn process_list_companies(repos: &Repositories) -> Result<Vec<CompanySummary>, AppError> {
    let rosters = repos.rosters.list_all().await?;
    Ok(rosters
        .into_iter()
        .map(|roster| CompanySummary {
            employee_count: roster.member_ids().len(),
            id: roster.id,
            company_name: roster.company_name,
            industry: roster.industry,
            owner: roster.owner,
            created_at: roster.created_at,
        })
        .collect())
}

pub async fn process_job_stats(repos: &Repositories) -> Result<JobStats, AppError> {
    let counts = repos.reports.job_status_counts().await?;
    let known: Vec<&str> = JobStatus::ALL.iter().map(JobStatus::as_str).collect();
    Ok(JobStats {
        by_status: zero_filled(&known, &counts),
        top_companies: repos.reports.top_companies_by_jobs(TOP_COMPANIES).await?,
    })
}

pub async fn process_monthly_applications(
    repos: &Repositories,
    year: i32,
) -> Result<MonthlyApplications, AppError> {
    if !(1970..=9999).contains(&year) {
        return Err(AppError::BadRequest(format!("Invalid year {year}")));
    }
    let months = repos.reports.monthly_application_counts(year).await?;
    let statuses = repos.reports.application_status_counts(year).await?;
    let known: Vec<&str> = ApplicationStatus::ALL
        .iter()
        .map(ApplicationStatus::as_str)
        .collect();

    Ok(MonthlyApplications {
        year,
        months: monthly_buckets(&months),
        totals: zero_filled(&known, &statuses),
    })
}

/// One `system` notification per active user, optionally limited to a role.
pub async fn process_broadcast(
    repos: &Repositories,
    request: BroadcastRequest,
) -> Result<BroadcastResponse, AppError> {
    let title = request.title.trim();
    let message = request.message.trim();
    if title.is_empty() || message.is_empty() {
        return Err(AppError::BadRequest("Title and message are required".into()));
    }
    let role = match request.role.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(r) => Some(
            Role::from_str_ci(r)
                .ok_or_else(|| AppError::BadRequest(format!("Invalid role '{r}'")))?,
        ),
    };

    let recipients: Vec<String> = repos
        .users
        .list(UserFilter {
            role,
            status: Some(UserStatus::Active),
        })
        .await?
        .into_iter()
        .map(|u| u.id)
        .collect();

    fan_out(
        repos.notifications.as_ref(),
        &recipients,
        NotificationKind::System,
        title,
        message,
        None,
    )
    .await;
    tracing::info!(recipients = recipients.len(), ?role, "Broadcast sent");

    Ok(BroadcastResponse {
        recipients: recipients.len(),
    })
}

// -- Handlers --

/// `GET /api/admin/users`
pub async fn list_users_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Vec<UserView>>, AppError> {
    require_admin(&caller)?;
    Ok(Json(process_list_users(&state.repos, query).await?))
}

/// `PATCH /api/admin/users/{id}/status`
pub async fn user_status_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(user_id): Path<String>,
    Json(request): Json<UserStatusRequest>,
) -> Result<Json<UserView>, AppError> {
    require_admin(&caller)?;
    Ok(Json(
        process_set_user_status(&state.repos, &caller, &user_id, request).await?,
    ))
}

/// `DELETE /api/admin/users/{id}`
pub async fn delete_user_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(user_id): Path<String>,
) -> Result<StatusCode, AppError> {
    require_admin(&caller)?;
    process_delete_user(&state.repos, &caller, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/admin/jobs`
pub async fn list_jobs_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Query(query): Query<JobListQuery>,
) -> Result<Json<Vec<Job>>, AppError> {
    require_admin(&caller)?;
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => Some(parse_job_status(s)?),
    };
    Ok(Json(state.repos.jobs.list_all(status).await?))
}

/// `PATCH /api/admin/jobs/{id}/status`
pub async fn job_status_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(job_id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Job>, AppError> {
    require_admin(&caller)?;
    let status = parse_job_status(&request.status)?;
    let job = state
        .repos
        .jobs
        .find_by_id(&job_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Job not found".into()))?;
    Ok(Json(change_job_status(&state.repos, job, status).await?))
}

/// `DELETE /api/admin/jobs/{id}`
pub async fn delete_job_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(job_id): Path<String>,
) -> Result<StatusCode, AppError> {
    require_admin(&caller)?;
    delete_job(&state.repos, &job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/admin/companies`
pub async fn list_companies_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> Result<Json<Vec<CompanySummary>>, AppError> {
    require_admin(&caller)?;
    Ok(Json(process_list_companies(&state.repos).await?))
}

/// `GET /api/admin/stats/jobs`
pub async fn job_stats_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> Result<Json<JobStats>, AppError> {
    require_admin(&caller)?;
    Ok(Json(process_job_stats(&state.repos).await?))
}

/// `GET /api/admin/stats/applications/monthly`
pub async fn monthly_applications_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Query(query): Query<YearQuery>,
) -> Result<Json<MonthlyApplications>, AppError> {
    require_admin(&caller)?;
    let year = query.year.unwrap_or_else(|| Utc::now().year());
    Ok(Json(process_monthly_applications(&state.repos, year).await?))
}

/// `POST /api/admin/notifications/broadcast`
pub async fn broadcast_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Json(request): Json<BroadcastRequest>,
) -> Result<Json<BroadcastResponse>, AppError> {
    require_admin(&caller)?;
    Ok(Json(process_broadcast(&state.repos, request).await?))
}
