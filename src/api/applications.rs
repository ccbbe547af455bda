use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::companies::{company_context, CompanyContext};
use crate::api::extract::{Json, Path, Query};
use crate::api::students::load_student;
use crate::auth::models::{AuthenticatedUser, Role};
use crate::db::models::{
    new_id, Application, ApplicationStatus, NotificationKind, ScreeningAnswer, Student,
};
use crate::error::AppError;
use crate::services::export::applications_csv;
use crate::services::notify::{fan_out, send_mail};
use crate::state::{AppState, Repositories};

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    pub job_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub screening_answers: Vec<ScreeningAnswer>,
    /// Key of an uploaded resume. Defaults to the profile resume.
    #[serde(default)]
    pub resume: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompanyApplicationsQuery {
    pub status: Option<String>,
}

/// An application with the applicant's profile, for the company view.
#[derive(Debug, Serialize)]
pub struct Applicant {
    #[serde(flatten)]
    pub application: Application,
    pub student: Option<Student>,
}

pub fn parse_application_status(status: &str) -> Result<ApplicationStatus, AppError> {
    ApplicationStatus::parse(status).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Invalid application status '{status}'. Expected: New, Under Review, Accepted, Rejected"
        ))
    })
}

/// Decide whether `current -> next` is allowed. `Ok(false)` means the
/// status is unchanged and nothing needs to be written.
pub fn check_transition(
    current: ApplicationStatus,
    next: ApplicationStatus,
) -> Result<bool, AppError> {
    if current == next {
        return Ok(false);
    }
    if current.can_transition_to(next) {
        return Ok(true);
    }
    let reason = if current.is_final() {
        format!("Application is already {current}")
    } else {
        format!("Cannot change status from {current} to {next}")
    };
    Err(AppError::BadRequest(reason))
}

pub async fn process_apply(
    repos: &Repositories,
    caller: &AuthenticatedUser,
    request: ApplyRequest,
) -> Result<Application, AppError> {
    caller.require_role(Role::Student)?;
    let student = load_student(repos.students.as_ref(), &caller.user_id).await?;
    let job = repos
        .jobs
        .find_by_id(&request.job_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Job not found".into()))?;

    if !job.accepts_applications(Utc::now().date_naive()) {
        return Err(AppError::BadRequest(
            "This job is no longer accepting applications".into(),
        ));
    }

    let resume = match request.resume.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()) {
        Some(key) => {
            if !key.starts_with(&format!("resumes/{}/", caller.user_id)) {
                return Err(AppError::BadRequest("Unknown resume".into()));
            }
            key
        }
        None => student.resume.clone().ok_or_else(|| {
            AppError::BadRequest("Upload a resume before applying".into())
        })?,
    };

    let screening_answers = request
        .screening_answers
        .into_iter()
        .filter(|a| !a.question.trim().is_empty())
        .map(|a| ScreeningAnswer {
            question: a.question.trim().to_string(),
            answer: a.answer.trim().to_string(),
        })
        .collect();

    let now = Utc::now();
    let application = Application {
        id: new_id(),
        student_id: caller.user_id.clone(),
        job_id: job.id.clone(),
        roster_id: job.roster_id.clone(),
        status: ApplicationStatus::New,
        resume,
        message: request.message.trim().to_string(),
        screening_answers,
        job_title: job.title.clone(),
        company_name: job.company.name.clone(),
        applied_at: now,
        updated_at: now,
    };
    repos.applications.insert(application.clone()).await?;
    tracing::info!(application_id = %application.id, job_id = %job.id, "Application submitted");

    match repos.rosters.find_by_id(&job.roster_id).await {
        Ok(Some(roster)) => {
            fan_out(
                repos.notifications.as_ref(),
                &roster.member_ids(),
                NotificationKind::ApplicationReceived,
                "New application",
                &format!("{} applied to {}", student.full_name(), job.title),
                Some(format!("/company/jobs/{}/applicants", job.id)),
            )
            .await
        }
        Ok(None) => tracing::warn!(roster_id = %job.roster_id, "Job roster not found"),
        Err(e) => tracing::warn!("Failed to load roster for notifications: {e}"),
    }

    Ok(application)
}

/// Students may withdraw an application until the company looks at it.
pub async fn process_withdraw(
    repos: &Repositories,
    caller: &AuthenticatedUser,
    application_id: &str,
) -> Result<(), AppError> {
    caller.require_role(Role::Student)?;
    let application = repos
        .applications
        .find_by_id(application_id)
        .await?
        .filter(|a| a.student_id == caller.user_id)
        .ok_or_else(|| AppError::NotFound("Application not found".into()))?;

    if application.status != ApplicationStatus::New {
        return Err(AppError::BadRequest(
            "Only new applications can be withdrawn".into(),
        ));
    }
    repos.applications.delete(&application.id).await?;
    tracing::info!(application_id, "Application withdrawn");
    Ok(())
}

pub async fn process_job_applicants(
    repos: &Repositories,
    context: &CompanyContext,
    job_id: &str,
) -> Result<Vec<Applicant>, AppError> {
    let job = repos
        .jobs
        .find_by_id(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Job not found".into()))?;
    context.require_same_roster(&job.roster_id, "This job")?;

    let applications = repos.applications.list_by_job(&job.id).await?;
    let student_ids: Vec<String> = applications.iter().map(|a| a.student_id.clone()).collect();
    let students = repos.students.find_by_user_ids(&student_ids).await?;

    Ok(applications
        .into_iter()
        .map(|application| {
            let student = students
                .iter()
                .find(|s| s.user_id == application.student_id)
                .cloned();
            Applicant {
                application,
                student,
            }
        })
        .collect())
}

pub async fn process_set_status(
    state: &AppState,
    context: &CompanyContext,
    application_id: &str,
    request: StatusRequest,
) -> Result<Application, AppError> {
    let repos = &state.repos;
    let next = parse_application_status(&request.status)?;
    let application = repos
        .applications
        .find_by_id(application_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Application not found".into()))?;
    context.require_same_roster(&application.roster_id, "This application")?;

    if !check_transition(application.status, next)? {
        return Ok(application);
    }

    let updated = repos
        .applications
        .set_status(&application.id, next)
        .await?
        .ok_or_else(|| AppError::NotFound("Application not found".into()))?;
    tracing::info!(
        application_id,
        from = %application.status,
        to = %next,
        "Application status changed"
    );

    fan_out(
        repos.notifications.as_ref(),
        std::slice::from_ref(&updated.student_id),
        NotificationKind::ApplicationStatus,
        "Application update",
        &format!(
            "Your application for {} at {} is now {}",
            updated.job_title, updated.company_name, next
        ),
        Some("/student/applications".to_string()),
    )
    .await;

    match repos.students.find_by_user_id(&updated.student_id).await {
        Ok(Some(student)) => {
            match state.templates.application_status(
                &student.email,
                &student.first_name,
                &updated.job_title,
                &updated.company_name,
                next.as_str(),
            ) {
                Ok(message) => send_mail(state.mailer.as_ref(), message).await,
                Err(e) => tracing::warn!("Failed to render status email: {e}"),
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Failed to load applicant for status email: {e}"),
    }

    Ok(updated)
}

async fn context_for(state: &AppState, caller: &AuthenticatedUser) -> Result<CompanyContext, AppError> {
    company_context(state.repos.members.as_ref(), state.repos.rosters.as_ref(), caller).await
}

// -- Handlers --

/// `POST /api/applications`
pub async fn apply_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Json(request): Json<ApplyRequest>,
) -> Result<(StatusCode, Json<Application>), AppError> {
    let application = process_apply(&state.repos, &caller, request).await?;
    Ok((StatusCode::CREATED, Json(application)))
}

/// `GET /api/applications/mine`
pub async fn my_applications_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> Result<Json<Vec<Application>>, AppError> {
    caller.require_role(Role::Student)?;
    Ok(Json(
        state.repos.applications.list_by_student(&caller.user_id).await?,
    ))
}

/// `DELETE /api/applications/{id}`
pub async fn withdraw_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(application_id): Path<String>,
) -> Result<StatusCode, AppError> {
    process_withdraw(&state.repos, &caller, &application_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/applications/job/{job_id}`
pub async fn job_applicants_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(job_id): Path<String>,
) -> Result<Json<Vec<Applicant>>, AppError> {
    let context = context_for(&state, &caller).await?;
    Ok(Json(process_job_applicants(&state.repos, &context, &job_id).await?))
}

/// `GET /api/applications/company`
pub async fn company_applications_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Query(query): Query<CompanyApplicationsQuery>,
) -> Result<Json<Vec<Application>>, AppError> {
    let context = context_for(&state, &caller).await?;
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => Some(parse_application_status(s)?),
    };
    Ok(Json(
        state
            .repos
            .applications
            .list_by_roster(&context.roster.id, status)
            .await?,
    ))
}

/// `PATCH /api/applications/{id}/status`
pub async fn application_status_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(application_id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Application>, AppError> {
    let context = context_for(&state, &caller).await?;
    Ok(Json(
        process_set_status(&state, &context, &application_id, request).await?,
    ))
}

/// `GET /api/applications/company/export`
pub async fn export_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> Result<Response, AppError> {
    let context = context_for(&state, &caller).await?;
    let rows = state
        .repos
        .reports
        .application_export_rows(&context.roster.id)
        .await?;
    let body = applications_csv(&rows)?;
    tracing::info!(roster_id = %context.roster.id, rows = rows.len(), "Applications exported");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"applications.csv\"",
            ),
        ],
        body,
    )
        .into_response())
}
