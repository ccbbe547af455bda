use axum::extract::State;
use axum::http::StatusCode;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::api::companies::{company_context, CompanyContext};
use crate::api::extract::{Json, Path, Query};
use crate::auth::middleware::MaybeUser;
use crate::auth::models::{AuthenticatedUser, Role};
use crate::db::job_repository::JobRepository;
use crate::db::models::{
    new_id, ApplicationStatus, CompanySnapshot, Job, JobQuery, JobStatus, NotificationKind,
    WorkType,
};
use crate::error::AppError;
use crate::services::notify::fan_out;
use crate::state::{AppState, Repositories};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Body of `POST /api/jobs` and `PUT /api/jobs/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub work_type: String,
    #[serde(default = "default_slots")]
    pub slots: u32,
    #[serde(default)]
    pub allowance: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub offers: Vec<String>,
    #[serde(default)]
    pub screening_questions: Vec<String>,
    /// Only read on create: `Open` (default) or `Draft`.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
}

fn default_slots() -> u32 {
    1
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub q: Option<String>,
    pub location: Option<String>,
    pub work_type: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total: u64,
    pub page: u64,
    pub limit: i64,
    pub total_pages: u64,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

/// A roster job with the number of applications it received.
#[derive(Debug, Serialize)]
pub struct JobWithCount {
    #[serde(flatten)]
    pub job: Job,
    pub applications: u64,
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Fields of a job that come from the request, validated.
struct JobFields {
    title: String,
    description: String,
    location: String,
    work_type: WorkType,
    slots: u32,
    allowance: Option<String>,
    skills: Vec<String>,
    requirements: Vec<String>,
    responsibilities: Vec<String>,
    offers: Vec<String>,
    screening_questions: Vec<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    deadline: Option<NaiveDate>,
}

/// `check_deadline` is off when an update keeps an already stored deadline.
fn validate_job(input: JobInput, today: NaiveDate, check_deadline: bool) -> Result<JobFields, AppError> {
    let title = input.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::BadRequest("Job title is required".into()));
    }
    let work_type = WorkType::parse(&input.work_type).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Invalid work type '{}'. Expected: onsite, remote, hybrid",
            input.work_type
        ))
    })?;
    if input.slots < 1 {
        return Err(AppError::BadRequest("A job needs at least one slot".into()));
    }
    if let (Some(start), Some(end)) = (input.start_date, input.end_date) {
        if start > end {
            return Err(AppError::BadRequest(
                "Start date must not be after end date".into(),
            ));
        }
    }
    if check_deadline && input.deadline.is_some_and(|d| d < today) {
        return Err(AppError::BadRequest("Deadline cannot be in the past".into()));
    }

    Ok(JobFields {
        title,
        description: input.description.trim().to_string(),
        location: input.location.trim().to_string(),
        work_type,
        slots: input.slots,
        allowance: input.allowance.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()),
        skills: clean_list(input.skills),
        requirements: clean_list(input.requirements),
        responsibilities: clean_list(input.responsibilities),
        offers: clean_list(input.offers),
        screening_questions: clean_list(input.screening_questions),
        start_date: input.start_date,
        end_date: input.end_date,
        deadline: input.deadline,
    })
}

fn apply_fields(job: &mut Job, fields: JobFields) {
    job.title = fields.title;
    job.description = fields.description;
    job.location = fields.location;
    job.work_type = fields.work_type;
    job.slots = fields.slots;
    job.allowance = fields.allowance;
    job.skills = fields.skills;
    job.requirements = fields.requirements;
    job.responsibilities = fields.responsibilities;
    job.offers = fields.offers;
    job.screening_questions = fields.screening_questions;
    job.start_date = fields.start_date;
    job.end_date = fields.end_date;
    job.deadline = fields.deadline;
}

pub fn parse_job_status(status: &str) -> Result<JobStatus, AppError> {
    JobStatus::parse(status).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Invalid job status '{status}'. Expected: Open, Closed, Draft"
        ))
    })
}

pub async fn process_list_jobs(
    jobs: &dyn JobRepository,
    params: ListJobsQuery,
) -> Result<JobPage, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let work_type = match params.work_type.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(w) => Some(WorkType::parse(w).ok_or_else(|| {
            AppError::BadRequest(format!("Invalid work type '{w}'"))
        })?),
    };

    let skip = (page - 1)
        .checked_mul(limit as u64)
        .filter(|skip| i64::try_from(*skip).is_ok())
        .ok_or_else(|| AppError::BadRequest(format!("Page {page} is out of range")))?;

    let query = JobQuery {
        text: params.q,
        location: params.location,
        work_type,
        skip,
        limit,
    };
    let (jobs, total) = jobs.search_open(&query).await?;

    Ok(JobPage {
        jobs,
        total,
        page,
        limit,
        total_pages: total.div_ceil(limit as u64),
    })
}

/// Drafts are only shown to the posting company and admins.
pub async fn process_get_job(
    state: &AppState,
    viewer: Option<&AuthenticatedUser>,
    job_id: &str,
) -> Result<Job, AppError> {
    let not_found = || AppError::NotFound("Job not found".into());
    let job = state.repos.jobs.find_by_id(job_id).await?.ok_or_else(not_found)?;
    if job.status != JobStatus::Draft {
        return Ok(job);
    }

    match viewer {
        Some(user) if user.role == Role::Admin => Ok(job),
        Some(user) if user.role == Role::Company => {
            let context = company_context(
                state.repos.members.as_ref(),
                state.repos.rosters.as_ref(),
                user,
            )
            .await?;
            if context.roster.id == job.roster_id {
                Ok(job)
            } else {
                Err(not_found())
            }
        }
        _ => Err(not_found()),
    }
}

pub async fn process_create_job(
    jobs: &dyn JobRepository,
    context: &CompanyContext,
    input: JobInput,
) -> Result<Job, AppError> {
    let status = match input.status.as_deref() {
        None => JobStatus::Open,
        Some(s) => match parse_job_status(s)? {
            JobStatus::Closed => {
                return Err(AppError::BadRequest(
                    "A new job must be Open or Draft".into(),
                ))
            }
            status => status,
        },
    };
    let fields = validate_job(input, Utc::now().date_naive(), true)?;

    let now = Utc::now();
    let mut job = Job {
        id: new_id(),
        roster_id: context.roster.id.clone(),
        posted_by: context.member.user_id.clone(),
        company: CompanySnapshot::from(&context.roster),
        title: String::new(),
        description: String::new(),
        location: String::new(),
        work_type: fields.work_type,
        slots: fields.slots,
        allowance: None,
        skills: vec![],
        requirements: vec![],
        responsibilities: vec![],
        offers: vec![],
        screening_questions: vec![],
        status,
        start_date: None,
        end_date: None,
        deadline: None,
        created_at: now,
        updated_at: now,
    };
    apply_fields(&mut job, fields);
    jobs.insert(job.clone()).await?;

    tracing::info!(job_id = %job.id, roster_id = %job.roster_id, %status, "Job created");
    Ok(job)
}

async fn load_roster_job(
    jobs: &dyn JobRepository,
    context: &CompanyContext,
    job_id: &str,
) -> Result<Job, AppError> {
    let job = jobs
        .find_by_id(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Job not found".into()))?;
    context.require_same_roster(&job.roster_id, "This job")?;
    Ok(job)
}

/// Replace the editable fields. Status, snapshot and ownership are kept.
pub async fn process_update_job(
    jobs: &dyn JobRepository,
    context: &CompanyContext,
    job_id: &str,
    input: JobInput,
) -> Result<Job, AppError> {
    let mut job = load_roster_job(jobs, context, job_id).await?;
    let check_deadline = input.deadline != job.deadline;
    let fields = validate_job(input, Utc::now().date_naive(), check_deadline)?;

    apply_fields(&mut job, fields);
    job.updated_at = Utc::now();
    if !jobs.save(job.clone()).await? {
        return Err(AppError::NotFound("Job not found".into()));
    }
    tracing::info!(job_id = %job.id, "Job updated");
    Ok(job)
}

/// Write a new status. Closing a job tells applicants still waiting on it.
pub async fn change_job_status(
    repos: &Repositories,
    mut job: Job,
    status: JobStatus,
) -> Result<Job, AppError> {
    if job.status == status {
        return Ok(job);
    }
    if !repos.jobs.set_status(&job.id, status).await? {
        return Err(AppError::NotFound("Job not found".into()));
    }
    let previous = job.status;
    job.status = status;
    job.updated_at = Utc::now();
    tracing::info!(job_id = %job.id, from = %previous, to = %status, "Job status changed");

    if status == JobStatus::Closed {
        let waiting: Vec<String> = repos
            .applications
            .list_by_job(&job.id)
            .await?
            .into_iter()
            .filter(|a| matches!(a.status, ApplicationStatus::New | ApplicationStatus::UnderReview))
            .map(|a| a.student_id)
            .collect();
        fan_out(
            repos.notifications.as_ref(),
            &waiting,
            NotificationKind::JobClosed,
            "Job closed",
            &format!(
                "{} at {} is no longer accepting applications.",
                job.title, job.company.name
            ),
            Some(format!("/jobs/{}", job.id)),
        )
        .await;
    }
    Ok(job)
}

/// Remove a job together with its applications.
pub async fn delete_job(repos: &Repositories, job_id: &str) -> Result<(), AppError> {
    let removed = repos.applications.delete_by_job(job_id).await?;
    if !repos.jobs.delete(job_id).await? {
        return Err(AppError::NotFound("Job not found".into()));
    }
    tracing::info!(job_id, applications = removed, "Job deleted");
    Ok(())
}

pub async fn process_company_jobs(
    repos: &Repositories,
    context: &CompanyContext,
) -> Result<Vec<JobWithCount>, AppError> {
    let counts = repos.reports.job_application_counts(&context.roster.id).await?;
    let jobs = repos.jobs.list_by_roster(&context.roster.id).await?;
    Ok(jobs
        .into_iter()
        .map(|job| {
            let applications = counts
                .iter()
                .find(|c| c.job_id == job.id)
                .map(|c| c.count)
                .unwrap_or(0);
            JobWithCount { job, applications }
        })
        .collect())
}

async fn context_for(state: &AppState, caller: &AuthenticatedUser) -> Result<CompanyContext, AppError> {
    company_context(state.repos.members.as_ref(), state.repos.rosters.as_ref(), caller).await
}

// -- Handlers --

/// `GET /api/jobs`
pub async fn list_jobs_handler(
    State(state): State<AppState>,
    Query(params): Query<ListJobsQuery>,
) -> Result<Json<JobPage>, AppError> {
    Ok(Json(process_list_jobs(state.repos.jobs.as_ref(), params).await?))
}

/// `GET /api/jobs/{id}`
pub async fn get_job_handler(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, AppError> {
    Ok(Json(process_get_job(&state, viewer.as_ref(), &job_id).await?))
}

/// `POST /api/jobs`
pub async fn create_job_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Json(input): Json<JobInput>,
) -> Result<(StatusCode, Json<Job>), AppError> {
    let context = context_for(&state, &caller).await?;
    let job = process_create_job(state.repos.jobs.as_ref(), &context, input).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// `PUT /api/jobs/{id}`
pub async fn update_job_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(job_id): Path<String>,
    Json(input): Json<JobInput>,
) -> Result<Json<Job>, AppError> {
    let context = context_for(&state, &caller).await?;
    let job = process_update_job(state.repos.jobs.as_ref(), &context, &job_id, input).await?;
    Ok(Json(job))
}

/// `PATCH /api/jobs/{id}/status`
pub async fn job_status_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(job_id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Job>, AppError> {
    let context = context_for(&state, &caller).await?;
    let status = parse_job_status(&request.status)?;
    let job = load_roster_job(state.repos.jobs.as_ref(), &context, &job_id).await?;
    Ok(Json(change_job_status(&state.repos, job, status).await?))
}

/// `DELETE /api/jobs/{id}`
pub async fn delete_job_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(job_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let context = context_for(&state, &caller).await?;
    load_roster_job(state.repos.jobs.as_ref(), &context, &job_id).await?;
    delete_job(&state.repos, &job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/jobs/company/mine`
pub async fn company_jobs_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> Result<Json<Vec<JobWithCount>>, AppError> {
    let context = context_for(&state, &caller).await?;
    Ok(Json(process_company_jobs(&state.repos, &context).await?))
}
