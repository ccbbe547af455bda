use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::extract::{Json, Path};
use crate::auth::models::{AuthenticatedUser, Role};
use crate::db::company_repository::CompanyMemberRepository;
use crate::db::job_repository::JobRepository;
use crate::db::models::{company_key, CompanyMember, Job, JobStatus, Roster, RosterImage, RosterPerson};
use crate::db::roster_repository::{RosterProfileUpdate, RosterRepository};
use crate::error::AppError;
use crate::services::roster::leave_roster;
use crate::services::uploads::{read_file_field, store_upload, UploadKind};
use crate::state::AppState;
use crate::storage::client::StorageClient;

/// A company account together with the roster it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyContext {
    pub member: CompanyMember,
    pub roster: Roster,
}

impl CompanyContext {
    pub fn is_owner(&self) -> bool {
        self.roster.is_owner(&self.member.user_id)
    }

    pub fn require_owner(&self) -> Result<(), AppError> {
        if self.is_owner() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Only the company owner can do this".into(),
            ))
        }
    }

    /// Guard for jobs and applications, which belong to one roster.
    pub fn require_same_roster(&self, roster_id: &str, what: &str) -> Result<(), AppError> {
        if self.roster.id == roster_id {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("{what} belongs to another company")))
        }
    }
}

/// Resolve the caller's member profile and roster. The caller must still be
/// listed on the roster.
pub async fn company_context(
    members: &dyn CompanyMemberRepository,
    rosters: &dyn RosterRepository,
    caller: &AuthenticatedUser,
) -> Result<CompanyContext, AppError> {
    caller.require_role(Role::Company)?;
    let member = members
        .find_by_user_id(&caller.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Company profile not found".into()))?;
    let roster = rosters
        .find_by_id(&member.roster_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Company not found".into()))?;

    if !roster.member_ids().contains(&member.user_id) {
        return Err(AppError::Forbidden(
            "You are no longer a member of this company".into(),
        ));
    }
    Ok(CompanyContext { member, roster })
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateMemberRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCompanyRequest {
    pub company_name: Option<String>,
    pub industry: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
}

/// Public company page. Employee details stay private.
#[derive(Debug, Serialize)]
pub struct PublicCompany {
    #[serde(rename = "_id")]
    pub id: String,
    pub company_name: String,
    pub industry: String,
    pub description: String,
    pub website: String,
    pub address: String,
    pub logo: Option<String>,
    pub banner: Option<String>,
    pub jobs: Vec<Job>,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub key: String,
    pub url: String,
}

fn non_blank(value: String, field: &str) -> Result<String, AppError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} must not be empty")));
    }
    Ok(value)
}

pub async fn process_update_member(
    members: &dyn CompanyMemberRepository,
    mut member: CompanyMember,
    request: UpdateMemberRequest,
) -> Result<CompanyMember, AppError> {
    if let Some(first_name) = request.first_name {
        member.first_name = non_blank(first_name, "First name")?;
    }
    if let Some(last_name) = request.last_name {
        member.last_name = non_blank(last_name, "Last name")?;
    }
    if let Some(position) = request.position {
        member.position = position.trim().to_string();
    }
    if let Some(phone) = request.phone {
        member.phone = phone.trim().to_string();
    }
    member.updated_at = Utc::now();
    members.save(member.clone()).await?;
    Ok(member)
}

/// Owner-only edit of the company profile. Renaming must not collide with
/// another roster's normalized name.
pub async fn process_update_company(
    rosters: &dyn RosterRepository,
    context: &CompanyContext,
    request: UpdateCompanyRequest,
) -> Result<Roster, AppError> {
    context.require_owner()?;
    let roster = &context.roster;

    let company_name = match request.company_name {
        Some(name) => non_blank(name, "Company name")?
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" "),
        None => roster.company_name.clone(),
    };
    let key = company_key(&company_name);
    let taken = || AppError::BadRequest(format!("A company named '{company_name}' already exists"));

    if key != roster.company_key {
        if let Some(other) = rosters.find_by_key(&key).await? {
            if other.id != roster.id {
                return Err(taken());
            }
        }
    }

    let update = RosterProfileUpdate {
        company_name: company_name.clone(),
        company_key: key,
        industry: request.industry.unwrap_or_else(|| roster.industry.clone()).trim().to_string(),
        description: request
            .description
            .unwrap_or_else(|| roster.description.clone())
            .trim()
            .to_string(),
        website: request.website.unwrap_or_else(|| roster.website.clone()).trim().to_string(),
        address: request.address.unwrap_or_else(|| roster.address.clone()).trim().to_string(),
    };

    let updated = rosters
        .update_profile(&roster.id, update)
        .await
        .map_err(|e| match e {
            AppError::Conflict(_) => taken(),
            other => other,
        })?
        .ok_or_else(|| AppError::NotFound("Company not found".into()))?;

    tracing::info!(roster_id = %updated.id, "Company profile updated");
    Ok(updated)
}

pub async fn process_company_image(
    rosters: &dyn RosterRepository,
    storage: &dyn StorageClient,
    context: &CompanyContext,
    image: RosterImage,
    file: crate::services::uploads::UploadedFile,
) -> Result<String, AppError> {
    context.require_owner()?;
    let kind = match image {
        RosterImage::Logo => UploadKind::Logo,
        RosterImage::Banner => UploadKind::Banner,
    };
    let key = store_upload(storage, kind, &context.roster.id, file).await?;
    rosters.set_image(&context.roster.id, image, &key).await?;

    let previous = match image {
        RosterImage::Logo => context.roster.logo.as_deref(),
        RosterImage::Banner => context.roster.banner.as_deref(),
    };
    // Job snapshots may still reference an old logo.
    if let (RosterImage::Banner, Some(old)) = (image, previous) {
        if let Err(e) = storage.delete_object(old).await {
            tracing::warn!(key = %old, "Failed to delete replaced banner: {e}");
        }
    }
    Ok(key)
}

pub async fn process_remove_employee(
    rosters: &dyn RosterRepository,
    context: &CompanyContext,
    user_id: &str,
) -> Result<(), AppError> {
    context.require_owner()?;
    if user_id == context.member.user_id {
        return Err(AppError::BadRequest(
            "You cannot remove yourself from the company".into(),
        ));
    }
    if !context.roster.employees.iter().any(|e| e.user_id == user_id) {
        return Err(AppError::NotFound("Employee not found".into()));
    }
    leave_roster(rosters, &context.roster.id, user_id).await?;
    tracing::info!(roster_id = %context.roster.id, user_id, "Employee removed from roster");
    Ok(())
}

pub async fn process_public_company(
    rosters: &dyn RosterRepository,
    jobs: &dyn JobRepository,
    roster_id: &str,
) -> Result<PublicCompany, AppError> {
    let roster = rosters
        .find_by_id(roster_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Company not found".into()))?;
    let open_jobs = jobs
        .list_by_roster(&roster.id)
        .await?
        .into_iter()
        .filter(|job| job.status == JobStatus::Open)
        .collect();

    Ok(PublicCompany {
        id: roster.id,
        company_name: roster.company_name,
        industry: roster.industry,
        description: roster.description,
        website: roster.website,
        address: roster.address,
        logo: roster.logo,
        banner: roster.banner,
        jobs: open_jobs,
    })
}

async fn context_for(state: &AppState, caller: &AuthenticatedUser) -> Result<CompanyContext, AppError> {
    company_context(state.repos.members.as_ref(), state.repos.rosters.as_ref(), caller).await
}

// -- Handlers --

/// `GET /api/companies/me`
pub async fn get_me_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> Result<Json<CompanyContext>, AppError> {
    Ok(Json(context_for(&state, &caller).await?))
}

/// `PUT /api/companies/me`
pub async fn update_me_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Json(request): Json<UpdateMemberRequest>,
) -> Result<Json<CompanyMember>, AppError> {
    let context = context_for(&state, &caller).await?;
    let member = process_update_member(state.repos.members.as_ref(), context.member, request).await?;
    Ok(Json(member))
}

/// `PUT /api/companies/me/company`
pub async fn update_company_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Json(request): Json<UpdateCompanyRequest>,
) -> Result<Json<Roster>, AppError> {
    let context = context_for(&state, &caller).await?;
    let roster = process_update_company(state.repos.rosters.as_ref(), &context, request).await?;
    Ok(Json(roster))
}

async fn image_upload(
    state: &AppState,
    caller: &AuthenticatedUser,
    image: RosterImage,
    mut multipart: Multipart,
) -> Result<Json<ImageResponse>, AppError> {
    let context = context_for(state, caller).await?;
    context.require_owner()?;
    let file = read_file_field(&mut multipart, state.config.upload_max_bytes).await?;
    let key = process_company_image(
        state.repos.rosters.as_ref(),
        state.storage.as_ref(),
        &context,
        image,
        file,
    )
    .await?;
    Ok(Json(ImageResponse {
        url: format!("/uploads/{key}"),
        key,
    }))
}

/// `POST /api/companies/me/company/logo`
pub async fn upload_logo_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    multipart: Multipart,
) -> Result<Json<ImageResponse>, AppError> {
    image_upload(&state, &caller, RosterImage::Logo, multipart).await
}

/// `POST /api/companies/me/company/banner`
pub async fn upload_banner_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    multipart: Multipart,
) -> Result<Json<ImageResponse>, AppError> {
    image_upload(&state, &caller, RosterImage::Banner, multipart).await
}

/// `GET /api/companies/me/employees`
pub async fn list_employees_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> Result<Json<Vec<RosterPerson>>, AppError> {
    let context = context_for(&state, &caller).await?;
    Ok(Json(context.roster.employees))
}

/// `DELETE /api/companies/me/employees/{user_id}`
pub async fn remove_employee_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(user_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let context = context_for(&state, &caller).await?;
    process_remove_employee(state.repos.rosters.as_ref(), &context, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/companies/{roster_id}`
pub async fn public_company_handler(
    State(state): State<AppState>,
    Path(roster_id): Path<String>,
) -> Result<Json<PublicCompany>, AppError> {
    let company = process_public_company(
        state.repos.rosters.as_ref(),
        state.repos.jobs.as_ref(),
        &roster_id,
    )
    .await?;
    Ok(Json(company))
}
