use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::api::extract::{Json, Path};
use crate::auth::models::{AuthenticatedUser, Role};
use crate::db::models::{
    new_id, CertificationEntry, EducationEntry, ExperienceEntry, Reminder, Student,
};
use crate::db::student_repository::StudentRepository;
use crate::error::AppError;
use crate::services::uploads::{read_file_field, store_upload, UploadKind};
use crate::state::AppState;
use crate::storage::client::StorageClient;

/// Editable profile fields. Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateStudentRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub school: Option<String>,
    pub course: Option<String>,
    pub year_level: Option<u8>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub skills: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ExperienceInput {
    pub title: String,
    pub organization: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct EducationInput {
    pub school: String,
    pub degree: String,
    pub start_year: i32,
    #[serde(default)]
    pub end_year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CertificationInput {
    pub name: String,
    pub issuer: String,
    #[serde(default)]
    pub issued_on: Option<NaiveDate>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReminderInput {
    pub title: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

/// `done` absent toggles the current value.
#[derive(Debug, Default, Deserialize)]
pub struct ReminderUpdate {
    pub title: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub done: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub key: String,
    pub url: String,
}

/// The list-valued parts of a profile addressable under `/me/{section}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSection {
    Experience,
    Education,
    Certifications,
}

impl ProfileSection {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "experience" => Ok(ProfileSection::Experience),
            "education" => Ok(ProfileSection::Education),
            "certifications" => Ok(ProfileSection::Certifications),
            other => Err(AppError::NotFound(format!("Unknown profile section '{other}'"))),
        }
    }
}

fn required(value: &str, field: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// Trim skills and drop empties and case-insensitive duplicates, keeping the
/// first spelling.
pub fn normalize_skills(skills: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    skills
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .collect()
}

pub async fn load_student(
    students: &dyn StudentRepository,
    user_id: &str,
) -> Result<Student, AppError> {
    students
        .find_by_user_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Student profile not found".into()))
}

async fn save(students: &dyn StudentRepository, mut student: Student) -> Result<Student, AppError> {
    student.updated_at = Utc::now();
    students.save(student.clone()).await?;
    Ok(student)
}

pub async fn process_update_profile(
    students: &dyn StudentRepository,
    user_id: &str,
    request: UpdateStudentRequest,
) -> Result<Student, AppError> {
    let mut student = load_student(students, user_id).await?;

    if let Some(first_name) = request.first_name {
        student.first_name = required(&first_name, "First name")?;
    }
    if let Some(last_name) = request.last_name {
        student.last_name = required(&last_name, "Last name")?;
    }
    if let Some(school) = request.school {
        student.school = school.trim().to_string();
    }
    if let Some(course) = request.course {
        student.course = course.trim().to_string();
    }
    if let Some(year_level) = request.year_level {
        if !(1..=10).contains(&year_level) {
            return Err(AppError::BadRequest("Year level must be between 1 and 10".into()));
        }
        student.year_level = Some(year_level);
    }
    if let Some(phone) = request.phone {
        student.phone = phone.trim().to_string();
    }
    if let Some(location) = request.location {
        student.location = location.trim().to_string();
    }
    if let Some(bio) = request.bio {
        student.bio = bio.trim().to_string();
    }
    if let Some(skills) = request.skills {
        student.skills = normalize_skills(skills);
    }

    save(students, student).await
}

/// Append an entry to a profile section. `body` is decoded per section.
pub async fn process_add_entry(
    students: &dyn StudentRepository,
    user_id: &str,
    section: ProfileSection,
    body: serde_json::Value,
) -> Result<Student, AppError> {
    let mut student = load_student(students, user_id).await?;
    let invalid = |e: serde_json::Error| AppError::BadRequest(format!("Invalid entry: {e}"));

    match section {
        ProfileSection::Experience => {
            let input: ExperienceInput = serde_json::from_value(body).map_err(invalid)?;
            if input.end_date.is_some_and(|end| end < input.start_date) {
                return Err(AppError::BadRequest(
                    "Start date must not be after end date".into(),
                ));
            }
            student.experience.push(ExperienceEntry {
                id: new_id(),
                title: required(&input.title, "Title")?,
                organization: required(&input.organization, "Organization")?,
                start_date: input.start_date,
                end_date: input.end_date,
                description: input.description.trim().to_string(),
            });
        }
        ProfileSection::Education => {
            let input: EducationInput = serde_json::from_value(body).map_err(invalid)?;
            if input.end_year.is_some_and(|end| end < input.start_year) {
                return Err(AppError::BadRequest(
                    "Start year must not be after end year".into(),
                ));
            }
            student.education.push(EducationEntry {
                id: new_id(),
                school: required(&input.school, "School")?,
                degree: required(&input.degree, "Degree")?,
                start_year: input.start_year,
                end_year: input.end_year,
            });
        }
        ProfileSection::Certifications => {
            let input: CertificationInput = serde_json::from_value(body).map_err(invalid)?;
            student.certifications.push(CertificationEntry {
                id: new_id(),
                name: required(&input.name, "Name")?,
                issuer: required(&input.issuer, "Issuer")?,
                issued_on: input.issued_on,
                url: input.url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()),
            });
        }
    }

    save(students, student).await
}

pub async fn process_remove_entry(
    students: &dyn StudentRepository,
    user_id: &str,
    section: ProfileSection,
    entry_id: &str,
) -> Result<Student, AppError> {
    let mut student = load_student(students, user_id).await?;
    let before = match section {
        ProfileSection::Experience => student.experience.len(),
        ProfileSection::Education => student.education.len(),
        ProfileSection::Certifications => student.certifications.len(),
    };
    let after = match section {
        ProfileSection::Experience => {
            student.experience.retain(|e| e.id != entry_id);
            student.experience.len()
        }
        ProfileSection::Education => {
            student.education.retain(|e| e.id != entry_id);
            student.education.len()
        }
        ProfileSection::Certifications => {
            student.certifications.retain(|e| e.id != entry_id);
            student.certifications.len()
        }
    };
    if before == after {
        return Err(AppError::NotFound("Entry not found".into()));
    }
    save(students, student).await
}

pub async fn process_add_reminder(
    students: &dyn StudentRepository,
    user_id: &str,
    input: ReminderInput,
) -> Result<Reminder, AppError> {
    let mut student = load_student(students, user_id).await?;
    let reminder = Reminder {
        id: new_id(),
        title: required(&input.title, "Title")?,
        due_date: input.due_date,
        done: false,
    };
    student.reminders.push(reminder.clone());
    save(students, student).await?;
    Ok(reminder)
}

pub async fn process_update_reminder(
    students: &dyn StudentRepository,
    user_id: &str,
    reminder_id: &str,
    update: ReminderUpdate,
) -> Result<Reminder, AppError> {
    let mut student = load_student(students, user_id).await?;
    let reminder = student
        .reminders
        .iter_mut()
        .find(|r| r.id == reminder_id)
        .ok_or_else(|| AppError::NotFound("Reminder not found".into()))?;

    if let Some(title) = update.title {
        reminder.title = required(&title, "Title")?;
    }
    if update.due_date.is_some() {
        reminder.due_date = update.due_date;
    }
    reminder.done = update.done.unwrap_or(!reminder.done);

    let updated = reminder.clone();
    save(students, student).await?;
    Ok(updated)
}

pub async fn process_delete_reminder(
    students: &dyn StudentRepository,
    user_id: &str,
    reminder_id: &str,
) -> Result<(), AppError> {
    let mut student = load_student(students, user_id).await?;
    let before = student.reminders.len();
    student.reminders.retain(|r| r.id != reminder_id);
    if student.reminders.len() == before {
        return Err(AppError::NotFound("Reminder not found".into()));
    }
    save(students, student).await?;
    Ok(())
}

/// Store a resume or avatar and point the profile at it. The previous object
/// is removed afterwards.
pub async fn process_profile_upload(
    students: &dyn StudentRepository,
    storage: &dyn StorageClient,
    user_id: &str,
    kind: UploadKind,
    file: crate::services::uploads::UploadedFile,
) -> Result<String, AppError> {
    let mut student = load_student(students, user_id).await?;
    let key = store_upload(storage, kind, user_id, file).await?;

    let previous = match kind {
        UploadKind::Avatar => student.avatar.replace(key.clone()),
        _ => student.resume.replace(key.clone()),
    };
    save(students, student).await?;

    if let Some(old) = previous {
        // Submitted applications keep their own resume key, so only avatars
        // are cleaned up.
        if kind == UploadKind::Avatar {
            if let Err(e) = storage.delete_object(&old).await {
                tracing::warn!(key = %old, "Failed to delete replaced avatar: {e}");
            }
        }
    }
    Ok(key)
}

fn require_student(caller: &AuthenticatedUser) -> Result<(), AppError> {
    caller.require_role(Role::Student)
}

// -- Handlers --

/// `GET /api/students/me`
pub async fn get_me_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> Result<Json<Student>, AppError> {
    require_student(&caller)?;
    Ok(Json(load_student(state.repos.students.as_ref(), &caller.user_id).await?))
}

/// `PUT /api/students/me`
pub async fn update_me_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Json(request): Json<UpdateStudentRequest>,
) -> Result<Json<Student>, AppError> {
    require_student(&caller)?;
    let student =
        process_update_profile(state.repos.students.as_ref(), &caller.user_id, request).await?;
    Ok(Json(student))
}

/// `POST /api/students/me/{section}`
pub async fn add_entry_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(section): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<Student>), AppError> {
    require_student(&caller)?;
    let section = ProfileSection::parse(&section)?;
    let student =
        process_add_entry(state.repos.students.as_ref(), &caller.user_id, section, body).await?;
    Ok((StatusCode::CREATED, Json(student)))
}

/// `DELETE /api/students/me/{section}/{entry_id}`
pub async fn remove_entry_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path((section, entry_id)): Path<(String, String)>,
) -> Result<Json<Student>, AppError> {
    require_student(&caller)?;
    let section = ProfileSection::parse(&section)?;
    let student = process_remove_entry(
        state.repos.students.as_ref(),
        &caller.user_id,
        section,
        &entry_id,
    )
    .await?;
    Ok(Json(student))
}

/// `GET /api/students/me/reminders`
pub async fn list_reminders_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> Result<Json<Vec<Reminder>>, AppError> {
    require_student(&caller)?;
    let student = load_student(state.repos.students.as_ref(), &caller.user_id).await?;
    Ok(Json(student.reminders))
}

/// `POST /api/students/me/reminders`
pub async fn add_reminder_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Json(input): Json<ReminderInput>,
) -> Result<(StatusCode, Json<Reminder>), AppError> {
    require_student(&caller)?;
    let reminder =
        process_add_reminder(state.repos.students.as_ref(), &caller.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(reminder)))
}

/// `PATCH /api/students/me/reminders/{id}`
pub async fn update_reminder_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(reminder_id): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<Reminder>, AppError> {
    require_student(&caller)?;
    // An empty body toggles `done`.
    let update: ReminderUpdate = if body.is_empty() {
        ReminderUpdate::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid reminder update: {e}")))?
    };
    let reminder = process_update_reminder(
        state.repos.students.as_ref(),
        &caller.user_id,
        &reminder_id,
        update,
    )
    .await?;
    Ok(Json(reminder))
}

/// `DELETE /api/students/me/reminders/{id}`
pub async fn delete_reminder_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(reminder_id): Path<String>,
) -> Result<StatusCode, AppError> {
    require_student(&caller)?;
    process_delete_reminder(state.repos.students.as_ref(), &caller.user_id, &reminder_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn upload(
    state: &AppState,
    caller: &AuthenticatedUser,
    kind: UploadKind,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    require_student(caller)?;
    let file = read_file_field(&mut multipart, state.config.upload_max_bytes).await?;
    let key = process_profile_upload(
        state.repos.students.as_ref(),
        state.storage.as_ref(),
        &caller.user_id,
        kind,
        file,
    )
    .await?;
    Ok(Json(UploadResponse {
        url: format!("/uploads/{key}"),
        key,
    }))
}

/// `POST /api/students/me/resume`
pub async fn upload_resume_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    upload(&state, &caller, UploadKind::Resume, multipart).await
}

/// `POST /api/students/me/avatar`
pub async fn upload_avatar_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    upload(&state, &caller, UploadKind::Avatar, multipart).await
}

/// `GET /api/students/{user_id}`: companies and admins only.
pub async fn get_student_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(user_id): Path<String>,
) -> Result<Json<Student>, AppError> {
    if !matches!(caller.role, Role::Company | Role::Admin) {
        return Err(AppError::Forbidden(
            "Only companies and admins can view student profiles".into(),
        ));
    }
    Ok(Json(load_student(state.repos.students.as_ref(), &user_id).await?))
}
