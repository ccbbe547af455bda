use axum::extract::State;
use axum::http::StatusCode;
use axum_extra::extract::CookieJar;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::api::extract::Json;
use crate::auth::jwt::TokenService;
use crate::auth::middleware::{removal_cookie, session_cookie};
use crate::auth::models::{AuthenticatedUser, Role, UserStatus};
use crate::auth::otp::{generate_code, hash_code, MAX_OTP_ATTEMPTS};
use crate::auth::password::{hash_password_blocking, validate_password, verify_password_blocking};
use crate::db::models::{new_id, CompanyMember, OtpCode, OtpPurpose, Student, User, UserView};
use crate::db::otp_repository::OtpRepository;
use crate::db::user_repository::UserRepository;
use crate::error::AppError;
use crate::services::notify::send_mail;
use crate::services::roster::{ensure_owner_slot_free, join_roster, undo_join, Registrant};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub is_owner: bool,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserView,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserView,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Trim and lowercase an email, rejecting anything that is clearly not one.
pub fn normalize_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(AppError::BadRequest("Invalid email address".into()))
    }
}

fn required(value: &str, field: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// Create and store a new code for `email`, replacing any earlier one.
pub async fn issue_otp(
    otps: &dyn OtpRepository,
    email: &str,
    purpose: OtpPurpose,
    ttl_minutes: i64,
) -> Result<String, AppError> {
    let code = generate_code();
    otps.put(OtpCode {
        email: email.to_string(),
        purpose,
        code_hash: hash_code(email, &code),
        expires_at: Utc::now() + Duration::minutes(ttl_minutes),
        attempts: 0,
    })
    .await?;
    Ok(code)
}

/// Check a submitted code. A valid code is consumed; too many wrong guesses
/// burn it.
pub async fn check_otp(
    otps: &dyn OtpRepository,
    email: &str,
    purpose: OtpPurpose,
    code: &str,
) -> Result<(), AppError> {
    let invalid = || AppError::BadRequest("Invalid or expired code".into());

    let stored = otps.find(email, purpose).await?.ok_or_else(invalid)?;

    if stored.expires_at < Utc::now() {
        otps.delete(email, purpose).await?;
        return Err(invalid());
    }
    if stored.attempts >= MAX_OTP_ATTEMPTS {
        otps.delete(email, purpose).await?;
        return Err(AppError::BadRequest(
            "Too many attempts, please request a new code".into(),
        ));
    }

    if stored.code_hash != hash_code(email, code) {
        if stored.attempts + 1 >= MAX_OTP_ATTEMPTS {
            otps.delete(email, purpose).await?;
            tracing::warn!(email, ?purpose, "OTP burned after too many failed attempts");
        } else {
            otps.record_failed_attempt(email, purpose).await?;
        }
        return Err(invalid());
    }

    otps.delete(email, purpose).await?;
    Ok(())
}

fn session_for(user: &User) -> AuthenticatedUser {
    AuthenticatedUser {
        user_id: user.id.clone(),
        email: user.email.clone(),
        role: user.role,
    }
}

/// Register a student or company account in `pending` state and email a
/// verification code.
pub async fn process_register(
    state: &AppState,
    request: RegisterRequest,
) -> Result<RegisterResponse, AppError> {
    let repos = &state.repos;
    let email = normalize_email(&request.email)?;
    validate_password(&request.password)?;
    let role = match Role::from_str_ci(&request.role) {
        Some(Role::Admin) => {
            return Err(AppError::BadRequest(
                "Admin accounts cannot be self-registered".into(),
            ))
        }
        Some(role) => role,
        None => {
            return Err(AppError::BadRequest(format!(
                "Invalid role '{}'. Expected: student, company",
                request.role
            )))
        }
    };
    let first_name = required(&request.first_name, "First name")?;
    let last_name = required(&request.last_name, "Last name")?;

    if repos.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::BadRequest("Email is already registered".into()));
    }

    let company_name = match role {
        Role::Company => {
            let name = required(request.company_name.as_deref().unwrap_or(""), "Company name")?;
            if request.is_owner {
                ensure_owner_slot_free(repos.rosters.as_ref(), &name).await?;
            }
            Some(name)
        }
        _ => None,
    };

    let now = Utc::now();
    let user = User {
        id: new_id(),
        email: email.clone(),
        password_hash: hash_password_blocking(&request.password).await?,
        role,
        status: UserStatus::Pending,
        created_at: now,
        updated_at: now,
    };
    repos.users.insert(user.clone()).await.map_err(|e| match e {
        AppError::Conflict(_) => AppError::BadRequest("Email is already registered".into()),
        other => other,
    })?;

    let profile = match company_name {
        Some(company_name) => {
            let position = request.position.unwrap_or_default().trim().to_string();
            create_company_profile(
                state,
                &user,
                &first_name,
                &last_name,
                &company_name,
                &position,
                request.is_owner,
            )
            .await
        }
        None => {
            repos
                .students
                .save(Student::new(&user.id, &email, &first_name, &last_name))
                .await
        }
    };

    if let Err(e) = profile {
        // Undo the account so the email can be registered again.
        if let Err(cleanup) = repos.users.delete(&user.id).await {
            tracing::error!(user_id = %user.id, "Failed to remove user after profile error: {cleanup}");
        }
        return Err(e);
    }

    let code = issue_otp(
        repos.otps.as_ref(),
        &email,
        OtpPurpose::Verify,
        state.config.otp_ttl_minutes,
    )
    .await?;
    let message = state.templates.verification(
        &email,
        &first_name,
        &code,
        state.config.otp_ttl_minutes,
    )?;
    send_mail(state.mailer.as_ref(), message).await;

    tracing::info!(user_id = %user.id, %role, "User registered");

    Ok(RegisterResponse {
        message: "Registration successful. Check your email for the verification code.".into(),
        user: UserView::from(&user),
    })
}

async fn create_company_profile(
    state: &AppState,
    user: &User,
    first_name: &str,
    last_name: &str,
    company_name: &str,
    position: &str,
    is_owner: bool,
) -> Result<(), AppError> {
    let registrant = Registrant {
        user_id: user.id.clone(),
        name: format!("{first_name} {last_name}"),
        email: user.email.clone(),
        position: position.to_string(),
    };
    let rosters = state.repos.rosters.as_ref();
    let membership = join_roster(rosters, company_name, &registrant, is_owner).await?;

    let now = Utc::now();
    let saved = state
        .repos
        .members
        .save(CompanyMember {
            id: new_id(),
            user_id: user.id.clone(),
            roster_id: membership.roster.id.clone(),
            email: user.email.clone(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            position: position.to_string(),
            phone: String::new(),
            is_owner,
            created_at: now,
            updated_at: now,
        })
        .await;

    if saved.is_err() {
        // Free the roster slot before the account itself is rolled back.
        if let Err(cleanup) = undo_join(rosters, &membership, &user.id).await {
            tracing::error!(
                roster_id = %membership.roster.id,
                user_id = %user.id,
                "Failed to leave roster after profile error: {cleanup}"
            );
        }
    }
    saved
}

/// Activate a pending account with its verification code.
pub async fn process_verify_otp(
    users: &dyn UserRepository,
    otps: &dyn OtpRepository,
    tokens: &TokenService,
    request: VerifyOtpRequest,
) -> Result<AuthResponse, AppError> {
    let email = normalize_email(&request.email)?;
    check_otp(otps, &email, OtpPurpose::Verify, &request.code).await?;

    let mut user = users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired code".into()))?;

    match user.status {
        UserStatus::Suspended => {
            return Err(AppError::Forbidden("Your account is suspended".into()))
        }
        UserStatus::Pending => {
            users.set_status(&user.id, UserStatus::Active).await?;
            user.status = UserStatus::Active;
            tracing::info!(user_id = %user.id, "Email verified, account activated");
        }
        UserStatus::Active => {}
    }

    Ok(AuthResponse {
        token: tokens.issue(&session_for(&user))?,
        user: UserView::from(&user),
    })
}

pub async fn process_resend_otp(state: &AppState, request: EmailRequest) -> Result<(), AppError> {
    let email = normalize_email(&request.email)?;
    let user = state
        .repos
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound("No account with this email".into()))?;
    if user.status != UserStatus::Pending {
        return Err(AppError::BadRequest("Account is already verified".into()));
    }

    let code = issue_otp(
        state.repos.otps.as_ref(),
        &email,
        OtpPurpose::Verify,
        state.config.otp_ttl_minutes,
    )
    .await?;
    let name = match state.repos.students.find_by_user_id(&user.id).await? {
        Some(student) => student.first_name,
        None => state
            .repos
            .members
            .find_by_user_id(&user.id)
            .await?
            .map(|m| m.first_name)
            .unwrap_or_default(),
    };
    let message = state
        .templates
        .verification(&email, &name, &code, state.config.otp_ttl_minutes)?;
    send_mail(state.mailer.as_ref(), message).await;
    Ok(())
}

pub async fn process_login(
    users: &dyn UserRepository,
    tokens: &TokenService,
    request: LoginRequest,
) -> Result<AuthResponse, AppError> {
    let wrong = || AppError::Auth("Invalid email or password".into());
    let email = request.email.trim().to_lowercase();

    let user = users.find_by_email(&email).await?;
    let matched = verify_password_blocking(
        &request.password,
        user.as_ref().map(|u| u.password_hash.as_str()),
    )
    .await?;
    let user = match user {
        Some(user) if matched => user,
        _ => return Err(wrong()),
    };

    match user.status {
        UserStatus::Pending => Err(AppError::Forbidden(
            "Please verify your email before logging in".into(),
        )),
        UserStatus::Suspended => Err(AppError::Forbidden("Your account is suspended".into())),
        UserStatus::Active => {
            tracing::info!(user_id = %user.id, "User logged in");
            Ok(AuthResponse {
                token: tokens.issue(&session_for(&user))?,
                user: UserView::from(&user),
            })
        }
    }
}

/// Always succeeds so the endpoint cannot be used to probe for accounts.
pub async fn process_forgot_password(state: &AppState, request: EmailRequest) -> Result<(), AppError> {
    let Ok(email) = normalize_email(&request.email) else {
        return Ok(());
    };
    let Some(user) = state.repos.users.find_by_email(&email).await? else {
        return Ok(());
    };
    if user.status == UserStatus::Suspended {
        return Ok(());
    }

    let code = issue_otp(
        state.repos.otps.as_ref(),
        &email,
        OtpPurpose::Reset,
        state.config.otp_ttl_minutes,
    )
    .await?;
    let message = state
        .templates
        .password_reset(&email, &code, state.config.otp_ttl_minutes)?;
    send_mail(state.mailer.as_ref(), message).await;
    Ok(())
}

pub async fn process_reset_password(
    users: &dyn UserRepository,
    otps: &dyn OtpRepository,
    request: ResetPasswordRequest,
) -> Result<(), AppError> {
    let email = normalize_email(&request.email)?;
    validate_password(&request.new_password)?;
    check_otp(otps, &email, OtpPurpose::Reset, &request.code).await?;

    let user = users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired code".into()))?;
    users
        .set_password_hash(&user.id, &hash_password_blocking(&request.new_password).await?)
        .await?;
    tracing::info!(user_id = %user.id, "Password reset");
    Ok(())
}

pub async fn process_change_password(
    users: &dyn UserRepository,
    caller: &AuthenticatedUser,
    request: ChangePasswordRequest,
) -> Result<(), AppError> {
    let user = users
        .find_by_id(&caller.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    if !verify_password_blocking(&request.current_password, Some(&user.password_hash)).await? {
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }
    validate_password(&request.new_password)?;
    users
        .set_password_hash(&user.id, &hash_password_blocking(&request.new_password).await?)
        .await?;
    tracing::info!(user_id = %user.id, "Password changed");
    Ok(())
}

// -- Handlers --

/// `POST /api/auth/register`
pub async fn register_handler(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let response = process_register(&state, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// `POST /api/auth/verify-otp`
pub async fn verify_otp_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let response = process_verify_otp(
        state.repos.users.as_ref(),
        state.repos.otps.as_ref(),
        &state.tokens,
        request,
    )
    .await?;
    let cookie = session_cookie(
        response.token.clone(),
        state.tokens.ttl(),
        state.config.secure_cookies,
    );
    Ok((jar.add(cookie), Json(response)))
}

/// `POST /api/auth/resend-otp`
pub async fn resend_otp_handler(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    process_resend_otp(&state, request).await?;
    Ok(MessageResponse::new("A new verification code has been sent"))
}

/// `POST /api/auth/login`
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let response = process_login(state.repos.users.as_ref(), &state.tokens, request).await?;
    let cookie = session_cookie(
        response.token.clone(),
        state.tokens.ttl(),
        state.config.secure_cookies,
    );
    Ok((jar.add(cookie), Json(response)))
}

/// `POST /api/auth/logout`
pub async fn logout_handler(jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    (jar.add(removal_cookie()), MessageResponse::new("Logged out"))
}

/// `GET /api/auth/me`
pub async fn me_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> Result<Json<UserView>, AppError> {
    let user = state
        .repos
        .users
        .find_by_id(&caller.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(UserView::from(&user)))
}

/// `POST /api/auth/forgot-password`
pub async fn forgot_password_handler(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    process_forgot_password(&state, request).await?;
    Ok(MessageResponse::new(
        "If an account exists for this email, a reset code has been sent",
    ))
}

/// `POST /api/auth/reset-password`
pub async fn reset_password_handler(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    process_reset_password(state.repos.users.as_ref(), state.repos.otps.as_ref(), request).await?;
    Ok(MessageResponse::new("Password has been reset"))
}

/// `PATCH /api/auth/change-password`
pub async fn change_password_handler(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    process_change_password(state.repos.users.as_ref(), &caller, request).await?;
    Ok(MessageResponse::new("Password changed"))
}
