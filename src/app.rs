use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{admin, applications, auth, companies, jobs, notifications, stats, students};
use crate::state::AppState;

/// Multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register_handler))
        .route("/verify-otp", post(auth::verify_otp_handler))
        .route("/resend-otp", post(auth::resend_otp_handler))
        .route("/login", post(auth::login_handler))
        .route("/logout", post(auth::logout_handler))
        .route("/me", get(auth::me_handler))
        .route("/forgot-password", post(auth::forgot_password_handler))
        .route("/reset-password", post(auth::reset_password_handler))
        .route("/change-password", patch(auth::change_password_handler))
}

fn student_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/me",
            get(students::get_me_handler).put(students::update_me_handler),
        )
        .route(
            "/me/reminders",
            get(students::list_reminders_handler).post(students::add_reminder_handler),
        )
        .route(
            "/me/reminders/{id}",
            patch(students::update_reminder_handler).delete(students::delete_reminder_handler),
        )
        .route("/me/resume", post(students::upload_resume_handler))
        .route("/me/avatar", post(students::upload_avatar_handler))
        .route("/me/{section}", post(students::add_entry_handler))
        .route("/me/{section}/{entry_id}", delete(students::remove_entry_handler))
        .route("/{user_id}", get(students::get_student_handler))
}

fn company_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/me",
            get(companies::get_me_handler).put(companies::update_me_handler),
        )
        .route("/me/company", put(companies::update_company_handler))
        .route("/me/company/logo", post(companies::upload_logo_handler))
        .route("/me/company/banner", post(companies::upload_banner_handler))
        .route("/me/employees", get(companies::list_employees_handler))
        .route(
            "/me/employees/{user_id}",
            delete(companies::remove_employee_handler),
        )
        .route("/{roster_id}", get(companies::public_company_handler))
}

fn job_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(jobs::list_jobs_handler).post(jobs::create_job_handler),
        )
        .route("/company/mine", get(jobs::company_jobs_handler))
        .route(
            "/{id}",
            get(jobs::get_job_handler)
                .put(jobs::update_job_handler)
                .delete(jobs::delete_job_handler),
        )
        .route("/{id}/status", patch(jobs::job_status_handler))
}

fn application_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(applications::apply_handler))
        .route("/mine", get(applications::my_applications_handler))
        .route("/company", get(applications::company_applications_handler))
        .route("/company/export", get(applications::export_handler))
        .route("/job/{job_id}", get(applications::job_applicants_handler))
        .route("/{id}", delete(applications::withdraw_handler))
        .route(
            "/{id}/status",
            patch(applications::application_status_handler),
        )
}

fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(notifications::list_handler))
        .route("/unread-count", get(notifications::unread_count_handler))
        .route("/read-all", patch(notifications::mark_all_read_handler))
        .route("/{id}/read", patch(notifications::mark_read_handler))
        .route("/{id}", delete(notifications::delete_handler))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(admin::list_users_handler))
        .route("/users/{id}/status", patch(admin::user_status_handler))
        .route("/users/{id}", delete(admin::delete_user_handler))
        .route("/jobs", get(admin::list_jobs_handler))
        .route("/jobs/{id}/status", patch(admin::job_status_handler))
        .route("/jobs/{id}", delete(admin::delete_job_handler))
        .route("/companies", get(admin::list_companies_handler))
        .route("/stats/jobs", get(admin::job_stats_handler))
        .route(
            "/stats/applications/monthly",
            get(admin::monthly_applications_handler),
        )
        .route(
            "/notifications/broadcast",
            post(admin::broadcast_handler),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Assemble the full HTTP surface.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.upload_max_bytes + MULTIPART_OVERHEAD;
    let cors = cors_layer(&state.config.cors_origins);

    let api = Router::new()
        .nest("/auth", auth_routes())
        .nest("/students", student_routes())
        .nest("/companies", company_routes())
        .nest("/jobs", job_routes())
        .nest("/applications", application_routes())
        .nest("/notifications", notification_routes())
        .nest("/admin", admin_routes())
        .route("/stats/public", get(stats::public_stats_handler));

    Router::new()
        .nest("/api", api)
        .route("/uploads/{*key}", get(stats::serve_upload_handler))
        .route("/health", get(stats::health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
