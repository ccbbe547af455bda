use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::auth::models::{AuthenticatedUser, UserStatus};
use crate::error::AppError;
use crate::state::AppState;

/// Name of the http-only session cookie set on login.
pub const AUTH_COOKIE: &str = "ic_token";

/// Token from `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(AUTH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// The header wins when both a bearer token and the cookie are present.
pub fn request_token(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| cookie_token(headers))
}

async fn authenticate(headers: &HeaderMap, state: &AppState) -> Result<AuthenticatedUser, AppError> {
    let token = request_token(headers)
        .ok_or_else(|| AppError::Auth("Authentication required".into()))?;
    let claims = state.tokens.verify(&token)?;

    // Role and status come from the database so suspensions and promotions
    // take effect before the token expires.
    let user = state
        .repos
        .users
        .find_by_id(&claims.user_id)
        .await?
        .ok_or_else(|| AppError::Auth("Account no longer exists".into()))?;

    match user.status {
        UserStatus::Active => Ok(AuthenticatedUser {
            user_id: user.id,
            email: user.email,
            role: user.role,
        }),
        UserStatus::Suspended => Err(AppError::Forbidden("Your account is suspended".into())),
        UserStatus::Pending => Err(AppError::Forbidden("Please verify your email first".into())),
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authenticate(&parts.headers, state).await
    }
}

/// The caller when a valid session is present, `None` for anonymous requests.
///
/// An invalid token is treated like no token at all.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthenticatedUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if request_token(&parts.headers).is_none() {
            return Ok(MaybeUser(None));
        }
        match authenticate(&parts.headers, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(AppError::Auth(_)) | Err(AppError::Forbidden(_)) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}

/// Session cookie carrying the JWT.
pub fn session_cookie(token: String, ttl: chrono::Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::seconds(ttl.num_seconds()))
        .build()
}

/// Cookie that clears the session on the client.
pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build((AUTH_COOKIE, "")).path("/").build();
    cookie.make_removal();
    cookie
}
