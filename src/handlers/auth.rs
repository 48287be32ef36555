use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::db::{self, models::UserProfile, queries};
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::services::{auth as auth_service, mailer};
use crate::validation::{self, ADDRESS_MAX_LEN, NAME_MAX_LEN};
use crate::AppState;

const RESET_TOKEN_TTL_MINUTES: i64 = 60;
const BAD_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

fn optional_phone(phone: Option<&str>) -> Result<Option<String>, AppError> {
    match phone.map(str::trim).filter(|p| !p.is_empty()) {
        Some(phone) => Ok(Some(validation::normalize_phone(phone)?)),
        None => Ok(None),
    }
}

fn optional_address(address: Option<&str>) -> Result<Option<String>, AppError> {
    match address.map(str::trim).filter(|a| !a.is_empty()) {
        Some(address) => Ok(Some(validation::validate_text("address", address, ADDRESS_MAX_LEN)?)),
        None => Ok(None),
    }
}

fn session_response(
    state: &AppState,
    status: StatusCode,
    token: String,
    profile: UserProfile,
) -> impl IntoResponse {
    let cookie = auth_service::session_cookie(&token, state.jwt.ttl(), state.config.cookie_secure);
    (
        status,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "token": token, "user": profile })),
    )
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = validation::normalize_email(&body.email)?;
    validation::validate_password(&body.password)?;
    let full_name = validation::validate_text("full_name", &body.full_name, NAME_MAX_LEN)?;
    let phone = optional_phone(body.phone.as_deref())?;
    let address = optional_address(body.address.as_deref())?;

    let password_hash = auth_service::hash_password(&body.password)?;
    let (verification_token, verification_hash) = auth_service::generate_one_time_token();

    let user = queries::insert_user(
        &state.db,
        &queries::NewUser {
            email: &email,
            password_hash: &password_hash,
            full_name: &full_name,
            phone: phone.as_deref(),
            address: address.as_deref(),
            verification_token_hash: &verification_hash,
        },
    )
    .await
    .map_err(|e| {
        if db::is_unique_violation(&e) {
            AppError::Conflict("Email is already registered".to_string())
        } else {
            AppError::Database(e)
        }
    })?;

    tracing::info!(user_id = user.id, "user registered");
    mailer::send_best_effort(
        state.mailer.clone(),
        mailer::verification_email(&user.email, &state.config.public_base_url, &verification_token),
    );

    let token = state.jwt.issue(user.id, &user.role)?;
    Ok(session_response(&state, StatusCode::CREATED, token, UserProfile::from(&user)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = body.email.trim().to_lowercase();
    let user = queries::find_user_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| AppError::Unauthorized(BAD_CREDENTIALS.to_string()))?;

    if !auth_service::verify_password(&user.password_hash, &body.password)? {
        tracing::info!(user_id = user.id, "failed login attempt");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.to_string()));
    }

    let token = state.jwt.issue(user.id, &user.role)?;
    tracing::info!(user_id = user.id, "user logged in");
    Ok(session_response(&state, StatusCode::OK, token, UserProfile::from(&user)))
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(
            header::SET_COOKIE,
            auth_service::clear_session_cookie(state.config.cookie_secure),
        )],
        Json(json!({ "message": "Logged out" })),
    )
}

pub async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<UserProfile>, AppError> {
    let user = queries::find_user_by_id(&state.db, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(UserProfile::from(&user)))
}

pub async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, AppError> {
    let full_name = validation::validate_text("full_name", &body.full_name, NAME_MAX_LEN)?;
    let phone = optional_phone(body.phone.as_deref())?;
    let address = optional_address(body.address.as_deref())?;

    let updated = queries::update_profile(
        &state.db,
        user.id,
        &full_name,
        phone.as_deref(),
        address.as_deref(),
    )
    .await?;
    Ok(Json(UserProfile::from(&updated)))
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let account = queries::find_user_by_id(&state.db, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if !auth_service::verify_password(&account.password_hash, &body.current_password)? {
        return Err(AppError::BadRequest("Current password is incorrect".to_string()));
    }
    validation::validate_password(&body.new_password)?;

    let hash = auth_service::hash_password(&body.new_password)?;
    queries::update_password(&state.db, account.id, &hash).await?;
    tracing::info!(user_id = account.id, "password changed");

    Ok(Json(json!({ "message": "Password updated" })))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<impl IntoResponse, AppError> {
    let digest = auth_service::hash_one_time_token(&query.token);
    let user = queries::verify_email(&state.db, &digest)
        .await?
        .ok_or_else(|| AppError::BadRequest("Verification link is invalid or already used".to_string()))?;

    tracing::info!(user_id = user.id, "email verified");
    Ok(Json(json!({ "message": "Email verified", "user": UserProfile::from(&user) })))
}

/// Always answers 200 so the endpoint cannot be used to probe for accounts.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = body.email.trim().to_lowercase();

    if let Some(user) = queries::find_user_by_email(&state.db, &email).await? {
        let (token, digest) = auth_service::generate_one_time_token();
        let expires_at = Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES);
        queries::set_reset_token(&state.db, user.id, &digest, expires_at).await?;

        tracing::info!(user_id = user.id, "password reset requested");
        mailer::send_best_effort(
            state.mailer.clone(),
            mailer::password_reset_email(&user.email, &state.config.public_base_url, &token),
        );
    }

    Ok(Json(json!({
        "message": "If that email is registered, a reset link has been sent"
    })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_password(&body.new_password)?;

    let digest = auth_service::hash_one_time_token(&body.token);
    let hash = auth_service::hash_password(&body.new_password)?;
    let user = queries::reset_password(&state.db, &digest, &hash, Utc::now())
        .await?
        .ok_or_else(|| AppError::BadRequest("Reset link is invalid or has expired".to_string()))?;

    tracing::info!(user_id = user.id, "password reset completed");
    Ok(Json(json!({ "message": "Password has been reset" })))
}
