use crate::{
    AppState,
    auth_provider::{AuthError, AuthSession, AuthUser},
    error::AppError,
    models::{PROFILE_COLUMNS, Profile},
    signup::{self, SignupRequest, SignupResponse},
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<SignupResponse>), AppError> {
    let body = match payload {
        Ok(Json(Value::Object(map))) if !map.is_empty() => Value::Object(map),
        _ => {
            return Err(
                AppError::bad_request("Request body is empty or not in JSON format").with_hint(
                    "Set Content-Type: application/json and send a JSON object with email, password and username",
                ),
            );
        }
    };
    let request: SignupRequest = serde_json::from_value(body)
        .map_err(|e| AppError::bad_request(format!("Invalid signup request: {e}")))?;

    let account = signup::validate(request)?;
    let response = signup::register(
        &state.db,
        state.auth.as_ref(),
        &state.config.signup,
        account,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    user: AuthUser,
    profile: Profile,
    session: AuthSession,
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(payload) = payload?;
    let (Some(email), Some(password)) = (
        payload.email.as_deref().map(str::trim).filter(|e| !e.is_empty()),
        payload.password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::bad_request("Email and password are required"));
    };

    let reject = |e: AuthError| match e {
        AuthError::Rejected { message, .. } => AppError::unauthorized(message),
        other => AppError::from(other),
    };

    let session = state
        .auth
        .sign_in(&email.to_lowercase(), password)
        .await
        .map_err(reject)?;
    let user = match session.user.clone() {
        Some(user) => user,
        None => state
            .auth
            .get_user(&session.access_token)
            .await
            .map_err(reject)?,
    };

    let profile = sqlx::query_as::<_, Profile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1 AND is_deleted = FALSE"
    ))
    .bind(user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::unauthorized("User profile not found"))?;

    Ok(Json(LoginResponse {
        user,
        profile,
        session,
    }))
}
