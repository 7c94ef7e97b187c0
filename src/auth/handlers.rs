use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::auth::dto::{
    is_valid_email, password_problems, ForgotPasswordRequest, LoginRequest, ResetPasswordRequest,
    SignupRequest, UpdatePasswordRequest,
};
use crate::auth::extractors::CurrentUser;
use crate::auth::password::hash_password;
use crate::auth::service::Session;
use crate::auth::store::{NewUser, Role, User};
use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/logout", get(logout))
        .route("/users/forgotPassword", post(forgot_password))
        .route("/users/resetPassword/:token", patch(reset_password))
        .route("/users/updateMyPassword", patch(update_my_password))
}

/// Body token plus mirroring cookie plus the (secret-stripped) user.
fn session_response(status: StatusCode, user: &User, session: Session) -> Response {
    (
        status,
        [(header::SET_COOKIE, session.cookie)],
        Json(json!({
            "status": "success",
            "token": session.token,
            "data": { "user": user },
        })),
    )
        .into_response()
}

#[instrument(skip(state, body))]
async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> Result<Response, ApiError> {
    let email = body.email.trim().to_lowercase();

    let mut problems = Vec::new();
    if body.name.trim().is_empty() {
        problems.push("A user must have a name".to_string());
    }
    if !is_valid_email(&email) {
        problems.push("Please provide a valid email".to_string());
    }
    problems.extend(password_problems(&body.password, &body.password_confirm));
    if !problems.is_empty() {
        return Err(ApiError::Validation(problems));
    }

    if state.auth.store().find_by_email(&email).await?.is_some() {
        warn!(email = %email, "signup with taken email");
        return Err(ApiError::Conflict(
            "Duplicate value for email. Please use another value".into(),
        ));
    }

    let user = state
        .auth
        .store()
        .create(NewUser {
            name: body.name.trim().to_string(),
            email,
            password_hash: hash_password(&body.password)?,
            photo: body.photo,
            role: body.role.unwrap_or(Role::User),
        })
        .await
        .map_err(ApiError::from_store)?;
    let session = state.auth.issue_session(user.id)?;

    info!(user_id = %user.id, "user signed up");
    Ok(session_response(StatusCode::CREATED, &user, session))
}

#[instrument(skip(state, body))]
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let email = body.email.trim().to_lowercase();
    if email.is_empty() || body.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Please provide your email and password".into(),
        ));
    }

    let (user, session) = state.auth.login(&email, &body.password).await?;
    Ok(session_response(StatusCode::OK, &user, session))
}

/// Clearing the session is purely client-side: the cookie is overwritten
/// with a sentinel that expires almost immediately.
async fn logout(State(state): State<AppState>) -> Response {
    (
        [(header::SET_COOKIE, state.auth.logout_cookie())],
        Json(json!({ "status": "success" })),
    )
        .into_response()
}

#[instrument(skip(state, body))]
async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let email = body.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("Please provide a valid email".into()));
    }

    state.auth.forgot_password(&email).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Token sent to email",
    })))
}

#[instrument(skip(state, token, body))]
async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Response, ApiError> {
    let problems = password_problems(&body.password, &body.password_confirm);
    if !problems.is_empty() {
        return Err(ApiError::Validation(problems));
    }

    let (user, session) = state.auth.reset_password(&token, &body.password).await?;
    Ok(session_response(StatusCode::OK, &user, session))
}

#[instrument(skip(state, user, body))]
async fn update_my_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<UpdatePasswordRequest>,
) -> Result<Response, ApiError> {
    let problems = password_problems(&body.password, &body.password_confirm);
    if !problems.is_empty() {
        return Err(ApiError::Validation(problems));
    }

    let session = state
        .auth
        .update_password(&user, &body.current_password, &body.password)
        .await?;
    let user = state
        .auth
        .store()
        .find_by_id(user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No user found with that ID".into()))?;
    Ok(session_response(StatusCode::OK, &user, session))
}
