use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::dto::is_valid_email;
use crate::auth::extractors::CurrentUser;
use crate::auth::service::AuthService;
use crate::auth::store::Role;
use crate::error::ApiError;
use crate::query::QuerySpec;
use crate::state::AppState;
use crate::users::dto::{AdminUpdateUserRequest, UpdateMeRequest};
use crate::users::repo::{self, USERS};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me))
        .route("/users/updateMe", patch(update_me))
        .route("/users/deleteMe", delete(delete_me))
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

async fn get_me(CurrentUser(user): CurrentUser) -> Json<serde_json::Value> {
    Json(json!({ "status": "success", "data": { "user": user } }))
}

#[instrument(skip(state, user, body))]
async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<UpdateMeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.password.is_some() || body.password_confirm.is_some() {
        return Err(ApiError::BadRequest(
            "This route is not for password updates. Please use /updateMyPassword".into(),
        ));
    }

    let email = body.email.map(|e| e.trim().to_lowercase());
    if let Some(email) = &email {
        if !is_valid_email(email) {
            return Err(ApiError::BadRequest("Please provide a valid email".into()));
        }
    }

    let updated = repo::update(
        &state.db,
        user.id,
        body.name.as_deref(),
        email.as_deref(),
        body.photo.as_deref(),
        None,
        None,
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("No user found with that ID".into()))?;

    info!(user_id = %updated.id, "profile updated");
    Ok(Json(
        json!({ "status": "success", "data": { "user": updated } }),
    ))
}

#[instrument(skip(state, user))]
async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<StatusCode, ApiError> {
    repo::deactivate(&state.db, user.id).await?;
    info!(user_id = %user.id, "account deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, user))]
async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    AuthService::authorize(&user, &[Role::Admin])?;

    let spec = QuerySpec::apply(&USERS, &params)?;
    let users = repo::find(&state.db, &spec).await?;
    let mut data = serde_json::to_value(&users).map_err(anyhow::Error::from)?;
    spec.projection().apply(&mut data);

    Ok(Json(json!({
        "status": "success",
        "results": users.len(),
        "data": { "users": data },
    })))
}

/// Account creation always goes through /signup, which hashes the
/// password and issues a session; this admin route answers with an
/// explicit error instead.
async fn create_user() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "status": "error",
            "message": "This route is not available. Please use /signup instead",
        })),
    )
        .into_response()
}

#[instrument(skip(state, user))]
async fn get_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    AuthService::authorize(&user, &[Role::Admin])?;

    let found = repo::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No user found with that ID".into()))?;
    Ok(Json(
        json!({ "status": "success", "data": { "user": found } }),
    ))
}

#[instrument(skip(state, user, body))]
async fn update_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<AdminUpdateUserRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    AuthService::authorize(&user, &[Role::Admin])?;

    let email = body.email.map(|e| e.trim().to_lowercase());
    let updated = repo::update(
        &state.db,
        id,
        body.name.as_deref(),
        email.as_deref(),
        body.photo.as_deref(),
        body.role,
        body.active,
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("No user found with that ID".into()))?;

    info!(admin_id = %user.id, user_id = %updated.id, "user updated by admin");
    Ok(Json(
        json!({ "status": "success", "data": { "user": updated } }),
    ))
}

#[instrument(skip(state, user))]
async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    AuthService::authorize(&user, &[Role::Admin])?;

    if !repo::delete(&state.db, id).await? {
        warn!(user_id = %id, "delete for missing user");
        return Err(ApiError::NotFound("No user found with that ID".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}
