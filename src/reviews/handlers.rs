use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::extractors::CurrentUser;
use crate::auth::service::AuthService;
use crate::auth::store::{Role, User};
use crate::error::ApiError;
use crate::query::QuerySpec;
use crate::reviews::dto::{review_problems, CreateReviewRequest, UpdateReviewRequest};
use crate::reviews::events::{self, ReviewWritten};
use crate::reviews::repo::{self, REVIEWS};
use crate::state::AppState;

const REVIEW_EDITORS: &[Role] = &[Role::User, Role::Admin];

/// Regular users may only touch their own reviews; admins may touch any.
fn check_ownership(user: &User, review: &repo::Review) -> Result<(), ApiError> {
    if user.role != Role::Admin && review.user_id != user.id {
        return Err(ApiError::Forbidden(
            "You do not have permission to perform this action".into(),
        ));
    }
    Ok(())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reviews", get(list_reviews).post(create_review))
        .route(
            "/reviews/:id",
            get(get_review).patch(update_review).delete(delete_review),
        )
        // Same parameter name as /tours/:id so the routes share a tree.
        .route(
            "/tours/:id/reviews",
            get(list_tour_reviews).post(create_tour_review),
        )
}

async fn run_list(
    state: &AppState,
    params: &HashMap<String, String>,
    tour_id: Option<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut spec = QuerySpec::apply(&REVIEWS, params)?;
    if let Some(tour_id) = tour_id {
        spec = spec.constrain("tour", tour_id)?;
    }
    let reviews = repo::find(&state.db, &spec).await?;
    let mut data = serde_json::to_value(&reviews).map_err(anyhow::Error::from)?;
    spec.projection().apply(&mut data);

    Ok(Json(json!({
        "status": "success",
        "results": reviews.len(),
        "data": { "reviews": data },
    })))
}

#[instrument(skip(state, _user))]
async fn list_reviews(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    run_list(&state, &params, None).await
}

#[instrument(skip(state, _user))]
async fn list_tour_reviews(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(tour_id): Path<Uuid>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    run_list(&state, &params, Some(tour_id)).await
}

async fn write_review(
    state: &AppState,
    user: &User,
    body: CreateReviewRequest,
    tour_from_path: Option<Uuid>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    AuthService::authorize(user, &[Role::User])?;

    let problems = review_problems(Some(&body.review), Some(body.rating));
    if !problems.is_empty() {
        return Err(ApiError::Validation(problems));
    }
    let tour_id = tour_from_path
        .or(body.tour)
        .ok_or_else(|| ApiError::BadRequest("A review must be for a specific tour".into()))?;

    let review = repo::create(&state.db, body.review.trim(), body.rating, tour_id, user.id)
        .await
        .map_err(|err| match ApiError::from(err) {
            ApiError::Conflict(_) => {
                ApiError::Conflict("You have already reviewed this tour".into())
            }
            other => other,
        })?;
    events::apply(&state.db, ReviewWritten { tour_id }).await?;

    info!(review_id = %review.id, tour_id = %tour_id, "review created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "success", "data": { "review": review } })),
    ))
}

#[instrument(skip(state, user, body))]
async fn create_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    write_review(&state, &user, body, None).await
}

#[instrument(skip(state, user, body))]
async fn create_tour_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(tour_id): Path<Uuid>,
    Json(body): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    write_review(&state, &user, body, Some(tour_id)).await
}

#[instrument(skip(state, _user))]
async fn get_review(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let review = repo::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No review found with that ID".into()))?;
    Ok(Json(
        json!({ "status": "success", "data": { "review": review } }),
    ))
}

#[instrument(skip(state, user, body))]
async fn update_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateReviewRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    AuthService::authorize(&user, REVIEW_EDITORS)?;

    let problems = review_problems(body.review.as_deref(), body.rating);
    if !problems.is_empty() {
        return Err(ApiError::Validation(problems));
    }

    let existing = repo::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No review found with that ID".into()))?;
    check_ownership(&user, &existing)?;

    let review = repo::update(&state.db, id, body.review.as_deref(), body.rating)
        .await?
        .ok_or_else(|| ApiError::NotFound("No review found with that ID".into()))?;
    events::apply(&state.db, ReviewWritten { tour_id: review.tour_id }).await?;

    info!(review_id = %review.id, "review updated");
    Ok(Json(
        json!({ "status": "success", "data": { "review": review } }),
    ))
}

#[instrument(skip(state, user))]
async fn delete_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    AuthService::authorize(&user, REVIEW_EDITORS)?;

    let review = repo::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No review found with that ID".into()))?;
    check_ownership(&user, &review)?;
    repo::delete(&state.db, id).await?;
    events::apply(&state.db, ReviewWritten { tour_id: review.tour_id }).await?;

    info!(review_id = %id, "review deleted");
    Ok(StatusCode::NO_CONTENT)
}
