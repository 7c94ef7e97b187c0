use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::json;
use time::{Date, Month, OffsetDateTime};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::extractors::{CurrentUser, MaybeUser};
use crate::auth::service::AuthService;
use crate::auth::store::Role;
use crate::error::ApiError;
use crate::query::QuerySpec;
use crate::reviews::repo as reviews_repo;
use crate::state::AppState;
use crate::tours::dto::{name_problems, validate_create, CreateTourRequest, UpdateTourRequest};
use crate::tours::repo::{self, slugify, TOURS};

const TOUR_EDITORS: &[Role] = &[Role::Admin, Role::LeadGuide];
const PLANNERS: &[Role] = &[Role::Admin, Role::LeadGuide, Role::Guide];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tours", get(list_tours).post(create_tour))
        .route("/tours/top-5-cheap", get(top_cheap))
        .route("/tours/stats", get(tour_stats))
        .route("/tours/monthly-plan/:year", get(monthly_plan))
        .route(
            "/tours/tours-within/:distance/center/:latlng/unit/:unit",
            get(tours_within),
        )
        .route("/tours/distances/:latlng/unit/:unit", get(distances))
        .route(
            "/tours/:id",
            get(get_tour).patch(update_tour).delete(delete_tour),
        )
}

async fn run_list(
    state: &AppState,
    params: &HashMap<String, String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let spec = QuerySpec::apply(&TOURS, params)?;
    let tours = repo::find(&state.db, &spec).await?;
    let mut data = serde_json::to_value(&tours).map_err(anyhow::Error::from)?;
    spec.projection().apply(&mut data);

    Ok(Json(json!({
        "status": "success",
        "results": tours.len(),
        "data": { "tours": data },
    })))
}

#[instrument(skip(state))]
async fn list_tours(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    run_list(&state, &params).await
}

/// Alias listing: the five best-rated cheap tours.
#[instrument(skip(state))]
async fn top_cheap(
    State(state): State<AppState>,
    Query(mut params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    params.insert("limit".into(), "5".into());
    params.insert("sort".into(), "-ratingsAverage,price".into());
    run_list(&state, &params).await
}

/// Tour detail with its reviews embedded; a logged-in caller also gets
/// their own review surfaced separately.
#[instrument(skip(state, viewer))]
async fn get_tour(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tour = repo::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No tour found with that ID".into()))?;
    let reviews = reviews_repo::find_for_tour(&state.db, id).await?;

    let mut tour_json = serde_json::to_value(&tour).map_err(anyhow::Error::from)?;
    tour_json["reviews"] = serde_json::to_value(&reviews).map_err(anyhow::Error::from)?;

    let mut data = serde_json::Map::new();
    data.insert("tour".into(), tour_json);
    if let Some(viewer) = viewer {
        if let Some(mine) = reviews.iter().find(|r| r.user_id == viewer.id) {
            data.insert(
                "myReview".into(),
                serde_json::to_value(mine).map_err(anyhow::Error::from)?,
            );
        }
    }

    Ok(Json(json!({ "status": "success", "data": data })))
}

#[instrument(skip(state, user, body))]
async fn create_tour(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<CreateTourRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    AuthService::authorize(&user, TOUR_EDITORS)?;

    let problems = validate_create(&body);
    if !problems.is_empty() {
        return Err(ApiError::Validation(problems));
    }

    let slug = slugify(body.name.trim());
    let tour = repo::create(&state.db, &body, &slug).await?;
    info!(tour_id = %tour.id, "tour created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "success", "data": { "tour": tour } })),
    ))
}

#[instrument(skip(state, user, body))]
async fn update_tour(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateTourRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    AuthService::authorize(&user, TOUR_EDITORS)?;

    let slug = match &body.name {
        Some(name) => {
            let problems = name_problems(name);
            if !problems.is_empty() {
                return Err(ApiError::Validation(problems));
            }
            Some(slugify(name.trim()))
        }
        None => None,
    };

    let tour = repo::update(&state.db, id, &body, slug.as_deref())
        .await?
        .ok_or_else(|| ApiError::NotFound("No tour found with that ID".into()))?;
    info!(tour_id = %tour.id, "tour updated");
    Ok(Json(json!({ "status": "success", "data": { "tour": tour } })))
}

#[instrument(skip(state, user))]
async fn delete_tour(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    AuthService::authorize(&user, TOUR_EDITORS)?;

    if !repo::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("No tour found with that ID".into()));
    }
    info!(tour_id = %id, "tour deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
async fn tour_stats(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let stats = repo::stats(&state.db).await?;
    Ok(Json(json!({ "status": "success", "data": { "stats": stats } })))
}

#[instrument(skip(state, user))]
async fn monthly_plan(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(year): Path<i32>,
) -> Result<Json<serde_json::Value>, ApiError> {
    AuthService::authorize(&user, PLANNERS)?;

    let from = year_start(year)?;
    let to = year_start(year + 1)?;
    let plan = repo::monthly_plan(&state.db, from, to).await?;
    Ok(Json(json!({ "status": "success", "data": { "plan": plan } })))
}

/// `/tours/tours-within/233/center/34.1,-118.1/unit/mi`
#[instrument(skip(state))]
async fn tours_within(
    State(state): State<AppState>,
    Path((distance, latlng, unit)): Path<(f64, String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (lat, lng) = parse_latlng(&latlng)?;
    if !distance.is_finite() || distance < 0.0 {
        return Err(ApiError::BadRequest(
            "Please provide a non-negative distance".into(),
        ));
    }

    let tours = repo::within_radius(&state.db, lat, lng, earth_radius(&unit), distance).await?;
    Ok(Json(json!({
        "status": "success",
        "results": tours.len(),
        "data": { "tours": tours },
    })))
}

#[instrument(skip(state))]
async fn distances(
    State(state): State<AppState>,
    Path((latlng, unit)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (lat, lng) = parse_latlng(&latlng)?;
    let distances = repo::distances_from(&state.db, lat, lng, earth_radius(&unit)).await?;
    Ok(Json(json!({
        "status": "success",
        "data": { "distances": distances },
    })))
}

fn year_start(year: i32) -> Result<OffsetDateTime, ApiError> {
    Date::from_calendar_date(year, Month::January, 1)
        .map(|d| d.midnight().assume_utc())
        .map_err(|_| ApiError::BadRequest(format!("Invalid year: {year}")))
}

fn earth_radius(unit: &str) -> f64 {
    if unit == "mi" {
        3963.2
    } else {
        6378.1
    }
}

fn parse_latlng(raw: &str) -> Result<(f64, f64), ApiError> {
    let malformed = || {
        ApiError::BadRequest(
            "Please provide latitude and longitude in the format lat,lng".into(),
        )
    };
    let (lat, lng) = raw.split_once(',').ok_or_else(malformed)?;
    let lat: f64 = lat.trim().parse().map_err(|_| malformed())?;
    let lng: f64 = lng.trim().parse().map_err(|_| malformed())?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(malformed());
    }
    Ok((lat, lng))
}
