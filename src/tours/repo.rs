use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::query::{Collection, Column, QuerySpec, ValueKind};
use crate::tours::dto::{CreateTourRequest, UpdateTourRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

pub const TOUR_COLUMNS: &str = "id, name, slug, duration, max_group_size, difficulty, \
     ratings_average, ratings_quantity, price, price_discount, summary, description, \
     image_cover, images, start_dates, start_lat, start_lng, start_address, \
     secret_tour, created_at, row_version";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: Difficulty,
    pub ratings_average: f64,
    pub ratings_quantity: i32,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    #[serde(serialize_with = "crate::tours::dto::serialize_dates")]
    pub start_dates: Vec<OffsetDateTime>,
    pub start_lat: Option<f64>,
    pub start_lng: Option<f64>,
    pub start_address: Option<String>,
    pub secret_tour: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub row_version: i64,
}

/// Queryable surface of the tours table. Secret tours never leave the
/// scope predicate.
pub static TOURS: Collection = Collection {
    table: "tours",
    select_list: TOUR_COLUMNS,
    scope: Some("secret_tour = false"),
    id: "id",
    columns: &[
        Column {
            name: "id",
            sql: "id",
            kind: ValueKind::Id,
        },
        Column {
            name: "name",
            sql: "name",
            kind: ValueKind::Text,
        },
        Column {
            name: "slug",
            sql: "slug",
            kind: ValueKind::Text,
        },
        Column {
            name: "duration",
            sql: "duration",
            kind: ValueKind::Int,
        },
        Column {
            name: "maxGroupSize",
            sql: "max_group_size",
            kind: ValueKind::Int,
        },
        Column {
            name: "difficulty",
            sql: "difficulty",
            kind: ValueKind::Text,
        },
        Column {
            name: "ratingsAverage",
            sql: "ratings_average",
            kind: ValueKind::Float,
        },
        Column {
            name: "ratingsQuantity",
            sql: "ratings_quantity",
            kind: ValueKind::Int,
        },
        Column {
            name: "price",
            sql: "price",
            kind: ValueKind::Float,
        },
        Column {
            name: "priceDiscount",
            sql: "price_discount",
            kind: ValueKind::Float,
        },
        Column {
            name: "createdAt",
            sql: "created_at",
            kind: ValueKind::Timestamp,
        },
    ],
};

/// URL-safe slug derived from the tour name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

pub async fn find(db: &PgPool, spec: &QuerySpec) -> Result<Vec<Tour>, sqlx::Error> {
    let mut query = spec.select_query();
    query.build_query_as::<Tour>().fetch_all(db).await
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<Tour>, sqlx::Error> {
    sqlx::query_as::<_, Tour>(&format!(
        "SELECT {TOUR_COLUMNS} FROM tours WHERE id = $1 AND secret_tour = FALSE"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
}

pub async fn create(db: &PgPool, new: &CreateTourRequest, slug: &str) -> Result<Tour, sqlx::Error> {
    sqlx::query_as::<_, Tour>(&format!(
        "INSERT INTO tours (name, slug, duration, max_group_size, difficulty, price, \
             price_discount, summary, description, image_cover, images, start_dates, \
             start_lat, start_lng, start_address, secret_tour) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
         RETURNING {TOUR_COLUMNS}"
    ))
    .bind(new.name.trim())
    .bind(slug)
    .bind(new.duration)
    .bind(new.max_group_size)
    .bind(new.difficulty)
    .bind(new.price)
    .bind(new.price_discount)
    .bind(new.summary.trim())
    .bind(&new.description)
    .bind(new.image_cover.trim())
    .bind(&new.images)
    .bind(&new.start_dates)
    .bind(new.start_lat)
    .bind(new.start_lng)
    .bind(&new.start_address)
    .bind(new.secret_tour)
    .fetch_one(db)
    .await
}

/// Partial update; absent fields keep their stored value.
pub async fn update(
    db: &PgPool,
    id: Uuid,
    patch: &UpdateTourRequest,
    slug: Option<&str>,
) -> Result<Option<Tour>, sqlx::Error> {
    sqlx::query_as::<_, Tour>(&format!(
        "UPDATE tours SET \
             name = COALESCE($2, name), \
             slug = COALESCE($3, slug), \
             duration = COALESCE($4, duration), \
             max_group_size = COALESCE($5, max_group_size), \
             difficulty = COALESCE($6, difficulty), \
             price = COALESCE($7, price), \
             price_discount = COALESCE($8, price_discount), \
             summary = COALESCE($9, summary), \
             description = COALESCE($10, description), \
             image_cover = COALESCE($11, image_cover), \
             images = COALESCE($12, images), \
             start_dates = COALESCE($13, start_dates), \
             start_lat = COALESCE($14, start_lat), \
             start_lng = COALESCE($15, start_lng), \
             start_address = COALESCE($16, start_address), \
             secret_tour = COALESCE($17, secret_tour), \
             row_version = row_version + 1 \
         WHERE id = $1 \
         RETURNING {TOUR_COLUMNS}"
    ))
    .bind(id)
    .bind(&patch.name)
    .bind(slug)
    .bind(patch.duration)
    .bind(patch.max_group_size)
    .bind(patch.difficulty)
    .bind(patch.price)
    .bind(patch.price_discount)
    .bind(&patch.summary)
    .bind(&patch.description)
    .bind(&patch.image_cover)
    .bind(&patch.images)
    .bind(&patch.start_dates)
    .bind(patch.start_lat)
    .bind(patch.start_lng)
    .bind(&patch.start_address)
    .bind(patch.secret_tour)
    .fetch_optional(db)
    .await
}

pub async fn delete(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM tours WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TourStats {
    pub difficulty: String,
    pub num_tours: i64,
    pub num_ratings: i64,
    pub avg_rating: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

/// Per-difficulty aggregates over well-rated tours.
pub async fn stats(db: &PgPool) -> Result<Vec<TourStats>, sqlx::Error> {
    sqlx::query_as::<_, TourStats>(
        "SELECT upper(difficulty) AS difficulty, \
                COUNT(*) AS num_tours, \
                COALESCE(SUM(ratings_quantity), 0)::BIGINT AS num_ratings, \
                COALESCE(AVG(ratings_average), 0) AS avg_rating, \
                COALESCE(AVG(price), 0) AS avg_price, \
                COALESCE(MIN(price), 0) AS min_price, \
                COALESCE(MAX(price), 0) AS max_price \
         FROM tours \
         WHERE ratings_average >= 4.5 AND secret_tour = FALSE \
         GROUP BY upper(difficulty) \
         ORDER BY num_tours",
    )
    .fetch_all(db)
    .await
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPlan {
    pub month: i32,
    pub tour_count: i64,
    pub tours: Vec<String>,
}

/// Tours starting in each month of the year, busiest month first.
pub async fn monthly_plan(
    db: &PgPool,
    from: OffsetDateTime,
    to: OffsetDateTime,
) -> Result<Vec<MonthlyPlan>, sqlx::Error> {
    sqlx::query_as::<_, MonthlyPlan>(
        "SELECT EXTRACT(MONTH FROM d)::INT AS month, \
                COUNT(*) AS tour_count, \
                ARRAY_AGG(name ORDER BY name) AS tours \
         FROM tours, UNNEST(start_dates) AS d \
         WHERE d >= $1 AND d < $2 AND secret_tour = FALSE \
         GROUP BY month \
         ORDER BY tour_count DESC, month",
    )
    .bind(from)
    .bind(to)
    .fetch_all(db)
    .await
}

/// Great-circle distance in the unit implied by the earth radius bound as
/// `$3`; `$1`/`$2` are the reference point.
const HAVERSINE: &str = "2 * $3 * asin(sqrt( \
     power(sin(radians(start_lat - $1) / 2), 2) + \
     cos(radians($1)) * cos(radians(start_lat)) * \
     power(sin(radians(start_lng - $2) / 2), 2)))";

pub async fn within_radius(
    db: &PgPool,
    lat: f64,
    lng: f64,
    earth_radius: f64,
    distance: f64,
) -> Result<Vec<Tour>, sqlx::Error> {
    sqlx::query_as::<_, Tour>(&format!(
        "SELECT {TOUR_COLUMNS} FROM tours \
         WHERE secret_tour = FALSE \
           AND start_lat IS NOT NULL AND start_lng IS NOT NULL \
           AND {HAVERSINE} <= $4"
    ))
    .bind(lat)
    .bind(lng)
    .bind(earth_radius)
    .bind(distance)
    .fetch_all(db)
    .await
}

#[derive(Debug, Serialize, FromRow)]
pub struct TourDistance {
    pub name: String,
    pub distance: f64,
}

pub async fn distances_from(
    db: &PgPool,
    lat: f64,
    lng: f64,
    earth_radius: f64,
) -> Result<Vec<TourDistance>, sqlx::Error> {
    sqlx::query_as::<_, TourDistance>(&format!(
        "SELECT name, {HAVERSINE} AS distance FROM tours \
         WHERE secret_tour = FALSE \
           AND start_lat IS NOT NULL AND start_lng IS NOT NULL \
         ORDER BY distance",
    ))
    .bind(lat)
    .bind(lng)
    .bind(earth_radius)
    .fetch_all(db)
    .await
}
