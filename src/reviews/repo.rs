use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::query::{Collection, Column, QuerySpec, ValueKind};

pub const REVIEW_COLUMNS: &str = "id, review, rating, tour_id, user_id, created_at, row_version";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub review: String,
    pub rating: i32,
    #[serde(rename = "tour")]
    pub tour_id: Uuid,
    #[serde(rename = "user")]
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub row_version: i64,
    /// Author's display name, present when the query joined it in.
    #[sqlx(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

pub static REVIEWS: Collection = Collection {
    table: "reviews",
    select_list: REVIEW_COLUMNS,
    scope: None,
    id: "id",
    columns: &[
        Column {
            name: "id",
            sql: "id",
            kind: ValueKind::Id,
        },
        Column {
            name: "rating",
            sql: "rating",
            kind: ValueKind::Int,
        },
        Column {
            name: "tour",
            sql: "tour_id",
            kind: ValueKind::Id,
        },
        Column {
            name: "user",
            sql: "user_id",
            kind: ValueKind::Id,
        },
        Column {
            name: "createdAt",
            sql: "created_at",
            kind: ValueKind::Timestamp,
        },
    ],
};

pub async fn find(db: &PgPool, spec: &QuerySpec) -> Result<Vec<Review>, sqlx::Error> {
    let mut query = spec.select_query();
    query.build_query_as::<Review>().fetch_all(db).await
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<Review>, sqlx::Error> {
    sqlx::query_as::<_, Review>(
        "SELECT r.id, r.review, r.rating, r.tour_id, r.user_id, r.created_at, \
                r.row_version, u.name AS user_name \
         FROM reviews r JOIN users u ON u.id = r.user_id \
         WHERE r.id = $1",
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

/// All reviews of one tour with author names, newest first.
pub async fn find_for_tour(db: &PgPool, tour_id: Uuid) -> Result<Vec<Review>, sqlx::Error> {
    sqlx::query_as::<_, Review>(
        "SELECT r.id, r.review, r.rating, r.tour_id, r.user_id, r.created_at, \
                r.row_version, u.name AS user_name \
         FROM reviews r JOIN users u ON u.id = r.user_id \
         WHERE r.tour_id = $1 \
         ORDER BY r.created_at DESC",
    )
    .bind(tour_id)
    .fetch_all(db)
    .await
}

pub async fn create(
    db: &PgPool,
    review: &str,
    rating: i32,
    tour_id: Uuid,
    user_id: Uuid,
) -> Result<Review, sqlx::Error> {
    sqlx::query_as::<_, Review>(&format!(
        "INSERT INTO reviews (review, rating, tour_id, user_id) \
         VALUES ($1, $2, $3, $4) \
         RETURNING {REVIEW_COLUMNS}"
    ))
    .bind(review)
    .bind(rating)
    .bind(tour_id)
    .bind(user_id)
    .fetch_one(db)
    .await
}

pub async fn update(
    db: &PgPool,
    id: Uuid,
    review: Option<&str>,
    rating: Option<i32>,
) -> Result<Option<Review>, sqlx::Error> {
    sqlx::query_as::<_, Review>(&format!(
        "UPDATE reviews SET \
             review = COALESCE($2, review), \
             rating = COALESCE($3, rating), \
             row_version = row_version + 1 \
         WHERE id = $1 \
         RETURNING {REVIEW_COLUMNS}"
    ))
    .bind(id)
    .bind(review)
    .bind(rating)
    .fetch_optional(db)
    .await
}

pub async fn delete(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}
