use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

/// Emitted after a review write commits; the producer does not care how
/// the aggregates get refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewWritten {
    pub tour_id: Uuid,
}

/// Rating shown when a tour has no reviews yet.
const DEFAULT_AVERAGE: f64 = 4.5;

/// Recomputes the tour's rating aggregates from its live reviews.
pub async fn apply(db: &PgPool, event: ReviewWritten) -> Result<(), sqlx::Error> {
    let (count, average): (i64, Option<f64>) =
        sqlx::query_as("SELECT COUNT(*), AVG(rating::FLOAT8) FROM reviews WHERE tour_id = $1")
            .bind(event.tour_id)
            .fetch_one(db)
            .await?;
    let (quantity, average) = rating_totals(count, average);

    sqlx::query(
        "UPDATE tours SET ratings_quantity = $2, ratings_average = $3, \
             row_version = row_version + 1 \
         WHERE id = $1",
    )
    .bind(event.tour_id)
    .bind(quantity as i32)
    .bind(average)
    .execute(db)
    .await?;

    debug!(tour_id = %event.tour_id, quantity, average, "tour ratings recomputed");
    Ok(())
}

/// Collapses raw aggregates into what the tour stores: a one-decimal
/// average, falling back to the default once the last review is gone.
pub fn rating_totals(count: i64, average: Option<f64>) -> (i64, f64) {
    match average {
        Some(avg) if count > 0 => (count, round_to_tenth(avg)),
        _ => (0, DEFAULT_AVERAGE),
    }
}

pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
