use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::store::{Role, User, USER_COLUMNS};
use crate::query::{Collection, Column, QuerySpec, ValueKind};

/// Queryable surface of the users table. The `active = true` scope keeps
/// deactivated accounts out of every listing; credential columns are not
/// in the whitelist.
pub static USERS: Collection = Collection {
    table: "users",
    select_list: USER_COLUMNS,
    scope: Some("active = true"),
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
            name: "email",
            sql: "email",
            kind: ValueKind::Text,
        },
        Column {
            name: "role",
            sql: "role",
            kind: ValueKind::Text,
        },
        Column {
            name: "createdAt",
            sql: "created_at",
            kind: ValueKind::Timestamp,
        },
    ],
};

pub async fn find(db: &PgPool, spec: &QuerySpec) -> Result<Vec<User>, sqlx::Error> {
    let mut query = spec.select_query();
    query.build_query_as::<User>().fetch_all(db).await
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND active = TRUE"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
}

/// Partial profile update; absent fields keep their stored value. Password
/// columns are deliberately untouchable here.
pub async fn update(
    db: &PgPool,
    id: Uuid,
    name: Option<&str>,
    email: Option<&str>,
    photo: Option<&str>,
    role: Option<Role>,
    active: Option<bool>,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET \
             name = COALESCE($2, name), \
             email = COALESCE($3, email), \
             photo = COALESCE($4, photo), \
             role = COALESCE($5, role), \
             active = COALESCE($6, active), \
             row_version = row_version + 1 \
         WHERE id = $1 \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(name)
    .bind(email)
    .bind(photo)
    .bind(role)
    .bind(active)
    .fetch_optional(db)
    .await
}

/// Soft delete: the account disappears from queries and token checks but
/// the row survives.
pub async fn deactivate(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET active = FALSE, row_version = row_version + 1 WHERE id = $1",
    )
    .bind(id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}
