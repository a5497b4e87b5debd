use sqlx::PgPool;
use uuid::Uuid;

/// Ids of the accounts that have blocked `user_id`.
pub async fn blocked_by(pool: &PgPool, user_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>("SELECT blocker_id FROM blocks WHERE blocked_id = $1")
        .bind(user_id)
        .fetch_all(pool)
        .await
}

/// True when `owner_id` has blocked `viewer_id`, hiding the owner's content
/// from the viewer.
pub async fn is_blocked(
    pool: &PgPool,
    viewer_id: Uuid,
    owner_id: Uuid,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM blocks WHERE blocker_id = $1 AND blocked_id = $2)",
    )
    .bind(owner_id)
    .bind(viewer_id)
    .fetch_one(pool)
    .await
}
