use crate::{
    activity::{self, NewActivity},
    db,
    error::AppError,
    extractors::{CurrentUser, ResourceId},
    models::{Follow, ObjectType, Verb},
};
use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;

/// Whether `id` is an existing, non-deleted profile.
pub(super) async fn profile_is_active(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM profiles WHERE id = $1 AND is_deleted = FALSE)",
    )
    .bind(id)
    .fetch_one(pool)
    .await
}

pub async fn follow_user(
    State(pool): State<PgPool>,
    user: CurrentUser,
    ResourceId(followee_id): ResourceId,
) -> Result<(StatusCode, Json<Follow>), AppError> {
    if followee_id == user.id {
        return Err(AppError::bad_request("Cannot follow yourself"));
    }
    if !profile_is_active(&pool, followee_id).await? {
        return Err(AppError::not_found("User not found"));
    }

    let already = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM follows WHERE follower_id = $1 AND followee_id = $2)",
    )
    .bind(user.id)
    .bind(followee_id)
    .fetch_one(&pool)
    .await?;
    if already {
        return Err(AppError::bad_request("Already following this user"));
    }

    let follow = sqlx::query_as::<_, Follow>(
        "INSERT INTO follows (follower_id, followee_id) VALUES ($1, $2)
         RETURNING id, follower_id, followee_id, created_at",
    )
    .bind(user.id)
    .bind(followee_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if db::is_unique_violation(&e) {
            AppError::bad_request("Already following this user")
        } else {
            AppError::from(e)
        }
    })?;

    activity::record(
        &pool,
        NewActivity::new(user.id, Verb::Followed, ObjectType::Profile, followee_id),
    )
    .await;

    Ok((StatusCode::CREATED, Json(follow)))
}

pub async fn unfollow_user(
    State(pool): State<PgPool>,
    user: CurrentUser,
    ResourceId(followee_id): ResourceId,
) -> Result<Json<Value>, AppError> {
    let result = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
        .bind(user.id)
        .bind(followee_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Follow not found"));
    }
    Ok(Json(json!({ "message": "Unfollowed successfully" })))
}
