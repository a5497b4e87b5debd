use super::follows::profile_is_active;
use crate::{
    activity::{self, NewActivity},
    db,
    error::AppError,
    extractors::{CurrentUser, ResourceId},
    models::{Block, ObjectType, Verb},
};
use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use sqlx::PgPool;

pub async fn block_user(
    State(pool): State<PgPool>,
    user: CurrentUser,
    ResourceId(blocked_id): ResourceId,
) -> Result<(StatusCode, Json<Block>), AppError> {
    if blocked_id == user.id {
        return Err(AppError::bad_request("Cannot block yourself"));
    }
    if !profile_is_active(&pool, blocked_id).await? {
        return Err(AppError::not_found("User not found"));
    }

    let already = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM blocks WHERE blocker_id = $1 AND blocked_id = $2)",
    )
    .bind(user.id)
    .bind(blocked_id)
    .fetch_one(&pool)
    .await?;
    if already {
        return Err(AppError::bad_request("User already blocked"));
    }

    let block = sqlx::query_as::<_, Block>(
        "INSERT INTO blocks (blocker_id, blocked_id) VALUES ($1, $2)
         RETURNING id, blocker_id, blocked_id, created_at",
    )
    .bind(user.id)
    .bind(blocked_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if db::is_unique_violation(&e) {
            AppError::bad_request("User already blocked")
        } else {
            AppError::from(e)
        }
    })?;

    activity::record(
        &pool,
        NewActivity::new(user.id, Verb::Blocked, ObjectType::Profile, blocked_id),
    )
    .await;

    Ok((StatusCode::CREATED, Json(block)))
}

pub async fn unblock_user(
    State(pool): State<PgPool>,
    user: CurrentUser,
    ResourceId(blocked_id): ResourceId,
) -> Result<Json<Value>, AppError> {
    let result = sqlx::query("DELETE FROM blocks WHERE blocker_id = $1 AND blocked_id = $2")
        .bind(user.id)
        .bind(blocked_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Block not found"));
    }
    Ok(Json(json!({ "message": "User unblocked successfully" })))
}
