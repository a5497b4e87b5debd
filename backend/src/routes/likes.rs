use crate::{
    activity::{self, NewActivity},
    db,
    error::AppError,
    extractors::{CurrentUser, ResourceId},
    models::{Like, ObjectType, Verb},
};
use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn like_post(
    State(pool): State<PgPool>,
    user: CurrentUser,
    ResourceId(post_id): ResourceId,
) -> Result<(StatusCode, Json<Like>), AppError> {
    let author_id = sqlx::query_scalar::<_, Uuid>(
        "SELECT author_id FROM posts WHERE id = $1 AND is_deleted = FALSE",
    )
    .bind(post_id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::not_found("Post not found"))?;

    let already = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM likes WHERE user_id = $1 AND post_id = $2)",
    )
    .bind(user.id)
    .bind(post_id)
    .fetch_one(&pool)
    .await?;
    if already {
        return Err(AppError::bad_request("Post already liked"));
    }

    let like = sqlx::query_as::<_, Like>(
        "INSERT INTO likes (user_id, post_id) VALUES ($1, $2)
         RETURNING id, user_id, post_id, created_at",
    )
    .bind(user.id)
    .bind(post_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if db::is_unique_violation(&e) {
            AppError::bad_request("Post already liked")
        } else {
            AppError::from(e)
        }
    })?;

    activity::record(
        &pool,
        NewActivity::new(user.id, Verb::Liked, ObjectType::Post, post_id).target(Some(author_id)),
    )
    .await;

    Ok((StatusCode::CREATED, Json(like)))
}

/// Remove the caller's own like. Staff remove other users' likes through
/// the admin routes.
pub async fn unlike_post(
    State(pool): State<PgPool>,
    user: CurrentUser,
    ResourceId(post_id): ResourceId,
) -> Result<Json<Value>, AppError> {
    let result = sqlx::query("DELETE FROM likes WHERE user_id = $1 AND post_id = $2")
        .bind(user.id)
        .bind(post_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Like not found"));
    }
    Ok(Json(json!({ "message": "Like removed successfully" })))
}
