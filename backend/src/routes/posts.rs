use crate::{
    activity::{self, NewActivity},
    block_list,
    error::AppError,
    extractors::{CurrentUser, ResourceId},
    models::{ObjectType, POST_COLUMNS, Post, ProfileSummary, Verb},
    params::PaginationParams,
};
use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct PostRow {
    #[sqlx(flatten)]
    post: Post,
    author_username: String,
    author_display_name: Option<String>,
    author_avatar_url: Option<String>,
    author_is_deleted: bool,
    like_count: i64,
    is_liked: bool,
}

#[derive(Serialize)]
pub struct PostResponse {
    #[serde(flatten)]
    post: Post,
    author: ProfileSummary,
    like_count: i64,
    is_liked: bool,
}

impl From<PostRow> for PostResponse {
    fn from(row: PostRow) -> Self {
        Self {
            author: ProfileSummary {
                id: row.post.author_id,
                username: row.author_username,
                display_name: row.author_display_name,
                avatar_url: row.author_avatar_url,
            },
            post: row.post,
            like_count: row.like_count,
            is_liked: row.is_liked,
        }
    }
}

#[derive(Serialize)]
pub struct PostListResponse {
    posts: Vec<PostResponse>,
    count: usize,
}

// $1 is always the viewer.
const POST_WITH_STATS: &str = "SELECT p.id, p.author_id, p.content, p.media_url, p.is_deleted,
        p.deleted_by, p.deleted_at, p.created_at,
        a.username AS author_username,
        a.display_name AS author_display_name,
        a.avatar_url AS author_avatar_url,
        a.is_deleted AS author_is_deleted,
        (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count,
        EXISTS (SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = $1) AS is_liked
    FROM posts p
    JOIN profiles a ON a.id = p.author_id";

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub content: Option<String>,
    pub media_url: Option<String>,
}

pub async fn create_post(
    State(pool): State<PgPool>,
    user: CurrentUser,
    payload: Result<Json<CreatePostRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    let Json(payload) = payload?;
    let content = payload
        .content
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::bad_request("Content is required"))?;
    let media_url = payload.media_url.filter(|m| !m.trim().is_empty());

    let post = sqlx::query_as::<_, Post>(&format!(
        "INSERT INTO posts (author_id, content, media_url) VALUES ($1, $2, $3)
         RETURNING {POST_COLUMNS}"
    ))
    .bind(user.id)
    .bind(content)
    .bind(&media_url)
    .fetch_one(&pool)
    .await?;

    activity::record(
        &pool,
        NewActivity::new(user.id, Verb::Created, ObjectType::Post, post.id),
    )
    .await;

    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_posts(
    State(pool): State<PgPool>,
    viewer: CurrentUser,
    params: Result<Query<PaginationParams>, QueryRejection>,
) -> Result<Json<PostListResponse>, AppError> {
    let Query(params) = params?;

    let posts: Vec<PostResponse> = sqlx::query_as::<_, PostRow>(&format!(
        "{POST_WITH_STATS}
         WHERE p.is_deleted = FALSE
         AND a.is_deleted = FALSE
         AND NOT EXISTS (
             SELECT 1 FROM blocks b WHERE b.blocker_id = p.author_id AND b.blocked_id = $1
         )
         ORDER BY p.created_at DESC
         LIMIT $2 OFFSET $3"
    ))
    .bind(viewer.id)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(&pool)
    .await?
    .into_iter()
    .map(Into::into)
    .collect();

    Ok(Json(PostListResponse {
        count: posts.len(),
        posts,
    }))
}

pub async fn get_one_post(
    State(pool): State<PgPool>,
    viewer: CurrentUser,
    ResourceId(id): ResourceId,
) -> Result<Json<PostResponse>, AppError> {
    let row = sqlx::query_as::<_, PostRow>(&format!(
        "{POST_WITH_STATS} WHERE p.id = $2 AND p.is_deleted = FALSE"
    ))
    .bind(viewer.id)
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .filter(|row| !row.author_is_deleted)
    .ok_or_else(|| AppError::not_found("Post not found"))?;

    if block_list::is_blocked(&pool, viewer.id, row.post.author_id).await? {
        return Err(AppError::forbidden("Access denied"));
    }

    Ok(Json(row.into()))
}

/// Soft-delete a post. Authors may delete their own posts, staff any post.
pub async fn delete_post(
    State(pool): State<PgPool>,
    user: CurrentUser,
    ResourceId(id): ResourceId,
) -> Result<Json<serde_json::Value>, AppError> {
    let author_id = sqlx::query_scalar::<_, Uuid>(
        "SELECT author_id FROM posts WHERE id = $1 AND is_deleted = FALSE",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::not_found("Post not found"))?;

    let role = user.role();
    if author_id != user.id && !role.is_staff() {
        return Err(AppError::insufficient_permissions());
    }

    let post = sqlx::query_as::<_, Post>(&format!(
        "UPDATE posts
         SET is_deleted = TRUE, deleted_by = $2, deleted_at = NOW()
         WHERE id = $1 AND is_deleted = FALSE
         RETURNING {POST_COLUMNS}"
    ))
    .bind(id)
    .bind(user.id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::not_found("Post not found"))?;

    activity::record(
        &pool,
        NewActivity::new(user.id, Verb::Deleted, ObjectType::Post, id)
            .target(Some(author_id))
            .metadata(json!({ "deleted_by_role": role.as_str() })),
    )
    .await;

    Ok(Json(json!({
        "message": "Post deleted successfully",
        "post": post,
    })))
}
