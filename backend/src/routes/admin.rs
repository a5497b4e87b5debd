//! Moderation endpoints for admins and owners.
//!
//! Admins only manage regular users; owners can act on anyone.

use crate::{
    activity::{self, NewActivity},
    error::AppError,
    extractors::{ResourceId, Staff},
    feed::{self, FeedActivity},
    models::{
        Like, ObjectType, POST_COLUMNS, PROFILE_COLUMNS, Post, Profile, ProfileSummary, Role, Verb,
    },
    params::{PaginationParams, SearchParams},
};
use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Serialize, Debug, Default, sqlx::FromRow)]
pub struct PlatformStats {
    pub total_users: i64,
    pub total_posts: i64,
    pub total_likes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_admins: Option<i64>,
    pub total_activities: i64,
}

pub(super) async fn platform_stats(
    pool: &PgPool,
    with_admins: bool,
) -> Result<PlatformStats, sqlx::Error> {
    sqlx::query_as::<_, PlatformStats>(
        "SELECT
            (SELECT COUNT(*) FROM profiles WHERE is_deleted = FALSE) AS total_users,
            (SELECT COUNT(*) FROM posts WHERE is_deleted = FALSE) AS total_posts,
            (SELECT COUNT(*) FROM likes) AS total_likes,
            CASE WHEN $1 THEN
                (SELECT COUNT(*) FROM profiles
                 WHERE role IN ('admin', 'owner') AND is_deleted = FALSE)
            END AS total_admins,
            (SELECT COUNT(*) FROM activities) AS total_activities",
    )
    .bind(with_admins)
    .fetch_one(pool)
    .await
}

#[derive(Serialize, Debug)]
pub struct UserStats {
    posts: i64,
    likes: i64,
    followers: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    following: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    #[sqlx(flatten)]
    profile: Profile,
    post_count: i64,
    like_count: i64,
    follower_count: i64,
}

#[derive(Serialize)]
pub struct UserWithStats {
    #[serde(flatten)]
    profile: Profile,
    stats: UserStats,
}

#[derive(Serialize)]
pub struct UserListResponse {
    users: Vec<UserWithStats>,
    count: usize,
}

pub async fn list_users(
    State(pool): State<PgPool>,
    Staff(admin): Staff,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<UserListResponse>, AppError> {
    let Query(params) = params?;

    // Admins do not see other staff accounts.
    let only_role = (admin.role() == Role::Admin).then_some(Role::User.as_str());

    let users: Vec<UserWithStats> = sqlx::query_as::<_, UserRow>(
        "SELECT pr.id, pr.username, pr.display_name, pr.bio, pr.avatar_url, pr.role,
            pr.is_deleted, pr.deleted_by, pr.deleted_at, pr.created_at,
            (SELECT COUNT(*) FROM posts p WHERE p.author_id = pr.id AND p.is_deleted = FALSE) AS post_count,
            (SELECT COUNT(*) FROM likes l WHERE l.user_id = pr.id) AS like_count,
            (SELECT COUNT(*) FROM follows f WHERE f.followee_id = pr.id) AS follower_count
        FROM profiles pr
        WHERE ($3::TEXT IS NULL OR pr.username ILIKE $3 OR pr.display_name ILIKE $3)
        AND ($4::TEXT IS NULL OR pr.role = $4)
        ORDER BY pr.created_at DESC
        LIMIT $1 OFFSET $2",
    )
    .bind(params.limit())
    .bind(params.offset())
    .bind(params.pattern())
    .bind(only_role)
    .fetch_all(&pool)
    .await?
    .into_iter()
    .map(|row| UserWithStats {
        profile: row.profile,
        stats: UserStats {
            posts: row.post_count,
            likes: row.like_count,
            followers: row.follower_count,
            following: None,
        },
    })
    .collect();

    Ok(Json(UserListResponse {
        count: users.len(),
        users,
    }))
}

#[derive(Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    profile: Profile,
    stats: UserStats,
    #[serde(rename = "recentPosts")]
    recent_posts: Vec<Post>,
}

pub async fn get_user(
    State(pool): State<PgPool>,
    Staff(_): Staff,
    ResourceId(id): ResourceId,
) -> Result<Json<UserDetail>, AppError> {
    let profile = sqlx::query_as::<_, Profile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::not_found("User not found"))?;

    let (posts, likes, followers, following) = sqlx::query_as::<_, (i64, i64, i64, i64)>(
        "SELECT
            (SELECT COUNT(*) FROM posts WHERE author_id = $1 AND is_deleted = FALSE),
            (SELECT COUNT(*) FROM likes WHERE user_id = $1),
            (SELECT COUNT(*) FROM follows WHERE followee_id = $1),
            (SELECT COUNT(*) FROM follows WHERE follower_id = $1)",
    )
    .bind(id)
    .fetch_one(&pool)
    .await?;

    let recent_posts = sqlx::query_as::<_, Post>(&format!(
        "SELECT {POST_COLUMNS} FROM posts
         WHERE author_id = $1 AND is_deleted = FALSE
         ORDER BY created_at DESC
         LIMIT 5"
    ))
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(UserDetail {
        profile,
        stats: UserStats {
            posts,
            likes,
            followers,
            following: Some(following),
        },
        recent_posts,
    }))
}

pub async fn delete_user(
    State(pool): State<PgPool>,
    Staff(admin): Staff,
    ResourceId(id): ResourceId,
) -> Result<Json<Value>, AppError> {
    if id == admin.id {
        return Err(AppError::bad_request("Cannot delete yourself"));
    }

    let target = sqlx::query_as::<_, Profile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::not_found("User not found"))?;

    if target.is_deleted {
        return Err(AppError::not_found("User already deleted"));
    }
    if admin.role() == Role::Admin && target.role.is_staff() {
        return Err(AppError::forbidden(
            "Admins cannot delete owners or other admins",
        ));
    }

    let deleted = sqlx::query_as::<_, Profile>(&format!(
        "UPDATE profiles
         SET is_deleted = TRUE, deleted_by = $2, deleted_at = NOW()
         WHERE id = $1 AND is_deleted = FALSE
         RETURNING {PROFILE_COLUMNS}"
    ))
    .bind(id)
    .bind(admin.id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::not_found("User already deleted"))?;

    activity::record(
        &pool,
        NewActivity::new(admin.id, Verb::Deleted, ObjectType::Profile, id)
            .metadata(json!({ "deleted_by_role": admin.role().as_str() })),
    )
    .await;

    Ok(Json(json!({
        "message": "User deleted successfully",
        "user": deleted,
    })))
}

#[derive(sqlx::FromRow)]
struct AdminPostRow {
    #[sqlx(flatten)]
    post: Post,
    author_username: String,
    author_display_name: Option<String>,
    author_avatar_url: Option<String>,
    like_count: i64,
}

#[derive(Serialize)]
pub struct AdminPost {
    #[serde(flatten)]
    post: Post,
    author: ProfileSummary,
    like_count: i64,
}

impl From<AdminPostRow> for AdminPost {
    fn from(row: AdminPostRow) -> Self {
        Self {
            author: ProfileSummary {
                id: row.post.author_id,
                username: row.author_username,
                display_name: row.author_display_name,
                avatar_url: row.author_avatar_url,
            },
            post: row.post,
            like_count: row.like_count,
        }
    }
}

const ADMIN_POST: &str = "SELECT p.id, p.author_id, p.content, p.media_url, p.is_deleted,
        p.deleted_by, p.deleted_at, p.created_at,
        a.username AS author_username,
        a.display_name AS author_display_name,
        a.avatar_url AS author_avatar_url,
        (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count
    FROM posts p
    JOIN profiles a ON a.id = p.author_id";

#[derive(Serialize)]
pub struct AdminPostList {
    posts: Vec<AdminPost>,
    count: usize,
}

/// All posts, soft-deleted ones included.
pub async fn list_posts(
    State(pool): State<PgPool>,
    Staff(_): Staff,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<AdminPostList>, AppError> {
    let Query(params) = params?;

    let posts: Vec<AdminPost> = sqlx::query_as::<_, AdminPostRow>(&format!(
        "{ADMIN_POST}
         WHERE ($3::TEXT IS NULL OR p.content ILIKE $3)
         ORDER BY p.created_at DESC
         LIMIT $1 OFFSET $2"
    ))
    .bind(params.limit())
    .bind(params.offset())
    .bind(params.pattern())
    .fetch_all(&pool)
    .await?
    .into_iter()
    .map(Into::into)
    .collect();

    Ok(Json(AdminPostList {
        count: posts.len(),
        posts,
    }))
}

#[derive(sqlx::FromRow)]
struct LikeWithUserRow {
    #[sqlx(flatten)]
    like: Like,
    user_username: String,
    user_display_name: Option<String>,
    user_avatar_url: Option<String>,
}

#[derive(Serialize)]
pub struct LikeWithUser {
    #[serde(flatten)]
    like: Like,
    user: ProfileSummary,
}

#[derive(Serialize)]
pub struct AdminPostDetail {
    #[serde(flatten)]
    post: AdminPost,
    likes: Vec<LikeWithUser>,
}

pub async fn get_post(
    State(pool): State<PgPool>,
    Staff(_): Staff,
    ResourceId(id): ResourceId,
) -> Result<Json<AdminPostDetail>, AppError> {
    let post: AdminPost =
        sqlx::query_as::<_, AdminPostRow>(&format!("{ADMIN_POST} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(&pool)
            .await?
            .ok_or_else(|| AppError::not_found("Post not found"))?
            .into();

    let likes = sqlx::query_as::<_, LikeWithUserRow>(
        "SELECT l.id, l.user_id, l.post_id, l.created_at,
            u.username AS user_username,
            u.display_name AS user_display_name,
            u.avatar_url AS user_avatar_url
        FROM likes l
        JOIN profiles u ON u.id = l.user_id
        WHERE l.post_id = $1
        ORDER BY l.created_at DESC",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?
    .into_iter()
    .map(|row| LikeWithUser {
        user: ProfileSummary {
            id: row.like.user_id,
            username: row.user_username,
            display_name: row.user_display_name,
            avatar_url: row.user_avatar_url,
        },
        like: row.like,
    })
    .collect();

    Ok(Json(AdminPostDetail { post, likes }))
}

#[derive(Serialize, sqlx::FromRow)]
pub struct LikerProfile {
    id: Uuid,
    username: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
    #[sqlx(try_from = "Option<String>")]
    role: Role,
    is_deleted: bool,
}

#[derive(sqlx::FromRow)]
struct LikerRow {
    like_id: Uuid,
    liked_at: DateTime<Utc>,
    #[sqlx(flatten)]
    user: LikerProfile,
}

#[derive(Serialize)]
pub struct Liker {
    id: Uuid,
    user: LikerProfile,
    liked_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct LikerList {
    likers: Vec<Liker>,
    count: usize,
}

pub async fn post_likers(
    State(pool): State<PgPool>,
    Staff(_): Staff,
    ResourceId(post_id): ResourceId,
) -> Result<Json<LikerList>, AppError> {
    let likers: Vec<Liker> = sqlx::query_as::<_, LikerRow>(
        "SELECT l.id AS like_id, l.created_at AS liked_at,
            u.id, u.username, u.display_name, u.avatar_url, u.role, u.is_deleted
        FROM likes l
        JOIN profiles u ON u.id = l.user_id
        WHERE l.post_id = $1 AND u.is_deleted = FALSE
        ORDER BY l.created_at DESC",
    )
    .bind(post_id)
    .fetch_all(&pool)
    .await?
    .into_iter()
    .map(|row| Liker {
        id: row.like_id,
        user: row.user,
        liked_at: row.liked_at,
    })
    .collect();

    Ok(Json(LikerList {
        count: likers.len(),
        likers,
    }))
}

#[derive(Serialize, Debug)]
pub struct LikedPost {
    id: Uuid,
    content: String,
    author_id: Uuid,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AdminLikeRow {
    #[sqlx(flatten)]
    like: Like,
    user_username: String,
    user_display_name: Option<String>,
    user_avatar_url: Option<String>,
    post_content: String,
    post_author_id: Uuid,
    post_created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct AdminLike {
    #[serde(flatten)]
    like: Like,
    user: ProfileSummary,
    post: LikedPost,
}

impl From<AdminLikeRow> for AdminLike {
    fn from(row: AdminLikeRow) -> Self {
        Self {
            user: ProfileSummary {
                id: row.like.user_id,
                username: row.user_username,
                display_name: row.user_display_name,
                avatar_url: row.user_avatar_url,
            },
            post: LikedPost {
                id: row.like.post_id,
                content: row.post_content,
                author_id: row.post_author_id,
                created_at: row.post_created_at,
            },
            like: row.like,
        }
    }
}

const ADMIN_LIKE: &str = "SELECT l.id, l.user_id, l.post_id, l.created_at,
        u.username AS user_username,
        u.display_name AS user_display_name,
        u.avatar_url AS user_avatar_url,
        p.content AS post_content,
        p.author_id AS post_author_id,
        p.created_at AS post_created_at
    FROM likes l
    JOIN profiles u ON u.id = l.user_id
    JOIN posts p ON p.id = l.post_id";

#[derive(Serialize)]
pub struct AdminLikeList {
    likes: Vec<AdminLike>,
    count: usize,
}

pub async fn list_likes(
    State(pool): State<PgPool>,
    Staff(_): Staff,
    params: Result<Query<PaginationParams>, QueryRejection>,
) -> Result<Json<AdminLikeList>, AppError> {
    let Query(params) = params?;

    let likes: Vec<AdminLike> = sqlx::query_as::<_, AdminLikeRow>(&format!(
        "{ADMIN_LIKE} ORDER BY l.created_at DESC LIMIT $1 OFFSET $2"
    ))
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(&pool)
    .await?
    .into_iter()
    .map(Into::into)
    .collect();

    Ok(Json(AdminLikeList {
        count: likes.len(),
        likes,
    }))
}

pub async fn get_like(
    State(pool): State<PgPool>,
    Staff(_): Staff,
    ResourceId(id): ResourceId,
) -> Result<Json<AdminLike>, AppError> {
    let like = sqlx::query_as::<_, AdminLikeRow>(&format!("{ADMIN_LIKE} WHERE l.id = $1"))
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::not_found("Like not found"))?;

    Ok(Json(like.into()))
}

pub async fn delete_like(
    State(pool): State<PgPool>,
    Staff(admin): Staff,
    ResourceId(id): ResourceId,
) -> Result<Json<Value>, AppError> {
    let like = sqlx::query_as::<_, Like>(
        "DELETE FROM likes WHERE id = $1 RETURNING id, user_id, post_id, created_at",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::not_found("Like not found"))?;

    activity::record(
        &pool,
        NewActivity::new(admin.id, Verb::Deleted, ObjectType::Like, like.id)
            .target(Some(like.user_id))
            .metadata(json!({
                "deleted_by_role": admin.role().as_str(),
                "post_id": like.post_id,
            })),
    )
    .await;

    Ok(Json(json!({ "message": "Like deleted successfully" })))
}

#[derive(Serialize)]
pub struct AdminStats {
    stats: PlatformStats,
    recent_activities: Vec<FeedActivity>,
}

pub async fn stats(
    State(pool): State<PgPool>,
    Staff(_): Staff,
) -> Result<Json<AdminStats>, AppError> {
    let stats = platform_stats(&pool, false).await?;
    let recent_activities = feed::recent(&pool, 10).await?;

    Ok(Json(AdminStats {
        stats,
        recent_activities,
    }))
}
