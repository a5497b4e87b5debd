use super::admin::{PlatformStats, platform_stats};
use crate::{
    activity::{self, NewActivity},
    error::AppError,
    extractors::{Owner, ResourceId},
    models::{ObjectType, PROFILE_COLUMNS, Profile, PublicProfile, Role, Verb},
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Serialize)]
pub struct AdminList {
    admins: Vec<PublicProfile>,
    count: usize,
}

pub async fn list_admins(
    State(pool): State<PgPool>,
    Owner(_): Owner,
) -> Result<Json<AdminList>, AppError> {
    let admins: Vec<PublicProfile> = sqlx::query_as::<_, Profile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles
         WHERE role IN ('admin', 'owner') AND is_deleted = FALSE
         ORDER BY created_at DESC"
    ))
    .fetch_all(&pool)
    .await?
    .into_iter()
    .map(Into::into)
    .collect();

    Ok(Json(AdminList {
        count: admins.len(),
        admins,
    }))
}

#[derive(Serialize)]
pub struct OwnerStats {
    stats: PlatformStats,
}

pub async fn stats(
    State(pool): State<PgPool>,
    Owner(_): Owner,
) -> Result<Json<OwnerStats>, AppError> {
    let stats = platform_stats(&pool, true).await?;
    Ok(Json(OwnerStats { stats }))
}

async fn active_profile(pool: &PgPool, id: Uuid) -> Result<Profile, AppError> {
    sqlx::query_as::<_, Profile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1 AND is_deleted = FALSE"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("User not found"))
}

/// Move an active profile from `from` to `to`. Returns `None` if the profile
/// no longer holds `from`.
async fn change_role(
    pool: &PgPool,
    id: Uuid,
    from: Role,
    to: Role,
) -> Result<Option<Profile>, sqlx::Error> {
    sqlx::query_as::<_, Profile>(&format!(
        "UPDATE profiles SET role = $3
         WHERE id = $1 AND role = $2 AND is_deleted = FALSE
         RETURNING {PROFILE_COLUMNS}"
    ))
    .bind(id)
    .bind(from.as_str())
    .bind(to.as_str())
    .fetch_optional(pool)
    .await
}

#[derive(Deserialize)]
pub struct PromoteRequest {
    pub user_id: Option<Uuid>,
}

pub async fn promote_admin(
    State(pool): State<PgPool>,
    Owner(owner): Owner,
    payload: Result<Json<PromoteRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(payload) = payload?;
    let user_id = payload
        .user_id
        .ok_or_else(|| AppError::bad_request("user_id is required"))?;

    let target = active_profile(&pool, user_id).await?;
    if target.role.is_staff() {
        return Err(AppError::bad_request("User is already an admin or owner"));
    }

    let user = change_role(&pool, user_id, Role::User, Role::Admin)
        .await?
        .ok_or_else(|| AppError::bad_request("User is already an admin or owner"))?;

    activity::record(
        &pool,
        NewActivity::new(owner.id, Verb::Promoted, ObjectType::Profile, user_id)
            .metadata(json!({ "new_role": Role::Admin.as_str() })),
    )
    .await;

    Ok(Json(json!({
        "message": "User promoted to admin",
        "user": user,
    })))
}

pub async fn demote_admin(
    State(pool): State<PgPool>,
    Owner(owner): Owner,
    ResourceId(id): ResourceId,
) -> Result<Json<Value>, AppError> {
    if id == owner.id {
        return Err(AppError::bad_request("Cannot demote yourself"));
    }

    let target = active_profile(&pool, id).await?;
    if target.role != Role::Admin {
        return Err(AppError::bad_request("User is not an admin"));
    }

    let user = change_role(&pool, id, Role::Admin, Role::User)
        .await?
        .ok_or_else(|| AppError::bad_request("User is not an admin"))?;

    activity::record(
        &pool,
        NewActivity::new(owner.id, Verb::Demoted, ObjectType::Profile, id)
            .metadata(json!({ "new_role": Role::User.as_str() })),
    )
    .await;

    Ok(Json(json!({
        "message": "Admin demoted to user",
        "user": user,
    })))
}
