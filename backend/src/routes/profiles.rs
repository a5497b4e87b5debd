use crate::{
    block_list,
    error::AppError,
    extractors::{CurrentUser, ResourceId},
    models::{PROFILE_COLUMNS, Profile, PublicProfile},
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;
use sqlx::PgPool;

pub async fn get_my_profile(user: CurrentUser) -> Json<Profile> {
    Json(user.profile)
}

pub async fn get_profile(
    State(pool): State<PgPool>,
    viewer: CurrentUser,
    ResourceId(id): ResourceId,
) -> Result<Json<PublicProfile>, AppError> {
    let profile = sqlx::query_as::<_, Profile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1 AND is_deleted = FALSE"
    ))
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::not_found("Profile not found"))?;

    if block_list::is_blocked(&pool, viewer.id, id).await? {
        return Err(AppError::forbidden("Access denied"));
    }

    Ok(Json(profile.into()))
}

// Absent fields are left untouched; `null` clears a field.
#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub display_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub bio: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub avatar_url: Option<Option<String>>,
}

fn double_option<'de, D>(de: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(de).map(Some)
}

pub async fn update_profile(
    State(pool): State<PgPool>,
    user: CurrentUser,
    ResourceId(id): ResourceId,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<Profile>, AppError> {
    if id != user.id {
        return Err(AppError::forbidden("You can only update your own profile"));
    }
    let Json(payload) = payload?;

    let profile = sqlx::query_as::<_, Profile>(&format!(
        "UPDATE profiles
         SET display_name = CASE WHEN $2 THEN $3 ELSE display_name END,
             bio = CASE WHEN $4 THEN $5 ELSE bio END,
             avatar_url = CASE WHEN $6 THEN $7 ELSE avatar_url END
         WHERE id = $1
         RETURNING {PROFILE_COLUMNS}"
    ))
    .bind(id)
    .bind(payload.display_name.is_some())
    .bind(payload.display_name.flatten())
    .bind(payload.bio.is_some())
    .bind(payload.bio.flatten())
    .bind(payload.avatar_url.is_some())
    .bind(payload.avatar_url.flatten())
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::not_found("Profile not found"))?;

    Ok(Json(profile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinguishes_absent_from_null() {
        let req: UpdateProfileRequest =
            serde_json::from_str(r#"{ "bio": null, "display_name": "New" }"#).unwrap();
        assert_eq!(req.display_name, Some(Some("New".to_string())));
        assert_eq!(req.bio, Some(None));
        assert_eq!(req.avatar_url, None);
    }
}
