use crate::auth_provider::{AuthError, SharedAuth};
use crate::error::AppError;
use crate::models::{PROFILE_COLUMNS, Profile, Role};
use axum::{
    extract::{FromRef, FromRequestParts, Path},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use sqlx::PgPool;
use uuid::Uuid;

/// The authenticated caller and their active profile.
pub struct CurrentUser {
    pub id: Uuid,
    pub profile: Profile,
}

impl CurrentUser {
    pub fn role(&self) -> Role {
        self.profile.role
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl<S> FromRequestParts<S> for CurrentUser
where
    PgPool: FromRef<S>,
    SharedAuth: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            AppError::unauthorized("No token provided")
                .with_hint("Add Authorization header: \"Bearer YOUR_TOKEN_HERE\"")
        })?;

        let auth = SharedAuth::from_ref(state);
        let auth_user = auth.get_user(token).await.map_err(|e| match e {
            AuthError::Rejected { .. } => AppError::unauthorized("Invalid token"),
            other => AppError::from(other),
        })?;

        let pool = PgPool::from_ref(state);
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1 AND is_deleted = FALSE"
        ))
        .bind(auth_user.id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::unauthorized("User profile not found"))?;

        Ok(CurrentUser {
            id: auth_user.id,
            profile,
        })
    }
}

/// An authenticated admin or owner.
pub struct Staff(pub CurrentUser);

impl<S> FromRequestParts<S> for Staff
where
    PgPool: FromRef<S>,
    SharedAuth: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.role().is_staff() {
            return Err(AppError::insufficient_permissions());
        }
        Ok(Staff(user))
    }
}

/// An authenticated owner.
pub struct Owner(pub CurrentUser);

impl<S> FromRequestParts<S> for Owner
where
    PgPool: FromRef<S>,
    SharedAuth: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if user.role() != Role::Owner {
            return Err(AppError::insufficient_permissions());
        }
        Ok(Owner(user))
    }
}

/// A UUID path parameter. Malformed ids are rejected in the `{error}` shape.
pub struct ResourceId(pub Uuid);

impl<S> FromRequestParts<S> for ResourceId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<Uuid>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::bad_request("Invalid id").with_hint(e.body_text()))?;
        Ok(ResourceId(id))
    }
}
