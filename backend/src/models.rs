use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
    Owner,
}

#[derive(Error, Debug)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(String);

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    /// Admins and owners.
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Admin | Self::Owner)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            "owner" => Ok(Self::Owner),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

// A NULL role column reads as a regular user.
impl TryFrom<Option<String>> for Role {
    type Error = UnknownRole;

    fn try_from(value: Option<String>) -> Result<Self, Self::Error> {
        value.as_deref().map_or(Ok(Self::User), str::parse)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Created,
    Deleted,
    Liked,
    Followed,
    Blocked,
    Promoted,
    Demoted,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Deleted => "deleted",
            Self::Liked => "liked",
            Self::Followed => "followed",
            Self::Blocked => "blocked",
            Self::Promoted => "promoted",
            Self::Demoted => "demoted",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Profile,
    Post,
    Like,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Post => "post",
            Self::Like => "like",
        }
    }
}

pub const PROFILE_COLUMNS: &str = "id, username, display_name, bio, avatar_url, role, is_deleted, deleted_by, deleted_at, created_at";

#[derive(Serialize, Debug, Clone, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    #[sqlx(try_from = "Option<String>")]
    pub role: Role,
    pub is_deleted: bool,
    pub deleted_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Profile fields visible to other users.
#[derive(Serialize, Debug)]
pub struct PublicProfile {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<Profile> for PublicProfile {
    fn from(p: Profile) -> Self {
        Self {
            id: p.id,
            username: p.username,
            display_name: p.display_name,
            bio: p.bio,
            avatar_url: p.avatar_url,
            role: p.role,
            created_at: p.created_at,
        }
    }
}

#[derive(Serialize, Debug, Clone, sqlx::FromRow)]
pub struct ProfileSummary {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

pub const POST_COLUMNS: &str =
    "id, author_id, content, media_url, is_deleted, deleted_by, deleted_at, created_at";

#[derive(Serialize, Debug, Clone, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub media_url: Option<String>,
    pub is_deleted: bool,
    pub deleted_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, sqlx::FromRow)]
pub struct Like {
    pub id: Uuid,
    pub user_id: Uuid,
    pub post_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, sqlx::FromRow)]
pub struct Follow {
    pub id: Uuid,
    pub follower_id: Uuid,
    pub followee_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, sqlx::FromRow)]
pub struct Block {
    pub id: Uuid,
    pub blocker_id: Uuid,
    pub blocked_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, sqlx::FromRow)]
pub struct Activity {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub verb: String,
    pub object_type: String,
    pub object_id: Option<Uuid>,
    pub target_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
