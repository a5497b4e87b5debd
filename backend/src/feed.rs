//! Activity feed assembly.
//!
//! Rows are fetched newest first with their actor joined in, then narrowed
//! for the viewer:
//!
//! 1. activities by accounts that blocked the viewer are dropped (in SQL, and
//!    again in [`visible_to`] so the rule holds for any input);
//! 2. activities whose actor is missing or soft-deleted are dropped;
//! 3. non-staff viewers do not see staff actions (role changes and
//!    admin-initiated deletions);
//! 4. activities about soft-deleted posts are dropped.

use crate::models::{Activity, ObjectType, Role, Verb};
use crate::params::PaginationParams;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ActorSummary {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_deleted: bool,
    pub role: Role,
}

#[derive(Serialize, Debug, Clone)]
pub struct FeedActivity {
    #[serde(flatten)]
    pub activity: Activity,
    pub actor: Option<ActorSummary>,
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    #[sqlx(flatten)]
    activity: Activity,
    actor_username: Option<String>,
    actor_display_name: Option<String>,
    actor_avatar_url: Option<String>,
    actor_is_deleted: Option<bool>,
    actor_role: Option<String>,
}

impl From<ActivityRow> for FeedActivity {
    fn from(row: ActivityRow) -> Self {
        let actor = row.actor_username.map(|username| ActorSummary {
            id: row.activity.actor_id,
            username,
            display_name: row.actor_display_name,
            avatar_url: row.actor_avatar_url,
            is_deleted: row.actor_is_deleted.unwrap_or(false),
            role: Role::try_from(row.actor_role).unwrap_or_default(),
        });
        Self {
            activity: row.activity,
            actor,
        }
    }
}

const ACTIVITY_WITH_ACTOR: &str = "SELECT a.id, a.actor_id, a.verb, a.object_type, a.object_id,
        a.target_id, a.metadata, a.created_at,
        p.username AS actor_username,
        p.display_name AS actor_display_name,
        p.avatar_url AS actor_avatar_url,
        p.is_deleted AS actor_is_deleted,
        p.role AS actor_role
    FROM activities a
    LEFT JOIN profiles p ON p.id = a.actor_id";

/// Who is looking at the feed.
pub struct FeedViewer<'a> {
    pub role: Role,
    pub blocked_by: &'a HashSet<Uuid>,
}

/// Staff actions that regular users never see in their feed.
fn is_staff_only(entry: &FeedActivity) -> bool {
    let actor_is_staff = entry.actor.as_ref().is_some_and(|a| a.role.is_staff());
    if !actor_is_staff {
        return false;
    }
    let verb = entry.activity.verb.as_str();
    verb == Verb::Promoted.as_str()
        || verb == Verb::Demoted.as_str()
        || (verb == Verb::Deleted.as_str()
            && entry.activity.metadata.get("deleted_by_role").and_then(|v| v.as_str())
                == Some(Role::Admin.as_str()))
}

/// Apply the block, deleted-actor and staff-visibility rules.
pub fn visible_to(entries: Vec<FeedActivity>, viewer: &FeedViewer<'_>) -> Vec<FeedActivity> {
    entries
        .into_iter()
        .filter(|e| !viewer.blocked_by.contains(&e.activity.actor_id))
        .filter(|e| e.actor.as_ref().is_some_and(|a| !a.is_deleted))
        .filter(|e| viewer.role.is_staff() || !is_staff_only(e))
        .collect()
}

/// Post ids referenced by the entries.
pub fn referenced_posts(entries: &[FeedActivity]) -> Vec<Uuid> {
    entries
        .iter()
        .filter(|e| e.activity.object_type == ObjectType::Post.as_str())
        .filter_map(|e| e.activity.object_id)
        .collect()
}

pub fn without_deleted_posts(
    entries: Vec<FeedActivity>,
    deleted: &HashSet<Uuid>,
) -> Vec<FeedActivity> {
    entries
        .into_iter()
        .filter(|e| {
            e.activity.object_type != ObjectType::Post.as_str()
                || e.activity.object_id.is_none_or(|id| !deleted.contains(&id))
        })
        .collect()
}

/// Fetch one page of the feed as seen by `viewer_id`.
pub async fn load(
    pool: &PgPool,
    viewer_id: Uuid,
    viewer_role: Role,
    page: &PaginationParams,
) -> Result<Vec<FeedActivity>, sqlx::Error> {
    let blocked_by: HashSet<Uuid> = crate::block_list::blocked_by(pool, viewer_id)
        .await?
        .into_iter()
        .collect();
    let blocked: Vec<Uuid> = blocked_by.iter().copied().collect();

    let rows = sqlx::query_as::<_, ActivityRow>(&format!(
        "{ACTIVITY_WITH_ACTOR}
         WHERE NOT (a.actor_id = ANY($1))
         ORDER BY a.created_at DESC
         LIMIT $2 OFFSET $3"
    ))
    .bind(&blocked)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let viewer = FeedViewer {
        role: viewer_role,
        blocked_by: &blocked_by,
    };
    let entries = visible_to(rows.into_iter().map(Into::into).collect(), &viewer);

    let post_ids = referenced_posts(&entries);
    if post_ids.is_empty() {
        return Ok(entries);
    }
    let deleted: HashSet<Uuid> = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM posts WHERE id = ANY($1) AND is_deleted = TRUE",
    )
    .bind(&post_ids)
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();

    Ok(without_deleted_posts(entries, &deleted))
}

/// Most recent activities with actors, unfiltered (admin dashboard).
pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<FeedActivity>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ActivityRow>(&format!(
        "{ACTIVITY_WITH_ACTOR} ORDER BY a.created_at DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::{Value, json};

    fn actor(role: Role, is_deleted: bool) -> ActorSummary {
        ActorSummary {
            id: Uuid::new_v4(),
            username: "someone".to_string(),
            display_name: None,
            avatar_url: None,
            is_deleted,
            role,
        }
    }

    fn entry(actor: Option<ActorSummary>, verb: Verb, object: ObjectType, metadata: Value) -> FeedActivity {
        let actor_id = actor.as_ref().map_or_else(Uuid::new_v4, |a| a.id);
        FeedActivity {
            activity: Activity {
                id: Uuid::new_v4(),
                actor_id,
                verb: verb.as_str().to_string(),
                object_type: object.as_str().to_string(),
                object_id: Some(Uuid::new_v4()),
                target_id: None,
                metadata,
                created_at: Utc::now(),
            },
            actor,
        }
    }

    fn ids(entries: &[FeedActivity]) -> Vec<Uuid> {
        entries.iter().map(|e| e.activity.id).collect()
    }

    #[test]
    fn drops_missing_and_deleted_actors() {
        let kept = entry(Some(actor(Role::User, false)), Verb::Created, ObjectType::Post, json!({}));
        let gone = entry(Some(actor(Role::User, true)), Verb::Created, ObjectType::Post, json!({}));
        let orphan = entry(None, Verb::Liked, ObjectType::Post, json!({}));
        let expected = vec![kept.activity.id];

        let blocked = HashSet::new();
        let viewer = FeedViewer { role: Role::User, blocked_by: &blocked };
        let out = visible_to(vec![kept, gone, orphan], &viewer);
        assert_eq!(ids(&out), expected);
    }

    #[test]
    fn drops_activities_by_accounts_that_blocked_the_viewer() {
        let blocker = actor(Role::User, false);
        let hidden = entry(Some(blocker.clone()), Verb::Created, ObjectType::Post, json!({}));
        let shown = entry(Some(actor(Role::User, false)), Verb::Followed, ObjectType::Profile, json!({}));
        let expected = vec![shown.activity.id];

        let blocked = HashSet::from([blocker.id]);
        let viewer = FeedViewer { role: Role::Owner, blocked_by: &blocked };
        assert_eq!(ids(&visible_to(vec![hidden, shown], &viewer)), expected);
    }

    #[test]
    fn hides_staff_actions_from_regular_users() {
        let admin = actor(Role::Admin, false);
        let promoted = entry(Some(admin.clone()), Verb::Promoted, ObjectType::Profile, json!({ "new_role": "admin" }));
        let demoted = entry(Some(admin.clone()), Verb::Demoted, ObjectType::Profile, json!({ "new_role": "user" }));
        let moderated = entry(Some(admin.clone()), Verb::Deleted, ObjectType::Post, json!({ "deleted_by_role": "admin" }));
        let own_post = entry(Some(admin.clone()), Verb::Created, ObjectType::Post, json!({}));
        let own_like = entry(Some(admin), Verb::Liked, ObjectType::Post, json!({}));
        let all = vec![promoted, demoted, moderated, own_post, own_like];
        let all_ids = ids(&all);

        let blocked = HashSet::new();
        let user = FeedViewer { role: Role::User, blocked_by: &blocked };
        assert_eq!(ids(&visible_to(all.clone(), &user)), all_ids[3..].to_vec());

        let staff = FeedViewer { role: Role::Admin, blocked_by: &blocked };
        assert_eq!(ids(&visible_to(all, &staff)), all_ids);
    }

    #[test]
    fn regular_users_see_deletions_by_regular_actors() {
        let author = actor(Role::User, false);
        let own_delete = entry(Some(author), Verb::Deleted, ObjectType::Post, json!({ "deleted_by_role": "user" }));
        let expected = vec![own_delete.activity.id];

        let blocked = HashSet::new();
        let viewer = FeedViewer { role: Role::User, blocked_by: &blocked };
        assert_eq!(ids(&visible_to(vec![own_delete], &viewer)), expected);
    }

    #[test]
    fn drops_activities_about_deleted_posts() {
        let someone = actor(Role::User, false);
        let live = entry(Some(someone.clone()), Verb::Liked, ObjectType::Post, json!({}));
        let dead = entry(Some(someone.clone()), Verb::Created, ObjectType::Post, json!({}));
        let follow = entry(Some(someone), Verb::Followed, ObjectType::Profile, json!({}));

        let refs = referenced_posts(&[live.clone(), dead.clone(), follow.clone()]);
        assert_eq!(refs, vec![live.activity.object_id.unwrap(), dead.activity.object_id.unwrap()]);

        let deleted = HashSet::from([dead.activity.object_id.unwrap()]);
        let expected = vec![live.activity.id, follow.activity.id];
        assert_eq!(ids(&without_deleted_posts(vec![live, dead, follow], &deleted)), expected);
    }

    #[test]
    fn serializes_actor_next_to_flattened_activity() {
        let e = entry(Some(actor(Role::Owner, false)), Verb::Created, ObjectType::Post, json!({}));
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["verb"], "created");
        assert_eq!(v["object_type"], "post");
        assert_eq!(v["actor"]["role"], "owner");
    }
}
