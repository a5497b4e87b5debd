use crate::models::{ObjectType, Verb};
use serde_json::{Value, json};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

/// An activity about to be written to the log.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub actor_id: Uuid,
    pub verb: Verb,
    pub object_type: ObjectType,
    pub object_id: Option<Uuid>,
    pub target_id: Option<Uuid>,
    pub metadata: Value,
}

impl NewActivity {
    pub fn new(actor_id: Uuid, verb: Verb, object_type: ObjectType, object_id: Uuid) -> Self {
        Self {
            actor_id,
            verb,
            object_type,
            object_id: Some(object_id),
            target_id: None,
            metadata: json!({}),
        }
    }

    pub fn target(mut self, target_id: Option<Uuid>) -> Self {
        self.target_id = target_id;
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Append to the activity log. Failures are logged and swallowed: the
/// action that produced the activity has already happened.
pub async fn record(pool: &PgPool, activity: NewActivity) {
    let result = sqlx::query(
        "INSERT INTO activities (actor_id, verb, object_type, object_id, target_id, metadata)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(activity.actor_id)
    .bind(activity.verb.as_str())
    .bind(activity.object_type.as_str())
    .bind(activity.object_id)
    .bind(activity.target_id)
    .bind(&activity.metadata)
    .execute(pool)
    .await;

    if let Err(e) = result {
        warn!(
            actor = %activity.actor_id,
            verb = activity.verb.as_str(),
            error = %e,
            "failed to record activity"
        );
    }
}
