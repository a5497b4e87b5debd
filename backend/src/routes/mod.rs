pub mod activities;
pub mod admin;
pub mod auth;
pub mod blocks;
pub mod follows;
pub mod likes;
pub mod owner;
pub mod posts;
pub mod profiles;

use crate::AppState;
use axum::{
    Json, Router,
    routing::{delete, get, post},
};
use serde_json::{Value, json};

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .nest("/auth", auth_routes())
        .nest("/profiles", profile_routes())
        .nest("/posts", post_routes())
        .nest("/activities", activity_routes())
        .nest("/admin", admin_routes())
        .nest("/owner", owner_routes());

    Router::new().nest("/api/v1", api).with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "Server is running" }))
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(profiles::get_my_profile))
        .route(
            "/{id}",
            get(profiles::get_profile).patch(profiles::update_profile),
        )
        .route(
            "/{id}/follow",
            post(follows::follow_user).delete(follows::unfollow_user),
        )
        .route(
            "/{id}/block",
            post(blocks::block_user).delete(blocks::unblock_user),
        )
}

pub fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(posts::get_posts).post(posts::create_post))
        .route("/{id}", get(posts::get_one_post).delete(posts::delete_post))
        .route(
            "/{id}/like",
            post(likes::like_post).delete(likes::unlike_post),
        )
}

pub fn activity_routes() -> Router<AppState> {
    Router::new().route("/", get(activities::get_activities))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(admin::list_users))
        .route("/users/{id}", get(admin::get_user).delete(admin::delete_user))
        .route("/posts", get(admin::list_posts))
        .route("/posts/{id}", get(admin::get_post))
        .route("/posts/{id}/likers", get(admin::post_likers))
        .route("/likes", get(admin::list_likes))
        .route("/likes/{id}", get(admin::get_like).delete(admin::delete_like))
        .route("/stats", get(admin::stats))
}

pub fn owner_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/admins",
            get(owner::list_admins).post(owner::promote_admin),
        )
        .route("/admins/{id}", delete(owner::demote_admin))
        .route("/stats", get(owner::stats))
}
