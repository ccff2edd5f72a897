use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::AppState;
use crate::auth::Actor;
use crate::db::{self, notifications::Notification};
use crate::error::ApiError;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/:id/read", post(mark_read))
}

async fn list_notifications(State(s): State<AppState>, actor: Actor) -> Result<Json<Vec<Notification>>, ApiError> {
    let mut conn = s.db.acquire().await?;
    Ok(Json(db::notifications::list(&mut *conn, actor.user_id()).await?))
}

async fn mark_read(State(s): State<AppState>, actor: Actor, Path(id): Path<Uuid>) -> Result<Json<Value>, ApiError> {
    let mut conn = s.db.acquire().await?;
    if !db::notifications::mark_read(&mut *conn, actor.user_id(), id).await? {
        return Err(ApiError::not_found("Notification"));
    }
    Ok(Json(json!({ "message": "Notification marked as read" })))
}
