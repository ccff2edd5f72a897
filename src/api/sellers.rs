//! Staff review of seller applications.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::api::AppState;
use crate::auth::Actor;
use crate::db;
use crate::domain::aggregates::seller::{SellerError, SellerProfile};
use crate::error::ApiError;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/sellers", get(list_sellers))
        .route("/admin/sellers/:user_id/approve", post(approve))
        .route("/admin/sellers/:user_id/reject", post(reject))
}

#[derive(Debug, Deserialize)]
pub struct SellerQuery {
    pub approved: Option<bool>,
}

async fn list_sellers(
    State(s): State<AppState>,
    actor: Actor,
    Query(q): Query<SellerQuery>,
) -> Result<Json<Vec<SellerProfile>>, ApiError> {
    actor.staff()?;
    let mut conn = s.db.acquire().await?;
    Ok(Json(db::sellers::list(&mut *conn, q.approved).await?))
}

async fn approve(State(s): State<AppState>, actor: Actor, Path(user_id): Path<Uuid>) -> Result<Json<Value>, ApiError> {
    let staff_id = actor.staff()?;
    let mut tx = s.db.begin().await?;
    let mut profile = db::sellers::lock(&mut *tx, user_id).await?.ok_or_else(|| ApiError::not_found("Seller"))?;
    let event = profile.approve()?;
    db::sellers::save_approval(&mut *tx, &profile).await?;
    tx.commit().await?;

    info!(seller_id = %user_id, %staff_id, "seller approved");
    s.notifier.dispatch(vec![event]).await;
    Ok(Json(json!({ "message": "Seller approved" })))
}

async fn reject(State(s): State<AppState>, actor: Actor, Path(user_id): Path<Uuid>) -> Result<Json<Value>, ApiError> {
    let staff_id = actor.staff()?;
    let mut tx = s.db.begin().await?;
    let profile = db::sellers::lock(&mut *tx, user_id).await?.ok_or_else(|| ApiError::not_found("Seller"))?;
    let listed = db::sellers::product_count(&mut *tx, user_id).await?;
    if listed > 0 {
        return Err(SellerError::HasProducts(listed).into());
    }
    let contact = db::users::contact_in(&mut *tx, user_id).await?.ok_or_else(|| ApiError::not_found("User"))?;
    let event = profile.reject(contact.email, contact.name)?;
    // Profile and any stored credential go with the user row.
    db::users::delete(&mut *tx, user_id).await?;
    tx.commit().await?;

    info!(seller_id = %user_id, %staff_id, "seller rejected");
    s.notifier.dispatch(vec![event]).await;
    Ok(Json(json!({ "message": "Seller rejected and removed" })))
}
