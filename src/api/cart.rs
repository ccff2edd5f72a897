//! Cart and wishlist. Both belong to buyers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::api::AppState;
use crate::auth::Actor;
use crate::db;
use crate::domain::aggregates::cart::{Cart, CartAddition, CartError, CartItem};
use crate::domain::aggregates::catalog::Product;
use crate::domain::value_objects::Quantity;
use crate::error::{ApiError, ValidJson};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart))
        .route("/cart/add", post(add_to_cart))
        .route("/cart/clear", delete(clear_cart))
        .route("/cart/remove/:item_id", delete(remove_from_cart))
        .route("/cart/:item_id", patch(update_quantity))
        .route("/wishlist", get(get_wishlist))
        .route("/wishlist/add", post(add_to_wishlist))
        .route("/wishlist/remove/:product_id", delete(remove_from_wishlist))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCart {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[serde(default = "one")]
    #[validate(range(min = 1, max = 100000, message = "quantity must be between 1 and 100000"))]
    pub quantity: i32,
}

fn one() -> i32 { 1 }

#[derive(Debug, Deserialize, Validate)]
pub struct SetQuantity {
    #[validate(range(min = 1, max = 100000, message = "quantity must be between 1 and 100000"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddToWishlist {
    pub product_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct WishlistEntry {
    pub id: Uuid,
    pub product: Product,
    pub added_at: DateTime<Utc>,
}

async fn load_cart(conn: &mut sqlx::PgConnection, user_id: Uuid) -> Result<Cart, ApiError> {
    let rows = db::cart::list(&mut *conn, user_id).await?;
    let ids: Vec<Uuid> = rows.iter().map(|r| r.product_id).collect();
    let products = db::catalog::find_many(conn, &ids).await?;
    Ok(Cart::price(user_id, rows, &products))
}

async fn get_cart(State(s): State<AppState>, actor: Actor) -> Result<Json<Cart>, ApiError> {
    let buyer_id = actor.buyer()?;
    let mut conn = s.db.acquire().await?;
    Ok(Json(load_cart(&mut *conn, buyer_id).await?))
}

async fn add_to_cart(
    State(s): State<AppState>,
    actor: Actor,
    ValidJson(body): ValidJson<AddToCart>,
) -> Result<(StatusCode, Json<CartItem>), ApiError> {
    let buyer_id = actor.buyer()?;
    let mut conn = s.db.acquire().await?;
    let product = db::catalog::find(&mut *conn, body.product_id).await?.ok_or_else(|| ApiError::not_found("Product"))?;
    let addition = CartAddition::resolve(&product, body.variant_id, body.quantity)?;
    let item = db::cart::add(&mut *conn, buyer_id, &addition).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_quantity(
    State(s): State<AppState>,
    actor: Actor,
    Path(item_id): Path<Uuid>,
    ValidJson(body): ValidJson<SetQuantity>,
) -> Result<Json<CartItem>, ApiError> {
    let buyer_id = actor.buyer()?;
    let quantity = Quantity::new(body.quantity).map_err(CartError::from)?;
    let mut conn = s.db.acquire().await?;
    let item = db::cart::set_quantity(&mut *conn, buyer_id, item_id, quantity.value())
        .await?
        .ok_or(CartError::ItemNotFound)?;
    Ok(Json(item))
}

async fn remove_from_cart(State(s): State<AppState>, actor: Actor, Path(item_id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    let buyer_id = actor.buyer()?;
    let mut conn = s.db.acquire().await?;
    if !db::cart::remove(&mut *conn, buyer_id, item_id).await? {
        return Err(CartError::ItemNotFound.into());
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_cart(State(s): State<AppState>, actor: Actor) -> Result<Json<Value>, ApiError> {
    let buyer_id = actor.buyer()?;
    let mut conn = s.db.acquire().await?;
    let removed = db::cart::clear(&mut *conn, buyer_id).await?;
    Ok(Json(json!({ "message": "Cart cleared", "removed": removed })))
}

async fn get_wishlist(State(s): State<AppState>, actor: Actor) -> Result<Json<Vec<WishlistEntry>>, ApiError> {
    let buyer_id = actor.buyer()?;
    let mut conn = s.db.acquire().await?;
    let rows = db::cart::wishlist(&mut *conn, buyer_id).await?;
    let ids: Vec<Uuid> = rows.iter().map(|r| r.product_id).collect();
    let mut products = db::catalog::find_many(&mut *conn, &ids).await?;
    Ok(Json(
        rows.into_iter()
            .filter_map(|r| {
                let product = products.remove(&r.product_id)?;
                Some(WishlistEntry { id: r.id, product, added_at: r.added_at })
            })
            .collect(),
    ))
}

async fn add_to_wishlist(
    State(s): State<AppState>,
    actor: Actor,
    ValidJson(body): ValidJson<AddToWishlist>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let buyer_id = actor.buyer()?;
    let mut conn = s.db.acquire().await?;
    db::catalog::find(&mut *conn, body.product_id).await?.ok_or_else(|| ApiError::not_found("Product"))?;
    match db::cart::add_to_wishlist(&mut *conn, buyer_id, body.product_id).await? {
        Some(item) => Ok((StatusCode::CREATED, Json(json!({ "message": "Added to wishlist", "item": item })))),
        None => Ok((StatusCode::OK, Json(json!({ "message": "Already in wishlist" })))),
    }
}

async fn remove_from_wishlist(State(s): State<AppState>, actor: Actor, Path(product_id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    let buyer_id = actor.buyer()?;
    let mut conn = s.db.acquire().await?;
    if !db::cart::remove_from_wishlist(&mut *conn, buyer_id, product_id).await? {
        return Err(ApiError::not_found("Wishlist item"));
    }
    Ok(StatusCode::NO_CONTENT)
}
