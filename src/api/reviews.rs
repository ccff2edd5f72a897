use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::api::AppState;
use crate::auth::Actor;
use crate::db;
use crate::domain::aggregates::catalog::CatalogError;
use crate::domain::aggregates::review::{RatingSummary, Review, ReviewError};
use crate::error::{ApiError, ValidJson};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products/:id/reviews", get(list_reviews))
        .route("/products/:id/reviews/add", post(add_review))
}

#[derive(Debug, Serialize)]
pub struct ReviewList {
    #[serde(flatten)]
    pub summary: RatingSummary,
    pub reviews: Vec<Review>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewPayload {
    pub variant_id: Option<Uuid>,
    pub rating: i16,
    #[serde(default)]
    #[validate(length(max = 2000, message = "comment must be at most 2000 characters"))]
    pub comment: String,
}

async fn list_reviews(State(s): State<AppState>, Path(product_id): Path<Uuid>) -> Result<Json<ReviewList>, ApiError> {
    let mut conn = s.db.acquire().await?;
    db::catalog::find(&mut *conn, product_id).await?.ok_or_else(|| ApiError::not_found("Product"))?;
    let summary = db::reviews::summary(&mut *conn, product_id).await?;
    let reviews = db::reviews::list(&mut *conn, product_id).await?;
    Ok(Json(ReviewList { summary, reviews }))
}

async fn add_review(
    State(s): State<AppState>,
    actor: Actor,
    Path(product_id): Path<Uuid>,
    ValidJson(body): ValidJson<ReviewPayload>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    let buyer_id = actor.buyer()?;
    let mut tx = s.db.begin().await?;
    let product = db::catalog::find(&mut *tx, product_id).await?.ok_or_else(|| ApiError::not_found("Product"))?;
    if let Some(variant_id) = body.variant_id {
        product.variant(variant_id).ok_or(CatalogError::VariantNotInProduct)?;
    }
    if db::reviews::exists(&mut *tx, product_id, body.variant_id, buyer_id).await? {
        return Err(ReviewError::Duplicate.into());
    }
    let eligible = db::orders::review_eligible(&mut *tx, buyer_id, product_id, body.variant_id).await?;
    let review = Review::write(product_id, body.variant_id, buyer_id, body.rating, &body.comment, eligible)?;
    db::reviews::insert(&mut *tx, &review).await?;
    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(review)))
}
