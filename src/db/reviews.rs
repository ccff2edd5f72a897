use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::aggregates::review::{RatingSummary, Review};

pub async fn list(conn: &mut PgConnection, product_id: Uuid) -> Result<Vec<Review>, sqlx::Error> {
    sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at DESC")
        .bind(product_id)
        .fetch_all(conn)
        .await
}

pub async fn summary(conn: &mut PgConnection, product_id: Uuid) -> Result<RatingSummary, sqlx::Error> {
    sqlx::query_as::<_, RatingSummary>(
        "SELECT ROUND(AVG(rating)::numeric, 2) AS average_rating, COUNT(*) AS review_count
         FROM reviews WHERE product_id = $1",
    )
    .bind(product_id)
    .fetch_one(conn)
    .await
}

pub async fn exists(conn: &mut PgConnection, product_id: Uuid, variant_id: Option<Uuid>, buyer_id: Uuid) -> Result<bool, sqlx::Error> {
    let (found,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM reviews
         WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2 AND buyer_id = $3)",
    )
    .bind(product_id)
    .bind(variant_id)
    .bind(buyer_id)
    .fetch_one(conn)
    .await?;
    Ok(found)
}

pub async fn insert(conn: &mut PgConnection, r: &Review) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO reviews (id, product_id, variant_id, buyer_id, rating, comment, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(r.id)
    .bind(r.product_id)
    .bind(r.variant_id)
    .bind(r.buyer_id)
    .bind(r.rating)
    .bind(&r.comment)
    .bind(r.created_at)
    .execute(conn)
    .await?;
    Ok(())
}
