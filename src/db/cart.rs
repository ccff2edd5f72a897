use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::aggregates::cart::{CartAddition, CartItem, WishlistItem};
use crate::domain::value_objects::Quantity;

pub async fn list(conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<CartItem>, sqlx::Error> {
    sqlx::query_as::<_, CartItem>("SELECT * FROM cart_items WHERE user_id = $1 ORDER BY added_at, id")
        .bind(user_id)
        .fetch_all(conn)
        .await
}

/// Creates the row or adds to its quantity in one statement, so concurrent
/// adds of the same line both count. The sum saturates at `Quantity::MAX`.
pub async fn add(conn: &mut PgConnection, user_id: Uuid, a: &CartAddition) -> Result<CartItem, sqlx::Error> {
    sqlx::query_as::<_, CartItem>(
        "INSERT INTO cart_items (id, user_id, product_id, variant_id, quantity, added_at)
         VALUES ($1, $2, $3, $4, $5, NOW())
         ON CONFLICT (user_id, product_id, variant_id)
         DO UPDATE SET quantity = LEAST(cart_items.quantity::bigint + EXCLUDED.quantity, $6)::integer
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(a.product_id)
    .bind(a.variant_id)
    .bind(a.quantity.value())
    .bind(i64::from(Quantity::MAX))
    .fetch_one(conn)
    .await
}

pub async fn set_quantity(conn: &mut PgConnection, user_id: Uuid, item_id: Uuid, quantity: i32) -> Result<Option<CartItem>, sqlx::Error> {
    sqlx::query_as::<_, CartItem>("UPDATE cart_items SET quantity = $3 WHERE id = $1 AND user_id = $2 RETURNING *")
        .bind(item_id)
        .bind(user_id)
        .bind(quantity)
        .fetch_optional(conn)
        .await
}

pub async fn remove(conn: &mut PgConnection, user_id: Uuid, item_id: Uuid) -> Result<bool, sqlx::Error> {
    let r = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2")
        .bind(item_id)
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(r.rows_affected() > 0)
}

pub async fn clear(conn: &mut PgConnection, user_id: Uuid) -> Result<u64, sqlx::Error> {
    let r = sqlx::query("DELETE FROM cart_items WHERE user_id = $1").bind(user_id).execute(conn).await?;
    Ok(r.rows_affected())
}

pub async fn wishlist(conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<WishlistItem>, sqlx::Error> {
    sqlx::query_as::<_, WishlistItem>("SELECT * FROM wishlist_items WHERE user_id = $1 ORDER BY added_at DESC")
        .bind(user_id)
        .fetch_all(conn)
        .await
}

/// `None` when the product was already on the list.
pub async fn add_to_wishlist(conn: &mut PgConnection, user_id: Uuid, product_id: Uuid) -> Result<Option<WishlistItem>, sqlx::Error> {
    sqlx::query_as::<_, WishlistItem>(
        "INSERT INTO wishlist_items (id, user_id, product_id, added_at) VALUES ($1, $2, $3, NOW())
         ON CONFLICT (user_id, product_id) DO NOTHING RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(product_id)
    .fetch_optional(conn)
    .await
}

pub async fn remove_from_wishlist(conn: &mut PgConnection, user_id: Uuid, product_id: Uuid) -> Result<bool, sqlx::Error> {
    let r = sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
        .bind(user_id)
        .bind(product_id)
        .execute(conn)
        .await?;
    Ok(r.rows_affected() > 0)
}
