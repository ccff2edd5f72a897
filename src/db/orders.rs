use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::aggregates::order::{Order, OrderItem, OrderView, PlacedOrder};

pub async fn insert(conn: &mut PgConnection, placed: &PlacedOrder) -> Result<(), sqlx::Error> {
    let o = &placed.order;
    sqlx::query(
        "INSERT INTO orders (id, buyer_id, address, status, total_price, otp_attempts, is_delivered_verified, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, 0, FALSE, $6, $6)",
    )
    .bind(o.id)
    .bind(o.buyer_id)
    .bind(&o.address)
    .bind(o.status)
    .bind(o.total_price)
    .bind(o.created_at)
    .execute(&mut *conn)
    .await?;

    for i in &placed.items {
        sqlx::query(
            "INSERT INTO order_items (id, order_id, product_id, variant_id, seller_id, product_name, variant_label, quantity, price, gst_rate, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(i.id)
        .bind(i.order_id)
        .bind(i.product_id)
        .bind(i.variant_id)
        .bind(i.seller_id)
        .bind(&i.product_name)
        .bind(&i.variant_label)
        .bind(i.quantity)
        .bind(i.price)
        .bind(i.gst_rate)
        .bind(i.created_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn find(conn: &mut PgConnection, id: Uuid) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await
}

/// Row lock held until the surrounding transaction ends.
pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE").bind(id).fetch_optional(conn).await
}

pub async fn items(conn: &mut PgConnection, order_id: Uuid) -> Result<Vec<OrderItem>, sqlx::Error> {
    sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at, id")
        .bind(order_id)
        .fetch_all(conn)
        .await
}

/// Persists everything a status change or OTP check can touch.
pub async fn save_state(conn: &mut PgConnection, o: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE orders SET status = $2, delivery_otp = $3, otp_attempts = $4, is_delivered_verified = $5, updated_at = $6
         WHERE id = $1",
    )
    .bind(o.id)
    .bind(o.status)
    .bind(&o.delivery_otp)
    .bind(o.otp_attempts)
    .bind(o.is_delivered_verified)
    .bind(o.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn with_items(conn: &mut PgConnection, orders: Vec<Order>, seller_id: Option<Uuid>) -> Result<Vec<OrderView>, sqlx::Error> {
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let all = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = ANY($1) AND ($2::uuid IS NULL OR seller_id = $2)
         ORDER BY created_at, id",
    )
    .bind(&ids)
    .bind(seller_id)
    .fetch_all(conn)
    .await?;
    Ok(orders
        .into_iter()
        .map(|order| {
            let items = all.iter().filter(|i| i.order_id == order.id).cloned().collect();
            OrderView { order, items }
        })
        .collect())
}

pub async fn list_for_buyer(conn: &mut PgConnection, buyer_id: Uuid) -> Result<Vec<OrderView>, sqlx::Error> {
    let orders = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE buyer_id = $1 ORDER BY created_at DESC")
        .bind(buyer_id)
        .fetch_all(&mut *conn)
        .await?;
    with_items(conn, orders, None).await
}

/// Orders holding at least one of the seller's lines, showing only those lines.
pub async fn list_for_seller(conn: &mut PgConnection, seller_id: Uuid) -> Result<Vec<OrderView>, sqlx::Error> {
    let orders = sqlx::query_as::<_, Order>(
        "SELECT o.* FROM orders o
         WHERE EXISTS (SELECT 1 FROM order_items i WHERE i.order_id = o.id AND i.seller_id = $1)
         ORDER BY o.created_at DESC",
    )
    .bind(seller_id)
    .fetch_all(&mut *conn)
    .await?;
    with_items(conn, orders, Some(seller_id)).await
}

/// Processing or completed orders of the buyer that contain the product
/// (and variant, when one is given).
pub async fn review_eligible(conn: &mut PgConnection, buyer_id: Uuid, product_id: Uuid, variant_id: Option<Uuid>) -> Result<i64, sqlx::Error> {
    let (n,): (i64,) = sqlx::query_as(
        "SELECT COUNT(DISTINCT o.id) FROM orders o JOIN order_items i ON i.order_id = o.id
         WHERE o.buyer_id = $1 AND o.status IN ('processing', 'completed')
           AND i.product_id = $2 AND ($3::uuid IS NULL OR i.variant_id = $3)",
    )
    .bind(buyer_id)
    .bind(product_id)
    .bind(variant_id)
    .fetch_one(conn)
    .await?;
    Ok(n)
}
