use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::analytics::SalesRow;

/// The seller's order lines placed since `since`, oldest first.
pub async fn sales_rows(conn: &mut PgConnection, seller_id: Uuid, since: DateTime<Utc>) -> Result<Vec<SalesRow>, sqlx::Error> {
    sqlx::query_as::<_, SalesRow>(
        "SELECT o.id AS order_id, o.buyer_id, o.status, o.created_at AS ordered_at,
                i.product_id, i.product_name, p.category, i.quantity, i.price,
                v.price AS variant_price, v.est_price AS variant_est_price
         FROM order_items i
         JOIN orders o ON o.id = i.order_id
         JOIN products p ON p.id = i.product_id
         LEFT JOIN product_variants v ON v.id = i.variant_id
         WHERE i.seller_id = $1 AND o.created_at >= $2
         ORDER BY o.created_at, i.id",
    )
    .bind(seller_id)
    .bind(since)
    .fetch_all(conn)
    .await
}
