use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::aggregates::invoice::Invoice;

pub async fn next_number(conn: &mut PgConnection) -> Result<i64, sqlx::Error> {
    let (n,): (i64,) = sqlx::query_as("SELECT nextval('invoice_numbers')").fetch_one(conn).await?;
    Ok(n)
}

pub async fn insert(conn: &mut PgConnection, inv: &Invoice) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO invoices (id, order_id, invoice_number, buyer_id, seller_id, subtotal, tax_amount, total_amount, status, document_path, issue_date)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(inv.id)
    .bind(inv.order_id)
    .bind(&inv.invoice_number)
    .bind(inv.buyer_id)
    .bind(inv.seller_id)
    .bind(inv.subtotal)
    .bind(inv.tax_amount)
    .bind(inv.total_amount)
    .bind(inv.status)
    .bind(&inv.document_path)
    .bind(inv.issue_date)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn for_order(conn: &mut PgConnection, order_id: Uuid) -> Result<Option<Invoice>, sqlx::Error> {
    sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE order_id = $1").bind(order_id).fetch_optional(conn).await
}

pub async fn set_document(conn: &mut PgConnection, id: Uuid, path: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE invoices SET document_path = $2 WHERE id = $1").bind(id).bind(path).execute(conn).await?;
    Ok(())
}

pub async fn cancel_for_order(conn: &mut PgConnection, order_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE invoices SET status = 'cancelled' WHERE order_id = $1").bind(order_id).execute(conn).await?;
    Ok(())
}
