use sqlx::PgConnection;
use uuid::Uuid;

use crate::auth::Actor;
use crate::domain::aggregates::quotation::{Quotation, QuotationRequest};

/// Inserts unless a request with the same key exists. `None` means it did.
pub async fn insert_if_absent(conn: &mut PgConnection, r: &QuotationRequest) -> Result<Option<QuotationRequest>, sqlx::Error> {
    sqlx::query_as::<_, QuotationRequest>(
        "INSERT INTO quotation_requests (id, product_id, variant_id, buyer_id, seller_id, quantity, is_resolved, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7)
         ON CONFLICT (product_id, variant_id, buyer_id, seller_id) DO NOTHING
         RETURNING *",
    )
    .bind(r.id)
    .bind(r.product_id)
    .bind(r.variant_id)
    .bind(r.buyer_id)
    .bind(r.seller_id)
    .bind(r.quantity)
    .bind(r.created_at)
    .fetch_optional(conn)
    .await
}

pub async fn find_matching(conn: &mut PgConnection, r: &QuotationRequest) -> Result<Option<QuotationRequest>, sqlx::Error> {
    sqlx::query_as::<_, QuotationRequest>(
        "SELECT * FROM quotation_requests
         WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2 AND buyer_id = $3 AND seller_id = $4",
    )
    .bind(r.product_id)
    .bind(r.variant_id)
    .bind(r.buyer_id)
    .bind(r.seller_id)
    .fetch_optional(conn)
    .await
}

pub async fn find(conn: &mut PgConnection, id: Uuid) -> Result<Option<QuotationRequest>, sqlx::Error> {
    sqlx::query_as::<_, QuotationRequest>("SELECT * FROM quotation_requests WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<QuotationRequest>, sqlx::Error> {
    sqlx::query_as::<_, QuotationRequest>("SELECT * FROM quotation_requests WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await
}

/// Buyers see what they asked for, sellers what was addressed to them, staff everything.
pub async fn list_for(conn: &mut PgConnection, actor: &Actor) -> Result<Vec<QuotationRequest>, sqlx::Error> {
    let (column, id) = match *actor {
        Actor::Buyer(id) => ("buyer_id", Some(id)),
        Actor::Seller(id) => ("seller_id", Some(id)),
        Actor::Staff(_) => ("buyer_id", None),
    };
    sqlx::query_as::<_, QuotationRequest>(&format!(
        "SELECT * FROM quotation_requests WHERE ($1::uuid IS NULL OR {column} = $1) ORDER BY created_at DESC"
    ))
    .bind(id)
    .fetch_all(conn)
    .await
}

pub async fn resolve(conn: &mut PgConnection, q: &Quotation) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO quotations (id, request_id, uploaded_by, file_path, note, is_invoice, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(q.id)
    .bind(q.request_id)
    .bind(q.uploaded_by)
    .bind(&q.file_path)
    .bind(&q.note)
    .bind(q.is_invoice)
    .bind(q.created_at)
    .execute(&mut *conn)
    .await?;
    sqlx::query("UPDATE quotation_requests SET is_resolved = TRUE WHERE id = $1")
        .bind(q.request_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn quotation_for(conn: &mut PgConnection, request_id: Uuid) -> Result<Option<Quotation>, sqlx::Error> {
    sqlx::query_as::<_, Quotation>("SELECT * FROM quotations WHERE request_id = $1")
        .bind(request_id)
        .fetch_optional(conn)
        .await
}
