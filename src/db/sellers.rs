use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::aggregates::seller::SellerProfile;

pub async fn lock(conn: &mut PgConnection, user_id: Uuid) -> Result<Option<SellerProfile>, sqlx::Error> {
    sqlx::query_as::<_, SellerProfile>("SELECT * FROM seller_profiles WHERE user_id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(conn)
        .await
}

pub async fn list(conn: &mut PgConnection, approved: Option<bool>) -> Result<Vec<SellerProfile>, sqlx::Error> {
    sqlx::query_as::<_, SellerProfile>(
        "SELECT * FROM seller_profiles WHERE ($1::boolean IS NULL OR is_approved = $1) ORDER BY created_at",
    )
    .bind(approved)
    .fetch_all(conn)
    .await
}

/// Approval and credential removal are one write.
pub async fn save_approval(conn: &mut PgConnection, p: &SellerProfile) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE seller_profiles SET is_approved = $2, temp_credential = $3 WHERE user_id = $1")
        .bind(p.user_id)
        .bind(p.is_approved)
        .bind(&p.temp_credential)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn product_count(conn: &mut PgConnection, user_id: Uuid) -> Result<i64, sqlx::Error> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products WHERE seller_id = $1")
        .bind(user_id)
        .fetch_one(conn)
        .await?;
    Ok(n)
}

pub async fn insert(conn: &mut PgConnection, p: &SellerProfile) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO seller_profiles
         (user_id, company_name, gst_number, pan_number, address, document_path, is_approved, temp_credential, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(p.user_id)
    .bind(&p.company_name)
    .bind(&p.gst_number)
    .bind(&p.pan_number)
    .bind(&p.address)
    .bind(&p.document_path)
    .bind(p.is_approved)
    .bind(&p.temp_credential)
    .bind(p.created_at)
    .execute(conn)
    .await?;
    Ok(())
}
