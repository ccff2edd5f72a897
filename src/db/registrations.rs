use sqlx::PgConnection;

use crate::domain::aggregates::account::PendingSignup;

/// A repeated sign-up for the same email replaces the code and its attempts.
pub async fn upsert(conn: &mut PgConnection, p: &PendingSignup) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO pending_registrations (email, name, phone, company_name, address, otp, attempts, expires_at, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name, phone = EXCLUDED.phone,
             company_name = EXCLUDED.company_name, address = EXCLUDED.address, otp = EXCLUDED.otp,
             attempts = 0, expires_at = EXCLUDED.expires_at, created_at = EXCLUDED.created_at",
    )
    .bind(&p.email)
    .bind(&p.name)
    .bind(&p.phone)
    .bind(&p.company_name)
    .bind(&p.address)
    .bind(&p.otp)
    .bind(p.attempts)
    .bind(p.expires_at)
    .bind(p.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn lock(conn: &mut PgConnection, email: &str) -> Result<Option<PendingSignup>, sqlx::Error> {
    sqlx::query_as::<_, PendingSignup>("SELECT * FROM pending_registrations WHERE email = $1 FOR UPDATE")
        .bind(email)
        .fetch_optional(conn)
        .await
}

pub async fn save_attempts(conn: &mut PgConnection, p: &PendingSignup) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE pending_registrations SET attempts = $2 WHERE email = $1")
        .bind(&p.email)
        .bind(p.attempts)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn delete(conn: &mut PgConnection, email: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM pending_registrations WHERE email = $1").bind(email).execute(conn).await?;
    Ok(())
}
