use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::auth::Role;
use crate::domain::aggregates::account::{BuyerProfile, Profile, User};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Contact {
    pub email: String,
    pub name: String,
}

pub async fn contact(pool: &PgPool, user_id: Uuid) -> Result<Option<Contact>, sqlx::Error> {
    sqlx::query_as::<_, Contact>("SELECT email, name FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Company name when the user has a profile with one, otherwise the account name.
pub async fn display_name(conn: &mut PgConnection, user_id: Uuid) -> Result<String, sqlx::Error> {
    let (name,): (String,) = sqlx::query_as(
        "SELECT COALESCE(NULLIF(sp.company_name, ''), NULLIF(bp.company_name, ''), u.name)
         FROM users u
         LEFT JOIN seller_profiles sp ON sp.user_id = u.id
         LEFT JOIN buyer_profiles bp ON bp.user_id = u.id
         WHERE u.id = $1",
    )
    .bind(user_id)
    .fetch_one(conn)
    .await?;
    Ok(name)
}

pub async fn contact_in(conn: &mut PgConnection, user_id: Uuid) -> Result<Option<Contact>, sqlx::Error> {
    sqlx::query_as::<_, Contact>("SELECT email, name FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(conn)
        .await
}

pub async fn delete(conn: &mut PgConnection, user_id: Uuid) -> Result<u64, sqlx::Error> {
    let r = sqlx::query("DELETE FROM users WHERE id = $1").bind(user_id).execute(conn).await?;
    Ok(r.rows_affected())
}

pub async fn email_taken(conn: &mut PgConnection, email: &str) -> Result<bool, sqlx::Error> {
    let (taken,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
        .bind(email)
        .fetch_one(conn)
        .await?;
    Ok(taken)
}

pub async fn insert(conn: &mut PgConnection, u: &User) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO users (id, email, name, phone, role, is_staff, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(u.id)
    .bind(&u.email)
    .bind(&u.name)
    .bind(&u.phone)
    .bind(u.role)
    .bind(u.is_staff)
    .bind(u.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn insert_buyer_profile(conn: &mut PgConnection, p: &BuyerProfile) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO buyer_profiles (user_id, company_name, address, created_at) VALUES ($1, $2, $3, $4)")
        .bind(p.user_id)
        .bind(&p.company_name)
        .bind(&p.address)
        .bind(p.created_at)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn profile(conn: &mut PgConnection, user_id: Uuid) -> Result<Option<Profile>, sqlx::Error> {
    sqlx::query_as::<_, Profile>(
        "SELECT u.id, u.email, u.name, u.phone, u.role, u.is_staff,
                COALESCE(sp.company_name, bp.company_name) AS company_name,
                COALESCE(sp.address, bp.address) AS address,
                sp.gst_number, sp.pan_number, sp.is_approved
         FROM users u
         LEFT JOIN seller_profiles sp ON sp.user_id = u.id
         LEFT JOIN buyer_profiles bp ON bp.user_id = u.id
         WHERE u.id = $1",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await
}

/// Writes the account fields and whichever profile row the role owns. A
/// buyer without a profile row gets one.
pub async fn save_profile(conn: &mut PgConnection, p: &Profile) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET name = $2, phone = $3 WHERE id = $1")
        .bind(p.id)
        .bind(&p.name)
        .bind(&p.phone)
        .execute(&mut *conn)
        .await?;
    let address = p.address.clone().unwrap_or_default();
    match p.role {
        Role::Seller => {
            sqlx::query("UPDATE seller_profiles SET company_name = COALESCE($2, company_name), address = $3 WHERE user_id = $1")
                .bind(p.id)
                .bind(&p.company_name)
                .bind(&address)
                .execute(conn)
                .await?;
        }
        Role::Buyer => {
            sqlx::query(
                "INSERT INTO buyer_profiles (user_id, company_name, address, created_at) VALUES ($1, $2, $3, NOW())
                 ON CONFLICT (user_id) DO UPDATE SET company_name = EXCLUDED.company_name, address = EXCLUDED.address",
            )
            .bind(p.id)
            .bind(&p.company_name)
            .bind(&address)
            .execute(conn)
            .await?;
        }
    }
    Ok(())
}
