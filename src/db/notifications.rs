use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

pub async fn insert(conn: &mut PgConnection, user_id: Uuid, message: &str) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO notifications (id, user_id, message, is_read, created_at) VALUES ($1, $2, $3, FALSE, NOW())")
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(message)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn list(conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC LIMIT 100")
        .bind(user_id)
        .fetch_all(conn)
        .await
}

pub async fn mark_read(conn: &mut PgConnection, user_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
    let r = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(r.rows_affected() > 0)
}
