use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::aggregates::conversation::{Conversation, Message};

/// Returns the stored conversation and whether this call created it.
pub async fn get_or_create(conn: &mut PgConnection, c: &Conversation) -> Result<(Conversation, bool), sqlx::Error> {
    let inserted = sqlx::query_as::<_, Conversation>(
        "INSERT INTO product_conversations (id, order_id, product_id, buyer_id, seller_id, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (order_id, product_id, buyer_id, seller_id) DO NOTHING
         RETURNING *",
    )
    .bind(c.id)
    .bind(c.order_id)
    .bind(c.product_id)
    .bind(c.buyer_id)
    .bind(c.seller_id)
    .bind(c.created_at)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(created) = inserted {
        return Ok((created, true));
    }
    let existing = sqlx::query_as::<_, Conversation>(
        "SELECT * FROM product_conversations
         WHERE order_id = $1 AND product_id = $2 AND buyer_id = $3 AND seller_id = $4",
    )
    .bind(c.order_id)
    .bind(c.product_id)
    .bind(c.buyer_id)
    .bind(c.seller_id)
    .fetch_one(conn)
    .await?;
    Ok((existing, false))
}

pub async fn find(conn: &mut PgConnection, id: Uuid) -> Result<Option<Conversation>, sqlx::Error> {
    sqlx::query_as::<_, Conversation>("SELECT * FROM product_conversations WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn list_for(conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<Conversation>, sqlx::Error> {
    sqlx::query_as::<_, Conversation>(
        "SELECT * FROM product_conversations WHERE buyer_id = $1 OR seller_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(conn)
    .await
}

/// Plain read, no side effects.
pub async fn list_messages(conn: &mut PgConnection, conversation_id: Uuid) -> Result<Vec<Message>, sqlx::Error> {
    sqlx::query_as::<_, Message>(
        "SELECT * FROM product_messages WHERE conversation_id = $1 ORDER BY created_at, id",
    )
    .bind(conversation_id)
    .fetch_all(conn)
    .await
}

/// Marks the given messages read, skipping any sent by `reader_id`. Messages
/// that arrived after the caller fetched the thread are not in `ids`.
pub async fn mark_read_for(conn: &mut PgConnection, conversation_id: Uuid, reader_id: Uuid, ids: &[Uuid]) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }
    let r = sqlx::query(
        "UPDATE product_messages SET is_read = TRUE
         WHERE conversation_id = $1 AND sender_id <> $2 AND NOT is_read AND id = ANY($3)",
    )
    .bind(conversation_id)
    .bind(reader_id)
    .bind(ids)
    .execute(conn)
    .await?;
    Ok(r.rows_affected())
}

pub async fn insert_message(conn: &mut PgConnection, m: &Message) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO product_messages (id, conversation_id, sender_id, text, attachment_path, is_read, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(m.id)
    .bind(m.conversation_id)
    .bind(m.sender_id)
    .bind(&m.text)
    .bind(&m.attachment_path)
    .bind(m.is_read)
    .bind(m.created_at)
    .execute(conn)
    .await?;
    Ok(())
}
