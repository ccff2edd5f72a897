//! Per-order buyer/seller messaging about one product line.

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::api::{AppState, Form, Upload};
use crate::auth::Actor;
use crate::db;
use crate::domain::aggregates::conversation::{self, Conversation, Message};
use crate::error::{ApiError, ValidJson};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/conversations", get(list_conversations))
        .route("/conversations/start-or-get", post(start_or_get))
        .route("/conversations/:id/messages", get(list_messages))
        .route("/conversations/:id/messages/read", post(mark_read))
        .route("/conversations/:id/messages/send", post(send_message))
}

#[derive(Debug, Deserialize, Validate)]
pub struct StartConversation {
    pub order_id: Uuid,
    pub product_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub attachment_url: Option<String>,
}

fn message_view(s: &AppState, message: Message) -> MessageView {
    let attachment_url = message.attachment_path.as_deref().map(|p| s.files.url(p));
    MessageView { message, attachment_url }
}

async fn start_or_get(
    State(s): State<AppState>,
    actor: Actor,
    ValidJson(body): ValidJson<StartConversation>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let mut conn = s.db.acquire().await?;
    let order = db::orders::find(&mut *conn, body.order_id).await?.ok_or_else(|| ApiError::not_found("Order"))?;
    let items = db::orders::items(&mut *conn, order.id).await?;
    let draft = Conversation::open(&order, &items, body.product_id, actor.user_id())?;
    let (conversation, created) = db::conversations::get_or_create(&mut *conn, &draft).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(conversation)))
}

async fn list_conversations(State(s): State<AppState>, actor: Actor) -> Result<Json<Vec<Conversation>>, ApiError> {
    let mut conn = s.db.acquire().await?;
    Ok(Json(db::conversations::list_for(&mut *conn, actor.user_id()).await?))
}

async fn authorized(conn: &mut sqlx::PgConnection, id: Uuid, actor: &Actor) -> Result<Conversation, ApiError> {
    let conversation = db::conversations::find(conn, id).await?.ok_or_else(|| ApiError::not_found("Conversation"))?;
    conversation.authorize(actor)?;
    Ok(conversation)
}

/// Returns the thread and then marks what the caller had not read. Staff
/// reads leave receipts untouched.
async fn list_messages(State(s): State<AppState>, actor: Actor, Path(id): Path<Uuid>) -> Result<Json<Vec<MessageView>>, ApiError> {
    let mut conn = s.db.acquire().await?;
    let conversation = authorized(&mut *conn, id, &actor).await?;
    let mut messages = db::conversations::list_messages(&mut *conn, id).await?;

    let reader = actor.user_id();
    if conversation.is_participant(reader) {
        let unread = conversation::unread_for(&messages, reader);
        if !unread.is_empty() {
            db::conversations::mark_read_for(&mut *conn, id, reader, &unread).await?;
            for m in messages.iter_mut().filter(|m| unread.contains(&m.id)) {
                m.is_read = true;
            }
        }
    }
    Ok(Json(messages.into_iter().map(|m| message_view(&s, m)).collect()))
}

async fn mark_read(State(s): State<AppState>, actor: Actor, Path(id): Path<Uuid>) -> Result<Json<Value>, ApiError> {
    let mut conn = s.db.acquire().await?;
    let conversation = authorized(&mut *conn, id, &actor).await?;
    let reader = actor.user_id();
    let marked = if conversation.is_participant(reader) {
        let messages = db::conversations::list_messages(&mut *conn, id).await?;
        let unread = conversation::unread_for(&messages, reader);
        db::conversations::mark_read_for(&mut *conn, id, reader, &unread).await?
    } else {
        0
    };
    Ok(Json(json!({ "marked": marked })))
}

/// A message body sent either as JSON `{text}` or as multipart `text` plus an
/// optional `attachment` file.
pub struct MessageInput {
    pub text: Option<String>,
    pub attachment: Option<Upload>,
}

#[derive(Deserialize)]
struct JsonMessage {
    text: Option<String>,
}

#[async_trait]
impl<S> FromRequest<S> for MessageInput
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"));
        if is_multipart {
            let multipart = Multipart::from_request(req, state).await.map_err(|e| ApiError::BadRequest(e.body_text()))?;
            let mut form = Form::read(multipart).await?;
            Ok(Self { text: form.text("text"), attachment: form.take_file("attachment") })
        } else {
            let Json(body) = Json::<JsonMessage>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(Self { text: body.text, attachment: None })
        }
    }
}

async fn send_message(
    State(s): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    input: MessageInput,
) -> Result<(StatusCode, Json<MessageView>), ApiError> {
    let mut conn = s.db.acquire().await?;
    let conversation = authorized(&mut *conn, id, &actor).await?;
    let text = conversation.check_draft(&actor, input.text, input.attachment.is_some())?;
    let attachment_path = match input.attachment {
        Some(file) => Some(s.files.put("chat_attachments", &file.file_name, &file.bytes).await?.path),
        None => None,
    };
    let message = conversation.compose(&actor, text, attachment_path)?;
    db::conversations::insert_message(&mut *conn, &message).await?;

    let product_name = db::catalog::product_name(&mut *conn, conversation.product_id).await?;
    s.notifier.dispatch(vec![conversation.sent_event(&message, &product_name)]).await;
    Ok((StatusCode::CREATED, Json(message_view(&s, message))))
}
