//! Order placement, lifecycle and invoices.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::api::{AppState, Form};
use crate::auth::Actor;
use crate::db;
use crate::domain::aggregates::invoice::{Invoice, InvoiceDocument};
use crate::domain::aggregates::order::{self, Order, OrderItem, OrderLine, OrderStatus, OrderView, OtpCheck, StatusUpdate};
use crate::error::{ApiError, ValidJson};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/place", post(place_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/update-status", patch(update_status))
        .route("/orders/:id/verify-otp", post(verify_otp))
        .route("/orders/:id/invoice", get(get_invoice))
        .route("/orders/:id/upload-invoice", post(upload_invoice))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PlaceOrderRequest {
    #[serde(default)]
    #[validate(length(max = 500, message = "address must be at most 500 characters"))]
    pub address: String,
    #[serde(default)]
    pub items: Vec<OrderLine>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusRequest {
    #[validate(length(min = 1, message = "status is required"))]
    pub status: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct OtpRequest {
    #[validate(length(min = 1, max = 12, message = "otp is required"))]
    pub otp: String,
}

/// Invoice row plus where its document can be fetched.
#[derive(Debug, Serialize)]
pub struct InvoiceView {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub document_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlacedResponse {
    pub order: OrderView,
    pub invoice: InvoiceView,
}

fn invoice_view(s: &AppState, invoice: Invoice) -> InvoiceView {
    let document_url = invoice.document_path.as_deref().map(|p| s.files.url(p));
    InvoiceView { invoice, document_url }
}

async fn place_order(
    State(s): State<AppState>,
    actor: Actor,
    ValidJson(body): ValidJson<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<PlacedResponse>), ApiError> {
    let buyer_id = actor.buyer()?;
    let mut tx = s.db.begin().await?;

    let ids: Vec<Uuid> = body.items.iter().map(|l| l.product_id).collect();
    let catalog = db::catalog::find_many(&mut *tx, &ids).await?;
    let mut placed = Order::place(buyer_id, &body.address, &body.items, &catalog)?;

    db::orders::insert(&mut *tx, &placed).await?;
    db::cart::clear(&mut *tx, buyer_id).await?;
    let sequence = db::invoices::next_number(&mut *tx).await?;
    let invoice = Invoice::issue(&placed.order, &placed.items, sequence)
        .ok_or_else(|| ApiError::Internal("placed order has no lines".into()))?;
    db::invoices::insert(&mut *tx, &invoice).await?;
    tx.commit().await?;

    info!(order_id = %placed.order.id, %buyer_id, total = %placed.order.total_price, invoice = %invoice.invoice_number, "order placed");
    s.notifier.dispatch(placed.order.take_events()).await;
    let invoice = attach_document(&s, invoice, &placed.order, &placed.items).await;

    Ok((
        StatusCode::CREATED,
        Json(PlacedResponse {
            order: OrderView { order: placed.order, items: placed.items },
            invoice: invoice_view(&s, invoice),
        }),
    ))
}

/// Renders and stores the invoice document. The row stays authoritative when
/// this fails.
async fn attach_document(s: &AppState, mut invoice: Invoice, order: &Order, items: &[OrderItem]) -> Invoice {
    let result: Result<String, ApiError> = async {
        let mut conn = s.db.acquire().await?;
        let buyer = db::users::display_name(&mut *conn, invoice.buyer_id).await?;
        let seller = db::users::display_name(&mut *conn, invoice.seller_id).await?;
        let doc = InvoiceDocument::new(&invoice, order, items, buyer, seller);
        let bytes = s.renderer.render(&doc);
        let name = format!("{}.{}", invoice.invoice_number, s.renderer.extension());
        let stored = s.files.put("invoices", &name, &bytes).await?;
        db::invoices::set_document(&mut *conn, invoice.id, &stored.path).await?;
        Ok(stored.path)
    }
    .await;
    match result {
        Ok(path) => invoice.document_path = Some(path),
        Err(e) => warn!(error = %e, invoice = %invoice.invoice_number, "invoice document not stored"),
    }
    invoice
}

async fn list_orders(State(s): State<AppState>, actor: Actor) -> Result<Json<Vec<OrderView>>, ApiError> {
    let mut conn = s.db.acquire().await?;
    let orders = match actor {
        Actor::Seller(id) => db::orders::list_for_seller(&mut *conn, id).await?,
        Actor::Buyer(id) | Actor::Staff(id) => db::orders::list_for_buyer(&mut *conn, id).await?,
    };
    Ok(Json(orders))
}

/// Loads an order the caller takes part in. Sellers only see their own lines.
async fn visible_order(conn: &mut sqlx::PgConnection, id: Uuid, actor: &Actor) -> Result<OrderView, ApiError> {
    let order = db::orders::find(&mut *conn, id).await?.ok_or_else(|| ApiError::not_found("Order"))?;
    let items = db::orders::items(conn, id).await?;
    match *actor {
        Actor::Staff(_) => Ok(OrderView { order, items }),
        Actor::Buyer(user) if order.is_buyer(user) => Ok(OrderView { order, items }),
        Actor::Seller(user) if order::has_seller(&items, user) => {
            let items = items.into_iter().filter(|i| i.seller_id == user).collect();
            Ok(OrderView { order, items })
        }
        _ => Err(ApiError::Forbidden("You do not have access to this order".into())),
    }
}

async fn get_order(State(s): State<AppState>, actor: Actor, Path(id): Path<Uuid>) -> Result<Json<OrderView>, ApiError> {
    let mut conn = s.db.acquire().await?;
    Ok(Json(visible_order(&mut *conn, id, &actor).await?))
}

/// Locks the order for a seller holding at least one of its lines.
async fn lock_for_seller(
    conn: &mut sqlx::PgConnection,
    id: Uuid,
    seller_id: Uuid,
) -> Result<(Order, Vec<OrderItem>), ApiError> {
    let order = db::orders::lock(&mut *conn, id).await?.ok_or_else(|| ApiError::not_found("Order"))?;
    let items = db::orders::items(conn, id).await?;
    if !order::has_seller(&items, seller_id) {
        return Err(ApiError::Forbidden("You do not have permission to update this order".into()));
    }
    Ok((order, items))
}

async fn update_status(
    State(s): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    ValidJson(body): ValidJson<StatusRequest>,
) -> Result<Json<Value>, ApiError> {
    let seller_id = actor.seller()?;
    let next: OrderStatus = body.status.parse()?;

    let mut tx = s.db.begin().await?;
    let (mut order, items) = lock_for_seller(&mut *tx, id, seller_id).await?;
    let from = order.status;
    let outcome = order.update_status(next, &items)?;
    db::orders::save_state(&mut *tx, &order).await?;
    if order.status == OrderStatus::Cancelled {
        db::invoices::cancel_for_order(&mut *tx, id).await?;
    }
    tx.commit().await?;

    info!(order_id = %id, %from, to = %order.status, %seller_id, "order status changed");
    s.notifier.dispatch(order.take_events()).await;

    let message = match outcome {
        StatusUpdate::DeliveryOtpIssued => "Order marked as delivered. OTP sent to buyer's email.".to_string(),
        StatusUpdate::Changed(status) => format!("Order status updated to {status}"),
    };
    Ok(Json(json!({ "message": message, "order": order })))
}

async fn verify_otp(
    State(s): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    ValidJson(body): ValidJson<OtpRequest>,
) -> Result<Json<Value>, ApiError> {
    let seller_id = actor.seller()?;
    let mut tx = s.db.begin().await?;
    let (mut order, items) = lock_for_seller(&mut *tx, id, seller_id).await?;
    let check = order.verify_delivery_otp(&body.otp, s.config.delivery_otp_max_attempts, &items)?;
    // Failed attempts are persisted too.
    db::orders::save_state(&mut *tx, &order).await?;
    tx.commit().await?;

    match check {
        OtpCheck::Verified => {
            info!(order_id = %id, %seller_id, "delivery confirmed");
            s.notifier.dispatch(order.take_events()).await;
            Ok(Json(json!({ "message": "OTP verified. Order marked as completed.", "order": order })))
        }
        OtpCheck::Rejected { attempts_left } => {
            warn!(order_id = %id, attempts_left, "invalid delivery OTP");
            Err(ApiError::InvalidOtp)
        }
        OtpCheck::Voided => {
            warn!(order_id = %id, "delivery OTP voided after too many attempts");
            Err(ApiError::BadRequest(
                "Too many invalid attempts. Mark the order as delivered again to issue a new OTP.".into(),
            ))
        }
    }
}

async fn get_invoice(State(s): State<AppState>, actor: Actor, Path(id): Path<Uuid>) -> Result<Json<InvoiceView>, ApiError> {
    let mut conn = s.db.acquire().await?;
    visible_order(&mut *conn, id, &actor).await?;
    let invoice = db::invoices::for_order(&mut *conn, id).await?.ok_or_else(|| ApiError::not_found("Invoice"))?;
    Ok(Json(invoice_view(&s, invoice)))
}

/// Replaces the generated document with one supplied by the seller.
async fn upload_invoice(
    State(s): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<InvoiceView>, ApiError> {
    let seller_id = actor.seller()?;
    let mut tx = s.db.begin().await?;
    lock_for_seller(&mut *tx, id, seller_id).await?;
    let mut invoice = db::invoices::for_order(&mut *tx, id).await?.ok_or_else(|| ApiError::not_found("Invoice"))?;
    let upload = Form::read(multipart).await?.require_file("file")?;
    let stored = s.files.put("invoices", &upload.file_name, &upload.bytes).await?;
    db::invoices::set_document(&mut *tx, invoice.id, &stored.path).await?;
    tx.commit().await?;
    invoice.document_path = Some(stored.path);
    Ok(Json(invoice_view(&s, invoice)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_request_defaults() {
        let body: PlaceOrderRequest = serde_json::from_value(json!({ "address": "12 Lab Road" })).unwrap();
        assert!(body.items.is_empty());
        let body: PlaceOrderRequest = serde_json::from_value(json!({
            "address": "12 Lab Road",
            "items": [{ "product_id": Uuid::nil(), "quantity": 2 }]
        }))
        .unwrap();
        assert_eq!(body.items[0].variant_id, None);
        assert_eq!(body.items[0].quantity, 2);
    }
}
