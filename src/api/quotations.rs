//! Quotation requests and the seller's single upload per request.

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::{AppState, Form};
use crate::auth::Actor;
use crate::db;
use crate::domain::aggregates::quotation::{Quotation, QuotationError, QuotationRequest};
use crate::error::ApiError;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/quotation-requests", get(list_requests))
        .route("/quotation-requests/products/:product_id/request", post(request_quotation))
        .route("/quotation-requests/:id/upload", post(upload_quotation))
        .route("/quotation-requests/:id/quotation", get(get_quotation))
}

#[derive(Debug, Default, Deserialize)]
pub struct QuoteRequestBody {
    pub variant_id: Option<Uuid>,
    pub quantity: Option<i32>,
}

impl QuoteRequestBody {
    /// An empty body means "the only variant, quantity 1". Anything else
    /// must be a valid JSON object.
    fn parse(raw: &[u8]) -> Result<Self, ApiError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(raw).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
    }
}

#[derive(Debug, Serialize)]
pub struct QuotationView {
    #[serde(flatten)]
    pub quotation: Quotation,
    pub file_url: String,
}

/// Get-or-create. Only a newly created request notifies the seller.
async fn request_quotation(
    State(s): State<AppState>,
    actor: Actor,
    Path(product_id): Path<Uuid>,
    body: Bytes,
) -> Result<(StatusCode, Json<QuotationRequest>), ApiError> {
    let buyer_id = actor.buyer()?;
    let body = QuoteRequestBody::parse(&body)?;
    let mut conn = s.db.acquire().await?;
    let product = db::catalog::find(&mut *conn, product_id).await?.ok_or_else(|| ApiError::not_found("Product"))?;
    let draft = QuotationRequest::draft(&product, body.variant_id, buyer_id, body.quantity.unwrap_or(1))?;

    if let Some(created) = db::quotations::insert_if_absent(&mut *conn, &draft).await? {
        info!(request_id = %created.id, %buyer_id, seller_id = %created.seller_id, "quotation requested");
        s.notifier.dispatch(vec![created.requested_event(&product.name)]).await;
        return Ok((StatusCode::CREATED, Json(created)));
    }
    let existing = db::quotations::find_matching(&mut *conn, &draft)
        .await?
        .ok_or_else(|| ApiError::not_found("Quotation request"))?;
    Ok((StatusCode::OK, Json(existing)))
}

async fn list_requests(State(s): State<AppState>, actor: Actor) -> Result<Json<Vec<QuotationRequest>>, ApiError> {
    let mut conn = s.db.acquire().await?;
    Ok(Json(db::quotations::list_for(&mut *conn, &actor).await?))
}

async fn upload_quotation(
    State(s): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<QuotationView>), ApiError> {
    let seller_id = actor.seller()?;
    let mut form = Form::read(multipart).await?;

    let mut tx = s.db.begin().await?;
    let mut request = db::quotations::lock(&mut *tx, id).await?.ok_or_else(|| ApiError::not_found("Quotation request"))?;
    // Gate before anything is written to storage.
    if request.seller_id != seller_id {
        return Err(QuotationError::NotDesignatedSeller.into());
    }
    if request.is_resolved {
        return Err(QuotationError::AlreadyResolved.into());
    }
    let upload = form.require_file("file")?;
    let stored = s.files.put("quotations", &upload.file_name, &upload.bytes).await?;
    let note = form.text("note").unwrap_or_default();
    let quotation = request.resolve(seller_id, stored.path, note, form.flag("is_invoice"))?;
    db::quotations::resolve(&mut *tx, &quotation).await?;
    let product_name = db::catalog::product_name(&mut *tx, request.product_id).await?;
    tx.commit().await?;

    info!(request_id = %id, %seller_id, is_invoice = quotation.is_invoice, "quotation uploaded");
    s.notifier.dispatch(vec![request.uploaded_event(&product_name, &quotation)]).await;
    let file_url = s.files.url(&quotation.file_path);
    Ok((StatusCode::CREATED, Json(QuotationView { quotation, file_url })))
}

async fn get_quotation(State(s): State<AppState>, actor: Actor, Path(id): Path<Uuid>) -> Result<Json<QuotationView>, ApiError> {
    let mut conn = s.db.acquire().await?;
    let request = db::quotations::find(&mut *conn, id).await?.ok_or_else(|| ApiError::not_found("Quotation request"))?;
    if !request.can_read(&actor) {
        return Err(ApiError::Forbidden("You do not have access to this quotation".into()));
    }
    let quotation = db::quotations::quotation_for(&mut *conn, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Quotation has not been uploaded yet".into()))?;
    let file_url = s.files.url(&quotation.file_path);
    Ok(Json(QuotationView { quotation, file_url }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_takes_defaults() {
        let body = QuoteRequestBody::parse(b"").unwrap();
        assert_eq!((body.variant_id, body.quantity), (None, None));
        assert!(QuoteRequestBody::parse(b" \n").is_ok());
    }

    #[test]
    fn test_malformed_body_is_rejected() {
        assert!(matches!(QuoteRequestBody::parse(b"{\"quantity\": "), Err(ApiError::BadRequest(_))));
        assert!(matches!(QuoteRequestBody::parse(b"{\"quantity\": \"lots\"}"), Err(ApiError::BadRequest(_))));
        assert_eq!(QuoteRequestBody::parse(br#"{"quantity": 25}"#).unwrap().quantity, Some(25));
    }
}
