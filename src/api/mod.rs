//! HTTP surface: one router per area, merged under a single state.

pub mod accounts;
pub mod cart;
pub mod conversations;
pub mod dashboard;
pub mod notifications;
pub mod orders;
pub mod products;
pub mod quotations;
pub mod reviews;
pub mod sellers;

use axum::{
    extract::{DefaultBodyLimit, FromRef, Multipart},
    http::{HeaderValue, Method},
    routing::get,
    Json, Router,
};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::auth::AuthKeys;
use crate::config::Config;
use crate::domain::aggregates::{CartError, CatalogError, ConversationError, OrderError, QuotationError, ReviewError, SellerError};
use crate::domain::bulk_upload::BulkUploadError;
use crate::error::{ApiError, FieldErrors};
use crate::notify::Notifier;
use crate::render::InvoiceRenderer;
use crate::storage::{FileStore, StorageError};

/// Uploads (quotations, sheets, attachments) may exceed axum's default limit.
pub const UPLOAD_LIMIT: usize = 20 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub auth: AuthKeys,
    pub notifier: Notifier,
    pub files: Arc<dyn FileStore>,
    pub renderer: Arc<dyn InvoiceRenderer>,
}

impl FromRef<AppState> for AuthKeys {
    fn from_ref(state: &AppState) -> Self { state.auth.clone() }
}

pub fn router(state: AppState) -> Router {
    let media_mount = format!("/{}", state.config.media_url.trim_matches('/'));
    let cors = cors_layer(&state.config.allowed_origins);
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "linkzur-marketplace"})) }))
        .merge(accounts::routes())
        .merge(products::routes())
        .merge(reviews::routes())
        .merge(cart::routes())
        .merge(orders::routes())
        .merge(quotations::routes())
        .merge(conversations::routes())
        .merge(dashboard::routes())
        .merge(notifications::routes())
        .merge(sellers::routes())
        .nest_service(&media_mount, ServeDir::new(&state.config.media_root))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers(Any)
}

/// One uploaded file part.
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Text fields and file parts of a multipart body, keyed by field name.
#[derive(Default)]
pub struct Form {
    fields: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

impl Form {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Form::default();
        while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::BadRequest(e.body_text()))? {
            let Some(name) = field.name().map(str::to_string) else { continue };
            let file_name = field.file_name().map(str::to_string);
            let bytes = field.bytes().await.map_err(|e| ApiError::BadRequest(e.body_text()))?;
            match file_name {
                Some(file_name) => {
                    form.files.insert(name, Upload { file_name, bytes: bytes.to_vec() });
                }
                None => {
                    form.fields.insert(name, String::from_utf8_lossy(&bytes).into_owned());
                }
            }
        }
        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    pub fn flag(&self, name: &str) -> bool {
        self.text(name).is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "on" | "yes"))
    }

    pub fn take_file(&mut self, name: &str) -> Option<Upload> { self.files.remove(name) }

    pub fn require_file(&mut self, name: &str) -> Result<Upload, ApiError> {
        self.take_file(name).ok_or_else(|| FieldErrors::single(name, "file is required").into())
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::InUse(_) | CatalogError::VariantInUse(_) => ApiError::Conflict(e.to_string()),
            CatalogError::UnknownCategory(_) => FieldErrors::single("category", e.to_string()).into(),
            CatalogError::VariantNotInProduct | CatalogError::VariantRequired | CatalogError::NoPricedVariant => {
                FieldErrors::single("variant_id", e.to_string()).into()
            }
        }
    }
}

impl From<CartError> for ApiError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ItemNotFound => ApiError::not_found("Cart item"),
            CartError::Quantity(q) => FieldErrors::single("quantity", q.to_string()).into(),
            CartError::Catalog(c) => c.into(),
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::UnknownStatus(_) => FieldErrors::single("status", e.to_string()).into(),
            OrderError::NoPendingOtp => ApiError::NotFound(e.to_string()),
            OrderError::Terminal(_) | OrderError::InvalidTransition { .. } | OrderError::CompletionRequiresOtp => {
                ApiError::BadRequest(e.to_string())
            }
        }
    }
}

impl From<QuotationError> for ApiError {
    fn from(e: QuotationError) -> Self {
        match e {
            QuotationError::Quantity(q) => FieldErrors::single("quantity", q.to_string()).into(),
            QuotationError::Catalog(c) => c.into(),
            QuotationError::OwnProduct => ApiError::BadRequest(e.to_string()),
            QuotationError::NotDesignatedSeller => ApiError::Forbidden(e.to_string()),
            QuotationError::AlreadyResolved => ApiError::Conflict(e.to_string()),
        }
    }
}

impl From<ConversationError> for ApiError {
    fn from(e: ConversationError) -> Self {
        match e {
            ConversationError::NotOrderBuyer | ConversationError::NotParticipant => ApiError::Forbidden(e.to_string()),
            ConversationError::ProductNotInOrder => FieldErrors::single("product_id", e.to_string()).into(),
            ConversationError::EmptyMessage | ConversationError::MessageTooLong => FieldErrors::single("text", e.to_string()).into(),
        }
    }
}

impl From<ReviewError> for ApiError {
    fn from(e: ReviewError) -> Self {
        match e {
            ReviewError::Rating(r) => FieldErrors::single("rating", r.to_string()).into(),
            ReviewError::NotPurchased => ApiError::Forbidden(e.to_string()),
            ReviewError::Duplicate => ApiError::Conflict(e.to_string()),
        }
    }
}

impl From<SellerError> for ApiError {
    fn from(e: SellerError) -> Self { ApiError::Conflict(e.to_string()) }
}

impl From<BulkUploadError> for ApiError {
    fn from(e: BulkUploadError) -> Self { FieldErrors::single("file", e.to_string()).into() }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidName => FieldErrors::single("file", e.to_string()).into(),
            StorageError::Io(io) => ApiError::Internal(format!("file storage: {io}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::HistoryRefs;
    use axum::http::StatusCode;

    #[test]
    fn test_domain_errors_map_to_statuses() {
        let refs = HistoryRefs { order_lines: 3, ..Default::default() };
        assert!(matches!(ApiError::from(CatalogError::InUse(refs)), ApiError::Conflict(_)));
        assert!(matches!(ApiError::from(CatalogError::VariantInUse(refs)), ApiError::Conflict(_)));
        assert!(matches!(ApiError::from(CatalogError::VariantRequired), ApiError::Validation(e) if e.get("variant_id").is_some()));
        assert_eq!(ApiError::from(OrderError::NoPendingOtp).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(QuotationError::NotDesignatedSeller).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(ConversationError::NotParticipant).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(CartError::ItemNotFound).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_cors_falls_back_to_permissive() {
        let _ = cors_layer(&[]);
        let _ = cors_layer(&["https://linkzur.com".to_string()]);
    }
}
