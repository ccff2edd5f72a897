//! Catalog endpoints, bulk sheet import and recently viewed products.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::api::{AppState, Form};
use crate::auth::Actor;
use crate::db::{self, catalog::{ProductFilter, ProductListing}, Page, Paginated};
use crate::domain::aggregates::catalog::{self, Product, ProductCategory, ProductDraft, RawProduct, VariantDraft};
use crate::domain::bulk_upload::{self, RowError};
use crate::domain::value_objects::Money;
use crate::error::{ApiError, FieldErrors, ValidJson};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/search", get(search_products))
        .route("/products/upload_products", post(upload_products))
        .route("/products/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/products/:id/image", post(upload_image))
        .route("/products/:id/recent-view", post(record_view))
        .route("/recently-viewed", get(recently_viewed))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub category: Option<String>,
    pub seller: Option<Uuid>,
    pub q: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListParams {
    fn filter(&self) -> Result<ProductFilter, ApiError> {
        let category = match self.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => Some(c.parse::<ProductCategory>()?),
            None => None,
        };
        Ok(ProductFilter { category, seller_id: self.seller, search: self.q.clone() })
    }

    fn page(&self) -> Page { Page { page: self.page, per_page: self.per_page } }
}

#[derive(Debug, Deserialize)]
pub struct VariantPayload {
    pub id: Option<Uuid>,
    pub label: String,
    pub est_price: Option<Decimal>,
    pub price: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductPayload {
    pub ref_no: String,
    #[validate(length(max = 255, message = "name must be at most 255 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub brand: Option<String>,
    pub cas_number: Option<String>,
    pub gst_rate: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub variants: Option<Vec<VariantPayload>>,
}

impl ProductPayload {
    /// Also reports whether the payload carried a variant list at all.
    fn into_draft(self) -> Result<(ProductDraft, bool), FieldErrors> {
        let has_variants = self.variants.is_some();
        let variants = self
            .variants
            .unwrap_or_default()
            .into_iter()
            .map(|v| VariantDraft {
                id: v.id,
                label: v.label,
                est_price: v.est_price.map(Money::new),
                price: v.price.map(Money::new),
            })
            .collect();
        let raw = RawProduct {
            ref_no: self.ref_no,
            name: self.name,
            description: self.description,
            category: self.category,
            brand: self.brand,
            cas_number: self.cas_number,
            gst_rate: self.gst_rate,
            discount: self.discount,
        };
        Ok((ProductDraft::parse(raw, variants)?, has_variants))
    }
}

async fn list_products(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<Paginated<ProductListing>>, ApiError> {
    let filter = p.filter()?;
    let page = p.page();
    let mut conn = s.db.acquire().await?;
    let (data, total) = db::catalog::list(&mut *conn, &filter, page).await?;
    Ok(Json(Paginated { data, total, page: page.number(), per_page: page.limit() }))
}

async fn search_products(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<Paginated<ProductListing>>, ApiError> {
    if p.q.as_deref().map(str::trim).unwrap_or_default().is_empty() {
        return Err(FieldErrors::single("q", "search term is required").into());
    }
    list_products(State(s), Query(p)).await
}

async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ProductListing>, ApiError> {
    let mut conn = s.db.acquire().await?;
    let product = db::catalog::find(&mut *conn, id).await?.ok_or_else(|| ApiError::not_found("Product"))?;
    let mut listed = db::catalog::with_ratings(&mut *conn, vec![product]).await?;
    listed.pop().map(Json).ok_or_else(|| ApiError::not_found("Product"))
}

async fn create_product(
    State(s): State<AppState>,
    actor: Actor,
    ValidJson(body): ValidJson<ProductPayload>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let seller_id = actor.seller()?;
    let (draft, _) = body.into_draft()?;
    let mut tx = s.db.begin().await?;
    if db::catalog::find_by_ref(&mut *tx, seller_id, draft.ref_no.as_str()).await?.is_some() {
        return Err(FieldErrors::single("ref_no", "You already have a product with this reference number").into());
    }
    let product = db::catalog::insert(&mut *tx, seller_id, &draft).await?;
    tx.commit().await?;
    info!(product_id = %product.id, %seller_id, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

async fn owned_product(conn: &mut sqlx::PgConnection, id: Uuid, actor: &Actor) -> Result<Product, ApiError> {
    let seller_id = actor.seller()?;
    let product = db::catalog::find(conn, id).await?.ok_or_else(|| ApiError::not_found("Product"))?;
    if !product.is_owned_by(seller_id) {
        return Err(ApiError::Forbidden("You can only manage your own products".into()));
    }
    Ok(product)
}

async fn update_product(
    State(s): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    ValidJson(body): ValidJson<ProductPayload>,
) -> Result<Json<Product>, ApiError> {
    let (draft, replace_variants) = body.into_draft()?;
    let mut tx = s.db.begin().await?;
    let current = owned_product(&mut *tx, id, &actor).await?;
    if let Some(other) = db::catalog::find_by_ref(&mut *tx, current.seller_id, draft.ref_no.as_str()).await? {
        if other.id != id {
            return Err(FieldErrors::single("ref_no", "You already have a product with this reference number").into());
        }
    }
    let variants = if replace_variants {
        let sync = current.plan_variants(&draft.variants)?;
        catalog::ensure_variants_removable(db::catalog::variant_history(&mut *tx, &sync.drop).await?)?;
        Some(sync)
    } else {
        None
    };
    let product = db::catalog::update(&mut *tx, id, &draft, variants.as_ref()).await?;
    tx.commit().await?;
    Ok(Json(product))
}

async fn delete_product(State(s): State<AppState>, actor: Actor, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    let mut tx = s.db.begin().await?;
    owned_product(&mut *tx, id, &actor).await?;
    catalog::ensure_deletable(db::catalog::product_history(&mut *tx, id).await?)?;
    db::catalog::delete(&mut *tx, id).await?;
    tx.commit().await?;
    info!(product_id = %id, "product deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn upload_image(
    State(s): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<Product>, ApiError> {
    let mut conn = s.db.acquire().await?;
    owned_product(&mut *conn, id, &actor).await?;
    let upload = Form::read(multipart).await?.require_file("image")?;
    let stored = s.files.put("products", &upload.file_name, &upload.bytes).await?;
    db::catalog::set_image(&mut *conn, id, &stored.path).await?;
    let product = db::catalog::find(&mut *conn, id).await?.ok_or_else(|| ApiError::not_found("Product"))?;
    Ok(Json(product))
}

#[derive(Debug, Serialize)]
pub struct UploadSummary {
    pub created_products: usize,
    pub created_variants: usize,
    pub errors: Vec<RowError>,
}

/// Imports a product sheet. Row problems are reported, not fatal.
async fn upload_products(
    State(s): State<AppState>,
    actor: Actor,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadSummary>), ApiError> {
    let seller_id = actor.seller()?;
    let upload = Form::read(multipart).await?.require_file("file")?;
    let plan = bulk_upload::plan_import(&upload.bytes)?;

    let mut tx = s.db.begin().await?;
    let mut summary = UploadSummary { created_products: 0, created_variants: 0, errors: plan.errors };
    for draft in &plan.products {
        match db::catalog::find_by_ref(&mut *tx, seller_id, draft.ref_no.as_str()).await? {
            Some(existing) => {
                for v in &draft.variants {
                    db::catalog::insert_variant(&mut *tx, existing.id, v).await?;
                    summary.created_variants += 1;
                }
            }
            None => {
                let product = db::catalog::insert(&mut *tx, seller_id, draft).await?;
                summary.created_products += 1;
                summary.created_variants += product.variants.len();
            }
        }
    }
    tx.commit().await?;
    info!(
        %seller_id,
        products = summary.created_products,
        variants = summary.created_variants,
        rejected_rows = summary.errors.len(),
        "product sheet imported"
    );
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn record_view(State(s): State<AppState>, actor: Actor, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    let mut conn = s.db.acquire().await?;
    db::catalog::find(&mut *conn, id).await?.ok_or_else(|| ApiError::not_found("Product"))?;
    db::catalog::record_view(&mut *conn, actor.user_id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn recently_viewed(State(s): State<AppState>, actor: Actor) -> Result<Json<Vec<Product>>, ApiError> {
    let mut conn = s.db.acquire().await?;
    Ok(Json(db::catalog::recently_viewed(&mut *conn, actor.user_id()).await?))
}
