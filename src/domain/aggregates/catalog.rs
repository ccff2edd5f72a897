//! Catalog Aggregate: seller-owned products and their priced variants.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::pricing::{self, VariantPrice};
use crate::domain::value_objects::{Money, RefNo};
use crate::error::FieldErrors;

pub const DEFAULT_GST_RATE: i64 = 18;
pub const MAX_GST_RATE: i64 = 28;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "product_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProductCategory {
    Chemicals,
    Instruments,
    Biologicals,
    Consumables,
    Equipment,
}

impl ProductCategory {
    pub const ALL: [ProductCategory; 5] = [
        Self::Chemicals, Self::Instruments, Self::Biologicals, Self::Consumables, Self::Equipment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chemicals => "chemicals",
            Self::Instruments => "instruments",
            Self::Biologicals => "biologicals",
            Self::Consumables => "consumables",
            Self::Equipment => "equipment",
        }
    }
}

impl FromStr for ProductCategory {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| CatalogError::UnknownCategory(s.trim().to_string()))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub ref_no: String,
    pub name: String,
    pub description: String,
    pub category: ProductCategory,
    pub brand: Option<String>,
    pub cas_number: Option<String>,
    pub gst_rate: Decimal,
    pub discount: Option<Decimal>,
    pub image_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub variants: Vec<ProductVariant>,
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub label: String,
    pub est_price: Option<Money>,
    pub price: Option<Money>,
    pub created_at: DateTime<Utc>,
}

impl ProductVariant {
    pub fn prices(&self) -> VariantPrice { VariantPrice { price: self.price, est_price: self.est_price } }
    pub fn effective_price(&self) -> Money { pricing::effective_price(Some(&self.prices())) }
}

impl Product {
    pub fn is_owned_by(&self, seller_id: Uuid) -> bool { self.seller_id == seller_id }

    pub fn variant(&self, variant_id: Uuid) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    /// Chooses the variant an order or cart line refers to. Without an explicit
    /// id the product's only variant is used; zero or several is an error.
    pub fn select_variant(&self, variant_id: Option<Uuid>) -> Result<&ProductVariant, CatalogError> {
        match variant_id {
            Some(id) => self.variant(id).ok_or(CatalogError::VariantNotInProduct),
            None => match self.variants.as_slice() {
                [only] => Ok(only),
                [] => Err(CatalogError::NoPricedVariant),
                _ => Err(CatalogError::VariantRequired),
            },
        }
    }

    /// Unit price after variant fallback and product discount.
    pub fn unit_price(&self, variant: Option<&ProductVariant>) -> Money {
        pricing::resolve_unit_price(variant.map(|v| v.prices()).as_ref(), self.discount)
    }

    /// Matches a submitted variant list against the stored one. A draft
    /// carrying an id updates that row; a draft without one takes over an
    /// unclaimed row with the same label, so re-sending a list keeps the ids
    /// that order lines, quotation requests and reviews point at.
    pub fn plan_variants(&self, drafts: &[VariantDraft]) -> Result<VariantSync, CatalogError> {
        let mut unclaimed: Vec<&ProductVariant> = self.variants.iter().collect();
        let mut sync = VariantSync::default();

        for draft in drafts {
            let Some(id) = draft.id else { continue };
            let at = unclaimed.iter().position(|v| v.id == id).ok_or(CatalogError::VariantNotInProduct)?;
            unclaimed.swap_remove(at);
            sync.keep.push((id, draft.clone()));
        }
        for draft in drafts.iter().filter(|d| d.id.is_none()) {
            let label = draft.label.trim();
            match unclaimed.iter().position(|v| v.label.trim().eq_ignore_ascii_case(label)) {
                Some(at) => sync.keep.push((unclaimed.swap_remove(at).id, draft.clone())),
                None => sync.add.push(draft.clone()),
            }
        }
        sync.drop = unclaimed.into_iter().map(|v| v.id).collect();
        Ok(sync)
    }
}

/// Row-level changes that turn the stored variants into the submitted ones.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VariantSync {
    pub keep: Vec<(Uuid, VariantDraft)>,
    pub add: Vec<VariantDraft>,
    pub drop: Vec<Uuid>,
}

/// Validated input for creating or updating a product.
#[derive(Clone, Debug)]
pub struct ProductDraft {
    pub ref_no: RefNo,
    pub name: String,
    pub description: String,
    pub category: ProductCategory,
    pub brand: Option<String>,
    pub cas_number: Option<String>,
    pub gst_rate: Decimal,
    pub discount: Option<Decimal>,
    pub variants: Vec<VariantDraft>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariantDraft {
    /// Set when editing an existing variant.
    pub id: Option<Uuid>,
    pub label: String,
    pub est_price: Option<Money>,
    pub price: Option<Money>,
}

/// Unvalidated product fields as they arrive from a form or a sheet row.
#[derive(Clone, Debug, Default)]
pub struct RawProduct {
    pub ref_no: String,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub brand: Option<String>,
    pub cas_number: Option<String>,
    pub gst_rate: Option<Decimal>,
    pub discount: Option<Decimal>,
}

impl ProductDraft {
    pub fn parse(raw: RawProduct, variants: Vec<VariantDraft>) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();

        let ref_no = RefNo::new(raw.ref_no).map_err(|e| errors.add("ref_no", e.to_string())).ok();
        let name = raw.name.trim().to_string();
        if name.is_empty() {
            errors.add("name", "name is required");
        }
        let category = raw.category.parse::<ProductCategory>().map_err(|e| errors.add("category", e.to_string())).ok();

        let gst_rate = raw.gst_rate.unwrap_or_else(|| Decimal::from(DEFAULT_GST_RATE));
        if gst_rate < Decimal::ZERO || gst_rate > Decimal::from(MAX_GST_RATE) {
            errors.add("gst_rate", format!("gst_rate must be between 0 and {MAX_GST_RATE}"));
        }
        if let Some(d) = raw.discount {
            if d < Decimal::ZERO || d > Decimal::ONE_HUNDRED {
                errors.add("discount", "discount must be between 0 and 100");
            }
        }
        for (i, v) in variants.iter().enumerate() {
            if let Err(e) = v.validate() {
                errors.absorb(&format!("variants[{i}]"), e);
            }
        }

        errors.into_result()?;
        match (ref_no, category) {
            (Some(ref_no), Some(category)) => Ok(Self {
                ref_no,
                name,
                description: raw.description.map(|d| d.trim().to_string()).unwrap_or_default(),
                category,
                brand: non_blank(raw.brand),
                cas_number: non_blank(raw.cas_number),
                gst_rate,
                discount: raw.discount.filter(|d| !d.is_zero()),
                variants,
            }),
            _ => Err(FieldErrors::single("product", "invalid product")),
        }
    }
}

impl VariantDraft {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.label.trim().is_empty() {
            errors.add("label", "variant label is required");
        }
        if self.est_price.is_some_and(|p| p.is_negative()) {
            errors.add("est_price", "price must not be negative");
        }
        if self.price.is_some_and(|p| p.is_negative()) {
            errors.add("price", "price must not be negative");
        }
        errors.into_result()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Rows outside the catalog that point at a product or at some of its variants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct HistoryRefs {
    pub order_lines: i64,
    pub quotation_requests: i64,
    pub reviews: i64,
}

impl HistoryRefs {
    pub fn is_empty(&self) -> bool { self.order_lines == 0 && self.quotation_requests == 0 && self.reviews == 0 }
}

impl fmt::Display for HistoryRefs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} order line(s), {} quotation request(s) and {} review(s)",
            self.order_lines, self.quotation_requests, self.reviews
        )
    }
}

/// Order lines, quotation requests and reviews are history and stay.
/// Unreferenced products take their variants and cart/wishlist rows with them.
pub fn ensure_deletable(refs: HistoryRefs) -> Result<(), CatalogError> {
    if !refs.is_empty() { return Err(CatalogError::InUse(refs)); }
    Ok(())
}

pub fn ensure_variants_removable(refs: HistoryRefs) -> Result<(), CatalogError> {
    if !refs.is_empty() { return Err(CatalogError::VariantInUse(refs)); }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
    #[error("variant does not belong to this product")]
    VariantNotInProduct,
    #[error("variant_id is required for products with several variants")]
    VariantRequired,
    #[error("product has no priced variant")]
    NoPricedVariant,
    #[error("product is referenced by {0} and cannot be deleted")]
    InUse(HistoryRefs),
    #[error("a variant left out of the list is referenced by {0}; keep it or send its id")]
    VariantInUse(HistoryRefs),
}
