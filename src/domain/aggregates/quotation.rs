//! Quotation Aggregate: pre-order price negotiation.
//!
//! A request is unique per (product, variant, buyer, seller) and resolves
//! exactly once, when its seller uploads a quotation document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::Actor;
use crate::domain::aggregates::catalog::{CatalogError, Product};
use crate::domain::events::{DomainEvent, QuotationEvent};
use crate::domain::value_objects::{Quantity, QuantityError};

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct QuotationRequest {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub quantity: i32,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Quotation {
    pub id: Uuid,
    pub request_id: Uuid,
    pub uploaded_by: Uuid,
    pub file_path: String,
    pub note: String,
    pub is_invoice: bool,
    pub created_at: DateTime<Utc>,
}

impl QuotationRequest {
    /// A new request addressed to the product's seller. Whether it is
    /// actually inserted is decided by the unique key at persistence time.
    pub fn draft(product: &Product, variant_id: Option<Uuid>, buyer_id: Uuid, quantity: i32) -> Result<Self, QuotationError> {
        let quantity = Quantity::new(quantity)?;
        if let Some(id) = variant_id {
            product.variant(id).ok_or(CatalogError::VariantNotInProduct)?;
        }
        if product.seller_id == buyer_id {
            return Err(QuotationError::OwnProduct);
        }
        Ok(Self {
            id: Uuid::now_v7(),
            product_id: product.id,
            variant_id,
            buyer_id,
            seller_id: product.seller_id,
            quantity: quantity.value(),
            is_resolved: false,
            created_at: Utc::now(),
        })
    }

    pub fn requested_event(&self, product_name: &str) -> DomainEvent {
        QuotationEvent::Requested {
            request_id: self.id,
            product_name: product_name.to_string(),
            buyer_id: self.buyer_id,
            seller_id: self.seller_id,
            quantity: self.quantity,
        }
        .into()
    }

    /// One-shot gate: only the designated seller, only while unresolved.
    pub fn resolve(&mut self, uploader_id: Uuid, file_path: String, note: String, is_invoice: bool) -> Result<Quotation, QuotationError> {
        if uploader_id != self.seller_id {
            return Err(QuotationError::NotDesignatedSeller);
        }
        if self.is_resolved {
            return Err(QuotationError::AlreadyResolved);
        }
        self.is_resolved = true;
        Ok(Quotation {
            id: Uuid::now_v7(),
            request_id: self.id,
            uploaded_by: uploader_id,
            file_path,
            note: note.trim().to_string(),
            is_invoice,
            created_at: Utc::now(),
        })
    }

    pub fn uploaded_event(&self, product_name: &str, quotation: &Quotation) -> DomainEvent {
        QuotationEvent::Uploaded {
            request_id: self.id,
            product_name: product_name.to_string(),
            buyer_id: self.buyer_id,
            is_invoice: quotation.is_invoice,
        }
        .into()
    }

    pub fn can_read(&self, actor: &Actor) -> bool {
        actor.is_staff() || actor.user_id() == self.buyer_id || actor.user_id() == self.seller_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotationError {
    #[error(transparent)]
    Quantity(#[from] QuantityError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("sellers cannot request quotations for their own products")]
    OwnProduct,
    #[error("only the seller this request is addressed to can upload a quotation")]
    NotDesignatedSeller,
    #[error("Quotation already uploaded for this request")]
    AlreadyResolved,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::catalog::tests::product_with;

    #[test]
    fn test_draft_addresses_product_seller() {
        let seller = Uuid::now_v7();
        let buyer = Uuid::now_v7();
        let p = product_with(seller, None, &[(Some(10), None)]);
        let r = QuotationRequest::draft(&p, Some(p.variants[0].id), buyer, 25).unwrap();
        assert_eq!(r.seller_id, seller);
        assert_eq!(r.buyer_id, buyer);
        assert!(!r.is_resolved);

        assert_eq!(QuotationRequest::draft(&p, None, seller, 1).unwrap_err(), QuotationError::OwnProduct);
        assert_eq!(
            QuotationRequest::draft(&p, Some(Uuid::now_v7()), buyer, 1).unwrap_err(),
            QuotationError::Catalog(CatalogError::VariantNotInProduct)
        );
        assert!(matches!(QuotationRequest::draft(&p, None, buyer, 0), Err(QuotationError::Quantity(_))));
    }

    #[test]
    fn test_resolves_at_most_once() {
        let seller = Uuid::now_v7();
        let p = product_with(seller, None, &[(Some(10), None)]);
        let mut r = QuotationRequest::draft(&p, None, Uuid::now_v7(), 5).unwrap();

        assert_eq!(
            r.resolve(Uuid::now_v7(), "q.pdf".into(), String::new(), false).unwrap_err(),
            QuotationError::NotDesignatedSeller
        );
        assert!(!r.is_resolved);

        let q = r.resolve(seller, "quotations/q.pdf".into(), " net 30 ".into(), false).unwrap();
        assert!(r.is_resolved);
        assert_eq!(q.request_id, r.id);
        assert_eq!(q.note, "net 30");

        assert_eq!(
            r.resolve(seller, "quotations/q2.pdf".into(), String::new(), true).unwrap_err(),
            QuotationError::AlreadyResolved
        );
        assert!(r.is_resolved);
    }

    #[test]
    fn test_read_access() {
        let seller = Uuid::now_v7();
        let buyer = Uuid::now_v7();
        let p = product_with(seller, None, &[(Some(10), None)]);
        let r = QuotationRequest::draft(&p, None, buyer, 5).unwrap();
        assert!(r.can_read(&Actor::Buyer(buyer)));
        assert!(r.can_read(&Actor::Seller(seller)));
        assert!(r.can_read(&Actor::Staff(Uuid::now_v7())));
        assert!(!r.can_read(&Actor::Buyer(Uuid::now_v7())));
    }
}
