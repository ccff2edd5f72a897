//! Order Aggregate
//!
//! Placement freezes resolved unit prices into order lines. After that the
//! order only moves forward through its status ladder, with the
//! `delivered -> completed` step guarded by a one-time code the buyer receives
//! by mail and hands to the seller.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::catalog::Product;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Money, Otp, Quantity};
use crate::error::FieldErrors;

pub const MAX_ORDER_LINES: usize = 100;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        Self::Pending, Self::Processing, Self::Shipped, Self::Delivered, Self::Completed, Self::Cancelled,
    ];

    /// Position on the forward ladder. Cancelled sits outside it.
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Processing => Some(1),
            Self::Shipped => Some(2),
            Self::Delivered => Some(3),
            Self::Completed => Some(4),
            Self::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Completed | Self::Cancelled) }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "completed" => Ok(Self::Completed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub address: String,
    pub status: OrderStatus,
    pub total_price: Money,
    #[serde(skip)]
    pub delivery_otp: Option<String>,
    #[serde(skip)]
    pub otp_attempts: i32,
    pub is_delivered_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Immutable snapshot of what was bought and at which unit price.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub seller_id: Uuid,
    pub product_name: String,
    pub variant_label: Option<String>,
    pub quantity: i32,
    pub price: Money,
    pub gst_rate: Decimal,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn line_total(&self) -> Money { self.price.times(self.quantity) }
}

#[derive(Clone, Debug, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
}

/// Result of a successful placement, ready to be persisted as one unit.
#[derive(Clone, Debug)]
pub struct PlacedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// What a status update did, so the caller can word the response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusUpdate {
    Changed(OrderStatus),
    DeliveryOtpIssued,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtpCheck {
    Verified,
    Rejected { attempts_left: i32 },
    /// The last allowed attempt failed and the code was discarded.
    Voided,
}

impl Order {
    fn new(buyer_id: Uuid, address: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            buyer_id,
            address,
            status: OrderStatus::Pending,
            total_price: Money::ZERO,
            delivery_otp: None,
            otp_attempts: 0,
            is_delivered_verified: false,
            created_at: now,
            updated_at: now,
            events: vec![],
        }
    }

    /// Validates every line against the catalog, freezes unit prices and
    /// totals the order. All line errors are reported together.
    pub fn place(
        buyer_id: Uuid,
        address: &str,
        lines: &[OrderLine],
        catalog: &HashMap<Uuid, Product>,
    ) -> Result<PlacedOrder, FieldErrors> {
        let mut errors = FieldErrors::new();
        let address = address.trim();
        if address.is_empty() {
            errors.add("address", "address is required");
        }
        if lines.is_empty() {
            errors.add("items", "at least one item is required");
        }
        if lines.len() > MAX_ORDER_LINES {
            errors.add("items", format!("at most {MAX_ORDER_LINES} items per order"));
        }

        let mut order = Order::new(buyer_id, address.to_string());
        let mut items = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            match order.price_line(line, catalog) {
                Ok(item) => items.push(item),
                Err(e) => errors.absorb(&format!("items[{i}]"), e),
            }
        }
        errors.into_result()?;

        order.total_price = items.iter().map(OrderItem::line_total).sum();
        order.raise_event(OrderEvent::Placed {
            order_id: order.id,
            buyer_id,
            seller_ids: seller_ids(&items),
            total: order.total_price,
        });
        Ok(PlacedOrder { order, items })
    }

    fn price_line(&self, line: &OrderLine, catalog: &HashMap<Uuid, Product>) -> Result<OrderItem, FieldErrors> {
        let mut errors = FieldErrors::new();
        let quantity = Quantity::new(line.quantity).map_err(|e| errors.add("quantity", e.to_string())).ok();
        let Some(product) = catalog.get(&line.product_id) else {
            errors.add("product_id", "product does not exist");
            return Err(errors);
        };
        let variant = match product.select_variant(line.variant_id) {
            Ok(v) => Some(v),
            Err(e) => {
                errors.add("variant_id", e.to_string());
                None
            }
        };
        errors.into_result()?;

        let (Some(quantity), Some(variant)) = (quantity, variant) else {
            return Err(FieldErrors::single("item", "invalid item"));
        };
        Ok(OrderItem {
            id: Uuid::now_v7(),
            order_id: self.id,
            product_id: product.id,
            variant_id: Some(variant.id),
            seller_id: product.seller_id,
            product_name: product.name.clone(),
            variant_label: Some(variant.label.clone()),
            quantity: quantity.value(),
            price: product.unit_price(Some(variant)),
            gst_rate: product.gst_rate,
            created_at: self.created_at,
        })
    }

    pub fn is_buyer(&self, user_id: Uuid) -> bool { self.buyer_id == user_id }

    /// Moves the order forward. `delivered` issues a fresh delivery code
    /// instead of being a plain write; `completed` is only reachable through
    /// [`Order::verify_delivery_otp`].
    pub fn update_status(&mut self, next: OrderStatus, items: &[OrderItem]) -> Result<StatusUpdate, OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::Terminal(self.status));
        }
        match next {
            OrderStatus::Completed => Err(OrderError::CompletionRequiresOtp),
            OrderStatus::Cancelled => {
                self.status = OrderStatus::Cancelled;
                self.delivery_otp = None;
                self.otp_attempts = 0;
                self.touch();
                self.raise_status_changed(items);
                Ok(StatusUpdate::Changed(OrderStatus::Cancelled))
            }
            OrderStatus::Delivered => {
                // Re-issuing while already delivered replaces the code.
                if self.status.rank() > OrderStatus::Delivered.rank() {
                    return Err(OrderError::InvalidTransition { from: self.status, to: next });
                }
                let otp = Otp::generate();
                self.status = OrderStatus::Delivered;
                self.delivery_otp = Some(otp.as_str().to_string());
                self.otp_attempts = 0;
                self.is_delivered_verified = false;
                self.touch();
                self.raise_event(OrderEvent::DeliveryOtpIssued { order_id: self.id, buyer_id: self.buyer_id, otp });
                Ok(StatusUpdate::DeliveryOtpIssued)
            }
            _ => {
                if next.rank() <= self.status.rank() {
                    return Err(OrderError::InvalidTransition { from: self.status, to: next });
                }
                self.status = next;
                self.touch();
                self.raise_status_changed(items);
                Ok(StatusUpdate::Changed(next))
            }
        }
    }

    /// Compares the submitted code against the stored one. The caller must
    /// persist the order whatever the outcome, since failed attempts count.
    pub fn verify_delivery_otp(&mut self, submitted: &str, max_attempts: i32, items: &[OrderItem]) -> Result<OtpCheck, OrderError> {
        let stored = match (&self.status, &self.delivery_otp) {
            (OrderStatus::Delivered, Some(code)) => Otp::from(code.clone()),
            _ => return Err(OrderError::NoPendingOtp),
        };

        if stored.matches(submitted) {
            self.status = OrderStatus::Completed;
            self.is_delivered_verified = true;
            self.delivery_otp = None;
            self.otp_attempts = 0;
            self.touch();
            self.raise_event(OrderEvent::Completed {
                order_id: self.id,
                buyer_id: self.buyer_id,
                seller_ids: seller_ids(items),
            });
            return Ok(OtpCheck::Verified);
        }

        self.otp_attempts += 1;
        self.touch();
        if self.otp_attempts >= max_attempts {
            self.delivery_otp = None;
            self.otp_attempts = 0;
            return Ok(OtpCheck::Voided);
        }
        Ok(OtpCheck::Rejected { attempts_left: max_attempts - self.otp_attempts })
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }

    fn raise_status_changed(&mut self, items: &[OrderItem]) {
        self.raise_event(OrderEvent::StatusChanged {
            order_id: self.id,
            buyer_id: self.buyer_id,
            seller_ids: seller_ids(items),
            status: self.status,
        });
    }
    fn raise_event(&mut self, e: impl Into<DomainEvent>) { self.events.push(e.into()); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// Distinct sellers in first-seen order.
pub fn seller_ids(items: &[OrderItem]) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = Vec::new();
    for item in items {
        if !ids.contains(&item.seller_id) {
            ids.push(item.seller_id);
        }
    }
    ids
}

pub fn has_seller(items: &[OrderItem], seller_id: Uuid) -> bool {
    items.iter().any(|i| i.seller_id == seller_id)
}

/// An order with its lines, as returned to clients.
#[derive(Clone, Debug, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("unknown order status '{0}'")]
    UnknownStatus(String),
    #[error("order is already {0}")]
    Terminal(OrderStatus),
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("orders are completed by verifying the delivery OTP")]
    CompletionRequiresOtp,
    #[error("No delivery OTP pending for this order")]
    NoPendingOtp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::catalog::tests::product_with;
    use crate::domain::events::DomainEvent;

    fn catalog(products: Vec<Product>) -> HashMap<Uuid, Product> {
        products.into_iter().map(|p| (p.id, p)).collect()
    }

    fn placed_order() -> PlacedOrder {
        let p = product_with(Uuid::now_v7(), Some(10), &[(Some(100), None)]);
        let line = OrderLine { product_id: p.id, variant_id: Some(p.variants[0].id), quantity: 2 };
        Order::place(Uuid::now_v7(), "12 Lab Road", &[line], &catalog(vec![p])).unwrap()
    }

    #[test]
    fn test_place_order_freezes_discounted_price() {
        let seller = Uuid::now_v7();
        let buyer = Uuid::now_v7();
        let mut p = product_with(seller, Some(10), &[(Some(100), None)]);
        let line = OrderLine { product_id: p.id, variant_id: Some(p.variants[0].id), quantity: 2 };
        let mut placed = Order::place(buyer, "12 Lab Road", &[line], &catalog(vec![p.clone()])).unwrap();

        assert_eq!(placed.items.len(), 1);
        assert_eq!(placed.items[0].price.amount(), Decimal::from(90));
        assert_eq!(placed.order.total_price.amount(), Decimal::from(180));
        assert_eq!(placed.order.status, OrderStatus::Pending);

        // Later catalog edits do not reach the frozen line.
        p.discount = Some(Decimal::from(50));
        p.variants[0].price = Some(Money::new(Decimal::from(1000)));
        let recomputed: Money = placed.items.iter().map(OrderItem::line_total).sum();
        assert_eq!(recomputed, placed.order.total_price);

        let events = placed.order.take_events();
        match events.as_slice() {
            [DomainEvent::Order(OrderEvent::Placed { buyer_id, seller_ids, .. })] => {
                assert_eq!(*buyer_id, buyer);
                assert_eq!(seller_ids, &vec![seller]);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_place_order_total_matches_lines_for_many_sellers() {
        let a = product_with(Uuid::now_v7(), None, &[(None, Some(40))]);
        let b = product_with(Uuid::now_v7(), Some(25), &[(Some(200), None), (Some(10), None)]);
        let lines = vec![
            OrderLine { product_id: a.id, variant_id: None, quantity: 3 },
            OrderLine { product_id: b.id, variant_id: Some(b.variants[0].id), quantity: 1 },
            OrderLine { product_id: b.id, variant_id: Some(b.variants[1].id), quantity: 4 },
        ];
        let mut placed = Order::place(Uuid::now_v7(), "addr", &lines, &catalog(vec![a, b])).unwrap();
        // 3*40 + 150 + 4*7.5
        assert_eq!(placed.order.total_price.amount(), Decimal::from(300));
        assert_eq!(seller_ids(&placed.items).len(), 2);
        assert_eq!(placed.order.take_events().len(), 1);
    }

    #[test]
    fn test_place_order_reports_all_line_errors() {
        let p = product_with(Uuid::now_v7(), None, &[(Some(1), None), (Some(2), None)]);
        let lines = vec![
            OrderLine { product_id: Uuid::now_v7(), variant_id: None, quantity: 1 },
            OrderLine { product_id: p.id, variant_id: None, quantity: 0 },
            OrderLine { product_id: p.id, variant_id: Some(Uuid::now_v7()), quantity: 1 },
        ];
        let errors = Order::place(Uuid::now_v7(), " ", &lines, &catalog(vec![p])).unwrap_err();
        let fields: Vec<_> = errors.fields().collect();
        assert_eq!(
            fields,
            vec!["address", "items[0].product_id", "items[1].quantity", "items[1].variant_id", "items[2].variant_id"]
        );
    }

    #[test]
    fn test_status_moves_forward_only() {
        let mut placed = placed_order();
        let order = &mut placed.order;
        assert_eq!(order.update_status(OrderStatus::Shipped, &placed.items), Ok(StatusUpdate::Changed(OrderStatus::Shipped)));
        assert_eq!(
            order.update_status(OrderStatus::Processing, &placed.items),
            Err(OrderError::InvalidTransition { from: OrderStatus::Shipped, to: OrderStatus::Processing })
        );
        assert_eq!(order.update_status(OrderStatus::Completed, &placed.items), Err(OrderError::CompletionRequiresOtp));
        assert_eq!(order.update_status(OrderStatus::Cancelled, &placed.items), Ok(StatusUpdate::Changed(OrderStatus::Cancelled)));
        assert_eq!(order.update_status(OrderStatus::Processing, &placed.items), Err(OrderError::Terminal(OrderStatus::Cancelled)));
    }

    #[test]
    fn test_delivery_otp_round_trip() {
        let mut placed = placed_order();
        let items = placed.items.clone();
        let order = &mut placed.order;
        order.take_events();

        assert_eq!(order.update_status(OrderStatus::Delivered, &items), Ok(StatusUpdate::DeliveryOtpIssued));
        assert_eq!(order.status, OrderStatus::Delivered);
        let otp = order.delivery_otp.clone().unwrap();
        assert_eq!(otp.len(), 6);
        assert!(!order.is_delivered_verified);
        assert!(matches!(
            order.take_events().as_slice(),
            [DomainEvent::Order(OrderEvent::DeliveryOtpIssued { .. })]
        ));

        let wrong = if otp == "000000" { "111111" } else { "000000" };
        assert_eq!(order.verify_delivery_otp(wrong, 5, &items), Ok(OtpCheck::Rejected { attempts_left: 4 }));
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.delivery_otp.as_deref(), Some(otp.as_str()));

        assert_eq!(order.verify_delivery_otp(&otp, 5, &items), Ok(OtpCheck::Verified));
        assert_eq!(order.status, OrderStatus::Completed);
        assert!(order.is_delivered_verified);
        assert_eq!(order.delivery_otp, None);
        assert_eq!(order.verify_delivery_otp(&otp, 5, &items), Err(OrderError::NoPendingOtp));
    }

    #[test]
    fn test_otp_voided_after_max_attempts() {
        let mut placed = placed_order();
        let items = placed.items.clone();
        let order = &mut placed.order;
        order.update_status(OrderStatus::Delivered, &items).unwrap();
        let otp = order.delivery_otp.clone().unwrap();
        let wrong = if otp == "000000" { "111111" } else { "000000" };

        assert_eq!(order.verify_delivery_otp(wrong, 2, &items), Ok(OtpCheck::Rejected { attempts_left: 1 }));
        assert_eq!(order.verify_delivery_otp(wrong, 2, &items), Ok(OtpCheck::Voided));
        assert_eq!(order.delivery_otp, None);
        assert_eq!(order.verify_delivery_otp(&otp, 2, &items), Err(OrderError::NoPendingOtp));

        // A fresh code can be issued again.
        assert_eq!(order.update_status(OrderStatus::Delivered, &items), Ok(StatusUpdate::DeliveryOtpIssued));
        assert!(order.delivery_otp.is_some());
    }

    #[test]
    fn test_otp_hidden_from_json() {
        let mut placed = placed_order();
        let items = placed.items.clone();
        placed.order.update_status(OrderStatus::Delivered, &items).unwrap();
        let json = serde_json::to_value(&placed.order).unwrap();
        assert!(json.get("delivery_otp").is_none());
        assert_eq!(json["status"], "delivered");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Shipped".parse::<OrderStatus>(), Ok(OrderStatus::Shipped));
        assert_eq!("canceled".parse::<OrderStatus>(), Ok(OrderStatus::Cancelled));
        assert!("lost".parse::<OrderStatus>().is_err());
    }
}
