//! Invoice Aggregate
//!
//! Catalog prices are GST-inclusive, so the invoice total equals the order
//! total and the tax line is the portion already embedded in each line:
//! `line_total * rate / (100 + rate)`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::order::{Order, OrderItem};
use crate::domain::value_objects::Money;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invoice_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    #[default]
    Issued,
    Cancelled,
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub order_id: Uuid,
    pub invoice_number: String,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub total_amount: Money,
    pub status: InvoiceStatus,
    pub document_path: Option<String>,
    pub issue_date: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal: Money,
    pub tax_amount: Money,
    pub total_amount: Money,
}

pub fn invoice_number(sequence: i64) -> String { format!("INV-{sequence:06}") }

pub fn embedded_tax(line_total: Money, gst_rate: Decimal) -> Money {
    if gst_rate <= Decimal::ZERO {
        return Money::ZERO;
    }
    Money::new(line_total.amount() * gst_rate / (Decimal::ONE_HUNDRED + gst_rate))
}

pub fn totals(items: &[OrderItem]) -> InvoiceTotals {
    let total_amount: Money = items.iter().map(OrderItem::line_total).sum();
    let tax_amount: Money = items.iter().map(|i| embedded_tax(i.line_total(), i.gst_rate)).sum();
    InvoiceTotals { subtotal: total_amount - tax_amount, tax_amount, total_amount }
}

impl Invoice {
    /// The invoice's seller is the seller of the first order line.
    pub fn issue(order: &Order, items: &[OrderItem], sequence: i64) -> Option<Self> {
        let seller_id = items.first()?.seller_id;
        let t = totals(items);
        Some(Self {
            id: Uuid::now_v7(),
            order_id: order.id,
            invoice_number: invoice_number(sequence),
            buyer_id: order.buyer_id,
            seller_id,
            subtotal: t.subtotal,
            tax_amount: t.tax_amount,
            total_amount: t.total_amount,
            status: InvoiceStatus::Issued,
            document_path: None,
            issue_date: Utc::now(),
        })
    }
}

/// Structured content handed to the document renderer.
#[derive(Clone, Debug, Serialize)]
pub struct InvoiceDocument {
    pub invoice_number: String,
    pub issue_date: DateTime<Utc>,
    pub buyer: String,
    pub seller: String,
    pub address: String,
    pub lines: Vec<InvoiceLine>,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub total_amount: Money,
}

#[derive(Clone, Debug, Serialize)]
pub struct InvoiceLine {
    pub description: String,
    pub quantity: i32,
    pub unit_price: Money,
    pub gst_rate: Decimal,
    pub total: Money,
}

impl InvoiceDocument {
    pub fn new(invoice: &Invoice, order: &Order, items: &[OrderItem], buyer: String, seller: String) -> Self {
        Self {
            invoice_number: invoice.invoice_number.clone(),
            issue_date: invoice.issue_date,
            buyer,
            seller,
            address: order.address.clone(),
            lines: items
                .iter()
                .map(|i| InvoiceLine {
                    description: match &i.variant_label {
                        Some(label) => format!("{} ({})", i.product_name, label),
                        None => i.product_name.clone(),
                    },
                    quantity: i.quantity,
                    unit_price: i.price,
                    gst_rate: i.gst_rate,
                    total: i.line_total(),
                })
                .collect(),
            subtotal: invoice.subtotal,
            tax_amount: invoice.tax_amount,
            total_amount: invoice.total_amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::catalog::tests::product_with;
    use crate::domain::aggregates::order::OrderLine;
    use std::collections::HashMap;

    #[test]
    fn test_invoice_number_format() {
        assert_eq!(invoice_number(1), "INV-000001");
        assert_eq!(invoice_number(1234567), "INV-1234567");
    }

    #[test]
    fn test_embedded_tax_split_sums_to_total() {
        let p = product_with(Uuid::now_v7(), None, &[(Some(118), None)]);
        let line = OrderLine { product_id: p.id, variant_id: None, quantity: 2 };
        let catalog = HashMap::from([(p.id, p)]);
        let placed = Order::place(Uuid::now_v7(), "addr", &[line], &catalog).unwrap();

        let invoice = Invoice::issue(&placed.order, &placed.items, 42).unwrap();
        assert_eq!(invoice.invoice_number, "INV-000042");
        assert_eq!(invoice.total_amount, placed.order.total_price);
        assert_eq!(invoice.tax_amount.amount(), Decimal::from(36));
        assert_eq!(invoice.subtotal.amount(), Decimal::from(200));
        assert_eq!(invoice.subtotal + invoice.tax_amount, invoice.total_amount);
        assert_eq!(invoice.seller_id, placed.items[0].seller_id);
    }

    #[test]
    fn test_zero_rate_has_no_tax() {
        assert_eq!(embedded_tax(Money::new(Decimal::from(100)), Decimal::ZERO), Money::ZERO);
    }

    #[test]
    fn test_no_items_no_invoice() {
        let p = product_with(Uuid::now_v7(), None, &[(Some(1), None)]);
        let line = OrderLine { product_id: p.id, variant_id: None, quantity: 1 };
        let catalog = HashMap::from([(p.id, p)]);
        let placed = Order::place(Uuid::now_v7(), "addr", &[line], &catalog).unwrap();
        assert!(Invoice::issue(&placed.order, &[], 1).is_none());
    }
}
