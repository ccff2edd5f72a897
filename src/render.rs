//! Invoice document rendering.

use std::fmt::Write;

use crate::domain::aggregates::invoice::InvoiceDocument;

pub trait InvoiceRenderer: Send + Sync {
    fn render(&self, doc: &InvoiceDocument) -> Vec<u8>;
    /// File extension of rendered documents.
    fn extension(&self) -> &'static str;
}

/// Fixed-width plain text invoice.
pub struct TextInvoiceRenderer;

impl InvoiceRenderer for TextInvoiceRenderer {
    fn render(&self, doc: &InvoiceDocument) -> Vec<u8> {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(out, "TAX INVOICE {}", doc.invoice_number);
        let _ = writeln!(out, "Date: {}", doc.issue_date.format("%d-%m-%Y"));
        let _ = writeln!(out, "Seller: {}", doc.seller);
        let _ = writeln!(out, "Buyer: {}", doc.buyer);
        let _ = writeln!(out, "Ship to: {}", doc.address);
        let _ = writeln!(out);
        let _ = writeln!(out, "{:<40} {:>6} {:>12} {:>6} {:>14}", "Item", "Qty", "Unit", "GST%", "Amount");
        for line in &doc.lines {
            let _ = writeln!(
                out,
                "{:<40} {:>6} {:>12} {:>6} {:>14}",
                line.description,
                line.quantity,
                line.unit_price.to_string(),
                line.gst_rate.normalize().to_string(),
                line.total.to_string()
            );
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "{:>67} {:>14}", "Taxable value", doc.subtotal.to_string());
        let _ = writeln!(out, "{:>67} {:>14}", "GST (included)", doc.tax_amount.to_string());
        let _ = writeln!(out, "{:>67} {:>14}", "Total", doc.total_amount.to_string());
        out.into_bytes()
    }

    fn extension(&self) -> &'static str { "txt" }
}
