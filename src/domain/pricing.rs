//! Unit price resolution.
//!
//! A variant's effective price is its explicit price, falling back to its
//! estimated price, falling back to zero. The product-level discount applies on
//! top. Orders freeze the result at placement time; nothing here is ever
//! re-run against an existing order line.

use rust_decimal::Decimal;

use crate::domain::value_objects::Money;

/// The two price columns of a variant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VariantPrice {
    pub price: Option<Money>,
    pub est_price: Option<Money>,
}

pub fn effective_price(variant: Option<&VariantPrice>) -> Money {
    variant
        .and_then(|v| v.price.or(v.est_price))
        .unwrap_or(Money::ZERO)
}

/// `amount * (1 - discount/100)` when the discount is positive.
pub fn apply_discount(amount: Money, discount: Option<Decimal>) -> Money {
    match discount {
        Some(d) if d > Decimal::ZERO => {
            let d = d.min(Decimal::ONE_HUNDRED);
            Money::new(amount.amount() * (Decimal::ONE - d / Decimal::ONE_HUNDRED))
        }
        _ => amount,
    }
}

pub fn resolve_unit_price(variant: Option<&VariantPrice>, discount: Option<Decimal>) -> Money {
    apply_discount(effective_price(variant), discount)
}
