//! Cart and wishlist staging rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::catalog::{CatalogError, Product};
use crate::domain::value_objects::{Money, Quantity, QuantityError};

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub added_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct WishlistItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub added_at: DateTime<Utc>,
}

/// A cart row priced against the current catalog. Display only: orders
/// resolve prices again at placement.
#[derive(Clone, Debug, Serialize)]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub product_name: String,
    pub variant_label: Option<String>,
    pub quantity: i32,
    pub unit_price: Money,
    pub line_total: Money,
}

#[derive(Clone, Debug, Serialize)]
pub struct Cart {
    pub user_id: Uuid,
    pub items: Vec<CartLine>,
    pub subtotal: Money,
}

impl Cart {
    /// Rows whose product has disappeared are skipped.
    pub fn price(user_id: Uuid, rows: Vec<CartItem>, products: &HashMap<Uuid, Product>) -> Self {
        let items: Vec<CartLine> = rows
            .into_iter()
            .filter_map(|row| {
                let product = products.get(&row.product_id)?;
                let variant = row.variant_id.and_then(|id| product.variant(id));
                let unit_price = product.unit_price(variant);
                Some(CartLine {
                    id: row.id,
                    product_id: row.product_id,
                    variant_id: row.variant_id,
                    product_name: product.name.clone(),
                    variant_label: variant.map(|v| v.label.clone()),
                    quantity: row.quantity,
                    unit_price,
                    line_total: unit_price.times(row.quantity),
                })
            })
            .collect();
        let subtotal = items.iter().map(|i| i.line_total).sum();
        Self { user_id, items, subtotal }
    }

    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
}

/// What an add-to-cart request resolves to before it is upserted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CartAddition {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: Quantity,
}

impl CartAddition {
    pub fn resolve(product: &Product, variant_id: Option<Uuid>, quantity: i32) -> Result<Self, CartError> {
        let quantity = Quantity::new(quantity)?;
        let variant = product.select_variant(variant_id)?;
        Ok(Self { product_id: product.id, variant_id: variant.id, quantity })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("cart item not found")]
    ItemNotFound,
    #[error(transparent)]
    Quantity(#[from] QuantityError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::catalog::tests::product_with;
    use rust_decimal::Decimal;

    #[test]
    fn test_cart_pricing() {
        let user = Uuid::now_v7();
        let p = product_with(Uuid::now_v7(), Some(10), &[(Some(100), None)]);
        let rows = vec![CartItem {
            id: Uuid::now_v7(),
            user_id: user,
            product_id: p.id,
            variant_id: Some(p.variants[0].id),
            quantity: 2,
            added_at: Utc::now(),
        }, CartItem {
            id: Uuid::now_v7(),
            user_id: user,
            product_id: Uuid::now_v7(), // deleted product
            variant_id: None,
            quantity: 1,
            added_at: Utc::now(),
        }];
        let products = HashMap::from([(p.id, p)]);
        let cart = Cart::price(user, rows, &products);
        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.items[0].unit_price.amount(), Decimal::from(90));
        assert_eq!(cart.subtotal.amount(), Decimal::from(180));
    }

    #[test]
    fn test_addition_resolution() {
        let p = product_with(Uuid::now_v7(), None, &[(Some(10), None)]);
        let add = CartAddition::resolve(&p, None, 3).unwrap();
        assert_eq!(add.variant_id, p.variants[0].id);
        assert_eq!(add.quantity.value(), 3);
        assert_eq!(CartAddition::resolve(&p, None, 0), Err(CartError::Quantity(QuantityError::NotPositive)));
        assert_eq!(
            CartAddition::resolve(&p, Some(Uuid::now_v7()), 1),
            Err(CartError::Catalog(CatalogError::VariantNotInProduct))
        );
    }
}
