//! Product reviews from buyers who actually bought the product.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::{Rating, RatingError};

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub buyer_id: Uuid,
    pub rating: i16,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Average rating and count shown next to a product.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RatingSummary {
    pub average_rating: Option<Decimal>,
    pub review_count: i64,
}

impl Review {
    /// `eligible_orders` counts the buyer's processing or completed orders
    /// containing the product (and variant, when given).
    pub fn write(
        product_id: Uuid,
        variant_id: Option<Uuid>,
        buyer_id: Uuid,
        rating: i16,
        comment: &str,
        eligible_orders: i64,
    ) -> Result<Self, ReviewError> {
        let rating = Rating::new(rating)?;
        if eligible_orders == 0 {
            return Err(ReviewError::NotPurchased);
        }
        Ok(Self {
            id: Uuid::now_v7(),
            product_id,
            variant_id,
            buyer_id,
            rating: rating.value(),
            comment: comment.trim().to_string(),
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewError {
    #[error(transparent)]
    Rating(#[from] RatingError),
    #[error("You can only review products from your processing or completed orders")]
    NotPurchased,
    #[error("You have already reviewed this product")]
    Duplicate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_eligibility() {
        let r = Review::write(Uuid::now_v7(), None, Uuid::now_v7(), 4, " solid ", 1).unwrap();
        assert_eq!(r.rating, 4);
        assert_eq!(r.comment, "solid");
        assert_eq!(Review::write(Uuid::now_v7(), None, Uuid::now_v7(), 4, "", 0).unwrap_err(), ReviewError::NotPurchased);
        assert_eq!(
            Review::write(Uuid::now_v7(), None, Uuid::now_v7(), 9, "", 1).unwrap_err(),
            ReviewError::Rating(RatingError::OutOfRange)
        );
    }
}
