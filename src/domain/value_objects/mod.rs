//! Value Objects for the marketplace

use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};
use thiserror::Error;

/// Seller reference number, unique per seller.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefNo(String);

impl RefNo {
    pub fn new(value: impl Into<String>) -> Result<Self, RefNoError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(RefNoError::Empty); }
        if value.len() > 50 { return Err(RefNoError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for RefNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefNoError {
    #[error("reference number is empty")]
    Empty,
    #[error("reference number is longer than 50 characters")]
    TooLong,
}

/// Money value object. Single currency (INR), two decimal places.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Rounds half away from zero to paise.
    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }
    pub fn times(&self, qty: i32) -> Money { Money::new(self.0 * Decimal::from(qty)) }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self { Money::new(amount) }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money { Money(self.0 - rhs.0) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, Add::add) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "₹{:.2}", self.0) }
}

/// Positive line quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantity(i32);

impl Quantity {
    pub const MAX: i32 = 100_000;

    pub fn new(value: i32) -> Result<Self, QuantityError> {
        if value < 1 { return Err(QuantityError::NotPositive); }
        if value > Self::MAX { return Err(QuantityError::TooLarge); }
        Ok(Self(value))
    }
    pub fn value(&self) -> i32 { self.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity must be at least 1")]
    NotPositive,
    #[error("quantity must not exceed 100000")]
    TooLarge,
}

/// Six digit delivery confirmation code.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Otp(String);

impl Otp {
    pub const LEN: usize = 6;

    pub fn generate() -> Self {
        let code: u32 = rand::thread_rng().gen_range(100_000..=999_999);
        Self(code.to_string())
    }
    pub fn as_str(&self) -> &str { &self.0 }

    /// Exact string comparison, surrounding whitespace on the submitted code ignored.
    pub fn matches(&self, submitted: &str) -> bool { self.0 == submitted.trim() }
}

impl From<String> for Otp {
    fn from(value: String) -> Self { Self(value) }
}

// Keep codes out of logs.
impl fmt::Debug for Otp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("Otp(******)") }
}

/// Review rating, 1 to 5 stars.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating(i16);

impl Rating {
    pub fn new(value: i16) -> Result<Self, RatingError> {
        if !(1..=5).contains(&value) { return Err(RatingError::OutOfRange); }
        Ok(Self(value))
    }
    pub fn value(&self) -> i16 { self.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RatingError {
    #[error("rating must be between 1 and 5")]
    OutOfRange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_no() {
        let r = RefNo::new("  p100 ").unwrap();
        assert_eq!(r.as_str(), "P100");
        assert_eq!(RefNo::new("   "), Err(RefNoError::Empty));
        assert_eq!(RefNo::new("x".repeat(51)), Err(RefNoError::TooLong));
    }

    #[test]
    fn test_money_rounding_and_sum() {
        let m = Money::new(Decimal::new(10_005, 3));
        assert_eq!(m.amount(), Decimal::new(1001, 2));
        let total: Money = [Money::new(Decimal::from(90)), Money::new(Decimal::from(90))].into_iter().sum();
        assert_eq!(total.amount(), Decimal::from(180));
        assert_eq!(Money::new(Decimal::from(50)).times(3).amount(), Decimal::from(150));
    }

    #[test]
    fn test_quantity_bounds() {
        assert!(Quantity::new(1).is_ok());
        assert_eq!(Quantity::new(0), Err(QuantityError::NotPositive));
        assert_eq!(Quantity::new(-3), Err(QuantityError::NotPositive));
        assert_eq!(Quantity::new(100_001), Err(QuantityError::TooLarge));
    }

    #[test]
    fn test_otp_shape() {
        for _ in 0..50 {
            let otp = Otp::generate();
            assert_eq!(otp.as_str().len(), Otp::LEN);
            assert!(otp.as_str().chars().all(|c| c.is_ascii_digit()));
            assert!(otp.matches(&format!(" {} ", otp.as_str())));
        }
        assert!(!Otp::from("123456".to_string()).matches("123457"));
        assert_eq!(format!("{:?}", Otp::from("123456".to_string())), "Otp(******)");
    }

    #[test]
    fn test_rating() {
        assert!(Rating::new(5).is_ok());
        assert_eq!(Rating::new(0), Err(RatingError::OutOfRange));
        assert_eq!(Rating::new(6), Err(RatingError::OutOfRange));
    }
}
