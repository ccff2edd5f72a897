//! Seller onboarding: approval hands out the temporary credential once and
//! forgets it; rejection removes the application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::events::{DomainEvent, SellerEvent};

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct SellerProfile {
    pub user_id: Uuid,
    pub company_name: String,
    pub gst_number: Option<String>,
    pub pan_number: Option<String>,
    pub address: String,
    pub document_path: Option<String>,
    pub is_approved: bool,
    #[serde(skip)]
    pub temp_credential: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SellerProfile {
    /// Marks the profile approved and moves the credential into the event.
    /// After this call the profile no longer holds it.
    pub fn approve(&mut self) -> Result<DomainEvent, SellerError> {
        if self.is_approved {
            return Err(SellerError::AlreadyApproved);
        }
        self.is_approved = true;
        Ok(SellerEvent::Approved { seller_id: self.user_id, temp_credential: self.temp_credential.take() }.into())
    }

    pub fn reject(self, email: String, name: String) -> Result<DomainEvent, SellerError> {
        if self.is_approved {
            return Err(SellerError::AlreadyApproved);
        }
        Ok(SellerEvent::Rejected { email, name }.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SellerError {
    #[error("seller is already approved")]
    AlreadyApproved,
    #[error("seller has {0} product(s) listed and cannot be removed")]
    HasProducts(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> SellerProfile {
        SellerProfile {
            user_id: Uuid::now_v7(),
            company_name: "Acme Reagents".into(),
            gst_number: Some("27AAPFU0939F1ZV".into()),
            pan_number: None,
            address: "Pune".into(),
            document_path: None,
            is_approved: false,
            temp_credential: Some("t3mp-Pa55".into()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_approval_clears_credential() {
        let mut p = pending();
        let event = p.approve().unwrap();
        assert!(p.is_approved);
        assert_eq!(p.temp_credential, None);
        match event {
            DomainEvent::Seller(SellerEvent::Approved { temp_credential, .. }) => {
                assert_eq!(temp_credential.as_deref(), Some("t3mp-Pa55"))
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(p.approve().unwrap_err(), SellerError::AlreadyApproved);
    }

    #[test]
    fn test_credential_never_serialized() {
        let json = serde_json::to_value(pending()).unwrap();
        assert!(json.get("temp_credential").is_none());
    }

    #[test]
    fn test_reject_pending_only() {
        assert!(pending().reject("a@b.c".into(), "A".into()).is_ok());
        let mut approved = pending();
        approved.approve().unwrap();
        assert_eq!(approved.reject("a@b.c".into(), "A".into()).unwrap_err(), SellerError::AlreadyApproved);
    }
}
