//! Accounts: seller applications, buyer sign-up confirmed by an emailed code,
//! and the profile a signed-in user reads and edits.

use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::auth::Role;
use crate::domain::aggregates::seller::SellerProfile;
use crate::domain::events::{AccountEvent, DomainEvent};
use crate::domain::value_objects::Otp;
use crate::error::FieldErrors;

pub const SIGNUP_OTP_TTL_MINUTES: i64 = 10;
pub const SIGNUP_OTP_MAX_ATTEMPTS: i32 = 5;
pub const TEMP_CREDENTIAL_LEN: usize = 12;

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    fn new(email: String, name: String, phone: Option<String>, role: Role, now: DateTime<Utc>) -> Self {
        Self { id: Uuid::now_v7(), email, name, phone, role, is_staff: false, created_at: now }
    }
}

/// Lower-cased and trimmed; the unique index on `users.email` compares this form.
pub fn normalize_email(raw: &str) -> String { raw.trim().to_ascii_lowercase() }

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// 15 characters, letters and digits.
fn is_gstin(value: &str) -> bool { value.len() == 15 && value.chars().all(|c| c.is_ascii_alphanumeric()) }

/// Five letters, four digits, one letter.
fn is_pan(value: &str) -> bool {
    let b = value.as_bytes();
    b.len() == 10
        && b[..5].iter().all(u8::is_ascii_alphabetic)
        && b[5..9].iter().all(u8::is_ascii_digit)
        && b[9].is_ascii_alphabetic()
}

pub fn temp_credential() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(TEMP_CREDENTIAL_LEN).map(char::from).collect()
}

/// A seller's registration form before anything is stored.
#[derive(Clone, Debug, Default, Validate)]
pub struct SellerApplication {
    #[validate(length(min = 1, max = 255, message = "name is required"))]
    pub name: String,
    #[validate(email(message = "enter a valid email address"))]
    pub email: String,
    #[validate(length(max = 15, message = "phone must be at most 15 characters"))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 255, message = "company_name is required"))]
    pub company_name: String,
    pub gst_number: Option<String>,
    pub pan_number: Option<String>,
    #[validate(length(max = 500, message = "address must be at most 500 characters"))]
    pub address: String,
}

impl SellerApplication {
    /// Normalizes the fields, then reports every problem at once.
    pub fn check(mut self) -> Result<Self, FieldErrors> {
        self.name = self.name.trim().to_string();
        self.email = normalize_email(&self.email);
        self.phone = trimmed(self.phone);
        self.company_name = self.company_name.trim().to_string();
        self.gst_number = trimmed(self.gst_number).map(|g| g.to_ascii_uppercase());
        self.pan_number = trimmed(self.pan_number).map(|p| p.to_ascii_uppercase());
        self.address = self.address.trim().to_string();

        let mut errors = self.validate().map(|_| FieldErrors::new()).unwrap_or_else(FieldErrors::from);
        if self.gst_number.as_deref().is_some_and(|g| !is_gstin(g)) {
            errors.add("gst_number", "GST number must be 15 letters and digits");
        }
        if self.pan_number.as_deref().is_some_and(|p| !is_pan(p)) {
            errors.add("pan_number", "PAN must look like ABCDE1234F");
        }
        errors.into_result()?;
        Ok(self)
    }

    /// The seller account and its pending profile. The profile holds a
    /// temporary credential until staff approve it.
    pub fn into_account(self, document_path: Option<String>, now: DateTime<Utc>) -> (User, SellerProfile, DomainEvent) {
        let user = User::new(self.email, self.name, self.phone, Role::Seller, now);
        let profile = SellerProfile {
            user_id: user.id,
            company_name: self.company_name,
            gst_number: self.gst_number,
            pan_number: self.pan_number,
            address: self.address,
            document_path,
            is_approved: false,
            temp_credential: Some(temp_credential()),
            created_at: now,
        };
        let event = AccountEvent::SellerRegistered { seller_id: user.id, company_name: profile.company_name.clone() }.into();
        (user, profile, event)
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct BuyerSignupRequest {
    #[validate(email(message = "enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, max = 255, message = "name is required"))]
    pub name: String,
    #[validate(length(max = 15, message = "phone must be at most 15 characters"))]
    pub phone: Option<String>,
    #[validate(length(max = 255, message = "company_name must be at most 255 characters"))]
    pub company_name: Option<String>,
    #[serde(default)]
    #[validate(length(max = 500, message = "address must be at most 500 characters"))]
    pub address: String,
}

/// A buyer sign-up waiting for its emailed code. Starting again for the same
/// email replaces the code and resets the attempt count.
#[derive(Clone, sqlx::FromRow)]
pub struct PendingSignup {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub address: String,
    pub otp: String,
    pub attempts: i32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// Keep codes out of logs.
impl fmt::Debug for PendingSignup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSignup")
            .field("email", &self.email)
            .field("attempts", &self.attempts)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignupCheck {
    Verified,
    Rejected { attempts_left: i32 },
    /// The code ran out of time or attempts and was discarded.
    Expired,
}

impl PendingSignup {
    pub fn start(request: BuyerSignupRequest, now: DateTime<Utc>) -> (Self, DomainEvent) {
        let otp = Otp::generate();
        let pending = Self {
            email: normalize_email(&request.email),
            name: request.name.trim().to_string(),
            phone: trimmed(request.phone),
            company_name: trimmed(request.company_name),
            address: request.address.trim().to_string(),
            otp: otp.as_str().to_string(),
            attempts: 0,
            expires_at: now + Duration::minutes(SIGNUP_OTP_TTL_MINUTES),
            created_at: now,
        };
        let event = AccountEvent::SignupOtpIssued { email: pending.email.clone(), name: pending.name.clone(), otp }.into();
        (pending, event)
    }

    pub fn verify(&mut self, submitted: &str, now: DateTime<Utc>) -> SignupCheck {
        if now >= self.expires_at || self.attempts >= SIGNUP_OTP_MAX_ATTEMPTS {
            return SignupCheck::Expired;
        }
        if Otp::from(self.otp.clone()).matches(submitted) {
            return SignupCheck::Verified;
        }
        self.attempts += 1;
        if self.attempts >= SIGNUP_OTP_MAX_ATTEMPTS {
            return SignupCheck::Expired;
        }
        SignupCheck::Rejected { attempts_left: SIGNUP_OTP_MAX_ATTEMPTS - self.attempts }
    }

    /// The buyer account and its profile, once the code has been verified.
    pub fn into_account(self, now: DateTime<Utc>) -> (User, BuyerProfile) {
        let user = User::new(self.email, self.name, self.phone, Role::Buyer, now);
        let profile = BuyerProfile { user_id: user.id, company_name: self.company_name, address: self.address, created_at: now };
        (user, profile)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct BuyerProfile {
    pub user_id: Uuid,
    pub company_name: Option<String>,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

/// What `GET /profile` returns: the account plus whichever profile it has.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub is_staff: bool,
    pub company_name: Option<String>,
    pub address: Option<String>,
    pub gst_number: Option<String>,
    pub pan_number: Option<String>,
    pub is_approved: Option<bool>,
}

/// Fields a user may change on their own profile. Absent fields stay as they are.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[validate(length(min = 1, max = 255, message = "name must not be empty"))]
    pub name: Option<String>,
    #[validate(length(max = 15, message = "phone must be at most 15 characters"))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 255, message = "company_name must not be empty"))]
    pub company_name: Option<String>,
    #[validate(length(max = 500, message = "address must be at most 500 characters"))]
    pub address: Option<String>,
}

impl ProfileUpdate {
    pub fn apply(self, profile: &mut Profile) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if let Some(name) = self.name {
            match name.trim() {
                "" => errors.add("name", "name must not be empty"),
                name => profile.name = name.to_string(),
            }
        }
        if let Some(phone) = self.phone {
            profile.phone = trimmed(Some(phone));
        }
        if let Some(company) = self.company_name {
            match company.trim() {
                "" if profile.role == Role::Seller => errors.add("company_name", "company_name must not be empty"),
                company => profile.company_name = trimmed(Some(company.to_string())),
            }
        }
        if let Some(address) = self.address {
            profile.address = Some(address.trim().to_string());
        }
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn application() -> SellerApplication {
        SellerApplication {
            name: " Asha Rao ".into(),
            email: " Sales@Acme.IN ".into(),
            phone: Some("9876543210".into()),
            company_name: "Acme Reagents".into(),
            gst_number: Some("27aapfu0939f1zv".into()),
            pan_number: Some("aapfu0939f".into()),
            address: "Pune".into(),
        }
    }

    fn signup() -> BuyerSignupRequest {
        BuyerSignupRequest {
            email: "lab@uni.ac.in".into(),
            name: "Central Lab".into(),
            phone: None,
            company_name: Some(" ".into()),
            address: " Hyderabad ".into(),
        }
    }

    #[test]
    fn test_application_is_normalized() {
        let app = application().check().unwrap();
        assert_eq!(app.email, "sales@acme.in");
        assert_eq!(app.name, "Asha Rao");
        assert_eq!(app.gst_number.as_deref(), Some("27AAPFU0939F1ZV"));
        assert_eq!(app.pan_number.as_deref(), Some("AAPFU0939F"));
    }

    #[test]
    fn test_application_reports_every_field() {
        let bad = SellerApplication {
            email: "not-an-email".into(),
            company_name: " ".into(),
            gst_number: Some("123".into()),
            pan_number: Some("1234567890".into()),
            ..application()
        };
        let errors = bad.check().unwrap_err();
        let fields: Vec<_> = errors.fields().collect();
        assert_eq!(fields, vec!["company_name", "email", "gst_number", "pan_number"]);
    }

    #[test]
    fn test_new_seller_is_pending_with_credential() {
        let (user, profile, event) = application().check().unwrap().into_account(Some("seller_docs/gst.pdf".into()), Utc::now());
        assert_eq!(user.role, Role::Seller);
        assert!(!user.is_staff);
        assert_eq!(profile.user_id, user.id);
        assert!(!profile.is_approved);
        let credential = profile.temp_credential.clone().unwrap();
        assert_eq!(credential.len(), TEMP_CREDENTIAL_LEN);
        assert!(credential.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(matches!(event, DomainEvent::Account(AccountEvent::SellerRegistered { seller_id, .. }) if seller_id == user.id));
    }

    #[test]
    fn test_signup_code_verifies_once_issued() {
        let now = Utc::now();
        let (mut pending, event) = PendingSignup::start(signup(), now);
        assert_eq!(pending.company_name, None);
        assert_eq!(pending.address, "Hyderabad");
        let code = match event {
            DomainEvent::Account(AccountEvent::SignupOtpIssued { otp, email, .. }) => {
                assert_eq!(email, "lab@uni.ac.in");
                otp
            }
            other => panic!("unexpected event {other:?}"),
        };
        assert_eq!(code.as_str(), pending.otp);
        assert_eq!(pending.verify(&format!(" {} ", code.as_str()), now), SignupCheck::Verified);

        let (user, profile) = pending.into_account(now);
        assert_eq!(user.role, Role::Buyer);
        assert_eq!(profile.user_id, user.id);
    }

    #[test]
    fn test_wrong_codes_run_out() {
        let now = Utc::now();
        let (mut pending, _) = PendingSignup::start(signup(), now);
        let wrong = if pending.otp == "000000" { "111111" } else { "000000" };
        for left in (1..SIGNUP_OTP_MAX_ATTEMPTS).rev() {
            assert_eq!(pending.verify(wrong, now), SignupCheck::Rejected { attempts_left: left });
        }
        assert_eq!(pending.verify(wrong, now), SignupCheck::Expired);
        let right = pending.otp.clone();
        assert_eq!(pending.verify(&right, now), SignupCheck::Expired);
    }

    #[test]
    fn test_stale_code_is_expired() {
        let now = Utc::now();
        let (mut pending, _) = PendingSignup::start(signup(), now);
        let code = pending.otp.clone();
        let later = now + Duration::minutes(SIGNUP_OTP_TTL_MINUTES);
        assert_eq!(pending.verify(&code, later), SignupCheck::Expired);
        assert!(!format!("{pending:?}").contains(&code));
    }

    fn seller_profile() -> Profile {
        Profile {
            id: Uuid::now_v7(),
            email: "s@acme.in".into(),
            name: "Asha".into(),
            phone: None,
            role: Role::Seller,
            is_staff: false,
            company_name: Some("Acme".into()),
            address: Some("Pune".into()),
            gst_number: None,
            pan_number: None,
            is_approved: Some(true),
        }
    }

    #[test]
    fn test_profile_update_touches_given_fields_only() {
        let mut p = seller_profile();
        let update = ProfileUpdate { phone: Some(" 98765 ".into()), address: Some(" Mumbai ".into()), ..Default::default() };
        update.apply(&mut p).unwrap();
        assert_eq!(p.phone.as_deref(), Some("98765"));
        assert_eq!(p.address.as_deref(), Some("Mumbai"));
        assert_eq!(p.name, "Asha");
        assert_eq!(p.company_name.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_seller_keeps_a_company_name() {
        let mut p = seller_profile();
        let update = ProfileUpdate { company_name: Some("  ".into()), name: Some(" ".into()), ..Default::default() };
        let errors = update.apply(&mut p).unwrap_err();
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["company_name", "name"]);

        let mut buyer = Profile { role: Role::Buyer, ..seller_profile() };
        ProfileUpdate { company_name: Some(" ".into()), ..Default::default() }.apply(&mut buyer).unwrap();
        assert_eq!(buyer.company_name, None);
    }
}
