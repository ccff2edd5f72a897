//! Registration and the signed-in user's own profile.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use validator::Validate;

use crate::api::{AppState, Form};
use crate::auth::Actor;
use crate::db;
use crate::domain::aggregates::account::{
    normalize_email, BuyerSignupRequest, PendingSignup, Profile, ProfileUpdate, SellerApplication, SignupCheck, User,
};
use crate::domain::aggregates::seller::SellerProfile;
use crate::error::{ApiError, FieldErrors, ValidJson};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register/seller", post(register_seller))
        .route("/register/buyer", post(register_buyer))
        .route("/register/buyer/verify", post(verify_buyer))
        .route("/profile", get(get_profile).put(update_profile))
}

fn email_in_use() -> ApiError { FieldErrors::single("email", "An account with this email already exists").into() }

fn application(form: &Form) -> SellerApplication {
    SellerApplication {
        name: form.text("name").unwrap_or_default(),
        email: form.text("email").unwrap_or_default(),
        phone: form.text("phone"),
        company_name: form.text("company_name").unwrap_or_default(),
        gst_number: form.text("gst_number"),
        pan_number: form.text("pan_number"),
        address: form.text("address").unwrap_or_default(),
    }
}

/// Multipart application with a verification `document`. The account waits
/// for staff approval; the temporary credential is mailed on approval.
async fn register_seller(State(s): State<AppState>, multipart: Multipart) -> Result<(StatusCode, Json<SellerProfile>), ApiError> {
    let mut form = Form::read(multipart).await?;
    let app = application(&form).check()?;
    let document = form.require_file("document")?;

    let mut tx = s.db.begin().await?;
    if db::users::email_taken(&mut *tx, &app.email).await? {
        return Err(email_in_use());
    }
    let stored = s.files.put("seller_docs", &document.file_name, &document.bytes).await?;
    let (user, profile, event) = app.into_account(Some(stored.path), Utc::now());
    db::users::insert(&mut *tx, &user).await?;
    db::sellers::insert(&mut *tx, &profile).await?;
    tx.commit().await?;

    info!(seller_id = %user.id, "seller registered, awaiting approval");
    s.notifier.dispatch(vec![event]).await;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// First step of buyer sign-up: stores the details and mails a code.
async fn register_buyer(
    State(s): State<AppState>,
    ValidJson(body): ValidJson<BuyerSignupRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (pending, event) = PendingSignup::start(body, Utc::now());
    let mut conn = s.db.acquire().await?;
    if db::users::email_taken(&mut *conn, &pending.email).await? {
        return Err(email_in_use());
    }
    db::registrations::upsert(&mut *conn, &pending).await?;

    info!(email = %pending.email, "buyer sign-up code issued");
    s.notifier.dispatch(vec![event]).await;
    Ok((StatusCode::ACCEPTED, Json(json!({ "message": "OTP sent to email" }))))
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifySignup {
    #[validate(email(message = "enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, max = 12, message = "otp is required"))]
    pub otp: String,
}

/// Second step: a matching code creates the buyer account. Failed attempts
/// are saved even though the request fails.
async fn verify_buyer(
    State(s): State<AppState>,
    ValidJson(body): ValidJson<VerifySignup>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let email = normalize_email(&body.email);
    let mut tx = s.db.begin().await?;
    let mut pending = db::registrations::lock(&mut *tx, &email)
        .await?
        .ok_or_else(|| ApiError::NotFound("No pending registration for this email".into()))?;

    match pending.verify(&body.otp, Utc::now()) {
        SignupCheck::Verified => {
            if db::users::email_taken(&mut *tx, &email).await? {
                return Err(email_in_use());
            }
            let (user, profile) = pending.into_account(Utc::now());
            db::users::insert(&mut *tx, &user).await?;
            db::users::insert_buyer_profile(&mut *tx, &profile).await?;
            db::registrations::delete(&mut *tx, &email).await?;
            tx.commit().await?;
            info!(buyer_id = %user.id, "buyer registered");
            Ok((StatusCode::CREATED, Json(user)))
        }
        SignupCheck::Rejected { attempts_left } => {
            db::registrations::save_attempts(&mut *tx, &pending).await?;
            tx.commit().await?;
            info!(%email, attempts_left, "sign-up code rejected");
            Err(ApiError::InvalidOtp)
        }
        SignupCheck::Expired => {
            db::registrations::delete(&mut *tx, &email).await?;
            tx.commit().await?;
            Err(ApiError::BadRequest("OTP has expired, please register again".into()))
        }
    }
}

async fn get_profile(State(s): State<AppState>, actor: Actor) -> Result<Json<Profile>, ApiError> {
    let mut conn = s.db.acquire().await?;
    let profile = db::users::profile(&mut *conn, actor.user_id()).await?.ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(profile))
}

async fn update_profile(
    State(s): State<AppState>,
    actor: Actor,
    ValidJson(body): ValidJson<ProfileUpdate>,
) -> Result<Json<Profile>, ApiError> {
    let mut tx = s.db.begin().await?;
    let mut profile = db::users::profile(&mut *tx, actor.user_id()).await?.ok_or_else(|| ApiError::not_found("User"))?;
    body.apply(&mut profile)?;
    db::users::save_profile(&mut *tx, &profile).await?;
    tx.commit().await?;
    Ok(Json(profile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_payload_validation() {
        let bad = VerifySignup { email: "nobody".into(), otp: String::new() };
        let errors: FieldErrors = bad.validate().unwrap_err().into();
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["email", "otp"]);
    }

    #[test]
    fn test_email_conflict_is_a_field_error() {
        assert!(matches!(email_in_use(), ApiError::Validation(e) if e.get("email").is_some()));
    }
}
