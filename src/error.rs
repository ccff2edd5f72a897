//! Error taxonomy shared by every endpoint.

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// Field name to messages, rendered as `{"errors": {...}}`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self { Self::default() }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Merges `other` with every key prefixed, e.g. `items[2].quantity`.
    pub fn absorb(&mut self, prefix: &str, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(format!("{prefix}.{field}")).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn get(&self, field: &str) -> Option<&[String]> { self.0.get(field).map(Vec::as_slice) }
    pub fn fields(&self) -> impl Iterator<Item = &str> { self.0.keys().map(String::as_str) }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = FieldErrors::new();
        flatten_validation(None, &errors, &mut out);
        out
    }
}

fn flatten_validation(prefix: Option<&str>, errors: &ValidationErrors, out: &mut FieldErrors) {
    for (field, kind) in errors.errors() {
        let key = match prefix {
            Some(p) => format!("{p}.{field}"),
            None => field.to_string(),
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                for e in list {
                    let message = e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string());
                    out.add(key.clone(), message);
                }
            }
            ValidationErrorsKind::Struct(inner) => flatten_validation(Some(&key), inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    flatten_validation(Some(&format!("{key}[{index}]")), inner, out);
                }
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(FieldErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid OTP")]
    InvalidOtp,

    #[error("external service failure: {0}")]
    External(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(what: &str) -> Self { Self::NotFound(format!("{what} not found")) }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) | Self::Conflict(_) | Self::InvalidOtp => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::External(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => ApiError::NotFound("Not found".into()),
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                ApiError::Conflict("A record with these values already exists".into())
            }
            _ => ApiError::Database(e),
        }
    }
}

impl From<FieldErrors> for ApiError {
    fn from(e: FieldErrors) -> Self { ApiError::Validation(e) }
}

impl From<ValidationErrors> for ApiError {
    fn from(e: ValidationErrors) -> Self { ApiError::Validation(e.into()) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = match &self {
            Self::Validation(errors) => json!({ "errors": errors }),
            Self::InvalidOtp => json!({ "error": "Invalid OTP" }),
            Self::Database(_) | Self::Internal(_) => json!({ "detail": "Internal server error" }),
            other => json!({ "detail": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

/// JSON body that is deserialized and then checked with `validator`.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct Line {
        #[validate(range(min = 1, message = "quantity must be at least 1"))]
        quantity: i32,
    }

    #[derive(Debug, Deserialize, Validate)]
    struct Payload {
        #[validate(length(min = 1))]
        address: String,
        #[validate]
        items: Vec<Line>,
    }

    #[test]
    fn flattens_nested_list_errors() {
        let p = Payload { address: String::new(), items: vec![Line { quantity: 1 }, Line { quantity: 0 }] };
        let errors: FieldErrors = p.validate().unwrap_err().into();
        assert_eq!(errors.get("address"), Some(&["length".to_string()][..]));
        assert_eq!(errors.get("items[1].quantity"), Some(&["quantity must be at least 1".to_string()][..]));
        assert!(errors.get("items[0].quantity").is_none());
    }

    #[test]
    fn absorb_prefixes_keys() {
        let mut all = FieldErrors::new();
        all.absorb("items[0]", FieldErrors::single("variant_id", "bad"));
        assert_eq!(all.fields().collect::<Vec<_>>(), vec!["items[0].variant_id"]);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::InvalidOtp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(sqlx::Error::RowNotFound).status(), StatusCode::NOT_FOUND);
    }
}
