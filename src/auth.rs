//! Bearer-token identity.
//!
//! Tokens are issued by the account service; this crate only verifies them
//! and resolves the caller's role once, at the edge.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    #[serde(default)]
    pub staff: bool,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize,
}

/// The authenticated caller. Staff act with back-office rights regardless of
/// their marketplace role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Actor {
    Buyer(Uuid),
    Seller(Uuid),
    Staff(Uuid),
}

impl Actor {
    pub fn from_claims(claims: &Claims) -> Self {
        match (claims.staff, claims.role) {
            (true, _) => Actor::Staff(claims.sub),
            (false, Role::Buyer) => Actor::Buyer(claims.sub),
            (false, Role::Seller) => Actor::Seller(claims.sub),
        }
    }

    pub fn user_id(&self) -> Uuid {
        match *self {
            Actor::Buyer(id) | Actor::Seller(id) | Actor::Staff(id) => id,
        }
    }

    pub fn is_staff(&self) -> bool { matches!(self, Actor::Staff(_)) }

    pub fn buyer(&self) -> Result<Uuid, ApiError> {
        match *self {
            Actor::Buyer(id) => Ok(id),
            _ => Err(ApiError::Forbidden("Only buyers can perform this action".into())),
        }
    }

    pub fn seller(&self) -> Result<Uuid, ApiError> {
        match *self {
            Actor::Seller(id) => Ok(id),
            _ => Err(ApiError::Forbidden("Only sellers can perform this action".into())),
        }
    }

    pub fn staff(&self) -> Result<Uuid, ApiError> {
        match *self {
            Actor::Staff(id) => Ok(id),
            _ => Err(ApiError::Forbidden("Staff access required".into())),
        }
    }
}

#[derive(Clone)]
pub struct AuthKeys {
    decoding: Arc<DecodingKey>,
    encoding: Arc<EncodingKey>,
}

impl AuthKeys {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            decoding: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            encoding: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|_| ApiError::Unauthenticated("Invalid or expired token".into()))
    }

    /// Signs claims with the shared secret. Used by tooling and tests.
    pub fn sign(&self, claims: &Claims) -> Result<String, ApiError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(|e| ApiError::Internal(e.to_string()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    AuthKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::Unauthenticated("Authentication credentials were not provided".into()))?;
        let claims = AuthKeys::from_ref(state).verify(token.trim())?;
        Ok(Actor::from_claims(&claims))
    }
}
