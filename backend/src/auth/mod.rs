use std::sync::Arc;

use anyhow::{Result, anyhow};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{axum_http::error_responses::ApiError, config::config_model::Auth};

/// Cookie the identity provider sets on same-site requests.
pub const SESSION_COOKIE: &str = "__session";

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
}

/// Signed-in user when a valid session is present.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn from_config(auth: &Auth) -> Result<Self> {
        match (&auth.jwt_public_key, &auth.jwt_secret) {
            (Some(pem), _) => Self::from_rsa_pem(pem, auth.issuer.as_deref()),
            (None, Some(secret)) => Ok(Self::from_secret(secret, auth.issuer.as_deref())),
            (None, None) => Err(anyhow!("no JWT verification key configured")),
        }
    }

    pub fn from_rsa_pem(pem: &str, issuer: Option<&str>) -> Result<Self> {
        let decoding_key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| anyhow!("invalid JWT public key: {}", e))?;
        Ok(Self::build(decoding_key, Algorithm::RS256, issuer))
    }

    pub fn from_secret(secret: &str, issuer: Option<&str>) -> Self {
        Self::build(
            DecodingKey::from_secret(secret.as_bytes()),
            Algorithm::HS256,
            issuer,
        )
    }

    fn build(decoding_key: DecodingKey, algorithm: Algorithm, issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_aud = false;
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }
        Self {
            decoding_key,
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthUser> {
        let token_data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| anyhow!("JWT validation failed: {}", e))?;

        let claims = token_data.claims;
        if claims.sub.trim().is_empty() {
            return Err(anyhow!("JWT has an empty subject"));
        }

        Ok(AuthUser {
            user_id: claims.sub,
            email: claims.email.filter(|email| !email.trim().is_empty()),
            email_verified: claims.email_verified.unwrap_or(false),
        })
    }
}

/// Bearer header first, then the session cookie.
fn session_token(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string);

    bearer.or_else(|| {
        CookieJar::from_headers(&parts.headers)
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty())
    })
}

fn verifier(parts: &Parts) -> Result<Arc<JwtVerifier>, ApiError> {
    parts
        .extensions
        .get::<Arc<JwtVerifier>>()
        .cloned()
        .ok_or_else(|| {
            error!("auth: JwtVerifier extension missing from router");
            ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
            )
        })
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let verifier = verifier(parts)?;
        let token = session_token(parts).ok_or_else(ApiError::unauthorized)?;

        verifier.verify(&token).map_err(|err| {
            debug!(error = %err, "auth: rejected session token");
            ApiError::unauthorized()
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let verifier = verifier(parts)?;
        let user = session_token(parts).and_then(|token| match verifier.verify(&token) {
            Ok(user) => Some(user),
            Err(err) => {
                debug!(error = %err, "auth: ignoring invalid session token");
                None
            }
        });
        Ok(MaybeAuthUser(user))
    }
}

#[cfg(test)]
mod tests;
