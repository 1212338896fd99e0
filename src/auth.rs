//! Bearer-token authentication and role checks.
//!
//! Tokens are HS256 JWTs carrying the user id (`sub`), the owning company and
//! the user's role. Every request re-reads the account: the user must still
//! exist, be active and belong to the company named in the token, and the
//! stored role wins over the one in the claims.

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::api::AppState;
use crate::error::ApiError;
use crate::models::{Role, UserAccount, UserStatus};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub company_id: i64,
    pub role: Role,
    pub exp: i64,
}

impl Claims {
    /// Claims are always taken from the stored account, never from caller input.
    pub fn for_account(account: &UserAccount, expires_at: i64) -> Self {
        Self {
            sub: account.id,
            company_id: account.company_id,
            role: account.role,
            exp: expires_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub company_id: i64,
    pub role: Role,
}

impl Identity {
    pub fn ensure_report_access(&self) -> Result<(), ApiError> {
        if self.role.may_view_reports() {
            Ok(())
        } else {
            warn!(user_id = self.user_id, role = self.role.as_str(), "report access denied");
            Err(ApiError::Forbidden(
                "Acceso denegado. Se requiere uno de los siguientes roles: admin, analyst."
                    .to_string(),
            ))
        }
    }

    pub fn ensure_admin(&self) -> Result<(), ApiError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            warn!(user_id = self.user_id, role = self.role.as_str(), "admin action denied");
            Err(ApiError::Forbidden(
                "Acceso denegado. Se requiere el rol de 'admin'.".to_string(),
            ))
        }
    }

    pub fn ensure_survey_authoring(&self) -> Result<(), ApiError> {
        if self.role.may_author_surveys() {
            Ok(())
        } else {
            warn!(user_id = self.user_id, role = self.role.as_str(), "survey authoring denied");
            Err(ApiError::Forbidden(
                "Acceso denegado. Se requiere el rol de 'creator'.".to_string(),
            ))
        }
    }
}

fn mac(secret: &[u8]) -> Result<HmacSha256, ApiError> {
    HmacSha256::new_from_slice(secret)
        .map_err(|err| ApiError::Internal(format!("invalid signing key: {err}")))
}

pub fn sign_token(claims: &Claims, secret: &[u8]) -> Result<String, ApiError> {
    let payload = serde_json::to_vec(claims)
        .map_err(|err| ApiError::Internal(format!("failed to encode claims: {err}")))?;
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(TOKEN_HEADER),
        URL_SAFE_NO_PAD.encode(payload)
    );

    let mut signer = mac(secret)?;
    signer.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(signer.finalize().into_bytes());

    Ok(format!("{signing_input}.{signature}"))
}

/// Checks signature and expiry; `now` is seconds since the epoch.
pub fn verify_token(token: &str, secret: &[u8], now: i64) -> Result<Claims, ApiError> {
    let invalid = || ApiError::Unauthorized("Token inválido".to_string());

    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;
    let mut verifier = mac(secret)?;
    verifier.update(header.as_bytes());
    verifier.update(b".");
    verifier.update(payload.as_bytes());
    verifier.verify_slice(&signature).map_err(|_| invalid())?;

    let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
    let claims: Claims = serde_json::from_slice(&payload).map_err(|_| invalid())?;

    if claims.exp <= now {
        return Err(ApiError::Unauthorized("Token expirado".to_string()));
    }

    Ok(claims)
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::Unauthorized("Se requiere autenticación".to_string()))?;

        let claims = verify_token(token, state.jwt_secret.as_bytes(), Utc::now().timestamp())?;

        let account = state
            .store
            .user_account(claims.sub)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Usuario no encontrado".to_string()))?;

        if account.status == UserStatus::Inactive {
            return Err(ApiError::Forbidden("Su cuenta ha sido desactivada".to_string()));
        }
        if account.company_id != claims.company_id {
            warn!(
                user_id = account.id,
                token_company = claims.company_id,
                stored_company = account.company_id,
                "token company does not match account"
            );
            return Err(ApiError::Unauthorized("Token inválido".to_string()));
        }

        debug!(user_id = account.id, company_id = account.company_id, "authenticated request");
        Ok(Identity {
            user_id: account.id,
            company_id: account.company_id,
            role: account.role,
        })
    }
}
