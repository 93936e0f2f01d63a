//! Request authentication.
//!
//! Two independent mechanisms, each an axum extractor:
//!
//! - [`TriggerKey`]: the shared secret (`x-api-key`) guarding the batch trigger, meant for cron
//!   jobs and schedulers outside this process
//! - [`CurrentUser`]: the user id forwarded by the authenticating proxy in front of this service
//!   (header name from `identity.user_header`)

use crate::AppState;
use crate::errors::{Error, Result};
use crate::types::UserId;
use axum::{extract::FromRequestParts, http::request::Parts};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Proof that the request carried the configured trigger key.
#[derive(Debug, Clone, Copy)]
pub struct TriggerKey;

/// Compare via fixed-length digests so the comparison time does not depend on where the
/// supplied key first differs.
fn keys_match(expected: &str, supplied: &str) -> bool {
    let expected = Sha256::digest(expected.as_bytes());
    let supplied = Sha256::digest(supplied.as_bytes());
    expected
        .iter()
        .zip(supplied.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

impl FromRequestParts<AppState> for TriggerKey {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let Some(expected) = state.config.trigger.api_key.as_deref() else {
            debug!("Trigger rejected: no api key configured");
            return Err(Error::Unauthenticated {
                message: Some("Invalid API key".to_string()),
            });
        };

        let supplied = parts.headers.get(API_KEY_HEADER).and_then(|h| h.to_str().ok());
        match supplied {
            Some(supplied) if keys_match(expected, supplied) => Ok(TriggerKey),
            _ => Err(Error::Unauthenticated {
                message: Some("Invalid API key".to_string()),
            }),
        }
    }
}

/// The authenticated user making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let header = &state.config.identity.user_header;
        let value = parts
            .headers
            .get(header.as_str())
            .and_then(|h| h.to_str().ok())
            .ok_or(Error::Unauthenticated { message: None })?;

        let id = value.trim().parse::<UserId>().map_err(|_| Error::Unauthenticated {
            message: Some(format!("Invalid {header} header")),
        })?;

        Ok(CurrentUser { id })
    }
}
