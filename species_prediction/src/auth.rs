use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub const API_KEY_HEADER: &str = "x-api-key";

type KeyDigest = [u8; 32];

/// Shared secret checked against the `X-API-Key` header.
///
/// Both sides are hashed before comparing so the comparison runs over a fixed
/// length and never short-circuits.
#[derive(Clone)]
pub struct ApiKey {
    digest: Option<KeyDigest>,
}

fn digest(value: &[u8]) -> KeyDigest {
    Sha256::digest(value).into()
}

impl ApiKey {
    pub fn new(secret: &str) -> Self {
        Self {
            digest: (!secret.is_empty()).then(|| digest(secret.as_bytes())),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.digest.is_some()
    }

    pub fn verify(&self, provided: Option<&[u8]>) -> bool {
        match (self.digest.as_ref(), provided) {
            (Some(expected), Some(provided)) if !provided.is_empty() => {
                expected.as_slice().ct_eq(digest(provided).as_slice()).into()
            }
            _ => false,
        }
    }
}

pub async fn require_api_key(
    State(api_key): State<Arc<ApiKey>>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .map(|value| value.as_bytes());

    if !api_key.verify(provided) {
        tracing::warn!(
            "Rejected request to {} with {} API key",
            request.uri().path(),
            if provided.is_some() { "invalid" } else { "missing" }
        );
        return ApiError::Unauthorized.into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_matching_key() {
        let api_key = ApiKey::new("butterflies");

        assert!(api_key.verify(Some(b"butterflies")));
        assert!(!api_key.verify(Some(b"butterflie")));
        assert!(!api_key.verify(Some(b"butterfliez")));
        assert!(!api_key.verify(Some(b"moths")));
    }

    #[test]
    fn test_missing_or_empty_values_never_match() {
        let api_key = ApiKey::new("butterflies");
        assert!(!api_key.verify(None));
        assert!(!api_key.verify(Some(b"")));

        let unset = ApiKey::new("");
        assert!(!unset.is_configured());
        assert!(!unset.verify(None));
        assert!(!unset.verify(Some(b"")));
        assert!(!unset.verify(Some(b"anything")));
    }
}
