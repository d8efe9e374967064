//! # Signed Requests
//!
//! A caller proves who it is by signing the request with the key behind
//! its `did:key`. The signed message is
//!
//! ```text
//! API_REQUEST_TAG || canonical_json({ scope, signer, timestamp, payload })
//! ```
//!
//! `scope` names the operation and the resource it targets (for example
//! `"POST /waybills/wb-1/events"`), so a signature collected for one call
//! does not authenticate another. Requests outside the
//! [`MAX_REQUEST_AGE`] / [`MAX_CLOCK_SKEW`] window are refused.
//!
//! What the signer is allowed to do is decided elsewhere; this module only
//! establishes the DID.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::did::{did_to_public_key, DidError};
use crate::config::{API_REQUEST_TAG, MAX_CLOCK_SKEW, MAX_REQUEST_AGE};
use crate::crypto::keys::{VeyKeypair, VeySignature};
use crate::crypto::signatures::{sign_canonical, verify_canonical, SignatureError};
use crate::identity::VeyDid;

#[derive(Debug, Error)]
pub enum RequestAuthError {
    #[error("signer is not a valid DID: {0}")]
    Signer(#[from] DidError),

    #[error("request signature invalid")]
    BadSignature,

    #[error("request expired")]
    Expired,

    #[error("request timestamp in the future")]
    FromTheFuture,

    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
}

/// A payload together with the DID that vouches for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedRequest<T> {
    pub payload: T,
    pub signer: String,
    pub timestamp: DateTime<Utc>,
    pub signature: VeySignature,
}

#[derive(Serialize)]
struct SignedBody<'a, T> {
    scope: &'a str,
    signer: &'a str,
    timestamp: &'a DateTime<Utc>,
    payload: &'a T,
}

impl<T: Serialize> SignedRequest<T> {
    /// Sign `payload` for `scope` as the `did:key` of `keypair`.
    pub fn sign(
        keypair: &VeyKeypair,
        scope: &str,
        payload: T,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, RequestAuthError> {
        let signer = VeyDid::from_public_key(&keypair.public_key()).to_did_string();
        let body = SignedBody {
            scope,
            signer: &signer,
            timestamp: &timestamp,
            payload: &payload,
        };
        let signature = sign_canonical(keypair, API_REQUEST_TAG, &body).map_err(canonical)?;
        Ok(Self {
            payload,
            signer,
            timestamp,
            signature,
        })
    }

    /// Check the timestamp window and the signature for `scope`. On
    /// success the caller may treat `self.signer` as authenticated.
    pub fn verify(&self, scope: &str, now: DateTime<Utc>) -> Result<(), RequestAuthError> {
        let max_age = Duration::from_std(MAX_REQUEST_AGE).unwrap_or_else(|_| Duration::minutes(5));
        let skew = Duration::from_std(MAX_CLOCK_SKEW).unwrap_or_else(|_| Duration::seconds(30));
        if now - self.timestamp > max_age {
            return Err(RequestAuthError::Expired);
        }
        if self.timestamp - now > skew {
            return Err(RequestAuthError::FromTheFuture);
        }

        let public_key = did_to_public_key(&self.signer)?;
        let body = SignedBody {
            scope,
            signer: &self.signer,
            timestamp: &self.timestamp,
            payload: &self.payload,
        };
        verify_canonical(&public_key, API_REQUEST_TAG, &body, &self.signature).map_err(|e| {
            match e {
                SignatureError::VerificationFailed => RequestAuthError::BadSignature,
                SignatureError::Canonicalization(msg) => RequestAuthError::Canonicalization(msg),
            }
        })
    }
}

fn canonical(e: SignatureError) -> RequestAuthError {
    RequestAuthError::Canonicalization(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Ping {
        pid: String,
    }

    fn ping() -> Ping {
        Ping { pid: "vey1example".into() }
    }

    #[test]
    fn signed_request_verifies_for_its_scope() {
        let kp = VeyKeypair::generate();
        let now = Utc::now();
        let req = SignedRequest::sign(&kp, "POST /resolve", ping(), now).unwrap();
        assert!(req.signer.starts_with("did:key:z"));
        req.verify("POST /resolve", now).unwrap();
    }

    #[test]
    fn other_scope_is_refused() {
        let kp = VeyKeypair::generate();
        let now = Utc::now();
        let req = SignedRequest::sign(&kp, "POST /resolve", ping(), now).unwrap();
        assert!(matches!(
            req.verify("POST /revocations", now),
            Err(RequestAuthError::BadSignature)
        ));
    }

    #[test]
    fn swapped_signer_is_refused() {
        let kp = VeyKeypair::generate();
        let other = VeyKeypair::generate();
        let now = Utc::now();
        let mut req = SignedRequest::sign(&kp, "POST /resolve", ping(), now).unwrap();
        req.signer = VeyDid::from_public_key(&other.public_key()).to_did_string();
        assert!(matches!(
            req.verify("POST /resolve", now),
            Err(RequestAuthError::BadSignature)
        ));
    }

    #[test]
    fn edited_payload_is_refused() {
        let kp = VeyKeypair::generate();
        let now = Utc::now();
        let mut req = SignedRequest::sign(&kp, "POST /resolve", ping(), now).unwrap();
        req.payload.pid = "vey1other".into();
        assert!(req.verify("POST /resolve", now).is_err());
    }

    #[test]
    fn timestamp_window() {
        let kp = VeyKeypair::generate();
        let now = Utc::now();
        let old = SignedRequest::sign(&kp, "s", ping(), now - Duration::minutes(6)).unwrap();
        assert!(matches!(old.verify("s", now), Err(RequestAuthError::Expired)));
        let ahead = SignedRequest::sign(&kp, "s", ping(), now + Duration::minutes(2)).unwrap();
        assert!(matches!(ahead.verify("s", now), Err(RequestAuthError::FromTheFuture)));
        let slight = SignedRequest::sign(&kp, "s", ping(), now + Duration::seconds(10)).unwrap();
        slight.verify("s", now).unwrap();
    }

    #[test]
    fn malformed_signer_is_refused() {
        let kp = VeyKeypair::generate();
        let now = Utc::now();
        let mut req = SignedRequest::sign(&kp, "s", ping(), now).unwrap();
        req.signer = "did:web:carrier.example".into();
        assert!(matches!(req.verify("s", now), Err(RequestAuthError::Signer(_))));
    }
}
