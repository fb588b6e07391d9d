//! Inbound webhook authentication.
//!
//! The storefront signs every webhook delivery with HMAC-SHA256 over the raw
//! request body, keyed by the app's shared secret, and sends the base64 digest
//! in the `X-Shopify-Hmac-Sha256` header. The digest must be computed over the
//! exact bytes received, before any JSON parsing.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-shopify-hmac-sha256";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("webhook signature header is missing")]
    MissingSignature,
    #[error("webhook signature does not match payload")]
    InvalidSignature,
    #[error("webhook shared secret is not configured")]
    SecretNotConfigured,
}

/// Returns the base64 HMAC-SHA256 digest of `raw_body` keyed by `shared_secret`.
pub fn sign(raw_body: &[u8], shared_secret: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(shared_secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(raw_body);
    STANDARD.encode(mac.finalize().into_bytes())
}

/// True iff `provided_signature` is the base64 HMAC-SHA256 of `raw_body`.
///
/// The signature is compared exactly as given; surrounding whitespace makes it a
/// different string and fails. Any malformed input (blank header, invalid base64,
/// wrong digest length, empty secret) verifies as false. The digest comparison is
/// constant time.
pub fn verify(raw_body: &[u8], provided_signature: &str, shared_secret: &[u8]) -> bool {
    if shared_secret.is_empty() {
        return false;
    }

    if provided_signature.is_empty() {
        return false;
    }

    let Ok(provided_digest) = STANDARD.decode(provided_signature) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(shared_secret) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&provided_digest).is_ok()
}

/// Verifier bound to the configured shared secret.
#[derive(Clone, Debug)]
pub struct WebhookVerifier {
    shared_secret: Option<SecretString>,
}

impl WebhookVerifier {
    pub fn new(shared_secret: Option<SecretString>) -> Self {
        Self { shared_secret }
    }

    pub fn verify(&self, raw_body: &[u8], header: Option<&str>) -> Result<(), WebhookError> {
        let secret = self
            .shared_secret
            .as_ref()
            .map(|secret| secret.expose_secret())
            .filter(|secret| !secret.is_empty())
            .ok_or(WebhookError::SecretNotConfigured)?;

        let signature = header
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(WebhookError::MissingSignature)?;

        if verify(raw_body, signature, secret.as_bytes()) {
            Ok(())
        } else {
            Err(WebhookError::InvalidSignature)
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{sign, verify, WebhookError, WebhookVerifier};

    const SECRET: &[u8] = b"hush";
    const BODY: &[u8] = br#"{"id":207119551,"first_name":"Bob","last_name":"Norman"}"#;

    #[test]
    fn sign_matches_known_vector() {
        // RFC 4231 test case 2
        assert_eq!(
            sign(b"what do ya want for nothing?", b"Jefe"),
            "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM="
        );
    }

    #[test]
    fn verify_accepts_matching_signature() {
        let signature = sign(BODY, SECRET);
        assert!(verify(BODY, &signature, SECRET));
    }

    #[test]
    fn verify_rejects_any_single_byte_body_mutation() {
        let signature = sign(BODY, SECRET);
        for index in 0..BODY.len() {
            let mut mutated = BODY.to_vec();
            mutated[index] ^= 0x01;
            assert!(!verify(&mutated, &signature, SECRET), "mutation at byte {index} verified");
        }
    }

    #[test]
    fn verify_rejects_any_single_byte_signature_mutation() {
        let signature = sign(BODY, SECRET);
        let bytes = signature.as_bytes();
        for index in 0..bytes.len() {
            let mut mutated = bytes.to_vec();
            mutated[index] = if mutated[index] == b'A' { b'B' } else { b'A' };
            let mutated = String::from_utf8(mutated).expect("ascii");
            if mutated == signature {
                continue;
            }
            assert!(!verify(BODY, &mutated, SECRET), "mutation at char {index} verified");
        }
    }

    #[test]
    fn verify_fails_closed_on_malformed_input() {
        let signature = sign(BODY, SECRET);
        assert!(!verify(BODY, "", SECRET));
        assert!(!verify(BODY, "   ", SECRET));
        assert!(!verify(BODY, "not base64 at all!", SECRET));
        assert!(!verify(BODY, "c2hvcnQ=", SECRET));
        assert!(!verify(BODY, &signature, b""));
        assert!(!verify(BODY, &signature, b"other-secret"));
    }

    #[test]
    fn verify_rejects_signature_with_surrounding_whitespace() {
        let signature = sign(b"{}", SECRET);
        assert!(verify(b"{}", &signature, SECRET));
        assert!(!verify(b"{}", &format!(" {signature}"), SECRET));
        assert!(!verify(b"{}", &format!("{signature}\t"), SECRET));
        assert!(!verify(b"{}", &format!(" {signature}\t"), SECRET));
    }

    #[test]
    fn verifier_trims_the_header_value_only() {
        let verifier = WebhookVerifier::new(Some(SecretString::from("hush")));
        let signature = sign(BODY, SECRET);

        assert_eq!(verifier.verify(BODY, Some(&format!("  {signature} "))), Ok(()));
    }

    #[test]
    fn verifier_reports_rejection_reason() {
        let verifier = WebhookVerifier::new(Some(SecretString::from("hush")));
        let signature = sign(BODY, SECRET);

        assert_eq!(verifier.verify(BODY, Some(&signature)), Ok(()));
        assert_eq!(verifier.verify(BODY, None), Err(WebhookError::MissingSignature));
        assert_eq!(verifier.verify(BODY, Some("")), Err(WebhookError::MissingSignature));
        assert_eq!(verifier.verify(BODY, Some("AAAA")), Err(WebhookError::InvalidSignature));
    }

    #[test]
    fn verifier_without_secret_rejects_everything() {
        let verifier = WebhookVerifier::new(None);
        let signature = sign(BODY, SECRET);

        assert_eq!(verifier.verify(BODY, Some(&signature)), Err(WebhookError::SecretNotConfigured));
    }
}
