//! Webhook content hash and HMAC-SHA256 signature verification.
//!
//! The canonical string is the date, host and content-hash header values,
//! in that order, joined by `\n`. It is signed with the per-transaction
//! secret issued by the provider when the webhook was registered.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::domain::foundation::Timestamp;

use super::{WebhookHeaderNames, WebhookHeaders, WebhookRejection, SIGNATURE_ALGORITHM};

/// Default freshness window for the date header (5 minutes).
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Base64 SHA-256 of the raw body.
pub fn content_hash(body: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(body))
}

/// Builds the signing input.
pub fn canonical_string(date: &str, host: &str, content_hash: &str) -> String {
    format!("{}\n{}\n{}", date, host, content_hash)
}

/// Base64 HMAC-SHA256 of `canonical` keyed with `secret`.
pub fn sign(secret: &[u8], canonical: &str) -> Result<String, InvalidLength> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)?;
    mac.update(canonical.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Step 3: the content-hash header must equal the recomputed body hash.
pub fn verify_content_hash(body: &[u8], header_value: &str) -> Result<(), WebhookRejection> {
    if constant_time_compare(content_hash(body).as_bytes(), header_value.as_bytes()) {
        Ok(())
    } else {
        Err(WebhookRejection::ContentHashMismatch)
    }
}

/// Step 4: the date header must lie within `tolerance_secs` of `now`.
///
/// Future-dated headers are rejected with the same window.
pub fn verify_freshness(
    date_header: &str,
    now: Timestamp,
    tolerance_secs: i64,
) -> Result<Timestamp, WebhookRejection> {
    let sent_at = Timestamp::parse_http_date(date_header).ok_or_else(|| {
        WebhookRejection::StaleOrFutureTimestamp(format!("unparseable date '{}'", date_header))
    })?;
    // Milliseconds, so a fractional second past the window still counts.
    let skew_ms = now.duration_since(&sent_at).num_milliseconds();
    if skew_ms.unsigned_abs() > tolerance_secs.unsigned_abs().saturating_mul(1000) {
        let direction = if skew_ms > 0 { "old" } else { "in the future" };
        return Err(WebhookRejection::StaleOrFutureTimestamp(format!(
            "{:.3}s {}, tolerance {}s",
            skew_ms.unsigned_abs() as f64 / 1000.0,
            direction,
            tolerance_secs
        )));
    }
    Ok(sent_at)
}

/// Step 5: the signature must match the canonical headers under `secret`.
pub fn verify_signature(
    secret: &[u8],
    headers: &WebhookHeaders,
    names: &WebhookHeaderNames,
) -> Result<(), WebhookRejection> {
    let auth = &headers.authorization;
    if !auth.algorithm.eq_ignore_ascii_case(SIGNATURE_ALGORITHM)
        || !auth.signed_headers.eq_ignore_ascii_case(&names.signed_headers())
    {
        return Err(WebhookRejection::InvalidSignature);
    }

    let expected = sign(
        secret,
        &canonical_string(&headers.date, &headers.host, &headers.content_hash),
    )
    .map_err(|_| WebhookRejection::InvalidSignature)?;
    if constant_time_compare(expected.as_bytes(), auth.signature.as_bytes()) {
        Ok(())
    } else {
        Err(WebhookRejection::InvalidSignature)
    }
}

/// Constant-time comparison of two byte slices.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Produces the headers of a correctly signed delivery.
///
/// Used by the provider mock and tests; the gateway itself only verifies.
#[derive(Debug, Clone)]
pub struct WebhookSigner {
    secret: Vec<u8>,
    names: WebhookHeaderNames,
}

impl WebhookSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            names: WebhookHeaderNames::default(),
        }
    }

    /// Returns `(header name, value)` pairs for `body` sent to `host` at `date`.
    pub fn sign_request(
        &self,
        body: &[u8],
        host: &str,
        date: Timestamp,
    ) -> Result<Vec<(String, String)>, InvalidLength> {
        let date = date.to_rfc2822();
        let hash = content_hash(body);
        let signature = sign(&self.secret, &canonical_string(&date, host, &hash))?;
        Ok(vec![
            (self.names.date.clone(), date),
            (self.names.content_hash.clone(), hash),
            (self.names.host.clone(), host.to_string()),
            (
                self.names.authorization.clone(),
                format!(
                    "{} SignedHeaders={}&Signature={}",
                    SIGNATURE_ALGORITHM,
                    self.names.signed_headers(),
                    signature
                ),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::webhook::AuthorizationHeader;
    use proptest::prelude::*;

    const SECRET: &[u8] = b"provider-issued-secret";
    const BODY: &[u8] = br#"{"reference":"ORDER-1","name":"AUTHORIZED","amount":{"currency":"NOK","value":10000}}"#;
    const HOST: &str = "merchant.example";

    fn signed(body: &[u8], date: &str) -> WebhookHeaders {
        let hash = content_hash(body);
        let signature = sign(SECRET, &canonical_string(date, HOST, &hash)).unwrap();
        WebhookHeaders {
            date: date.to_string(),
            content_hash: hash,
            host: HOST.to_string(),
            authorization: AuthorizationHeader {
                algorithm: SIGNATURE_ALGORITHM.to_string(),
                signed_headers: WebhookHeaderNames::default().signed_headers(),
                signature,
            },
        }
    }

    fn flip(s: &str, index: usize) -> String {
        let mut bytes = s.as_bytes().to_vec();
        bytes[index] ^= 0x01;
        String::from_utf8(bytes).unwrap()
    }

    // ══════════════════════════════════════════════════════════════
    // Content Hash
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn content_hash_is_base64_sha256() {
        // sha256("") = e3b0c442...
        assert_eq!(content_hash(b""), "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=");
    }

    #[test]
    fn content_hash_detects_modified_body() {
        let hash = content_hash(BODY);
        assert!(verify_content_hash(BODY, &hash).is_ok());
        assert_eq!(
            verify_content_hash(b"{}", &hash),
            Err(WebhookRejection::ContentHashMismatch)
        );
    }

    // ══════════════════════════════════════════════════════════════
    // Freshness
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn fresh_date_is_accepted() {
        let now = Timestamp::now();
        let date = now.minus_secs(30).to_rfc2822();
        assert!(verify_freshness(&date, now, DEFAULT_TOLERANCE_SECS).is_ok());
    }

    #[test]
    fn stale_date_is_rejected() {
        let now = Timestamp::now();
        let date = now.minus_secs(301).to_rfc2822();
        assert!(matches!(
            verify_freshness(&date, now, DEFAULT_TOLERANCE_SECS),
            Err(WebhookRejection::StaleOrFutureTimestamp(_))
        ));
    }

    #[test]
    fn future_date_is_rejected() {
        let now = Timestamp::now();
        let date = now.plus_secs(301).to_rfc2822();
        assert!(matches!(
            verify_freshness(&date, now, DEFAULT_TOLERANCE_SECS),
            Err(WebhookRejection::StaleOrFutureTimestamp(_))
        ));
    }

    #[test]
    fn future_date_past_window_by_a_fraction_is_rejected() {
        // The header carries whole seconds; `now` does not.
        let now = Timestamp::from_datetime(
            chrono::DateTime::from_timestamp_millis(1_700_000_000_700).unwrap(),
        );
        let date = Timestamp::from_unix_secs(1_700_000_301).unwrap().to_rfc2822();
        assert!(matches!(
            verify_freshness(&date, now, DEFAULT_TOLERANCE_SECS),
            Err(WebhookRejection::StaleOrFutureTimestamp(_))
        ));

        let inside = Timestamp::from_unix_secs(1_700_000_300).unwrap().to_rfc2822();
        assert!(verify_freshness(&inside, now, DEFAULT_TOLERANCE_SECS).is_ok());
    }

    #[test]
    fn unparseable_date_is_rejected() {
        assert!(verify_freshness("last tuesday", Timestamp::now(), 300).is_err());
    }

    // ══════════════════════════════════════════════════════════════
    // Signature
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn canonical_string_is_newline_joined() {
        assert_eq!(canonical_string("d", "h", "c"), "d\nh\nc");
    }

    #[test]
    fn valid_signature_verifies() {
        let headers = signed(BODY, "Mon, 01 Jan 2024 00:00:00 +0000");
        assert!(verify_signature(SECRET, &headers, &WebhookHeaderNames::default()).is_ok());
    }

    #[test]
    fn wrong_secret_fails() {
        let headers = signed(BODY, "Mon, 01 Jan 2024 00:00:00 +0000");
        assert_eq!(
            verify_signature(b"another-secret", &headers, &WebhookHeaderNames::default()),
            Err(WebhookRejection::InvalidSignature)
        );
    }

    #[test]
    fn unexpected_algorithm_fails() {
        let mut headers = signed(BODY, "Mon, 01 Jan 2024 00:00:00 +0000");
        headers.authorization.algorithm = "HMAC-SHA1".to_string();
        assert_eq!(
            verify_signature(SECRET, &headers, &WebhookHeaderNames::default()),
            Err(WebhookRejection::InvalidSignature)
        );
    }

    #[test]
    fn reordered_signed_headers_fail() {
        let mut headers = signed(BODY, "Mon, 01 Jan 2024 00:00:00 +0000");
        headers.authorization.signed_headers = "host;x-ms-date;x-ms-content-sha256".to_string();
        assert!(verify_signature(SECRET, &headers, &WebhookHeaderNames::default()).is_err());
    }

    #[test]
    fn signer_output_verifies() {
        let signer = WebhookSigner::new(SECRET);
        let pairs = signer.sign_request(BODY, HOST, Timestamp::now()).unwrap();
        let auth = AuthorizationHeader::parse(&pairs[3].1).unwrap();
        let headers = WebhookHeaders {
            date: pairs[0].1.clone(),
            content_hash: pairs[1].1.clone(),
            host: pairs[2].1.clone(),
            authorization: auth,
        };
        assert!(verify_content_hash(BODY, &headers.content_hash).is_ok());
        assert!(verify_signature(SECRET, &headers, &WebhookHeaderNames::default()).is_ok());
    }

    proptest! {
        #[test]
        fn flipping_any_date_byte_breaks_the_signature(index in 0usize..31) {
            let date = "Mon, 01 Jan 2024 00:00:00 +0000";
            let headers = signed(BODY, date);
            let mut tampered = headers.clone();
            tampered.date = flip(date, index);
            prop_assert_eq!(
                verify_signature(SECRET, &tampered, &WebhookHeaderNames::default()),
                Err(WebhookRejection::InvalidSignature)
            );
        }

        #[test]
        fn flipping_any_signature_byte_breaks_the_signature(index in 0usize..44) {
            let mut headers = signed(BODY, "Mon, 01 Jan 2024 00:00:00 +0000");
            headers.authorization.signature = flip(&headers.authorization.signature, index);
            prop_assert_eq!(
                verify_signature(SECRET, &headers, &WebhookHeaderNames::default()),
                Err(WebhookRejection::InvalidSignature)
            );
        }

        #[test]
        fn flipping_any_body_byte_breaks_the_content_hash(index in 0usize..BODY.len()) {
            let headers = signed(BODY, "Mon, 01 Jan 2024 00:00:00 +0000");
            let mut body = BODY.to_vec();
            body[index] ^= 0x01;
            prop_assert_eq!(
                verify_content_hash(&body, &headers.content_hash),
                Err(WebhookRejection::ContentHashMismatch)
            );
        }
    }
}
