//! Webhook header extraction.
//!
//! Authorization format:
//! `HMAC-SHA256 SignedHeaders=x-ms-date;host;x-ms-content-sha256&Signature=<base64>`

use axum::http::HeaderMap;
use serde::Deserialize;

use super::WebhookRejection;

/// Algorithm tag expected in the authorization header.
pub const SIGNATURE_ALGORITHM: &str = "HMAC-SHA256";

/// Header names used for the canonical signature. Case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WebhookHeaderNames {
    pub date: String,
    pub content_hash: String,
    pub host: String,
    pub authorization: String,
}

impl Default for WebhookHeaderNames {
    fn default() -> Self {
        Self {
            date: "x-ms-date".to_string(),
            content_hash: "x-ms-content-sha256".to_string(),
            host: "host".to_string(),
            authorization: "authorization".to_string(),
        }
    }
}

impl WebhookHeaderNames {
    /// The `SignedHeaders` value a correctly signed request carries.
    pub fn signed_headers(&self) -> String {
        format!(
            "{};{};{}",
            self.date.to_ascii_lowercase(),
            self.host.to_ascii_lowercase(),
            self.content_hash.to_ascii_lowercase()
        )
    }
}

/// Parsed authorization header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationHeader {
    pub algorithm: String,
    pub signed_headers: String,
    /// Base64 signature exactly as received.
    pub signature: String,
}

impl AuthorizationHeader {
    /// Parses `<ALGO> SignedHeaders=<names>&Signature=<base64>`.
    pub fn parse(value: &str) -> Result<Self, WebhookRejection> {
        let (algorithm, params) = value
            .trim()
            .split_once(' ')
            .ok_or_else(|| bad_authorization("missing algorithm tag"))?;

        let mut signed_headers = None;
        let mut signature = None;
        for part in params.trim().split('&') {
            // Signature is base64, so it may itself contain '='
            let (key, val) = part
                .split_once('=')
                .ok_or_else(|| bad_authorization("expected key=value pairs"))?;
            match key.trim() {
                "SignedHeaders" => signed_headers = Some(val.trim().to_string()),
                "Signature" => signature = Some(val.trim().to_string()),
                _ => {}
            }
        }

        let signed_headers = signed_headers
            .filter(|s| !s.is_empty())
            .ok_or_else(|| bad_authorization("missing SignedHeaders"))?;
        let signature = signature
            .filter(|s| !s.is_empty())
            .ok_or_else(|| bad_authorization("missing Signature"))?;

        Ok(Self {
            algorithm: algorithm.trim().to_string(),
            signed_headers,
            signature,
        })
    }
}

/// The headers one webhook delivery must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookHeaders {
    pub date: String,
    pub content_hash: String,
    pub host: String,
    pub authorization: AuthorizationHeader,
}

impl WebhookHeaders {
    /// Extracts all required headers.
    ///
    /// # Errors
    ///
    /// `MissingHeaders` naming every absent header, or describing a
    /// malformed authorization header.
    pub fn extract(headers: &HeaderMap, names: &WebhookHeaderNames) -> Result<Self, WebhookRejection> {
        let date = header_value(headers, &names.date);
        let content_hash = header_value(headers, &names.content_hash);
        let host = header_value(headers, &names.host);
        let authorization = header_value(headers, &names.authorization);

        match (date, content_hash, host, authorization) {
            (Some(date), Some(content_hash), Some(host), Some(authorization)) => Ok(Self {
                date,
                content_hash,
                host,
                authorization: AuthorizationHeader::parse(&authorization)?,
            }),
            (date, content_hash, host, authorization) => {
                let missing: Vec<&str> = [
                    (date.is_none(), names.date.as_str()),
                    (content_hash.is_none(), names.content_hash.as_str()),
                    (host.is_none(), names.host.as_str()),
                    (authorization.is_none(), names.authorization.as_str()),
                ]
                .into_iter()
                .filter(|(absent, _)| *absent)
                .map(|(_, name)| name)
                .collect();
                Err(WebhookRejection::MissingHeaders(missing.join(", ")))
            }
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn bad_authorization(reason: &str) -> WebhookRejection {
    WebhookRejection::MissingHeaders(format!("authorization header unusable: {}", reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn full_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-ms-date", HeaderValue::from_static("Mon, 01 Jan 2024 00:00:00 GMT"));
        headers.insert("x-ms-content-sha256", HeaderValue::from_static("abc="));
        headers.insert("host", HeaderValue::from_static("merchant.example"));
        headers.insert(
            "authorization",
            HeaderValue::from_static(
                "HMAC-SHA256 SignedHeaders=x-ms-date;host;x-ms-content-sha256&Signature=c2ln==",
            ),
        );
        headers
    }

    #[test]
    fn extracts_all_headers() {
        let parsed = WebhookHeaders::extract(&full_headers(), &WebhookHeaderNames::default()).unwrap();
        assert_eq!(parsed.date, "Mon, 01 Jan 2024 00:00:00 GMT");
        assert_eq!(parsed.host, "merchant.example");
        assert_eq!(parsed.authorization.algorithm, SIGNATURE_ALGORITHM);
        assert_eq!(parsed.authorization.signed_headers, "x-ms-date;host;x-ms-content-sha256");
        assert_eq!(parsed.authorization.signature, "c2ln==");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let names = WebhookHeaderNames {
            date: "X-MS-Date".to_string(),
            ..WebhookHeaderNames::default()
        };
        assert!(WebhookHeaders::extract(&full_headers(), &names).is_ok());
    }

    #[test]
    fn lists_every_missing_header() {
        let mut headers = full_headers();
        headers.remove("x-ms-date");
        headers.remove("host");
        let err = WebhookHeaders::extract(&headers, &WebhookHeaderNames::default()).unwrap_err();
        assert_eq!(
            err,
            WebhookRejection::MissingHeaders("x-ms-date, host".to_string())
        );
    }

    #[test]
    fn authorization_without_signature_is_missing_headers() {
        let err = AuthorizationHeader::parse("HMAC-SHA256 SignedHeaders=x-ms-date;host").unwrap_err();
        assert!(matches!(err, WebhookRejection::MissingHeaders(_)));
    }

    #[test]
    fn authorization_without_algorithm_is_missing_headers() {
        let err = AuthorizationHeader::parse("SignedHeaders=a&Signature=b").unwrap_err();
        assert!(matches!(err, WebhookRejection::MissingHeaders(_)));
    }

    #[test]
    fn signed_headers_follow_configured_names() {
        assert_eq!(
            WebhookHeaderNames::default().signed_headers(),
            "x-ms-date;host;x-ms-content-sha256"
        );
    }
}
