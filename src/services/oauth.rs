// src/services/oauth.rs

//! OAuth 1.0a request signing (RFC 5849, HMAC-SHA1).
//!
//! The posting service authenticates requests with an
//! `Authorization: OAuth` header carrying an HMAC-SHA1 signature over
//! the method, URL, and request parameters. Only the pieces the
//! watcher needs are implemented: single-request signing with the
//! consumer and access token pair.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved characters stay literal; everything else is encoded.
const STRICT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Consumer and access token pair for one posting account.
#[derive(Debug, Clone)]
pub struct OauthCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl OauthCredentials {
    /// Build the `Authorization` header for one request.
    ///
    /// `request_params` must hold every query and form parameter the
    /// request will carry; multipart bodies contribute none.
    pub fn authorization_header(
        &self,
        method: &str,
        url: &str,
        request_params: &[(&str, &str)],
        nonce: &str,
        timestamp: i64,
    ) -> String {
        let timestamp = timestamp.to_string();
        let oauth_params = [
            ("oauth_consumer_key", self.api_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", self.access_token.as_str()),
            ("oauth_version", "1.0"),
        ];

        let all_params: Vec<(&str, &str)> = oauth_params
            .iter()
            .chain(request_params.iter())
            .copied()
            .collect();
        let signature = self.sign(&signature_base(method, url, &all_params));

        let mut header_params: Vec<(&str, &str)> = oauth_params.to_vec();
        header_params.push(("oauth_signature", signature.as_str()));
        header_params.sort();

        let fields: Vec<String> = header_params
            .iter()
            .map(|(key, value)| format!("{key}=\"{}\"", percent_encode(value)))
            .collect();
        format!("OAuth {}", fields.join(", "))
    }

    fn sign(&self, base: &str) -> String {
        let key = format!(
            "{}&{}",
            percent_encode(&self.api_secret),
            percent_encode(&self.access_token_secret)
        );
        // HMAC accepts keys of any length.
        let mut mac = HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC key");
        mac.update(base.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }
}

/// Signature base string: method, URL, and the sorted encoded parameters.
fn signature_base(method: &str, url: &str, params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(key, value)| (percent_encode(key), percent_encode(value)))
        .collect();
    encoded.sort();
    let param_string: String = encoded
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(url),
        percent_encode(&param_string)
    )
}

/// Percent-encode with the RFC 3986 unreserved set.
pub fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, STRICT_ENCODE_SET).to_string()
}

/// Random nonce for one request.
pub fn nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Worked example from the posting service's signing documentation.
    fn doc_credentials() -> OauthCredentials {
        OauthCredentials {
            api_key: "xvz1evFS4wEEPTGEFPHBog".to_string(),
            api_secret: "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw".to_string(),
            access_token: "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb".to_string(),
            access_token_secret: "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE".to_string(),
        }
    }

    const DOC_NONCE: &str = "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg";
    const DOC_TIMESTAMP: i64 = 1318622958;
    const DOC_URL: &str = "https://api.twitter.com/1.1/statuses/update.json";

    fn doc_params() -> Vec<(&'static str, &'static str)> {
        vec![
            ("include_entities", "true"),
            (
                "status",
                "Hello Ladies + Gentlemen, a signed OAuth request!",
            ),
        ]
    }

    #[test]
    fn test_percent_encode_unreserved_untouched() {
        assert_eq!(percent_encode("abc-XYZ_0.9~"), "abc-XYZ_0.9~");
    }

    #[test]
    fn test_percent_encode_reserved_characters() {
        assert_eq!(
            percent_encode("Ladies + Gentlemen"),
            "Ladies%20%2B%20Gentlemen"
        );
        assert_eq!(percent_encode("An encoded string!"), "An%20encoded%20string%21");
        assert_eq!(percent_encode("Dogs, Cats & Mice"), "Dogs%2C%20Cats%20%26%20Mice");
    }

    #[test]
    fn test_signature_base_matches_documented_example() {
        let credentials = doc_credentials();
        let timestamp = DOC_TIMESTAMP.to_string();
        let mut params = doc_params();
        params.extend([
            ("oauth_consumer_key", credentials.api_key.as_str()),
            ("oauth_nonce", DOC_NONCE),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", credentials.access_token.as_str()),
            ("oauth_version", "1.0"),
        ]);

        let base = signature_base("post", DOC_URL, &params);
        assert_eq!(
            base,
            "POST&https%3A%2F%2Fapi.twitter.com%2F1.1%2Fstatuses%2Fupdate.json&\
             include_entities%3Dtrue%26\
             oauth_consumer_key%3Dxvz1evFS4wEEPTGEFPHBog%26\
             oauth_nonce%3DkYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg%26\
             oauth_signature_method%3DHMAC-SHA1%26\
             oauth_timestamp%3D1318622958%26\
             oauth_token%3D370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb%26\
             oauth_version%3D1.0%26\
             status%3DHello%2520Ladies%2520%252B%2520Gentlemen%252C%2520a%2520signed%2520OAuth%2520request%2521"
        );
    }

    #[test]
    fn test_signature_matches_documented_example() {
        let credentials = doc_credentials();
        let header = credentials.authorization_header(
            "POST",
            DOC_URL,
            &doc_params(),
            DOC_NONCE,
            DOC_TIMESTAMP,
        );
        assert!(
            header.contains("oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\""),
            "header was: {header}"
        );
    }

    #[test]
    fn test_authorization_header_shape() {
        let header = doc_credentials().authorization_header(
            "POST",
            DOC_URL,
            &doc_params(),
            DOC_NONCE,
            DOC_TIMESTAMP,
        );
        assert!(header.starts_with("OAuth "));
        for field in [
            "oauth_consumer_key",
            "oauth_nonce",
            "oauth_signature",
            "oauth_signature_method=\"HMAC-SHA1\"",
            "oauth_timestamp=\"1318622958\"",
            "oauth_token",
            "oauth_version=\"1.0\"",
        ] {
            assert!(header.contains(field), "missing {field} in {header}");
        }
        // Request parameters are signed but never placed in the header.
        assert!(!header.contains("status="));
        assert!(!header.contains("include_entities"));
    }
}
