//! OAuth1 request signing (HMAC-SHA1) for the Garmin token endpoints.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use sha1::Sha1;
use url::Url;

use crate::error::{LedgerError, Result};

/// Everything except unreserved characters (RFC 5849 section 3.6).
const ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// OAuth1 consumer credentials, in the shape the public consumer
/// endpoint serves them.
#[derive(Debug, Clone, Deserialize)]
pub struct Consumer {
    #[serde(rename = "consumer_key")]
    pub key: String,
    #[serde(rename = "consumer_secret")]
    pub secret: String,
}

/// Token half of the signing key, present once the user holds OAuth1
/// credentials.
#[derive(Debug, Clone, Copy)]
pub struct TokenSecrets<'a> {
    pub token: &'a str,
    pub secret: &'a str,
}

/// Build the `Authorization: OAuth …` header for a request.
///
/// Query parameters embedded in `url` and the `form` body parameters both
/// participate in the signature (RFC 5849 section 3.4.1.3).
pub fn authorization_header(
    consumer: &Consumer,
    token: Option<TokenSecrets<'_>>,
    method: &str,
    url: &str,
    form: &[(String, String)],
) -> Result<String> {
    let timestamp = Utc::now().timestamp().to_string();
    signed_header(consumer, token, method, url, form, &timestamp, &generate_nonce())
}

fn signed_header(
    consumer: &Consumer,
    token: Option<TokenSecrets<'_>>,
    method: &str,
    url: &str,
    form: &[(String, String)],
    timestamp: &str,
    nonce: &str,
) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|e| LedgerError::auth(format!("Invalid OAuth request URL {}: {}", url, e)))?;
    let base_url = format!(
        "{}://{}{}",
        parsed.scheme(),
        parsed.host_str().unwrap_or(""),
        parsed.path()
    );

    let mut oauth_params: BTreeMap<String, String> = BTreeMap::new();
    oauth_params.insert("oauth_consumer_key".to_string(), consumer.key.clone());
    oauth_params.insert("oauth_nonce".to_string(), nonce.to_string());
    oauth_params.insert("oauth_signature_method".to_string(), "HMAC-SHA1".to_string());
    oauth_params.insert("oauth_timestamp".to_string(), timestamp.to_string());
    oauth_params.insert("oauth_version".to_string(), "1.0".to_string());
    if let Some(t) = token {
        oauth_params.insert("oauth_token".to_string(), t.token.to_string());
    }

    // All parameters (URL query + form + oauth) sorted by key form the base string.
    let mut all_params = oauth_params.clone();
    for (k, v) in parsed.query_pairs() {
        all_params.insert(k.to_string(), v.to_string());
    }
    for (k, v) in form {
        all_params.insert(k.clone(), v.clone());
    }

    let param_string = all_params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let base_string = format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(&base_url),
        percent_encode(&param_string)
    );

    let token_secret = token.map(|t| t.secret).unwrap_or("");
    let signing_key = format!(
        "{}&{}",
        percent_encode(&consumer.secret),
        percent_encode(token_secret)
    );

    let mut mac = Hmac::<Sha1>::new_from_slice(signing_key.as_bytes())
        .expect("HMAC accepts keys of any size");
    mac.update(base_string.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());
    oauth_params.insert("oauth_signature".to_string(), signature);

    let header_params = oauth_params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, percent_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!("OAuth {}", header_params))
}

fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, ENCODE_SET).to_string()
}

fn generate_nonce() -> String {
    let n: u128 = rand::Rng::gen(&mut rand::thread_rng());
    format!("{:032x}", n)
}

/// Parse a URL-encoded `key=value&…` response body.
pub fn parse_urlencoded_body(body: &str) -> BTreeMap<String, String> {
    body.split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            match (parts.next(), parts.next()) {
                (Some(key), Some(value)) => Some((
                    urlencoding::decode(key).unwrap_or_default().into_owned(),
                    urlencoding::decode(value).unwrap_or_default().into_owned(),
                )),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_consumer() -> Consumer {
        Consumer {
            key: "test_consumer_key".to_string(),
            secret: "test_consumer_secret".to_string(),
        }
    }

    #[test]
    fn test_consumer_deserializes_from_wire_shape() {
        let json = r#"{"consumer_key":"abc","consumer_secret":"xyz"}"#;
        let consumer: Consumer = serde_json::from_str(json).unwrap();
        assert_eq!(consumer.key, "abc");
        assert_eq!(consumer.secret, "xyz");
    }

    #[test]
    fn test_header_contains_oauth_fields() {
        let header = signed_header(
            &test_consumer(),
            None,
            "GET",
            "https://example.com/api/test",
            &[],
            "1234567890",
            "abc123nonce",
        )
        .unwrap();

        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_consumer_key=\"test_consumer_key\""));
        assert!(header.contains("oauth_signature_method=\"HMAC-SHA1\""));
        assert!(header.contains("oauth_timestamp=\"1234567890\""));
        assert!(header.contains("oauth_nonce=\"abc123nonce\""));
        assert!(header.contains("oauth_version=\"1.0\""));
        assert!(header.contains("oauth_signature="));
    }

    #[test]
    fn test_header_includes_token_when_present() {
        let header = signed_header(
            &test_consumer(),
            Some(TokenSecrets {
                token: "user_token",
                secret: "user_secret",
            }),
            "GET",
            "https://example.com/api",
            &[],
            "1234567890",
            "nonce123",
        )
        .unwrap();

        assert!(header.contains("oauth_token=\"user_token\""));
    }

    #[test]
    fn test_rejects_invalid_url() {
        let result = signed_header(
            &test_consumer(),
            None,
            "GET",
            "not a url",
            &[],
            "1234567890",
            "nonce123",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_percent_encode_unreserved_untouched() {
        assert_eq!(percent_encode("abc-DEF_1.2~3"), "abc-DEF_1.2~3");
        assert_eq!(percent_encode("hello world"), "hello%20world");
        assert_eq!(percent_encode("foo=bar&baz"), "foo%3Dbar%26baz");
        // Sub-delims are not unreserved and must be encoded.
        assert_eq!(percent_encode("a!b*c"), "a%21b%2Ac");
    }

    #[test]
    fn test_known_signature_vector() {
        // OAuth Core 1.0 appendix A.5 example request.
        let consumer = Consumer {
            key: "dpf43f3p2l4k3l03".to_string(),
            secret: "kd94hf93k423kf44".to_string(),
        };
        let header = signed_header(
            &consumer,
            Some(TokenSecrets {
                token: "nnch734d00sl2jdk",
                secret: "pfkkdhi9sl3r4s00",
            }),
            "GET",
            "http://photos.example.net/photos?file=vacation.jpg&size=original",
            &[],
            "1191242096",
            "kllo9940pd9333jh",
        )
        .unwrap();

        assert!(
            header.contains("oauth_signature=\"tR3%2BTy81lMeYAr%2FFid0kMTYa%2FWM%3D\""),
            "unexpected signature in header: {}",
            header
        );
    }

    #[test]
    fn test_form_params_change_signature() {
        let consumer = test_consumer();
        let without = signed_header(
            &consumer,
            None,
            "POST",
            "https://example.com/exchange",
            &[],
            "1234567890",
            "nonce123",
        )
        .unwrap();
        let with = signed_header(
            &consumer,
            None,
            "POST",
            "https://example.com/exchange",
            &[("mfa_token".to_string(), "mfa456".to_string())],
            "1234567890",
            "nonce123",
        )
        .unwrap();

        assert_ne!(without, with);
    }

    #[test]
    fn test_nonce_is_random_hex() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_urlencoded_body() {
        let body = "oauth_token=abc123&oauth_token_secret=xyz789&mfa_token=mfa456";
        let parsed = parse_urlencoded_body(body);

        assert_eq!(parsed.get("oauth_token"), Some(&"abc123".to_string()));
        assert_eq!(parsed.get("oauth_token_secret"), Some(&"xyz789".to_string()));
        assert_eq!(parsed.get("mfa_token"), Some(&"mfa456".to_string()));
    }

    #[test]
    fn test_parse_urlencoded_body_decodes_values() {
        let parsed = parse_urlencoded_body("key=value%20with%20spaces&other=normal");
        assert_eq!(parsed.get("key"), Some(&"value with spaces".to_string()));
        assert_eq!(parsed.get("other"), Some(&"normal".to_string()));
    }
}
