//! Expiry extraction from bearer tokens
//!
//! Only understands the three-segment `header.payload.signature` shape and
//! only looks for the `"exp":` field. Anything else yields `None`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const EXPIRY_MARKER: &str = "\"exp\":";

/// Absolute expiry (Unix seconds) embedded in `token`, if it can be found.
pub fn parse_expiry(token: &str) -> Option<i64> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        tracing::debug!("Token has {} segments, no expiry claim", segments.len());
        return None;
    }

    let payload = decode_segment(segments[1])?;
    let start = payload.find(EXPIRY_MARKER)? + EXPIRY_MARKER.len();
    let rest = &payload[start..];
    let end = rest.find([',', '}']).unwrap_or(rest.len());

    match rest[..end].trim().parse::<i64>() {
        Ok(exp) => Some(exp),
        Err(_) => {
            tracing::debug!("Expiry claim is not an integer: {:?}", &rest[..end]);
            None
        }
    }
}

/// base64url segment to text: restore the standard alphabet and padding.
fn decode_segment(segment: &str) -> Option<String> {
    let mut standard: String = segment
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while standard.len() % 4 != 0 {
        standard.push('=');
    }

    let bytes = match STANDARD.decode(standard.as_bytes()) {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!("Token payload is not base64: {}", e);
            return None;
        }
    };
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn jwt_with_payload(payload: &str) -> String {
        format!(
            "{}.{}.signature",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn test_parses_exp() {
        let token = jwt_with_payload(r#"{"sub":"42","exp":1700000000,"iat":1699990000}"#);
        assert_eq!(parse_expiry(&token), Some(1700000000));
    }

    #[test]
    fn test_exp_last_field_and_whitespace() {
        let token = jwt_with_payload(r#"{"sub":"42","exp": 1700000000 }"#);
        assert_eq!(parse_expiry(&token), Some(1700000000));
    }

    #[test]
    fn test_exp_at_end_of_text() {
        let token = jwt_with_payload(r#""exp":1700000000"#);
        assert_eq!(parse_expiry(&token), Some(1700000000));
    }

    #[test]
    fn test_url_safe_alphabet_is_restored() {
        // '>>>' and '???' encode to base64 containing '+' and '/', i.e. '-' and '_' in url form.
        let token = jwt_with_payload(r#"{"n":">>>???","exp":1800000000}"#);
        assert!(token.contains('-') || token.contains('_'));
        assert_eq!(parse_expiry(&token), Some(1800000000));
    }

    #[test]
    fn test_wrong_segment_count() {
        assert_eq!(parse_expiry("A.B"), None);
        assert_eq!(parse_expiry("opaque-token"), None);
        assert_eq!(parse_expiry("a.b.c.d"), None);
    }

    #[test]
    fn test_missing_marker() {
        let token = jwt_with_payload(r#"{"sub":"42"}"#);
        assert_eq!(parse_expiry(&token), None);
    }

    #[test]
    fn test_non_numeric_exp() {
        let token = jwt_with_payload(r#"{"exp":"soon"}"#);
        assert_eq!(parse_expiry(&token), None);
    }

    #[test]
    fn test_garbage_payload() {
        assert_eq!(parse_expiry("A.B.C"), None);
        assert_eq!(parse_expiry("x.!!!!.y"), None);
        // Valid base64 that is not UTF-8.
        let token = format!("h.{}.s", URL_SAFE_NO_PAD.encode([0xff, 0xfe, 0xfd]));
        assert_eq!(parse_expiry(&token), None);
    }
}
