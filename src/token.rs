use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::AuthSecret;

pub const SESSION_COOKIE_NAME: &str = "raf_session";
pub const SESSION_TTL_DAYS: i64 = 30;
pub const SESSION_TTL_MS: i64 = SESSION_TTL_DAYS * 24 * 60 * 60 * 1000;
const DELIMITER: char = '.';
const ROLE_SUPER: &str = "super";
const ROLE_SCHOOL: &str = "escuela";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Super,
    School,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Super => ROLE_SUPER,
            Role::School => ROLE_SCHOOL,
        }
    }
}

/// Who a verified token speaks for. A school session always carries its scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Super,
    School { cct: String },
}

impl Session {
    pub fn role(&self) -> Role {
        match self {
            Session::Super => Role::Super,
            Session::School { .. } => Role::School,
        }
    }

    pub fn scope(&self) -> Option<&str> {
        match self {
            Session::Super => None,
            Session::School { cct } => Some(cct),
        }
    }
}

/// Every verification failure. Deliberately carries no detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid session token")]
pub struct InvalidToken;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    t: String,
    cct: Option<String>,
    exp: i64,
}

fn mac_for(secret: &AuthSecret) -> anyhow::Result<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid hmac key: {e}"))
}

fn sign(encoded: &str, secret: &AuthSecret) -> anyhow::Result<String> {
    let mut mac = mac_for(secret)?;
    mac.update(encoded.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn issue_token(session: &Session, secret: &AuthSecret) -> anyhow::Result<String> {
    issue_token_at(session, secret, now_millis())
}

/// `base64url(json claims) + "." + base64url(hmac_sha256(secret, encoded claims))`,
/// valid for 30 days from `now_ms`.
pub fn issue_token_at(
    session: &Session,
    secret: &AuthSecret,
    now_ms: i64,
) -> anyhow::Result<String> {
    let claims = Claims {
        t: session.role().as_str().to_string(),
        cct: session.scope().map(str::to_string),
        exp: now_ms + SESSION_TTL_MS,
    };
    let payload = serde_json::to_vec(&claims)?;
    let encoded = URL_SAFE_NO_PAD.encode(payload);
    let sig = sign(&encoded, secret)?;
    Ok(format!("{encoded}{DELIMITER}{sig}"))
}

pub fn verify_token(token: &str, secret: &AuthSecret) -> Result<Session, InvalidToken> {
    verify_token_at(token, secret, now_millis())
}

pub fn verify_token_at(
    token: &str,
    secret: &AuthSecret,
    now_ms: i64,
) -> Result<Session, InvalidToken> {
    let parts: Vec<&str> = token.split(DELIMITER).collect();
    let [encoded, sig] = parts.as_slice() else {
        return Err(InvalidToken);
    };
    if encoded.is_empty() || sig.is_empty() {
        return Err(InvalidToken);
    }

    let expected = sign(encoded, secret).map_err(|_| InvalidToken)?;
    let sig_ok: bool = expected.as_bytes().ct_eq(sig.as_bytes()).into();
    if !sig_ok {
        return Err(InvalidToken);
    }

    let payload = URL_SAFE_NO_PAD.decode(encoded).map_err(|_| InvalidToken)?;
    let claims: Claims = serde_json::from_slice(&payload).map_err(|_| InvalidToken)?;
    if claims.exp < now_ms {
        return Err(InvalidToken);
    }
    match claims.t.as_str() {
        ROLE_SUPER => Ok(Session::Super),
        ROLE_SCHOOL => match claims.cct.map(|c| c.trim().to_string()) {
            Some(cct) if !cct.is_empty() => Ok(Session::School { cct }),
            _ => Err(InvalidToken),
        },
        _ => Err(InvalidToken),
    }
}

/// Pulls the session cookie value out of a `Cookie:` header, or passes a bare
/// token through unchanged.
pub fn token_from_cookie_header(header: &str) -> Option<&str> {
    let header = header.trim();
    if header.is_empty() {
        return None;
    }
    if !header.contains('=') {
        return Some(header);
    }
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.trim())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000_000;

    fn secret() -> AuthSecret {
        AuthSecret::new("unit-test-secret-0123456789").expect("secret")
    }

    fn school() -> Session {
        Session::School {
            cct: "26DES0001X".to_string(),
        }
    }

    fn forge(claims: &str, secret: &AuthSecret) -> String {
        let encoded = URL_SAFE_NO_PAD.encode(claims.as_bytes());
        format!("{}.{}", encoded, sign(&encoded, secret).expect("sign"))
    }

    #[test]
    fn round_trip_preserves_role_and_scope() {
        for session in [Session::Super, school()] {
            let token = issue_token_at(&session, &secret(), NOW).expect("issue");
            assert_eq!(token.matches('.').count(), 1);
            let back = verify_token_at(&token, &secret(), NOW + 1000).expect("verify");
            assert_eq!(back, session);
            assert_eq!(back.scope(), session.scope());
        }
    }

    #[test]
    fn token_expires_after_thirty_days() {
        let token = issue_token_at(&school(), &secret(), NOW).expect("issue");
        assert!(verify_token_at(&token, &secret(), NOW + SESSION_TTL_MS).is_ok());
        assert_eq!(
            verify_token_at(&token, &secret(), NOW + SESSION_TTL_MS + 1),
            Err(InvalidToken)
        );
    }

    #[test]
    fn flipping_any_signature_char_invalidates() {
        let token = issue_token_at(&Session::Super, &secret(), NOW).expect("issue");
        let (encoded, sig) = token.split_once('.').expect("delimiter");
        for i in 0..sig.len() {
            let mut chars: Vec<char> = sig.chars().collect();
            chars[i] = if chars[i] == 'A' { 'B' } else { 'A' };
            let tampered = format!("{}.{}", encoded, chars.into_iter().collect::<String>());
            assert_eq!(
                verify_token_at(&tampered, &secret(), NOW),
                Err(InvalidToken),
                "signature char {i}"
            );
        }
    }

    #[test]
    fn tampered_payload_or_other_secret_is_rejected() {
        let token = issue_token_at(&school(), &secret(), NOW).expect("issue");
        let (_, sig) = token.split_once('.').expect("delimiter");
        let other_payload = URL_SAFE_NO_PAD.encode(br#"{"t":"super","cct":null,"exp":9999999999999}"#);
        assert_eq!(
            verify_token_at(&format!("{other_payload}.{sig}"), &secret(), NOW),
            Err(InvalidToken)
        );
        let other = AuthSecret::new("another-secret-0123456789").expect("secret");
        assert_eq!(verify_token_at(&token, &other, NOW), Err(InvalidToken));
    }

    #[test]
    fn prefix_of_signature_is_not_enough() {
        let token = issue_token_at(&Session::Super, &secret(), NOW).expect("issue");
        let truncated = &token[..token.len() - 1];
        assert_eq!(verify_token_at(truncated, &secret(), NOW), Err(InvalidToken));
        let extended = format!("{token}A");
        assert_eq!(verify_token_at(&extended, &secret(), NOW), Err(InvalidToken));
    }

    #[test]
    fn token_must_match_byte_for_byte() {
        let token = issue_token_at(&Session::Super, &secret(), NOW).expect("issue");
        for padded in [format!(" {token}"), format!("{token}\n"), format!("{token} ")] {
            assert_eq!(verify_token_at(&padded, &secret(), NOW), Err(InvalidToken));
        }
        let header = format!("raf_session= {token} ");
        let extracted = token_from_cookie_header(&header).expect("cookie");
        assert_eq!(verify_token_at(extracted, &secret(), NOW), Ok(Session::Super));
    }

    #[test]
    fn malformed_shapes_are_rejected() {
        for bad in ["", ".", "abc", "abc.", ".abc", "a.b.c", "%%%.%%%"] {
            assert_eq!(verify_token_at(bad, &secret(), NOW), Err(InvalidToken), "{bad}");
        }
    }

    #[test]
    fn correctly_signed_but_invalid_claims_are_rejected() {
        let s = secret();
        let exp = NOW + 1000;
        let cases = [
            format!(r#"{{"t":"admin","cct":null,"exp":{exp}}}"#),
            format!(r#"{{"t":"escuela","cct":null,"exp":{exp}}}"#),
            format!(r#"{{"t":"escuela","cct":"  ","exp":{exp}}}"#),
            r#"{"t":"super","cct":null}"#.to_string(),
            "not json".to_string(),
        ];
        for claims in cases {
            assert_eq!(
                verify_token_at(&forge(&claims, &s), &s, NOW),
                Err(InvalidToken),
                "{claims}"
            );
        }
        let ok = forge(&format!(r#"{{"t":"super","cct":"ignored","exp":{exp}}}"#), &s);
        assert_eq!(verify_token_at(&ok, &s, NOW), Ok(Session::Super));
    }

    #[test]
    fn cookie_header_extraction() {
        assert_eq!(
            token_from_cookie_header("theme=dark; raf_session=abc.def; x=1"),
            Some("abc.def")
        );
        assert_eq!(token_from_cookie_header("abc.def"), Some("abc.def"));
        assert_eq!(token_from_cookie_header("theme=dark"), None);
        assert_eq!(token_from_cookie_header("raf_session="), None);
        assert_eq!(token_from_cookie_header("  "), None);
    }
}
