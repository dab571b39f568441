use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use shepherd_core::{ChurchId, UserId};

use crate::claims::{IdentityClaims, TokenValidationError, validate_claims};
use crate::Role;

/// Name of the cookie carrying the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

const BEARER_PREFIX: &str = "Bearer ";

/// Why a caller could not be authenticated.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationFailed {
    #[error("missing access token")]
    Missing,

    #[error("malformed access token")]
    Malformed,

    #[error("access token expired")]
    Expired,

    #[error("access token signature invalid")]
    SignatureInvalid,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("unknown identity")]
    UnknownIdentity,

    #[error("token church does not match account church")]
    TenantMismatch,
}

impl AuthenticationFailed {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Malformed => "malformed",
            Self::Expired => "expired",
            Self::SignatureInvalid => "signature_invalid",
            Self::InvalidCredentials => "invalid_credentials",
            Self::UnknownIdentity => "unknown_identity",
            Self::TenantMismatch => "tenant_mismatch",
        }
    }
}

/// Locate the raw token in request metadata.
///
/// `cookie_headers` are the raw values of every `Cookie` header. When a cookie
/// named [`ACCESS_TOKEN_COOKIE`] is present its value is returned as-is and the
/// `Authorization` header is never looked at.
pub fn extract_token<'a>(
    cookie_headers: impl IntoIterator<Item = &'a str>,
    authorization: Option<&'a str>,
) -> Result<&'a str, AuthenticationFailed> {
    for header in cookie_headers {
        for pair in header.split(';') {
            match pair.split_once('=') {
                Some((name, value)) if name.trim() == ACCESS_TOKEN_COOKIE => {
                    return Ok(value.trim());
                }
                _ => {}
            }
        }
    }

    let token = authorization
        .and_then(|h| h.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .ok_or(AuthenticationFailed::Missing)?;

    if token.is_empty() {
        return Err(AuthenticationFailed::Missing);
    }
    Ok(token)
}

/// Whether a raw `Cookie` header value names [`ACCESS_TOKEN_COOKIE`].
///
/// Works on bytes so a header that is not valid UTF-8 can still be checked;
/// such a header must not be skipped in favour of the `Authorization` header.
pub fn cookie_header_names_token(raw: &[u8]) -> bool {
    raw.split(|b| *b == b';').any(|pair| {
        let name = pair.split(|b| *b == b'=').next().unwrap_or_default();
        name.trim_ascii() == ACCESS_TOKEN_COOKIE.as_bytes()
    })
}

/// Turns a raw token into verified identity claims.
pub trait TokenDecoder: Send + Sync {
    fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<IdentityClaims, AuthenticationFailed>;
}

impl<T: TokenDecoder + ?Sized> TokenDecoder for std::sync::Arc<T> {
    fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<IdentityClaims, AuthenticationFailed> {
        (**self).decode(token, now)
    }
}

/// HS256 JWT codec with a shared secret.
#[derive(Clone)]
pub struct Hs256TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl core::fmt::Debug for Hs256TokenCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256TokenCodec").finish_non_exhaustive()
    }
}

impl Hs256TokenCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();

        // Time window is checked by `validate_claims` against the caller's clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign a fresh token for `user_id`.
    pub fn issue(
        &self,
        user_id: UserId,
        church_id: Option<ChurchId>,
        role: Role,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(String, IdentityClaims), AuthenticationFailed> {
        let claims = IdentityClaims::new(user_id, church_id, role, now, ttl);
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| {
                tracing::error!(error = %err, "failed to sign access token");
                AuthenticationFailed::Malformed
            })?;
        Ok((token, claims))
    }
}

impl TokenDecoder for Hs256TokenCodec {
    fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<IdentityClaims, AuthenticationFailed> {
        let data = jsonwebtoken::decode::<IdentityClaims>(token, &self.decoding, &self.validation)
            .map_err(|err| match err.kind() {
                ErrorKind::InvalidSignature => AuthenticationFailed::SignatureInvalid,
                ErrorKind::ExpiredSignature => AuthenticationFailed::Expired,
                _ => AuthenticationFailed::Malformed,
            })?;

        validate_claims(&data.claims, now).map_err(|err| match err {
            TokenValidationError::Expired => AuthenticationFailed::Expired,
            TokenValidationError::NotYetValid | TokenValidationError::InvalidTimeWindow => {
                AuthenticationFailed::Malformed
            }
        })?;

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn cookie_wins_over_header() {
        let token = extract_token(
            ["theme=dark; access_token=from-cookie"],
            Some("Bearer from-header"),
        )
        .unwrap();
        assert_eq!(token, "from-cookie");
    }

    #[test]
    fn cookie_present_means_header_is_ignored_even_if_cookie_empty() {
        let token = extract_token(["access_token="], Some("Bearer from-header")).unwrap();
        assert_eq!(token, "");
    }

    #[test]
    fn header_used_when_no_cookie() {
        let token = extract_token(["theme=dark"], Some("Bearer abc.def.ghi")).unwrap();
        assert_eq!(token, "abc.def.ghi");
    }

    #[test]
    fn token_cookie_is_found_in_raw_bytes() {
        assert!(cookie_header_names_token(b"theme=dark; access_token=\xff\xfe"));
        assert!(cookie_header_names_token(b" access_token =x"));
        assert!(!cookie_header_names_token(b"theme=\xff; access_tokens=x"));
        assert!(!cookie_header_names_token(b""));
    }

    #[test]
    fn missing_sources() {
        assert_eq!(extract_token([], None), Err(AuthenticationFailed::Missing));
        assert_eq!(extract_token([], Some("Basic Zm9vOmJhcg==")), Err(AuthenticationFailed::Missing));
        assert_eq!(extract_token([], Some("Bearer   ")), Err(AuthenticationFailed::Missing));
    }

    #[test]
    fn issue_then_decode() {
        let codec = Hs256TokenCodec::new("test-secret");
        let (token, issued) = codec
            .issue(UserId::new(5), Some(ChurchId::new(12)), Role::PASTOR, now(), Duration::minutes(15))
            .unwrap();

        let decoded = codec.decode(&token, now() + Duration::minutes(1)).unwrap();
        assert_eq!(decoded, issued);
    }

    #[test]
    fn expired_token() {
        let codec = Hs256TokenCodec::new("test-secret");
        let (token, _) = codec
            .issue(UserId::new(5), Some(ChurchId::new(12)), Role::PASTOR, now(), Duration::minutes(15))
            .unwrap();
        assert_eq!(
            codec.decode(&token, now() + Duration::minutes(15)),
            Err(AuthenticationFailed::Expired)
        );
    }

    #[test]
    fn wrong_secret_is_signature_invalid() {
        let (token, _) = Hs256TokenCodec::new("secret-a")
            .issue(UserId::new(5), None, Role::SUPERADMIN, now(), Duration::minutes(15))
            .unwrap();
        assert_eq!(
            Hs256TokenCodec::new("secret-b").decode(&token, now()),
            Err(AuthenticationFailed::SignatureInvalid)
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = Hs256TokenCodec::new("test-secret");
        assert_eq!(codec.decode("not-a-jwt", now()), Err(AuthenticationFailed::Malformed));
    }
}
