use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shepherd_core::{ChurchId, UserId};

use crate::Role;

/// Identity claims carried by an access token.
///
/// `church_id` is absent for platform operators. Timestamps are unix seconds
/// so the struct maps 1:1 onto the JWT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: UserId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub church_id: Option<ChurchId>,

    pub role: Role,

    pub iat: i64,

    pub exp: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

impl IdentityClaims {
    pub fn new(
        user_id: UserId,
        church_id: Option<ChurchId>,
        role: Role,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            sub: user_id,
            church_id,
            role,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.sub
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.iat, 0).single()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

/// Deterministically validate the token time window against `now`.
///
/// No leeway: a token is expired at exactly `exp`.
pub fn validate_claims(claims: &IdentityClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims_at(now: DateTime<Utc>) -> IdentityClaims {
        IdentityClaims::new(
            UserId::new(3),
            Some(ChurchId::new(12)),
            Role::PASTOR,
            now,
            Duration::minutes(15),
        )
    }

    #[test]
    fn window_boundaries() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let claims = claims_at(now);

        assert_eq!(validate_claims(&claims, now), Ok(()));
        assert_eq!(
            validate_claims(&claims, now - Duration::seconds(1)),
            Err(TokenValidationError::NotYetValid)
        );
        assert_eq!(
            validate_claims(&claims, now + Duration::minutes(15)),
            Err(TokenValidationError::Expired)
        );
    }

    #[test]
    fn inverted_window_is_rejected() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let mut claims = claims_at(now);
        claims.exp = claims.iat;
        assert_eq!(validate_claims(&claims, now), Err(TokenValidationError::InvalidTimeWindow));
    }

    #[test]
    fn superadmin_payload_omits_church() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let claims = IdentityClaims::new(UserId::new(1), None, Role::SUPERADMIN, now, Duration::minutes(5));
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("church_id").is_none());

        let back: IdentityClaims = serde_json::from_value(json).unwrap();
        assert_eq!(back.church_id, None);
        assert_eq!(back.expires_at(), Some(now + Duration::minutes(5)));
    }
}
