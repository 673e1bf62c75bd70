use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_core::UserId;

use crate::Role;

/// JWT claims model (transport-agnostic).
///
/// `sub` becomes the acting user recorded on manual stock adjustments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject / acting user.
    pub sub: UserId,

    /// RBAC roles granted to the subject.
    pub roles: Vec<Role>,

    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("malformed or unverifiable token: {0}")]
    Malformed(String),
}

/// Deterministically validate the time window of decoded claims.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(issued_offset: i64, ttl: i64) -> (JwtClaims, DateTime<Utc>) {
        let now = Utc::now();
        let issued_at = now + Duration::seconds(issued_offset);
        (
            JwtClaims {
                sub: UserId::new(),
                roles: vec![Role::new("admin")],
                issued_at,
                expires_at: issued_at + Duration::seconds(ttl),
            },
            now,
        )
    }

    #[test]
    fn window_is_enforced() {
        let (c, now) = claims(-10, 60);
        assert!(validate_claims(&c, now).is_ok());

        let (c, now) = claims(-120, 60);
        assert_eq!(validate_claims(&c, now), Err(TokenValidationError::Expired));

        let (c, now) = claims(30, 60);
        assert_eq!(validate_claims(&c, now), Err(TokenValidationError::NotYetValid));

        let (c, now) = claims(0, 0);
        assert_eq!(validate_claims(&c, now), Err(TokenValidationError::InvalidTimeWindow));
    }
}
