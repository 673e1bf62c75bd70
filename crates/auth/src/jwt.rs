//! HS256 bearer token verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

/// Verifies a raw bearer token and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// Shared-secret HS256 validator.
///
/// The time window lives in `issued_at`/`expires_at` (RFC 3339), not in the
/// registered `exp` claim, so jsonwebtoken's own expiry check is disabled and
/// `validate_claims` runs after the signature is verified.
pub struct Hs256JwtValidator {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        Self {
            decoding: DecodingKey::from_secret(secret),
            encoding: EncodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign claims with the same secret (used by tooling and tests).
    pub fn issue(&self, claims: &JwtClaims) -> Result<String, TokenValidationError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "bearer token rejected");
                TokenValidationError::Malformed(e.to_string())
            })?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stockledger_core::UserId;

    use crate::Role;

    fn claims() -> JwtClaims {
        let now = Utc::now();
        JwtClaims {
            sub: UserId::new(),
            roles: vec![Role::new("inventory")],
            issued_at: now - Duration::seconds(5),
            expires_at: now + Duration::minutes(10),
        }
    }

    #[test]
    fn issued_token_round_trips() {
        let v = Hs256JwtValidator::new("secret");
        let c = claims();
        let token = v.issue(&c).unwrap();
        assert_eq!(v.validate(&token, Utc::now()).unwrap(), c);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = Hs256JwtValidator::new("one").issue(&claims()).unwrap();
        let err = Hs256JwtValidator::new("two")
            .validate(&token, Utc::now())
            .unwrap_err();
        assert!(matches!(err, TokenValidationError::Malformed(_)));
    }

    #[test]
    fn expired_token_is_rejected_after_signature_check() {
        let v = Hs256JwtValidator::new("secret");
        let token = v.issue(&claims()).unwrap();
        let later = Utc::now() + Duration::hours(1);
        assert_eq!(v.validate(&token, later), Err(TokenValidationError::Expired));
    }

    #[test]
    fn garbage_is_rejected() {
        let v = Hs256JwtValidator::new("secret");
        assert!(v.validate("not.a.jwt", Utc::now()).is_err());
    }
}
