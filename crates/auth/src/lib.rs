//! `stockledger-auth`: bearer-token authentication and permission checks.
//!
//! Decoupled from HTTP and storage: the API layer extracts the token, this
//! crate verifies it and answers "may this principal do X".

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, CommandAuthorization, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::Role;
