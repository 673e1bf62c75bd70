//! API-side authorization guard.
//!
//! Checked at the route boundary before any service is called, so infra and
//! the domain crates stay auth-agnostic.

use stockledger_auth::{AuthzError, CommandAuthorization, authorize};

use crate::context::PrincipalContext;

/// Check every permission an operation requires against the request principal.
pub fn authorize_command<C: CommandAuthorization>(
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = principal.principal();
    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }
    Ok(())
}
