use thiserror::Error;

use crate::{Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Operation-side authorization contract.
///
/// The API layer checks these requirements before calling into a service.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Pure policy check: no IO, no panics.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let granted = principal
        .permissions
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use stockledger_core::UserId;

    #[test]
    fn admin_wildcard_grants_everything() {
        let p = Principal::from_roles(UserId::new(), vec![Role::new("admin")]);
        assert!(authorize(&p, &Permission::STOCK_ADJUST).is_ok());
        assert!(authorize(&p, &Permission::new("anything.else")).is_ok());
    }

    #[test]
    fn sales_cannot_adjust_stock() {
        let p = Principal::from_roles(UserId::new(), vec![Role::new("sales")]);
        assert!(authorize(&p, &Permission::ORDERS_WRITE).is_ok());
        assert_eq!(
            authorize(&p, &Permission::STOCK_ADJUST),
            Err(AuthzError::Forbidden("stock.adjust".to_string()))
        );
    }

    #[test]
    fn unknown_role_grants_nothing() {
        let p = Principal::from_roles(UserId::new(), vec![Role::new("intern")]);
        assert!(p.permissions.is_empty());
        assert!(authorize(&p, &Permission::PRODUCTS_READ).is_err());
    }

    #[test]
    fn overlapping_roles_are_deduplicated() {
        let p = Principal::from_roles(
            UserId::new(),
            vec![Role::new("viewer"), Role::new("sales")],
        );
        let reads = p
            .permissions
            .iter()
            .filter(|x| **x == Permission::ORDERS_READ)
            .count();
        assert_eq!(reads, 1);
    }
}
