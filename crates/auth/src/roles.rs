use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Static role → permission policy.
    ///
    /// - `admin`: everything
    /// - `inventory`: ledger reads, manual adjustments, catalog reads
    /// - `sales`: order reads/writes, catalog reads
    /// - `viewer`: read-only
    ///
    /// Unknown roles grant nothing.
    pub fn permissions(&self) -> Vec<Permission> {
        match self.as_str() {
            "admin" => vec![Permission::WILDCARD],
            "inventory" => vec![
                Permission::STOCK_MOVEMENTS_READ,
                Permission::STOCK_ADJUST,
                Permission::PRODUCTS_READ,
                Permission::PRODUCTS_WRITE,
            ],
            "sales" => vec![
                Permission::ORDERS_READ,
                Permission::ORDERS_WRITE,
                Permission::PRODUCTS_READ,
            ],
            "viewer" => vec![
                Permission::STOCK_MOVEMENTS_READ,
                Permission::ORDERS_READ,
                Permission::PRODUCTS_READ,
            ],
            _ => Vec::new(),
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
