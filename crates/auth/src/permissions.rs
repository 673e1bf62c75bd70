use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "stock.adjust"). The wildcard `"*"`
/// grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));
    pub const STOCK_MOVEMENTS_READ: Permission = Permission(Cow::Borrowed("stock.movements.read"));
    pub const STOCK_ADJUST: Permission = Permission(Cow::Borrowed("stock.adjust"));
    pub const ORDERS_READ: Permission = Permission(Cow::Borrowed("orders.read"));
    pub const ORDERS_WRITE: Permission = Permission(Cow::Borrowed("orders.write"));
    pub const PRODUCTS_READ: Permission = Permission(Cow::Borrowed("products.read"));
    pub const PRODUCTS_WRITE: Permission = Permission(Cow::Borrowed("products.write"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
