use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, ProductId};

/// Catalog product as seen by the stock ledger.
///
/// The catalog owns everything here except `stock`, which only the
/// reconciliation engine may write. `version` is bumped on every stock write
/// and drives optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub sku: Option<String>,
    pub name: String,
    /// Price in smallest currency unit (e.g., cents).
    pub price: u64,
    pub stock: i64,
    pub active: bool,
    #[serde(skip)]
    pub version: u64,
}

impl Product {
    /// A product counts as "empty SKU" when the SKU is missing or blank.
    pub fn has_sku(&self) -> bool {
        self.sku.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    pub fn snapshot(&self) -> StockSnapshot {
        StockSnapshot {
            product_id: self.id,
            stock: self.stock,
            version: self.version,
        }
    }
}

/// Stock value read at a specific row version.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StockSnapshot {
    pub product_id: ProductId,
    pub stock: i64,
    pub version: u64,
}

/// Catalog registration payload (the catalog's seeding hook into the ledger
/// subsystem). The initial stock is the baseline the ledger sums against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub sku: Option<String>,
    pub name: String,
    #[serde(default)]
    pub price: u64,
    #[serde(default)]
    pub stock: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl NewProduct {
    pub fn into_product(self, id: ProductId) -> Result<Product, DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.stock < 0 {
            return Err(DomainError::validation("initial stock cannot be negative"));
        }
        let sku = self.sku.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Ok(Product {
            id,
            sku,
            name: self.name.trim().to_string(),
            price: self.price,
            stock: self.stock,
            active: self.active,
            version: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_product(sku: Option<&str>, stock: i64) -> NewProduct {
        NewProduct {
            sku: sku.map(str::to_string),
            name: "Cabo flexível 2,5mm".to_string(),
            price: 1990,
            stock,
            active: true,
        }
    }

    #[test]
    fn blank_sku_is_normalized_to_none() {
        let p = new_product(Some("   "), 3).into_product(ProductId::new()).unwrap();
        assert_eq!(p.sku, None);
        assert!(!p.has_sku());
    }

    #[test]
    fn negative_initial_stock_is_rejected() {
        let err = new_product(Some("CAB-25"), -1)
            .into_product(ProductId::new())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn snapshot_carries_version() {
        let mut p = new_product(Some("CAB-25"), 10).into_product(ProductId::new()).unwrap();
        p.version = 7;
        let snap = p.snapshot();
        assert_eq!(snap.stock, 10);
        assert_eq!(snap.version, 7);
        assert!(p.has_sku());
    }
}
