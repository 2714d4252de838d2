//! Deficit computation
//!
//! Diffs the configured quota against the on-disk inventory of every
//! category in a partition.

use foodset_common::CategoryRegistry;
use std::collections::BTreeMap;
use std::path::Path;

use super::inventory_scanner::{InventoryScanner, ScanError};

/// Category key → images still owed (always positive)
pub type DeficitMap = BTreeMap<String, u32>;

/// A category whose inventory could not be read
#[derive(Debug)]
pub struct ScanFailure {
    pub category: String,
    pub error: ScanError,
}

/// Deficits plus the categories skipped because of scan errors
#[derive(Debug, Default)]
pub struct DeficitReport {
    pub deficits: DeficitMap,
    pub errors: Vec<ScanFailure>,
}

impl DeficitReport {
    /// Sum of all deficits
    pub fn total_requested(&self) -> u64 {
        self.deficits.values().map(|&n| u64::from(n)).sum()
    }
}

/// Computes per-category deficits from the inventory
#[derive(Debug, Clone, Default)]
pub struct QuotaCalculator {
    scanner: InventoryScanner,
}

impl QuotaCalculator {
    pub fn new(scanner: InventoryScanner) -> Self {
        Self { scanner }
    }

    /// `max(0, quota - existing)` for every category under `partition_root`
    ///
    /// Satisfied categories are omitted. A category that cannot be scanned is
    /// reported in `errors` and left out of the map; the others are unaffected.
    pub fn compute(
        &self,
        registry: &CategoryRegistry,
        quota: u32,
        partition_root: &Path,
    ) -> DeficitReport {
        let mut report = DeficitReport::default();

        for category in registry.iter() {
            let dir = partition_root.join(&category.key);
            match self.scanner.count(&dir) {
                Ok(existing) => {
                    let existing = u32::try_from(existing).unwrap_or(u32::MAX);
                    let deficit = quota.saturating_sub(existing);
                    tracing::debug!(
                        category = %category.key,
                        existing,
                        quota,
                        deficit,
                        "Category inventory"
                    );
                    if deficit > 0 {
                        report.deficits.insert(category.key.clone(), deficit);
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        category = %category.key,
                        error = %error,
                        "Skipping category, inventory scan failed"
                    );
                    report.errors.push(ScanFailure {
                        category: category.key.clone(),
                        error,
                    });
                }
            }
        }

        report
    }

    /// Every category owes the full quota (bulk seeding)
    pub fn seed(registry: &CategoryRegistry, quota: u32) -> DeficitMap {
        if quota == 0 {
            return DeficitMap::new();
        }
        registry.keys().map(|key| (key.to_string(), quota)).collect()
    }
}
