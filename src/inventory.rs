//! The dispenser's ingredient stock.
//!
//! All reads and writes go through one async mutex. The check-then-consume of
//! a brew and the whole refill sequence (including its simulated delay) each
//! run inside a single critical section, so no connection ever acts on a
//! snapshot another connection is mutating.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::recipe::{shortages, Ingredient};

/// What a refill request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillTarget {
    /// A single ingredient.
    One(Ingredient),
    /// Every ingredient.
    All,
}

impl fmt::Display for RefillTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefillTarget::One(ingredient) => write!(f, "{}", ingredient),
            RefillTarget::All => f.write_str("ALL"),
        }
    }
}

/// Point-in-time copy of every ingredient quantity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot(BTreeMap<Ingredient, u32>);

impl InventorySnapshot {
    /// Quantity on hand; ingredients absent from the snapshot count as zero.
    pub fn get(&self, ingredient: Ingredient) -> u32 {
        self.0.get(&ingredient).copied().unwrap_or(0)
    }

    /// Levels in ingredient order.
    pub fn iter(&self) -> impl Iterator<Item = (Ingredient, u32)> + '_ {
        self.0.iter().map(|(i, q)| (*i, *q))
    }

    /// Number of ingredients tracked.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Ingredient, u32)> for InventorySnapshot {
    fn from_iter<T: IntoIterator<Item = (Ingredient, u32)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Renders the `k=v,k=v` body used by `STATUS:INGREDIENTS`.
impl fmt::Display for InventorySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (ingredient, quantity) in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}={}", ingredient, quantity)?;
            first = false;
        }
        Ok(())
    }
}

/// In-memory stock bounded above by `max_storage`.
#[derive(Debug)]
pub struct InventoryLedger {
    stock: Mutex<BTreeMap<Ingredient, u32>>,
    max_storage: u32,
}

impl InventoryLedger {
    /// Every ingredient starts full.
    pub fn new(max_storage: u32) -> Self {
        Self::with_levels(max_storage, Ingredient::ALL.map(|i| (i, max_storage)))
    }

    /// Start from explicit levels. Quantities above the ceiling are clamped;
    /// ingredients not listed start at zero.
    pub fn with_levels<I>(max_storage: u32, levels: I) -> Self
    where
        I: IntoIterator<Item = (Ingredient, u32)>,
    {
        let mut stock: BTreeMap<Ingredient, u32> =
            Ingredient::ALL.into_iter().map(|i| (i, 0)).collect();
        for (ingredient, quantity) in levels {
            stock.insert(ingredient, quantity.min(max_storage));
        }
        Self {
            stock: Mutex::new(stock),
            max_storage,
        }
    }

    /// Per-ingredient ceiling.
    pub fn max_storage(&self) -> u32 {
        self.max_storage
    }

    /// Consume a recipe atomically.
    ///
    /// If any ingredient is short, nothing is deducted and every short
    /// ingredient is returned.
    pub async fn try_consume(&self, recipe: &[(Ingredient, u32)]) -> Result<(), Vec<Ingredient>> {
        let mut stock = self.stock.lock().await;

        let missing = shortages(recipe, |i| stock.get(&i).copied().unwrap_or(0));
        if !missing.is_empty() {
            return Err(missing);
        }

        for (ingredient, amount) in recipe {
            if let Some(quantity) = stock.get_mut(ingredient) {
                *quantity -= amount;
            }
        }
        debug!(?recipe, "consumed recipe");
        Ok(())
    }

    /// Restore `target` to the ceiling. The lock is held for the whole
    /// simulated `delay`, so concurrent brews wait for the refill to land.
    pub async fn refill(&self, target: RefillTarget, delay: Duration) {
        let mut stock = self.stock.lock().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match target {
            RefillTarget::One(ingredient) => {
                stock.insert(ingredient, self.max_storage);
            }
            RefillTarget::All => {
                for quantity in stock.values_mut() {
                    *quantity = self.max_storage;
                }
            }
        }
        debug!(%target, "refilled");
    }

    /// Copy of current levels.
    pub async fn snapshot(&self) -> InventorySnapshot {
        InventorySnapshot(self.stock.lock().await.clone())
    }
}
