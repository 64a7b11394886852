//! Override ledger
//!
//! Per dish instance mutations of the base recipe: custom quantities, ad-hoc
//! additions and removals. Rows are never deleted, a removal is a state of
//! the row.
//!
//! A [`DishLedger`] is a loaded copy of the rows of one dish instance. The
//! [`add`](DishLedger::add), [`modify`](DishLedger::modify) and
//! [`remove`](DishLedger::remove) transitions only change that copy. Changes
//! become visible when the whole ledger is committed to a [`LedgerStore`],
//! which fails with [`Error::Conflict`] if someone else committed in between.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use indexmap::IndexMap;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    model::{CallerContext, Dish, IngredientId, InstanceKey},
};

/// Current state of an override row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum OverrideState {
    /// The ingredient is used with an explicit quantity
    #[serde(rename_all = "camelCase")]
    Present { custom_quantity: f64 },
    /// The ingredient is excluded from the dish instance
    Removed,
}

/// Ledger row for one ingredient of one dish instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientOverride {
    pub ingredient: IngredientId,
    pub state: OverrideState,
    /// The ingredient is not part of the dish base recipe
    pub added_ad_hoc: bool,
    /// Order of ad-hoc additions within the dish instance
    pub added_seq: u64,
    /// User of the last write
    pub updated_by: String,
    /// Instance version that last wrote this row
    pub revision: u64,
}

impl IngredientOverride {
    pub fn custom_quantity(&self) -> Option<f64> {
        match self.state {
            OverrideState::Present { custom_quantity } => Some(custom_quantity),
            OverrideState::Removed => None,
        }
    }

    pub fn is_removed(&self) -> bool {
        matches!(self.state, OverrideState::Removed)
    }
}

/// Loaded override rows of a dish instance
#[derive(Debug, Clone, PartialEq)]
pub struct DishLedger {
    key: InstanceKey,
    version: u64,
    rows: IndexMap<IngredientId, IngredientOverride>,
    next_seq: u64,
}

impl DishLedger {
    /// Empty ledger of an untouched dish instance
    pub fn new(key: InstanceKey) -> Self {
        Self::from_rows(key, 0, [])
    }

    /// Ledger loaded from stored rows at `version`
    pub fn from_rows(
        key: InstanceKey,
        version: u64,
        rows: impl IntoIterator<Item = IngredientOverride>,
    ) -> Self {
        let rows: IndexMap<_, _> = rows
            .into_iter()
            .map(|row| (row.ingredient.clone(), row))
            .collect();
        let next_seq = rows.values().map(|r| r.added_seq + 1).max().unwrap_or(0);
        Self {
            key,
            version,
            rows,
            next_seq,
        }
    }

    pub fn key(&self) -> &InstanceKey {
        &self.key
    }

    /// Version the ledger was loaded at
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, ingredient: &IngredientId) -> Option<&IngredientOverride> {
        self.rows.get(ingredient)
    }

    /// Rows in the order they were first written
    pub fn rows(&self) -> impl Iterator<Item = &IngredientOverride> {
        self.rows.values()
    }

    pub fn is_removed(&self, ingredient: &IngredientId) -> bool {
        self.get(ingredient).is_some_and(|r| r.is_removed())
    }

    /// Ad-hoc rows that are not removed, in the order they were added
    pub fn ad_hoc(&self) -> Vec<&IngredientOverride> {
        let mut rows: Vec<_> = self
            .rows
            .values()
            .filter(|r| r.added_ad_hoc && !r.is_removed())
            .collect();
        rows.sort_by_key(|r| r.added_seq);
        rows
    }

    /// Add an ingredient with an explicit quantity
    ///
    /// Fails with [`Error::AlreadyExists`] if the ingredient is present,
    /// either from the base recipe or from a previous addition. A removed
    /// ingredient is restored. Returns if the ledger changed.
    pub fn add(
        &mut self,
        dish: &Dish,
        ingredient: &IngredientId,
        quantity: f64,
        caller: &CallerContext,
    ) -> Result<bool, Error> {
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(invalid_quantity(ingredient, quantity, "must be greater than zero"));
        }
        let in_recipe = dish.contains(ingredient);
        let present = match self.rows.get(ingredient) {
            Some(row) => !row.is_removed(),
            None => in_recipe,
        };
        if present {
            return Err(Error::AlreadyExists {
                instance: self.key.clone(),
                ingredient: ingredient.clone(),
            });
        }
        let seq = self.take_seq();
        self.write(
            ingredient,
            OverrideState::Present {
                custom_quantity: quantity,
            },
            !in_recipe,
            Some(seq),
            caller,
        );
        Ok(true)
    }

    /// Set the custom quantity of an ingredient
    ///
    /// Works for base recipe ingredients and for ingredients the recipe
    /// doesn't list, which become ad-hoc. Removed rows are refused with
    /// [`Error::NotInInstance`]: only [`Self::add`] brings them back.
    /// Returns if the ledger changed, setting the same quantity again is a
    /// no-op.
    pub fn modify(
        &mut self,
        dish: &Dish,
        ingredient: &IngredientId,
        quantity: f64,
        caller: &CallerContext,
    ) -> Result<bool, Error> {
        if !(quantity.is_finite() && quantity >= 0.0) {
            return Err(invalid_quantity(ingredient, quantity, "must not be negative"));
        }
        let state = OverrideState::Present {
            custom_quantity: quantity,
        };
        match self.rows.get(ingredient) {
            Some(row) if row.is_removed() => Err(Error::NotInInstance {
                instance: self.key.clone(),
                ingredient: ingredient.clone(),
            }),
            Some(row) if row.state == state => Ok(false),
            Some(row) => {
                let ad_hoc = row.added_ad_hoc;
                self.write(ingredient, state, ad_hoc, None, caller);
                Ok(true)
            }
            None => {
                let ad_hoc = !dish.contains(ingredient);
                let seq = ad_hoc.then(|| self.take_seq());
                self.write(ingredient, state, ad_hoc, seq, caller);
                Ok(true)
            }
        }
    }

    /// Exclude an ingredient from the dish instance
    ///
    /// Removing twice is a no-op. An ingredient that is neither in the base
    /// recipe nor in the ledger is an [`Error::NotInInstance`].
    pub fn remove(
        &mut self,
        dish: &Dish,
        ingredient: &IngredientId,
        caller: &CallerContext,
    ) -> Result<bool, Error> {
        match self.rows.get(ingredient) {
            Some(row) if row.is_removed() => Ok(false),
            Some(row) => {
                let ad_hoc = row.added_ad_hoc;
                self.write(ingredient, OverrideState::Removed, ad_hoc, None, caller);
                Ok(true)
            }
            None if dish.contains(ingredient) => {
                self.write(ingredient, OverrideState::Removed, false, None, caller);
                Ok(true)
            }
            None => Err(Error::NotInInstance {
                instance: self.key.clone(),
                ingredient: ingredient.clone(),
            }),
        }
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn write(
        &mut self,
        ingredient: &IngredientId,
        state: OverrideState,
        added_ad_hoc: bool,
        seq: Option<u64>,
        caller: &CallerContext,
    ) {
        let revision = self.version + 1;
        let row = self
            .rows
            .entry(ingredient.clone())
            .or_insert_with(|| IngredientOverride {
                ingredient: ingredient.clone(),
                state,
                added_ad_hoc,
                added_seq: 0,
                updated_by: String::new(),
                revision,
            });
        row.state = state;
        row.added_ad_hoc = added_ad_hoc;
        if let Some(seq) = seq {
            row.added_seq = seq;
        }
        row.updated_by.clone_from(&caller.user_id);
        row.revision = revision;
    }
}

fn invalid_quantity(ingredient: &IngredientId, quantity: f64, reason: &'static str) -> Error {
    Error::InvalidQuantity {
        ingredient: ingredient.clone(),
        quantity,
        reason,
    }
}

/// Storage of override rows
///
/// A commit replaces all the rows of a dish instance at once, so readers
/// never see half of a batch.
pub trait LedgerStore: Send + Sync {
    /// Load the rows of a dish instance. Untouched instances are empty at
    /// version 0.
    fn load(&self, key: &InstanceKey) -> Result<DishLedger, Error>;

    /// Store the rows of `ledger` if the instance is still at the version
    /// it was loaded at
    ///
    /// Returns the new version, or [`Error::Conflict`].
    fn commit(&self, ledger: &DishLedger) -> Result<u64, Error>;

    /// Counter bumped on every commit, of any instance
    fn watermark(&self) -> u64;

    /// Value of [`LedgerStore::watermark`] right after the last commit of the
    /// instance, 0 if it was never committed
    fn instance_watermark(&self, key: &InstanceKey) -> u64;
}

impl<L: LedgerStore + ?Sized> LedgerStore for Arc<L> {
    fn load(&self, key: &InstanceKey) -> Result<DishLedger, Error> {
        (**self).load(key)
    }

    fn commit(&self, ledger: &DishLedger) -> Result<u64, Error> {
        (**self).commit(ledger)
    }

    fn watermark(&self) -> u64 {
        (**self).watermark()
    }

    fn instance_watermark(&self, key: &InstanceKey) -> u64 {
        (**self).instance_watermark(key)
    }
}

#[derive(Debug, Default)]
struct StoredInstance {
    version: u64,
    watermark: u64,
    rows: Vec<IngredientOverride>,
}

/// In memory [`LedgerStore`]
#[derive(Debug, Default)]
pub struct MemoryLedger {
    instances: RwLock<HashMap<InstanceKey, StoredInstance>>,
    watermark: AtomicU64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dish instances with at least one commit
    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }
}

impl LedgerStore for MemoryLedger {
    fn load(&self, key: &InstanceKey) -> Result<DishLedger, Error> {
        let instances = self.instances.read();
        Ok(match instances.get(key) {
            Some(stored) => DishLedger::from_rows(key.clone(), stored.version, stored.rows.clone()),
            None => DishLedger::new(key.clone()),
        })
    }

    fn commit(&self, ledger: &DishLedger) -> Result<u64, Error> {
        let mut instances = self.instances.write();
        let stored = instances.entry(ledger.key.clone()).or_default();
        if stored.version != ledger.version {
            tracing::warn!(
                instance = %ledger.key,
                expected = ledger.version,
                found = stored.version,
                "rejected ledger commit"
            );
            return Err(Error::Conflict {
                instance: ledger.key.clone(),
                expected: ledger.version,
                found: stored.version,
            });
        }
        stored.version += 1;
        stored.rows = ledger.rows.values().cloned().collect();
        // bumped under the write lock so watermarks follow commit order
        stored.watermark = self.watermark.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(
            instance = %ledger.key,
            version = stored.version,
            rows = stored.rows.len(),
            "ledger committed"
        );
        Ok(stored.version)
    }

    fn watermark(&self) -> u64 {
        self.watermark.load(Ordering::SeqCst)
    }

    fn instance_watermark(&self, key: &InstanceKey) -> u64 {
        self.instances.read().get(key).map_or(0, |s| s.watermark)
    }
}

/// Guard of an exclusive write on a dish instance, released when dropped
pub struct InstanceGuard {
    key: InstanceKey,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl InstanceGuard {
    pub fn key(&self) -> &InstanceKey {
        &self.key
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        tracing::trace!(instance = %self.key, "released instance lock");
    }
}

/// Per dish instance write locks
///
/// Writers of the same instance wait for each other, writers of different
/// instances never do.
#[derive(Debug, Default)]
pub struct InstanceLocks {
    locks: Mutex<HashMap<InstanceKey, Arc<Mutex<()>>>>,
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &InstanceKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        // drop the slots nobody holds or waits for
        locks.retain(|_, slot| Arc::strong_count(slot) > 1);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Block until the instance is free and lock it
    pub fn lock(&self, key: &InstanceKey) -> InstanceGuard {
        let guard = self.slot(key).lock_arc();
        tracing::trace!(instance = %key, "acquired instance lock");
        InstanceGuard {
            key: key.clone(),
            _guard: guard,
        }
    }

    /// Lock the instance if it is free
    pub fn try_lock(&self, key: &InstanceKey) -> Option<InstanceGuard> {
        let guard = self.slot(key).try_lock_arc()?;
        Some(InstanceGuard {
            key: key.clone(),
            _guard: guard,
        })
    }

    /// Number of instances currently locked or waited for
    pub fn held(&self) -> usize {
        self.locks
            .lock()
            .values()
            .filter(|slot| Arc::strong_count(slot) > 1)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use crate::{error::ErrorKind, model::RecipeIngredient};

    use super::*;

    fn dish() -> Dish {
        let entry = |id: &str, quantity, is_main| RecipeIngredient {
            ingredient: id.into(),
            quantity,
            unit: "g".into(),
            is_main,
        };
        Dish {
            id: "pbm".into(),
            name: "Paneer Butter Masala".into(),
            base_serving_people: 100,
            ingredients: vec![entry("paneer", 5000.0, true), entry("butter", 1000.0, false)],
        }
    }

    fn ledger() -> DishLedger {
        DishLedger::new(InstanceKey::new("lunch", "pbm"))
    }

    fn chef() -> CallerContext {
        CallerContext::new("chef")
    }

    #[test]
    fn add_ad_hoc() {
        let dish = dish();
        let mut l = ledger();
        assert!(l.add(&dish, &"saffron".into(), 10.0, &chef()).unwrap());
        let row = l.get(&"saffron".into()).unwrap();
        assert!(row.added_ad_hoc);
        assert_eq!(row.custom_quantity(), Some(10.0));
        assert_eq!(row.updated_by, "chef");
        assert_eq!(row.revision, 1);

        let err = l.add(&dish, &"saffron".into(), 10.0, &chef()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        let err = l.add(&dish, &"paneer".into(), 10.0, &chef()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn add_needs_positive_quantity() {
        let dish = dish();
        let mut l = ledger();
        for q in [0.0, -1.0, f64::NAN] {
            let err = l.add(&dish, &"saffron".into(), q, &chef()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidQuantity);
        }
        assert_eq!(l.rows().count(), 0);
    }

    #[test]
    fn modify_is_idempotent() {
        let dish = dish();
        let mut l = ledger();
        assert!(l.modify(&dish, &"butter".into(), 600.0, &chef()).unwrap());
        let before = l.clone();
        assert!(!l.modify(&dish, &"butter".into(), 600.0, &chef()).unwrap());
        assert_eq!(l, before);
        assert!(!l.get(&"butter".into()).unwrap().added_ad_hoc);

        assert!(l.modify(&dish, &"butter".into(), 0.0, &chef()).unwrap());
        let err = l.modify(&dish, &"butter".into(), -5.0, &chef()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuantity);
    }

    #[test]
    fn modify_unknown_becomes_ad_hoc() {
        let dish = dish();
        let mut l = ledger();
        l.modify(&dish, &"cream".into(), 200.0, &chef()).unwrap();
        assert!(l.get(&"cream".into()).unwrap().added_ad_hoc);
        assert_eq!(l.ad_hoc().len(), 1);
    }

    #[test]
    fn remove_and_restore() {
        let dish = dish();
        let mut l = ledger();
        assert!(l.remove(&dish, &"butter".into(), &chef()).unwrap());
        assert!(!l.remove(&dish, &"butter".into(), &chef()).unwrap());
        assert!(l.is_removed(&"butter".into()));
        assert_eq!(l.get(&"butter".into()).unwrap().custom_quantity(), None);

        let err = l.modify(&dish, &"butter".into(), 10.0, &chef()).unwrap_err();
        assert!(matches!(err, Error::NotInInstance { .. }));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(l.is_removed(&"butter".into()));

        l.add(&dish, &"butter".into(), 750.0, &chef()).unwrap();
        let row = l.get(&"butter".into()).unwrap();
        assert!(!row.added_ad_hoc);
        assert_eq!(row.custom_quantity(), Some(750.0));
    }

    #[test]
    fn remove_unknown() {
        let err = ledger()
            .remove(&dish(), &"saffron".into(), &chef())
            .unwrap_err();
        assert!(matches!(err, Error::NotInInstance { .. }));
    }

    #[test]
    fn ad_hoc_order() {
        let dish = dish();
        let mut l = ledger();
        l.add(&dish, &"saffron".into(), 1.0, &chef()).unwrap();
        l.add(&dish, &"cream".into(), 1.0, &chef()).unwrap();
        l.remove(&dish, &"saffron".into(), &chef()).unwrap();
        l.add(&dish, &"saffron".into(), 2.0, &chef()).unwrap();
        let order: Vec<_> = l.ad_hoc().iter().map(|r| r.ingredient.as_str()).collect();
        assert_eq!(order, ["cream", "saffron"]);
    }

    #[test]
    fn store_conflict() {
        let store = MemoryLedger::new();
        let dish = dish();
        let key = InstanceKey::new("lunch", "pbm");

        let mut a = store.load(&key).unwrap();
        let mut b = store.load(&key).unwrap();
        a.modify(&dish, &"paneer".into(), 3000.0, &chef()).unwrap();
        b.modify(&dish, &"paneer".into(), 2000.0, &chef()).unwrap();

        assert_eq!(store.commit(&a).unwrap(), 1);
        let err = store.commit(&b).unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, Error::Conflict { expected: 0, found: 1, .. }));

        let loaded = store.load(&key).unwrap();
        assert_eq!(loaded.version(), 1);
        assert_eq!(
            loaded.get(&"paneer".into()).unwrap().custom_quantity(),
            Some(3000.0)
        );
    }

    #[test]
    fn watermarks() {
        let store = MemoryLedger::new();
        let dish = dish();
        let k1 = InstanceKey::new("lunch", "pbm");
        let k2 = InstanceKey::new("dinner", "pbm");
        assert_eq!(store.watermark(), 0);

        let mut l = store.load(&k1).unwrap();
        l.remove(&dish, &"butter".into(), &chef()).unwrap();
        store.commit(&l).unwrap();
        let mut l = store.load(&k2).unwrap();
        l.remove(&dish, &"butter".into(), &chef()).unwrap();
        store.commit(&l).unwrap();

        assert_eq!(store.watermark(), 2);
        assert_eq!(store.instance_watermark(&k1), 1);
        assert_eq!(store.instance_watermark(&k2), 2);
        assert_eq!(store.instance_watermark(&InstanceKey::new("x", "y")), 0);
        assert_eq!(store.instance_count(), 2);
    }

    #[test]
    fn instance_locks() {
        let locks = InstanceLocks::new();
        let k1 = InstanceKey::new("lunch", "pbm");
        let k2 = InstanceKey::new("lunch", "dal");

        let g1 = locks.lock(&k1);
        assert!(locks.try_lock(&k1).is_none());
        let g2 = locks.try_lock(&k2);
        assert!(g2.is_some());
        assert_eq!(locks.held(), 2);

        drop(g1);
        let g3 = locks.try_lock(&k1);
        assert!(g3.is_some());
        drop(g2);
        drop(g3);
        assert_eq!(locks.held(), 0);
    }
}
