//! Per-entity lifecycle hooks.
//!
//! Hooks run inside the save or delete transaction. Returning `Ok(false)`
//! aborts the operation: a locally owned transaction is rolled back and the
//! call reports failure. An `Err` aborts the same way but propagates.

use tabula_core::{DataObject, Result, Transaction};

/// Callbacks around save and delete for one entity type.
///
/// Every method defaults to a no-op that lets the operation continue.
pub trait EntityHooks: Send + Sync {
    /// Runs before validation, on both save and delete.
    fn pre_validate(&self, _obj: &mut DataObject) {}

    fn pre_save(&self, _obj: &mut DataObject, _tx: &mut dyn Transaction) -> Result<bool> {
        Ok(true)
    }

    /// Runs after the row was written. The primary key is assigned by now.
    fn post_save(&self, _obj: &mut DataObject, _tx: &mut dyn Transaction) -> Result<bool> {
        Ok(true)
    }

    /// Runs after conflicts were resolved, before the row is deleted.
    fn pre_delete(&self, _obj: &mut DataObject, _tx: &mut dyn Transaction) -> Result<bool> {
        Ok(true)
    }

    fn post_delete(&self, _obj: &mut DataObject, _tx: &mut dyn Transaction) -> Result<bool> {
        Ok(true)
    }
}

/// Hooks for entity types that registered none.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NoHooks;

impl EntityHooks for NoHooks {}
