//! Save and delete.
//!
//! Both run the entity's `pre_validate` hook and validation rules first and
//! report `Ok(false)` without writing when a rule fails. The write itself
//! runs in the caller's transaction or a local one that is committed only
//! when every step succeeded.

use std::sync::Arc;

use tabula_core::{
    ColumnRef, Connection, DataObject, DeleteRequest, Entity, Error, InsertRequest, Predicate,
    Result, TableRef, Transaction, UpdateRequest, Value,
};
use tabula_query::AliasMap;

use crate::context::DataContext;

/// Column/value pairs for every field except the primary key.
fn field_values(obj: &DataObject) -> Vec<(String, Value)> {
    obj.entity()
        .fields()
        .iter()
        .filter(|field| !field.primary_key)
        .map(|field| {
            let value = obj.raw_field(field.name).cloned().unwrap_or_default();
            (field.name.to_string(), value)
        })
        .collect()
}

impl<C: Connection> DataContext<C> {
    fn key_target(&self, obj: &DataObject) -> Result<(TableRef, Predicate)> {
        let entity = obj.entity();
        let primary_key = obj.primary_key().ok_or_else(|| {
            Error::not_editable(entity.name(), "instance has no primary key")
        })?;
        let alias = AliasMap::new(self.alias_style()).root().to_string();
        let predicate = Predicate::equals(
            ColumnRef::new(alias.clone(), entity.primary_key().name),
            primary_key,
        );
        let table = TableRef {
            table: entity.table(),
            alias,
        };
        Ok((table, predicate))
    }

    fn insert_row(&self, obj: &mut DataObject, tx: &mut dyn Transaction) -> Result<()> {
        let entity = Arc::clone(obj.entity());
        let request = InsertRequest {
            table: entity.table(),
            values: field_values(obj),
        };
        self.trace_insert(&request);
        let primary_key = tx.insert(&request)?.ok_or_else(|| {
            Error::Backend(format!("insert into {} returned no identity", entity.table()))
        })?;
        obj.mark_persisted(primary_key);
        tracing::info!(entity = entity.name(), primary_key, "Inserted row");
        Ok(())
    }

    fn update_row(&self, obj: &mut DataObject, tx: &mut dyn Transaction) -> Result<()> {
        let (table, predicate) = self.key_target(obj)?;
        let request = UpdateRequest {
            table,
            values: field_values(obj),
            predicate,
        };
        self.trace_update(&request);
        let updated = tx.update(&request)?;
        tracing::info!(
            entity = obj.entity_name(),
            primary_key = ?obj.primary_key(),
            updated,
            "Updated row"
        );
        Ok(())
    }

    /// Run the `pre_validate` hook and the rules, inside the caller's
    /// transaction when there is one.
    fn check_rules(
        &self,
        obj: &mut DataObject,
        tx: &mut Option<&mut dyn Transaction>,
    ) -> Result<bool> {
        self.hooks_for(obj.entity_name()).pre_validate(obj);
        let valid = match tx {
            Some(tx) => self.validate_in(obj, &mut **tx)?,
            None => self.validate(obj, None)?,
        };
        if !valid {
            tracing::info!(
                entity = obj.entity_name(),
                errors = obj.errors().len(),
                "Validation failed"
            );
        }
        Ok(valid)
    }

    /// Insert or update `obj`.
    ///
    /// New instances are inserted and receive their generated primary key;
    /// loaded instances update every non-key field by primary key. Returns
    /// `Ok(false)` when validation fails (see [`DataObject::errors`]) or a
    /// hook declines.
    #[tracing::instrument(level = "debug", skip(self, obj, tx), fields(entity = obj.entity_name()))]
    pub fn save(&self, obj: &mut DataObject, mut tx: Option<&mut dyn Transaction>) -> Result<bool> {
        obj.check_editable()?;
        if !self.check_rules(obj, &mut tx)? {
            return Ok(false);
        }

        // A rolled back local transaction must not leave a key behind.
        let before = tx.is_none().then(|| obj.clone());
        let hooks = self.hooks_for(obj.entity_name());
        let saved = self.with_write(tx, |tx| {
            if !hooks.pre_save(obj, tx)? {
                tracing::debug!(entity = obj.entity_name(), "pre_save declined");
                return Ok(false);
            }
            if obj.is_insert() {
                self.insert_row(obj, tx)?;
            } else {
                self.update_row(obj, tx)?;
            }
            if !hooks.post_save(obj, tx)? {
                tracing::debug!(entity = obj.entity_name(), "post_save declined");
                return Ok(false);
            }
            Ok(true)
        });

        if let Some(before) = before {
            if !matches!(saved, Ok(true)) {
                *obj = before;
            }
        }
        saved
    }

    /// Delete `obj`, resolving rows that reference it first.
    ///
    /// Referencing rows are deleted or detached according to each
    /// relationship list's policy. If rows with the `Conflict` policy
    /// remain, nothing is deleted, the rows are recorded in
    /// [`DataObject::fk_conflicts`] and the result is `Ok(false)`. On success
    /// the instance becomes terminal.
    #[tracing::instrument(level = "debug", skip(self, obj, tx), fields(entity = obj.entity_name()))]
    pub fn delete(&self, obj: &mut DataObject, mut tx: Option<&mut dyn Transaction>) -> Result<bool> {
        obj.check_editable()?;
        if obj.is_insert() {
            return Err(Error::not_editable(
                obj.entity_name(),
                "instance has not been saved",
            ));
        }
        if self.config().validate_on_delete {
            if !self.check_rules(obj, &mut tx)? {
                return Ok(false);
            }
        } else {
            self.hooks_for(obj.entity_name()).pre_validate(obj);
        }

        let hooks = self.hooks_for(obj.entity_name());
        let deleted = self.with_write(tx, |tx| {
            let conflicts = self.find_conflicts(obj, tx)?;
            let found = conflicts.len();
            let remaining = self.resolve_conflicts(conflicts, tx)?;
            if !remaining.is_empty() {
                tracing::info!(
                    entity = obj.entity_name(),
                    primary_key = ?obj.primary_key(),
                    conflicts = remaining.len(),
                    "Delete blocked by referencing rows"
                );
                obj.set_fk_conflicts(remaining);
                return Ok(false);
            }
            obj.set_fk_conflicts(Vec::new());
            tracing::debug!(entity = obj.entity_name(), resolved = found, "Conflicts resolved");

            if !hooks.pre_delete(obj, tx)? {
                tracing::debug!(entity = obj.entity_name(), "pre_delete declined");
                return Ok(false);
            }
            let (table, predicate) = self.key_target(obj)?;
            let request = DeleteRequest { table, predicate };
            self.trace_delete(&request);
            tx.delete(&request)?;
            tracing::info!(
                entity = obj.entity_name(),
                primary_key = ?obj.primary_key(),
                "Deleted row"
            );
            if !hooks.post_delete(obj, tx)? {
                tracing::debug!(entity = obj.entity_name(), "post_delete declined");
                return Ok(false);
            }
            Ok(true)
        })?;

        if deleted {
            obj.mark_deleted();
        }
        Ok(deleted)
    }

    pub fn save_typed<E: Entity>(
        &self,
        entity: &mut E,
        tx: Option<&mut dyn Transaction>,
    ) -> Result<bool> {
        self.save(entity.object_mut(), tx)
    }

    pub fn delete_typed<E: Entity>(
        &self,
        entity: &mut E,
        tx: Option<&mut dyn Transaction>,
    ) -> Result<bool> {
        self.delete(entity.object_mut(), tx)
    }
}
