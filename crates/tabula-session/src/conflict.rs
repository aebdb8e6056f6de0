//! Foreign-key conflict detection and resolution for delete.
//!
//! Every relationship list of the deleted entity names a table whose rows
//! may point back at it. Those rows are collected as conflicts, grouped by
//! entity type and FK field, and resolved in batches: one delete-by-list for
//! auto-delete references, one update-by-list nulling the FK for auto-remove
//! references. A single blocking row stops resolution before anything is
//! written.

use std::collections::BTreeMap;

use tabula_core::{
    ColumnRef, Condition, ConflictAction, Connection, DataObject, DeleteRequest, Error,
    FkConstraintConflict, Predicate, Result, TableRef, Transaction, UpdateRequest, Value,
};
use tabula_query::{AliasMap, SelectPlanner};

use crate::context::DataContext;

#[derive(Debug, Default)]
struct Batch {
    delete: Vec<Value>,
    remove: Vec<Value>,
}

impl<C: Connection> DataContext<C> {
    /// Rows of other entities whose FK references `obj`.
    pub(crate) fn find_conflicts(
        &self,
        obj: &DataObject,
        tx: &mut dyn Transaction,
    ) -> Result<Vec<FkConstraintConflict>> {
        let Some(primary_key) = obj.primary_key() else {
            return Ok(Vec::new());
        };
        let mut conflicts = Vec::new();
        for list in obj.entity().relationship_lists() {
            let related = self.registry().lookup(list.related_entity)?;
            let key = related.primary_key().name;
            let plan = SelectPlanner::new(self.registry(), related.name())?
                .style(self.alias_style())
                .select(key)
                .filter(Condition::eq(list.foreign_key_name, primary_key))
                .plan()?;
            let key_alias = plan
                .aliases
                .column_alias("", key)
                .ok_or_else(|| Error::unknown_path(related.name(), key))?;

            self.trace_select(&plan.request);
            for row in tx.select(&plan.request)? {
                let row = row?;
                let foreign_key = row
                    .get(&key_alias)
                    .and_then(Value::as_i64)
                    .ok_or_else(|| {
                        Error::Backend(format!("result row has no key column '{key_alias}'"))
                    })?;
                conflicts.push(FkConstraintConflict {
                    conflict_entity: related.name().to_string(),
                    foreign_key,
                    foreign_key_name: list.foreign_key_name.to_string(),
                    action: list.action(),
                });
            }
        }
        Ok(conflicts)
    }

    /// Apply auto-delete and auto-remove actions in batches and return the
    /// conflicts that still block the delete.
    ///
    /// When any conflict blocks, nothing is written and only the blocking
    /// conflicts are returned.
    pub(crate) fn resolve_conflicts(
        &self,
        conflicts: Vec<FkConstraintConflict>,
        tx: &mut dyn Transaction,
    ) -> Result<Vec<FkConstraintConflict>> {
        let (blocking, resolvable): (Vec<_>, Vec<_>) = conflicts
            .into_iter()
            .partition(|conflict| conflict.action == ConflictAction::Conflict);
        if !blocking.is_empty() {
            return Ok(blocking);
        }

        let mut groups: BTreeMap<String, BTreeMap<String, Batch>> = BTreeMap::new();
        for conflict in resolvable {
            let batch = groups
                .entry(conflict.conflict_entity.clone())
                .or_default()
                .entry(conflict.foreign_key_name.clone())
                .or_default();
            let key = Value::BigInt(conflict.foreign_key);
            if conflict.action == ConflictAction::AutoDeleteReference {
                batch.delete.push(key);
            } else {
                batch.remove.push(key);
            }
        }

        let alias = AliasMap::new(self.alias_style()).root().to_string();
        for (entity, by_field) in groups {
            let entity = self.registry().lookup(&entity)?;
            let table = TableRef {
                table: entity.table(),
                alias: alias.clone(),
            };
            let key = ColumnRef::new(table.alias.clone(), entity.primary_key().name);

            for (field, batch) in by_field {
                if !batch.delete.is_empty() {
                    let count = batch.delete.len();
                    let request = DeleteRequest {
                        table: table.clone(),
                        predicate: Predicate::in_list(key.clone(), batch.delete),
                    };
                    self.trace_delete(&request);
                    let deleted = tx.delete(&request)?;
                    tracing::info!(
                        entity = entity.name(),
                        foreign_key = %field,
                        requested = count,
                        deleted,
                        "Deleted referencing rows"
                    );
                }
                if !batch.remove.is_empty() {
                    let count = batch.remove.len();
                    let request = UpdateRequest {
                        table: table.clone(),
                        values: vec![(field.clone(), Value::Null)],
                        predicate: Predicate::in_list(key.clone(), batch.remove),
                    };
                    self.trace_update(&request);
                    let updated = tx.update(&request)?;
                    tracing::info!(
                        entity = entity.name(),
                        foreign_key = %field,
                        requested = count,
                        updated,
                        "Detached referencing rows"
                    );
                }
            }
        }
        Ok(Vec::new())
    }
}
