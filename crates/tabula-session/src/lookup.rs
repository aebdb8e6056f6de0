//! Point lookups and row hydration.
//!
//! A read-only lookup loads exactly the requested paths and marks them
//! retrieved; reading anything else fails. An editable lookup loads every
//! root field and, read-only, whatever related paths were asked for.

use tabula_core::{
    Condition, Connection, DataObject, Entity, Error, RelationshipInfo, Result, Row,
    SchemaRegistry, Transaction, Value, split_path,
};
use tabula_query::{SelectPlan, SelectPlanner};

use crate::context::DataContext;

fn column<'r>(row: &'r Row, alias: &str) -> Result<&'r Value> {
    row.get(alias)
        .ok_or_else(|| Error::Backend(format!("result row has no column '{alias}'")))
}

fn is_within(prefix: &str, ancestor: &str) -> bool {
    prefix
        .strip_prefix(ancestor)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

/// Walk to the instance at `prefix`, creating read-only related slots on
/// the way.
fn navigate<'o>(
    registry: &SchemaRegistry,
    obj: &'o mut DataObject,
    prefix: &str,
) -> Result<&'o mut DataObject> {
    let mut target = obj;
    for segment in prefix.split('.').filter(|s| !s.is_empty()) {
        target = target.hydrate_related(registry, segment)?;
    }
    Ok(target)
}

/// Copy one result row into `obj` following the plan.
///
/// A joined prefix whose primary key came back NULL had no related row; its
/// slot is recorded as absent and nothing below it is hydrated.
pub(crate) fn hydrate_row(
    registry: &SchemaRegistry,
    plan: &SelectPlan,
    row: &Row,
    obj: &mut DataObject,
) -> Result<()> {
    let root = obj.entity_name();
    let mut absent: Vec<&str> = Vec::new();

    for prefix in plan.prefixes() {
        if absent.iter().any(|a| is_within(prefix, a)) {
            continue;
        }
        let rel = registry.resolve_relationship(root, prefix)?;
        let key = registry.lookup(rel.related_entity)?.primary_key().name;
        let alias = plan
            .aliases
            .column_alias(prefix, key)
            .ok_or_else(|| Error::unknown_path(root, prefix))?;
        if column(row, &alias)?.is_null() {
            let (parent, name) = split_path(prefix);
            navigate(registry, obj, parent)?.mark_related_absent(name)?;
            absent.push(prefix);
        }
    }

    for field in &plan.fields {
        if absent.iter().any(|a| is_within(&field.prefix, a)) {
            continue;
        }
        let value = column(row, &field.column_alias)?.clone();
        navigate(registry, obj, &field.prefix)?.hydrate_field(field.field, value)?;
    }
    Ok(())
}

/// Build a loaded instance of `entity` from one result row.
pub(crate) fn materialize(
    registry: &SchemaRegistry,
    entity: &str,
    plan: &SelectPlan,
    row: &Row,
    editable: bool,
) -> Result<DataObject> {
    let mut obj = registry.create(entity)?;
    obj.mark_loaded();
    if !editable {
        obj.mark_read_only();
    }
    hydrate_row(registry, plan, row, &mut obj)?;
    Ok(obj)
}

impl<C: Connection> DataContext<C> {
    pub(crate) fn fetch_one(
        &self,
        tx: &mut dyn Transaction,
        entity: &str,
        plan: &SelectPlan,
        editable: bool,
    ) -> Result<Option<DataObject>> {
        self.trace_select(&plan.request);
        let mut cursor = tx.select(&plan.request)?;
        match cursor.next().transpose()? {
            Some(row) => materialize(self.registry(), entity, plan, &row, editable).map(Some),
            None => Ok(None),
        }
    }

    /// Read-only fetch of the row a relationship points at, with every
    /// root field of the related entity plus `paths` below it.
    pub(crate) fn fetch_related(
        &self,
        tx: &mut dyn Transaction,
        rel: &RelationshipInfo,
        key: &Value,
        paths: &[String],
    ) -> Result<Option<DataObject>> {
        if key.is_null() {
            return Ok(None);
        }
        let key_field = self.registry().related_key(rel)?.name;
        let plan = SelectPlanner::new(self.registry(), rel.related_entity)?
            .style(self.alias_style())
            .root_fields()
            .select_all(paths.iter().cloned())
            .filter(Condition::eq(key_field, key.clone()))
            .plan()?;
        self.fetch_one(tx, rel.related_entity, &plan, false)
    }

    /// Load a read-only instance with exactly `paths` retrieved.
    ///
    /// The primary key is always retrieved. Paths may cross relationships
    /// (`"Country.Name"`); a path ending in a relationship loads every field
    /// of the related entity. Returns `Ok(None)` if no row has the key.
    #[tracing::instrument(level = "debug", skip(self, paths, tx))]
    pub fn get_read_only(
        &self,
        entity: &str,
        primary_key: i64,
        paths: &[&str],
        tx: Option<&mut dyn Transaction>,
    ) -> Result<Option<DataObject>> {
        let plan = SelectPlanner::new(self.registry(), entity)?
            .style(self.alias_style())
            .select_all(paths.iter().copied())
            .primary_key(primary_key)
            .plan()?;
        let found = self.with_read(tx, |tx| self.fetch_one(tx, entity, &plan, false))?;
        tracing::debug!(entity, primary_key, found = found.is_some(), "Read-only lookup");
        Ok(found)
    }

    /// Load an editable instance with every root field, plus read-only
    /// related instances for `read_only_paths`.
    #[tracing::instrument(level = "debug", skip(self, read_only_paths, tx))]
    pub fn get_editable(
        &self,
        entity: &str,
        primary_key: i64,
        read_only_paths: &[&str],
        tx: Option<&mut dyn Transaction>,
    ) -> Result<Option<DataObject>> {
        let plan = SelectPlanner::new(self.registry(), entity)?
            .style(self.alias_style())
            .root_fields()
            .select_all(read_only_paths.iter().copied())
            .primary_key(primary_key)
            .plan()?;
        let found = self.with_read(tx, |tx| self.fetch_one(tx, entity, &plan, true))?;
        tracing::debug!(entity, primary_key, found = found.is_some(), "Editable lookup");
        Ok(found)
    }

    pub fn get_read_only_typed<E: Entity>(
        &self,
        primary_key: i64,
        paths: &[&str],
        tx: Option<&mut dyn Transaction>,
    ) -> Result<Option<E>> {
        self.get_read_only(E::ENTITY, primary_key, paths, tx)?
            .map(E::from_object)
            .transpose()
    }

    pub fn get_editable_typed<E: Entity>(
        &self,
        primary_key: i64,
        read_only_paths: &[&str],
        tx: Option<&mut dyn Transaction>,
    ) -> Result<Option<E>> {
        self.get_editable(E::ENTITY, primary_key, read_only_paths, tx)?
            .map(E::from_object)
            .transpose()
    }

    /// Fill a relationship slot on first use.
    ///
    /// The related row is fetched read-only through the FK value, at most
    /// once; later calls return the cached instance. A NULL FK leaves the
    /// slot empty.
    #[tracing::instrument(level = "debug", skip(self, obj, tx), fields(entity = obj.entity_name()))]
    pub fn load_related<'o>(
        &self,
        obj: &'o mut DataObject,
        name: &str,
        tx: Option<&mut dyn Transaction>,
    ) -> Result<Option<&'o DataObject>> {
        if !obj.is_retrieved(name) {
            let rel = *obj
                .entity()
                .relationship(name)
                .ok_or_else(|| Error::unknown_path(obj.entity_name(), name))?;
            let key = obj.get(rel.foreign_key)?.clone();
            let related = self.with_read(tx, |tx| self.fetch_related(tx, &rel, &key, &[]))?;
            match related {
                Some(related) => obj.attach_related(name, related)?,
                None => obj.mark_related_absent(name)?,
            }
        }
        obj.related(name)
    }
}
