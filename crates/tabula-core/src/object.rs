//! Entity instances.
//!
//! A [`DataObject`] is the in-memory projection of one row. It carries the
//! lifecycle flags that decide what callers may do with it:
//!
//! | State            | editable | insert | how it is obtained                |
//! |------------------|----------|--------|-----------------------------------|
//! | New              | yes      | yes    | [`EntityType::new_object`]        |
//! | Loaded-Editable  | yes      | no     | editable lookup or search         |
//! | Loaded-Read-Only | no       | no     | read-only lookup                  |
//! | Deleted          | -        | -      | successful delete (terminal)      |
//!
//! Reads on a read-only instance are limited to the retrieved set; every
//! write on a read-only or deleted instance fails with
//! [`Error::NotEditable`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{Error, Errors, Result};
use crate::relationship::{FkConstraintConflict, RelationshipInfo};
use crate::schema::{EntityType, SchemaRegistry};
use crate::value::{FromValue, Value};

/// One entity instance.
#[derive(Debug, Clone)]
pub struct DataObject {
    entity: Arc<EntityType>,
    editable: bool,
    insert: bool,
    deleted: bool,
    values: Vec<Value>,
    related: BTreeMap<&'static str, DataObject>,
    retrieved: BTreeSet<&'static str>,
    errors: Errors,
    fk_conflicts: Vec<FkConstraintConflict>,
}

impl DataObject {
    /// Create a new, editable instance that has not been inserted yet.
    pub fn new(entity: Arc<EntityType>) -> Self {
        let values = vec![Value::Null; entity.fields().len()];
        Self {
            entity,
            editable: true,
            insert: true,
            deleted: false,
            values,
            related: BTreeMap::new(),
            retrieved: BTreeSet::new(),
            errors: Errors::new(),
            fk_conflicts: Vec::new(),
        }
    }

    pub fn entity(&self) -> &Arc<EntityType> {
        &self.entity
    }

    pub fn entity_name(&self) -> &'static str {
        self.entity.name()
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    /// Whether the next save inserts a row.
    pub fn is_insert(&self) -> bool {
        self.insert
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Generated primary key, once assigned.
    pub fn primary_key(&self) -> Option<i64> {
        let pk = self.entity.primary_key().name;
        self.raw_field(pk).and_then(Value::as_i64)
    }

    /// Names of fields and relationships loaded on this instance.
    pub fn retrieved(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.retrieved.iter().copied()
    }

    /// Whether a dotted path has been loaded, following cached related instances.
    pub fn is_retrieved(&self, path: &str) -> bool {
        match path.split_once('.') {
            None => self.retrieved.contains(path),
            Some((head, rest)) => {
                self.retrieved.contains(head)
                    && self.related.get(head).is_some_and(|r| r.is_retrieved(rest))
            }
        }
    }

    pub fn errors(&self) -> &Errors {
        &self.errors
    }

    pub fn errors_mut(&mut self) -> &mut Errors {
        &mut self.errors
    }

    /// Rows that blocked the last delete.
    pub fn fk_conflicts(&self) -> &[FkConstraintConflict] {
        &self.fk_conflicts
    }

    fn field_index(&self, name: &str) -> Result<usize> {
        self.entity
            .field_index(name)
            .ok_or_else(|| Error::unknown_path(self.entity_name(), name))
    }

    fn relationship_info(&self, name: &str) -> Result<RelationshipInfo> {
        self.entity
            .relationship(name)
            .copied()
            .ok_or_else(|| Error::unknown_path(self.entity_name(), name))
    }

    fn check_readable(&self, name: &str) -> Result<()> {
        if self.editable || self.retrieved.contains(name) {
            Ok(())
        } else {
            Err(Error::FieldNotRetrieved {
                entity: self.entity_name().to_string(),
                field: name.to_string(),
            })
        }
    }

    /// Fails unless writes are currently allowed.
    pub fn check_editable(&self) -> Result<()> {
        if self.deleted {
            Err(Error::not_editable(self.entity_name(), "instance has been deleted"))
        } else if !self.editable {
            Err(Error::not_editable(self.entity_name(), "instance is read-only"))
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Guarded access
    // ========================================================================

    /// Read a field.
    pub fn get(&self, name: &str) -> Result<&Value> {
        let idx = self.field_index(name)?;
        self.check_readable(name)?;
        Ok(&self.values[idx])
    }

    /// Read a field and convert it.
    pub fn get_as<T: FromValue>(&self, name: &str) -> Result<T> {
        T::from_value(self.get(name)?)
    }

    /// Write a field.
    ///
    /// Changing a FK field drops a cached related instance that no longer
    /// matches it.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let idx = self.field_index(name)?;
        self.check_editable()?;
        let field = self.entity.fields()[idx];
        if field.primary_key {
            return Err(Error::not_editable(
                self.entity_name(),
                format!("primary key '{name}' is immutable"),
            ));
        }
        if !field.field_type.accepts(&value) {
            return Err(Error::TypeMismatch {
                expected: field.field_type.name().to_string(),
                found: value.type_name().to_string(),
            });
        }

        let stale: Vec<&'static str> = self
            .entity
            .relationships()
            .iter()
            .filter(|rel| rel.foreign_key == field.name)
            .filter(|rel| {
                self.related
                    .get(rel.name)
                    .is_some_and(|obj| related_key_value(rel, obj) != Some(&value))
            })
            .map(|rel| rel.name)
            .collect();
        for name in stale {
            self.related.remove(name);
            self.retrieved.remove(name);
        }

        self.values[idx] = value;
        Ok(())
    }

    /// The cached related instance for a relationship.
    ///
    /// `Ok(None)` means nothing has been loaded or attached yet.
    pub fn related(&self, name: &str) -> Result<Option<&DataObject>> {
        self.relationship_info(name)?;
        self.check_readable(name)?;
        Ok(self.related.get(name))
    }

    /// Attach a related instance and copy its key into the FK field.
    pub fn set_related(&mut self, name: &str, related: DataObject) -> Result<()> {
        let rel = self.relationship_info(name)?;
        self.check_editable()?;
        if related.entity_name() != rel.related_entity {
            return Err(Error::TypeMismatch {
                expected: rel.related_entity.to_string(),
                found: related.entity_name().to_string(),
            });
        }
        let key = related_key_value(&rel, &related).cloned().unwrap_or_default();
        let idx = self.field_index(rel.foreign_key)?;
        self.values[idx] = key;
        self.related.insert(rel.name, related);
        self.retrieved.insert(rel.name);
        Ok(())
    }

    /// Copy every field except the primary key into another instance of the
    /// same entity type.
    ///
    /// `dest` must be editable. When `self` is read-only, fields it did not
    /// retrieve are skipped rather than failing with
    /// [`Error::FieldNotRetrieved`]: `dest` keeps its own values for them and
    /// only the retrieved fields are copied over. This is how a partial
    /// read-only instance is laid over a freshly loaded editable one.
    pub fn copy_to(&self, dest: &mut DataObject) -> Result<()> {
        if dest.entity_name() != self.entity_name() {
            return Err(Error::TypeMismatch {
                expected: self.entity_name().to_string(),
                found: dest.entity_name().to_string(),
            });
        }
        dest.check_editable()?;
        for (idx, field) in self.entity.fields().iter().enumerate() {
            if field.primary_key || self.check_readable(field.name).is_err() {
                continue;
            }
            dest.values[idx] = self.values[idx].clone();
            dest.retrieved.insert(field.name);
        }
        Ok(())
    }

    // ========================================================================
    // Loader API
    // ========================================================================

    /// Unguarded field read.
    #[doc(hidden)]
    pub fn raw_field(&self, name: &str) -> Option<&Value> {
        self.entity.field_index(name).map(|idx| &self.values[idx])
    }

    /// Store a fetched field value and mark it retrieved.
    #[doc(hidden)]
    pub fn hydrate_field(&mut self, name: &str, value: Value) -> Result<()> {
        let idx = self.field_index(name)?;
        let field = self.entity.fields()[idx].name;
        self.values[idx] = value;
        self.retrieved.insert(field);
        Ok(())
    }

    /// The related slot for a relationship, created read-only if empty, and
    /// marked retrieved.
    #[doc(hidden)]
    pub fn hydrate_related(
        &mut self,
        registry: &SchemaRegistry,
        name: &str,
    ) -> Result<&mut DataObject> {
        let rel = self.relationship_info(name)?;
        if !self.related.contains_key(rel.name) {
            let mut related = registry.create(rel.related_entity)?;
            related.mark_loaded();
            related.mark_read_only();
            self.related.insert(rel.name, related);
        }
        self.retrieved.insert(rel.name);
        self.related
            .get_mut(rel.name)
            .ok_or_else(|| Error::unknown_path(self.entity.name(), name))
    }

    /// Place an already fetched instance in a related slot and mark it retrieved.
    #[doc(hidden)]
    pub fn attach_related(&mut self, name: &str, related: DataObject) -> Result<()> {
        let rel = self.relationship_info(name)?;
        self.related.insert(rel.name, related);
        self.retrieved.insert(rel.name);
        Ok(())
    }

    /// Record that a relationship was requested but no related row exists.
    #[doc(hidden)]
    pub fn mark_related_absent(&mut self, name: &str) -> Result<()> {
        let rel = self.relationship_info(name)?;
        self.related.remove(rel.name);
        self.retrieved.insert(rel.name);
        Ok(())
    }

    /// Record the generated key after an insert.
    #[doc(hidden)]
    pub fn mark_persisted(&mut self, primary_key: i64) {
        let pk = self.entity.primary_key().name;
        for field in self.entity.fields() {
            self.retrieved.insert(field.name);
        }
        if let Some(idx) = self.entity.field_index(pk) {
            self.values[idx] = Value::BigInt(primary_key);
        }
        self.insert = false;
    }

    #[doc(hidden)]
    pub fn mark_loaded(&mut self) {
        self.insert = false;
    }

    #[doc(hidden)]
    pub fn mark_read_only(&mut self) {
        self.editable = false;
    }

    #[doc(hidden)]
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    #[doc(hidden)]
    pub fn set_fk_conflicts(&mut self, conflicts: Vec<FkConstraintConflict>) {
        self.fk_conflicts = conflicts;
    }
}

fn related_key_value<'a>(rel: &RelationshipInfo, related: &'a DataObject) -> Option<&'a Value> {
    let key = rel
        .related_key
        .unwrap_or_else(|| related.entity.primary_key().name);
    related.raw_field(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldInfo;
    use crate::relationship::RelationshipInfo;
    use crate::schema::EntityBuilder;
    use crate::types::FieldType;

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                EntityBuilder::new("Country", "dbo", "Country")
                    .field(FieldInfo::key("CountryID"))
                    .field(FieldInfo::new("Name", FieldType::NVarChar).size(30))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                EntityBuilder::new("City", "dbo", "City")
                    .field(FieldInfo::key("CityID"))
                    .field(FieldInfo::new("CountryID", FieldType::BigInt))
                    .field(FieldInfo::new("Name", FieldType::NVarChar).size(30))
                    .relationship(RelationshipInfo::new("Country", "Country"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_new_instance_state() {
        let registry = registry();
        let mut city = registry.create("City").unwrap();
        assert!(city.is_editable());
        assert!(city.is_insert());
        assert_eq!(city.retrieved().count(), 0);
        assert_eq!(city.primary_key(), None);

        city.set("Name", "Toronto").unwrap();
        assert_eq!(city.get_as::<String>("Name").unwrap(), "Toronto");
        assert!(city.get("Name").is_ok());
    }

    #[test]
    fn test_primary_key_is_immutable() {
        let registry = registry();
        let mut city = registry.create("City").unwrap();
        assert!(matches!(
            city.set("CityID", 5_i64),
            Err(Error::NotEditable { .. })
        ));
        city.mark_persisted(7);
        assert_eq!(city.primary_key(), Some(7));
        assert!(!city.is_insert());
        assert!(matches!(
            city.set("CityID", 8_i64),
            Err(Error::NotEditable { .. })
        ));
    }

    #[test]
    fn test_set_type_mismatch_and_unknown_field() {
        let registry = registry();
        let mut city = registry.create("City").unwrap();
        assert!(matches!(
            city.set("Name", 12_i64),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(
            city.set("Population", 1_i64).unwrap_err(),
            Error::unknown_path("City", "Population")
        );
    }

    #[test]
    fn test_read_only_guards() {
        let registry = registry();
        let mut city = registry.create("City").unwrap();
        city.mark_loaded();
        city.mark_read_only();
        city.hydrate_field("CityID", Value::BigInt(1)).unwrap();

        assert!(matches!(
            city.get("Name"),
            Err(Error::FieldNotRetrieved { ref field, .. }) if field == "Name"
        ));
        assert!(matches!(city.set("Name", "x"), Err(Error::NotEditable { .. })));
        assert!(matches!(
            city.related("Country"),
            Err(Error::FieldNotRetrieved { .. })
        ));

        city.hydrate_field("Name", Value::from("Toronto")).unwrap();
        assert_eq!(city.get("Name").unwrap(), &Value::from("Toronto"));
    }

    #[test]
    fn test_hydrate_related_marks_paths() {
        let registry = registry();
        let mut city = registry.create("City").unwrap();
        city.mark_loaded();
        city.mark_read_only();
        city.hydrate_related(&registry, "Country")
            .unwrap()
            .hydrate_field("Name", Value::from("Canada"))
            .unwrap();

        assert!(city.is_retrieved("Country"));
        assert!(city.is_retrieved("Country.Name"));
        assert!(!city.is_retrieved("Country.CountryID"));
        let country = city.related("Country").unwrap().unwrap();
        assert!(!country.is_editable());
        assert_eq!(country.get("Name").unwrap(), &Value::from("Canada"));
    }

    #[test]
    fn test_set_related_and_stale_fk() {
        let registry = registry();
        let mut country = registry.create("Country").unwrap();
        country.mark_persisted(3);
        let mut city = registry.create("City").unwrap();
        city.set_related("Country", country.clone()).unwrap();
        assert_eq!(city.get("CountryID").unwrap(), &Value::BigInt(3));
        assert!(city.related("Country").unwrap().is_some());

        city.set("CountryID", 3_i64).unwrap();
        assert!(city.related("Country").unwrap().is_some());
        city.set("CountryID", 4_i64).unwrap();
        assert!(city.related("Country").unwrap().is_none());

        let other = registry.create("City").unwrap();
        assert!(matches!(
            city.set_related("Country", other),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_deleted_is_terminal() {
        let registry = registry();
        let mut city = registry.create("City").unwrap();
        city.mark_persisted(1);
        city.mark_deleted();
        assert!(matches!(
            city.set("Name", "x"),
            Err(Error::NotEditable { ref reason, .. }) if reason.contains("deleted")
        ));
        assert!(city.check_editable().is_err());
    }

    #[test]
    fn test_copy_to() {
        let registry = registry();
        let mut source = registry.create("City").unwrap();
        source.mark_persisted(10);
        source.set("Name", "Ottawa").unwrap();
        source.set("CountryID", 2_i64).unwrap();

        let mut dest = registry.create("City").unwrap();
        source.copy_to(&mut dest).unwrap();
        assert_eq!(dest.get("Name").unwrap(), &Value::from("Ottawa"));
        assert_eq!(dest.get("CountryID").unwrap(), &Value::BigInt(2));
        assert_eq!(dest.primary_key(), None);

        let mut wrong = registry.create("Country").unwrap();
        assert!(matches!(
            source.copy_to(&mut wrong),
            Err(Error::TypeMismatch { .. })
        ));

        let mut partial = registry.create("City").unwrap();
        partial.mark_loaded();
        partial.mark_read_only();
        partial.hydrate_field("CityID", Value::BigInt(10)).unwrap();
        partial.hydrate_field("Name", Value::from("Bytown")).unwrap();
        partial.copy_to(&mut dest).unwrap();
        assert_eq!(dest.get("Name").unwrap(), &Value::from("Bytown"));
        assert_eq!(dest.get("CountryID").unwrap(), &Value::BigInt(2));

        let mut locked = registry.create("City").unwrap();
        locked.mark_read_only();
        assert!(matches!(
            source.copy_to(&mut locked),
            Err(Error::NotEditable { .. })
        ));
    }
}
