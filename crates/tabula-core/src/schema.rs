//! Schema registry.
//!
//! Every entity type is described once by an [`EntityType`] and registered
//! explicitly in a [`SchemaRegistry`] before any query is issued. The registry
//! is a plain value: it is built at startup, shared behind an `Arc`, and never
//! populated lazily.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::field::FieldInfo;
use crate::object::DataObject;
use crate::relationship::{RelationshipInfo, RelationshipListInfo};
use crate::types::FieldType;

/// Schema-qualified table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableIdentity {
    pub schema: &'static str,
    pub name: &'static str,
}

impl TableIdentity {
    pub const fn new(schema: &'static str, name: &'static str) -> Self {
        Self { schema, name }
    }
}

impl fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

// ============================================================================
// Entity Type
// ============================================================================

/// Descriptor of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityType {
    name: &'static str,
    table: TableIdentity,
    fields: Vec<FieldInfo>,
    #[serde(skip)]
    primary_key: usize,
    relationships: Vec<RelationshipInfo>,
    relationship_lists: Vec<RelationshipListInfo>,
}

impl EntityType {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn table(&self) -> TableIdentity {
        self.table
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn primary_key(&self) -> &FieldInfo {
        &self.fields[self.primary_key]
    }

    pub fn relationships(&self) -> &[RelationshipInfo] {
        &self.relationships
    }

    pub fn relationship_lists(&self) -> &[RelationshipListInfo] {
        &self.relationship_lists
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Position of a field in [`fields`](Self::fields).
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipInfo> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn relationship_list(&self, name: &str) -> Option<&RelationshipListInfo> {
        self.relationship_lists.iter().find(|r| r.name == name)
    }

    /// Construct a new, editable, not-yet-inserted instance.
    pub fn new_object(self: &Arc<Self>) -> DataObject {
        DataObject::new(Arc::clone(self))
    }
}

/// Builder for [`EntityType`].
#[derive(Debug, Clone)]
pub struct EntityBuilder {
    name: &'static str,
    table: TableIdentity,
    fields: Vec<FieldInfo>,
    relationships: Vec<RelationshipInfo>,
    relationship_lists: Vec<RelationshipListInfo>,
}

impl EntityBuilder {
    pub fn new(name: &'static str, schema: &'static str, table: &'static str) -> Self {
        Self {
            name,
            table: TableIdentity::new(schema, table),
            fields: Vec::new(),
            relationships: Vec::new(),
            relationship_lists: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field.owned_by(self.name));
        self
    }

    pub fn relationship(mut self, relationship: RelationshipInfo) -> Self {
        self.relationships.push(relationship.owned_by(self.name));
        self
    }

    pub fn relationship_list(mut self, list: RelationshipListInfo) -> Self {
        self.relationship_lists.push(list.owned_by(self.name));
        self
    }

    /// Check the declaration and produce the descriptor.
    ///
    /// Fails with [`Error::Schema`] when a name is declared twice, when there
    /// is not exactly one BIGINT primary key, or when a relationship's FK
    /// field is not one of the declared fields.
    pub fn build(mut self) -> Result<EntityType> {
        let entity = self.name;
        let mut names = BTreeSet::new();
        let declared = self
            .fields
            .iter()
            .map(|f| f.name)
            .chain(self.relationships.iter().map(|r| r.name))
            .chain(self.relationship_lists.iter().map(|r| r.name));
        for name in declared {
            if !names.insert(name) {
                return Err(Error::Schema(format!("{entity}: '{name}' is declared twice")));
            }
        }

        let keys: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.primary_key)
            .map(|(i, _)| i)
            .collect();
        let primary_key = match keys.as_slice() {
            [single] => *single,
            [] => return Err(Error::Schema(format!("{entity}: no primary key declared"))),
            _ => {
                return Err(Error::Schema(format!(
                    "{entity}: more than one primary key declared"
                )));
            }
        };
        if self.fields[primary_key].field_type != FieldType::BigInt {
            return Err(Error::Schema(format!(
                "{entity}: primary key '{}' must be BIGINT",
                self.fields[primary_key].name
            )));
        }

        for rel in &mut self.relationships {
            if rel.foreign_key.is_empty() {
                let default = format!("{}ID", rel.name);
                let field = self.fields.iter().find(|f| f.name == default).ok_or_else(|| {
                    Error::Schema(format!(
                        "{entity}: relationship '{}' has no foreign key field '{default}'",
                        rel.name
                    ))
                })?;
                rel.foreign_key = field.name;
            } else if !self.fields.iter().any(|f| f.name == rel.foreign_key) {
                return Err(Error::Schema(format!(
                    "{entity}: relationship '{}' has no foreign key field '{}'",
                    rel.name, rel.foreign_key
                )));
            }
        }

        Ok(EntityType {
            name: self.name,
            table: self.table,
            fields: self.fields,
            primary_key,
            relationships: self.relationships,
            relationship_lists: self.relationship_lists,
        })
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Split a dotted path into its relationship prefix and final segment.
///
/// `"Country.Name"` gives `("Country", "Name")`; `"Name"` gives `("", "Name")`.
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('.') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// The set of registered entity types.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entities: BTreeMap<&'static str, Arc<EntityType>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type.
    ///
    /// Registering a descriptor identical to the one already present is a
    /// no-op; a different descriptor under the same name fails with
    /// [`Error::DuplicateEntity`].
    #[tracing::instrument(level = "debug", skip(self, entity), fields(entity = entity.name()))]
    pub fn register(&mut self, entity: EntityType) -> Result<Arc<EntityType>> {
        if let Some(existing) = self.entities.get(entity.name) {
            if **existing == entity {
                tracing::debug!("Entity already registered");
                return Ok(Arc::clone(existing));
            }
            return Err(Error::DuplicateEntity(entity.name.to_string()));
        }

        tracing::info!(
            entity = entity.name,
            table = %entity.table,
            fields = entity.fields.len(),
            "Registering entity"
        );
        let entity = Arc::new(entity);
        self.entities.insert(entity.name, Arc::clone(&entity));
        Ok(entity)
    }

    /// Build and register a typed entity's descriptor.
    pub fn register_entity<E: Entity>(&mut self) -> Result<Arc<EntityType>> {
        self.register(E::describe().build()?)
    }

    pub fn lookup(&self, name: &str) -> Result<&Arc<EntityType>> {
        self.entities
            .get(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntityType>> {
        self.entities.values()
    }

    /// Construct a new instance of a registered entity.
    pub fn create(&self, name: &str) -> Result<DataObject> {
        Ok(self.lookup(name)?.new_object())
    }

    /// Follow a relationship prefix (possibly empty) from `entity`.
    fn walk<'a>(&'a self, entity: &'a Arc<EntityType>, prefix: &str, path: &str) -> Result<&'a Arc<EntityType>> {
        let mut current = entity;
        if prefix.is_empty() {
            return Ok(current);
        }
        for segment in prefix.split('.') {
            let rel = current
                .relationship(segment)
                .ok_or_else(|| Error::unknown_path(entity.name, path))?;
            current = self.lookup(rel.related_entity)?;
        }
        Ok(current)
    }

    /// The entity type owning the final segment of `path`.
    pub fn resolve_owner(&self, entity: &str, path: &str) -> Result<&Arc<EntityType>> {
        let root = self.lookup(entity)?;
        if path.is_empty() {
            return Err(Error::unknown_path(entity, path));
        }
        let (prefix, _) = split_path(path);
        self.walk(root, prefix, path)
    }

    pub fn resolve_field(&self, entity: &str, path: &str) -> Result<&FieldInfo> {
        let (_, last) = split_path(path);
        self.resolve_owner(entity, path)?
            .field(last)
            .ok_or_else(|| Error::unknown_path(entity, path))
    }

    pub fn resolve_relationship(&self, entity: &str, path: &str) -> Result<&RelationshipInfo> {
        let (_, last) = split_path(path);
        self.resolve_owner(entity, path)?
            .relationship(last)
            .ok_or_else(|| Error::unknown_path(entity, path))
    }

    pub fn resolve_relationship_list(
        &self,
        entity: &str,
        path: &str,
    ) -> Result<&RelationshipListInfo> {
        let (_, last) = split_path(path);
        self.resolve_owner(entity, path)?
            .relationship_list(last)
            .ok_or_else(|| Error::unknown_path(entity, path))
    }

    /// The field on the related entity that a relationship joins against.
    pub fn related_key(&self, rel: &RelationshipInfo) -> Result<&FieldInfo> {
        let related = self.lookup(rel.related_entity)?;
        match rel.related_key {
            None => Ok(related.primary_key()),
            Some(key) => related.field(key).ok_or_else(|| {
                Error::Schema(format!(
                    "{}.{}: related key '{key}' not found on {}",
                    rel.owner, rel.name, rel.related_entity
                ))
            }),
        }
    }

    /// Check that every relationship target is registered and that every
    /// relationship list names an existing FK field on its target.
    pub fn verify(&self) -> Result<()> {
        for entity in self.entities.values() {
            for rel in entity.relationships() {
                self.related_key(rel).map_err(|err| match err {
                    Error::UnknownEntity(name) => Error::Schema(format!(
                        "{}.{}: related entity '{name}' is not registered",
                        entity.name, rel.name
                    )),
                    other => other,
                })?;
            }
            for list in entity.relationship_lists() {
                let related = self.lookup(list.related_entity).map_err(|_| {
                    Error::Schema(format!(
                        "{}.{}: related entity '{}' is not registered",
                        entity.name, list.name, list.related_entity
                    ))
                })?;
                if related.field(list.foreign_key_name).is_none() {
                    return Err(Error::Schema(format!(
                        "{}.{}: '{}' has no field '{}'",
                        entity.name, list.name, list.related_entity, list.foreign_key_name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Dump every registered descriptor as JSON.
    pub fn snapshot(&self) -> Result<serde_json::Value> {
        let entities: Vec<&EntityType> = self.entities.values().map(AsRef::as_ref).collect();
        serde_json::to_value(entities).map_err(|e| Error::Conversion(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn country() -> EntityType {
        EntityBuilder::new("Country", "dbo", "Country")
            .field(FieldInfo::key("CountryID"))
            .field(FieldInfo::new("Name", FieldType::NVarChar).size(30))
            .relationship_list(RelationshipListInfo::new("Cities", "City", "CountryID"))
            .build()
            .unwrap()
    }

    fn city() -> EntityType {
        EntityBuilder::new("City", "dbo", "City")
            .field(FieldInfo::key("CityID"))
            .field(FieldInfo::new("CountryID", FieldType::BigInt))
            .field(FieldInfo::new("Name", FieldType::NVarChar).size(30))
            .relationship(RelationshipInfo::new("Country", "Country"))
            .build()
            .unwrap()
    }

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry.register(country()).unwrap();
        registry.register(city()).unwrap();
        registry
    }

    #[test]
    fn test_register_then_lookup_returns_identical_descriptor() {
        let registry = registry();
        assert_eq!(**registry.lookup("City").unwrap(), city());
        assert_eq!(**registry.lookup("Country").unwrap(), country());
        assert!(matches!(
            registry.lookup("Planet"),
            Err(Error::UnknownEntity(name)) if name == "Planet"
        ));
    }

    #[test]
    fn test_reregistration() {
        let mut registry = registry();
        let again = registry.register(city()).unwrap();
        assert!(Arc::ptr_eq(&again, registry.lookup("City").unwrap()));

        let different = EntityBuilder::new("City", "dbo", "Town")
            .field(FieldInfo::key("CityID"))
            .build()
            .unwrap();
        assert_eq!(
            registry.register(different),
            Err(Error::DuplicateEntity("City".into()))
        );
    }

    #[test]
    fn test_default_foreign_key() {
        let city = city();
        let rel = city.relationship("Country").unwrap();
        assert_eq!(rel.foreign_key, "CountryID");
        assert_eq!(rel.owner, "City");
        assert_eq!(city.primary_key().name, "CityID");
        assert_eq!(city.table().to_string(), "dbo.City");
    }

    #[test]
    fn test_build_rejects_bad_declarations() {
        let no_key = EntityBuilder::new("A", "dbo", "A")
            .field(FieldInfo::new("Name", FieldType::NVarChar))
            .build();
        assert!(matches!(no_key, Err(Error::Schema(_))));

        let twice = EntityBuilder::new("A", "dbo", "A")
            .field(FieldInfo::key("AID"))
            .field(FieldInfo::new("Name", FieldType::NVarChar))
            .relationship_list(RelationshipListInfo::new("Name", "B", "AID"))
            .build();
        assert!(matches!(twice, Err(Error::Schema(_))));

        let missing_fk = EntityBuilder::new("A", "dbo", "A")
            .field(FieldInfo::key("AID"))
            .relationship(RelationshipInfo::new("Owner", "B"))
            .build();
        assert!(matches!(missing_fk, Err(Error::Schema(msg)) if msg.contains("OwnerID")));

        let int_key = EntityBuilder::new("A", "dbo", "A")
            .field(FieldInfo::new("AID", FieldType::Int).primary_key(true))
            .build();
        assert!(matches!(int_key, Err(Error::Schema(_))));
    }

    #[test]
    fn test_resolve_paths() {
        let registry = registry();
        assert_eq!(registry.resolve_field("City", "Name").unwrap().owner, "City");
        assert_eq!(
            registry.resolve_field("City", "Country.Name").unwrap().owner,
            "Country"
        );
        assert_eq!(
            registry.resolve_relationship("City", "Country").unwrap().related_entity,
            "Country"
        );
        assert_eq!(
            registry.resolve_owner("City", "Country.Name").unwrap().name(),
            "Country"
        );
        assert_eq!(
            registry
                .resolve_relationship_list("City", "Country.Cities")
                .unwrap()
                .foreign_key_name,
            "CountryID"
        );
        assert_eq!(
            registry.related_key(registry.resolve_relationship("City", "Country").unwrap())
                .unwrap()
                .name,
            "CountryID"
        );
    }

    #[test]
    fn test_unknown_paths() {
        let registry = registry();
        for path in ["Bogus", "Country.Bogus", "Bogus.Name", "Name.Name", ""] {
            assert_eq!(
                registry.resolve_field("City", path).unwrap_err(),
                Error::unknown_path("City", path),
                "path {path:?}"
            );
        }
    }

    #[test]
    fn test_verify() {
        assert!(registry().verify().is_ok());

        let mut partial = SchemaRegistry::new();
        partial.register(city()).unwrap();
        assert!(matches!(partial.verify(), Err(Error::Schema(msg)) if msg.contains("Country")));

        let mut bad_list = SchemaRegistry::new();
        bad_list.register(city()).unwrap();
        bad_list
            .register(
                EntityBuilder::new("Country", "dbo", "Country")
                    .field(FieldInfo::key("CountryID"))
                    .relationship_list(RelationshipListInfo::new("Cities", "City", "NationID"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        assert!(matches!(bad_list.verify(), Err(Error::Schema(msg)) if msg.contains("NationID")));
    }

    #[test]
    fn test_snapshot() {
        let snapshot = registry().snapshot().unwrap();
        let entities = snapshot.as_array().unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0]["name"], "City");
        assert_eq!(entities[0]["table"]["schema"], "dbo");
        assert_eq!(entities[0]["relationships"][0]["foreign_key"], "CountryID");
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("Country.Name"), ("Country", "Name"));
        assert_eq!(split_path("A.B.C"), ("A.B", "C"));
        assert_eq!(split_path("Name"), ("", "Name"));
    }
}
