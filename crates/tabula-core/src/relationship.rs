//! Relationship descriptors, accessors and foreign-key conflicts.
//!
//! A [`RelationshipInfo`] is the single-valued side of a foreign key: the
//! owner carries the FK column and points at one related row. A
//! [`RelationshipListInfo`] is the inverse collection: rows of another entity
//! whose FK points back at the owner. The list side carries the policy used
//! when the owner is deleted while such rows still exist.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::object::DataObject;

/// A single-valued, FK-backed reference to another entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelationshipInfo {
    /// Relationship name, used as a path segment.
    pub name: &'static str,
    /// Owning entity; filled in by the builder.
    pub owner: &'static str,
    /// Name of the related entity type.
    pub related_entity: &'static str,
    /// Local FK field. Empty until the builder applies the `<Name>ID` default.
    pub foreign_key: &'static str,
    /// Key on the related entity; `None` means its primary key.
    pub related_key: Option<&'static str>,
}

impl RelationshipInfo {
    /// Create a relationship whose FK field defaults to `<name>ID`.
    pub const fn new(name: &'static str, related_entity: &'static str) -> Self {
        Self {
            name,
            owner: "",
            related_entity,
            foreign_key: "",
            related_key: None,
        }
    }

    /// Set the local FK field explicitly.
    pub const fn foreign_key(mut self, field: &'static str) -> Self {
        self.foreign_key = field;
        self
    }

    /// Join against a related field other than the primary key.
    pub const fn related_key(mut self, field: &'static str) -> Self {
        self.related_key = Some(field);
        self
    }

    pub(crate) const fn owned_by(mut self, owner: &'static str) -> Self {
        self.owner = owner;
        self
    }

    /// Read the cached related instance, subject to the retrieval guard.
    pub fn get<'a>(&self, obj: &'a DataObject) -> Result<Option<&'a DataObject>> {
        obj.related(self.name)
    }

    /// Attach a related instance and copy its primary key into the FK field.
    pub fn set(&self, obj: &mut DataObject, related: DataObject) -> Result<()> {
        obj.set_related(self.name, related)
    }
}

/// Resolution applied to a blocking row when its referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictAction {
    /// Delete the referencing row.
    AutoDeleteReference,
    /// Null the referencing row's FK.
    AutoRemoveReference,
    /// Leave it alone and refuse the delete.
    Conflict,
}

/// The inverse, collection side of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelationshipListInfo {
    pub name: &'static str,
    pub owner: &'static str,
    /// Entity type holding the FK.
    pub related_entity: &'static str,
    /// FK field on the related entity that points back at the owner.
    pub foreign_key_name: &'static str,
    pub auto_delete_references: bool,
    pub auto_remove_references: bool,
}

impl RelationshipListInfo {
    pub const fn new(
        name: &'static str,
        related_entity: &'static str,
        foreign_key_name: &'static str,
    ) -> Self {
        Self {
            name,
            owner: "",
            related_entity,
            foreign_key_name,
            auto_delete_references: false,
            auto_remove_references: false,
        }
    }

    /// Delete referencing rows together with the owner.
    pub const fn auto_delete(mut self, value: bool) -> Self {
        self.auto_delete_references = value;
        self
    }

    /// Null the FK of referencing rows when the owner is deleted.
    pub const fn auto_remove(mut self, value: bool) -> Self {
        self.auto_remove_references = value;
        self
    }

    pub(crate) const fn owned_by(mut self, owner: &'static str) -> Self {
        self.owner = owner;
        self
    }

    /// Policy for referencing rows. Auto-delete wins over auto-remove.
    pub const fn action(&self) -> ConflictAction {
        if self.auto_delete_references {
            ConflictAction::AutoDeleteReference
        } else if self.auto_remove_references {
            ConflictAction::AutoRemoveReference
        } else {
            ConflictAction::Conflict
        }
    }
}

/// A row of another entity whose FK blocks deletion of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FkConstraintConflict {
    /// Entity type of the referencing row.
    pub conflict_entity: String,
    /// Primary key of the referencing row.
    pub foreign_key: i64,
    /// FK field on the referencing entity.
    pub foreign_key_name: String,
    pub action: ConflictAction,
}
