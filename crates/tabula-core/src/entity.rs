//! Typed entity facades.
//!
//! Application types wrap a [`DataObject`] and expose typed accessors built
//! from [`FieldRef`] and [`RelationshipRef`] constants. The wrapper owns no
//! state of its own, so every guard of the underlying instance still applies.
//!
//! ```ignore
//! pub struct City(DataObject);
//!
//! impl City {
//!     pub const NAME: FieldRef<City, String> = FieldRef::new("Name");
//!     pub const COUNTRY: RelationshipRef<City, Country> = RelationshipRef::new("Country");
//! }
//! ```

use std::fmt;
use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::object::DataObject;
use crate::schema::EntityBuilder;
use crate::value::{FromValue, Value};

/// A typed view over a [`DataObject`] of one entity type.
pub trait Entity: Sized {
    /// Registered entity name.
    const ENTITY: &'static str;

    /// Declare the entity's table, fields and relationships.
    fn describe() -> EntityBuilder;

    /// Wrap an instance without checking its type.
    fn wrap(object: DataObject) -> Self;

    fn object(&self) -> &DataObject;

    fn object_mut(&mut self) -> &mut DataObject;

    fn into_object(self) -> DataObject;

    /// Wrap an instance, failing with [`Error::TypeMismatch`] if it belongs
    /// to another entity type.
    fn from_object(object: DataObject) -> Result<Self> {
        if object.entity_name() == Self::ENTITY {
            Ok(Self::wrap(object))
        } else {
            Err(Error::TypeMismatch {
                expected: Self::ENTITY.to_string(),
                found: object.entity_name().to_string(),
            })
        }
    }
}

/// Typed accessor for one field of `E`.
pub struct FieldRef<E, T> {
    name: &'static str,
    _marker: PhantomData<fn() -> (E, T)>,
}

impl<E, T> FieldRef<E, T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<E: Entity, T: FromValue> FieldRef<E, T> {
    pub fn get(&self, entity: &E) -> Result<T> {
        entity.object().get_as(self.name)
    }
}

impl<E: Entity, T: Into<Value>> FieldRef<E, T> {
    pub fn set(&self, entity: &mut E, value: T) -> Result<()> {
        entity.object_mut().set(self.name, value)
    }
}

impl<E, T> Clone for FieldRef<E, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, T> Copy for FieldRef<E, T> {}

impl<E, T> fmt::Debug for FieldRef<E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldRef").field(&self.name).finish()
    }
}

/// Typed accessor for a relationship from `E` to `R`.
pub struct RelationshipRef<E, R> {
    name: &'static str,
    _marker: PhantomData<fn() -> (E, R)>,
}

impl<E, R> RelationshipRef<E, R> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<E: Entity, R: Entity> RelationshipRef<E, R> {
    /// A copy of the cached related instance, if one is loaded.
    pub fn get(&self, entity: &E) -> Result<Option<R>> {
        entity
            .object()
            .related(self.name)?
            .cloned()
            .map(R::from_object)
            .transpose()
    }

    pub fn set(&self, entity: &mut E, related: &R) -> Result<()> {
        entity
            .object_mut()
            .set_related(self.name, related.object().clone())
    }
}

impl<E, R> Clone for RelationshipRef<E, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, R> Copy for RelationshipRef<E, R> {}

impl<E, R> fmt::Debug for RelationshipRef<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RelationshipRef").field(&self.name).finish()
    }
}
