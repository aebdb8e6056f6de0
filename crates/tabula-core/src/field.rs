//! Field descriptors and accessors.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::object::DataObject;
use crate::types::{FieldType, SIZE_MAX};
use crate::value::Value;

/// Metadata about a column-backed scalar field.
///
/// Built with const setters so descriptors can live in `static` or `const`
/// items next to the entity declaration:
///
/// ```ignore
/// const NAME: FieldInfo = FieldInfo::new("Name", FieldType::NVarChar).size(30).nullable(false);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    /// Field name, which is also the column name.
    pub name: &'static str,
    /// Owning entity; filled in by [`EntityBuilder`](crate::schema::EntityBuilder).
    pub owner: &'static str,
    /// Declared type.
    pub field_type: FieldType,
    /// Size or precision; `-1` means MAX.
    pub size: i32,
    /// Scale for decimals.
    pub scale: i32,
    /// Whether NULL may be stored.
    pub nullable: bool,
    /// Whether this is the identity primary key.
    pub primary_key: bool,
}

impl FieldInfo {
    /// Create a nullable field with the default size for its type.
    pub const fn new(name: &'static str, field_type: FieldType) -> Self {
        let size = match field_type {
            FieldType::NVarChar | FieldType::Binary => SIZE_MAX,
            FieldType::Decimal => 18,
            _ => 0,
        };
        Self {
            name,
            owner: "",
            field_type,
            size,
            scale: 0,
            nullable: true,
            primary_key: false,
        }
    }

    /// Shorthand for a BIGINT identity primary key.
    pub const fn key(name: &'static str) -> Self {
        Self::new(name, FieldType::BigInt).primary_key(true)
    }

    pub const fn size(mut self, size: i32) -> Self {
        self.size = size;
        self
    }

    pub const fn scale(mut self, scale: i32) -> Self {
        self.scale = scale;
        self
    }

    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Mark as primary key. Primary keys are never nullable.
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        if value {
            self.nullable = false;
        }
        self
    }

    pub(crate) const fn owned_by(mut self, owner: &'static str) -> Self {
        self.owner = owner;
        self
    }

    fn check_owner(&self, obj: &DataObject) -> Result<()> {
        if obj.entity_name() == self.owner {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                expected: self.owner.to_string(),
                found: obj.entity_name().to_string(),
            })
        }
    }

    /// Read this field from an instance, subject to the retrieval guard.
    pub fn get<'a>(&self, obj: &'a DataObject) -> Result<&'a Value> {
        self.check_owner(obj)?;
        obj.get(self.name)
    }

    /// Write this field on an instance, subject to the edit guard.
    pub fn set(&self, obj: &mut DataObject, value: impl Into<Value>) -> Result<()> {
        self.check_owner(obj)?;
        obj.set(self.name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityBuilder;

    #[test]
    fn test_const_builder() {
        const NAME: FieldInfo = FieldInfo::new("Name", FieldType::NVarChar)
            .size(30)
            .nullable(false);
        assert_eq!(NAME.size, 30);
        assert!(!NAME.nullable);
        assert!(!NAME.primary_key);

        let key = FieldInfo::key("CityID");
        assert!(key.primary_key);
        assert!(!key.nullable);
        assert_eq!(key.field_type, FieldType::BigInt);
        assert_eq!(FieldInfo::new("Blob", FieldType::Binary).size, SIZE_MAX);
    }

    #[test]
    fn test_accessor_rejects_foreign_owner() {
        let city = EntityBuilder::new("City", "dbo", "City")
            .field(FieldInfo::key("CityID"))
            .field(FieldInfo::new("Name", FieldType::NVarChar))
            .build()
            .unwrap();
        let user = EntityBuilder::new("User", "dbo", "User")
            .field(FieldInfo::key("UserID"))
            .field(FieldInfo::new("Name", FieldType::NVarChar))
            .build()
            .unwrap();

        let name = *city.field("Name").unwrap();
        let mut obj = std::sync::Arc::new(user).new_object();
        let err = name.set(&mut obj, "x").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));

        let mut own = std::sync::Arc::new(city).new_object();
        name.set(&mut own, "Toronto").unwrap();
        assert_eq!(name.get(&own).unwrap(), &Value::from("Toronto"));
    }
}
