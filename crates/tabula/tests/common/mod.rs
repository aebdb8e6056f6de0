//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use tabula::prelude::*;
use tabula::TableIdentity;

pub struct Country(DataObject);

impl Country {
    pub const ID: FieldRef<Country, i64> = FieldRef::new("CountryID");
    pub const NAME: FieldRef<Country, String> = FieldRef::new("Name");
    pub const TABLE: TableIdentity = TableIdentity::new("geo", "Country");
}

impl Entity for Country {
    const ENTITY: &'static str = "Country";

    fn describe() -> EntityBuilder {
        country(ConflictAction::Conflict)
    }

    fn wrap(object: DataObject) -> Self {
        Self(object)
    }

    fn object(&self) -> &DataObject {
        &self.0
    }

    fn object_mut(&mut self) -> &mut DataObject {
        &mut self.0
    }

    fn into_object(self) -> DataObject {
        self.0
    }
}

pub struct City(DataObject);

impl City {
    pub const ID: FieldRef<City, i64> = FieldRef::new("CityID");
    pub const COUNTRY_ID: FieldRef<City, Option<i64>> = FieldRef::new("CountryID");
    pub const NAME: FieldRef<City, String> = FieldRef::new("Name");
    pub const COUNTRY: RelationshipRef<City, Country> = RelationshipRef::new("Country");
    pub const TABLE: TableIdentity = TableIdentity::new("geo", "City");
}

impl Entity for City {
    const ENTITY: &'static str = "City";

    fn describe() -> EntityBuilder {
        EntityBuilder::new("City", "geo", "City")
            .field(FieldInfo::key("CityID"))
            .field(FieldInfo::new("CountryID", FieldType::BigInt))
            .field(FieldInfo::new("Name", FieldType::NVarChar).size(30))
            .relationship(RelationshipInfo::new("Country", "Country"))
    }

    fn wrap(object: DataObject) -> Self {
        Self(object)
    }

    fn object(&self) -> &DataObject {
        &self.0
    }

    fn object_mut(&mut self) -> &mut DataObject {
        &mut self.0
    }

    fn into_object(self) -> DataObject {
        self.0
    }
}

pub struct Flag(DataObject);

impl Flag {
    pub const TABLE: TableIdentity = TableIdentity::new("geo", "Flag");
}

impl Entity for Flag {
    const ENTITY: &'static str = "Flag";

    fn describe() -> EntityBuilder {
        EntityBuilder::new("Flag", "geo", "Flag")
            .field(FieldInfo::key("FlagID"))
            .field(FieldInfo::new("CountryID", FieldType::BigInt))
            .field(FieldInfo::new("Colors", FieldType::NVarChar).size(30))
            .relationship(RelationshipInfo::new("Country", "Country"))
    }

    fn wrap(object: DataObject) -> Self {
        Self(object)
    }

    fn object(&self) -> &DataObject {
        &self.0
    }

    fn object_mut(&mut self) -> &mut DataObject {
        &mut self.0
    }

    fn into_object(self) -> DataObject {
        self.0
    }
}

pub struct User(DataObject);

impl User {
    pub const ID: FieldRef<User, i64> = FieldRef::new("UserID");
    pub const USERNAME: FieldRef<User, String> = FieldRef::new("Username");
    pub const PASSWORD: FieldRef<User, Vec<u8>> = FieldRef::new("Password");
    pub const TABLE: TableIdentity = TableIdentity::new("auth", "User");
}

impl Entity for User {
    const ENTITY: &'static str = "User";

    fn describe() -> EntityBuilder {
        EntityBuilder::new("User", "auth", "User")
            .field(FieldInfo::key("UserID"))
            .field(FieldInfo::new("Username", FieldType::NVarChar).size(50))
            .field(FieldInfo::new("Password", FieldType::Binary).size(64))
    }

    fn wrap(object: DataObject) -> Self {
        Self(object)
    }

    fn object(&self) -> &DataObject {
        &self.0
    }

    fn object_mut(&mut self) -> &mut DataObject {
        &mut self.0
    }

    fn into_object(self) -> DataObject {
        self.0
    }
}

/// Country declared with a chosen policy on its `Cities` list.
pub fn country(policy: ConflictAction) -> EntityBuilder {
    let cities = RelationshipListInfo::new("Cities", "City", "CountryID");
    let cities = match policy {
        ConflictAction::AutoDeleteReference => cities.auto_delete(true),
        ConflictAction::AutoRemoveReference => cities.auto_remove(true),
        ConflictAction::Conflict => cities,
    };
    EntityBuilder::new("Country", "geo", "Country")
        .field(FieldInfo::key("CountryID"))
        .field(FieldInfo::new("Name", FieldType::NVarChar).size(30))
        .relationship_list(cities)
        .relationship_list(RelationshipListInfo::new("Flags", "Flag", "CountryID").auto_delete(true))
}

pub fn registry(policy: ConflictAction) -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(country(policy).build().unwrap())
        .unwrap();
    registry.register_entity::<City>().unwrap();
    registry.register_entity::<Flag>().unwrap();
    registry.register_entity::<User>().unwrap();
    registry.verify().unwrap();
    registry
}

/// A deployed in-memory database and a context over it.
pub struct World {
    pub context: DataContext<MemoryConnection>,
}

impl World {
    pub fn new() -> Self {
        Self::with_policy(ConflictAction::Conflict)
    }

    pub fn with_policy(policy: ConflictAction) -> Self {
        Self::with_config(policy, ContextConfig::default())
    }

    pub fn with_config(policy: ConflictAction, config: ContextConfig) -> Self {
        let registry = registry(policy);
        let connection = MemoryConnection::new();
        tabula::deploy(&connection, &registry).unwrap();
        connection.clear_log();
        let context = DataContext::with_config(connection, Arc::new(registry), config).unwrap();
        Self { context }
    }

    pub fn connection(&self) -> &MemoryConnection {
        self.context.connection()
    }

    pub fn country(&self, name: &str) -> i64 {
        let mut country = Country::wrap(self.context.registry().create(Country::ENTITY).unwrap());
        Country::NAME.set(&mut country, name.to_string()).unwrap();
        assert!(self.context.save_typed(&mut country, None).unwrap());
        country.object().primary_key().unwrap()
    }

    pub fn city(&self, name: &str, country: Option<i64>) -> i64 {
        let mut city = City::wrap(self.context.registry().create(City::ENTITY).unwrap());
        City::NAME.set(&mut city, name.to_string()).unwrap();
        City::COUNTRY_ID.set(&mut city, country).unwrap();
        assert!(self.context.save_typed(&mut city, None).unwrap());
        city.object().primary_key().unwrap()
    }

    pub fn flag(&self, colors: &str, country: i64) -> i64 {
        let mut flag = self.context.registry().create(Flag::ENTITY).unwrap();
        flag.set("Colors", colors).unwrap();
        flag.set("CountryID", country).unwrap();
        assert!(self.context.save(&mut flag, None).unwrap());
        flag.primary_key().unwrap()
    }

    pub fn rows(&self, table: &TableIdentity) -> usize {
        self.connection().row_count(table).unwrap()
    }
}
