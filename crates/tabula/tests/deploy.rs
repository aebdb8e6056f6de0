//! Schema deployment against the in-memory backend.

mod common;

use common::{City, Country, Flag, User};
use tabula::prelude::*;
use tabula::{
    DdlGenerator, SchemaOperation, SqlServerDdlGenerator, deploy_plan, foreign_key_name,
};

#[test]
fn deploy_creates_schemas_tables_and_constraints() {
    let registry = common::registry(ConflictAction::Conflict);
    let connection = MemoryConnection::new();
    tabula::deploy(&connection, &registry).unwrap();

    assert!(connection.has_schema("geo"));
    assert!(connection.has_schema("auth"));
    for table in [Country::TABLE, City::TABLE, Flag::TABLE, User::TABLE] {
        assert!(connection.has_table(&table), "{table} missing");
        assert_eq!(connection.row_count(&table), Some(0));
    }
    let fk = foreign_key_name(&City::TABLE, &Country::TABLE, "CountryID");
    assert_eq!(fk, "FKCity_Country_CountryID");
    assert!(connection.has_foreign_key(&fk));
}

#[test]
fn undeploy_removes_everything() {
    let registry = common::registry(ConflictAction::Conflict);
    let connection = MemoryConnection::new();
    tabula::deploy(&connection, &registry).unwrap();
    tabula::undeploy(&connection, &registry).unwrap();

    assert!(!connection.has_table(&City::TABLE));
    assert!(!connection.has_table(&Country::TABLE));
    assert!(!connection.has_foreign_key("FKCity_Country_CountryID"));
    assert!(!connection.has_schema("geo"));
    assert!(!connection.has_schema("auth"));
}

#[test]
fn plan_orders_schemas_before_tables_before_keys() {
    let registry = common::registry(ConflictAction::Conflict);
    let plan = deploy_plan(&registry).unwrap();

    let rank = |op: &SchemaOperation| match op {
        SchemaOperation::CreateSchema(_) => 0,
        SchemaOperation::CreateTable { .. } => 1,
        SchemaOperation::AddForeignKey { .. } => 2,
        _ => 3,
    };
    let ranks: Vec<u8> = plan.iter().map(rank).collect();
    assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(ranks.iter().filter(|&&r| r == 2).count(), 2);

    let ddl = SqlServerDdlGenerator.generate_all(&plan.operations);
    assert!(ddl.iter().any(|sql| {
        sql.starts_with("CREATE TABLE [geo].[City] (")
            && sql.contains("[CityID] BIGINT PRIMARY KEY IDENTITY")
    }));
    assert!(ddl.iter().any(|sql| {
        sql.contains("FOREIGN KEY ([CountryID]) REFERENCES [geo].[Country] ([CountryID])")
    }));
}

#[test]
fn registry_snapshot_describes_every_entity() {
    let registry = common::registry(ConflictAction::AutoDeleteReference);
    let snapshot = registry.snapshot().unwrap();
    let entities = snapshot.as_array().unwrap();
    assert_eq!(entities.len(), 4);

    let country = entities.iter().find(|e| e["name"] == "Country").unwrap();
    assert_eq!(country["table"], serde_json::json!({"schema": "geo", "name": "Country"}));
    assert_eq!(country["relationship_lists"][0]["related_entity"], "City");
    assert_eq!(country["relationship_lists"][0]["auto_delete_references"], true);
    assert_eq!(country["relationship_lists"][1]["related_entity"], "Flag");

    let city = entities.iter().find(|e| e["name"] == "City").unwrap();
    assert_eq!(city["fields"].as_array().unwrap().len(), 3);
    assert_eq!(city["relationships"][0]["related_entity"], "Country");
}

#[test]
fn registering_a_different_descriptor_under_a_taken_name_fails() {
    let mut registry = common::registry(ConflictAction::Conflict);
    assert!(registry.register_entity::<City>().is_ok());

    let clash = EntityBuilder::new("City", "geo", "Town")
        .field(FieldInfo::key("TownID"))
        .build()
        .unwrap();
    assert!(matches!(registry.register(clash), Err(Error::DuplicateEntity(_))));
}
