//! Deploy and undeploy plans.
//!
//! Deployment creates every schema, then every table, then one foreign key
//! per relationship. Undeployment runs the mirror image. Both execute inside
//! one locally owned transaction.

use std::collections::BTreeSet;

use tabula_core::{
    ColumnSpec, Connection, Result, SchemaOperation, SchemaRegistry, TableIdentity,
    TransactionScope,
};

/// Ordered schema operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentPlan {
    pub operations: Vec<SchemaOperation>,
}

impl DeploymentPlan {
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchemaOperation> {
        self.operations.iter()
    }
}

/// Constraint name for a relationship: `FK<Object>_<RelatedObject>_<FkField>`.
pub fn foreign_key_name(table: &TableIdentity, related: &TableIdentity, column: &str) -> String {
    format!("FK{}_{}_{}", table.name, related.name, column)
}

fn schemas(registry: &SchemaRegistry) -> BTreeSet<&'static str> {
    registry.entities().map(|e| e.table().schema).collect()
}

fn foreign_keys(registry: &SchemaRegistry) -> Result<Vec<SchemaOperation>> {
    let mut ops = Vec::new();
    for entity in registry.entities() {
        for rel in entity.relationships() {
            let related = registry.lookup(rel.related_entity)?;
            let key = registry.related_key(rel)?;
            ops.push(SchemaOperation::AddForeignKey {
                name: foreign_key_name(&entity.table(), &related.table(), rel.foreign_key),
                table: entity.table(),
                column: rel.foreign_key.to_string(),
                references: related.table(),
                referenced_column: key.name.to_string(),
            });
        }
    }
    Ok(ops)
}

/// Operations that create the registered schema from scratch.
pub fn deploy_plan(registry: &SchemaRegistry) -> Result<DeploymentPlan> {
    registry.verify()?;
    let mut operations: Vec<SchemaOperation> = schemas(registry)
        .into_iter()
        .map(|s| SchemaOperation::CreateSchema(s.to_string()))
        .collect();

    for entity in registry.entities() {
        let columns = entity
            .fields()
            .iter()
            .map(|field| ColumnSpec {
                name: field.name.to_string(),
                field_type: field.field_type,
                size: field.size,
                scale: field.scale,
                nullable: field.nullable,
                identity: field.primary_key,
            })
            .collect();
        operations.push(SchemaOperation::CreateTable {
            table: entity.table(),
            columns,
        });
    }

    operations.extend(foreign_keys(registry)?);
    Ok(DeploymentPlan { operations })
}

/// Operations that remove everything [`deploy_plan`] creates.
pub fn undeploy_plan(registry: &SchemaRegistry) -> Result<DeploymentPlan> {
    registry.verify()?;
    let mut operations: Vec<SchemaOperation> = foreign_keys(registry)?
        .into_iter()
        .filter_map(|op| match op {
            SchemaOperation::AddForeignKey { name, table, .. } => {
                Some(SchemaOperation::DropForeignKey { name, table })
            }
            _ => None,
        })
        .collect();
    operations.extend(
        registry
            .entities()
            .map(|entity| SchemaOperation::DropTable(entity.table())),
    );
    operations.extend(
        schemas(registry)
            .into_iter()
            .map(|s| SchemaOperation::DropSchema(s.to_string())),
    );
    Ok(DeploymentPlan { operations })
}

fn execute<C: Connection + ?Sized>(connection: &C, plan: &DeploymentPlan) -> Result<()> {
    let mut scope = TransactionScope::begin(connection)?;
    for op in plan.iter() {
        tracing::debug!(op = ?op, "Executing schema operation");
        scope.transaction().execute_schema(op)?;
    }
    scope.commit()
}

/// Create every registered table and constraint.
#[tracing::instrument(level = "debug", skip(connection, registry))]
pub fn deploy<C: Connection + ?Sized>(connection: &C, registry: &SchemaRegistry) -> Result<()> {
    let plan = deploy_plan(registry)?;
    tracing::info!(operations = plan.len(), "Deploying schema");
    execute(connection, &plan)
}

/// Drop every registered constraint, table and schema.
#[tracing::instrument(level = "debug", skip(connection, registry))]
pub fn undeploy<C: Connection + ?Sized>(connection: &C, registry: &SchemaRegistry) -> Result<()> {
    let plan = undeploy_plan(registry)?;
    tracing::info!(operations = plan.len(), "Undeploying schema");
    execute(connection, &plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::{DdlGenerator, SqlServerDdlGenerator};
    use tabula_core::{
        EntityBuilder, Error, FieldInfo, FieldType, RelationshipInfo, RelationshipListInfo,
    };

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                EntityBuilder::new("Country", "geo", "Country")
                    .field(FieldInfo::key("CountryID"))
                    .field(FieldInfo::new("Name", FieldType::NVarChar).size(30))
                    .relationship_list(RelationshipListInfo::new("Cities", "City", "CountryID"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                EntityBuilder::new("City", "geo", "City")
                    .field(FieldInfo::key("CityID"))
                    .field(FieldInfo::new("CountryID", FieldType::BigInt))
                    .field(FieldInfo::new("Name", FieldType::NVarChar).size(30))
                    .relationship(RelationshipInfo::new("Country", "Country"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                EntityBuilder::new("User", "security", "User")
                    .field(FieldInfo::key("UserID"))
                    .field(FieldInfo::new("Username", FieldType::NVarChar).size(30).nullable(false))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_deploy_plan_order() {
        let plan = deploy_plan(&registry()).unwrap();
        let statements = SqlServerDdlGenerator.generate_all(&plan.operations);
        assert_eq!(
            statements,
            vec![
                "IF SCHEMA_ID(N'geo') IS NULL EXEC('CREATE SCHEMA [geo]')",
                "IF SCHEMA_ID(N'security') IS NULL EXEC('CREATE SCHEMA [security]')",
                "CREATE TABLE [geo].[City] ([CityID] BIGINT PRIMARY KEY IDENTITY, \
                 [CountryID] BIGINT NULL, [Name] NVARCHAR(30) NULL)",
                "CREATE TABLE [geo].[Country] ([CountryID] BIGINT PRIMARY KEY IDENTITY, \
                 [Name] NVARCHAR(30) NULL)",
                "CREATE TABLE [security].[User] ([UserID] BIGINT PRIMARY KEY IDENTITY, \
                 [Username] NVARCHAR(30) NOT NULL)",
                "ALTER TABLE [geo].[City] ADD CONSTRAINT [FKCity_Country_CountryID] \
                 FOREIGN KEY ([CountryID]) REFERENCES [geo].[Country] ([CountryID])",
            ]
        );
    }

    #[test]
    fn test_undeploy_plan_mirrors_deploy() {
        let plan = undeploy_plan(&registry()).unwrap();
        assert_eq!(
            plan.operations,
            vec![
                SchemaOperation::DropForeignKey {
                    name: "FKCity_Country_CountryID".into(),
                    table: TableIdentity::new("geo", "City"),
                },
                SchemaOperation::DropTable(TableIdentity::new("geo", "City")),
                SchemaOperation::DropTable(TableIdentity::new("geo", "Country")),
                SchemaOperation::DropTable(TableIdentity::new("security", "User")),
                SchemaOperation::DropSchema("geo".into()),
                SchemaOperation::DropSchema("security".into()),
            ]
        );
    }

    #[test]
    fn test_plan_requires_complete_registry() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                EntityBuilder::new("City", "geo", "City")
                    .field(FieldInfo::key("CityID"))
                    .field(FieldInfo::new("CountryID", FieldType::BigInt))
                    .relationship(RelationshipInfo::new("Country", "Country"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        assert!(matches!(deploy_plan(&registry), Err(Error::Schema(_))));
    }
}
