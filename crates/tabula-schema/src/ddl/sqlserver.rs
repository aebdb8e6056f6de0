//! SQL Server DDL generator.

use super::{DdlGenerator, column_definition, qualified, quote_identifier};
use tabula_core::SchemaOperation;

/// DDL generator for SQL Server.
pub struct SqlServerDdlGenerator;

impl DdlGenerator for SqlServerDdlGenerator {
    fn dialect(&self) -> &'static str {
        "sqlserver"
    }

    fn generate(&self, op: &SchemaOperation) -> Vec<String> {
        tracing::debug!(dialect = "sqlserver", op = ?op, "Generating DDL");

        let statement = match op {
            // CREATE SCHEMA must be alone in its batch, hence the EXEC.
            SchemaOperation::CreateSchema(schema) => format!(
                "IF SCHEMA_ID(N'{}') IS NULL EXEC('CREATE SCHEMA {}')",
                schema.replace('\'', "''"),
                quote_identifier(schema).replace('\'', "''")
            ),
            SchemaOperation::DropSchema(schema) => {
                format!("DROP SCHEMA {}", quote_identifier(schema))
            }
            SchemaOperation::CreateTable { table, columns } => {
                let columns: Vec<String> = columns.iter().map(column_definition).collect();
                format!("CREATE TABLE {} ({})", qualified(table), columns.join(", "))
            }
            SchemaOperation::DropTable(table) => format!("DROP TABLE {}", qualified(table)),
            SchemaOperation::AddForeignKey {
                name,
                table,
                column,
                references,
                referenced_column,
            } => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                qualified(table),
                quote_identifier(name),
                quote_identifier(column),
                qualified(references),
                quote_identifier(referenced_column)
            ),
            SchemaOperation::DropForeignKey { name, table } => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                qualified(table),
                quote_identifier(name)
            ),
        };
        vec![statement]
    }
}
