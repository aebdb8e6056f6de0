//! DDL generation for deployment operations.

mod sqlserver;

pub use sqlserver::SqlServerDdlGenerator;

use tabula_core::{ColumnSpec, SchemaOperation, TableIdentity};

/// Renders [`SchemaOperation`]s as SQL statements for one dialect.
pub trait DdlGenerator {
    fn dialect(&self) -> &'static str;

    /// Statements for one operation, in execution order.
    fn generate(&self, op: &SchemaOperation) -> Vec<String>;

    /// Statements for a sequence of operations.
    fn generate_all(&self, ops: &[SchemaOperation]) -> Vec<String> {
        ops.iter().flat_map(|op| self.generate(op)).collect()
    }
}

/// Quote an identifier in SQL Server brackets.
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

pub(crate) fn qualified(table: &TableIdentity) -> String {
    format!("{}.{}", quote_identifier(table.schema), quote_identifier(table.name))
}

pub(crate) fn column_definition(column: &ColumnSpec) -> String {
    let sql_type = column.field_type.sql_name(column.size, column.scale);
    if column.identity {
        format!("{} {sql_type} PRIMARY KEY IDENTITY", quote_identifier(&column.name))
    } else {
        let null = if column.nullable { "NULL" } else { "NOT NULL" };
        format!("{} {sql_type} {null}", quote_identifier(&column.name))
    }
}
