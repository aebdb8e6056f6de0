//! SQL text rendering.
//!
//! Backends receive structured requests; this module renders them as SQL
//! with numbered parameters for drivers that take text, and for tracing.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tabula_core::{
    ColumnRef, ComparisonOp, DeleteRequest, GroupKind, InsertRequest, Operand, Predicate,
    SelectRequest, TableIdentity, UpdateRequest, Value,
};

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `[bracket]` identifiers and `@p1` parameters.
    #[default]
    SqlServer,
    /// `"quoted"` identifiers and `?1` parameters.
    Sqlite,
}

impl Dialect {
    pub fn quote(self, ident: &str) -> String {
        match self {
            Dialect::SqlServer => format!("[{}]", ident.replace(']', "]]")),
            Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::SqlServer => format!("@p{index}"),
            Dialect::Sqlite => format!("?{index}"),
        }
    }

    /// Table name; SQLite has no schemas, so only the name is used there.
    pub fn table(self, table: &TableIdentity) -> String {
        match self {
            Dialect::SqlServer => format!("{}.{}", self.quote(table.schema), self.quote(table.name)),
            Dialect::Sqlite => self.quote(table.name),
        }
    }
}

/// Renders requests to `(sql, parameters)`.
#[derive(Debug)]
pub struct SqlWriter {
    dialect: Dialect,
    sql: String,
    params: Vec<Value>,
}

impl SqlWriter {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn finish(&mut self) -> (String, Vec<Value>) {
        (std::mem::take(&mut self.sql), std::mem::take(&mut self.params))
    }

    fn bind(&mut self, value: &Value) {
        self.params.push(value.clone());
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
    }

    fn column(&mut self, column: &ColumnRef) {
        let _ = write!(self.sql, "{}.{}", column.table_alias, self.dialect.quote(&column.column));
    }

    fn operand(&mut self, operand: &Operand) {
        match operand {
            Operand::Column(column) => self.column(column),
            Operand::Literal(value) => self.bind(value),
            Operand::List(values) => {
                self.sql.push('(');
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(", ");
                    }
                    self.bind(value);
                }
                self.sql.push(')');
            }
        }
    }

    fn predicate(&mut self, predicate: &Predicate) {
        match predicate {
            Predicate::Compare {
                right: Operand::List(values),
                op,
                ..
            } if values.is_empty() => {
                // IN () is not valid SQL.
                self.sql.push_str(if *op == ComparisonOp::NotIn { "1 = 1" } else { "1 = 0" });
            }
            Predicate::Compare { left, op, right } => {
                self.column(left);
                let _ = write!(self.sql, " {} ", op.as_sql());
                self.operand(right);
            }
            Predicate::IsNull { column, negated } => {
                self.column(column);
                self.sql.push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Predicate::Group { kind, predicates } => {
                if predicates.is_empty() {
                    self.sql.push_str(match kind {
                        GroupKind::And => "1 = 1",
                        GroupKind::Or => "1 = 0",
                    });
                    return;
                }
                let glue = match kind {
                    GroupKind::And => " AND ",
                    GroupKind::Or => " OR ",
                };
                self.sql.push('(');
                for (i, p) in predicates.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(glue);
                    }
                    self.predicate(p);
                }
                self.sql.push(')');
            }
        }
    }

    pub fn select(&mut self, request: &SelectRequest) -> (String, Vec<Value>) {
        self.sql.push_str("SELECT ");
        for (i, item) in request.items.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.column(&item.column);
            let _ = write!(self.sql, " AS {}", item.alias);
        }
        let _ = write!(
            self.sql,
            " FROM {} AS {}",
            self.dialect.table(&request.from.table),
            request.from.alias
        );
        for join in &request.joins {
            let _ = write!(
                self.sql,
                " {} {} AS {} ON ",
                join.kind.as_sql(),
                self.dialect.table(&join.table.table),
                join.table.alias
            );
            self.predicate(&join.on);
        }
        if let Some(predicate) = &request.predicate {
            self.sql.push_str(" WHERE ");
            self.predicate(predicate);
        }
        self.finish()
    }

    pub fn insert(&mut self, request: &InsertRequest) -> (String, Vec<Value>) {
        let columns: Vec<String> = request
            .values
            .iter()
            .map(|(name, _)| self.dialect.quote(name))
            .collect();
        let _ = write!(
            self.sql,
            "INSERT INTO {} ({}) VALUES (",
            self.dialect.table(&request.table),
            columns.join(", ")
        );
        for (i, (_, value)) in request.values.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.bind(value);
        }
        self.sql.push(')');
        if self.dialect == Dialect::SqlServer {
            self.sql.push_str("; SELECT SCOPE_IDENTITY()");
        }
        self.finish()
    }

    fn assignments(&mut self, values: &[(String, Value)]) {
        for (i, (name, value)) in values.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            let _ = write!(self.sql, "{} = ", self.dialect.quote(name));
            self.bind(value);
        }
    }

    pub fn update(&mut self, request: &UpdateRequest) -> (String, Vec<Value>) {
        let table = self.dialect.table(&request.table.table);
        let alias = &request.table.alias;
        match self.dialect {
            Dialect::SqlServer => {
                let _ = write!(self.sql, "UPDATE {alias} SET ");
                self.assignments(&request.values);
                let _ = write!(self.sql, " FROM {table} AS {alias}");
            }
            Dialect::Sqlite => {
                let _ = write!(self.sql, "UPDATE {table} AS {alias} SET ");
                self.assignments(&request.values);
            }
        }
        self.sql.push_str(" WHERE ");
        self.predicate(&request.predicate);
        self.finish()
    }

    pub fn delete(&mut self, request: &DeleteRequest) -> (String, Vec<Value>) {
        let table = self.dialect.table(&request.table.table);
        let alias = &request.table.alias;
        match self.dialect {
            Dialect::SqlServer => {
                let _ = write!(self.sql, "DELETE {alias} FROM {table} AS {alias}");
            }
            Dialect::Sqlite => {
                let _ = write!(self.sql, "DELETE FROM {table} AS {alias}");
            }
        }
        self.sql.push_str(" WHERE ");
        self.predicate(&request.predicate);
        self.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::tests::registry;
    use crate::planner::SelectPlanner;
    use tabula_core::{Condition, TableRef};

    #[test]
    fn test_render_search() {
        let registry = registry();
        let plan = SelectPlanner::new(&registry, "City")
            .unwrap()
            .select("Name")
            .filter(Condition::eq("Name", "Alice").and(Condition::eq("Country.Name", "Canada")))
            .plan()
            .unwrap();

        let (sql, params) = SqlWriter::new(Dialect::SqlServer).select(&plan.request);
        assert_eq!(
            sql,
            "SELECT table000.[CityID] AS table000_CityID, table000.[Name] AS table000_Name, \
             table001.[CountryID] AS table001_CountryID, table001.[Name] AS table001_Name \
             FROM [geo].[City] AS table000 \
             LEFT JOIN [geo].[Country] AS table001 ON table000.[CountryID] = table001.[CountryID] \
             WHERE (table000.[Name] = @p1 AND table001.[Name] = @p2)"
        );
        assert_eq!(params, vec![Value::from("Alice"), Value::from("Canada")]);
    }

    #[test]
    fn test_render_writes_sqlite() {
        let city = TableIdentity::new("geo", "City");
        let mut writer = SqlWriter::new(Dialect::Sqlite);

        let (sql, params) = writer.insert(&InsertRequest {
            table: city,
            values: vec![
                ("CountryID".into(), Value::BigInt(2)),
                ("Name".into(), Value::from("Oslo")),
            ],
        });
        assert_eq!(sql, "INSERT INTO \"City\" (\"CountryID\", \"Name\") VALUES (?1, ?2)");
        assert_eq!(params.len(), 2);

        let target = TableRef {
            table: city,
            alias: "table000".into(),
        };
        let (sql, params) = writer.update(&UpdateRequest {
            table: target.clone(),
            values: vec![("CountryID".into(), Value::Null)],
            predicate: Predicate::in_list(
                ColumnRef::new("table000", "CityID"),
                vec![Value::BigInt(1), Value::BigInt(2)],
            ),
        });
        assert_eq!(
            sql,
            "UPDATE \"City\" AS table000 SET \"CountryID\" = ?1 WHERE table000.\"CityID\" IN (?2, ?3)"
        );
        assert_eq!(params, vec![Value::Null, Value::BigInt(1), Value::BigInt(2)]);

        let (sql, _) = writer.delete(&DeleteRequest {
            table: target,
            predicate: Predicate::in_list(ColumnRef::new("table000", "CityID"), Vec::new()),
        });
        assert_eq!(sql, "DELETE FROM \"City\" AS table000 WHERE 1 = 0");
    }

    #[test]
    fn test_render_sql_server_writes() {
        let target = TableRef {
            table: TableIdentity::new("dbo", "User"),
            alias: "table000".into(),
        };
        let mut writer = SqlWriter::new(Dialect::SqlServer);
        let (sql, _) = writer.update(&UpdateRequest {
            table: target.clone(),
            values: vec![("Username".into(), Value::from("bob"))],
            predicate: Predicate::equals(ColumnRef::new("table000", "UserID"), 1_i64),
        });
        assert_eq!(
            sql,
            "UPDATE table000 SET [Username] = @p1 FROM [dbo].[User] AS table000 WHERE table000.[UserID] = @p2"
        );
        let (sql, _) = writer.delete(&DeleteRequest {
            table: target,
            predicate: Predicate::IsNull {
                column: ColumnRef::new("table000", "Username"),
                negated: false,
            },
        });
        assert_eq!(
            sql,
            "DELETE table000 FROM [dbo].[User] AS table000 WHERE table000.[Username] IS NULL"
        );
    }
}
