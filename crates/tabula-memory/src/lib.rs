//! In-memory backend for Tabula.
//!
//! [`MemoryConnection`] implements the [`Connection`] and [`Transaction`]
//! traits over plain Rust collections. It evaluates joins and predicates with
//! SQL semantics, generates identity keys, enforces NOT NULL and foreign-key
//! constraints, and executes schema operations, so a deployed registry
//! behaves much like a real database.
//!
//! Each transaction works on a private copy of the store taken at `begin` and
//! publishes it on `commit`. Transactions are not checked against each other:
//! the last commit wins.
//!
//! Every request is appended to a statement log that tests can inspect.

mod store;

use std::sync::{Arc, Mutex, MutexGuard};

use tabula_core::{
    Connection, DeleteRequest, Error, InsertRequest, Result, RowCursor, SchemaOperation,
    SelectRequest, TableIdentity, Transaction, UpdateRequest,
};

use store::Store;

/// Kind of a logged request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Schema,
    Commit,
    Rollback,
}

/// One executed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub kind: StatementKind,
    /// Target table, when the request has one.
    pub table: Option<TableIdentity>,
    /// Rows returned or affected.
    pub rows: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Backend("memory store lock poisoned".to_string()))
}

/// An in-memory database.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnection {
    store: Arc<Mutex<Store>>,
    log: Arc<Mutex<Vec<Statement>>>,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every statement executed so far, committed or not.
    pub fn statements(&self) -> Vec<Statement> {
        lock(&self.log).map(|log| log.clone()).unwrap_or_default()
    }

    /// Logged statements of one kind against one table.
    pub fn statements_for(&self, kind: StatementKind, table: &TableIdentity) -> Vec<Statement> {
        self.statements()
            .into_iter()
            .filter(|s| s.kind == kind && s.table.as_ref() == Some(table))
            .collect()
    }

    pub fn clear_log(&self) {
        if let Ok(mut log) = lock(&self.log) {
            log.clear();
        }
    }

    /// Committed row count, or `None` if the table does not exist.
    pub fn row_count(&self, table: &TableIdentity) -> Option<usize> {
        lock(&self.store).ok()?.row_count(table)
    }

    pub fn has_table(&self, table: &TableIdentity) -> bool {
        lock(&self.store).is_ok_and(|store| store.has_table(table))
    }

    pub fn has_schema(&self, schema: &str) -> bool {
        lock(&self.store).is_ok_and(|store| store.has_schema(schema))
    }

    pub fn has_foreign_key(&self, name: &str) -> bool {
        lock(&self.store).is_ok_and(|store| store.has_foreign_key(name))
    }
}

impl Connection for MemoryConnection {
    fn begin(&self) -> Result<Box<dyn Transaction>> {
        let working = lock(&self.store)?.clone();
        tracing::trace!("Beginning memory transaction");
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.store),
            log: Arc::clone(&self.log),
            working,
            active: true,
        }))
    }
}

/// A transaction over a private snapshot of the store.
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Mutex<Store>>,
    log: Arc<Mutex<Vec<Statement>>>,
    working: Store,
    active: bool,
}

impl MemoryTransaction {
    fn ensure_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(Error::Backend("transaction is no longer active".to_string()))
        }
    }

    fn record(&self, kind: StatementKind, table: Option<TableIdentity>, rows: u64) -> Result<()> {
        tracing::trace!(?kind, ?table, rows, "Memory statement");
        lock(&self.log)?.push(Statement { kind, table, rows });
        Ok(())
    }
}

impl Transaction for MemoryTransaction {
    fn select(&mut self, request: &SelectRequest) -> Result<RowCursor> {
        self.ensure_active()?;
        let rows = self.working.select(request)?;
        self.record(StatementKind::Select, Some(request.from.table), rows.len() as u64)?;
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    fn insert(&mut self, request: &InsertRequest) -> Result<Option<i64>> {
        self.ensure_active()?;
        let key = self.working.insert(request)?;
        self.record(StatementKind::Insert, Some(request.table), 1)?;
        Ok(key)
    }

    fn update(&mut self, request: &UpdateRequest) -> Result<u64> {
        self.ensure_active()?;
        let count = self.working.update(request)?;
        self.record(StatementKind::Update, Some(request.table.table), count)?;
        Ok(count)
    }

    fn delete(&mut self, request: &DeleteRequest) -> Result<u64> {
        self.ensure_active()?;
        let count = self.working.delete(request)?;
        self.record(StatementKind::Delete, Some(request.table.table), count)?;
        Ok(count)
    }

    fn execute_schema(&mut self, operation: &SchemaOperation) -> Result<()> {
        self.ensure_active()?;
        self.working.execute_schema(operation)?;
        let table = match operation {
            SchemaOperation::CreateTable { table, .. }
            | SchemaOperation::DropTable(table)
            | SchemaOperation::AddForeignKey { table, .. }
            | SchemaOperation::DropForeignKey { table, .. } => Some(*table),
            SchemaOperation::CreateSchema(_) | SchemaOperation::DropSchema(_) => None,
        };
        self.record(StatementKind::Schema, table, 0)
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        *lock(&self.shared)? = std::mem::take(&mut self.working);
        self.active = false;
        self.record(StatementKind::Commit, None, 0)
    }

    fn rollback(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.working = Store::default();
        self.active = false;
        self.record(StatementKind::Rollback, None, 0)
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::{
        ColumnRef, ColumnSpec, ComparisonOp, FieldType, GroupKind, Join, JoinKind, Operand,
        Predicate, SelectItem, TableRef, Value,
    };

    fn country() -> TableIdentity {
        TableIdentity::new("geo", "Country")
    }

    fn city() -> TableIdentity {
        TableIdentity::new("geo", "City")
    }

    fn column(name: &str, field_type: FieldType, nullable: bool, identity: bool) -> ColumnSpec {
        ColumnSpec {
            name: name.to_string(),
            field_type,
            size: 30,
            scale: 0,
            nullable,
            identity,
        }
    }

    fn deployed() -> MemoryConnection {
        let connection = MemoryConnection::new();
        let mut tx = connection.begin().unwrap();
        for op in [
            SchemaOperation::CreateSchema("geo".into()),
            SchemaOperation::CreateTable {
                table: country(),
                columns: vec![
                    column("CountryID", FieldType::BigInt, false, true),
                    column("Name", FieldType::NVarChar, false, false),
                ],
            },
            SchemaOperation::CreateTable {
                table: city(),
                columns: vec![
                    column("CityID", FieldType::BigInt, false, true),
                    column("CountryID", FieldType::BigInt, true, false),
                    column("Name", FieldType::NVarChar, true, false),
                ],
            },
            SchemaOperation::AddForeignKey {
                name: "FKCity_Country_CountryID".into(),
                table: city(),
                column: "CountryID".into(),
                references: country(),
                referenced_column: "CountryID".into(),
            },
        ] {
            tx.execute_schema(&op).unwrap();
        }
        tx.commit().unwrap();
        connection
    }

    fn insert(tx: &mut dyn Transaction, table: TableIdentity, values: Vec<(&str, Value)>) -> i64 {
        tx.insert(&InsertRequest {
            table,
            values: values.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        })
        .unwrap()
        .unwrap()
    }

    fn city_with_country(predicate: Option<Predicate>) -> SelectRequest {
        SelectRequest {
            items: vec![
                SelectItem {
                    column: ColumnRef::new("table000", "Name"),
                    alias: "table000_Name".into(),
                },
                SelectItem {
                    column: ColumnRef::new("table001", "Name"),
                    alias: "table001_Name".into(),
                },
            ],
            from: TableRef {
                table: city(),
                alias: "table000".into(),
            },
            joins: vec![Join {
                kind: JoinKind::Left,
                table: TableRef {
                    table: country(),
                    alias: "table001".into(),
                },
                on: Predicate::Compare {
                    left: ColumnRef::new("table000", "CountryID"),
                    op: ComparisonOp::Equal,
                    right: Operand::Column(ColumnRef::new("table001", "CountryID")),
                },
            }],
            predicate,
        }
    }

    #[test]
    fn test_identity_and_left_join() {
        let connection = deployed();
        let mut tx = connection.begin().unwrap();
        let canada = insert(tx.as_mut(), country(), vec![("Name", "Canada".into())]);
        assert_eq!(canada, 1);
        insert(
            tx.as_mut(),
            city(),
            vec![("CountryID", Value::BigInt(canada)), ("Name", "Toronto".into())],
        );
        insert(tx.as_mut(), city(), vec![("Name", "Atlantis".into())]);

        let rows: Vec<_> = tx
            .select(&city_with_country(None))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("table001_Name"), Some(&Value::from("Canada")));
        assert_eq!(rows[1].get("table000_Name"), Some(&Value::from("Atlantis")));
        assert_eq!(rows[1].get("table001_Name"), Some(&Value::Null));
    }

    #[test]
    fn test_predicates_use_sql_null_semantics() {
        let connection = deployed();
        let mut tx = connection.begin().unwrap();
        insert(tx.as_mut(), city(), vec![("Name", "Atlantis".into())]);
        insert(tx.as_mut(), city(), vec![]);

        let equals_null = Predicate::Compare {
            left: ColumnRef::new("table000", "Name"),
            op: ComparisonOp::Equal,
            right: Operand::Literal(Value::Null),
        };
        assert_eq!(tx.select(&city_with_country(Some(equals_null))).unwrap().count(), 0);

        let is_null = Predicate::IsNull {
            column: ColumnRef::new("table000", "Name"),
            negated: false,
        };
        assert_eq!(tx.select(&city_with_country(Some(is_null))).unwrap().count(), 1);

        let either = Predicate::Group {
            kind: GroupKind::Or,
            predicates: vec![
                Predicate::equals(ColumnRef::new("table000", "Name"), "Atlantis"),
                Predicate::equals(ColumnRef::new("table001", "Name"), "Canada"),
            ],
        };
        assert_eq!(tx.select(&city_with_country(Some(either))).unwrap().count(), 1);
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let connection = deployed();
        let mut tx = connection.begin().unwrap();
        let bad = tx.insert(&InsertRequest {
            table: city(),
            values: vec![("CountryID".into(), Value::BigInt(99))],
        });
        assert!(matches!(bad, Err(Error::Backend(msg)) if msg.contains("FOREIGN KEY")));

        let canada = insert(tx.as_mut(), country(), vec![("Name", "Canada".into())]);
        insert(tx.as_mut(), city(), vec![("CountryID", Value::BigInt(canada))]);
        let blocked = tx.delete(&DeleteRequest {
            table: TableRef {
                table: country(),
                alias: "table000".into(),
            },
            predicate: Predicate::equals(ColumnRef::new("table000", "CountryID"), canada),
        });
        assert!(matches!(blocked, Err(Error::Backend(msg)) if msg.contains("REFERENCE")));

        let missing_name = tx.insert(&InsertRequest {
            table: country(),
            values: vec![],
        });
        assert!(matches!(missing_name, Err(Error::Backend(msg)) if msg.contains("NULL")));
    }

    #[test]
    fn test_commit_and_rollback_visibility() {
        let connection = deployed();
        {
            let mut tx = connection.begin().unwrap();
            insert(tx.as_mut(), country(), vec![("Name", "Canada".into())]);
            assert_eq!(connection.row_count(&country()), Some(0));
            tx.rollback().unwrap();
            assert!(!tx.is_active());
            assert!(tx.rollback().is_err());
        }
        assert_eq!(connection.row_count(&country()), Some(0));

        let mut tx = connection.begin().unwrap();
        insert(tx.as_mut(), country(), vec![("Name", "Canada".into())]);
        tx.commit().unwrap();
        assert_eq!(connection.row_count(&country()), Some(1));
        assert_eq!(connection.statements_for(StatementKind::Insert, &country()).len(), 2);
    }

    #[test]
    fn test_schema_operations() {
        let connection = deployed();
        assert!(connection.has_schema("geo"));
        assert!(connection.has_table(&city()));
        assert!(connection.has_foreign_key("FKCity_Country_CountryID"));

        let mut tx = connection.begin().unwrap();
        assert!(tx.execute_schema(&SchemaOperation::DropTable(country())).is_err());
        assert!(tx.execute_schema(&SchemaOperation::DropSchema("geo".into())).is_err());
        assert!(tx
            .execute_schema(&SchemaOperation::CreateTable {
                table: TableIdentity::new("missing", "T"),
                columns: vec![],
            })
            .is_err());
    }
}
