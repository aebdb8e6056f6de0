//! Table storage and request evaluation.

use std::collections::{BTreeMap, BTreeSet};

use tabula_core::{
    ColumnRef, ColumnSpec, ComparisonOp, DeleteRequest, Error, GroupKind, InsertRequest, JoinKind,
    Operand, Predicate, Result, Row, SchemaOperation, SelectRequest, TableIdentity, UpdateRequest,
    Value,
};

fn backend(message: impl Into<String>) -> Error {
    Error::Backend(message.into())
}

#[derive(Debug, Clone)]
pub(crate) struct Table {
    columns: Vec<ColumnSpec>,
    rows: BTreeMap<i64, Vec<Value>>,
    next_id: i64,
}

impl Table {
    fn column_index(&self, table: &TableIdentity, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| backend(format!("invalid column name '{name}' on {table}")))
    }

    fn identity(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.identity)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ForeignKey {
    name: String,
    table: TableIdentity,
    column: String,
    references: TableIdentity,
    referenced_column: String,
}

/// Everything one transaction can see.
#[derive(Debug, Clone, Default)]
pub(crate) struct Store {
    schemas: BTreeSet<String>,
    tables: BTreeMap<TableIdentity, Table>,
    foreign_keys: Vec<ForeignKey>,
}

/// One joined source row: alias → (table, row key or none for an unmatched LEFT join).
type Binding = Vec<(String, TableIdentity, Option<i64>)>;

impl Store {
    pub(crate) fn has_schema(&self, schema: &str) -> bool {
        self.schemas.contains(schema)
    }

    pub(crate) fn has_table(&self, table: &TableIdentity) -> bool {
        self.tables.contains_key(table)
    }

    pub(crate) fn has_foreign_key(&self, name: &str) -> bool {
        self.foreign_keys.iter().any(|fk| fk.name == name)
    }

    pub(crate) fn row_count(&self, table: &TableIdentity) -> Option<usize> {
        self.tables.get(table).map(|t| t.rows.len())
    }

    fn table(&self, table: &TableIdentity) -> Result<&Table> {
        self.tables
            .get(table)
            .ok_or_else(|| backend(format!("invalid object name '{table}'")))
    }

    fn table_mut(&mut self, table: &TableIdentity) -> Result<&mut Table> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| backend(format!("invalid object name '{table}'")))
    }

    // ========================================================================
    // Predicate evaluation (three-valued)
    // ========================================================================

    fn column_value(&self, binding: &Binding, column: &ColumnRef) -> Result<Value> {
        let (_, table_id, key) = binding
            .iter()
            .find(|(alias, _, _)| *alias == column.table_alias)
            .ok_or_else(|| backend(format!("unknown table alias '{}'", column.table_alias)))?;
        let table = self.table(table_id)?;
        let idx = table.column_index(table_id, &column.column)?;
        Ok(key
            .and_then(|k| table.rows.get(&k))
            .map(|row| row[idx].clone())
            .unwrap_or_default())
    }

    fn operand_values(&self, binding: &Binding, operand: &Operand) -> Result<Vec<Value>> {
        Ok(match operand {
            Operand::Column(column) => vec![self.column_value(binding, column)?],
            Operand::Literal(value) => vec![value.clone()],
            Operand::List(values) => values.clone(),
        })
    }

    /// `None` is SQL UNKNOWN.
    fn evaluate(&self, binding: &Binding, predicate: &Predicate) -> Result<Option<bool>> {
        match predicate {
            Predicate::Compare { left, op, right } => {
                let left = self.column_value(binding, left)?;
                let right = self.operand_values(binding, right)?;
                if left.is_null() {
                    return Ok(None);
                }
                if op.is_membership() {
                    let hit = right.iter().any(|v| left.compare(v) == Some(std::cmp::Ordering::Equal));
                    let result = if hit {
                        Some(true)
                    } else if right.iter().any(Value::is_null) {
                        None
                    } else {
                        Some(false)
                    };
                    return Ok(if *op == ComparisonOp::NotIn {
                        result.map(|b| !b)
                    } else {
                        result
                    });
                }
                let [value] = right.as_slice() else {
                    return Err(backend(format!("{} expects one operand", op.as_sql())));
                };
                Ok(left.compare(value).map(|ordering| op.matches(Some(ordering))))
            }
            Predicate::IsNull { column, negated } => {
                Ok(Some(self.column_value(binding, column)?.is_null() != *negated))
            }
            Predicate::Group { kind, predicates } => {
                let mut unknown = false;
                for p in predicates {
                    match (kind, self.evaluate(binding, p)?) {
                        (GroupKind::And, Some(false)) => return Ok(Some(false)),
                        (GroupKind::Or, Some(true)) => return Ok(Some(true)),
                        (_, None) => unknown = true,
                        _ => {}
                    }
                }
                Ok(if unknown { None } else { Some(*kind == GroupKind::And) })
            }
        }
    }

    fn matches(&self, binding: &Binding, predicate: &Predicate) -> Result<bool> {
        Ok(self.evaluate(binding, predicate)? == Some(true))
    }

    fn matching_keys(&self, table: &TableIdentity, alias: &str, predicate: &Predicate) -> Result<Vec<i64>> {
        let mut keys = Vec::new();
        for key in self.table(table)?.rows.keys() {
            let binding = vec![(alias.to_string(), *table, Some(*key))];
            if self.matches(&binding, predicate)? {
                keys.push(*key);
            }
        }
        Ok(keys)
    }

    // ========================================================================
    // Requests
    // ========================================================================

    pub(crate) fn select(&self, request: &SelectRequest) -> Result<Vec<Row>> {
        let from = &request.from;
        let mut bindings: Vec<Binding> = self
            .table(&from.table)?
            .rows
            .keys()
            .map(|key| vec![(from.alias.clone(), from.table, Some(*key))])
            .collect();

        for join in &request.joins {
            let candidates: Vec<i64> = self.table(&join.table.table)?.rows.keys().copied().collect();
            let mut next = Vec::with_capacity(bindings.len());
            for binding in bindings {
                let mut matched = false;
                for key in &candidates {
                    let mut extended = binding.clone();
                    extended.push((join.table.alias.clone(), join.table.table, Some(*key)));
                    if self.matches(&extended, &join.on)? {
                        matched = true;
                        next.push(extended);
                    }
                }
                if !matched && join.kind == JoinKind::Left {
                    let mut extended = binding;
                    extended.push((join.table.alias.clone(), join.table.table, None));
                    next.push(extended);
                }
            }
            bindings = next;
        }

        let mut rows = Vec::new();
        for binding in &bindings {
            if let Some(predicate) = &request.predicate {
                if !self.matches(binding, predicate)? {
                    continue;
                }
            }
            let mut row = Row::new();
            for item in &request.items {
                row.insert(item.alias.clone(), self.column_value(binding, &item.column)?);
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// Fail if a non-null value in `column` has no referenced row.
    fn check_references(&self, table: &TableIdentity, column: &str, value: &Value) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        for fk in self.foreign_keys.iter().filter(|fk| fk.table == *table && fk.column == column) {
            let target = self.table(&fk.references)?;
            let idx = target.column_index(&fk.references, &fk.referenced_column)?;
            let exists = target
                .rows
                .values()
                .any(|row| row[idx].compare(value) == Some(std::cmp::Ordering::Equal));
            if !exists {
                return Err(backend(format!(
                    "statement conflicted with the FOREIGN KEY constraint '{}'",
                    fk.name
                )));
            }
        }
        Ok(())
    }

    fn check_assignment(&self, table_id: &TableIdentity, column: &ColumnSpec, value: &Value) -> Result<()> {
        if column.identity {
            return Err(backend(format!(
                "cannot assign identity column '{}' on {table_id}",
                column.name
            )));
        }
        if value.is_null() && !column.nullable {
            return Err(backend(format!(
                "cannot insert NULL into column '{}' on {table_id}",
                column.name
            )));
        }
        self.check_references(table_id, &column.name, value)
    }

    pub(crate) fn insert(&mut self, request: &InsertRequest) -> Result<Option<i64>> {
        let table_id = request.table;
        let table = self.table(&table_id)?;
        let mut row = vec![Value::Null; table.columns.len()];
        for (name, value) in &request.values {
            let idx = table.column_index(&table_id, name)?;
            self.check_assignment(&table_id, &table.columns[idx], value)?;
            row[idx] = value.clone();
        }
        for (idx, column) in table.columns.iter().enumerate() {
            if !column.identity && !column.nullable && row[idx].is_null() {
                return Err(backend(format!(
                    "cannot insert NULL into column '{}' on {table_id}",
                    column.name
                )));
            }
        }

        let identity = table.identity();
        let table = self.table_mut(&table_id)?;
        table.next_id += 1;
        let key = table.next_id;
        if let Some(idx) = identity {
            row[idx] = Value::BigInt(key);
        }
        table.rows.insert(key, row);
        Ok(identity.map(|_| key))
    }

    pub(crate) fn update(&mut self, request: &UpdateRequest) -> Result<u64> {
        let table_id = request.table.table;
        let keys = self.matching_keys(&table_id, &request.table.alias, &request.predicate)?;
        let table = self.table(&table_id)?;
        let mut assignments = Vec::with_capacity(request.values.len());
        for (name, value) in &request.values {
            let idx = table.column_index(&table_id, name)?;
            self.check_assignment(&table_id, &table.columns[idx], value)?;
            assignments.push((idx, value.clone()));
        }

        let table = self.table_mut(&table_id)?;
        for key in &keys {
            if let Some(row) = table.rows.get_mut(key) {
                for (idx, value) in &assignments {
                    row[*idx] = value.clone();
                }
            }
        }
        Ok(keys.len() as u64)
    }

    pub(crate) fn delete(&mut self, request: &DeleteRequest) -> Result<u64> {
        let table_id = request.table.table;
        let keys = self.matching_keys(&table_id, &request.table.alias, &request.predicate)?;
        let doomed: BTreeSet<i64> = keys.iter().copied().collect();

        for fk in self.foreign_keys.iter().filter(|fk| fk.references == table_id) {
            let target = self.table(&table_id)?;
            let key_idx = target.column_index(&table_id, &fk.referenced_column)?;
            let referencing = self.table(&fk.table)?;
            let fk_idx = referencing.column_index(&fk.table, &fk.column)?;
            for key in &doomed {
                let Some(value) = target.rows.get(key).map(|row| &row[key_idx]) else {
                    continue;
                };
                let blocked = referencing.rows.iter().any(|(other, row)| {
                    !(fk.table == table_id && doomed.contains(other))
                        && row[fk_idx].compare(value) == Some(std::cmp::Ordering::Equal)
                });
                if blocked {
                    return Err(backend(format!(
                        "DELETE statement conflicted with the REFERENCE constraint '{}'",
                        fk.name
                    )));
                }
            }
        }

        let table = self.table_mut(&table_id)?;
        for key in &keys {
            table.rows.remove(key);
        }
        Ok(keys.len() as u64)
    }

    pub(crate) fn execute_schema(&mut self, operation: &SchemaOperation) -> Result<()> {
        match operation {
            SchemaOperation::CreateSchema(schema) => {
                self.schemas.insert(schema.clone());
            }
            SchemaOperation::DropSchema(schema) => {
                if self.tables.keys().any(|t| t.schema == schema.as_str()) {
                    return Err(backend(format!("cannot drop schema '{schema}': it is not empty")));
                }
                self.schemas.remove(schema);
            }
            SchemaOperation::CreateTable { table, columns } => {
                if !self.schemas.contains(table.schema) {
                    return Err(backend(format!("schema '{}' does not exist", table.schema)));
                }
                if self.tables.contains_key(table) {
                    return Err(backend(format!("there is already an object named '{table}'")));
                }
                self.tables.insert(
                    *table,
                    Table {
                        columns: columns.clone(),
                        rows: BTreeMap::new(),
                        next_id: 0,
                    },
                );
            }
            SchemaOperation::DropTable(table) => {
                self.table(table)?;
                if let Some(fk) = self.foreign_keys.iter().find(|fk| fk.references == *table && fk.table != *table) {
                    return Err(backend(format!(
                        "cannot drop '{table}': it is referenced by constraint '{}'",
                        fk.name
                    )));
                }
                self.foreign_keys.retain(|fk| fk.table != *table);
                self.tables.remove(table);
            }
            SchemaOperation::AddForeignKey {
                name,
                table,
                column,
                references,
                referenced_column,
            } => {
                if self.has_foreign_key(name) {
                    return Err(backend(format!("constraint '{name}' already exists")));
                }
                self.table(table)?.column_index(table, column)?;
                self.table(references)?.column_index(references, referenced_column)?;
                self.foreign_keys.push(ForeignKey {
                    name: name.clone(),
                    table: *table,
                    column: column.clone(),
                    references: *references,
                    referenced_column: referenced_column.clone(),
                });
            }
            SchemaOperation::DropForeignKey { name, table } => {
                let before = self.foreign_keys.len();
                self.foreign_keys.retain(|fk| !(fk.name == *name && fk.table == *table));
                if self.foreign_keys.len() == before {
                    return Err(backend(format!("constraint '{name}' does not exist on {table}")));
                }
            }
        }
        Ok(())
    }
}
