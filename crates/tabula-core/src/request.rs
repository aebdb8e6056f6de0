//! Backend requests.
//!
//! These are the abstract operations the engine hands to a
//! [`Transaction`](crate::connection::Transaction). They name tables by
//! [`TableIdentity`] and columns by alias-qualified references; turning them
//! into SQL text is the backend's business.

use crate::condition::{ComparisonOp, GroupKind};
use crate::schema::TableIdentity;
use crate::types::FieldType;
use crate::value::Value;

/// A table with the alias it is known by inside one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub table: TableIdentity,
    pub alias: String,
}

/// An alias-qualified column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnRef {
    pub table_alias: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table_alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table_alias: table_alias.into(),
            column: column.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(ColumnRef),
    Literal(Value),
    List(Vec<Value>),
}

/// Predicate tree with SQL semantics: comparisons against NULL are unknown.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        left: ColumnRef,
        op: ComparisonOp,
        right: Operand,
    },
    IsNull {
        column: ColumnRef,
        negated: bool,
    },
    Group {
        kind: GroupKind,
        predicates: Vec<Predicate>,
    },
}

impl Predicate {
    /// `column = value`.
    pub fn equals(column: ColumnRef, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            left: column,
            op: ComparisonOp::Equal,
            right: Operand::Literal(value.into()),
        }
    }

    /// `column IN (values...)`.
    pub fn in_list(column: ColumnRef, values: Vec<Value>) -> Self {
        Predicate::Compare {
            left: column,
            op: ComparisonOp::In,
            right: Operand::List(values),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    pub const fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: TableRef,
    pub on: Predicate,
}

/// One output column of a select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectItem {
    pub column: ColumnRef,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectRequest {
    pub items: Vec<SelectItem>,
    pub from: TableRef,
    pub joins: Vec<Join>,
    pub predicate: Option<Predicate>,
}

/// Insert one row. The backend generates the identity key.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRequest {
    pub table: TableIdentity,
    pub values: Vec<(String, Value)>,
}

/// Update rows matching `predicate`. Columns are unqualified.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub table: TableRef,
    pub values: Vec<(String, Value)>,
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub table: TableRef,
    pub predicate: Predicate,
}

/// Column definition for [`SchemaOperation::CreateTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub field_type: FieldType,
    pub size: i32,
    pub scale: i32,
    pub nullable: bool,
    /// Identity primary key.
    pub identity: bool,
}

/// Schema deployment operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaOperation {
    CreateSchema(String),
    DropSchema(String),
    CreateTable {
        table: TableIdentity,
        columns: Vec<ColumnSpec>,
    },
    DropTable(TableIdentity),
    AddForeignKey {
        name: String,
        table: TableIdentity,
        column: String,
        references: TableIdentity,
        referenced_column: String,
    },
    DropForeignKey {
        name: String,
        table: TableIdentity,
    },
}
