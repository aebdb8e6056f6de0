//! Core types and traits for Tabula.
//!
//! `tabula-core` is the **foundation layer** of the workspace. It defines the
//! schema model, entity instances and the backend contract that every other
//! crate builds on.
//!
//! # Role In The Architecture
//!
//! - **Schema model**: `EntityType`, `FieldInfo`, `RelationshipInfo` and
//!   `RelationshipListInfo`, registered explicitly in a `SchemaRegistry`.
//! - **Instances**: `DataObject` carries values, the retrieved-path set and the
//!   lifecycle flags that guard every read and write.
//! - **Typed facades**: the `Entity` trait plus `FieldRef` / `RelationshipRef`
//!   accessor constants.
//! - **Backend contract**: `Connection` and `Transaction`, driven by the
//!   request types in [`request`] and returning [`Row`]s.
//!
//! # Who Uses This Crate
//!
//! - `tabula-query` resolves paths against the registry and builds requests.
//! - `tabula-schema` turns the registry into deployment operations.
//! - `tabula-session` implements the lifecycle, search and validation engines.
//! - `tabula-memory` implements `Connection` for tests and embedding.
//!
//! Most applications should use the `tabula` facade.

pub mod condition;
pub mod connection;
pub mod entity;
pub mod error;
pub mod field;
pub mod object;
pub mod relationship;
pub mod request;
pub mod row;
pub mod schema;
pub mod types;
pub mod value;

pub use condition::{ComparisonOp, Condition, ConditionOperand, GroupKind};
pub use connection::{Connection, RowCursor, Transaction, TransactionScope};
pub use entity::{Entity, FieldRef, RelationshipRef};
pub use error::{Error, Errors, Result, ValidationError};
pub use field::FieldInfo;
pub use object::DataObject;
pub use relationship::{
    ConflictAction, FkConstraintConflict, RelationshipInfo, RelationshipListInfo,
};
pub use request::{
    ColumnRef, ColumnSpec, DeleteRequest, InsertRequest, Join, JoinKind, Operand, Predicate,
    SchemaOperation, SelectItem, SelectRequest, TableRef, UpdateRequest,
};
pub use row::Row;
pub use schema::{EntityBuilder, EntityType, SchemaRegistry, TableIdentity, split_path};
pub use types::{FieldType, SIZE_MAX};
pub use value::{FromValue, Value};
