//! Tabula: an object-relational mapping engine with partial hydration and
//! declarative validation.
//!
//! Entity types are declared once with [`EntityBuilder`] (or the [`Entity`]
//! trait for typed facades) and registered in a [`SchemaRegistry`]. A
//! [`DataContext`] then loads instances by primary key, searches with
//! [`Condition`] trees across relationships, saves and deletes them, and
//! runs [`ValidationRule`]s.
//!
//! ```ignore
//! use std::sync::Arc;
//! use tabula::prelude::*;
//!
//! let mut registry = SchemaRegistry::new();
//! registry.register(
//!     EntityBuilder::new("Country", "geo", "Country")
//!         .field(FieldInfo::key("CountryID"))
//!         .field(FieldInfo::new("Name", FieldType::NVarChar).size(30))
//!         .build()?,
//! )?;
//!
//! let connection = MemoryConnection::new();
//! tabula::deploy(&connection, &registry)?;
//! let context = DataContext::new(connection, Arc::new(registry));
//!
//! let mut canada = context.registry().create("Country")?;
//! canada.set("Name", "Canada")?;
//! context.save(&mut canada, None)?;
//! ```
//!
//! The workspace is split into:
//!
//! - `tabula-core`: values, descriptors, the registry, instances and the
//!   backend traits
//! - `tabula-query`: table aliasing, select planning and SQL rendering
//! - `tabula-schema`: deploy and undeploy plans, SQL Server DDL
//! - `tabula-session`: the data context
//! - `tabula-memory`: an in-memory backend (feature `memory`, on by default)

pub use tabula_core::{
    ColumnRef, ColumnSpec, ComparisonOp, Condition, ConditionOperand, ConflictAction, Connection,
    DataObject, DeleteRequest, Entity, EntityBuilder, EntityType, Error, Errors, FieldInfo,
    FieldRef, FieldType, FkConstraintConflict, FromValue, GroupKind, InsertRequest, Join,
    JoinKind, Operand, Predicate, RelationshipInfo, RelationshipListInfo, RelationshipRef,
    Result, Row, RowCursor, SIZE_MAX, SchemaOperation, SchemaRegistry, SelectItem,
    SelectRequest, TableIdentity, TableRef, Transaction, TransactionScope, UpdateRequest,
    ValidationError, Value,
};
pub use tabula_query::{
    AliasMap, AliasStyle, Dialect, SelectPlan, SelectPlanner, SqlWriter, TableAliaser,
};
pub use tabula_schema::{
    DdlGenerator, DeploymentPlan, SqlServerDdlGenerator, deploy, deploy_plan, foreign_key_name,
    undeploy, undeploy_plan,
};
pub use tabula_session::{
    ContextConfig, DataContext, EntityHooks, RuleCheck, Search, SearchResults, TypedResults,
    ValidationRule, Validator,
};

#[cfg(feature = "memory")]
pub use tabula_memory::{MemoryConnection, Statement, StatementKind};

/// The types most programs need.
pub mod prelude {
    pub use tabula_core::{
        ComparisonOp, Condition, ConflictAction, Connection, DataObject, Entity, EntityBuilder,
        Error, FieldInfo, FieldRef, FieldType, RelationshipInfo, RelationshipListInfo,
        RelationshipRef, Result, SchemaRegistry, Transaction, Value,
    };
    pub use tabula_session::{ContextConfig, DataContext, EntityHooks, Search, ValidationRule};

    #[cfg(feature = "memory")]
    pub use tabula_memory::MemoryConnection;
}
