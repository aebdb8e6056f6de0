//! Schema deployment for Tabula.
//!
//! Turns a [`SchemaRegistry`](tabula_core::SchemaRegistry) into the ordered
//! [`SchemaOperation`](tabula_core::SchemaOperation)s that create or drop it,
//! executes them against a [`Connection`](tabula_core::Connection), and
//! renders them as SQL Server DDL.
//!
//! Deployment is an explicit operation. Normal read and write paths never
//! touch the schema.

pub mod ddl;
pub mod plan;

pub use ddl::{DdlGenerator, SqlServerDdlGenerator, quote_identifier};
pub use plan::{DeploymentPlan, deploy, deploy_plan, foreign_key_name, undeploy, undeploy_plan};
