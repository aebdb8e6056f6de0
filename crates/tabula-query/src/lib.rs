//! Query planning for Tabula.
//!
//! `tabula-query` turns dotted relationship paths and condition trees into
//! backend requests.
//!
//! # Role In The Architecture
//!
//! - **Aliasing**: [`TableAliaser`] assigns one alias per relationship prefix
//!   and emits the LEFT join chain that reaches it.
//! - **Compilation**: [`compile_condition`] maps a [`Condition`] onto the
//!   shared alias map.
//! - **Planning**: [`SelectPlanner`] combines both into a [`SelectPlan`] used
//!   by point lookups, searches and validation re-fetches.
//! - **Rendering**: [`SqlWriter`] prints requests as SQL for text drivers and
//!   tracing.
//!
//! [`Condition`]: tabula_core::Condition

pub mod alias;
pub mod compile;
pub mod planner;
pub mod render;

pub use alias::{AliasMap, AliasStyle, TableAliaser, path_prefixes};
pub use compile::{column_for_path, compile_condition};
pub use planner::{PlannedField, SelectPlan, SelectPlanner};
pub use render::{Dialect, SqlWriter};
