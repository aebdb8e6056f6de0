//! Entity lifecycle, search and validation for Tabula.
//!
//! [`DataContext`] is the entry point. It owns a
//! [`Connection`](tabula_core::Connection), the shared
//! [`SchemaRegistry`](tabula_core::SchemaRegistry), the registered
//! [`ValidationRule`]s and per-entity [`EntityHooks`], and offers:
//!
//! - point lookups: [`DataContext::get_read_only`], [`DataContext::get_editable`]
//!   and lazy [`DataContext::load_related`]
//! - [`DataContext::save`] and [`DataContext::delete`], the latter resolving
//!   foreign-key conflicts according to each relationship list's policy
//! - [`DataContext::search`], returning lazily materialized [`SearchResults`]
//! - [`DataContext::validate`]
//!
//! Every operation takes an optional caller transaction. Without one, a
//! local transaction is opened and committed only on success.

pub mod config;
mod conflict;
pub mod context;
pub mod hooks;
mod lifecycle;
mod lookup;
pub mod search;
pub mod validation;

pub use config::ContextConfig;
pub use context::DataContext;
pub use hooks::EntityHooks;
pub use search::{Search, SearchResults, TypedResults};
pub use validation::{RuleCheck, ValidationRule, Validator, matches_pattern};
