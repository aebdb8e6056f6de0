//! The data context.
//!
//! A [`DataContext`] ties a [`Connection`] to a registry, the validation
//! rules and the per-entity hooks. Every operation accepts an optional
//! caller transaction. Without one the context opens a local transaction,
//! commits it only when the operation succeeds, and rolls it back on every
//! other exit.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tabula_core::{
    Connection, DeleteRequest, InsertRequest, Result, SchemaRegistry, SelectRequest, Transaction,
    TransactionScope, UpdateRequest,
};
use tabula_query::{AliasStyle, SqlWriter};

use crate::config::ContextConfig;
use crate::hooks::{EntityHooks, NoHooks};
use crate::validation::{ValidationRule, Validator};

/// Entry point for lookups, search, save, delete and validation.
pub struct DataContext<C> {
    connection: C,
    registry: Arc<SchemaRegistry>,
    validator: Validator,
    hooks: BTreeMap<&'static str, Arc<dyn EntityHooks>>,
    config: ContextConfig,
}

impl<C: Connection> DataContext<C> {
    pub fn new(connection: C, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            connection,
            registry,
            validator: Validator::new(),
            hooks: BTreeMap::new(),
            config: ContextConfig::default(),
        }
    }

    /// Create a context with explicit configuration.
    pub fn with_config(
        connection: C,
        registry: Arc<SchemaRegistry>,
        config: ContextConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut context = Self::new(connection, registry);
        context.config = config;
        Ok(context)
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Add a validation rule. The rule's entity type must be registered.
    #[tracing::instrument(level = "debug", skip(self, rule), fields(entity = rule.entity()))]
    pub fn register_rule(&mut self, rule: ValidationRule) -> Result<()> {
        self.registry.lookup(rule.entity())?;
        self.validator.register(rule);
        Ok(())
    }

    /// Install hooks for an entity type, replacing any installed before.
    #[tracing::instrument(level = "debug", skip(self, hooks))]
    pub fn register_hooks(&mut self, entity: &str, hooks: impl EntityHooks + 'static) -> Result<()> {
        let name = self.registry.lookup(entity)?.name();
        tracing::info!(entity = name, "Registering entity hooks");
        self.hooks.insert(name, Arc::new(hooks));
        Ok(())
    }

    /// Open a transaction for callers that want to group several operations.
    pub fn begin(&self) -> Result<TransactionScope> {
        TransactionScope::begin(&self.connection)
    }

    // ========================================================================
    // Internals shared by the operation modules
    // ========================================================================

    pub(crate) fn alias_style(&self) -> AliasStyle {
        self.config.alias_style()
    }

    pub(crate) fn hooks_for(&self, entity: &str) -> Arc<dyn EntityHooks> {
        self.hooks
            .get(entity)
            .cloned()
            .unwrap_or_else(|| Arc::new(NoHooks))
    }

    /// Run a read with the caller's transaction or a local one that is
    /// rolled back afterwards.
    pub(crate) fn with_read<T>(
        &self,
        tx: Option<&mut dyn Transaction>,
        f: impl FnOnce(&mut dyn Transaction) -> Result<T>,
    ) -> Result<T> {
        match tx {
            Some(tx) => f(tx),
            None => {
                let mut scope = TransactionScope::begin(&self.connection)?;
                let value = f(scope.transaction())?;
                scope.rollback()?;
                Ok(value)
            }
        }
    }

    /// Run a write with the caller's transaction or a local one. The local
    /// transaction is committed only when `f` reports success.
    pub(crate) fn with_write(
        &self,
        tx: Option<&mut dyn Transaction>,
        f: impl FnOnce(&mut dyn Transaction) -> Result<bool>,
    ) -> Result<bool> {
        match tx {
            Some(tx) => f(tx),
            None => {
                let mut scope = TransactionScope::begin(&self.connection)?;
                if f(scope.transaction())? {
                    scope.commit()?;
                    Ok(true)
                } else {
                    scope.rollback()?;
                    Ok(false)
                }
            }
        }
    }

    pub(crate) fn trace_select(&self, request: &SelectRequest) {
        if self.config.trace_sql {
            let (sql, params) = SqlWriter::new(self.config.dialect).select(request);
            tracing::trace!(sql = %sql, params = ?params, "Executing select");
        }
    }

    pub(crate) fn trace_insert(&self, request: &InsertRequest) {
        if self.config.trace_sql {
            let (sql, params) = SqlWriter::new(self.config.dialect).insert(request);
            tracing::trace!(sql = %sql, params = ?params, "Executing insert");
        }
    }

    pub(crate) fn trace_update(&self, request: &UpdateRequest) {
        if self.config.trace_sql {
            let (sql, params) = SqlWriter::new(self.config.dialect).update(request);
            tracing::trace!(sql = %sql, params = ?params, "Executing update");
        }
    }

    pub(crate) fn trace_delete(&self, request: &DeleteRequest) {
        if self.config.trace_sql {
            let (sql, params) = SqlWriter::new(self.config.dialect).delete(request);
            tracing::trace!(sql = %sql, params = ?params, "Executing delete");
        }
    }
}

impl<C: fmt::Debug> fmt::Debug for DataContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataContext")
            .field("connection", &self.connection)
            .field("entities", &self.registry.entities().count())
            .field("rules", &self.validator.len())
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}
