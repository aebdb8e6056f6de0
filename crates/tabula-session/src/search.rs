//! Condition search.
//!
//! A search plans one select over the root entity, joined to every
//! relationship the condition or the read-only paths mention, and hands
//! back a forward-only [`SearchResults`] that turns rows into editable
//! instances one at a time.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tabula_core::{
    Condition, Connection, DataObject, Entity, Result, RowCursor, SchemaRegistry, Transaction,
    TransactionScope,
};
use tabula_query::{SelectPlan, SelectPlanner};

use crate::context::DataContext;
use crate::lookup::materialize;

/// A reusable search description.
#[derive(Debug, Clone, PartialEq)]
pub struct Search {
    entity: String,
    condition: Option<Condition>,
    read_only_paths: Vec<String>,
}

impl Search {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            condition: None,
            read_only_paths: Vec::new(),
        }
    }

    /// Restrict the results. Repeated calls combine with AND.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.condition = Some(match self.condition.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// Load these related paths read-only on every result.
    pub fn with_read_only<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.read_only_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn read_only_paths(&self) -> &[String] {
        &self.read_only_paths
    }
}

/// Lazily materialized search results.
///
/// Rows are converted as the iterator advances. A local transaction opened
/// for the search lives until the results are exhausted or dropped.
pub struct SearchResults {
    registry: Arc<SchemaRegistry>,
    entity: String,
    plan: SelectPlan,
    cursor: RowCursor,
    scope: Option<TransactionScope>,
    produced: usize,
}

impl SearchResults {
    /// The select that produced these results.
    pub fn plan(&self) -> &SelectPlan {
        &self.plan
    }

    fn finish(&mut self) {
        if let Some(scope) = self.scope.take() {
            if let Err(err) = scope.rollback() {
                tracing::warn!(error = %err, "Closing search transaction failed");
            }
        }
        tracing::debug!(entity = %self.entity, results = self.produced, "Search exhausted");
    }
}

impl Iterator for SearchResults {
    type Item = Result<DataObject>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.cursor.next() {
            Some(Ok(row)) => {
                self.produced += 1;
                Some(materialize(&self.registry, &self.entity, &self.plan, &row, true))
            }
            Some(Err(err)) => Some(Err(err)),
            None => {
                self.finish();
                None
            }
        }
    }
}

impl fmt::Debug for SearchResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchResults")
            .field("entity", &self.entity)
            .field("produced", &self.produced)
            .field("local_transaction", &self.scope.is_some())
            .finish_non_exhaustive()
    }
}

/// [`SearchResults`] mapped onto a typed facade.
pub struct TypedResults<E> {
    inner: SearchResults,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> Iterator for TypedResults<E> {
    type Item = Result<E>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|obj| obj.and_then(E::from_object))
    }
}

impl<E> fmt::Debug for TypedResults<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedResults").field(&self.inner).finish()
    }
}

impl<C: Connection> DataContext<C> {
    /// Find every instance of `entity` matching `condition`.
    ///
    /// Results are editable; `read_only_paths` are loaded read-only on each.
    /// No condition returns every row.
    #[tracing::instrument(level = "debug", skip(self, condition, read_only_paths, tx))]
    pub fn search(
        &self,
        entity: &str,
        condition: Option<&Condition>,
        read_only_paths: &[&str],
        tx: Option<&mut dyn Transaction>,
    ) -> Result<SearchResults> {
        let mut planner = SelectPlanner::new(self.registry(), entity)?
            .style(self.alias_style())
            .root_fields()
            .select_all(read_only_paths.iter().copied());
        if let Some(condition) = condition {
            planner = planner.filter(condition.clone());
        }
        let plan = planner.plan()?;
        tracing::info!(
            entity,
            joins = plan.request.joins.len(),
            fields = plan.fields.len(),
            "Searching"
        );
        self.trace_select(&plan.request);

        let (cursor, scope) = match tx {
            Some(tx) => (tx.select(&plan.request)?, None),
            None => {
                let mut scope = TransactionScope::begin(self.connection())?;
                let cursor = scope.transaction().select(&plan.request)?;
                (cursor, Some(scope))
            }
        };

        Ok(SearchResults {
            registry: Arc::clone(self.registry()),
            entity: entity.to_string(),
            plan,
            cursor,
            scope,
            produced: 0,
        })
    }

    /// Run a prepared [`Search`].
    pub fn run(&self, search: &Search, tx: Option<&mut dyn Transaction>) -> Result<SearchResults> {
        let paths: Vec<&str> = search.read_only_paths.iter().map(String::as_str).collect();
        self.search(&search.entity, search.condition.as_ref(), &paths, tx)
    }

    pub fn search_typed<E: Entity>(
        &self,
        condition: Option<&Condition>,
        read_only_paths: &[&str],
        tx: Option<&mut dyn Transaction>,
    ) -> Result<TypedResults<E>> {
        Ok(TypedResults {
            inner: self.search(E::ENTITY, condition, read_only_paths, tx)?,
            _marker: PhantomData,
        })
    }
}
