//! Select planning.
//!
//! A [`SelectPlanner`] turns a root entity, a set of requested paths and an
//! optional condition into a [`SelectPlan`]: the backend request plus the
//! bookkeeping needed to hydrate result rows back into instances.

use std::collections::BTreeSet;
use std::sync::Arc;

use tabula_core::{
    ColumnRef, Condition, EntityType, Error, GroupKind, Predicate, Result, SchemaRegistry,
    SelectItem, SelectRequest, TableRef, split_path,
};

use crate::alias::{AliasMap, AliasStyle, TableAliaser};
use crate::compile::compile_condition;

/// One selected field and where its value lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedField {
    /// Full dotted path from the root.
    pub path: String,
    /// Relationship prefix; empty for root fields.
    pub prefix: String,
    pub field: &'static str,
    /// Output alias in result rows.
    pub column_alias: String,
}

/// A ready-to-run select and its hydration map.
#[derive(Debug, Clone)]
pub struct SelectPlan {
    pub request: SelectRequest,
    pub aliases: AliasMap,
    /// Selected fields, ordered by prefix depth then path.
    pub fields: Vec<PlannedField>,
}

impl SelectPlan {
    /// Relationship prefixes that carry at least one selected field,
    /// shallowest first.
    pub fn prefixes(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.fields
            .iter()
            .map(|f| f.prefix.as_str())
            .filter(|p| !p.is_empty() && seen.insert(*p))
            .collect()
    }
}

/// Builder for [`SelectPlan`].
#[derive(Debug, Clone)]
pub struct SelectPlanner<'a> {
    registry: &'a SchemaRegistry,
    root: Arc<EntityType>,
    style: AliasStyle,
    paths: Vec<String>,
    condition: Option<Condition>,
    primary_key: Option<i64>,
}

impl<'a> SelectPlanner<'a> {
    pub fn new(registry: &'a SchemaRegistry, root: &str) -> Result<Self> {
        Ok(Self {
            registry,
            root: Arc::clone(registry.lookup(root)?),
            style: AliasStyle::default(),
            paths: Vec::new(),
            condition: None,
            primary_key: None,
        })
    }

    pub fn style(mut self, style: AliasStyle) -> Self {
        self.style = style;
        self
    }

    /// Select every scalar field of the root.
    pub fn root_fields(mut self) -> Self {
        let names: Vec<String> = self.root.fields().iter().map(|f| f.name.to_string()).collect();
        self.paths.extend(names);
        self
    }

    /// Select a path. A path ending in a relationship selects every field
    /// of the related entity.
    pub fn select(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn select_all<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Restrict to one root row.
    pub fn primary_key(mut self, key: i64) -> Self {
        self.primary_key = Some(key);
        self
    }

    /// Expand requested paths into field paths. Every joined prefix also
    /// selects its primary key so an absent related row can be told apart
    /// from one whose fields are NULL.
    fn field_paths(&self, requested: &[String]) -> Result<BTreeSet<String>> {
        let root = self.root.name();
        let mut paths = BTreeSet::new();
        paths.insert(self.root.primary_key().name.to_string());

        for path in requested {
            let (prefix, _) = split_path(path);
            let target_prefix = match self.registry.resolve_field(root, path) {
                Ok(_) => {
                    paths.insert(path.clone());
                    prefix.to_string()
                }
                Err(Error::UnknownPath { .. }) => {
                    let rel = self.registry.resolve_relationship(root, path)?;
                    let related = self.registry.lookup(rel.related_entity)?;
                    for field in related.fields() {
                        paths.insert(format!("{path}.{}", field.name));
                    }
                    path.clone()
                }
                Err(other) => return Err(other),
            };

            let mut acc = String::new();
            for segment in target_prefix.split('.').filter(|s| !s.is_empty()) {
                if !acc.is_empty() {
                    acc.push('.');
                }
                acc.push_str(segment);
                let owner = self.registry.resolve_relationship(root, &acc)?;
                let key = self.registry.lookup(owner.related_entity)?.primary_key().name;
                paths.insert(format!("{acc}.{key}"));
            }
        }
        Ok(paths)
    }

    pub fn plan(self) -> Result<SelectPlan> {
        let root = self.root.name();
        let aliaser = TableAliaser::new(self.registry, root)?;

        let selected = self.field_paths(&self.paths)?;
        let (mut aliases, mut joins) = aliaser.build(&selected, self.style.clone())?;

        let mut all = selected.clone();
        if let Some(condition) = &self.condition {
            let referenced: Vec<String> = condition
                .field_paths()
                .into_iter()
                .filter(|p| self.registry.resolve_field(root, p).is_ok())
                .collect();
            aliaser.extend(&mut aliases, &mut joins, condition.field_paths())?;
            all.extend(self.field_paths(&referenced)?);
            aliaser.extend(&mut aliases, &mut joins, &all)?;
        }

        let mut fields = Vec::with_capacity(all.len());
        for path in &all {
            let (prefix, _) = split_path(path);
            let field = self.registry.resolve_field(root, path)?;
            let column_alias = aliases
                .column_alias(prefix, field.name)
                .ok_or_else(|| Error::unknown_path(root, path.as_str()))?;
            fields.push(PlannedField {
                path: path.clone(),
                prefix: prefix.to_string(),
                field: field.name,
                column_alias,
            });
        }
        fields.sort_by(|a, b| {
            let depth = |f: &PlannedField| f.prefix.split('.').filter(|s| !s.is_empty()).count();
            depth(a).cmp(&depth(b)).then_with(|| a.path.cmp(&b.path))
        });

        let mut conjuncts = Vec::new();
        if let Some(key) = self.primary_key {
            conjuncts.push(Predicate::equals(
                ColumnRef::new(aliases.root(), self.root.primary_key().name),
                key,
            ));
        }
        if let Some(condition) = &self.condition {
            conjuncts.push(compile_condition(self.registry, root, &aliases, condition)?);
        }
        let predicate = match conjuncts.len() {
            0 => None,
            1 => conjuncts.pop(),
            _ => Some(Predicate::Group {
                kind: GroupKind::And,
                predicates: conjuncts,
            }),
        };

        let items = fields
            .iter()
            .map(|f| {
                let alias = aliases.get(&f.prefix).unwrap_or_default();
                SelectItem {
                    column: ColumnRef::new(alias, f.field),
                    alias: f.column_alias.clone(),
                }
            })
            .collect();

        let request = SelectRequest {
            items,
            from: TableRef {
                table: self.root.table(),
                alias: aliases.root().to_string(),
            },
            joins,
            predicate,
        };

        tracing::debug!(
            entity = root,
            fields = fields.len(),
            joins = request.joins.len(),
            "Planned select"
        );

        Ok(SelectPlan {
            request,
            aliases,
            fields,
        })
    }
}
