//! Path resolution and table aliasing.
//!
//! Every query gets a fresh [`AliasMap`] from relationship-path prefix to
//! table alias. The root table is the empty prefix. Prefixes are processed in
//! sorted order so the numbering depends only on the *set* of paths, never on
//! the order the caller listed them in. Each newly aliased prefix contributes
//! one LEFT join from its parent, so a missing related row yields NULLs instead
//! of dropping the owning row.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tabula_core::{
    ColumnRef, ComparisonOp, EntityType, Error, Join, JoinKind, Operand, Predicate, Result,
    SchemaRegistry, TableRef, split_path,
};

/// How aliases are spelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasStyle {
    pub prefix: String,
    /// Zero-padded digit count.
    pub width: usize,
}

impl AliasStyle {
    pub fn new(prefix: impl Into<String>, width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            width,
        }
    }

    fn alias(&self, index: usize) -> String {
        format!("{}{:0width$}", self.prefix, index, width = self.width)
    }
}

impl Default for AliasStyle {
    fn default() -> Self {
        Self::new("table", 3)
    }
}

/// Prefix → alias for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasMap {
    style: AliasStyle,
    aliases: BTreeMap<String, String>,
    next: usize,
}

impl AliasMap {
    /// A map holding only the root alias.
    pub fn new(style: AliasStyle) -> Self {
        let mut aliases = BTreeMap::new();
        aliases.insert(String::new(), style.alias(0));
        Self {
            style,
            aliases,
            next: 1,
        }
    }

    pub fn root(&self) -> &str {
        self.get("").unwrap_or_default()
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.aliases.get(prefix).map(String::as_str)
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.aliases.contains_key(prefix)
    }

    /// Number of aliased prefixes, root included.
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// `(prefix, alias)` pairs in prefix order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(p, a)| (p.as_str(), a.as_str()))
    }

    /// Output column alias `<alias>_<field>` for a field under `prefix`.
    pub fn column_alias(&self, prefix: &str, field: &str) -> Option<String> {
        self.get(prefix).map(|alias| format!("{alias}_{field}"))
    }

    fn allocate(&mut self, prefix: &str) -> String {
        let alias = self.style.alias(self.next);
        self.next += 1;
        self.aliases.insert(prefix.to_string(), alias.clone());
        alias
    }
}

/// Distinct non-empty relationship prefixes of a set of paths, sorted.
pub fn path_prefixes<I, S>(paths: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    paths
        .into_iter()
        .map(|path| split_path(path.as_ref()).0.to_string())
        .filter(|prefix| !prefix.is_empty())
        .collect()
}

/// Assigns aliases and joins for paths rooted at one entity type.
#[derive(Debug, Clone)]
pub struct TableAliaser<'a> {
    registry: &'a SchemaRegistry,
    root: Arc<EntityType>,
}

impl<'a> TableAliaser<'a> {
    pub fn new(registry: &'a SchemaRegistry, root: &str) -> Result<Self> {
        Ok(Self {
            registry,
            root: Arc::clone(registry.lookup(root)?),
        })
    }

    pub fn root(&self) -> &Arc<EntityType> {
        &self.root
    }

    /// Build a fresh alias map and join list covering `paths`.
    pub fn build<I, S>(&self, paths: I, style: AliasStyle) -> Result<(AliasMap, Vec<Join>)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut aliases = AliasMap::new(style);
        let mut joins = Vec::new();
        self.extend(&mut aliases, &mut joins, paths)?;
        Ok((aliases, joins))
    }

    /// Cover additional paths, reusing every prefix already in `aliases`.
    pub fn extend<I, S>(&self, aliases: &mut AliasMap, joins: &mut Vec<Join>, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for prefix in path_prefixes(paths) {
            self.extend_prefix(aliases, joins, &prefix)?;
        }
        Ok(())
    }

    fn extend_prefix(&self, aliases: &mut AliasMap, joins: &mut Vec<Join>, prefix: &str) -> Result<()> {
        let mut owner = &self.root;
        let mut parent = String::new();
        for segment in prefix.split('.') {
            let current = if parent.is_empty() {
                segment.to_string()
            } else {
                format!("{parent}.{segment}")
            };
            let rel = owner
                .relationship(segment)
                .ok_or_else(|| Error::unknown_path(self.root.name(), prefix))?;
            let related = self.registry.lookup(rel.related_entity)?;

            if !aliases.contains(&current) {
                let parent_alias = aliases
                    .get(&parent)
                    .ok_or_else(|| Error::unknown_path(self.root.name(), prefix))?
                    .to_string();
                let related_key = self.registry.related_key(rel)?;
                let alias = aliases.allocate(&current);
                tracing::trace!(prefix = %current, alias = %alias, "Allocated table alias");
                joins.push(Join {
                    kind: JoinKind::Left,
                    table: TableRef {
                        table: related.table(),
                        alias: alias.clone(),
                    },
                    on: Predicate::Compare {
                        left: ColumnRef::new(parent_alias, rel.foreign_key),
                        op: ComparisonOp::Equal,
                        right: Operand::Column(ColumnRef::new(alias, related_key.name)),
                    },
                });
            }

            owner = related;
            parent = current;
        }
        Ok(())
    }
}
