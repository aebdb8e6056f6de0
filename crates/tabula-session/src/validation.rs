//! Declarative validation.
//!
//! A [`ValidationRule`] belongs to one entity type and names the field its
//! failure is reported against. Rules are evaluated against a snapshot of
//! the instance in which every path the rules mention is readable: root
//! fields the instance does not carry are fetched by primary key, and each
//! first-level relationship is fetched read-only through the FK value held
//! in memory, so unsaved edits are what gets validated.
//!
//! A rule whose path cannot be resolved is logged and counts as failed.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{OnceLock, PoisonError, RwLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tabula_core::{Condition, Connection, DataObject, Error, Result, Transaction, Value};
use tabula_query::SelectPlanner;

use crate::context::DataContext;

// ============================================================================
// Pattern matching
// ============================================================================

/// Compiled patterns, shared by every rule.
struct RegexCache {
    cache: RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &str) -> std::result::Result<Regex, regex::Error> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(pattern)?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::new)
}

/// Whether `value` matches `pattern`. An invalid pattern never matches and
/// is logged.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match regex_cache().get_or_compile(pattern) {
        Ok(regex) => regex.is_match(value),
        Err(e) => {
            tracing::warn!(
                pattern = pattern,
                error = %e,
                "Invalid regex pattern in validation rule, treating as non-match"
            );
            false
        }
    }
}

// ============================================================================
// Rules
// ============================================================================

/// What a rule checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCheck {
    /// Passes when the condition holds.
    Condition(Condition),
    /// Passes when the value at `path` is non-NULL and matches `pattern`.
    Pattern { path: String, pattern: String },
}

/// One validation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    entity: String,
    field: String,
    message: String,
    check: RuleCheck,
}

/// Read a dotted path through guarded accessors. A missing related row
/// reads as NULL; a path ending in a relationship reads its FK value.
fn read_path(obj: &DataObject, path: &str) -> Result<Value> {
    match path.split_once('.') {
        None => match (obj.entity().field(path), obj.entity().relationship(path)) {
            (None, Some(rel)) => obj.get(rel.foreign_key).cloned(),
            _ => obj.get(path).cloned(),
        },
        Some((head, rest)) => match obj.related(head)? {
            Some(related) => read_path(related, rest),
            None => Ok(Value::Null),
        },
    }
}

impl ValidationRule {
    pub fn condition(
        entity: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
        condition: Condition,
    ) -> Self {
        Self {
            entity: entity.into(),
            field: field.into(),
            message: message.into(),
            check: RuleCheck::Condition(condition),
        }
    }

    /// Require the text at `field` to match a regular expression.
    pub fn pattern(
        entity: impl Into<String>,
        field: impl Into<String>,
        pattern: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let field = field.into();
        Self {
            entity: entity.into(),
            check: RuleCheck::Pattern {
                path: field.clone(),
                pattern: pattern.into(),
            },
            field,
            message: message.into(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Field the failure is reported against.
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn check(&self) -> &RuleCheck {
        &self.check
    }

    /// Every path the rule reads.
    pub fn paths(&self) -> BTreeSet<String> {
        match &self.check {
            RuleCheck::Condition(condition) => condition.field_paths(),
            RuleCheck::Pattern { path, .. } => BTreeSet::from([path.clone()]),
        }
    }

    /// Evaluate against a snapshot. Resolution failures count as failed.
    pub fn is_satisfied(&self, obj: &DataObject) -> bool {
        let outcome = match &self.check {
            RuleCheck::Condition(condition) => {
                condition.evaluate(&mut |path: &str| read_path(obj, path))
            }
            RuleCheck::Pattern { path, pattern } => read_path(obj, path).map(|value| match value {
                Value::Null => false,
                Value::Text(text) => matches_pattern(&text, pattern),
                other => matches_pattern(&other.to_string(), pattern),
            }),
        };
        outcome.unwrap_or_else(|err| {
            tracing::warn!(
                entity = %self.entity,
                field = %self.field,
                error = %err,
                "Validation rule could not be evaluated"
            );
            false
        })
    }
}

/// Rules keyed by entity type.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    rules: BTreeMap<String, Vec<ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, rule: ValidationRule) {
        tracing::debug!(entity = %rule.entity, field = %rule.field, "Registering validation rule");
        self.rules.entry(rule.entity.clone()).or_default().push(rule);
    }

    /// Load a JSON array of rules.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let rules: Vec<ValidationRule> = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid validation rules: {e}")))?;
        let mut validator = Self::new();
        for rule in rules {
            validator.register(rule);
        }
        Ok(validator)
    }

    pub fn rules_for(&self, entity: &str) -> &[ValidationRule] {
        self.rules.get(entity).map(Vec::as_slice).unwrap_or_default()
    }

    /// Total rule count.
    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.values().all(Vec::is_empty)
    }
}

// ============================================================================
// Evaluation
// ============================================================================

impl<C: Connection> DataContext<C> {
    /// Add every rule of a validator. Their entity types must be registered.
    pub fn register_rules(&mut self, validator: Validator) -> Result<()> {
        for rule in validator.rules.into_values().flatten() {
            self.register_rule(rule)?;
        }
        Ok(())
    }

    /// Run every rule of the instance's entity type.
    ///
    /// Clears and refills [`DataObject::errors`] and reports whether it ended
    /// up empty. Fetches run in `tx`, or in a local read transaction; none
    /// are issued when the entity type has no rules.
    #[tracing::instrument(level = "debug", skip(self, obj, tx), fields(entity = obj.entity_name()))]
    pub fn validate(&self, obj: &mut DataObject, tx: Option<&mut dyn Transaction>) -> Result<bool> {
        obj.errors_mut().clear();
        if self.validator().rules_for(obj.entity_name()).is_empty() {
            return Ok(true);
        }
        self.with_read(tx, |tx| self.evaluate_rules(obj, tx))
    }

    pub(crate) fn validate_in(&self, obj: &mut DataObject, tx: &mut dyn Transaction) -> Result<bool> {
        obj.errors_mut().clear();
        if self.validator().rules_for(obj.entity_name()).is_empty() {
            return Ok(true);
        }
        self.evaluate_rules(obj, tx)
    }

    fn evaluate_rules(&self, obj: &mut DataObject, tx: &mut dyn Transaction) -> Result<bool> {
        let rules = self.validator().rules_for(obj.entity_name());
        let snapshot = self.snapshot(obj, rules, tx)?;
        for rule in rules {
            if !rule.is_satisfied(&snapshot) {
                obj.errors_mut().add(rule.field(), rule.message());
            }
        }
        tracing::debug!(
            entity = obj.entity_name(),
            rules = rules.len(),
            errors = obj.errors().len(),
            "Validated"
        );
        Ok(obj.errors().is_empty())
    }

    /// A copy of `obj` on which every path the rules read is loaded.
    fn snapshot(
        &self,
        obj: &DataObject,
        rules: &[ValidationRule],
        tx: &mut dyn Transaction,
    ) -> Result<DataObject> {
        let entity = obj.entity_name();
        let mut snapshot = match (obj.is_editable(), obj.primary_key()) {
            (false, Some(primary_key)) => {
                let plan = SelectPlanner::new(self.registry(), entity)?
                    .style(self.alias_style())
                    .root_fields()
                    .primary_key(primary_key)
                    .plan()?;
                match self.fetch_one(tx, entity, &plan, true)? {
                    Some(mut fresh) => {
                        obj.copy_to(&mut fresh)?;
                        fresh
                    }
                    None => obj.clone(),
                }
            }
            _ => obj.clone(),
        };

        // First-level relationship -> deeper paths needed below it.
        let mut nested: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        for path in rules.iter().flat_map(ValidationRule::paths) {
            let Some((head, rest)) = path.split_once('.') else {
                continue;
            };
            let Some(rel) = obj.entity().relationship(head) else {
                continue;
            };
            let deeper = nested.entry(rel.name).or_default();
            if rest.contains('.')
                && self.registry().resolve_field(rel.related_entity, rest).is_ok()
            {
                deeper.push(rest.to_string());
            }
        }

        for (name, paths) in nested {
            let rel = *snapshot
                .entity()
                .relationship(name)
                .ok_or_else(|| Error::unknown_path(entity, name))?;
            let fk = snapshot.raw_field(rel.foreign_key).cloned().unwrap_or_default();
            let key_field = self.registry().related_key(&rel)?.name;

            // An attached editable instance carries the caller's unsaved
            // state and stays as it is.
            let reusable = snapshot.is_retrieved(name)
                && snapshot.related(name)?.is_some_and(|related| {
                    related.is_editable() && related.raw_field(key_field) == Some(&fk)
                });
            if reusable {
                continue;
            }
            match self.fetch_related(tx, &rel, &fk, &paths)? {
                Some(related) => snapshot.attach_related(name, related)?,
                None => snapshot.mark_related_absent(name)?,
            }
        }
        Ok(snapshot)
    }
}
