//! Condition tree compilation.

use tabula_core::{
    ColumnRef, ComparisonOp, Condition, ConditionOperand, Error, Operand, Predicate, Result,
    SchemaRegistry, Value, split_path,
};

use crate::alias::AliasMap;

/// Column addressed by a dotted path.
///
/// A path ending in a field addresses that field; a path ending in a
/// relationship addresses the relationship's FK column on its owner.
pub fn column_for_path(
    registry: &SchemaRegistry,
    root: &str,
    aliases: &AliasMap,
    path: &str,
) -> Result<ColumnRef> {
    let (prefix, _) = split_path(path);
    let column = match registry.resolve_field(root, path) {
        Ok(field) => field.name,
        Err(Error::UnknownPath { .. }) => registry.resolve_relationship(root, path)?.foreign_key,
        Err(other) => return Err(other),
    };
    let alias = aliases
        .get(prefix)
        .ok_or_else(|| Error::unknown_path(root, path))?;
    Ok(ColumnRef::new(alias, column))
}

/// Translate a condition into a backend predicate using `aliases`.
///
/// Every prefix referenced by the condition must already be aliased.
/// Equality against a NULL literal becomes an `IS NULL` test.
pub fn compile_condition(
    registry: &SchemaRegistry,
    root: &str,
    aliases: &AliasMap,
    condition: &Condition,
) -> Result<Predicate> {
    match condition {
        Condition::Compare { path, op, operand } => {
            let left = column_for_path(registry, root, aliases, path)?;
            match (op, operand) {
                (ComparisonOp::Equal | ComparisonOp::NotEqual, ConditionOperand::Literal(Value::Null)) => {
                    Ok(Predicate::IsNull {
                        column: left,
                        negated: *op == ComparisonOp::NotEqual,
                    })
                }
                (_, ConditionOperand::Literal(value)) => Ok(Predicate::Compare {
                    left,
                    op: *op,
                    right: Operand::Literal(value.clone()),
                }),
                (_, ConditionOperand::List(values)) => {
                    if !op.is_membership() {
                        return Err(Error::TypeMismatch {
                            expected: "single operand".to_string(),
                            found: format!("list for {}", op.as_sql()),
                        });
                    }
                    Ok(Predicate::Compare {
                        left,
                        op: *op,
                        right: Operand::List(values.clone()),
                    })
                }
                (_, ConditionOperand::Field(other)) => Ok(Predicate::Compare {
                    left,
                    op: *op,
                    right: Operand::Column(column_for_path(registry, root, aliases, other)?),
                }),
            }
        }
        Condition::Group { kind, conditions } => Ok(Predicate::Group {
            kind: *kind,
            predicates: conditions
                .iter()
                .map(|c| compile_condition(registry, root, aliases, c))
                .collect::<Result<_>>()?,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::tests::registry;
    use crate::alias::{AliasStyle, TableAliaser};
    use tabula_core::GroupKind;

    #[test]
    fn test_compile_with_join() {
        let registry = registry();
        let condition = Condition::eq("Name", "Alice").and(Condition::eq("Country.Name", "Canada"));
        let aliaser = TableAliaser::new(&registry, "City").unwrap();
        let (aliases, _) = aliaser
            .build(condition.field_paths(), AliasStyle::default())
            .unwrap();

        let predicate = compile_condition(&registry, "City", &aliases, &condition).unwrap();
        assert_eq!(
            predicate,
            Predicate::Group {
                kind: GroupKind::And,
                predicates: vec![
                    Predicate::equals(ColumnRef::new("table000", "Name"), "Alice"),
                    Predicate::equals(ColumnRef::new("table001", "Name"), "Canada"),
                ],
            }
        );
    }

    #[test]
    fn test_relationship_path_uses_foreign_key() {
        let registry = registry();
        let aliases = AliasMap::new(AliasStyle::default());
        let column = column_for_path(&registry, "City", &aliases, "Country").unwrap();
        assert_eq!(column, ColumnRef::new("table000", "CountryID"));
    }

    #[test]
    fn test_null_literal_becomes_is_null() {
        let registry = registry();
        let aliases = AliasMap::new(AliasStyle::default());
        let predicate =
            compile_condition(&registry, "City", &aliases, &Condition::ne("Name", Value::Null))
                .unwrap();
        assert_eq!(
            predicate,
            Predicate::IsNull {
                column: ColumnRef::new("table000", "Name"),
                negated: true,
            }
        );
    }

    #[test]
    fn test_unaliased_and_unknown_paths() {
        let registry = registry();
        let aliases = AliasMap::new(AliasStyle::default());
        assert_eq!(
            compile_condition(&registry, "City", &aliases, &Condition::eq("Country.Name", "x"))
                .unwrap_err(),
            Error::unknown_path("City", "Country.Name")
        );
        assert_eq!(
            compile_condition(&registry, "City", &aliases, &Condition::eq("Mayor", "x"))
                .unwrap_err(),
            Error::unknown_path("City", "Mayor")
        );
    }
}
