//! Unit resolution and segment tables
//!
//! Unit values are expressions that may name units defined later in the
//! document. Definitions are evaluated in document order; when one hits an
//! undefined name it is deferred and the referenced definition is evaluated
//! first. A name already on the deferral stack is a cycle.

use std::collections::VecDeque;
use std::str::FromStr;

use crate::context::{Context, SegmentTable, UnitTable};
use crate::decimal::FixedDecimal;
use crate::errors::Error;
use crate::expr::evaluate_expression;
use crate::token::{TokenKind, tokenize};

/// A `<unit id value>` definition before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDefinition {
    pub id: String,
    pub value: String,
}

impl UnitDefinition {
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// A reusable path fragment, expanded wherever its id is invoked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub id: String,
    /// Path data of the body
    pub pattern: String,
}

impl Segment {
    pub fn new(id: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pattern: pattern.into(),
        }
    }
}

/// Externally supplied unit value, written `name=value`
#[derive(Debug, Clone, PartialEq)]
pub struct UnitOverride {
    pub name: String,
    pub value: FixedDecimal,
}

impl FromStr for UnitOverride {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| Error::InvalidOverride {
            text: text.to_string(),
            reason: reason.to_string(),
        };

        let Some((name, value)) = text.split_once('=') else {
            return Err(invalid("missing \"=\""));
        };
        if value.contains('=') {
            return Err(invalid("more than one \"=\""));
        }

        let name = name.trim();
        let is_identifier = matches!(
            tokenize("override", name).as_deref(),
            Ok([first, end])
                if matches!(first.kind, TokenKind::Identifier | TokenKind::Command)
                    && end.kind == TokenKind::End
        );
        if !is_identifier {
            return Err(invalid("the name is not an identifier"));
        }

        let value = value
            .trim()
            .parse::<FixedDecimal>()
            .map_err(|_| invalid("the value is not a decimal number"))?;
        Ok(Self {
            name: name.to_string(),
            value,
        })
    }
}

/// Resolve unit definitions into a table, overrides first.
///
/// An overridden definition is never evaluated.
pub fn resolve_units(
    definitions: Vec<UnitDefinition>,
    overrides: &[UnitOverride],
) -> Result<UnitTable, Error> {
    let mut context = Context::default();
    for UnitOverride { name, value } in overrides {
        context.units.insert(name.clone(), value.clone());
    }

    let mut pending: VecDeque<UnitDefinition> = definitions
        .into_iter()
        .filter(|definition| {
            let overridden = context.units.contains_key(&definition.id);
            if overridden {
                crate::log::debug!(unit = %definition.id, "unit overridden");
            }
            !overridden
        })
        .collect();
    let mut deferred: Vec<UnitDefinition> = Vec::new();

    while let Some(unit) = deferred.pop().or_else(|| pending.pop_front()) {
        match evaluate_expression(&unit.id, &unit.value, &context) {
            Ok(value) => {
                if context.units.contains_key(&unit.id) {
                    return Err(Error::DuplicateUnit { id: unit.id });
                }
                crate::log::debug!(unit = %unit.id, %value, "resolved unit");
                context.units.insert(unit.id, value);
            }
            Err(Error::UndefinedReference {
                name,
                column,
                src,
                span,
            }) => {
                let mut matches = pending
                    .iter()
                    .enumerate()
                    .filter(|(_, definition)| definition.id == name)
                    .map(|(index, _)| index);
                match (matches.next(), matches.next()) {
                    (Some(_), Some(_)) => {
                        return Err(Error::AmbiguousReference {
                            unit: unit.id,
                            name,
                            column,
                            src,
                            span,
                        });
                    }
                    (Some(index), None) => {
                        let Some(target) = pending.remove(index) else {
                            return Err(Error::UnresolvedReference {
                                unit: unit.id,
                                name,
                                column,
                                src,
                                span,
                            });
                        };
                        crate::log::trace!(unit = %unit.id, waiting_for = %name, "deferring unit");
                        deferred.push(unit);
                        deferred.push(target);
                    }
                    (None, _)
                        if name == unit.id
                            || deferred.iter().any(|definition| definition.id == name) =>
                    {
                        let mut chain: Vec<&str> = deferred
                            .iter()
                            .map(|definition| definition.id.as_str())
                            .collect();
                        chain.push(&unit.id);
                        chain.push(&name);
                        let chain = chain.join(" -> ");
                        return Err(Error::CircularReference {
                            name,
                            chain,
                            column,
                            src,
                            span,
                        });
                    }
                    (None, _) => {
                        return Err(Error::UnresolvedReference {
                            unit: unit.id,
                            name,
                            column,
                            src,
                            span,
                        });
                    }
                }
            }
            Err(err) => return Err(err),
        }
    }

    Ok(context.units)
}

/// Index segments by id.
pub fn segment_table(segments: Vec<Segment>, units: &UnitTable) -> Result<SegmentTable, Error> {
    let mut table = SegmentTable::new();
    for segment in segments {
        if units.contains_key(&segment.id) {
            return Err(Error::SegmentIsUnit { id: segment.id });
        }
        if table.contains_key(&segment.id) {
            return Err(Error::DuplicateSegment { id: segment.id });
        }
        crate::log::trace!(segment = %segment.id, "segment defined");
        table.insert(segment.id.clone(), segment);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn resolve(definitions: &[(&str, &str)]) -> Result<UnitTable, Error> {
        let definitions = definitions
            .iter()
            .map(|(id, value)| UnitDefinition::new(*id, *value))
            .collect();
        resolve_units(definitions, &[])
    }

    fn value(table: &UnitTable, id: &str) -> String {
        table[id].format(-1)
    }

    #[test]
    fn forward_references_resolve() {
        let table = resolve(&[("q", "3n + 4pp((3))"), ("pp", "3n"), ("n", "2")]).unwrap();
        assert_eq!(value(&table, "n"), "2");
        assert_eq!(value(&table, "pp"), "6");
        assert_eq!(value(&table, "q"), "78");
    }

    #[test]
    fn chains_of_deferrals() {
        let table = resolve(&[("a", "b + 1"), ("b", "c * 2"), ("c", "d / 4"), ("d", "8")]).unwrap();
        assert_eq!(value(&table, "a"), "5");
    }

    #[test]
    fn cycles_are_reported() {
        let err = resolve(&[("a", "b"), ("b", "a")]).unwrap_err();
        match &err {
            Error::CircularReference {
                name, chain, column, ..
            } => {
                assert_eq!(name, "a");
                assert_eq!(chain, "a -> b -> a");
                assert_eq!(*column, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.kind(), ErrorKind::Reference);
    }

    #[test]
    fn command_letters_name_units() {
        let table = resolve(&[("a", "2c"), ("c", "s + 1"), ("s", "3")]).unwrap();
        assert_eq!(value(&table, "a"), "8");
    }

    #[test]
    fn cycle_through_a_later_reference_keeps_its_column() {
        let err = resolve(&[("x", "1"), ("a", "x + b"), ("b", "2a")]).unwrap_err();
        assert!(matches!(
            &err,
            Error::CircularReference { name, column: 1, chain, .. }
                if name == "a" && chain == "a -> b -> a"
        ));
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let err = resolve(&[("a", "2a")]).unwrap_err();
        assert!(matches!(err, Error::CircularReference { chain, .. } if chain == "a -> a"));
    }

    #[test]
    fn unknown_names() {
        let err = resolve(&[("a", "1 + nope")]).unwrap_err();
        assert!(matches!(
            &err,
            Error::UnresolvedReference { unit, name, column: 4, .. }
                if unit == "a" && name == "nope"
        ));
        assert_eq!(err.kind(), ErrorKind::Reference);
        assert_eq!(
            err.to_string(),
            "unable to resolve unit \"a\": \"nope\" is undefined at column 4"
        );
    }

    #[test]
    fn duplicates() {
        let err = resolve(&[("a", "1 + b"), ("b", "1"), ("b", "2")]).unwrap_err();
        assert!(matches!(&err, Error::AmbiguousReference { name, column: 4, .. } if name == "b"));
        assert_eq!(err.kind(), ErrorKind::DuplicateDefinition);

        let err = resolve(&[("a", "1"), ("a", "2")]).unwrap_err();
        assert!(matches!(err, Error::DuplicateUnit { id } if id == "a"));
    }

    #[test]
    fn syntax_errors_propagate() {
        let err = resolve(&[("a", "1 +")]).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEnd { .. }));
    }

    #[test]
    fn overrides_win() {
        let overrides = vec!["w=12.5".parse::<UnitOverride>().unwrap()];
        let definitions = vec![
            UnitDefinition::new("half", "w/2"),
            UnitDefinition::new("w", "broken +"),
        ];
        let table = resolve_units(definitions, &overrides).unwrap();
        assert_eq!(value(&table, "w"), "12.5");
        assert_eq!(value(&table, "half"), "6.25");
    }

    #[test]
    fn parse_overrides() {
        let parsed: UnitOverride = " gap = -0.25 ".parse().unwrap();
        assert_eq!(parsed.name, "gap");
        assert_eq!(parsed.value.format(-1), "-0.25");

        let letter: UnitOverride = "l=1".parse().unwrap();
        assert_eq!(letter.name, "l");

        for text in ["gap", "gap=1=2", "9a=1", "l2=1", "gap=wide", "=3"] {
            let err = text.parse::<UnitOverride>().unwrap_err();
            assert!(matches!(err, Error::InvalidOverride { .. }), "{text} was accepted");
        }
    }

    #[test]
    fn segment_ids_are_unique() {
        let mut units = UnitTable::new();
        units.insert("w".into(), FixedDecimal::from_int(1));
        let err = segment_table(vec![Segment::new("w", "h 1")], &units).unwrap_err();
        assert!(matches!(err, Error::SegmentIsUnit { .. }));
        let twice = vec![Segment::new("s", "h 1"), Segment::new("s", "v 1")];
        let err = segment_table(twice, &units).unwrap_err();
        assert!(matches!(err, Error::DuplicateSegment { id } if id == "s"));
        assert_eq!(segment_table(vec![Segment::new("s", "h 1")], &units).unwrap().len(), 1);
    }
}
