//! Label selector evaluation
//!
//! A Kubernetes `LabelSelector` is compiled into a [`Selector`]: a list of
//! terms, each either an equality set (from `matchLabels`) or an expression
//! list (from `matchExpressions`). Compilation rejects operators and shapes
//! the API server would reject, so evaluation itself cannot fail.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use thiserror::Error;

/// A label selector could not be compiled
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SelectorError(String);

/// Read access to a set of labels
pub trait LabelSet {
    /// Value of `key`, if present
    fn get_label(&self, key: &str) -> Option<&str>;
}

impl LabelSet for BTreeMap<String, String> {
    fn get_label(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

impl LabelSet for HashMap<String, String> {
    fn get_label(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

impl<T: LabelSet> LabelSet for Option<T> {
    fn get_label(&self, key: &str) -> Option<&str> {
        self.as_ref().and_then(|l| l.get_label(key))
    }
}

/// Set-based operator of an expression requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    /// Label present with one of the values
    In(BTreeSet<String>),
    /// Label absent, or present with none of the values
    NotIn(BTreeSet<String>),
    /// Label present
    Exists,
    /// Label absent
    DoesNotExist,
}

/// One `matchExpressions` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Label key
    pub key: String,
    /// Operator and its values
    pub operator: Operator,
}

impl Requirement {
    fn matches(&self, labels: &impl LabelSet) -> bool {
        let value = labels.get_label(&self.key);
        match &self.operator {
            Operator::In(values) => value.is_some_and(|v| values.contains(v)),
            Operator::NotIn(values) => !value.is_some_and(|v| values.contains(v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }
}

impl TryFrom<&LabelSelectorRequirement> for Requirement {
    type Error = SelectorError;

    fn try_from(req: &LabelSelectorRequirement) -> Result<Self, Self::Error> {
        if req.key.is_empty() {
            return Err(SelectorError("requirement key must not be empty".to_string()));
        }
        let values: BTreeSet<String> = req.values.iter().flatten().cloned().collect();
        let operator = match req.operator.as_str() {
            "In" | "NotIn" if values.is_empty() => {
                return Err(SelectorError(format!(
                    "operator {} on key {:?} requires at least one value",
                    req.operator, req.key
                )));
            }
            "Exists" | "DoesNotExist" if !values.is_empty() => {
                return Err(SelectorError(format!(
                    "operator {} on key {:?} must not have values",
                    req.operator, req.key
                )));
            }
            "In" => Operator::In(values),
            "NotIn" => Operator::NotIn(values),
            "Exists" => Operator::Exists,
            "DoesNotExist" => Operator::DoesNotExist,
            other => {
                return Err(SelectorError(format!(
                    "unsupported operator {:?} on key {:?}",
                    other, req.key
                )));
            }
        };
        Ok(Self {
            key: req.key.clone(),
            operator,
        })
    }
}

/// A term of a compiled selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorTerm {
    /// Every key must be present with exactly the given value
    Equality(BTreeMap<String, String>),
    /// Every requirement must hold
    Expressions(Vec<Requirement>),
}

impl SelectorTerm {
    fn matches(&self, labels: &impl LabelSet) -> bool {
        match self {
            SelectorTerm::Equality(pairs) => pairs
                .iter()
                .all(|(k, v)| labels.get_label(k) == Some(v.as_str())),
            SelectorTerm::Expressions(reqs) => reqs.iter().all(|r| r.matches(labels)),
        }
    }
}

/// A compiled label selector: the conjunction of its terms
///
/// A selector with no terms matches every label set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    terms: Vec<SelectorTerm>,
}

impl Selector {
    /// Whether every term is satisfied by `labels`
    pub fn matches(&self, labels: &impl LabelSet) -> bool {
        self.terms.iter().all(|t| t.matches(labels))
    }

    /// The compiled terms
    pub fn terms(&self) -> &[SelectorTerm] {
        &self.terms
    }
}

impl TryFrom<&LabelSelector> for Selector {
    type Error = SelectorError;

    fn try_from(selector: &LabelSelector) -> Result<Self, Self::Error> {
        let mut terms = Vec::new();
        if let Some(labels) = selector.match_labels.as_ref().filter(|l| !l.is_empty()) {
            terms.push(SelectorTerm::Equality(labels.clone()));
        }
        if let Some(exprs) = selector.match_expressions.as_ref().filter(|e| !e.is_empty()) {
            let reqs = exprs
                .iter()
                .map(Requirement::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            terms.push(SelectorTerm::Expressions(reqs));
        }
        Ok(Self { terms })
    }
}

/// Evaluate a Kubernetes label selector against a label set
///
/// Fails when the selector cannot be compiled; a failure is never reported
/// as "no match".
pub fn matches(selector: &LabelSelector, labels: &impl LabelSet) -> Result<bool, SelectorError> {
    Ok(Selector::try_from(selector)?.matches(labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn expr(key: &str, op: &str, values: &[&str]) -> LabelSelectorRequirement {
        LabelSelectorRequirement {
            key: key.to_string(),
            operator: op.to_string(),
            values: if values.is_empty() {
                None
            } else {
                Some(values.iter().map(|v| v.to_string()).collect())
            },
        }
    }

    fn selector_with(exprs: Vec<LabelSelectorRequirement>) -> LabelSelector {
        LabelSelector {
            match_expressions: Some(exprs),
            match_labels: None,
        }
    }

    #[test]
    fn match_labels_equal() {
        let sel = LabelSelector {
            match_labels: Some(labels(&[("key", "value")])),
            match_expressions: None,
        };
        assert!(matches(&sel, &labels(&[("key", "value"), ("other", "x")])).unwrap());
        assert!(!matches(&sel, &labels(&[("key", "different")])).unwrap());
        assert!(!matches(&sel, &labels(&[])).unwrap());
    }

    #[test]
    fn empty_selector_matches_everything() {
        let sel = LabelSelector::default();
        assert!(matches(&sel, &labels(&[])).unwrap());
        assert!(matches(&sel, &labels(&[("a", "b")])).unwrap());
    }

    #[rstest]
    #[case("In", &["a", "b"], &[("k", "a")], true)]
    #[case("In", &["a", "b"], &[("k", "c")], false)]
    #[case("In", &["a"], &[], false)]
    #[case("NotIn", &["a"], &[("k", "b")], true)]
    #[case("NotIn", &["a"], &[("k", "a")], false)]
    #[case("NotIn", &["a"], &[], true)]
    #[case("Exists", &[], &[("k", "")], true)]
    #[case("Exists", &[], &[], false)]
    #[case("DoesNotExist", &[], &[], true)]
    #[case("DoesNotExist", &[], &[("k", "x")], false)]
    fn set_based_requirements(
        #[case] op: &str,
        #[case] values: &[&str],
        #[case] present: &[(&str, &str)],
        #[case] expected: bool,
    ) {
        let sel = selector_with(vec![expr("k", op, values)]);
        assert_eq!(matches(&sel, &labels(present)).unwrap(), expected);
    }

    #[test]
    fn labels_and_expressions_are_conjunctive() {
        let sel = LabelSelector {
            match_labels: Some(labels(&[("app", "web")])),
            match_expressions: Some(vec![expr("tier", "In", &["front"])]),
        };
        assert!(matches(&sel, &labels(&[("app", "web"), ("tier", "front")])).unwrap());
        assert!(!matches(&sel, &labels(&[("app", "web"), ("tier", "back")])).unwrap());
        assert!(!matches(&sel, &labels(&[("app", "db"), ("tier", "front")])).unwrap());
    }

    #[test]
    fn unknown_operator_is_an_error() {
        let sel = selector_with(vec![expr("key", "InvalidOperator", &["value"])]);
        let err = matches(&sel, &labels(&[("key", "value")])).unwrap_err();
        assert!(err.to_string().contains("InvalidOperator"));
    }

    #[test]
    fn malformed_requirements_are_errors() {
        for bad in [
            expr("k", "In", &[]),
            expr("k", "NotIn", &[]),
            expr("k", "Exists", &["v"]),
            expr("", "Exists", &[]),
        ] {
            assert!(
                Selector::try_from(&selector_with(vec![bad.clone()])).is_err(),
                "{bad:?} should not compile"
            );
        }
    }

    #[test]
    fn missing_label_set_behaves_as_empty() {
        let sel = selector_with(vec![expr("k", "DoesNotExist", &[])]);
        let none: Option<BTreeMap<String, String>> = None;
        assert!(matches(&sel, &none).unwrap());
    }

    #[test]
    fn compiles_into_tagged_terms() {
        let sel = LabelSelector {
            match_labels: Some(labels(&[("a", "1")])),
            match_expressions: Some(vec![expr("b", "Exists", &[])]),
        };
        let compiled = Selector::try_from(&sel).unwrap();
        assert!(matches!(compiled.terms()[0], SelectorTerm::Equality(_)));
        assert!(matches!(compiled.terms()[1], SelectorTerm::Expressions(_)));
    }
}
