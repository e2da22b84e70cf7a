//! Label selectors used to resolve the instances of a workload.
//!
//! A [`LabelSelector`] is a conjunction of [`Requirement`]s. It renders to
//! the textual query syntax the cluster API accepts (`app=api,tier in
//! (web,edge),!canary`) and can parse and evaluate that syntax locally.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TailError};

/// Maximum length of a label name or value.
const MAX_LABEL_NAME_LENGTH: usize = 63;

/// Maximum length of a label key prefix (DNS subdomain).
const MAX_LABEL_PREFIX_LENGTH: usize = 253;

/// Label name (or value): alphanumeric ends, `-_.` inside.
static LABEL_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$").unwrap_or_else(|_| unreachable!())
});

/// Label key prefix (RFC 1123 subdomain).
static LABEL_PREFIX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .unwrap_or_else(|_| unreachable!())
});

/// Comparison applied by a [`Requirement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// `key=value`
    Equals,
    /// `key!=value`
    NotEquals,
    /// `key in (a,b)`
    In,
    /// `key notin (a,b)`
    NotIn,
    /// `key`
    Exists,
    /// `!key`
    DoesNotExist,
}

/// One clause of a [`LabelSelector`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    /// Label key.
    pub key: String,
    /// Comparison.
    pub operator: Operator,
    /// Operand values.
    #[serde(default)]
    pub values: Vec<String>,
}

impl Requirement {
    /// Creates a validated requirement.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::Selection`] if the requirement cannot be selected.
    pub fn new(key: impl Into<String>, operator: Operator, values: Vec<String>) -> Result<Self> {
        let requirement = Self {
            key: key.into(),
            operator,
            values,
        };
        requirement.validate()?;
        Ok(requirement)
    }

    /// Shorthand for an equality requirement.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::Selection`] if the key or value is invalid.
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        Self::new(key, Operator::Equals, vec![value.into()])
    }

    /// Checks that the key is a valid label key and that the number of values
    /// fits the operator.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::Selection`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        validate_key(&self.key)?;

        let count = self.values.len();
        let count_ok = match self.operator {
            Operator::Equals | Operator::NotEquals => count == 1,
            Operator::In | Operator::NotIn => count >= 1,
            Operator::Exists | Operator::DoesNotExist => count == 0,
        };
        if !count_ok {
            return Err(TailError::Selection(format!(
                "operator {:?} on key {:?} cannot take {count} value(s)",
                self.operator, self.key
            )));
        }

        for value in &self.values {
            validate_value(value)?;
        }
        Ok(())
    }

    /// Evaluates the requirement against a label set.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let actual = labels.get(&self.key);
        let contains = |v: &String| self.values.iter().any(|candidate| candidate == v);
        match self.operator {
            Operator::Equals | Operator::In => actual.is_some_and(contains),
            Operator::NotEquals | Operator::NotIn => !actual.is_some_and(contains),
            Operator::Exists => actual.is_some(),
            Operator::DoesNotExist => actual.is_none(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = self.values.first().map_or("", String::as_str);
        match self.operator {
            Operator::Equals => write!(f, "{}={first}", self.key),
            Operator::NotEquals => write!(f, "{}!={first}", self.key),
            Operator::In => write!(f, "{} in ({})", self.key, self.values.join(",")),
            Operator::NotIn => write!(f, "{} notin ({})", self.key, self.values.join(",")),
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// A conjunction of label requirements. The empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector {
    /// Requirements, all of which must hold.
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Creates a selector from requirements without validating them.
    #[must_use]
    pub const fn new(requirements: Vec<Requirement>) -> Self {
        Self { requirements }
    }

    /// Builds equality requirements from a label map, ordered by key.
    #[must_use]
    pub fn from_match_labels(labels: &BTreeMap<String, String>) -> Self {
        Self {
            requirements: labels
                .iter()
                .map(|(key, value)| Requirement {
                    key: key.clone(),
                    operator: Operator::Equals,
                    values: vec![value.clone()],
                })
                .collect(),
        }
    }

    /// Returns true if the selector has no requirements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Renders the selector as a query string.
    ///
    /// An empty selector renders as the empty string, which selects every
    /// instance in the namespace.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::Selection`] if any requirement is unselectable.
    pub fn to_query(&self) -> Result<String> {
        let mut parts = Vec::with_capacity(self.requirements.len());
        for requirement in &self.requirements {
            requirement.validate()?;
            parts.push(requirement.to_string());
        }
        Ok(parts.join(","))
    }

    /// Parses a query string produced by [`LabelSelector::to_query`].
    ///
    /// # Errors
    ///
    /// Returns [`TailError::Selection`] if the query is malformed.
    pub fn parse(query: &str) -> Result<Self> {
        let requirements = split_terms(query)?
            .into_iter()
            .map(parse_requirement)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { requirements })
    }

    /// Evaluates the selector against a label set.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

fn validate_key(key: &str) -> Result<()> {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        if prefix.is_empty()
            || prefix.len() > MAX_LABEL_PREFIX_LENGTH
            || !LABEL_PREFIX_REGEX.is_match(prefix)
        {
            return Err(TailError::Selection(format!(
                "invalid label key prefix in {key:?}"
            )));
        }
    }

    if name.is_empty() || name.len() > MAX_LABEL_NAME_LENGTH || !LABEL_NAME_REGEX.is_match(name) {
        return Err(TailError::Selection(format!("invalid label key {key:?}")));
    }
    Ok(())
}

fn validate_value(value: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    if value.len() > MAX_LABEL_NAME_LENGTH || !LABEL_NAME_REGEX.is_match(value) {
        return Err(TailError::Selection(format!("invalid label value {value:?}")));
    }
    Ok(())
}

/// Splits a query on commas that are not inside a value list.
fn split_terms(query: &str) -> Result<Vec<&str>> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (idx, ch) in query.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| TailError::Selection(format!("unbalanced ')' in {query:?}")))?;
            }
            ',' if depth == 0 => {
                terms.push(&query[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(TailError::Selection(format!("unbalanced '(' in {query:?}")));
    }
    terms.push(&query[start..]);

    let terms: Vec<&str> = terms.into_iter().map(str::trim).collect();
    if terms.len() == 1 && terms[0].is_empty() {
        return Ok(Vec::new());
    }
    if terms.iter().any(|t| t.is_empty()) {
        return Err(TailError::Selection(format!("empty term in {query:?}")));
    }
    Ok(terms)
}

fn parse_requirement(term: &str) -> Result<Requirement> {
    if let Some(key) = term.strip_prefix('!') {
        return Requirement::new(key.trim(), Operator::DoesNotExist, Vec::new());
    }

    if let Some(open) = term.find('(') {
        let Some(inner) = term[open + 1..].strip_suffix(')') else {
            return Err(TailError::Selection(format!("expected ')' at end of {term:?}")));
        };
        let head = term[..open].trim_end();
        let (key, operator) = if let Some(key) = head.strip_suffix(" notin") {
            (key, Operator::NotIn)
        } else if let Some(key) = head.strip_suffix(" in") {
            (key, Operator::In)
        } else {
            return Err(TailError::Selection(format!("unknown set operator in {term:?}")));
        };
        let values = inner
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        return Requirement::new(key.trim(), operator, values);
    }

    if let Some((key, value)) = term.split_once("!=") {
        return Requirement::new(key.trim(), Operator::NotEquals, vec![value.trim().to_string()]);
    }
    if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
        return Requirement::new(key.trim(), Operator::Equals, vec![value.trim().to_string()]);
    }

    Requirement::new(term, Operator::Exists, Vec::new())
}
