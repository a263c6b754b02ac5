//! Per-target validation rules: which query attributes a target accepts and
//! which record syntaxes / element sets it can deliver.

use thiserror::Error;

use crate::errors::{Diagnostic, bib1};
use crate::wire_protocol::Query;

// -----------------------------------------------------------------------------
// ----- ValueSet --------------------------------------------------------------

/// `*`, or a comma list of numbers and inclusive ranges: `1,4-7,1016`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSet {
    Any,
    Ranges(Vec<(i64, i64)>),
}

impl ValueSet {
    pub fn parse(raw: &str) -> Result<Self, RuleError> {
        let raw = raw.trim();
        if raw == "*" {
            return Ok(ValueSet::Any);
        }

        let mut ranges = Vec::new();
        for part in raw.split(',').map(str::trim) {
            let bad = || RuleError::BadValueList(raw.to_owned());
            let (lo, hi) = match part.split_once('-') {
                Some((lo, hi)) => (lo.trim().parse().map_err(|_| bad())?, hi.trim().parse().map_err(|_| bad())?),
                None => {
                    let v = part.parse().map_err(|_| bad())?;
                    (v, v)
                }
            };
            if lo > hi {
                return Err(bad());
            }
            ranges.push((lo, hi));
        }
        Ok(ValueSet::Ranges(ranges))
    }

    pub fn contains(&self, value: i64) -> bool {
        match self {
            ValueSet::Any => true,
            ValueSet::Ranges(ranges) => ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&value)),
        }
    }

    /// Non-numeric attribute values only match `*`.
    fn matches(&self, value: &str) -> bool {
        match value.parse::<i64>() {
            Ok(v) => self.contains(v),
            Err(_) => matches!(self, ValueSet::Any),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- AttributeRule ---------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRule {
    pub attr_type: ValueSet,
    pub value: ValueSet,
    /// Zero accepts the attribute, anything else is the diagnostic to return.
    pub error: u32,
}

// -----------------------------------------------------------------------------
// ----- SyntaxRule ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxMatch {
    Any,
    Absent,
    Named(String),
}

impl SyntaxMatch {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "*" => SyntaxMatch::Any,
            "none" => SyntaxMatch::Absent,
            name => SyntaxMatch::Named(name.to_owned()),
        }
    }

    fn matches(&self, syntax: Option<&str>) -> bool {
        match (self, syntax) {
            (SyntaxMatch::Any, _) => true,
            (SyntaxMatch::Absent, None) => true,
            (SyntaxMatch::Named(name), Some(s)) => name.eq_ignore_ascii_case(s),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxRule {
    pub syntax: SyntaxMatch,
    pub error: u32,
    /// Schema identifier REST clients may ask for.
    pub identifier: Option<String>,
    /// Element-set names the syntax may be rendered with.
    pub names: Vec<String>,
}

impl SyntaxRule {
    pub fn syntax_name(&self) -> Option<&str> {
        match &self.syntax {
            SyntaxMatch::Named(name) => Some(name),
            _ => None,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Checks ----------------------------------------------------------------

/// First rule matching an attribute decides it; unmatched attributes pass.
pub fn check_query(rules: &[AttributeRule], query: &Query) -> Option<Diagnostic> {
    if rules.is_empty() {
        return None;
    }
    let Query::Rpn(pqf) = query else {
        return None;
    };

    for (attr_type, value) in pqf_attributes(pqf) {
        let rule = rules
            .iter()
            .find(|r| r.attr_type.contains(attr_type) && r.value.matches(value));

        if let Some(rule) = rule.filter(|r| r.error != 0) {
            return Some(Diagnostic::new(rule.error).with_addinfo(value));
        }
    }
    None
}

pub fn check_syntax(
    rules: &[SyntaxRule],
    syntax: Option<&str>,
    esn: Option<&str>,
) -> Option<Diagnostic> {
    let rule = rules.iter().find(|r| r.syntax.matches(syntax))?;

    if let Some(esn) = esn {
        if !rule.names.is_empty() && !rule.names.iter().any(|n| n == esn) {
            return Some(Diagnostic::new(bib1::ESN_NOT_SUPPORTED).with_addinfo(esn));
        }
    }

    if rule.error != 0 {
        let addinfo = syntax.unwrap_or("none");
        return Some(Diagnostic::new(rule.error).with_addinfo(addinfo));
    }
    None
}

/// The rule a REST schema name or identifier refers to.
pub fn schema_rule<'a>(rules: &'a [SyntaxRule], schema: &str) -> Option<&'a SyntaxRule> {
    rules.iter().find(|r| {
        r.error == 0
            && (r.identifier.as_deref() == Some(schema) || r.names.iter().any(|n| n == schema))
    })
}

// -----------------------------------------------------------------------------
// ----- Internal: PQF scanning ------------------------------------------------

/// `(type, value)` for every `@attr [set] type=value` in a prefix query.
fn pqf_attributes(pqf: &str) -> Vec<(i64, &str)> {
    let mut out = Vec::new();
    let mut tokens = pqf.split_whitespace();

    while let Some(tok) = tokens.next() {
        if tok != "@attr" {
            continue;
        }
        let Some(mut term) = tokens.next() else {
            break;
        };
        if !term.contains('=') {
            // attribute set name comes first
            match tokens.next() {
                Some(next) => term = next,
                None => break,
            }
        }

        if let Some((t, v)) = term.split_once('=') {
            if let Ok(t) = t.parse::<i64>() {
                out.push((t, v));
            }
        }
    }
    out
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("bad value list {0:?}; expected '*' or numbers and ranges like '1,4-7'")]
    BadValueList(String),
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
