//! Implicit qualifier rules
//!
//! Ordered (pattern, qualifier) pairs consulted for syntax that carries no
//! explicit qualifier. Evaluation is first-match-wins in declaration order;
//! when nothing matches the hierarchy's top is assigned.

use super::hierarchy::{Qualifier, QualifierHierarchy};
use crate::error::{ConfigError, ConfigResult};
use crate::hir::{Literal, LiteralKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// Syntactic element kinds that can receive a default qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntaxKind {
    NewObject,
    Comparison,
    Concatenation,
    Arithmetic,
    LocalVariable,
    Parameter,
    Field,
    MethodReturn,
}

/// What a rule is evaluated against.
#[derive(Debug, Clone, Copy)]
pub enum ImplicitSubject<'a> {
    Literal(&'a Literal),
    Element(SyntaxKind),
}

#[derive(Debug, Clone)]
pub enum ImplicitPattern {
    /// Full match against the text of a string or char literal.
    StringPattern { source: String, regex: Regex },
    /// Inclusive range over integer literals.
    IntRange { from: i64, to: i64 },
    LiteralKind(LiteralKind),
    Element(SyntaxKind),
    Any,
}

impl ImplicitPattern {
    pub fn string_pattern(source: &str) -> ConfigResult<Self> {
        let regex = Regex::new(&format!("^(?:{source})$")).map_err(|e| ConfigError::InvalidPattern {
            pattern: source.to_string(),
            message: e.to_string(),
        })?;
        Ok(ImplicitPattern::StringPattern {
            source: source.to_string(),
            regex,
        })
    }

    pub fn int_range(from: i64, to: i64) -> ConfigResult<Self> {
        if from > to {
            return Err(ConfigError::InvalidRange { from, to });
        }
        Ok(ImplicitPattern::IntRange { from, to })
    }

    pub fn matches(&self, subject: ImplicitSubject<'_>) -> bool {
        match (self, subject) {
            (ImplicitPattern::Any, _) => true,
            (ImplicitPattern::StringPattern { regex, .. }, ImplicitSubject::Literal(lit)) => match lit {
                Literal::String(text) => regex.is_match(text),
                Literal::Char(c) => regex.is_match(c.encode_utf8(&mut [0; 4])),
                _ => false,
            },
            (ImplicitPattern::IntRange { from, to }, ImplicitSubject::Literal(Literal::Int(value))) => {
                (*from..=*to).contains(value)
            }
            (ImplicitPattern::LiteralKind(kind), ImplicitSubject::Literal(lit)) => lit.kind() == *kind,
            (ImplicitPattern::Element(kind), ImplicitSubject::Element(element)) => *kind == element,
            _ => false,
        }
    }

    /// Two patterns with the same description select exactly the same syntax.
    fn same_as(&self, other: &ImplicitPattern) -> bool {
        self.to_string() == other.to_string()
    }
}

impl fmt::Display for ImplicitPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImplicitPattern::StringPattern { source, .. } => write!(f, "string_pattern({source:?})"),
            ImplicitPattern::IntRange { from, to } => write!(f, "int_range({from}, {to})"),
            ImplicitPattern::LiteralKind(kind) => write!(f, "literal({kind:?})"),
            ImplicitPattern::Element(kind) => write!(f, "element({kind:?})"),
            ImplicitPattern::Any => write!(f, "any"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImplicitRule {
    pub pattern: ImplicitPattern,
    pub qualifier: Qualifier,
}

impl ImplicitRule {
    pub fn new(pattern: ImplicitPattern, qualifier: Qualifier) -> Self {
        Self { pattern, qualifier }
    }
}

#[derive(Debug, Clone)]
pub struct ImplicitRuleSet {
    rules: Vec<ImplicitRule>,
    top: Qualifier,
}

impl ImplicitRuleSet {
    /// Validate `rules` against `hierarchy`. The same pattern may appear more
    /// than once only if every occurrence names the same qualifier.
    pub fn new(rules: Vec<ImplicitRule>, hierarchy: &QualifierHierarchy) -> ConfigResult<Self> {
        for (i, rule) in rules.iter().enumerate() {
            if let Some(earlier) = rules[..i].iter().find(|r| r.pattern.same_as(&rule.pattern)) {
                if earlier.qualifier != rule.qualifier {
                    return Err(ConfigError::ContradictoryImplicitRules {
                        pattern: rule.pattern.to_string(),
                        first: hierarchy.name(earlier.qualifier).to_string(),
                        second: hierarchy.name(rule.qualifier).to_string(),
                    });
                }
                trace!(pattern = %rule.pattern, "duplicate implicit rule");
            }
        }
        Ok(Self {
            rules,
            top: hierarchy.top(),
        })
    }

    /// A rule set with no rules: everything defaults to top.
    pub fn empty(hierarchy: &QualifierHierarchy) -> Self {
        Self {
            rules: Vec::new(),
            top: hierarchy.top(),
        }
    }

    /// Qualifier of the first matching rule, if any.
    pub fn find(&self, subject: ImplicitSubject<'_>) -> Option<Qualifier> {
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(subject))
            .map(|rule| rule.qualifier)
    }

    pub fn evaluate(&self, subject: ImplicitSubject<'_>) -> Qualifier {
        let qualifier = self.find(subject).unwrap_or(self.top);
        trace!(?subject, %qualifier, "implicit qualifier");
        qualifier
    }

    pub fn rules(&self) -> &[ImplicitRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qualifiers::HierarchyBuilder;

    fn signature_hierarchy() -> QualifierHierarchy {
        HierarchyBuilder::new()
            .qualifier("Top")
            .qualifier("BinaryName")
            .qualifier("Small")
            .qualifier("Bottom")
            .subtype("BinaryName", "Top")
            .subtype("Small", "Top")
            .subtype("Bottom", "BinaryName")
            .subtype("Bottom", "Small")
            .build()
            .unwrap()
    }

    fn string(text: &str) -> Literal {
        Literal::String(text.to_string())
    }

    #[test]
    fn test_binary_name_pattern() {
        let h = signature_hierarchy();
        let binary_name = h.lookup("BinaryName").unwrap();
        let rules = ImplicitRuleSet::new(
            vec![
                ImplicitRule::new(
                    ImplicitPattern::string_pattern(r"^[A-Za-z_][A-Za-z0-9_.$\[\]]*$").unwrap(),
                    binary_name,
                ),
                ImplicitRule::new(ImplicitPattern::Any, h.top()),
            ],
            &h,
        )
        .unwrap();

        assert_eq!(rules.evaluate(ImplicitSubject::Literal(&string("com.example.Foo"))), binary_name);
        assert_eq!(rules.evaluate(ImplicitSubject::Literal(&string("123 invalid"))), h.top());
    }

    #[test]
    fn test_pattern_must_match_whole_text() {
        let pattern = ImplicitPattern::string_pattern("[a-z]+").unwrap();
        assert!(pattern.matches(ImplicitSubject::Literal(&string("abc"))));
        assert!(!pattern.matches(ImplicitSubject::Literal(&string("abc1"))));
        assert!(!pattern.matches(ImplicitSubject::Literal(&Literal::Int(5))));
        assert!(pattern.matches(ImplicitSubject::Literal(&Literal::Char('q'))));
    }

    #[test]
    fn test_int_range_inclusive() {
        let pattern = ImplicitPattern::int_range(0, 10).unwrap();
        assert!(pattern.matches(ImplicitSubject::Literal(&Literal::Int(0))));
        assert!(pattern.matches(ImplicitSubject::Literal(&Literal::Int(10))));
        assert!(!pattern.matches(ImplicitSubject::Literal(&Literal::Int(11))));
        assert!(!pattern.matches(ImplicitSubject::Literal(&Literal::Float(5.0))));
        assert_eq!(
            ImplicitPattern::int_range(3, 2).unwrap_err(),
            ConfigError::InvalidRange { from: 3, to: 2 }
        );
    }

    #[test]
    fn test_first_match_wins() {
        let h = signature_hierarchy();
        let small = h.lookup("Small").unwrap();
        let bottom = h.bottom();
        let rules = ImplicitRuleSet::new(
            vec![
                ImplicitRule::new(ImplicitPattern::int_range(0, 100).unwrap(), small),
                ImplicitRule::new(ImplicitPattern::LiteralKind(LiteralKind::Int), bottom),
            ],
            &h,
        )
        .unwrap();
        assert_eq!(rules.evaluate(ImplicitSubject::Literal(&Literal::Int(7))), small);
        assert_eq!(rules.evaluate(ImplicitSubject::Literal(&Literal::Int(700))), bottom);
        assert_eq!(rules.evaluate(ImplicitSubject::Literal(&Literal::Null)), h.top());
    }

    #[test]
    fn test_element_rules() {
        let h = signature_hierarchy();
        let rules = ImplicitRuleSet::new(
            vec![ImplicitRule::new(ImplicitPattern::Element(SyntaxKind::NewObject), h.bottom())],
            &h,
        )
        .unwrap();
        assert_eq!(rules.evaluate(ImplicitSubject::Element(SyntaxKind::NewObject)), h.bottom());
        assert_eq!(rules.find(ImplicitSubject::Element(SyntaxKind::Field)), None);
        assert_eq!(rules.evaluate(ImplicitSubject::Element(SyntaxKind::Field)), h.top());
    }

    #[test]
    fn test_contradictory_rules_rejected() {
        let h = signature_hierarchy();
        let err = ImplicitRuleSet::new(
            vec![
                ImplicitRule::new(ImplicitPattern::LiteralKind(LiteralKind::Null), h.bottom()),
                ImplicitRule::new(ImplicitPattern::LiteralKind(LiteralKind::Null), h.top()),
            ],
            &h,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ContradictoryImplicitRules { .. }));

        // Repeating a rule verbatim is harmless
        let ok = ImplicitRuleSet::new(
            vec![
                ImplicitRule::new(ImplicitPattern::LiteralKind(LiteralKind::Null), h.bottom()),
                ImplicitRule::new(ImplicitPattern::LiteralKind(LiteralKind::Null), h.bottom()),
            ],
            &h,
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let err = ImplicitPattern::string_pattern("[unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }
}
