//! Declarative checker specification and its validated form
//!
//! A [`CheckerDecl`] is plain data (loadable from JSON) listing qualifier
//! kinds with their supertypes, ordered implicit rules, method signatures,
//! declared field qualifiers and flow-refinement switches. [`Checker`] is the
//! resolved bundle every analysis reads from; it is built once, never
//! mutated, and shared by reference across concurrently analyzed units.

use super::hierarchy::{HierarchyBuilder, Qualifier, QualifierHierarchy};
use super::implicit::{ImplicitPattern, ImplicitRule, ImplicitRuleSet, SyntaxKind};
use super::signatures::{MethodSignature, PostconditionTarget, SignatureTable};
use crate::dataflow::RefinementRules;
use crate::error::{ConfigError, ConfigResult};
use crate::hir::LiteralKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckerDecl {
    #[serde(default)]
    pub name: Option<String>,
    pub qualifiers: Vec<QualifierDecl>,
    #[serde(default)]
    pub implicit: Vec<ImplicitRuleDecl>,
    #[serde(default)]
    pub signatures: Vec<SignatureDecl>,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub refinement: RefinementDecl,
}

impl CheckerDecl {
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        serde_json::from_str(json).map_err(ConfigError::malformed)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Malformed(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifierDecl {
    pub name: String,
    #[serde(default)]
    pub subtype_of: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplicitRuleDecl {
    pub pattern: PatternDecl,
    pub qualifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternDecl {
    StringPattern(String),
    IntRange {
        #[serde(default = "range_min")]
        from: i64,
        #[serde(default = "range_max")]
        to: i64,
    },
    Literal(LiteralKind),
    Element(SyntaxKind),
    Any,
}

fn range_min() -> i64 {
    i64::MIN
}

fn range_max() -> i64 {
    i64::MAX
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureDecl {
    pub method: String,
    #[serde(default)]
    pub params: Vec<Option<String>>,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub pure: bool,
    #[serde(default)]
    pub ensures: Vec<PostconditionDecl>,
    #[serde(default)]
    pub ensures_if: Vec<ConditionalPostconditionDecl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetDecl {
    Receiver,
    Argument(usize),
}

impl From<TargetDecl> for PostconditionTarget {
    fn from(target: TargetDecl) -> Self {
        match target {
            TargetDecl::Receiver => PostconditionTarget::Receiver,
            TargetDecl::Argument(i) => PostconditionTarget::Argument(i),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostconditionDecl {
    pub target: TargetDecl,
    pub qualifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalPostconditionDecl {
    pub result: bool,
    pub target: TargetDecl,
    pub qualifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub qualifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementDecl {
    #[serde(default = "enabled")]
    pub equality: bool,
}

impl Default for RefinementDecl {
    fn default() -> Self {
        Self { equality: true }
    }
}

fn enabled() -> bool {
    true
}

/// A validated qualifier checker: hierarchy, implicit rules, signatures.
#[derive(Debug, Clone)]
pub struct Checker {
    name: String,
    hierarchy: QualifierHierarchy,
    implicit: ImplicitRuleSet,
    signatures: SignatureTable,
    refinement: RefinementRules,
}

impl Checker {
    pub fn new(
        name: impl Into<String>,
        hierarchy: QualifierHierarchy,
        implicit: ImplicitRuleSet,
        signatures: SignatureTable,
    ) -> Self {
        Self {
            name: name.into(),
            hierarchy,
            implicit,
            signatures,
            refinement: RefinementRules::default(),
        }
    }

    pub fn with_refinement(mut self, refinement: RefinementRules) -> Self {
        self.refinement = refinement;
        self
    }

    /// Resolve and validate a declaration. Any inconsistency is fatal here,
    /// before a single unit is analyzed.
    pub fn from_decl(decl: &CheckerDecl) -> ConfigResult<Self> {
        let mut builder = HierarchyBuilder::new();
        for q in &decl.qualifiers {
            builder = builder.qualifier(q.name.clone());
        }
        for q in &decl.qualifiers {
            for sup in &q.subtype_of {
                builder = builder.subtype(q.name.clone(), sup.clone());
            }
        }
        let hierarchy = builder.build()?;

        let mut rules = Vec::with_capacity(decl.implicit.len());
        for rule in &decl.implicit {
            let qualifier = hierarchy.resolve(&rule.qualifier, "implicit rule")?;
            let pattern = match &rule.pattern {
                PatternDecl::StringPattern(source) => ImplicitPattern::string_pattern(source)?,
                PatternDecl::IntRange { from, to } => ImplicitPattern::int_range(*from, *to)?,
                PatternDecl::Literal(kind) => ImplicitPattern::LiteralKind(*kind),
                PatternDecl::Element(kind) => ImplicitPattern::Element(*kind),
                PatternDecl::Any => ImplicitPattern::Any,
            };
            rules.push(ImplicitRule::new(pattern, qualifier));
        }
        let implicit = ImplicitRuleSet::new(rules, &hierarchy)?;

        let mut signatures = SignatureTable::new();
        for sig in &decl.signatures {
            signatures.insert(resolve_signature(sig, &hierarchy)?)?;
        }
        for field in &decl.fields {
            let context = format!("field `{}`", field.name);
            signatures.declare_field(field.name.clone(), hierarchy.resolve(&field.qualifier, &context)?)?;
        }

        let name = decl.name.clone().unwrap_or_else(|| "checker".to_string());
        info!(
            checker = %name,
            qualifiers = hierarchy.len(),
            implicit_rules = implicit.len(),
            signatures = signatures.len(),
            "loaded checker"
        );

        Ok(Self {
            name,
            hierarchy,
            implicit,
            signatures,
            refinement: RefinementRules {
                equality: decl.refinement.equality,
            },
        })
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        Self::from_decl(&CheckerDecl::from_file(path)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hierarchy(&self) -> &QualifierHierarchy {
        &self.hierarchy
    }

    pub fn implicit(&self) -> &ImplicitRuleSet {
        &self.implicit
    }

    pub fn signatures(&self) -> &SignatureTable {
        &self.signatures
    }

    pub fn refinement(&self) -> &RefinementRules {
        &self.refinement
    }
}

fn resolve_signature(sig: &SignatureDecl, hierarchy: &QualifierHierarchy) -> ConfigResult<MethodSignature> {
    let context = format!("signature of `{}`", sig.method);
    let resolve = |name: &str| -> ConfigResult<Qualifier> { hierarchy.resolve(name, &context) };

    let mut resolved = MethodSignature::new(sig.method.clone());
    for param in &sig.params {
        resolved = resolved.param(param.as_deref().map(resolve).transpose()?);
    }
    resolved.receiver = sig.receiver.as_deref().map(resolve).transpose()?;
    resolved.returns = sig.returns.as_deref().map(resolve).transpose()?;
    resolved.pure = sig.pure;
    for post in &sig.ensures {
        resolved = resolved.ensures(post.target.into(), resolve(&post.qualifier)?);
    }
    for post in &sig.ensures_if {
        resolved = resolved.ensures_if(post.result, post.target.into(), resolve(&post.qualifier)?);
    }
    Ok(resolved)
}
