//! Lattice-law verification of declared hierarchies
//!
//! [`QualifierHierarchy`] construction already rejects orders without a
//! unique join or meet; this verifier re-checks the algebra of the computed
//! tables so a faulty declaration, or a faulty table, is reported with a
//! concrete counterexample.

mod sampling;

pub use sampling::{all_tuples, arbitrary_tuple, tuple_count};

use qualflow_core::qualifiers::{Qualifier, QualifierHierarchy};
use quickcheck::Gen;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatticeProperty {
    JoinIdempotent,
    MeetIdempotent,
    JoinCommutative,
    MeetCommutative,
    JoinAssociative,
    MeetAssociative,
    Absorption,
    /// `a <: b` exactly when `join(a, b) == b`
    JoinMatchesSubtyping,
    /// `a <: b` exactly when `meet(a, b) == a`
    MeetMatchesSubtyping,
    /// `top` and `bottom` are identities of meet and join
    TopBottom,
}

impl LatticeProperty {
    pub const ALL: [LatticeProperty; 10] = [
        LatticeProperty::JoinIdempotent,
        LatticeProperty::MeetIdempotent,
        LatticeProperty::JoinCommutative,
        LatticeProperty::MeetCommutative,
        LatticeProperty::JoinAssociative,
        LatticeProperty::MeetAssociative,
        LatticeProperty::Absorption,
        LatticeProperty::JoinMatchesSubtyping,
        LatticeProperty::MeetMatchesSubtyping,
        LatticeProperty::TopBottom,
    ];
}

impl fmt::Display for LatticeProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LatticeProperty::JoinIdempotent => "join idempotence",
            LatticeProperty::MeetIdempotent => "meet idempotence",
            LatticeProperty::JoinCommutative => "join commutativity",
            LatticeProperty::MeetCommutative => "meet commutativity",
            LatticeProperty::JoinAssociative => "join associativity",
            LatticeProperty::MeetAssociative => "meet associativity",
            LatticeProperty::Absorption => "absorption",
            LatticeProperty::JoinMatchesSubtyping => "join agrees with subtyping",
            LatticeProperty::MeetMatchesSubtyping => "meet agrees with subtyping",
            LatticeProperty::TopBottom => "top and bottom identities",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyStatus {
    Proven,
    /// Holds on every sampled tuple; not every tuple was tried.
    Unfalsified,
    Violated { witness: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    Exhaustive,
    Sampled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub property: LatticeProperty,
    pub status: PropertyStatus,
    pub method: VerificationMethod,
    /// Tuples checked
    pub cases: usize,
}

impl VerificationResult {
    pub fn is_violated(&self) -> bool {
        matches!(self.status, PropertyStatus::Violated { .. })
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            PropertyStatus::Proven => write!(f, "{}: proven ({} cases)", self.property, self.cases),
            PropertyStatus::Unfalsified => write!(f, "{}: holds on {} samples", self.property, self.cases),
            PropertyStatus::Violated { witness } => {
                write!(f, "{}: violated by ({})", self.property, witness.join(", "))
            }
        }
    }
}

/// Checks every [`LatticeProperty`] of a hierarchy.
#[derive(Debug, Clone)]
pub struct LatticeVerifier {
    max_exhaustive: usize,
    samples: usize,
}

impl Default for LatticeVerifier {
    fn default() -> Self {
        Self {
            max_exhaustive: 1 << 20,
            samples: 10_000,
        }
    }
}

impl LatticeVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tuple count above which a property is sampled instead of enumerated
    pub fn max_exhaustive(mut self, cases: usize) -> Self {
        self.max_exhaustive = cases;
        self
    }

    pub fn samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    pub fn verify(&self, h: &QualifierHierarchy) -> Vec<VerificationResult> {
        let results: Vec<VerificationResult> =
            LatticeProperty::ALL.iter().map(|&property| self.verify_property(h, property)).collect();
        let violated = results.iter().filter(|r| r.is_violated()).count();
        if violated > 0 {
            warn!(violated, "hierarchy violates lattice laws");
        } else {
            debug!(qualifiers = h.len(), "lattice laws hold");
        }
        results
    }

    pub fn verify_property(&self, h: &QualifierHierarchy, property: LatticeProperty) -> VerificationResult {
        use LatticeProperty::*;
        match property {
            JoinIdempotent => self.check::<1>(h, property, |h, [a]| h.join(a, a) == a),
            MeetIdempotent => self.check::<1>(h, property, |h, [a]| h.meet(a, a) == a),
            JoinCommutative => self.check::<2>(h, property, |h, [a, b]| h.join(a, b) == h.join(b, a)),
            MeetCommutative => self.check::<2>(h, property, |h, [a, b]| h.meet(a, b) == h.meet(b, a)),
            JoinAssociative => self.check::<3>(h, property, |h, [a, b, c]| {
                h.join(h.join(a, b), c) == h.join(a, h.join(b, c))
            }),
            MeetAssociative => self.check::<3>(h, property, |h, [a, b, c]| {
                h.meet(h.meet(a, b), c) == h.meet(a, h.meet(b, c))
            }),
            Absorption => self.check::<2>(h, property, |h, [a, b]| {
                h.join(a, h.meet(a, b)) == a && h.meet(a, h.join(a, b)) == a
            }),
            JoinMatchesSubtyping => self.check::<2>(h, property, |h, [a, b]| h.is_subtype(a, b) == (h.join(a, b) == b)),
            MeetMatchesSubtyping => self.check::<2>(h, property, |h, [a, b]| h.is_subtype(a, b) == (h.meet(a, b) == a)),
            TopBottom => self.check::<1>(h, property, |h, [a]| {
                h.meet(a, h.top()) == a
                    && h.join(a, h.bottom()) == a
                    && h.join(a, h.top()) == h.top()
                    && h.meet(a, h.bottom()) == h.bottom()
            }),
        }
    }

    fn check<const N: usize>(
        &self,
        h: &QualifierHierarchy,
        property: LatticeProperty,
        law: impl Fn(&QualifierHierarchy, [Qualifier; N]) -> bool,
    ) -> VerificationResult {
        let violated = |tuple: [Qualifier; N]| VerificationResult {
            property,
            status: PropertyStatus::Violated {
                witness: tuple.iter().map(|&q| h.name(q).to_string()).collect(),
            },
            method: if tuple_count::<N>(h.len()) <= self.max_exhaustive {
                VerificationMethod::Exhaustive
            } else {
                VerificationMethod::Sampled
            },
            cases: 0,
        };

        if tuple_count::<N>(h.len()) <= self.max_exhaustive {
            let mut cases = 0;
            for tuple in all_tuples::<N>(h) {
                cases += 1;
                if !law(h, tuple) {
                    return VerificationResult { cases, ..violated(tuple) };
                }
            }
            return VerificationResult {
                property,
                status: PropertyStatus::Proven,
                method: VerificationMethod::Exhaustive,
                cases,
            };
        }

        let mut g = Gen::new(h.len());
        for cases in 1..=self.samples {
            let tuple = arbitrary_tuple::<N>(h, &mut g);
            if !law(h, tuple) {
                return VerificationResult { cases, ..violated(tuple) };
            }
        }
        VerificationResult {
            property,
            status: PropertyStatus::Unfalsified,
            method: VerificationMethod::Sampled,
            cases: self.samples,
        }
    }
}
