//! Lattice laws of declared qualifier hierarchies
//!
//! Hierarchies are generated as chains and as powersets of a few labels,
//! both of which are lattices with a unique join and meet for every pair.

use proptest::prelude::*;
use qualflow_core::qualifiers::{HierarchyBuilder, Qualifier, QualifierHierarchy};

fn diamond() -> QualifierHierarchy {
    QualifierHierarchy::builder()
        .qualifier("Top")
        .qualifier("Tainted")
        .qualifier("Untainted")
        .qualifier("Bottom")
        .subtype("Untainted", "Top")
        .subtype("Tainted", "Top")
        .subtype("Bottom", "Untainted")
        .subtype("Bottom", "Tainted")
        .build()
        .unwrap()
}

fn chain(len: usize) -> QualifierHierarchy {
    let mut builder = HierarchyBuilder::new();
    for i in 0..len {
        builder = builder.qualifier(format!("L{i}"));
    }
    for i in 1..len {
        builder = builder.subtype(format!("L{}", i - 1), format!("L{i}"));
    }
    builder.build().unwrap()
}

/// Subsets of `bits` labels ordered by inclusion.
fn powerset(bits: u32) -> QualifierHierarchy {
    let mut builder = HierarchyBuilder::new();
    for mask in 0..(1u32 << bits) {
        builder = builder.qualifier(format!("S{mask}"));
    }
    for mask in 0..(1u32 << bits) {
        for bit in 0..bits {
            if mask & (1 << bit) == 0 {
                builder = builder.subtype(format!("S{mask}"), format!("S{}", mask | (1 << bit)));
            }
        }
    }
    builder.build().unwrap()
}

fn hierarchy_strategy() -> impl Strategy<Value = QualifierHierarchy> {
    prop_oneof![(1usize..7).prop_map(chain), (1u32..4).prop_map(powerset)]
}

fn nth(h: &QualifierHierarchy, i: usize) -> Qualifier {
    h.qualifiers().nth(i % h.len()).unwrap()
}

#[test]
fn test_diamond_join_and_meet() {
    let h = diamond();
    let q = |name: &str| h.lookup(name).unwrap();

    assert_eq!(h.join(q("Untainted"), q("Tainted")), q("Top"));
    assert_eq!(h.meet(q("Untainted"), q("Tainted")), q("Bottom"));
    assert_eq!(h.top(), q("Top"));
    assert_eq!(h.bottom(), q("Bottom"));
    assert_eq!(h.height(), 2);
    assert!(h.is_subtype(q("Bottom"), q("Top")));
    assert!(!h.is_subtype(q("Tainted"), q("Untainted")));
}

#[test]
fn test_powerset_shape() {
    let h = powerset(2);
    assert_eq!(h.len(), 4);
    assert_eq!(h.name(h.top()), "S3");
    assert_eq!(h.name(h.bottom()), "S0");
    let (s1, s2) = (h.lookup("S1").unwrap(), h.lookup("S2").unwrap());
    assert_eq!(h.name(h.join(s1, s2)), "S3");
    assert_eq!(h.name(h.meet(s1, s2)), "S0");
}

proptest! {
    #[test]
    fn test_join_meet_laws(h in hierarchy_strategy(), i in 0usize..64, j in 0usize..64, k in 0usize..64) {
        let (a, b, c) = (nth(&h, i), nth(&h, j), nth(&h, k));

        prop_assert_eq!(h.join(a, a), a);
        prop_assert_eq!(h.meet(a, a), a);
        prop_assert_eq!(h.join(a, b), h.join(b, a));
        prop_assert_eq!(h.meet(a, b), h.meet(b, a));
        prop_assert_eq!(h.join(h.join(a, b), c), h.join(a, h.join(b, c)));
        prop_assert_eq!(h.meet(h.meet(a, b), c), h.meet(a, h.meet(b, c)));
        prop_assert_eq!(h.join(a, h.meet(a, b)), a);
        prop_assert_eq!(h.meet(a, h.join(a, b)), a);
    }

    #[test]
    fn test_bounds_agree_with_subtyping(h in hierarchy_strategy(), i in 0usize..64, j in 0usize..64) {
        let (a, b) = (nth(&h, i), nth(&h, j));
        let join = h.join(a, b);
        let meet = h.meet(a, b);

        prop_assert!(h.is_subtype(a, join));
        prop_assert!(h.is_subtype(b, join));
        prop_assert!(h.is_subtype(meet, a));
        prop_assert!(h.is_subtype(meet, b));
        prop_assert_eq!(h.is_subtype(a, b), join == b);
        prop_assert_eq!(h.is_subtype(a, b), meet == a);
        prop_assert!(h.is_subtype(a, h.top()));
        prop_assert!(h.is_subtype(h.bottom(), a));
    }

    #[test]
    fn test_join_is_least(h in hierarchy_strategy(), i in 0usize..64, j in 0usize..64) {
        let (a, b) = (nth(&h, i), nth(&h, j));
        let join = h.join(a, b);
        for upper in h.qualifiers() {
            if h.is_subtype(a, upper) && h.is_subtype(b, upper) {
                prop_assert!(h.is_subtype(join, upper));
            }
        }
    }
}
