//! Qualifier tuples for law checking: every tuple, or random ones

use qualflow_core::qualifiers::{Qualifier, QualifierHierarchy};
use quickcheck::{Arbitrary, Gen};

/// Number of `N`-tuples over a hierarchy with `len` qualifiers, saturating.
pub fn tuple_count<const N: usize>(len: usize) -> usize {
    (0..N).fold(1usize, |acc, _| acc.saturating_mul(len))
}

/// All `N`-tuples in lexicographic order of qualifier index.
pub fn all_tuples<const N: usize>(h: &QualifierHierarchy) -> impl Iterator<Item = [Qualifier; N]> + '_ {
    let qualifiers: Vec<Qualifier> = h.qualifiers().collect();
    let len = qualifiers.len();
    (0..tuple_count::<N>(len)).map(move |mut index| {
        let mut tuple = [h.top(); N];
        for slot in tuple.iter_mut().rev() {
            *slot = qualifiers[index % len];
            index /= len;
        }
        tuple
    })
}

/// A random `N`-tuple drawn with `g`.
pub fn arbitrary_tuple<const N: usize>(h: &QualifierHierarchy, g: &mut Gen) -> [Qualifier; N] {
    let qualifiers: Vec<Qualifier> = h.qualifiers().collect();
    let mut tuple = [h.top(); N];
    for slot in tuple.iter_mut() {
        let pick = usize::arbitrary(g) % qualifiers.len();
        *slot = qualifiers[pick];
    }
    tuple
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(len: usize) -> QualifierHierarchy {
        let mut builder = QualifierHierarchy::builder();
        for i in 0..len {
            builder = builder.qualifier(format!("L{i}"));
        }
        for i in 1..len {
            builder = builder.subtype(format!("L{}", i - 1), format!("L{i}"));
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_all_tuples_enumerates_each_once() {
        let h = chain(3);
        let pairs: Vec<[Qualifier; 2]> = all_tuples::<2>(&h).collect();
        assert_eq!(pairs.len(), 9);
        let mut deduped = pairs.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), 9);
        assert_eq!(all_tuples::<3>(&h).count(), tuple_count::<3>(3));
    }

    #[test]
    fn test_tuple_count_saturates() {
        assert_eq!(tuple_count::<3>(usize::MAX), usize::MAX);
        assert_eq!(tuple_count::<0>(5), 1);
    }

    #[quickcheck_macros::quickcheck]
    fn test_enumeration_matches_count(len: u8) -> bool {
        let len = usize::from(len % 5) + 1;
        let h = chain(len);
        all_tuples::<2>(&h).count() == tuple_count::<2>(len)
            && all_tuples::<3>(&h).all(|[a, _, c]| a.index() < len && c.index() < len)
    }

    #[test]
    fn test_arbitrary_tuple_stays_in_hierarchy() {
        let h = chain(4);
        let mut g = Gen::new(100);
        for _ in 0..50 {
            let [a, b] = arbitrary_tuple::<2>(&h, &mut g);
            assert!(a.index() < h.len() && b.index() < h.len());
        }
    }
}
