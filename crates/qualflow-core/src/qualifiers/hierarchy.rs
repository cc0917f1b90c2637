//! Qualifier hierarchy: a declared subtyping lattice over qualifier kinds
//!
//! The lattice is finite and fully tabulated at construction:
//! - Bottom (⊥) = most specific qualifier
//! - Top (⊤) = most permissive qualifier, also the "unknown" default
//! - join/meet of every pair are precomputed, so a hierarchy that is only a
//!   poset is rejected up front instead of failing mid-analysis

use crate::error::{ConfigError, ConfigResult};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// A qualifier kind, as an index into its hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Qualifier(u32);

impl Qualifier {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// Collects qualifier names and pairwise subtype declarations.
#[derive(Debug, Clone, Default)]
pub struct HierarchyBuilder {
    qualifiers: Vec<String>,
    subtypes: Vec<(String, String)>,
}

impl HierarchyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn qualifier(mut self, name: impl Into<String>) -> Self {
        self.qualifiers.push(name.into());
        self
    }

    /// Declare `sub <: sup`.
    pub fn subtype(mut self, sub: impl Into<String>, sup: impl Into<String>) -> Self {
        self.subtypes.push((sub.into(), sup.into()));
        self
    }

    pub fn build(self) -> ConfigResult<QualifierHierarchy> {
        QualifierHierarchy::new(self.qualifiers, self.subtypes)
    }
}

/// The validated lattice. Immutable and shareable across threads.
#[derive(Debug, Clone)]
pub struct QualifierHierarchy {
    names: Vec<String>,
    by_name: HashMap<String, Qualifier>,
    /// `above[a][b]` holds iff `a <: b` (reflexive, transitive).
    above: Vec<Vec<bool>>,
    joins: Vec<Qualifier>,
    meets: Vec<Qualifier>,
    top: Qualifier,
    bottom: Qualifier,
    height: usize,
}

impl QualifierHierarchy {
    fn new(names: Vec<String>, subtypes: Vec<(String, String)>) -> ConfigResult<Self> {
        if names.is_empty() {
            return Err(ConfigError::EmptyHierarchy);
        }

        let mut by_name = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if by_name.insert(name.clone(), Qualifier(i as u32)).is_some() {
                return Err(ConfigError::DuplicateQualifier(name.clone()));
            }
        }

        let n = names.len();
        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(n, subtypes.len());
        let nodes: Vec<NodeIndex> = (0..n).map(|i| graph.add_node(i)).collect();
        for (sub, sup) in &subtypes {
            let context = format!("subtype declaration `{sub} <: {sup}`");
            let a = by_name
                .get(sub)
                .ok_or_else(|| ConfigError::unknown(sub.clone(), context.clone()))?;
            let b = by_name.get(sup).ok_or_else(|| ConfigError::unknown(sup.clone(), context))?;
            // a <: a is implied
            if a != b {
                graph.update_edge(nodes[a.index()], nodes[b.index()], ());
            }
        }

        let order = toposort(&graph, None)
            .map_err(|cycle| ConfigError::CyclicSubtyping(names[graph[cycle.node_id()]].clone()))?;

        // Reflexive-transitive closure
        let mut above = vec![vec![false; n]; n];
        for (i, row) in above.iter_mut().enumerate() {
            let mut dfs = Dfs::new(&graph, nodes[i]);
            while let Some(reached) = dfs.next(&graph) {
                row[graph[reached]] = true;
            }
        }

        let maximal: Vec<usize> = (0..n)
            .filter(|&a| (0..n).all(|b| a == b || !above[a][b]))
            .collect();
        let minimal: Vec<usize> = (0..n)
            .filter(|&a| (0..n).all(|b| a == b || !above[b][a]))
            .collect();
        let top = match maximal.as_slice() {
            [only] => Qualifier(*only as u32),
            many => return Err(ConfigError::NoUniqueTop(many.iter().map(|&i| names[i].clone()).collect())),
        };
        let bottom = match minimal.as_slice() {
            [only] => Qualifier(*only as u32),
            many => return Err(ConfigError::NoUniqueBottom(many.iter().map(|&i| names[i].clone()).collect())),
        };

        let mut joins = Vec::with_capacity(n * n);
        for a in 0..n {
            for b in 0..n {
                let upper: Vec<usize> = (0..n).filter(|&c| above[a][c] && above[b][c]).collect();
                let j = least(&upper, |x, y| above[x][y]).map_err(|candidates| ConfigError::NoUniqueJoin {
                    a: names[a].clone(),
                    b: names[b].clone(),
                    candidates: candidates.into_iter().map(|i| names[i].clone()).collect(),
                })?;
                joins.push(Qualifier(j as u32));
            }
        }
        let mut meets = Vec::with_capacity(n * n);
        for a in 0..n {
            for b in 0..n {
                let lower: Vec<usize> = (0..n).filter(|&c| above[c][a] && above[c][b]).collect();
                let m = least(&lower, |x, y| above[y][x]).map_err(|candidates| ConfigError::NoUniqueMeet {
                    a: names[a].clone(),
                    b: names[b].clone(),
                    candidates: candidates.into_iter().map(|i| names[i].clone()).collect(),
                })?;
                meets.push(Qualifier(m as u32));
            }
        }

        // Longest strict chain, walking the topological order (subtypes first)
        let mut depth = vec![0usize; n];
        for node in &order {
            let a = graph[*node];
            for b in 0..n {
                if a != b && above[a][b] {
                    depth[b] = depth[b].max(depth[a] + 1);
                }
            }
        }
        let height = depth.iter().copied().max().unwrap_or(0);

        debug!(qualifiers = n, height, top = %names[top.index()], bottom = %names[bottom.index()], "built qualifier hierarchy");

        Ok(Self {
            names,
            by_name,
            above,
            joins,
            meets,
            top,
            bottom,
            height,
        })
    }

    pub fn builder() -> HierarchyBuilder {
        HierarchyBuilder::new()
    }

    pub fn top(&self) -> Qualifier {
        self.top
    }

    pub fn bottom(&self) -> Qualifier {
        self.bottom
    }

    /// Number of qualifier kinds.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Length of the longest strict chain from bottom to top.
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_subtype(&self, sub: Qualifier, sup: Qualifier) -> bool {
        self.above[sub.index()][sup.index()]
    }

    pub fn join(&self, a: Qualifier, b: Qualifier) -> Qualifier {
        self.joins[a.index() * self.len() + b.index()]
    }

    pub fn meet(&self, a: Qualifier, b: Qualifier) -> Qualifier {
        self.meets[a.index() * self.len() + b.index()]
    }

    /// Join of all qualifiers yielded, or bottom for none.
    pub fn join_all(&self, qualifiers: impl IntoIterator<Item = Qualifier>) -> Qualifier {
        qualifiers.into_iter().fold(self.bottom, |acc, q| self.join(acc, q))
    }

    pub fn lookup(&self, name: &str) -> Option<Qualifier> {
        self.by_name.get(name).copied()
    }

    /// Look up a name declared somewhere in a checker configuration.
    pub fn resolve(&self, name: &str, context: &str) -> ConfigResult<Qualifier> {
        self.lookup(name).ok_or_else(|| ConfigError::unknown(name, context))
    }

    pub fn name(&self, qualifier: Qualifier) -> &str {
        &self.names[qualifier.index()]
    }

    pub fn qualifiers(&self) -> impl Iterator<Item = Qualifier> + '_ {
        (0..self.names.len()).map(|i| Qualifier(i as u32))
    }

    /// Qualifiers directly above `qualifier` (covering relation).
    pub fn direct_supertypes(&self, qualifier: Qualifier) -> Vec<Qualifier> {
        let a = qualifier.index();
        let strict: Vec<usize> = (0..self.len()).filter(|&b| b != a && self.above[a][b]).collect();
        strict
            .iter()
            .copied()
            .filter(|&b| !strict.iter().any(|&c| c != b && self.above[c][b]))
            .map(|b| Qualifier(b as u32))
            .collect()
    }
}

/// Unique least element of `candidates` under `le`, or the minimal elements
/// when there is none.
fn least(candidates: &[usize], le: impl Fn(usize, usize) -> bool) -> Result<usize, Vec<usize>> {
    if let Some(&l) = candidates.iter().find(|&&x| candidates.iter().all(|&y| le(x, y))) {
        return Ok(l);
    }
    Err(candidates
        .iter()
        .copied()
        .filter(|&x| !candidates.iter().any(|&y| y != x && le(y, x)))
        .collect())
}
