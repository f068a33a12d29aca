//! Dependency ordering of planned operations.
//!
//! Edges point from a dependent to the object it needs. Hard edges come
//! from resolved references and carry failure propagation; soft edges come
//! from declared type dependencies and only constrain order.

use std::collections::{HashMap, HashSet, VecDeque};

use super::error::SyncError;
use crate::model::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Hard,
    Soft,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<Identity>,
    index: HashMap<Identity, usize>,
    /// Per node: the nodes it depends on.
    dependencies: Vec<Vec<(usize, EdgeKind)>>,
}

/// Execution levels: every node sits one level above its deepest
/// dependency.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    pub levels: Vec<Vec<Identity>>,
    /// Nodes on a cycle.
    pub cycle_members: Vec<Identity>,
    /// Nodes that are not on a cycle but depend on one through hard edges.
    pub blocked: Vec<Identity>,
}

impl Schedule {
    pub fn is_acyclic(&self) -> bool {
        self.cycle_members.is_empty()
    }

    /// Everything the cycle holds up, in graph order.
    pub fn affected(&self) -> Vec<Identity> {
        self.cycle_members
            .iter()
            .chain(self.blocked.iter())
            .cloned()
            .collect()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node; adding a known identity is a no-op.
    pub fn add_node(&mut self, identity: Identity) -> usize {
        if let Some(&i) = self.index.get(&identity) {
            return i;
        }
        let i = self.nodes.len();
        self.index.insert(identity.clone(), i);
        self.nodes.push(identity);
        self.dependencies.push(Vec::new());
        i
    }

    /// Records that `dependent` needs `dependency`. Edges touching unknown
    /// nodes are ignored. A hard edge replaces a soft one.
    pub fn add_edge(&mut self, dependent: &Identity, dependency: &Identity, kind: EdgeKind) {
        let (Some(&from), Some(&to)) = (self.index.get(dependent), self.index.get(dependency))
        else {
            return;
        };
        let deps = &mut self.dependencies[from];
        match deps.iter_mut().find(|(d, _)| *d == to) {
            Some(existing) => {
                if kind == EdgeKind::Hard {
                    existing.1 = EdgeKind::Hard;
                }
            }
            None => deps.push((to, kind)),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.index.contains_key(identity)
    }

    pub fn nodes(&self) -> &[Identity] {
        &self.nodes
    }

    /// Direct dependencies joined by the given edge kind.
    pub fn dependencies_of(&self, identity: &Identity, kind: EdgeKind) -> Vec<&Identity> {
        self.index.get(identity).map_or_else(Vec::new, |&i| {
            self.dependencies[i]
                .iter()
                .filter(|(_, k)| *k == kind)
                .map(|&(d, _)| &self.nodes[d])
                .collect()
        })
    }

    /// Dependency-respecting order of all nodes. Insertion order breaks
    /// ties, so the same graph always yields the same order.
    pub fn topological_order(&self) -> Result<Vec<Identity>, SyncError> {
        let (levels, remaining) = self.kahn_levels(&HashSet::new());
        if !remaining.is_empty() {
            return Err(SyncError::DependencyCycle {
                identities: remaining.into_iter().map(|i| self.nodes[i].clone()).collect(),
            });
        }
        Ok(levels
            .into_iter()
            .flatten()
            .map(|i| self.nodes[i].clone())
            .collect())
    }

    /// Splits the graph into levels for execution.
    ///
    /// Cycle members and their hard dependents are taken out; everything
    /// else is levelled as if they did not exist, so a cycle never stalls
    /// unrelated objects that only share a type-level edge with it.
    pub fn schedule(&self) -> Schedule {
        let (_, remaining) = self.kahn_levels(&HashSet::new());
        if remaining.is_empty() {
            let (levels, _) = self.kahn_levels(&HashSet::new());
            return Schedule {
                levels: self.to_identities(levels),
                ..Schedule::default()
            };
        }

        let remaining: HashSet<usize> = remaining.into_iter().collect();
        let members: HashSet<usize> = remaining
            .iter()
            .copied()
            .filter(|&n| self.reaches_itself(n, &remaining))
            .collect();
        let blocked = self.hard_dependents(&members);

        let mut excluded: HashSet<usize> = members.clone();
        excluded.extend(blocked.iter().copied());
        let (levels, _) = self.kahn_levels(&excluded);

        let in_order = |set: &HashSet<usize>| -> Vec<Identity> {
            (0..self.nodes.len())
                .filter(|i| set.contains(i))
                .map(|i| self.nodes[i].clone())
                .collect()
        };
        Schedule {
            levels: self.to_identities(levels),
            cycle_members: in_order(&members),
            blocked: in_order(&blocked),
        }
    }

    fn to_identities(&self, levels: Vec<Vec<usize>>) -> Vec<Vec<Identity>> {
        levels
            .into_iter()
            .map(|level| level.into_iter().map(|i| self.nodes[i].clone()).collect())
            .collect()
    }

    /// Level-wise Kahn over the nodes not in `excluded`. Edges into excluded
    /// nodes are dropped. Returns the levels and the nodes never freed.
    fn kahn_levels(&self, excluded: &HashSet<usize>) -> (Vec<Vec<usize>>, Vec<usize>) {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for from in (0..n).filter(|i| !excluded.contains(i)) {
            for &(to, _) in &self.dependencies[from] {
                if excluded.contains(&to) {
                    continue;
                }
                in_degree[from] += 1;
                dependents[to].push(from);
            }
        }

        let mut levels = Vec::new();
        let mut placed = 0;
        let mut current: Vec<usize> = (0..n)
            .filter(|i| !excluded.contains(i) && in_degree[*i] == 0)
            .collect();
        while !current.is_empty() {
            placed += current.len();
            let mut next = Vec::new();
            for &node in &current {
                for &dependent in &dependents[node] {
                    in_degree[dependent] -= 1;
                    if in_degree[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }
            next.sort_unstable();
            levels.push(std::mem::replace(&mut current, next));
        }

        let remaining = if placed == n - excluded.len() {
            Vec::new()
        } else {
            (0..n)
                .filter(|i| !excluded.contains(i) && in_degree[*i] > 0)
                .collect()
        };
        (levels, remaining)
    }

    /// Whether `start` can reach itself through nodes in `within`.
    fn reaches_itself(&self, start: usize, within: &HashSet<usize>) -> bool {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<usize> = self.dependencies[start]
            .iter()
            .map(|&(d, _)| d)
            .filter(|d| within.contains(d))
            .collect();
        while let Some(node) = queue.pop_front() {
            if node == start {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            queue.extend(
                self.dependencies[node]
                    .iter()
                    .map(|&(d, _)| d)
                    .filter(|d| within.contains(d)),
            );
        }
        false
    }

    /// Nodes outside `roots` that reach a root through hard edges only.
    fn hard_dependents(&self, roots: &HashSet<usize>) -> HashSet<usize> {
        let mut reverse: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (from, deps) in self.dependencies.iter().enumerate() {
            for &(to, kind) in deps {
                if kind == EdgeKind::Hard {
                    reverse[to].push(from);
                }
            }
        }
        let mut found = HashSet::new();
        let mut queue: VecDeque<usize> = roots.iter().copied().collect();
        while let Some(node) = queue.pop_front() {
            for &dependent in &reverse[node] {
                if !roots.contains(&dependent) && found.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(name: &str) -> Identity {
        Identity::global("test.Node", name)
    }

    fn graph(nodes: &[&str], edges: &[(&str, &str, EdgeKind)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for n in nodes {
            g.add_node(id(n));
        }
        for (from, to, kind) in edges {
            g.add_edge(&id(from), &id(to), *kind);
        }
        g
    }

    #[test]
    fn test_order_follows_dependencies_then_insertion() {
        let g = graph(
            &["p2", "p1", "org", "other"],
            &[
                ("p1", "org", EdgeKind::Hard),
                ("p2", "org", EdgeKind::Hard),
                ("p2", "p1", EdgeKind::Soft),
            ],
        );
        assert_eq!(
            g.topological_order().unwrap(),
            vec![id("org"), id("other"), id("p1"), id("p2")]
        );
        assert_eq!(
            g.schedule().levels,
            vec![vec![id("org"), id("other")], vec![id("p1")], vec![id("p2")]]
        );
    }

    #[test]
    fn test_same_graph_same_order() {
        let build = || {
            graph(
                &["a", "b", "c", "d"],
                &[("c", "a", EdgeKind::Hard), ("d", "b", EdgeKind::Soft)],
            )
        };
        assert_eq!(build().topological_order(), build().topological_order());
    }

    #[test]
    fn test_cycle_names_every_blocked_node() {
        let g = graph(
            &["a", "b", "c", "free"],
            &[
                ("a", "b", EdgeKind::Hard),
                ("b", "a", EdgeKind::Hard),
                ("c", "a", EdgeKind::Hard),
            ],
        );
        match g.topological_order() {
            Err(SyncError::DependencyCycle { identities }) => {
                assert_eq!(identities, vec![id("a"), id("b"), id("c")]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_schedule_isolates_cycle() {
        let g = graph(
            &["a", "b", "c", "soft", "free"],
            &[
                ("a", "b", EdgeKind::Hard),
                ("b", "a", EdgeKind::Hard),
                ("c", "a", EdgeKind::Hard),
                ("soft", "b", EdgeKind::Soft),
                ("free", "soft", EdgeKind::Hard),
            ],
        );
        let schedule = g.schedule();
        assert_eq!(schedule.cycle_members, vec![id("a"), id("b")]);
        assert_eq!(schedule.blocked, vec![id("c")]);
        assert_eq!(schedule.levels, vec![vec![id("soft")], vec![id("free")]]);
        assert!(!schedule.is_acyclic());
    }

    #[test]
    fn test_self_edge_is_cycle() {
        let g = graph(&["a"], &[("a", "a", EdgeKind::Hard)]);
        assert_eq!(g.schedule().cycle_members, vec![id("a")]);
    }

    #[test]
    fn test_hard_edge_wins_over_soft() {
        let g = graph(
            &["a", "b"],
            &[("a", "b", EdgeKind::Soft), ("a", "b", EdgeKind::Hard)],
        );
        assert_eq!(g.dependencies_of(&id("a"), EdgeKind::Hard), vec![&id("b")]);
        assert!(g.dependencies_of(&id("a"), EdgeKind::Soft).is_empty());
    }
}
