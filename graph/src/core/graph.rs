use super::{id::CommitId, record::CommitRecord};
use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// A materialized commit plus the children discovered so far
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub record: Arc<CommitRecord>,
    children: Vec<CommitId>,
}

impl GraphNode {
    /// Ids of materialized commits that list this one as a parent
    pub fn children(&self) -> &[CommitId] {
        &self.children
    }
}

/// Inconsistencies noticed while inserting. None of them is fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// The commit was already materialized; the new record was ignored
    Duplicate(CommitId),
    /// A parent was inserted before its child
    ParentAlreadyMaterialized { child: CommitId, parent: CommitId },
}

#[derive(Debug, Default)]
pub struct InsertOutcome {
    pub anomalies: Vec<Anomaly>,
}

impl InsertOutcome {
    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
    }

    pub fn is_duplicate(&self) -> bool {
        self.anomalies
            .iter()
            .any(|a| matches!(a, Anomaly::Duplicate(_)))
    }

    /// Parents that can never show up below the child any more
    pub fn dangling_parents(&self) -> impl Iterator<Item = &CommitId> {
        self.anomalies.iter().filter_map(|a| match a {
            Anomaly::ParentAlreadyMaterialized { parent, .. } => Some(parent),
            Anomaly::Duplicate(_) => None,
        })
    }
}

/// Answer of an ancestry query over a partially loaded history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ancestry {
    Yes,
    No,
    /// The search reached commits that are not loaded yet
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderViolation {
    pub parent: CommitId,
    pub child: CommitId,
}

/// Commit DAG over the records materialized by one traversal.
///
/// Relations are id lookups into `nodes`; nothing holds a reference to
/// another node, so there are no ownership cycles between parents and
/// children.
#[derive(Debug, Default)]
pub struct CommitGraph {
    nodes: HashMap<CommitId, GraphNode>,
    order: Vec<CommitId>,
    /// parent id not yet seen -> children waiting for it
    pending_children: HashMap<CommitId, Vec<CommitId>>,
    /// memoized non-`Yes` answers of `ancestry`, cleared on insert
    negative: RefCell<HashMap<(CommitId, CommitId), Ancestry>>,
}

impl CommitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a commit, linking it to already materialized parents and to
    /// children that were waiting for it
    pub fn insert(&mut self, record: Arc<CommitRecord>) -> InsertOutcome {
        let mut outcome = InsertOutcome::default();
        let id = record.id.clone();

        if self.nodes.contains_key(&id) {
            outcome.anomalies.push(Anomaly::Duplicate(id));
            return outcome;
        }

        self.negative.get_mut().clear();

        let mut seen = HashSet::with_capacity(record.parents.len());
        for parent_id in &record.parents {
            if !seen.insert(parent_id) {
                continue;
            }
            match self.nodes.get_mut(parent_id) {
                Some(parent) => {
                    parent.children.push(id.clone());
                    outcome.anomalies.push(Anomaly::ParentAlreadyMaterialized {
                        child: id.clone(),
                        parent: parent_id.clone(),
                    });
                }
                None => self
                    .pending_children
                    .entry(parent_id.clone())
                    .or_default()
                    .push(id.clone()),
            }
        }

        let children = self.pending_children.remove(&id).unwrap_or_default();
        self.order.push(id.clone());
        self.nodes.insert(id, GraphNode { record, children });
        outcome
    }

    pub fn get(&self, id: &CommitId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn record(&self, id: &CommitId) -> Option<&Arc<CommitRecord>> {
        self.nodes.get(id).map(|node| &node.record)
    }

    pub fn contains(&self, id: &CommitId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Materialized records in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<CommitRecord>> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|node| &node.record))
    }

    pub fn children(&self, id: &CommitId) -> &[CommitId] {
        self.nodes
            .get(id)
            .map(|node| node.children())
            .unwrap_or_default()
    }

    pub fn parents(&self, id: &CommitId) -> &[CommitId] {
        self.nodes
            .get(id)
            .map(|node| node.record.parents.as_slice())
            .unwrap_or_default()
    }

    /// Commits without parents
    pub fn roots(&self) -> Vec<&CommitId> {
        self.order
            .iter()
            .filter(|id| self.parents(id).is_empty())
            .collect()
    }

    /// Commits without materialized children
    pub fn leaves(&self) -> Vec<&CommitId> {
        self.order
            .iter()
            .filter(|id| self.children(id).is_empty())
            .collect()
    }

    /// Parent ids that are referenced but not materialized
    pub fn boundary(&self) -> Vec<&CommitId> {
        let mut ids: Vec<_> = self.pending_children.keys().collect();
        ids.sort();
        ids
    }

    /// Whether `ancestor` is reachable from `descendant` along parent edges
    pub fn is_ancestor(&self, ancestor: &CommitId, descendant: &CommitId) -> bool {
        self.ancestry(ancestor, descendant) == Ancestry::Yes
    }

    /// Breadth-first search from `descendant` over recorded parent edges.
    /// A commit counts as its own ancestor.
    pub fn ancestry(&self, ancestor: &CommitId, descendant: &CommitId) -> Ancestry {
        if !self.nodes.contains_key(descendant) {
            return Ancestry::Unknown;
        }
        if ancestor == descendant {
            return Ancestry::Yes;
        }

        let key = (ancestor.clone(), descendant.clone());
        if let Some(&cached) = self.negative.borrow().get(&key) {
            return cached;
        }

        let mut visited: HashSet<&CommitId> = HashSet::new();
        let mut queue: VecDeque<&CommitId> = VecDeque::new();
        let mut crossed_boundary = false;
        queue.push_back(descendant);
        visited.insert(descendant);

        while let Some(id) = queue.pop_front() {
            let Some(node) = self.nodes.get(id) else {
                crossed_boundary = true;
                continue;
            };
            for parent in &node.record.parents {
                if parent == ancestor {
                    return Ancestry::Yes;
                }
                if visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }

        let answer = if crossed_boundary {
            Ancestry::Unknown
        } else {
            Ancestry::No
        };
        self.negative.borrow_mut().insert(key, answer);
        answer
    }

    /// Whether both commits reach a common materialized ancestor
    pub fn same_branch(&self, a: &CommitId, b: &CommitId) -> bool {
        if !self.nodes.contains_key(a) || !self.nodes.contains_key(b) {
            return false;
        }
        if a == b {
            return true;
        }

        let ancestors_of_a = self.materialized_ancestors(a);
        let mut visited: HashSet<&CommitId> = HashSet::new();
        let mut queue = VecDeque::from([b]);
        visited.insert(b);

        while let Some(id) = queue.pop_front() {
            if ancestors_of_a.contains(id) {
                return true;
            }
            for parent in self.parents(id) {
                if self.nodes.contains_key(parent) && visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        false
    }

    fn materialized_ancestors<'a>(&'a self, start: &'a CommitId) -> HashSet<&'a CommitId> {
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            for parent in self.parents(id) {
                if self.nodes.contains_key(parent) && seen.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        seen
    }

    /// Topological order computed from the parent edges alone: a commit
    /// comes after all of its children, and among commits that are ready
    /// the newest committer timestamp goes first (ties by id).
    pub fn topo_order(&self) -> Vec<CommitId> {
        let mut waiting: HashMap<&CommitId, usize> = self
            .nodes
            .iter()
            .map(|(id, node)| (id, node.children.len()))
            .collect();

        let mut ready = BinaryHeap::new();
        for (id, node) in &self.nodes {
            if node.children.is_empty() {
                ready.push((node.record.timestamp, Reverse(id)));
            }
        }

        let mut sorted = Vec::with_capacity(self.nodes.len());
        while let Some((_, Reverse(id))) = ready.pop() {
            sorted.push(id.clone());
            let mut seen = HashSet::new();
            for parent in self.parents(id) {
                if !seen.insert(parent) {
                    continue;
                }
                let Some(count) = waiting.get_mut(parent) else {
                    continue;
                };
                *count -= 1;
                if *count == 0 {
                    if let Some(node) = self.nodes.get(parent) {
                        ready.push((node.record.timestamp, Reverse(parent)));
                    }
                }
            }
        }
        sorted
    }

    /// Check that every commit in `order` appears after all of its
    /// materialized children
    pub fn verify_topological(&self, order: &[CommitId]) -> Result<(), OrderViolation> {
        let position: HashMap<&CommitId, usize> =
            order.iter().enumerate().map(|(i, id)| (id, i)).collect();

        for (index, id) in order.iter().enumerate() {
            for child in self.children(id) {
                if let Some(&child_index) = position.get(child) {
                    if child_index > index {
                        return Err(OrderViolation {
                            parent: id.clone(),
                            child: child.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> GraphStats {
        let records = || self.nodes.values().map(|node| &node.record);
        let root_commits = self.roots().len();
        GraphStats {
            total_commits: self.nodes.len(),
            total_edges: records().map(|r| r.parents.len()).sum(),
            merge_commits: records().filter(|r| r.is_merge()).count(),
            root_commits,
            leaf_commits: self.leaves().len(),
            boundary_commits: self.pending_children.len(),
            has_orphans: root_commits > 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphStats {
    pub total_commits: usize,
    pub total_edges: usize,
    pub merge_commits: usize,
    pub root_commits: usize,
    pub leaf_commits: usize,
    /// Parents referenced but not loaded
    pub boundary_commits: usize,
    pub has_orphans: bool,
}
