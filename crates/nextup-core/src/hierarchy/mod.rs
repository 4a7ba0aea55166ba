//! Closure table over task chains.
//!
//! Tasks form disjoint linear chains (one predecessor, one successor at
//! most). The index materialises every `(ancestor, descendant, depth)` pair of
//! each chain, including a depth-0 self edge per task, so chain membership and
//! order are single lookups.
//!
//! Mutations come in two halves. `plan_*` validates the request against the
//! current table and returns the exact [`EdgeChanges`] it implies without
//! touching anything; [`HierarchyIndex::apply`] then commits a plan. The
//! planner persists the plan to the store between the two, so a failed write
//! leaves both sides untouched. `attach`, `reparent` and `detach` run both
//! halves for callers that have nothing to persist.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::task::TaskId;

/// One row of the closure table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HierarchyEdge {
    pub ancestor: TaskId,
    pub descendant: TaskId,
    pub depth: u32,
}

impl HierarchyEdge {
    pub fn new(ancestor: TaskId, descendant: TaskId, depth: u32) -> Self {
        Self {
            ancestor,
            descendant,
            depth,
        }
    }
}

/// Edge rows removed and inserted by one operation. A depth change shows up
/// as a removal plus an insertion of the same pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeChanges {
    pub removed: Vec<HierarchyEdge>,
    pub inserted: Vec<HierarchyEdge>,
}

impl EdgeChanges {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.inserted.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyIndex {
    /// descendant -> ancestor -> depth
    up: BTreeMap<TaskId, BTreeMap<TaskId, u32>>,
    /// ancestor -> descendant -> depth
    down: BTreeMap<TaskId, BTreeMap<TaskId, u32>>,
}

impl HierarchyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from persisted rows and verify it.
    pub fn from_edges<I>(edges: I) -> Result<Self>
    where
        I: IntoIterator<Item = HierarchyEdge>,
    {
        let mut index = Self::new();
        for edge in edges {
            if index.depth(edge.ancestor, edge.descendant).is_some() {
                return Err(violation(format!(
                    "duplicate edge {} -> {}",
                    edge.ancestor, edge.descendant
                )));
            }
            index.insert(edge);
        }
        index.check_invariants()?;
        Ok(index)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.up.get(&id).is_some_and(|a| a.get(&id) == Some(&0))
    }

    pub fn len(&self) -> usize {
        self.up.len()
    }

    pub fn is_empty(&self) -> bool {
        self.up.is_empty()
    }

    /// Every row, ordered by `(ancestor, descendant)`.
    pub fn edges(&self) -> impl Iterator<Item = HierarchyEdge> + '_ {
        self.down.iter().flat_map(|(a, ds)| {
            ds.iter()
                .map(move |(d, depth)| HierarchyEdge::new(*a, *d, *depth))
        })
    }

    pub fn depth(&self, ancestor: TaskId, descendant: TaskId) -> Option<u32> {
        self.up.get(&descendant)?.get(&ancestor).copied()
    }

    /// Ancestors of `id` including itself, nearest first (depth ascending).
    ///
    /// Empty for an unknown id.
    pub fn ancestors_of(&self, id: TaskId) -> Vec<(TaskId, u32)> {
        sorted_by_depth(self.up.get(&id))
    }

    /// Descendants of `id` including itself, nearest first (depth ascending).
    ///
    /// Empty for an unknown id.
    pub fn descendants_of(&self, id: TaskId) -> Vec<(TaskId, u32)> {
        sorted_by_depth(self.down.get(&id))
    }

    pub fn parent_of(&self, id: TaskId) -> Option<TaskId> {
        at_depth(self.up.get(&id), 1)
    }

    pub fn child_of(&self, id: TaskId) -> Option<TaskId> {
        at_depth(self.down.get(&id), 1)
    }

    /// First task of the chain containing `id`.
    pub fn chain_head(&self, id: TaskId) -> Option<TaskId> {
        deepest(self.up.get(&id))
    }

    /// Last task of the chain containing `id`.
    pub fn chain_tail(&self, id: TaskId) -> Option<TaskId> {
        deepest(self.down.get(&id))
    }

    /// The whole chain containing `id`, from head to tail.
    pub fn chain(&self, id: TaskId) -> Vec<TaskId> {
        let mut chain: Vec<TaskId> = self
            .ancestors_of(id)
            .into_iter()
            .rev()
            .map(|(a, _)| a)
            .collect();
        chain.extend(self.descendants_of(id).into_iter().skip(1).map(|(d, _)| d));
        chain
    }

    /// Every task sharing a chain with `id`, `id` included.
    ///
    /// These are exactly the tasks `id` must not be moved under.
    pub fn chain_excluding(&self, id: TaskId) -> BTreeSet<TaskId> {
        let mut members: BTreeSet<TaskId> = self
            .up
            .get(&id)
            .map(|a| a.keys().copied().collect())
            .unwrap_or_default();
        if let Some(ds) = self.down.get(&id) {
            members.extend(ds.keys().copied());
        }
        members
    }

    /// Plan inserting `new_id`, appended to the tail of `parent`'s chain when
    /// a parent is given.
    pub fn plan_attach(&self, new_id: TaskId, parent: Option<TaskId>) -> Result<EdgeChanges> {
        if self.contains(new_id) {
            return Err(violation(format!("task {new_id} is already indexed")));
        }
        let mut changes = EdgeChanges::default();
        changes.inserted.push(HierarchyEdge::new(new_id, new_id, 0));

        if let Some(parent) = parent {
            let tail = self.tail_for(parent)?;
            for (ancestor, depth) in self.ancestors_of(tail) {
                changes
                    .inserted
                    .push(HierarchyEdge::new(ancestor, new_id, depth + 1));
            }
        }
        Ok(changes)
    }

    /// Plan moving `id` and its successors from `old_parent` to `new_parent`.
    ///
    /// `old_parent` must be the current predecessor of `id`. Moving under any
    /// member of `id`'s own chain is rejected.
    pub fn plan_reparent(
        &self,
        id: TaskId,
        old_parent: Option<TaskId>,
        new_parent: Option<TaskId>,
    ) -> Result<EdgeChanges> {
        if !self.contains(id) {
            return Err(CoreError::UnknownId(id));
        }
        let actual = self.parent_of(id);
        if actual != old_parent {
            return Err(violation(format!(
                "task {id} has parent {actual:?}, caller expected {old_parent:?}"
            )));
        }

        let moving = self.descendants_of(id);
        let mut changes = EdgeChanges::default();

        let new_tail = match new_parent {
            Some(parent) => {
                if !self.contains(parent) {
                    return Err(CoreError::UnknownId(parent));
                }
                if self.chain_excluding(id).contains(&parent) {
                    tracing::warn!(task = %id, parent = %parent, "rejected reparent into own chain");
                    return Err(CoreError::CycleRejected { task: id, parent });
                }
                Some(self.tail_for(parent)?)
            }
            None => None,
        };

        if let Some(old_parent) = old_parent {
            for (ancestor, _) in self.ancestors_of(old_parent) {
                for &(descendant, _) in &moving {
                    let depth = self.depth(ancestor, descendant).ok_or_else(|| {
                        violation(format!("missing edge {ancestor} -> {descendant}"))
                    })?;
                    changes
                        .removed
                        .push(HierarchyEdge::new(ancestor, descendant, depth));
                }
            }
        }

        if let Some(tail) = new_tail {
            for (ancestor, up) in self.ancestors_of(tail) {
                for &(descendant, down) in &moving {
                    changes
                        .inserted
                        .push(HierarchyEdge::new(ancestor, descendant, up + 1 + down));
                }
            }
        }
        Ok(changes)
    }

    /// Plan removing `id`, closing the gap between its predecessor and
    /// successor.
    pub fn plan_detach(&self, id: TaskId) -> Result<EdgeChanges> {
        if !self.contains(id) {
            return Err(CoreError::UnknownId(id));
        }
        let mut changes = EdgeChanges::default();

        for (ancestor, depth) in self.ancestors_of(id) {
            changes.removed.push(HierarchyEdge::new(ancestor, id, depth));
        }
        for (descendant, depth) in self.descendants_of(id).into_iter().skip(1) {
            changes.removed.push(HierarchyEdge::new(id, descendant, depth));
        }

        if let (Some(parent), Some(child)) = (self.parent_of(id), self.child_of(id)) {
            for (ancestor, _) in self.ancestors_of(parent) {
                for (descendant, _) in self.descendants_of(child) {
                    let depth = self.depth(ancestor, descendant).ok_or_else(|| {
                        violation(format!("missing edge {ancestor} -> {descendant}"))
                    })?;
                    if depth < 2 {
                        return Err(violation(format!(
                            "edge {ancestor} -> {descendant} spans {id} at depth {depth}"
                        )));
                    }
                    changes
                        .removed
                        .push(HierarchyEdge::new(ancestor, descendant, depth));
                    changes
                        .inserted
                        .push(HierarchyEdge::new(ancestor, descendant, depth - 1));
                }
            }
        }
        Ok(changes)
    }

    /// Check that `changes` can be applied: every removed row must exist
    /// with the stated depth and no inserted row may collide with a
    /// surviving one.
    pub fn verify(&self, changes: &EdgeChanges) -> Result<()> {
        let mut removed = BTreeSet::new();
        for edge in &changes.removed {
            if self.depth(edge.ancestor, edge.descendant) != Some(edge.depth) {
                return Err(violation(format!(
                    "cannot remove absent edge {} -> {} at depth {}",
                    edge.ancestor, edge.descendant, edge.depth
                )));
            }
            if !removed.insert((edge.ancestor, edge.descendant)) {
                return Err(violation(format!(
                    "edge {} -> {} removed twice",
                    edge.ancestor, edge.descendant
                )));
            }
        }

        let mut inserted = BTreeSet::new();
        for edge in &changes.inserted {
            let pair = (edge.ancestor, edge.descendant);
            let survives = self.depth(edge.ancestor, edge.descendant).is_some()
                && !removed.contains(&pair);
            if survives || !inserted.insert(pair) {
                return Err(violation(format!(
                    "edge {} -> {} would be duplicated",
                    edge.ancestor, edge.descendant
                )));
            }
        }
        Ok(())
    }

    /// Commit a plan after [`verify`](Self::verify); on error nothing is
    /// changed.
    pub fn apply(&mut self, changes: &EdgeChanges) -> Result<()> {
        self.verify(changes)?;
        for edge in &changes.removed {
            self.remove(edge.ancestor, edge.descendant);
        }
        for edge in &changes.inserted {
            self.insert(*edge);
        }
        Ok(())
    }

    pub fn attach(&mut self, new_id: TaskId, parent: Option<TaskId>) -> Result<EdgeChanges> {
        let changes = self.plan_attach(new_id, parent)?;
        self.apply(&changes)?;
        Ok(changes)
    }

    pub fn reparent(
        &mut self,
        id: TaskId,
        old_parent: Option<TaskId>,
        new_parent: Option<TaskId>,
    ) -> Result<EdgeChanges> {
        let changes = self.plan_reparent(id, old_parent, new_parent)?;
        self.apply(&changes)?;
        Ok(changes)
    }

    pub fn detach(&mut self, id: TaskId) -> Result<EdgeChanges> {
        let changes = self.plan_detach(id)?;
        self.apply(&changes)?;
        Ok(changes)
    }

    /// Verify the closure invariants over the whole table:
    /// one self edge per task, mirrored maps, at most one predecessor and
    /// successor per task, and every ancestor row matching the walk along
    /// predecessor links.
    pub fn check_invariants(&self) -> Result<()> {
        for (descendant, ancestors) in &self.up {
            for (ancestor, depth) in ancestors {
                let mirrored = self.down.get(ancestor).and_then(|d| d.get(descendant));
                if mirrored != Some(depth) {
                    return Err(violation(format!(
                        "edge {ancestor} -> {descendant} is not mirrored"
                    )));
                }
            }
        }
        let up_rows: usize = self.up.values().map(BTreeMap::len).sum();
        let down_rows: usize = self.down.values().map(BTreeMap::len).sum();
        if up_rows != down_rows {
            return Err(violation(format!(
                "{up_rows} ancestor rows but {down_rows} descendant rows"
            )));
        }

        for &id in self.up.keys().chain(self.down.keys()) {
            if !self.contains(id) {
                return Err(violation(format!("task {id} has no self edge")));
            }
        }

        for (&id, ancestors) in &self.up {
            let zero = ancestors.values().filter(|d| **d == 0).count();
            let parents = ancestors.values().filter(|d| **d == 1).count();
            let children = self
                .down
                .get(&id)
                .map_or(0, |ds| ds.values().filter(|d| **d == 1).count());
            if zero != 1 || parents > 1 || children > 1 {
                return Err(violation(format!(
                    "task {id} has {zero} self edges, {parents} parents, {children} children"
                )));
            }

            // Walking predecessor links must reproduce the ancestor rows exactly.
            let mut expected = BTreeMap::new();
            let mut current = id;
            let mut depth = 0u32;
            loop {
                if expected.insert(current, depth).is_some() {
                    return Err(violation(format!("chain through {id} loops")));
                }
                match self.parent_of(current) {
                    Some(parent) => {
                        current = parent;
                        depth += 1;
                    }
                    None => break,
                }
            }
            if &expected != ancestors {
                return Err(violation(format!(
                    "ancestor rows of {id} do not match its chain"
                )));
            }
        }
        Ok(())
    }

    /// Tail of `parent`'s chain; new members always go at the end.
    fn tail_for(&self, parent: TaskId) -> Result<TaskId> {
        if !self.contains(parent) {
            return Err(CoreError::UnknownId(parent));
        }
        let tail = self.chain_tail(parent).unwrap_or(parent);
        if tail != parent {
            tracing::debug!(parent = %parent, tail = %tail, "parent has a successor, appending at chain tail");
        }
        Ok(tail)
    }

    fn insert(&mut self, edge: HierarchyEdge) {
        self.up
            .entry(edge.descendant)
            .or_default()
            .insert(edge.ancestor, edge.depth);
        self.down
            .entry(edge.ancestor)
            .or_default()
            .insert(edge.descendant, edge.depth);
    }

    fn remove(&mut self, ancestor: TaskId, descendant: TaskId) {
        if let Some(ancestors) = self.up.get_mut(&descendant) {
            ancestors.remove(&ancestor);
            if ancestors.is_empty() {
                self.up.remove(&descendant);
            }
        }
        if let Some(descendants) = self.down.get_mut(&ancestor) {
            descendants.remove(&descendant);
            if descendants.is_empty() {
                self.down.remove(&ancestor);
            }
        }
    }
}

fn violation(message: String) -> CoreError {
    tracing::error!(%message, "hierarchy invariant violated");
    CoreError::InvariantViolation(message)
}

fn sorted_by_depth(rows: Option<&BTreeMap<TaskId, u32>>) -> Vec<(TaskId, u32)> {
    let mut out: Vec<(TaskId, u32)> = rows
        .map(|r| r.iter().map(|(id, d)| (*id, *d)).collect())
        .unwrap_or_default();
    out.sort_by_key(|(id, depth)| (*depth, *id));
    out
}

fn at_depth(rows: Option<&BTreeMap<TaskId, u32>>, depth: u32) -> Option<TaskId> {
    rows?
        .iter()
        .find(|(_, d)| **d == depth)
        .map(|(id, _)| *id)
}

fn deepest(rows: Option<&BTreeMap<TaskId, u32>>) -> Option<TaskId> {
    rows?.iter().max_by_key(|(_, d)| **d).map(|(id, _)| *id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn t(n: i64) -> TaskId {
        TaskId(n)
    }

    /// Build `1 -> 2 -> ... -> n`.
    fn chain_of(n: i64) -> HierarchyIndex {
        let mut index = HierarchyIndex::new();
        index.attach(t(1), None).unwrap();
        for id in 2..=n {
            index.attach(t(id), Some(t(id - 1))).unwrap();
        }
        index
    }

    #[test]
    fn attach_extends_every_ancestor() {
        let index = chain_of(3);
        assert_eq!(index.ancestors_of(t(3)), vec![(t(3), 0), (t(2), 1), (t(1), 2)]);
        assert_eq!(index.edges().count(), 6);
        assert_eq!(index.chain(t(2)), vec![t(1), t(2), t(3)]);
        index.check_invariants().unwrap();
    }

    #[test]
    fn attach_under_unknown_parent_fails_without_change() {
        let mut index = chain_of(2);
        let before = index.clone();
        let err = index.attach(t(9), Some(t(42))).unwrap_err();
        assert!(matches!(err, CoreError::UnknownId(TaskId(42))));
        assert_eq!(index, before);
    }

    #[test]
    fn attach_twice_is_an_invariant_violation() {
        let mut index = chain_of(1);
        assert!(matches!(
            index.attach(t(1), None),
            Err(CoreError::InvariantViolation(_))
        ));
    }

    #[test]
    fn attach_under_inner_member_appends_at_tail() {
        let mut index = chain_of(3);
        index.attach(t(4), Some(t(1))).unwrap();
        assert_eq!(index.chain(t(4)), vec![t(1), t(2), t(3), t(4)]);
        assert_eq!(index.parent_of(t(4)), Some(t(3)));
        index.check_invariants().unwrap();
    }

    #[test]
    fn detach_reconnects_neighbours() {
        let mut index = chain_of(3);
        let changes = index.detach(t(2)).unwrap();

        assert!(changes.inserted.contains(&HierarchyEdge::new(t(1), t(3), 1)));
        assert_eq!(index.parent_of(t(3)), Some(t(1)));
        assert_eq!(index.depth(t(1), t(3)), Some(1));
        assert!(!index.contains(t(2)));
        assert!(index.edges().all(|e| e.ancestor != t(2) && e.descendant != t(2)));
        index.check_invariants().unwrap();
    }

    #[test]
    fn detach_head_and_tail() {
        let mut index = chain_of(3);
        index.detach(t(1)).unwrap();
        assert_eq!(index.chain(t(3)), vec![t(2), t(3)]);
        index.detach(t(3)).unwrap();
        assert_eq!(index.chain(t(2)), vec![t(2)]);
        index.check_invariants().unwrap();
    }

    #[test]
    fn reparent_moves_successors_along() {
        // 1 -> 2 -> 3 and 10 -> 11
        let mut index = chain_of(3);
        index.attach(t(10), None).unwrap();
        index.attach(t(11), Some(t(10))).unwrap();

        index.reparent(t(2), Some(t(1)), Some(t(10))).unwrap();

        assert_eq!(index.chain(t(1)), vec![t(1)]);
        assert_eq!(index.chain(t(3)), vec![t(10), t(11), t(2), t(3)]);
        assert_eq!(index.depth(t(10), t(3)), Some(3));
        index.check_invariants().unwrap();
    }

    #[test]
    fn reparent_to_none_splits_chain() {
        let mut index = chain_of(4);
        index.reparent(t(3), Some(t(2)), None).unwrap();
        assert_eq!(index.chain(t(1)), vec![t(1), t(2)]);
        assert_eq!(index.chain(t(4)), vec![t(3), t(4)]);
        index.check_invariants().unwrap();
    }

    #[test]
    fn reparent_head_joins_chains() {
        let mut index = chain_of(2);
        index.attach(t(5), None).unwrap();
        index.attach(t(6), Some(t(5))).unwrap();
        index.reparent(t(5), None, Some(t(1))).unwrap();
        assert_eq!(index.chain(t(6)), vec![t(1), t(2), t(5), t(6)]);
        index.check_invariants().unwrap();
    }

    #[test]
    fn reparent_into_own_chain_is_rejected() {
        let mut index = chain_of(3);
        let before = index.clone();
        for parent in [t(1), t(2), t(3)] {
            let err = index.reparent(t(2), Some(t(1)), Some(parent)).unwrap_err();
            assert!(matches!(err, CoreError::CycleRejected { .. }));
        }
        assert_eq!(index, before);
    }

    #[test]
    fn reparent_with_wrong_old_parent_is_rejected() {
        let mut index = chain_of(3);
        assert!(matches!(
            index.reparent(t(3), Some(t(1)), None),
            Err(CoreError::InvariantViolation(_))
        ));
    }

    #[test]
    fn chain_excluding_covers_both_directions() {
        let mut index = chain_of(3);
        index.attach(t(7), None).unwrap();
        let members = index.chain_excluding(t(2));
        assert_eq!(members, [t(1), t(2), t(3)].into_iter().collect());
        assert!(index.chain_excluding(t(99)).is_empty());
    }

    #[test]
    fn apply_rejects_stale_plan() {
        let mut index = chain_of(3);
        let plan = index.plan_detach(t(2)).unwrap();
        index.verify(&plan).unwrap();
        index.apply(&plan).unwrap();
        let before = index.clone();
        assert!(index.verify(&plan).is_err());
        assert!(matches!(
            index.apply(&plan),
            Err(CoreError::InvariantViolation(_))
        ));
        assert_eq!(index, before);
    }

    #[test]
    fn from_edges_round_trip_and_rejects_gaps() {
        let index = chain_of(4);
        let rebuilt = HierarchyIndex::from_edges(index.edges()).unwrap();
        assert_eq!(rebuilt, index);

        let broken: Vec<_> = index
            .edges()
            .filter(|e| !(e.ancestor == t(1) && e.descendant == t(3)))
            .collect();
        assert!(HierarchyIndex::from_edges(broken).is_err());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Attach(Option<usize>),
        Reparent(usize, Option<usize>),
        Detach(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => proptest::option::of(0usize..64).prop_map(Op::Attach),
            2 => (0usize..64, proptest::option::of(0usize..64))
                .prop_map(|(id, parent)| Op::Reparent(id, parent)),
            1 => (0usize..64).prop_map(Op::Detach),
        ]
    }

    /// Reference model: explicit list of chains.
    fn chain_position(chains: &[Vec<TaskId>], id: TaskId) -> Option<(usize, usize)> {
        chains.iter().enumerate().find_map(|(c, chain)| {
            chain.iter().position(|x| *x == id).map(|p| (c, p))
        })
    }

    proptest! {
        #[test]
        fn closure_invariant_holds_under_random_operations(
            ops in proptest::collection::vec(op_strategy(), 1..60)
        ) {
            let mut index = HierarchyIndex::new();
            let mut chains: Vec<Vec<TaskId>> = Vec::new();
            let mut live: Vec<TaskId> = Vec::new();
            let mut next = 1i64;

            for op in ops {
                match op {
                    Op::Attach(parent) => {
                        let id = TaskId(next);
                        next += 1;
                        let parent = parent.and_then(|p| live.get(p % live.len().max(1)).copied());
                        index.attach(id, parent).unwrap();
                        match parent.and_then(|p| chain_position(&chains, p)) {
                            Some((c, _)) => chains[c].push(id),
                            None => chains.push(vec![id]),
                        }
                        live.push(id);
                    }
                    Op::Reparent(i, parent) => {
                        if live.is_empty() {
                            continue;
                        }
                        let id = live[i % live.len()];
                        let new_parent = parent.map(|p| live[p % live.len()]);
                        let old_parent = index.parent_of(id);
                        let would_loop = new_parent
                            .is_some_and(|p| index.chain_excluding(id).contains(&p));
                        let result = index.reparent(id, old_parent, new_parent);
                        if would_loop {
                            let rejected = matches!(result, Err(CoreError::CycleRejected { .. }));
                            prop_assert!(rejected);
                            continue;
                        }
                        prop_assert!(result.is_ok());
                        let (c, pos) = chain_position(&chains, id).unwrap();
                        let moved = chains[c].split_off(pos);
                        if chains[c].is_empty() {
                            chains.remove(c);
                        }
                        match new_parent.and_then(|p| chain_position(&chains, p)) {
                            Some((target, _)) => chains[target].extend(moved),
                            None => chains.push(moved),
                        }
                    }
                    Op::Detach(i) => {
                        if live.is_empty() {
                            continue;
                        }
                        let id = live.swap_remove(i % live.len());
                        index.detach(id).unwrap();
                        let (c, pos) = chain_position(&chains, id).unwrap();
                        chains[c].remove(pos);
                        if chains[c].is_empty() {
                            chains.remove(c);
                        }
                    }
                }

                prop_assert!(index.check_invariants().is_ok());
                prop_assert_eq!(index.len(), live.len());
                for chain in &chains {
                    for member in chain {
                        prop_assert_eq!(&index.chain(*member), chain);
                    }
                }
            }
        }
    }
}
