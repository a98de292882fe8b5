//! Mapping of instruction progress graph nodes to pipeline stages.
//!
//! Every operation of a stage behavior on instruction progress (`decode`,
//! `read(@X)`, `compute`, ...) gets a [NodeContext] that owns the IPG nodes
//! implementing it. Contexts link to the contexts of their instruction
//! inputs and form a DAG that never points to a later stage.
use crate::ipg::Ipg;
use crate::isa::InstrSet;
use crate::mia::{MicroArchitecture, StageId};
use crate::node::NodeId;
use crate::IndexedMap;
use mia_utils::{Error, MiaResult};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CtxId(u32);
crate::impl_index!(CtxId, "ctx");

#[derive(Clone, Debug)]
pub struct NodeContext {
    pub stage: StageId,
    /// The stage behavior node this context maps.
    pub node: NodeId,
    pub preds: Vec<CtxId>,
    pub succs: Vec<CtxId>,
    /// Stage behavior side effects consuming the instruction progress of
    /// this context.
    pub side_effects: BTreeSet<NodeId>,
    fixed: BTreeSet<NodeId>,
    nodes: BTreeSet<NodeId>,
}

impl NodeContext {
    /// IPG nodes identified by the matcher of this context.
    pub fn fixed(&self) -> &BTreeSet<NodeId> {
        &self.fixed
    }

    /// All IPG nodes owned by this context.
    pub fn nodes(&self) -> &BTreeSet<NodeId> {
        &self.nodes
    }

    /// Owned nodes that optimization may relocate.
    pub fn movable(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.difference(&self.fixed).copied()
    }

    /// Instructions live at this point of the pipeline.
    pub fn instructions(&self, ipg: &Ipg) -> InstrSet {
        self.nodes
            .iter()
            .flat_map(|n| ipg.instrs(*n).iter().copied())
            .collect()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Mapping {
    contexts: IndexedMap<CtxId, NodeContext>,
    owner: BTreeMap<NodeId, CtxId>,
    by_stage_node: BTreeMap<(StageId, NodeId), CtxId>,
    decode: Option<CtxId>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context for the stage node `node` depending on `preds`.
    pub fn add_context(
        &mut self,
        stage: StageId,
        node: NodeId,
        preds: Vec<CtxId>,
    ) -> CtxId {
        let id = self.contexts.push(NodeContext {
            stage,
            node,
            preds: preds.clone(),
            succs: vec![],
            side_effects: BTreeSet::new(),
            fixed: BTreeSet::new(),
            nodes: BTreeSet::new(),
        });
        for p in preds {
            self.contexts[p].succs.push(id);
        }
        self.by_stage_node.insert((stage, node), id);
        id
    }

    pub fn context(&self, id: CtxId) -> &NodeContext {
        &self.contexts[id]
    }

    pub fn contexts(&self) -> impl Iterator<Item = (CtxId, &NodeContext)> {
        self.contexts.iter()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn find_context(&self, stage: StageId, node: NodeId) -> Option<CtxId> {
        self.by_stage_node.get(&(stage, node)).copied()
    }

    pub fn set_decode(&mut self, ctx: CtxId) {
        self.decode = Some(ctx);
    }

    pub fn decode(&self) -> Option<CtxId> {
        self.decode
    }

    pub fn ensure_decode(&self) -> MiaResult<CtxId> {
        self.decode.ok_or_else(|| {
            Error::missing_structure(
                "the microarchitecture does not decode instructions",
            )
        })
    }

    pub fn add_side_effect(&mut self, ctx: CtxId, effect: NodeId) {
        self.contexts[ctx].side_effects.insert(effect);
    }

    pub fn owner(&self, node: NodeId) -> Option<CtxId> {
        self.owner.get(&node).copied()
    }

    pub fn stage_of(&self, node: NodeId) -> Option<StageId> {
        self.owner(node).map(|c| self.contexts[c].stage)
    }

    pub fn is_owned(&self, node: NodeId) -> bool {
        self.owner.contains_key(&node)
    }

    /// Make `ctx` the owner of `node`, detaching it from any previous owner.
    pub fn assign(&mut self, ctx: CtxId, node: NodeId, fixed: bool) {
        self.remove_node(node);
        let c = &mut self.contexts[ctx];
        c.nodes.insert(node);
        if fixed {
            c.fixed.insert(node);
        }
        self.owner.insert(node, ctx);
    }

    /// Detach `node` from its owner. Returns the previous owner.
    pub fn remove_node(&mut self, node: NodeId) -> Option<CtxId> {
        let ctx = self.owner.remove(&node)?;
        let c = &mut self.contexts[ctx];
        c.nodes.remove(&node);
        c.fixed.remove(&node);
        Some(ctx)
    }

    /// Move a node to another context. The node is no longer fixed.
    pub fn move_node(&mut self, node: NodeId, to: CtxId) {
        self.assign(to, node, false);
    }

    /// Contexts of `stage` in creation order.
    pub fn stage_contexts(&self, stage: StageId) -> Vec<CtxId> {
        self.contexts
            .iter()
            .filter(|(_, c)| c.stage == stage)
            .map(|(id, _)| id)
            .collect()
    }

    /// All IPG nodes owned in `stage`.
    pub fn stage_nodes(&self, stage: StageId) -> BTreeSet<NodeId> {
        self.contexts
            .values()
            .filter(|c| c.stage == stage)
            .flat_map(|c| c.nodes.iter().copied())
            .collect()
    }

    pub fn contains_in_stage(&self, stage: StageId, node: NodeId) -> bool {
        self.stage_of(node) == Some(stage)
    }

    /// The closest context reachable through predecessors of `ctx` that
    /// belongs to `stage`. Breadth first, in predecessor order.
    pub fn nearest_ancestor_in(&self, ctx: CtxId, stage: StageId) -> Option<CtxId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<_> = self.contexts[ctx].preds.iter().copied().collect();
        while let Some(c) = queue.pop_front() {
            if !seen.insert(c) {
                continue;
            }
            if self.contexts[c].stage == stage {
                return Some(c);
            }
            queue.extend(self.contexts[c].preds.iter().copied());
        }
        None
    }

    /// `ctx` and all contexts it transitively depends on.
    pub fn ancestors(&self, ctx: CtxId) -> BTreeSet<CtxId> {
        let mut seen = BTreeSet::new();
        let mut worklist = vec![ctx];
        while let Some(c) = worklist.pop() {
            if seen.insert(c) {
                worklist.extend(self.contexts[c].preds.iter().copied());
            }
        }
        seen
    }

    /// Forget deleted nodes and release constants.
    pub fn clean(&mut self, ipg: &Ipg) {
        let stale: Vec<_> = self
            .owner
            .keys()
            .copied()
            .filter(|n| !ipg.graph.is_live(*n) || ipg.graph.is_const(*n))
            .collect();
        for n in stale {
            self.remove_node(n);
        }
    }

    /// Rank of the stage owning `node`, if owned.
    fn rank_of(&self, node: NodeId, mia: &MicroArchitecture) -> Option<usize> {
        self.stage_of(node).map(|s| mia.rank(s))
    }

    /// Width of the values crossing each stage boundary. Entry `k` is the
    /// boundary between the stages at rank `k` and `k + 1`.
    pub fn boundary_widths(&self, ipg: &Ipg, mia: &MicroArchitecture) -> Vec<u64> {
        let stages = mia.ordered().len();
        let mut widths = vec![0u64; stages.saturating_sub(1)];
        for (&node, _) in self.owner.iter() {
            let Some(rank) = self.rank_of(node, mia) else {
                continue;
            };
            let last_use = ipg
                .graph
                .users(node)
                .into_iter()
                .filter_map(|u| self.rank_of(u, mia))
                .max()
                .unwrap_or(rank);
            for w in widths.iter_mut().take(last_use).skip(rank) {
                *w += ipg.graph.width(node) as u64;
            }
        }
        widths
    }

    /// Total width of all pipeline latches needed by the mapping.
    pub fn latch_width(&self, ipg: &Ipg, mia: &MicroArchitecture) -> u64 {
        self.boundary_widths(ipg, mia).iter().sum()
    }

    /// Check the structural invariants of the mapping against the IPG.
    pub fn validate(&self, ipg: &Ipg, mia: &MicroArchitecture) -> MiaResult<()> {
        for (&node, &ctx) in &self.owner {
            if !self.contexts[ctx].nodes.contains(&node) {
                return Err(Error::internal(format!(
                    "owner index of {node} points to {ctx} which does not own it"
                )));
            }
            if !ipg.graph.is_live(node) {
                return Err(Error::internal(format!(
                    "{ctx} owns deleted node {node}"
                )));
            }
            if ipg.graph.is_const(node) {
                return Err(Error::internal(format!(
                    "{ctx} owns constant {node}"
                )));
            }
        }
        for (id, ctx) in self.contexts.iter() {
            for n in &ctx.nodes {
                if self.owner(*n) != Some(id) {
                    return Err(Error::internal(format!(
                        "{id} claims {n} which is owned by {:?}",
                        self.owner(*n)
                    )));
                }
            }
            if !ctx.fixed.is_subset(&ctx.nodes) {
                return Err(Error::internal(format!(
                    "{id} has fixed nodes it does not own"
                )));
            }
            if !ctx.instructions(ipg).is_subset(ipg.instructions()) {
                return Err(Error::internal(format!(
                    "{id} is live for unknown instructions"
                )));
            }
            let rank = mia.rank(ctx.stage);
            for p in &ctx.preds {
                if mia.rank(self.contexts[*p].stage) > rank {
                    return Err(Error::internal(format!(
                        "{id} depends on {p} of a later stage"
                    )));
                }
                if self.ancestors(*p).contains(&id) {
                    return Err(Error::internal(format!(
                        "context cycle through {id} and {p}"
                    )));
                }
            }
        }
        for node in ipg.graph.nodes() {
            if ipg.graph.is_const(node) {
                continue;
            }
            let Some(rank) = self.rank_of(node, mia) else {
                return Err(Error::internal(format!(
                    "{node} ({}) is not mapped to any stage",
                    ipg.graph.kind(node).mnemonic()
                )));
            };
            for input in ipg.graph.inputs(node) {
                if let Some(r) = self.rank_of(input, mia) {
                    if r > rank {
                        return Err(Error::internal(format!(
                            "{node} uses {input} computed in a later stage"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_moves_ownership() {
        let mut m = Mapping::new();
        let s = StageId::from(0);
        let a = m.add_context(s, NodeId::from(0), vec![]);
        let b = m.add_context(s, NodeId::from(1), vec![a]);
        let n = NodeId::from(5);
        m.assign(a, n, true);
        assert_eq!(m.owner(n), Some(a));
        assert!(m.context(a).fixed().contains(&n));
        m.move_node(n, b);
        assert_eq!(m.owner(n), Some(b));
        assert!(m.context(a).nodes().is_empty());
        assert_eq!(m.context(b).movable().collect::<Vec<_>>(), vec![n]);
        assert_eq!(m.context(a).succs, vec![b]);
    }

    #[test]
    fn nearest_ancestor_skips_own_stage() {
        let mut m = Mapping::new();
        let (s0, s1) = (StageId::from(0), StageId::from(1));
        let a = m.add_context(s0, NodeId::from(0), vec![]);
        let b = m.add_context(s1, NodeId::from(0), vec![a]);
        let c = m.add_context(s1, NodeId::from(1), vec![b]);
        assert_eq!(m.nearest_ancestor_in(c, s0), Some(a));
        assert_eq!(m.nearest_ancestor_in(a, s0), None);
        assert_eq!(m.ancestors(c), BTreeSet::from([a, b, c]));
    }
}
