//! The instruction progress graph (IPG).
//!
//! One graph shared by all instructions of an ISA. Every node records the
//! set of instructions under which it is active and the name hints later
//! used to name signals.
use crate::graph::Graph;
use crate::idx::SecondaryMap;
use crate::isa::InstrSet;
use crate::node::{NodeId, NodeKind};
use crate::types::Type;
use mia_utils::{Id, MiaResult, SourceLoc};
use std::collections::BTreeSet;

#[derive(Clone, Debug, Default)]
pub struct NodeInfo {
    /// Instructions activating the node.
    pub instrs: InstrSet,
    pub hints: BTreeSet<String>,
}

#[derive(Clone, Debug)]
pub struct Ipg {
    pub graph: Graph,
    info: SecondaryMap<NodeId, NodeInfo>,
    instructions: InstrSet,
}

impl Ipg {
    pub fn new(name: impl Into<Id>, instructions: InstrSet) -> Self {
        Self {
            graph: Graph::new(name),
            info: SecondaryMap::new(),
            instructions,
        }
    }

    /// All instructions of the ISA.
    pub fn instructions(&self) -> &InstrSet {
        &self.instructions
    }

    /// Add a node active for `instrs`. Pure expressions are deduplicated and
    /// the existing node becomes active for `instrs` as well.
    pub fn add(&mut self, kind: NodeKind, ty: Type, instrs: &InstrSet) -> NodeId {
        self.add_at(kind, ty, instrs, None)
    }

    /// [Ipg::add] for nodes copied from a described behavior.
    pub fn add_at(
        &mut self,
        kind: NodeKind,
        ty: Type,
        instrs: &InstrSet,
        loc: Option<SourceLoc>,
    ) -> NodeId {
        let id = self.graph.add_unique_at(kind, ty, loc);
        self.info.get_mut(id).instrs.extend(instrs.iter().copied());
        id
    }

    pub fn instrs(&self, id: NodeId) -> &InstrSet {
        &self.info[id].instrs
    }

    pub fn instrs_mut(&mut self, id: NodeId) -> &mut InstrSet {
        &mut self.info.get_mut(id).instrs
    }

    /// Whether `id` is active for every instruction.
    pub fn is_always_active(&self, id: NodeId) -> bool {
        self.instrs(id).is_superset(&self.instructions)
    }

    pub fn hints(&self, id: NodeId) -> &BTreeSet<String> {
        &self.info[id].hints
    }

    pub fn add_hint(&mut self, id: NodeId, hint: impl Into<String>) {
        let hint = hint.into();
        if !hint.is_empty() {
            self.info.get_mut(id).hints.insert(hint);
        }
    }

    pub fn clear_hints(&mut self) {
        for n in self.graph.nodes().collect::<Vec<_>>() {
            self.info.get_mut(n).hints.clear();
        }
    }

    /// Shortest name hint of at most `max_len` characters, ties broken
    /// lexicographically.
    pub fn shortest_hint(&self, id: NodeId, max_len: usize) -> Option<&str> {
        self.hints(id)
            .iter()
            .filter(|h| h.len() <= max_len)
            .min_by(|a, b| a.len().cmp(&b.len()).then(a.cmp(b)))
            .map(String::as_str)
    }

    /// Delete a node without users and forget its info.
    pub fn remove(&mut self, id: NodeId) -> MiaResult<()> {
        self.graph.delete(id)?;
        self.info.take(id);
        Ok(())
    }

    /// Replace `old` by `new`. `new` inherits the activation set and the
    /// hints of `old`.
    pub fn replace_and_delete(&mut self, old: NodeId, new: NodeId) -> MiaResult<()> {
        let info = self.info.take(old);
        let target = self.info.get_mut(new);
        target.instrs.extend(info.instrs);
        target.hints.extend(info.hints);
        self.graph.replace_and_delete(old, new)
    }

    /// Delete `id` and its inputs that become unused. Returns the deleted
    /// nodes.
    pub fn delete_unused(&mut self, id: NodeId) -> MiaResult<Vec<NodeId>> {
        let deleted = self.graph.delete_unused(id)?;
        for n in &deleted {
            self.info.take(*n);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::InstrId;
    use crate::types::Value;

    #[test]
    fn shared_nodes_collect_instructions() {
        let all: InstrSet = [InstrId::from(0), InstrId::from(1)].into();
        let mut ipg = Ipg::new("ipg", all.clone());
        let c = NodeKind::Const(Value::new(4, 32));
        let a = ipg.add(c.clone(), Type::Bits(32), &[InstrId::from(0)].into());
        assert!(!ipg.is_always_active(a));
        let b = ipg.add(c, Type::Bits(32), &[InstrId::from(1)].into());
        assert_eq!(a, b);
        assert!(ipg.is_always_active(a));
    }

    #[test]
    fn shortest_hint_is_deterministic() {
        let mut ipg = Ipg::new("ipg", InstrSet::new());
        let n = ipg.graph.bool_const(true);
        ipg.add_hint(n, "readX0_enable");
        ipg.add_hint(n, "rs2");
        ipg.add_hint(n, "rs1");
        assert_eq!(ipg.shortest_hint(n, 32), Some("rs1"));
        assert_eq!(ipg.shortest_hint(n, 2), None);
    }
}
