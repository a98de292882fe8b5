//! Behavior graphs.
//!
//! A [Graph] is an arena of [Node]s. Nodes refer to their inputs by
//! [NodeId] and every node tracks its users, so that a node can be replaced
//! by another one with all references redirected. Deleting a node marks it
//! as dead, its index is never handed out again.
use crate::node::{NodeId, NodeKind};
use crate::types::{Type, Value};
use crate::{IndexRef, IndexedMap};
use mia_utils::{Error, Id, MiaResult, SourceLoc, WithPos};
use std::collections::BTreeSet;

#[derive(Clone, Debug)]
pub struct Node {
    kind: NodeKind,
    ty: Type,
    loc: Option<SourceLoc>,
    /// One entry per input slot of a live node that refers to this node.
    users: Vec<NodeId>,
    deleted: bool,
}

impl Node {
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl WithPos for Node {
    fn copy_span(&self) -> Option<SourceLoc> {
        self.loc
    }
}

#[derive(Clone, Debug)]
pub struct Graph {
    pub name: Id,
    nodes: IndexedMap<NodeId, Node>,
}

impl Graph {
    pub fn new(name: impl Into<Id>) -> Self {
        Self {
            name: name.into(),
            nodes: IndexedMap::new(),
        }
    }

    /// Add a node without deduplication.
    pub fn add(&mut self, kind: NodeKind, ty: Type) -> NodeId {
        self.add_at(kind, ty, None)
    }

    /// Add a node that remembers where in the description it came from.
    pub fn add_at(
        &mut self,
        kind: NodeKind,
        ty: Type,
        loc: Option<SourceLoc>,
    ) -> NodeId {
        let inputs = kind.inputs();
        let id = self.nodes.push(Node {
            kind,
            ty,
            loc,
            users: vec![],
            deleted: false,
        });
        for input in inputs {
            self.nodes[input].users.push(id);
        }
        id
    }

    /// Add a node, returning an existing structurally equal node instead if
    /// the kind is a pure expression. Word slices accumulate field names.
    pub fn add_unique(&mut self, kind: NodeKind, ty: Type) -> NodeId {
        self.add_unique_at(kind, ty, None)
    }

    /// [Graph::add_unique] for nodes with a known origin. An existing node
    /// keeps its own location.
    pub fn add_unique_at(
        &mut self,
        kind: NodeKind,
        ty: Type,
        loc: Option<SourceLoc>,
    ) -> NodeId {
        if kind.is_unique() {
            if let Some(existing) = self.find_equal(&kind, ty, None) {
                if let NodeKind::WordSlice { fields, .. } = kind {
                    if let NodeKind::WordSlice { fields: have, .. } =
                        &mut self.nodes[existing].kind
                    {
                        have.extend(fields);
                    }
                }
                return existing;
            }
        }
        self.add_at(kind, ty, loc)
    }

    pub fn constant(&mut self, value: Value, ty: Type) -> NodeId {
        self.add_unique(NodeKind::Const(value), ty)
    }

    pub fn bool_const(&mut self, b: bool) -> NodeId {
        self.constant(Value::bool(b), Type::Bool)
    }

    fn find_equal(
        &self,
        kind: &NodeKind,
        ty: Type,
        skip: Option<NodeId>,
    ) -> Option<NodeId> {
        let inputs = kind.inputs();
        // Candidates must share the first input, if there is one.
        let candidates: Box<dyn Iterator<Item = NodeId> + '_> = match inputs.first() {
            Some(first) => Box::new(self.users(*first).into_iter()),
            None => Box::new(self.nodes()),
        };
        candidates.into_iter().find(|&n| {
            Some(n) != skip && {
                let node = &self.nodes[n];
                !node.deleted
                    && node.ty == ty
                    && node.kind.data_eq(kind)
                    && node.kind.inputs() == inputs
            }
        })
    }

    /// Another live node structurally equal to `node`.
    pub fn find_duplicate(&self, node: NodeId) -> Option<NodeId> {
        let n = &self.nodes[node];
        if !n.kind.is_unique() || n.deleted {
            return None;
        }
        self.find_equal(&n.kind, n.ty, Some(node))
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn ty(&self, id: NodeId) -> Type {
        self.nodes[id].ty
    }

    pub fn width(&self, id: NodeId) -> u32 {
        self.nodes[id].ty.width()
    }

    pub fn loc(&self, id: NodeId) -> Option<SourceLoc> {
        self.nodes[id].loc
    }

    pub fn inputs(&self, id: NodeId) -> crate::Inputs {
        self.nodes[id].kind.inputs()
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|n| !n.deleted)
    }

    pub fn is_const(&self, id: NodeId) -> bool {
        self.nodes[id].kind.is_const()
    }

    pub fn as_const(&self, id: NodeId) -> Option<Value> {
        self.nodes[id].kind.as_const()
    }

    /// Whether the node is the constant `true`.
    pub fn is_true(&self, id: NodeId) -> bool {
        self.as_const(id).is_some_and(|v| v.is_true())
    }

    /// Live nodes in index order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .filter(|(_, n)| !n.deleted)
            .map(|(id, _)| id)
    }

    /// Live nodes satisfying `pred` on their kind, in index order.
    pub fn nodes_where<F>(&self, pred: F) -> Vec<NodeId>
    where
        F: Fn(&NodeKind) -> bool,
    {
        self.nodes().filter(|n| pred(self.kind(*n))).collect()
    }

    pub fn live_count(&self) -> usize {
        self.nodes().count()
    }

    /// Distinct users of a node.
    pub fn users(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.nodes[id].users.iter().copied().collect()
    }

    pub fn has_users(&self, id: NodeId) -> bool {
        !self.nodes[id].users.is_empty()
    }

    /// Side-effect nodes in index order.
    pub fn side_effects(&self) -> Vec<NodeId> {
        self.nodes_where(NodeKind::is_side_effect)
    }

    /// Mutate the kind of a node, keeping the user lists consistent.
    pub fn modify<F>(&mut self, id: NodeId, f: F)
    where
        F: FnOnce(&mut NodeKind),
    {
        let before = self.nodes[id].kind.inputs();
        f(&mut self.nodes[id].kind);
        let after = self.nodes[id].kind.inputs();
        for input in before {
            self.remove_user(input, id);
        }
        for input in after {
            self.nodes[input].users.push(id);
        }
    }

    fn remove_user(&mut self, node: NodeId, user: NodeId) {
        let users = &mut self.nodes[node].users;
        if let Some(pos) = users.iter().position(|u| *u == user) {
            users.swap_remove(pos);
        }
    }

    /// Set the activation condition of a side effect or read.
    pub fn set_condition(&mut self, id: NodeId, cond: NodeId) -> MiaResult<()> {
        if !self.nodes[id].kind.has_condition_slot() {
            return Err(Error::internal(format!(
                "{id} ({}) has no condition",
                self.nodes[id].kind.mnemonic()
            )));
        }
        self.modify(id, |kind| match kind {
            NodeKind::Read { condition, .. }
            | NodeKind::Write { condition, .. }
            | NodeKind::WriteStageOutput { condition, .. }
            | NodeKind::WriteReg { condition, .. } => *condition = Some(cond),
            _ => (),
        });
        Ok(())
    }

    /// Redirect every input slot of `user` referring to `old` to `new`.
    pub fn replace_input(&mut self, user: NodeId, old: NodeId, new: NodeId) {
        self.modify(user, |kind| {
            kind.map_inputs(|n| if n == old { new } else { n })
        });
    }

    /// Redirect input slot `slot` of `user` to `new`.
    pub fn set_input(&mut self, user: NodeId, slot: usize, new: NodeId) {
        self.modify(user, |kind| {
            let mut k = 0;
            kind.map_inputs(|n| {
                let r = if k == slot { new } else { n };
                k += 1;
                r
            })
        });
    }

    /// Redirect every use of `old` to `new`.
    pub fn replace_all_uses(&mut self, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        for user in self.users(old) {
            self.replace_input(user, old, new);
        }
    }

    /// Delete a node without users.
    pub fn delete(&mut self, id: NodeId) -> MiaResult<()> {
        if self.nodes[id].deleted {
            return Ok(());
        }
        if self.has_users(id) {
            return Err(Error::internal(format!(
                "cannot delete {id} in `{}`: still used by {:?}",
                self.name,
                self.users(id)
            )));
        }
        for input in self.nodes[id].kind.inputs() {
            self.remove_user(input, id);
        }
        self.nodes[id].deleted = true;
        Ok(())
    }

    /// Redirect every use of `old` to `new` and delete `old`.
    pub fn replace_and_delete(&mut self, old: NodeId, new: NodeId) -> MiaResult<()> {
        self.replace_all_uses(old, new);
        self.delete(old)
    }

    /// Delete `id` and, transitively, every input that becomes unused.
    /// Side effects are never deleted by this. Returns the deleted nodes.
    pub fn delete_unused(&mut self, id: NodeId) -> MiaResult<Vec<NodeId>> {
        let mut deleted = vec![];
        let mut worklist = vec![id];
        while let Some(n) = worklist.pop() {
            if !self.is_live(n)
                || self.has_users(n)
                || self.nodes[n].kind.is_side_effect()
            {
                continue;
            }
            let inputs = self.inputs(n);
            self.delete(n)?;
            deleted.push(n);
            worklist.extend(inputs);
        }
        Ok(deleted)
    }

    /// Live nodes in an order where every node comes after its inputs. Ties
    /// are broken by index.
    pub fn topo_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut visited = vec![false; self.nodes.len()];
        for root in self.nodes() {
            if visited[root.index()] {
                continue;
            }
            // iterative post-order
            let mut stack = vec![(root, false)];
            while let Some((n, expanded)) = stack.pop() {
                if expanded {
                    order.push(n);
                    continue;
                }
                if visited[n.index()] {
                    continue;
                }
                visited[n.index()] = true;
                stack.push((n, true));
                for input in self.inputs(n).into_iter().rev() {
                    if !visited[input.index()] {
                        stack.push((input, false));
                    }
                }
            }
        }
        order
    }

    /// `roots` and every node they transitively depend on.
    pub fn closure<I>(&self, roots: I) -> BTreeSet<NodeId>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mut seen = BTreeSet::new();
        let mut worklist: Vec<_> = roots.into_iter().collect();
        while let Some(n) = worklist.pop() {
            if seen.insert(n) {
                worklist.extend(self.inputs(n));
            }
        }
        seen
    }

    /// Every node that transitively uses `node`, excluding itself.
    pub fn transitive_users(&self, node: NodeId) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut worklist: Vec<_> = self.users(node).into_iter().collect();
        while let Some(n) = worklist.pop() {
            if seen.insert(n) {
                worklist.extend(self.users(n));
            }
        }
        seen
    }

    /// Check that user lists agree with the inputs of live nodes.
    pub fn validate(&self) -> MiaResult<()> {
        for n in self.nodes() {
            for input in self.inputs(n) {
                if !self.is_live(input) {
                    return Err(Error::internal(format!(
                        "{n} in `{}` uses deleted node {input}",
                        self.name
                    )));
                }
                if !self.nodes[input].users.contains(&n) {
                    return Err(Error::internal(format!(
                        "{input} in `{}` does not record user {n}",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BuiltIn;
    use smallvec::smallvec;

    fn add(g: &mut Graph, a: NodeId, b: NodeId) -> NodeId {
        g.add_unique(
            NodeKind::BuiltIn {
                op: BuiltIn::Add,
                args: smallvec![a, b],
            },
            Type::Bits(8),
        )
    }

    #[test]
    fn unique_nodes_are_shared() {
        let mut g = Graph::new("t");
        let one = g.constant(Value::new(1, 8), Type::Bits(8));
        let one_again = g.constant(Value::new(1, 8), Type::Bits(8));
        assert_eq!(one, one_again);
        let two = g.constant(Value::new(2, 8), Type::Bits(8));
        let s1 = add(&mut g, one, two);
        let s2 = add(&mut g, one, two);
        let s3 = add(&mut g, two, one);
        assert_eq!(s1, s2);
        assert_ne!(s1, s3);
        assert_eq!(g.users(one), BTreeSet::from([s1, s3]));
    }

    #[test]
    fn replace_and_delete_redirects_uses() {
        let mut g = Graph::new("t");
        let a = g.constant(Value::new(1, 8), Type::Bits(8));
        let b = g.constant(Value::new(2, 8), Type::Bits(8));
        let c = g.constant(Value::new(3, 8), Type::Bits(8));
        let s = add(&mut g, a, b);
        g.replace_and_delete(b, c).unwrap();
        assert!(!g.is_live(b));
        assert_eq!(g.inputs(s).as_slice(), &[a, c]);
        assert!(g.users(c).contains(&s));
        g.validate().unwrap();
    }

    #[test]
    fn used_nodes_cannot_be_deleted() {
        let mut g = Graph::new("t");
        let a = g.constant(Value::new(1, 8), Type::Bits(8));
        let _s = add(&mut g, a, a);
        let err = g.delete(a).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn delete_unused_cascades() {
        let mut g = Graph::new("t");
        let a = g.constant(Value::new(1, 8), Type::Bits(8));
        let b = g.constant(Value::new(2, 8), Type::Bits(8));
        let s = add(&mut g, a, b);
        let t = add(&mut g, s, b);
        let deleted = g.delete_unused(t).unwrap();
        assert_eq!(deleted.len(), 4);
        assert_eq!(g.live_count(), 0);
    }

    #[test]
    fn topo_order_respects_inputs() {
        let mut g = Graph::new("t");
        let a = g.constant(Value::new(1, 8), Type::Bits(8));
        let b = g.constant(Value::new(2, 8), Type::Bits(8));
        let s = add(&mut g, a, b);
        let late = g.constant(Value::new(9, 8), Type::Bits(8));
        // make `s` depend on a node created after it
        g.replace_input(s, a, late);
        let order = g.topo_order();
        let pos = |n| order.iter().position(|x| *x == n).unwrap();
        assert!(pos(late) < pos(s));
        assert!(pos(b) < pos(s));
        assert_eq!(order.len(), 4);
    }
}
