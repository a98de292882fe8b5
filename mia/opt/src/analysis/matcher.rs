//! Selection of the IPG nodes implemented by a stage operation.
//!
//! Every [MiaBuiltIn] of a stage behavior claims the IPG nodes it
//! implements. Nodes already done by the operations the instruction passed
//! through before, constants and nodes owned by another operation are never
//! claimed again.
use mia_ir::{Ipg, Isa, Mapping, MiaBuiltIn, NodeId, NodeKind, ResourceId};
use mia_utils::{Error, MiaResult};
use std::collections::BTreeSet;

pub struct Matcher<'a> {
    isa: &'a Isa,
    ipg: &'a Ipg,
    mapping: &'a Mapping,
    done: &'a BTreeSet<NodeId>,
}

fn is_pure(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::BuiltIn { .. } | NodeKind::Select { .. } | NodeKind::Cast { .. }
    )
}

impl<'a> Matcher<'a> {
    pub fn new(
        isa: &'a Isa,
        ipg: &'a Ipg,
        mapping: &'a Mapping,
        done: &'a BTreeSet<NodeId>,
    ) -> Self {
        Self {
            isa,
            ipg,
            mapping,
            done,
        }
    }

    /// Whether `n` may still be claimed.
    fn free(&self, n: NodeId) -> bool {
        !self.done.contains(&n)
            && !self.ipg.graph.is_const(n)
            && !self.mapping.is_owned(n)
    }

    /// Free accesses of `resource`, reads or writes.
    fn accesses(&self, resource: ResourceId, reads: bool) -> Vec<NodeId> {
        self.ipg.graph.nodes_where(|k| match k {
            NodeKind::Read { resource: r, .. } => reads && *r == resource,
            NodeKind::Write { resource: r, .. } => !reads && *r == resource,
            _ => false,
        })
    }

    /// Nodes selected by `op` on `resource`.
    pub fn matches(
        &self,
        op: MiaBuiltIn,
        resource: Option<ResourceId>,
    ) -> MiaResult<BTreeSet<NodeId>> {
        let need = || {
            resource.ok_or_else(|| {
                Error::missing_structure(format!(
                    "`{}` needs a resource to select instruction progress",
                    op.name()
                ))
            })
        };
        let g = &self.ipg.graph;
        let mut matched = BTreeSet::new();
        match op {
            MiaBuiltIn::FetchNext => (),
            MiaBuiltIn::Decode => {
                for n in g.topo_order() {
                    if !self.free(n) {
                        continue;
                    }
                    let kind = g.kind(n);
                    let take = matches!(kind, NodeKind::WordSlice { .. })
                        || (is_pure(kind)
                            && g.inputs(n)
                                .iter()
                                .all(|i| matched.contains(i) || g.is_const(*i)));
                    if take {
                        matched.insert(n);
                    }
                }
            }
            MiaBuiltIn::Read | MiaBuiltIn::ReadOrForward => {
                let r = need()?;
                matched.extend(self.accesses(r, true).into_iter().filter(|n| self.free(*n)));
            }
            MiaBuiltIn::Write => {
                let r = need()?;
                matched.extend(self.accesses(r, false).into_iter().filter(|n| self.free(*n)));
            }
            MiaBuiltIn::Compute => {
                for n in g.topo_order() {
                    if !self.free(n) || !is_pure(g.kind(n)) {
                        continue;
                    }
                    let ready = g.inputs(n).iter().all(|i| {
                        self.done.contains(i) || matched.contains(i) || g.is_const(*i)
                    });
                    if ready {
                        matched.insert(n);
                    }
                }
            }
            MiaBuiltIn::Address => {
                let r = need()?;
                let accesses = self.accesses(r, true).into_iter().chain(self.accesses(r, false));
                matched.extend(
                    accesses
                        .filter_map(|n| g.kind(n).address())
                        .filter(|a| self.free(*a)),
                );
            }
            MiaBuiltIn::Results => {
                let r = need()?;
                for w in self.accesses(r, false) {
                    let NodeKind::Write {
                        address: Some(_),
                        value,
                        ..
                    } = g.kind(w)
                    else {
                        continue;
                    };
                    let mut chain = vec![];
                    let mut cur = *value;
                    loop {
                        if self.done.contains(&cur) {
                            matched.extend(chain);
                            break;
                        }
                        match g.kind(cur) {
                            NodeKind::Cast { arg, .. } if self.free(cur) => {
                                chain.push(cur);
                                cur = *arg;
                            }
                            _ => break,
                        }
                    }
                }
            }
            MiaBuiltIn::Verify => {
                if let Some(pc) = self.isa.pc {
                    for w in self.accesses(pc, false) {
                        let NodeKind::Write {
                            value, condition, ..
                        } = g.kind(w)
                        else {
                            continue;
                        };
                        matched.extend(
                            std::iter::once(*value)
                                .chain(*condition)
                                .filter(|n| self.free(*n)),
                        );
                    }
                }
            }
        }
        Ok(matched)
    }

    /// `seeds` together with every input they transitively need that may
    /// still be claimed.
    pub fn grow(&self, seeds: &BTreeSet<NodeId>) -> BTreeSet<NodeId> {
        let mut nodes = seeds.clone();
        let mut worklist: Vec<_> = seeds.iter().copied().collect();
        while let Some(n) = worklist.pop() {
            for input in self.ipg.graph.inputs(n) {
                if self.free(input) && nodes.insert(input) {
                    worklist.push(input);
                }
            }
        }
        nodes
    }
}
