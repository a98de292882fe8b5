use crate::analysis::{Placement, simplify};
use crate::traversal::{Named, Pass};
use itertools::Itertools;
use mia_ir::{
    self as ir, Arm, Artifact, CtxId, Ipg, Mapping, NodeId, NodeKind,
    ResourceId, StageId,
};
use mia_utils::{Error, MiaResult};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

/// Shares resource ports between instructions.
///
/// Two reads (or two writes) of the same resource, in the same stage and
/// feeding the same stage outputs, that are never active for the same
/// instruction become one access. Inputs that differ are selected by
/// instruction.
#[derive(Default)]
pub struct IpgMerge;

impl Named for IpgMerge {
    fn name() -> &'static str {
        "ipg-merge"
    }

    fn description() -> &'static str {
        "merge resource accesses of disjoint instructions within a stage"
    }
}

impl Pass for IpgMerge {
    fn requires() -> &'static [Artifact] {
        &[Artifact::Mapping]
    }

    fn produces() -> &'static [Artifact] {
        &[Artifact::Merged]
    }

    fn run(&mut self, ctx: &mut ir::Context) -> MiaResult<()> {
        let (Some(mia), Some(ipg), Some(mapping)) =
            (ctx.mia.as_ref(), ctx.ipg.as_mut(), ctx.mapping.as_mut())
        else {
            return Err(Error::internal("merging needs a mapped IPG"));
        };
        let mut merged = 0;
        for s in mia.ordered() {
            merged += merge_stage(ipg, mapping, s)?;
        }
        let rewrites = simplify(ipg, Some(Placement::new(mapping, mia)))?;
        mapping.clean(ipg);
        log::debug!(
            target: Self::name(),
            "{merged} accesses merged, {rewrites} simplifications"
        );
        Ok(())
    }
}

struct Candidate {
    equal_inputs: usize,
    instrs: usize,
    a: NodeId,
    b: NodeId,
}

/// Whether `a` and `b` can become one node.
fn qualifies(ipg: &Ipg, a: NodeId, b: NodeId) -> bool {
    let g = &ipg.graph;
    if a == b || !g.is_live(a) || !g.is_live(b) {
        return false;
    }
    g.kind(a).data_eq(g.kind(b))
        && g.ty(a) == g.ty(b)
        && g.inputs(a).len() == g.inputs(b).len()
        && ipg.instrs(a).is_disjoint(ipg.instrs(b))
        && !g.closure(g.inputs(b)).contains(&a)
        && !g.closure(g.inputs(a)).contains(&b)
}

fn candidates(ipg: &Ipg, mapping: &Mapping, s: StageId) -> Vec<Candidate> {
    let g = &ipg.graph;
    let mut groups: BTreeMap<&BTreeSet<NodeId>, Vec<CtxId>> = BTreeMap::new();
    for c in mapping.stage_contexts(s) {
        groups
            .entry(&mapping.context(c).side_effects)
            .or_default()
            .push(c);
    }
    let mut found = vec![];
    for ctxs in groups.values() {
        let mut accesses: BTreeMap<(bool, ResourceId), BTreeSet<NodeId>> =
            BTreeMap::new();
        for c in ctxs {
            for &n in mapping.context(*c).nodes() {
                if let Some(r) = g.kind(n).resource() {
                    let is_read = matches!(g.kind(n), NodeKind::Read { .. });
                    accesses.entry((is_read, r)).or_default().insert(n);
                }
            }
        }
        for nodes in accesses.values() {
            for (&a, &b) in nodes.iter().tuple_combinations() {
                if !qualifies(ipg, a, b) {
                    continue;
                }
                let equal_inputs = g
                    .inputs(a)
                    .iter()
                    .zip(g.inputs(b).iter())
                    .filter(|(x, y)| x == y)
                    .count();
                found.push(Candidate {
                    equal_inputs,
                    instrs: ipg.instrs(a).union(ipg.instrs(b)).count(),
                    a,
                    b,
                });
            }
        }
    }
    found.sort_by_key(|c| (Reverse(c.equal_inputs), c.instrs, c.a, c.b));
    found
}

fn merge_stage(
    ipg: &mut Ipg,
    mapping: &mut Mapping,
    s: StageId,
) -> MiaResult<usize> {
    let mut total = 0;
    loop {
        let mut merged = 0;
        for c in candidates(ipg, mapping, s) {
            if qualifies(ipg, c.a, c.b) {
                merge_pair(ipg, mapping, c.a, c.b)?;
                merged += 1;
            }
        }
        if merged == 0 {
            return Ok(total);
        }
        total += merged;
    }
}

/// Merge `b` into `a`.
fn merge_pair(
    ipg: &mut Ipg,
    mapping: &mut Mapping,
    a: NodeId,
    b: NodeId,
) -> MiaResult<()> {
    let Some(ctx) = mapping.owner(a) else {
        return Err(Error::internal(format!("merged access {a} is not mapped")));
    };
    log::trace!("merging {b} into {a}");
    let ia = ipg.instrs(a).clone();
    let ib = ipg.instrs(b).clone();
    let both: BTreeSet<_> = ia.union(&ib).copied().collect();
    let b_inputs = ipg.graph.inputs(b);
    let pairs: Vec<(NodeId, NodeId)> =
        ipg.graph.inputs(a).into_iter().zip(b_inputs.iter().copied()).collect();
    for (slot, (x, y)) in pairs.into_iter().enumerate() {
        if x == y {
            continue;
        }
        let extend = matches!(
            ipg.graph.kind(x),
            NodeKind::SelectByInstruction { selection: None, .. }
        ) && ipg.graph.users(x) == BTreeSet::from([a])
            && mapping.owner(x) == Some(ctx);
        let sel = if extend {
            ipg.graph.modify(x, |kind| {
                if let NodeKind::SelectByInstruction { arms, .. } = kind {
                    arms.push(Arm {
                        instrs: ib.clone(),
                        value: y,
                    });
                }
            });
            ipg.instrs_mut(x).extend(ib.iter().copied());
            x
        } else {
            let ty = ipg.graph.ty(x);
            let sel = ipg.add(
                NodeKind::SelectByInstruction {
                    arms: vec![
                        Arm {
                            instrs: ia.clone(),
                            value: x,
                        },
                        Arm {
                            instrs: ib.clone(),
                            value: y,
                        },
                    ],
                    selection: None,
                },
                ty,
                &both,
            );
            mapping.assign(ctx, sel, false);
            sel
        };
        ipg.graph.set_input(a, slot, sel);
    }

    let old = mapping.remove_node(b);
    ipg.replace_and_delete(b, a)?;
    for input in b_inputs.iter().copied().unique() {
        for deleted in ipg.delete_unused(input)? {
            mapping.remove_node(deleted);
        }
    }
    if let Some(old) = old {
        rehome(ipg, mapping, old, &b_inputs);
    }
    Ok(())
}

/// Inputs of a deleted node still owned by its context but no longer used
/// there move to the context of their users.
fn rehome(ipg: &Ipg, mapping: &mut Mapping, old: CtxId, inputs: &[NodeId]) {
    let stage = mapping.context(old).stage;
    for &n in inputs {
        if !ipg.graph.is_live(n) || mapping.owner(n) != Some(old) {
            continue;
        }
        let users: BTreeSet<CtxId> = ipg
            .graph
            .users(n)
            .into_iter()
            .filter_map(|u| mapping.owner(u))
            .collect();
        if users.contains(&old) {
            continue;
        }
        let target = users
            .into_iter()
            .find(|c| mapping.context(*c).stage == stage);
        if let Some(target) = target {
            log::trace!("rehoming {n} from {old} to {target}");
            mapping.move_node(n, target);
        }
    }
}
