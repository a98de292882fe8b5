use crate::analysis::{Placement, dedup, simplify};
use crate::traversal::{ConstructPass, Named, ParseVal, Pass, PassOpt};
use mia_ir::{
    self as ir, Arm, Artifact, CtxId, InstrSet, Ipg, Mapping, MicroArchitecture,
    NodeId, NodeKind, StageId,
};
use mia_utils::{Error, MiaResult};
use std::collections::BTreeSet;

/// Shrinks the pipeline latches by moving computations to earlier stages.
///
/// A pure expression whose inputs are all available in the previous stage
/// moves there when the inputs it frees from the latch are wider than its
/// own result. Selections by instruction are split so that the part
/// depending only on earlier stages can move on its own. Duplicates are
/// merged into the earliest copy.
pub struct MappingOptimize {
    max_rounds: u64,
}

impl Named for MappingOptimize {
    fn name() -> &'static str {
        "mapping-optimize"
    }

    fn description() -> &'static str {
        "move computations between stages to reduce the pipeline latch width"
    }

    fn opts() -> Vec<PassOpt> {
        vec![PassOpt::new(
            "max-rounds",
            "maximum number of optimization rounds",
            ParseVal::Num(16),
            PassOpt::parse_num,
        )]
    }
}

impl ConstructPass for MappingOptimize {
    fn from(ctx: &ir::Context) -> MiaResult<Self> {
        let opts = Self::get_opts(ctx);
        Ok(MappingOptimize {
            max_rounds: opts["max-rounds"].pos_num().unwrap_or(16),
        })
    }
}

impl Pass for MappingOptimize {
    fn requires() -> &'static [Artifact] {
        &[Artifact::Mapping]
    }

    fn run(&mut self, ctx: &mut ir::Context) -> MiaResult<()> {
        let (Some(mia), Some(ipg), Some(mapping)) =
            (ctx.mia.as_ref(), ctx.ipg.as_mut(), ctx.mapping.as_mut())
        else {
            return Err(Error::internal("optimization needs a mapped IPG"));
        };
        let initial = mapping.latch_width(ipg, mia);
        let mut rounds = 0;
        while rounds < self.max_rounds {
            rounds += 1;
            let width = mapping.latch_width(ipg, mia);
            let saved = (ipg.clone(), mapping.clone());
            let moved = move_nodes_up(ipg, mapping, mia);
            let split = split_selects(ipg, mapping, mia);
            let merged = dedup(ipg, Some(Placement::new(mapping, mia)))?;
            mapping.clean(ipg);
            let after = mapping.latch_width(ipg, mia);
            if after > width {
                log::debug!(
                    target: Self::name(),
                    "reverting round {rounds}, it widened the latches from \
                     {width} to {after} bits"
                );
                (*ipg, *mapping) = saved;
                break;
            }
            log::trace!(
                "round {rounds}: {moved} moved, {split} split, {merged} merged, \
                 {after} bits"
            );
            if moved + split + merged == 0 {
                break;
            }
        }
        simplify(ipg, Some(Placement::new(mapping, mia)))?;
        mapping.clean(ipg);
        log::debug!(
            target: Self::name(),
            "latch width {initial} -> {} bits after {rounds} rounds",
            mapping.latch_width(ipg, mia)
        );
        Ok(())
    }
}

/// Latch bits saved at the boundary in front of stage `rank` if a node in
/// that stage consuming `inputs` and producing `width` bits moves one
/// stage up. Inputs are only freed when `user` is their last consumer in a
/// stage at or after `rank`.
fn gain(
    ipg: &Ipg,
    mapping: &Mapping,
    mia: &MicroArchitecture,
    user: NodeId,
    inputs: &BTreeSet<NodeId>,
    rank: usize,
) -> i64 {
    let placement = Placement::new(mapping, mia);
    let freed: i64 = inputs
        .iter()
        .filter(|x| !ipg.graph.is_const(**x))
        .filter(|x| placement.rank(**x).is_some_and(|r| r < rank))
        .filter(|x| {
            ipg.graph
                .users(**x)
                .into_iter()
                .filter(|u| *u != user)
                .all(|u| placement.rank(u).is_some_and(|r| r < rank))
        })
        .map(|x| ipg.graph.width(*x) as i64)
        .sum();
    freed - ipg.graph.width(user) as i64
}

fn stage_with_prev(mia: &MicroArchitecture) -> Vec<(StageId, StageId)> {
    mia.ordered()
        .into_iter()
        .filter_map(|s| mia.stages[s].prev.map(|p| (s, p)))
        .collect()
}

fn movable(ipg: &Ipg, mapping: &Mapping, c: CtxId) -> Vec<NodeId> {
    mapping
        .context(c)
        .movable()
        .filter(|n| ipg.graph.kind(*n).is_movable())
        .collect()
}

fn move_nodes_up(
    ipg: &Ipg,
    mapping: &mut Mapping,
    mia: &MicroArchitecture,
) -> usize {
    let mut moved = 0;
    for (s, prev) in stage_with_prev(mia) {
        let rank = mia.rank(s);
        for c in mapping.stage_contexts(s) {
            for n in movable(ipg, mapping, c) {
                if mapping.owner(n) != Some(c) || !ipg.graph.has_users(n) {
                    continue;
                }
                let inputs: BTreeSet<_> = ipg.graph.inputs(n).into_iter().collect();
                if inputs.iter().any(|i| mapping.stage_of(*i) == Some(s)) {
                    continue;
                }
                let Some(target) = mapping.nearest_ancestor_in(c, prev) else {
                    continue;
                };
                if gain(ipg, mapping, mia, n, &inputs, rank) <= 0 {
                    continue;
                }
                log::trace!("moving {n} from {c} to {target}");
                mapping.move_node(n, target);
                moved += 1;
            }
        }
    }
    moved
}

fn split_selects(
    ipg: &mut Ipg,
    mapping: &mut Mapping,
    mia: &MicroArchitecture,
) -> usize {
    let mut split = 0;
    for (s, _) in stage_with_prev(mia) {
        let rank = mia.rank(s);
        for c in mapping.stage_contexts(s) {
            for n in movable(ipg, mapping, c) {
                let NodeKind::SelectByInstruction {
                    arms,
                    selection: None,
                } = ipg.graph.kind(n).clone()
                else {
                    continue;
                };
                let (outside, inside): (Vec<Arm>, Vec<Arm>) =
                    arms.into_iter().partition(|a| {
                        mapping
                            .stage_of(a.value)
                            .is_some_and(|st| mia.rank(st) < rank)
                    });
                if outside.len() < 2 || inside.is_empty() {
                    continue;
                }
                let values: BTreeSet<_> = outside.iter().map(|a| a.value).collect();
                if gain(ipg, mapping, mia, n, &values, rank) <= 0 {
                    continue;
                }
                let instrs: InstrSet =
                    outside.iter().flat_map(|a| a.instrs.iter().copied()).collect();
                let ty = ipg.graph.ty(n);
                let part = ipg.add(
                    NodeKind::SelectByInstruction {
                        arms: outside,
                        selection: None,
                    },
                    ty,
                    &instrs,
                );
                mapping.assign(c, part, false);
                ipg.graph.modify(n, |kind| {
                    if let NodeKind::SelectByInstruction { arms, .. } = kind {
                        *arms = inside;
                        arms.push(Arm {
                            instrs,
                            value: part,
                        });
                    }
                });
                log::trace!("split {part} off {n}");
                split += 1;
            }
        }
    }
    split
}
