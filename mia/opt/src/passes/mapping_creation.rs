use crate::analysis::Matcher;
use crate::traversal::{Named, Pass};
use itertools::Itertools;
use mia_ir::{
    self as ir, Artifact, CtxId, Graph, Ipg, Isa, Mapping, MiaBuiltIn,
    MicroArchitecture, NodeId, NodeKind, OutputId, Printer, StageId,
};
use mia_utils::{Error, MiaResult};
use std::collections::{BTreeMap, BTreeSet};

/// Maps the nodes of the instruction progress graph to pipeline stages.
///
/// Every operation on instruction progress in a stage behavior gets a
/// [ir::NodeContext] owning the IPG nodes it implements. The contexts are
/// linked along the instruction flow, through stage outputs across stage
/// boundaries.
#[derive(Default)]
pub struct MappingCreation;

impl Named for MappingCreation {
    fn name() -> &'static str {
        "mapping-creation"
    }

    fn description() -> &'static str {
        "assign the instruction progress graph to pipeline stages"
    }
}

impl Pass for MappingCreation {
    fn requires() -> &'static [Artifact] {
        &[Artifact::Ipg, Artifact::StageOrder]
    }

    fn produces() -> &'static [Artifact] {
        &[Artifact::Mapping]
    }

    fn run(&mut self, ctx: &mut ir::Context) -> MiaResult<()> {
        let isa = ctx.isa()?;
        let mia = ctx.mia()?;
        let ipg = ctx.ipg()?;
        let mut builder = MappingBuilder {
            isa,
            mia,
            ipg,
            mapping: Mapping::new(),
            writers: BTreeMap::new(),
        };
        for s in mia.ordered() {
            builder.stage(s)?;
        }
        builder.check_complete()?;
        let mapping = builder.mapping;
        mapping.validate(ipg, mia)?;
        log::debug!(
            target: Self::name(),
            "{} contexts, latch width {}",
            mapping.len(),
            mapping.latch_width(ipg, mia)
        );
        ctx.mapping = Some(mapping);
        Ok(())
    }
}

struct MappingBuilder<'a> {
    isa: &'a Isa,
    mia: &'a MicroArchitecture,
    ipg: &'a Ipg,
    mapping: Mapping,
    /// Context writing each instruction output.
    writers: BTreeMap<OutputId, Option<CtxId>>,
}

impl MappingBuilder<'_> {
    fn stage(&mut self, s: StageId) -> MiaResult<()> {
        let mia = self.mia;
        let stage = &mia.stages[s];
        let g = &stage.behavior;
        let mut resolved: BTreeMap<NodeId, Option<CtxId>> = BTreeMap::new();
        let mut pending = vec![];
        for n in g.topo_order() {
            if !g.ty(n).is_instruction() {
                continue;
            }
            match g.kind(n) {
                NodeKind::ReadStageOutput(o) => {
                    let Some(writer) = self.writers.get(o).copied().flatten() else {
                        return Err(Error::unmapped(
                            stage.name,
                            format!(
                                "could not load instruction progress from `{}`, \
                                 no operation writes it",
                                mia.outputs[*o].name
                            ),
                        )
                        .with_pos(g.loc(n)));
                    };
                    resolved.insert(n, Some(writer));
                }
                NodeKind::MiaCall { .. } => pending.push(n),
                _ => (),
            }
        }
        if pending.is_empty() && resolved.is_empty() {
            log::trace!("stage `{}` does not handle instructions", stage.name);
            return Ok(());
        }

        while !pending.is_empty() {
            let before = pending.len();
            let mut delayed = vec![];
            for n in pending {
                let inputs = instr_inputs(g, n);
                if inputs.iter().all(|i| resolved.contains_key(i)) {
                    let preds = inputs.iter().filter_map(|i| resolved[i]).unique().collect();
                    let ctx = self.map_node(s, n, preds)?;
                    resolved.insert(n, Some(ctx));
                } else {
                    delayed.push(n);
                }
            }
            if delayed.len() == before {
                let n = delayed[0];
                return Err(Error::unmapped(
                    stage.name,
                    format!(
                        "`{}` waits for instruction progress no operation produces",
                        g.kind(n).mnemonic()
                    ),
                )
                .with_pos(g.loc(n)));
            }
            pending = delayed;
        }

        for n in g.topo_order() {
            let NodeKind::WriteStageOutput { output, value, .. } = g.kind(n) else {
                continue;
            };
            if !g.ty(*value).is_instruction() {
                continue;
            }
            let writer = resolved.get(value).copied().flatten();
            if let Some(c) = writer {
                self.record_side_effect(s, c, n);
            }
            self.writers.insert(*output, writer);
        }
        Ok(())
    }

    /// Create the context of the map node `n`.
    fn map_node(&mut self, s: StageId, n: NodeId, preds: Vec<CtxId>) -> MiaResult<CtxId> {
        let mia = self.mia;
        let g = &mia.stages[s].behavior;
        let NodeKind::MiaCall { op, resources, .. } = g.kind(n) else {
            return Err(Error::internal(format!("{n} is not an operation")));
        };
        let done: BTreeSet<NodeId> = preds
            .iter()
            .flat_map(|p| self.mapping.ancestors(*p))
            .flat_map(|c| self.mapping.context(c).nodes().iter().copied())
            .collect();
        let (matched, grown) = {
            let matcher = Matcher::new(self.isa, self.ipg, &self.mapping, &done);
            let matched = matcher
                .matches(*op, resources.first().copied())
                .map_err(|e| e.with_pos(g.loc(n)))?;
            let grown = matcher.grow(&matched);
            (matched, grown)
        };
        let ctx = self.mapping.add_context(s, n, preds);
        for m in &grown {
            self.mapping.assign(ctx, *m, matched.contains(m));
        }
        if *op == MiaBuiltIn::Decode && self.mapping.decode().is_none() {
            self.mapping.set_decode(ctx);
        }
        log::trace!(
            "{ctx}: `{}` in `{}` owns {} nodes ({} matched)",
            op.name(),
            mia.stages[s].name,
            grown.len(),
            matched.len()
        );
        Ok(ctx)
    }

    /// Record `effect` in `ctx` and its predecessors in the same stage.
    fn record_side_effect(&mut self, s: StageId, ctx: CtxId, effect: NodeId) {
        let mut seen = BTreeSet::new();
        let mut worklist = vec![ctx];
        while let Some(c) = worklist.pop() {
            if self.mapping.context(c).stage != s || !seen.insert(c) {
                continue;
            }
            self.mapping.add_side_effect(c, effect);
            worklist.extend(self.mapping.context(c).preds.iter().copied());
        }
    }

    /// Every resource access must be implemented by some stage.
    fn check_complete(&self) -> MiaResult<()> {
        let printer = Printer::new(Some(self.isa), Some(self.mia));
        let g = &self.ipg.graph;
        let missing: Vec<_> = g
            .nodes_where(NodeKind::is_resource_access)
            .into_iter()
            .filter(|n| !self.mapping.is_owned(*n))
            .collect();
        let (Some(n), Some(last)) = (missing.first().copied(), self.mia.ordered().last().copied())
        else {
            return Ok(());
        };
        let further = (missing.len() > 1)
            .then(|| format!("{} further accesses are unmapped", missing.len() - 1));
        Err(Error::unmapped(
            self.mia.stages[last].name,
            format!(
                "no stage implements `{}` of {}",
                printer.node_str(g.kind(n)),
                self.isa
                    .instruction_names(self.ipg.instrs(n))
                    .iter()
                    .join(", ")
            ),
        )
        .with_pos(g.loc(n))
        .with_post_msg(further))
    }
}

/// Inputs of `n` carrying instruction progress.
fn instr_inputs(g: &Graph, n: NodeId) -> Vec<NodeId> {
    g.inputs(n)
        .into_iter()
        .filter(|i| g.ty(*i).is_instruction())
        .collect()
}
