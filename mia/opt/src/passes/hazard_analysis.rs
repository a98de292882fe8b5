use crate::traversal::{Named, Pass};
use mia_ir::{
    self as ir, Artifact, HazardAnalysis, Ipg, Mapping, NodeId, NodeKind,
    ReadAnalysis, ResourceId, StageId, WriteAnalysis,
};
use mia_utils::{Error, MiaResult};

/// Records, for every resource, where its accesses happen and where their
/// conditions, addresses and values are computed. Hazard detection logic
/// is generated from these facts.
#[derive(Default)]
pub struct HazardAnalysisPass;

impl Named for HazardAnalysisPass {
    fn name() -> &'static str {
        "hazard-analysis"
    }

    fn description() -> &'static str {
        "collect the stages of every resource access for hazard detection"
    }
}

impl Pass for HazardAnalysisPass {
    fn requires() -> &'static [Artifact] {
        &[Artifact::Mapping]
    }

    fn produces() -> &'static [Artifact] {
        &[Artifact::Hazards]
    }

    fn run(&mut self, ctx: &mut ir::Context) -> MiaResult<()> {
        let (Some(isa), Some(mia), Some(ipg), Some(mapping)) = (
            ctx.isa.as_mut(),
            ctx.mia.as_ref(),
            ctx.ipg.as_ref(),
            ctx.mapping.as_ref(),
        ) else {
            return Err(Error::internal("hazard analysis needs a mapped IPG"));
        };
        let Some(entry) = mia.entry() else {
            return Err(Error::pass_assumption(
                Self::name(),
                "the stages have not been ordered",
            ));
        };
        let analysis = Analysis {
            ipg,
            mapping,
            entry,
        };
        let resources: Vec<ResourceId> = isa.resources.keys().collect();
        for r in resources {
            let hazards = analysis.resource(r)?;
            log::debug!(
                target: Self::name(),
                "`{}`: {} reads, {} writes",
                isa.resources[r].name,
                hazards.reads.len(),
                hazards.writes.len()
            );
            isa.resources[r].hazards = Some(hazards);
        }
        Ok(())
    }
}

struct Analysis<'a> {
    ipg: &'a Ipg,
    mapping: &'a Mapping,
    entry: StageId,
}

impl Analysis<'_> {
    /// Stage computing `n`. Constants and unmapped values are available
    /// from the start.
    fn stage_of(&self, n: NodeId) -> StageId {
        if self.ipg.graph.is_const(n) {
            return self.entry;
        }
        self.mapping.stage_of(n).unwrap_or(self.entry)
    }

    fn resource(&self, r: ResourceId) -> MiaResult<HazardAnalysis> {
        let mut hazards = HazardAnalysis::default();
        let g = &self.ipg.graph;
        for n in g.nodes_where(|k| k.resource() == Some(r)) {
            let Some(stage) = self.mapping.stage_of(n) else {
                return Err(Error::internal(format!("access {n} is not mapped")));
            };
            match g.kind(n) {
                NodeKind::Read {
                    address, condition, ..
                } => hazards.reads.push(ReadAnalysis {
                    node: n,
                    stage,
                    condition: *condition,
                    condition_stage: condition
                        .map(|c| self.stage_of(c))
                        .unwrap_or(self.entry),
                    address_stage: address.map(|a| self.stage_of(a)),
                }),
                NodeKind::Write {
                    address,
                    value,
                    condition,
                    ..
                } => hazards.writes.push(WriteAnalysis {
                    node: n,
                    stage,
                    condition: *condition,
                    condition_stage: condition
                        .map(|c| self.stage_of(c))
                        .unwrap_or(self.entry),
                    address_stage: address.map(|a| self.stage_of(a)),
                    value_stage: self.stage_of(*value),
                }),
                _ => (),
            }
        }
        Ok(hazards)
    }
}
