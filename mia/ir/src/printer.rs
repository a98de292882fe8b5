//! Implements a textual rendering of the synthesis IR. Printing never
//! mutates anything and is deterministic, so the output can be diffed.
use crate::context::Context;
use crate::graph::Graph;
use crate::ipg::Ipg;
use crate::isa::{InstrSet, Isa};
use crate::mapping::Mapping;
use crate::mia::{Logic, MicroArchitecture, StageId};
use crate::node::{NodeId, NodeKind};
use itertools::Itertools;
use std::io;

/// Printer for the IR. Names of resources, outputs, signals and registers
/// are resolved when the owning structure is known.
#[derive(Clone, Copy, Default)]
pub struct Printer<'a> {
    isa: Option<&'a Isa>,
    mia: Option<&'a MicroArchitecture>,
}

impl<'a> Printer<'a> {
    pub fn new(isa: Option<&'a Isa>, mia: Option<&'a MicroArchitecture>) -> Self {
        Self { isa, mia }
    }

    fn instrs(&self, set: &InstrSet) -> String {
        match self.isa {
            Some(isa) => isa.instruction_names(set).iter().join(","),
            None => set.iter().join(","),
        }
    }

    /// Human readable description of a node without its inputs.
    pub fn node_str(&self, kind: &NodeKind) -> String {
        match kind {
            NodeKind::Read { resource, .. } | NodeKind::Write { resource, .. } => {
                let op = if matches!(kind, NodeKind::Read { .. }) {
                    "read"
                } else {
                    "write"
                };
                match self.isa {
                    Some(isa) => format!("{op} {}", isa.resources[*resource].name),
                    None => kind.mnemonic(),
                }
            }
            NodeKind::IsInstruction(set) => format!("is_instr {{{}}}", self.instrs(set)),
            NodeKind::SelectByInstruction { arms, .. } => format!(
                "select_by_instr [{}]",
                arms.iter().map(|a| format!("{{{}}}", self.instrs(&a.instrs))).join(" ")
            ),
            NodeKind::ReadStageOutput(o) | NodeKind::WriteStageOutput { output: o, .. } => {
                let op = if matches!(kind, NodeKind::ReadStageOutput(_)) {
                    "read_output"
                } else {
                    "write_output"
                };
                match self.mia {
                    Some(mia) => format!("{op} {}", mia.outputs[*o].name),
                    None => kind.mnemonic(),
                }
            }
            NodeKind::ReadSignal(s) | NodeKind::WriteSignal { signal: s, .. } => {
                let op = if matches!(kind, NodeKind::ReadSignal(_)) {
                    "read_signal"
                } else {
                    "write_signal"
                };
                match self.mia {
                    Some(mia) => format!("{op} {}", mia.signals[*s].name),
                    None => kind.mnemonic(),
                }
            }
            NodeKind::ReadReg(r) | NodeKind::WriteReg { reg: r, .. } => {
                let op = if matches!(kind, NodeKind::ReadReg(_)) {
                    "read_reg"
                } else {
                    "write_reg"
                };
                match self.mia {
                    Some(mia) => format!("{op} {}", mia.registers[*r].name),
                    None => kind.mnemonic(),
                }
            }
            NodeKind::WordSlice { slices, fields } => format!(
                "word[{}] ({})",
                slices.iter().join(","),
                fields.iter().join(",")
            ),
            _ => kind.mnemonic(),
        }
    }

    /// Write every live node of `graph` in topological order. `annotate`
    /// may add a trailing comment per node.
    pub fn write_graph<F, A>(
        &self,
        graph: &Graph,
        indent: usize,
        annotate: A,
        f: &mut F,
    ) -> io::Result<()>
    where
        F: io::Write,
        A: Fn(NodeId) -> Option<String>,
    {
        for n in graph.topo_order() {
            write!(f, "{}", " ".repeat(indent))?;
            write!(f, "{n}: {} = {}", graph.ty(n), self.node_str(graph.kind(n)))?;
            let inputs = graph.inputs(n);
            if !inputs.is_empty() {
                write!(f, " {}", inputs.iter().join(", "))?;
            }
            if let Some(note) = annotate(n) {
                write!(f, "  ; {note}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }

    pub fn write_ipg<F: io::Write>(&self, ipg: &Ipg, f: &mut F) -> io::Result<()> {
        writeln!(f, "ipg {} {{", ipg.graph.name)?;
        self.write_graph(
            &ipg.graph,
            2,
            |n| {
                let mut note = format!("[{}]", self.instrs(ipg.instrs(n)));
                if !ipg.hints(n).is_empty() {
                    note.push_str(&format!(" {}", ipg.hints(n).iter().join(" ")));
                }
                Some(note)
            },
            f,
        )?;
        writeln!(f, "}}")
    }

    pub fn write_mapping<F: io::Write>(
        &self,
        mapping: &Mapping,
        ipg: &Ipg,
        f: &mut F,
    ) -> io::Result<()> {
        writeln!(f, "mapping {{")?;
        for (id, ctx) in mapping.contexts() {
            let stage = match self.mia {
                Some(mia) => mia.stages[ctx.stage].name.to_string(),
                None => ctx.stage.to_string(),
            };
            writeln!(
                f,
                "  {id} @ {stage} {} <- [{}] {{{}}}",
                ctx.node,
                ctx.preds.iter().join(", "),
                self.instrs(&ctx.instructions(ipg))
            )?;
            for n in ctx.nodes() {
                let fixed = if ctx.fixed().contains(n) { "*" } else { " " };
                writeln!(
                    f,
                    "   {fixed}{n}: {}",
                    self.node_str(ipg.graph.kind(*n))
                )?;
            }
        }
        writeln!(f, "}}")
    }

    pub fn write_stages<F: io::Write>(
        &self,
        mia: &MicroArchitecture,
        f: &mut F,
    ) -> io::Result<()> {
        for s in mia.ordered() {
            let stage = &mia.stages[s];
            writeln!(f, "stage {} {{", stage.name)?;
            for o in &stage.outputs {
                let out = &mia.outputs[*o];
                writeln!(f, "  output {}: {};", out.name, out.ty)?;
            }
            self.write_graph(&stage.behavior, 2, |_| None, f)?;
            writeln!(f, "}}")?;
        }
        Ok(())
    }

    pub fn write_logic<F: io::Write>(
        &self,
        mia: &MicroArchitecture,
        f: &mut F,
    ) -> io::Result<()> {
        for logic in mia.logic.values() {
            match logic {
                Logic::Forwarding { name } => writeln!(f, "forwarding {name};")?,
                Logic::BranchPrediction { name } => {
                    writeln!(f, "branch_prediction {name};")?
                }
                Logic::Control(control) => {
                    writeln!(f, "control {} {{", control.name)?;
                    for (s, en) in mia.ordered().iter().zip(&control.enables) {
                        let full = match control.full.get(mia.rank(*s)) {
                            Some(Some(r)) => mia.registers[*r].name.to_string(),
                            _ => "true".to_string(),
                        };
                        writeln!(
                            f,
                            "  // {}: enable {}, full {full}",
                            mia.stages[*s].name, mia.signals[*en].name
                        )?;
                    }
                    self.write_graph(&control.behavior, 2, |_| None, f)?;
                    writeln!(f, "}}")?;
                }
            }
        }
        Ok(())
    }

    pub fn write_hazards<F: io::Write>(&self, isa: &Isa, f: &mut F) -> io::Result<()> {
        let stage_name = |s: StageId| match self.mia {
            Some(mia) => mia.stages[s].name.to_string(),
            None => s.to_string(),
        };
        for res in isa.resources.values() {
            let Some(hazards) = &res.hazards else {
                continue;
            };
            writeln!(f, "hazards {} {{", res.name)?;
            for r in &hazards.reads {
                writeln!(
                    f,
                    "  read {} in {}, condition in {}{}",
                    r.node,
                    stage_name(r.stage),
                    stage_name(r.condition_stage),
                    r.address_stage
                        .map(|s| format!(", address in {}", stage_name(s)))
                        .unwrap_or_default()
                )?;
            }
            for w in &hazards.writes {
                writeln!(
                    f,
                    "  write {} in {}, condition in {}{}, value in {}",
                    w.node,
                    stage_name(w.stage),
                    stage_name(w.condition_stage),
                    w.address_stage
                        .map(|s| format!(", address in {}", stage_name(s)))
                        .unwrap_or_default(),
                    stage_name(w.value_stage)
                )?;
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }

    /// Write everything the context currently holds.
    pub fn write_context<F: io::Write>(ctx: &Context, f: &mut F) -> io::Result<()> {
        let printer = Printer::new(ctx.isa.as_ref(), ctx.mia.as_ref());
        if let Some(ipg) = &ctx.ipg {
            printer.write_ipg(ipg, f)?;
            if let Some(mapping) = &ctx.mapping {
                printer.write_mapping(mapping, ipg, f)?;
            }
        }
        if let Some(mia) = &ctx.mia {
            printer.write_stages(mia, f)?;
            printer.write_logic(mia, f)?;
        }
        if let Some(isa) = &ctx.isa {
            printer.write_hazards(isa, f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::isa::{Resource, ResourceKind};
    use crate::types::Type;

    #[test]
    fn graph_text_uses_resource_names() {
        let mut isa = Isa::new("rv", 32);
        let x = isa.add_resource(Resource::new("X", ResourceKind::RegisterFile, Some(5), 32));
        let mut g = Graph::new("t");
        let mut b = Builder::new(&mut g);
        let a = b.constant(3, Type::Bits(5));
        let r = b.read(x, Some(a), Type::Bits(32));
        b.write(x, Some(a), r, None);
        let mut out = vec![];
        Printer::new(Some(&isa), None)
            .write_graph(&g, 0, |_| None, &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "%0: bits<5> = const 5'3\n%1: bits<32> = read X %0\n%2: void = write X %0, %1\n"
        );
    }
}
