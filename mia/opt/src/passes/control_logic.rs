use crate::traversal::{ConstructPass, Named, ParseVal, Pass, PassOpt};
use mia_ir::{
    self as ir, Artifact, Builder, Control, Graph, Logic, MicroArchitecture,
    NodeId, NodeKind, SignalId, Type,
};
use mia_utils::{Error, MiaResult};

/// Synthesizes the pipeline control unit.
///
/// Implements the stall engine of Kroening and Paul: a stage stalls when it
/// is full and either detects a hazard or the stage after it stalls. A
/// stage is enabled when it is full and does not stall. Every stage but the
/// first has a `full` register that is set when the previous stage passes
/// an instruction on or the stage itself keeps its instruction.
///
/// Afterwards every side effect and conditional read of the stage
/// behaviors only happens while its stage is enabled.
pub struct ControlLogic {
    hazard_placeholder: bool,
}

impl Named for ControlLogic {
    fn name() -> &'static str {
        "control-logic"
    }

    fn description() -> &'static str {
        "synthesize the stall engine and gate the stage behaviors"
    }

    fn opts() -> Vec<PassOpt> {
        vec![PassOpt::new(
            "hazard-placeholder",
            "use the constant `true` instead of hazard inputs",
            ParseVal::Bool(false),
            PassOpt::parse_bool,
        )]
    }
}

impl ConstructPass for ControlLogic {
    fn from(ctx: &ir::Context) -> MiaResult<Self> {
        let opts = Self::get_opts(ctx);
        Ok(ControlLogic {
            hazard_placeholder: opts["hazard-placeholder"].bool(),
        })
    }
}

impl Pass for ControlLogic {
    fn requires() -> &'static [Artifact] {
        &[Artifact::Inlined]
    }

    fn produces() -> &'static [Artifact] {
        &[Artifact::Control]
    }

    fn run(&mut self, ctx: &mut ir::Context) -> MiaResult<()> {
        let Some(mia) = ctx.mia.as_mut() else {
            return Err(Error::missing_structure("no microarchitecture given"));
        };
        if mia.control().is_some() {
            return Err(Error::pass_assumption(
                Self::name(),
                "control logic has already been synthesized",
            ));
        }
        let control = stall_engine(mia, self.hazard_placeholder)?;
        let mut gated = 0;
        for (s, en) in mia.ordered().into_iter().zip(&control.enables) {
            gated += gate(&mut mia.stages[s].behavior, *en)?;
        }
        log::debug!(
            target: Self::name(),
            "{} stages, {gated} side effects gated",
            control.enables.len()
        );
        mia.logic.push(Logic::Control(control));
        Ok(())
    }
}

/// Build the control unit over the ordered stages.
fn stall_engine(
    mia: &mut MicroArchitecture,
    placeholder: bool,
) -> MiaResult<Control> {
    let stages = mia.ordered();
    if stages.is_empty() {
        return Err(Error::missing_structure(format!(
            "`{}` has no stages to control",
            mia.name
        )));
    }
    let names: Vec<_> = stages.iter().map(|s| mia.stages[*s].name).collect();
    let enables: Vec<SignalId> = names
        .iter()
        .map(|n| mia.add_signal(n.append("en"), Type::Bool))
        .collect();
    let hazards: Vec<SignalId> = if placeholder {
        vec![]
    } else {
        names
            .iter()
            .map(|n| mia.add_signal(n.append("hazard"), Type::Bool))
            .collect()
    };
    let full: Vec<_> = names
        .iter()
        .enumerate()
        .map(|(i, n)| {
            (i > 0).then(|| mia.add_register(n.append("full"), Type::Bool, 0))
        })
        .collect();

    let mut behavior = Graph::new(mia.name.append("control"));
    let mut b = Builder::new(&mut behavior);
    let full_now: Vec<NodeId> = full
        .iter()
        .map(|r| match r {
            Some(r) => b.read_reg(*r, Type::Bool),
            None => b.bool(true),
        })
        .collect();
    let hazard_now: Vec<NodeId> = (0..stages.len())
        .map(|i| match hazards.get(i) {
            Some(h) => b.read_signal(*h, Type::Bool),
            None => b.bool(true),
        })
        .collect();

    let mut stall = Vec::with_capacity(stages.len());
    let mut later: Option<NodeId> = None;
    for i in (0..stages.len()).rev() {
        let cause = match later {
            Some(next) => b.or(hazard_now[i], next),
            None => hazard_now[i],
        };
        let s = b.and(cause, full_now[i]);
        stall.push(s);
        later = Some(s);
    }
    stall.reverse();
    for i in 0..stages.len() {
        let not_stall = b.not(stall[i]);
        let en = b.and(full_now[i], not_stall);
        b.write_signal(enables[i], en);
        if let Some(Some(next)) = full.get(i + 1) {
            let keep = b.or(en, stall[i + 1]);
            b.write_reg(*next, keep, None);
        }
    }

    Ok(Control {
        name: mia.name.append("control"),
        enables,
        hazards,
        full,
        behavior,
    })
}

/// AND the enable of the stage into every side effect and conditional
/// read of its behavior.
fn gate(graph: &mut Graph, en: SignalId) -> MiaResult<usize> {
    let targets = graph.nodes_where(|k| {
        let conditional_read =
            matches!(k, NodeKind::Read { condition: Some(_), .. });
        k.has_condition_slot() && (k.is_side_effect() || conditional_read)
    });
    let mut b = Builder::new(graph);
    let enabled = b.read_signal(en, Type::Bool);
    for &t in &targets {
        let cond = b.graph.kind(t).condition();
        let guarded = b.and_opt(enabled, cond);
        b.graph.set_condition(t, guarded)?;
    }
    Ok(targets.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mia_ir::eval::ControlSim;
    use mia_ir::{Isa, Resource, ResourceKind, Stage};

    /// Three stages `S0 -> S1 -> S2`, the last one writing a register.
    fn context() -> ir::Context {
        let mut isa = Isa::new("t", 8);
        let acc = isa.add_resource(Resource::new("ACC", ResourceKind::Register, None, 8));
        let mut mia = MicroArchitecture::new("three");
        let stages: Vec<_> = ["S0", "S1", "S2"]
            .into_iter()
            .map(|n| mia.add_stage(Stage::new(n)))
            .collect();
        mia.order = stages.clone();
        let mut b = Builder::new(&mut mia.stages[stages[2]].behavior);
        let one = b.constant(1, Type::Bits(8));
        b.write(acc, None, one, None);
        ir::Context::new(isa, Some(mia))
    }

    fn synthesize(placeholder: bool) -> ir::Context {
        let mut ctx = context();
        ControlLogic {
            hazard_placeholder: placeholder,
        }
        .run(&mut ctx)
        .unwrap();
        ctx
    }

    #[test]
    fn stall_engine_golden_trace() {
        let ctx = synthesize(false);
        let mia = ctx.mia.as_ref().unwrap();
        let mut sim = ControlSim::new(mia).unwrap();
        let (f, t) = (false, true);
        let trace = [
            ([f, f, f], [t, f, f]),
            ([f, f, f], [t, t, f]),
            ([f, f, t], [f, f, f]),
            ([f, f, f], [t, t, t]),
            ([f, t, f], [f, f, t]),
            ([f, f, f], [t, t, f]),
        ];
        for (cycle, (hazards, enables)) in trace.into_iter().enumerate() {
            assert_eq!(sim.step(&hazards).unwrap(), enables, "cycle {cycle}");
        }
        assert!(sim.full(0) && sim.full(1) && sim.full(2));
    }

    #[test]
    fn signals_follow_stage_names() {
        let ctx = synthesize(false);
        let mia = ctx.mia.as_ref().unwrap();
        let control = mia.control().unwrap();
        let names: Vec<_> = control
            .enables
            .iter()
            .chain(&control.hazards)
            .map(|s| mia.signals[*s].name.to_string())
            .collect();
        assert_eq!(names, ["S0_en", "S1_en", "S2_en", "S0_hazard", "S1_hazard", "S2_hazard"]);
        assert_eq!(control.full[0], None);
        let regs: Vec<_> = control
            .full
            .iter()
            .flatten()
            .map(|r| mia.registers[*r].name.to_string())
            .collect();
        assert_eq!(regs, ["S1_full", "S2_full"]);
        assert_eq!(control.name.as_str(), "three_control");
    }

    #[test]
    fn placeholder_hazards_stall_every_full_stage() {
        let ctx = synthesize(true);
        let mia = ctx.mia.as_ref().unwrap();
        assert!(mia.control().unwrap().hazards.is_empty());
        let mut sim = ControlSim::new(mia).unwrap();
        for _ in 0..3 {
            assert_eq!(sim.step(&[]).unwrap(), [false, false, false]);
        }
    }

    #[test]
    fn side_effects_wait_for_enable() {
        let ctx = synthesize(false);
        let mia = ctx.mia.as_ref().unwrap();
        let control = mia.control().unwrap();
        let g = &mia.stages[mia.order[2]].behavior;
        let write = g.nodes_where(|k| matches!(k, NodeKind::Write { .. }))[0];
        let cond = g.kind(write).condition().unwrap();
        assert!(matches!(g.kind(cond), NodeKind::ReadSignal(s) if *s == control.enables[2]));
    }
}
