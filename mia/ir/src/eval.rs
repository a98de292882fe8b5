//! Reference interpreter for behavior graphs.
//!
//! Used to check that transformations preserve the observable effects of
//! instructions, and to simulate the synthesized control unit.
use crate::graph::Graph;
use crate::ipg::Ipg;
use crate::isa::{InstrId, ResourceId};
use crate::mia::{Control, MicroArchitecture, OutputId, RegId, SignalId};
use crate::node::{NodeId, NodeKind, slice_word};
use crate::types::{Type, Value};
use mia_utils::{Error, MiaResult};
use std::collections::{BTreeMap, BTreeSet};

/// Provides the state a graph reads.
pub trait Env {
    fn read(&mut self, resource: ResourceId, address: Option<u64>) -> u64;

    fn stage_output(&mut self, _output: OutputId) -> u64 {
        0
    }

    fn signal(&mut self, _signal: SignalId) -> u64 {
        0
    }

    fn register(&mut self, _reg: RegId) -> u64 {
        0
    }
}

/// Destination of an effect.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Target {
    Resource(ResourceId),
    Output(OutputId),
    Signal(SignalId),
    Reg(RegId),
}

/// An observable state update.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Effect {
    pub target: Target,
    pub address: Option<u64>,
    pub value: u64,
}

struct Evaluator<'a> {
    graph: &'a Graph,
    instr: Option<InstrId>,
    word: u64,
    values: BTreeMap<NodeId, Value>,
}

impl<'a> Evaluator<'a> {
    fn value(&self, n: NodeId) -> MiaResult<Value> {
        self.values.get(&n).copied().ok_or_else(|| {
            Error::internal(format!("{n} evaluated before its inputs"))
        })
    }

    fn cond(&self, c: Option<NodeId>) -> MiaResult<bool> {
        match c {
            Some(c) => Ok(self.value(c)?.is_true()),
            None => Ok(true),
        }
    }

    fn eval_node<E: Env>(&mut self, n: NodeId, env: &mut E) -> MiaResult<Value> {
        let ty = self.graph.ty(n);
        let width = ty.width();
        let v = match self.graph.kind(n) {
            NodeKind::Const(v) => *v,
            NodeKind::Field(f) => {
                return Err(Error::internal(format!(
                    "cannot evaluate unresolved field `{f}`"
                )));
            }
            NodeKind::WordSlice { slices, .. } => {
                Value::new(slice_word(self.word, slices), width)
            }
            NodeKind::BuiltIn { op, args } => {
                let args = args
                    .iter()
                    .map(|a| self.value(*a))
                    .collect::<MiaResult<Vec<_>>>()?;
                op.eval(&args, ty)
            }
            NodeKind::Select { cond, then, els } => {
                if self.value(*cond)?.is_true() {
                    self.value(*then)?
                } else {
                    self.value(*els)?
                }
            }
            NodeKind::Cast { op, arg } => op.eval(self.value(*arg)?, ty),
            NodeKind::Read {
                resource,
                address,
                condition,
            } => {
                if self.cond(*condition)? {
                    let addr = address.map(|a| self.value(a)).transpose()?;
                    Value::new(env.read(*resource, addr.map(|a| a.bits())), width)
                } else {
                    Value::new(0, width)
                }
            }
            NodeKind::IsInstruction(set) => {
                Value::bool(self.instr.is_some_and(|i| set.contains(&i)))
            }
            NodeKind::SelectByInstruction { arms, selection } => {
                let arm = match selection {
                    None => arms.iter().find(|a| {
                        self.instr.is_some_and(|i| a.instrs.contains(&i))
                    }),
                    Some(sel) => {
                        let sel = self.value(*sel)?.bits();
                        arms.iter()
                            .enumerate()
                            .find(|(k, _)| *k < 64 && sel >> k & 1 == 1)
                            .map(|(_, a)| a)
                    }
                };
                match arm {
                    Some(a) => self.value(a.value)?,
                    None => Value::new(0, width),
                }
            }
            NodeKind::OneHot(values) => {
                let mut bits = 0;
                for (k, v) in values.iter().enumerate() {
                    if k < 64 && self.value(*v)?.is_true() {
                        bits |= 1 << k;
                    }
                }
                Value::new(bits, width)
            }
            NodeKind::ReadStageOutput(o) => Value::new(env.stage_output(*o), width),
            NodeKind::ReadSignal(s) => Value::new(env.signal(*s), width),
            NodeKind::ReadReg(r) => Value::new(env.register(*r), width),
            NodeKind::MiaCall { .. }
            | NodeKind::Write { .. }
            | NodeKind::WriteStageOutput { .. }
            | NodeKind::WriteSignal { .. }
            | NodeKind::WriteReg { .. } => Value::new(0, 0),
        };
        Ok(v)
    }

    fn effect(&self, n: NodeId) -> MiaResult<Option<Effect>> {
        let (target, address, value, condition) = match self.graph.kind(n) {
            NodeKind::Write {
                resource,
                address,
                value,
                condition,
            } => (Target::Resource(*resource), *address, *value, *condition),
            NodeKind::WriteStageOutput {
                output,
                value,
                condition,
            } => (Target::Output(*output), None, *value, *condition),
            NodeKind::WriteSignal { signal, value } => {
                (Target::Signal(*signal), None, *value, None)
            }
            NodeKind::WriteReg {
                reg,
                value,
                condition,
            } => (Target::Reg(*reg), None, *value, *condition),
            _ => return Ok(None),
        };
        if !self.graph.ty(value).is_data() || !self.cond(condition)? {
            return Ok(None);
        }
        let address = address.map(|a| self.value(a)).transpose()?;
        Ok(Some(Effect {
            target,
            address: address.map(|a| a.bits()),
            value: self.value(value)?.bits(),
        }))
    }
}

/// Evaluate the side effects of `graph` accepted by `active`. Nodes of the
/// token types are not evaluated.
pub fn eval_graph<E, F>(
    graph: &Graph,
    instr: Option<InstrId>,
    word: u64,
    active: F,
    env: &mut E,
) -> MiaResult<Vec<Effect>>
where
    E: Env,
    F: Fn(NodeId) -> bool,
{
    let roots: Vec<_> = graph
        .side_effects()
        .into_iter()
        .filter(|n| active(*n))
        .collect();
    let needed: BTreeSet<_> = graph.closure(roots.iter().copied());
    let mut ev = Evaluator {
        graph,
        instr,
        word,
        values: BTreeMap::new(),
    };
    for n in graph.topo_order() {
        let token = matches!(graph.ty(n), Type::Instruction | Type::FetchResult);
        if token || !needed.contains(&n) {
            continue;
        }
        let v = ev.eval_node(n, env)?;
        ev.values.insert(n, v);
    }
    let mut effects = vec![];
    for n in roots {
        if let Some(e) = ev.effect(n)? {
            effects.push(e);
        }
    }
    effects.sort();
    Ok(effects)
}

/// Effects of executing instruction `instr` encoded as `word`.
pub fn eval_ipg<E: Env>(
    ipg: &Ipg,
    instr: InstrId,
    word: u64,
    env: &mut E,
) -> MiaResult<Vec<Effect>> {
    eval_graph(
        &ipg.graph,
        Some(instr),
        word,
        |n| ipg.instrs(n).contains(&instr),
        env,
    )
}

/// Cycle based simulation of a synthesized control unit.
pub struct ControlSim<'a> {
    control: &'a Control,
    regs: BTreeMap<RegId, u64>,
}

struct ControlEnv<'b> {
    hazards: BTreeMap<SignalId, bool>,
    regs: &'b BTreeMap<RegId, u64>,
}

impl Env for ControlEnv<'_> {
    fn read(&mut self, _resource: ResourceId, _address: Option<u64>) -> u64 {
        0
    }

    fn signal(&mut self, signal: SignalId) -> u64 {
        self.hazards.get(&signal).copied().unwrap_or(false) as u64
    }

    fn register(&mut self, reg: RegId) -> u64 {
        self.regs.get(&reg).copied().unwrap_or(0)
    }
}

impl<'a> ControlSim<'a> {
    /// Start from the reset state of the control registers.
    pub fn new(mia: &'a MicroArchitecture) -> MiaResult<Self> {
        let control = mia.control().ok_or_else(|| {
            Error::missing_structure("no control logic has been synthesized")
        })?;
        let regs = control
            .full
            .iter()
            .flatten()
            .map(|r| (*r, mia.registers[*r].init))
            .collect();
        Ok(Self { control, regs })
    }

    /// Whether stage `i` (in pipeline order) holds an instruction.
    pub fn full(&self, i: usize) -> bool {
        match self.control.full.get(i) {
            Some(Some(r)) => self.regs.get(r).is_some_and(|v| *v != 0),
            Some(None) => true,
            None => false,
        }
    }

    /// Evaluate one cycle with the given per-stage hazard inputs and return
    /// the stage enables. Registers are updated at the end of the cycle.
    pub fn step(&mut self, hazards: &[bool]) -> MiaResult<Vec<bool>> {
        let mut env = ControlEnv {
            hazards: self
                .control
                .hazards
                .iter()
                .zip(hazards.iter())
                .map(|(s, h)| (*s, *h))
                .collect(),
            regs: &self.regs,
        };
        let effects =
            eval_graph(&self.control.behavior, None, 0, |_| true, &mut env)?;
        let mut enables = vec![false; self.control.enables.len()];
        let mut updates = vec![];
        for e in effects {
            match e.target {
                Target::Signal(s) => {
                    if let Some(i) = self.control.enables.iter().position(|x| *x == s) {
                        enables[i] = e.value != 0;
                    }
                }
                Target::Reg(r) => updates.push((r, e.value)),
                _ => (),
            }
        }
        self.regs.extend(updates);
        Ok(enables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::node::{BitRange, BuiltIn};

    struct Regs(BTreeMap<u64, u64>);

    impl Env for Regs {
        fn read(&mut self, _resource: ResourceId, address: Option<u64>) -> u64 {
            address.and_then(|a| self.0.get(&a).copied()).unwrap_or(0)
        }
    }

    #[test]
    fn inactive_writes_have_no_effect() {
        let x = ResourceId::from(0);
        let mut g = Graph::new("t");
        let mut b = Builder::new(&mut g);
        let rs = b.graph.add_unique(
            NodeKind::WordSlice {
                slices: [BitRange::new(3, 0)].into_iter().collect(),
                fields: BTreeSet::new(),
            },
            Type::Bits(4),
        );
        let v = b.read(x, Some(rs), Type::Bits(8));
        let one = b.constant(1, Type::Bits(8));
        let sum = b.builtin(BuiltIn::Add, &[v, one]);
        let f = b.bool(false);
        b.write(x, Some(rs), sum, None);
        b.write(x, Some(rs), sum, Some(f));
        let mut env = Regs(BTreeMap::from([(2, 41)]));
        let effects = eval_graph(&g, None, 0x12, |_| true, &mut env).unwrap();
        assert_eq!(
            effects,
            vec![Effect {
                target: Target::Resource(x),
                address: Some(2),
                value: 42
            }]
        );
    }
}
