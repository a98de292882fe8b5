//! Microarchitecture: pipeline stages, the latches between them and the
//! logic units attached to the pipeline.
use crate::graph::Graph;
use crate::node::{MiaBuiltIn, NodeId, NodeKind};
use crate::types::Type;
use crate::{IndexRef, IndexedMap};
use mia_utils::{GetName, Id};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(u32);
crate::impl_index!(StageId, "stage");

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(u32);
crate::impl_index!(OutputId, "out");

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(u32);
crate::impl_index!(SignalId, "sig");

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegId(u32);
crate::impl_index!(RegId, "reg");

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicId(u32);
crate::impl_index!(LogicId, "logic");

/// A typed latch written by one stage and read by the next.
#[derive(Clone, Debug)]
pub struct StageOutput {
    pub name: Id,
    pub ty: Type,
    pub stage: StageId,
}

#[derive(Clone, Debug)]
pub struct Stage {
    pub name: Id,
    pub behavior: Graph,
    pub outputs: Vec<OutputId>,
    pub prev: Option<StageId>,
    pub next: Option<StageId>,
}

impl Stage {
    pub fn new(name: impl Into<Id>) -> Self {
        let name = name.into();
        Self {
            name,
            behavior: Graph::new(name),
            outputs: vec![],
            prev: None,
            next: None,
        }
    }

    /// Stage outputs read by this stage's behavior.
    pub fn inputs(&self) -> Vec<OutputId> {
        let mut inputs: Vec<_> = self
            .behavior
            .nodes()
            .filter_map(|n| match self.behavior.kind(n) {
                NodeKind::ReadStageOutput(o) => Some(*o),
                _ => None,
            })
            .collect();
        inputs.sort();
        inputs.dedup();
        inputs
    }

    /// The stage behavior node calling `op`, if any.
    pub fn find_call(&self, op: MiaBuiltIn) -> Option<NodeId> {
        self.behavior.nodes().find(|n| {
            matches!(self.behavior.kind(*n), NodeKind::MiaCall { op: o, .. } if *o == op)
        })
    }
}

impl GetName for Stage {
    fn name(&self) -> Id {
        self.name
    }
}

#[derive(Clone, Debug)]
pub struct Signal {
    pub name: Id,
    pub ty: Type,
}

#[derive(Clone, Debug)]
pub struct Register {
    pub name: Id,
    pub ty: Type,
    /// Value after reset.
    pub init: u64,
}

/// The synthesized pipeline control unit.
#[derive(Clone, Debug)]
pub struct Control {
    pub name: Id,
    /// Enable signal of every stage, in pipeline order.
    pub enables: Vec<SignalId>,
    /// Hazard inputs of every stage, in pipeline order. Empty when hazard
    /// detection is a constant.
    pub hazards: Vec<SignalId>,
    /// `full` register of every stage. The entry stage has none.
    pub full: Vec<Option<RegId>>,
    pub behavior: Graph,
}

#[derive(Clone, Debug)]
pub enum Logic {
    /// Declared forwarding logic.
    Forwarding { name: Id },
    /// Declared branch prediction logic.
    BranchPrediction { name: Id },
    Control(Control),
}

impl GetName for Logic {
    fn name(&self) -> Id {
        match self {
            Logic::Forwarding { name } | Logic::BranchPrediction { name } => *name,
            Logic::Control(c) => c.name,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MicroArchitecture {
    pub name: Id,
    pub stages: IndexedMap<StageId, Stage>,
    pub outputs: IndexedMap<OutputId, StageOutput>,
    pub signals: IndexedMap<SignalId, Signal>,
    pub registers: IndexedMap<RegId, Register>,
    pub logic: IndexedMap<LogicId, Logic>,
    /// Linear stage order. Empty until stage ordering ran.
    pub order: Vec<StageId>,
}

impl MicroArchitecture {
    pub fn new(name: impl Into<Id>) -> Self {
        Self {
            name: name.into(),
            stages: IndexedMap::new(),
            outputs: IndexedMap::new(),
            signals: IndexedMap::new(),
            registers: IndexedMap::new(),
            logic: IndexedMap::new(),
            order: vec![],
        }
    }

    pub fn add_stage(&mut self, stage: Stage) -> StageId {
        self.stages.push(stage)
    }

    /// Declare a new output of `stage`.
    pub fn add_output(
        &mut self,
        stage: StageId,
        name: impl Into<Id>,
        ty: Type,
    ) -> OutputId {
        let out = self.outputs.push(StageOutput {
            name: name.into(),
            ty,
            stage,
        });
        self.stages[stage].outputs.push(out);
        out
    }

    pub fn add_signal(&mut self, name: impl Into<Id>, ty: Type) -> SignalId {
        self.signals.push(Signal {
            name: name.into(),
            ty,
        })
    }

    pub fn add_register(
        &mut self,
        name: impl Into<Id>,
        ty: Type,
        init: u64,
    ) -> RegId {
        self.registers.push(Register {
            name: name.into(),
            ty,
            init,
        })
    }

    pub fn find_stage(&self, name: Id) -> Option<StageId> {
        self.stages.position(|s| s.name == name)
    }

    pub fn find_output(&self, name: Id) -> Option<OutputId> {
        self.outputs.position(|o| o.name == name)
    }

    pub fn find_logic(&self, name: Id) -> Option<LogicId> {
        self.logic.position(|l| l.name() == name)
    }

    /// Position of `stage` in the pipeline order.
    pub fn rank(&self, stage: StageId) -> usize {
        self.order
            .iter()
            .position(|s| *s == stage)
            .unwrap_or(stage.index())
    }

    /// Stages in pipeline order, or declaration order before ordering ran.
    pub fn ordered(&self) -> Vec<StageId> {
        if self.order.is_empty() {
            self.stages.keys().collect()
        } else {
            self.order.clone()
        }
    }

    pub fn entry(&self) -> Option<StageId> {
        self.order.first().copied()
    }

    /// The synthesized control unit, if control logic synthesis ran.
    pub fn control(&self) -> Option<&Control> {
        self.logic.values().find_map(|l| match l {
            Logic::Control(c) => Some(c),
            _ => None,
        })
    }
}
