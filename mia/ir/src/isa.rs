//! Instruction set architecture: resources and instructions with their
//! behavior graphs.
use crate::graph::Graph;
use crate::mia::StageId;
use crate::node::{BitRange, NodeId};
use crate::{IndexRef, IndexedMap};
use mia_utils::{GetName, Id};
use smallvec::SmallVec;
use std::collections::BTreeSet;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u32);
crate::impl_index!(ResourceId, "@");

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(u32);
crate::impl_index!(InstrId, "i");

/// Set of instructions. Ordered so that iteration is deterministic.
pub type InstrSet = BTreeSet<InstrId>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ResourceKind {
    Register,
    RegisterFile,
    Memory,
}

/// An address of a resource that always holds the same value, like the zero
/// register of many RISC architectures.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Constraint {
    pub address: u64,
    pub value: u64,
}

/// Per-resource access facts computed by hazard analysis.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HazardAnalysis {
    pub reads: Vec<ReadAnalysis>,
    pub writes: Vec<WriteAnalysis>,
}

/// A read of a resource in the instruction progress graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadAnalysis {
    pub node: NodeId,
    /// Stage performing the read.
    pub stage: StageId,
    pub condition: Option<NodeId>,
    /// Stage computing the activation condition.
    pub condition_stage: StageId,
    /// Stage computing the address, for indexed resources.
    pub address_stage: Option<StageId>,
}

/// A write of a resource in the instruction progress graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteAnalysis {
    pub node: NodeId,
    /// Stage performing the write.
    pub stage: StageId,
    pub condition: Option<NodeId>,
    pub condition_stage: StageId,
    pub address_stage: Option<StageId>,
    /// Stage computing the written value.
    pub value_stage: StageId,
}

#[derive(Clone, Debug)]
pub struct Resource {
    pub name: Id,
    pub kind: ResourceKind,
    /// Address width for register files and memories.
    pub addr_width: Option<u32>,
    /// Width of a single element.
    pub width: u32,
    pub constraints: Vec<Constraint>,
    /// Attached by hazard analysis.
    pub hazards: Option<HazardAnalysis>,
}

impl Resource {
    pub fn new(name: impl Into<Id>, kind: ResourceKind, addr_width: Option<u32>, width: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            addr_width,
            width,
            constraints: vec![],
            hazards: None,
        }
    }

    pub fn with_constraint(mut self, address: u64, value: u64) -> Self {
        self.constraints.push(Constraint { address, value });
        self
    }

    pub fn is_indexed(&self) -> bool {
        self.addr_width.is_some()
    }
}

impl GetName for Resource {
    fn name(&self) -> Id {
        self.name
    }
}

/// A named field of an instruction format.
#[derive(Clone, Debug)]
pub struct Field {
    pub name: Id,
    /// Bit ranges of the instruction word, most significant first.
    pub slices: SmallVec<[BitRange; 2]>,
}

impl Field {
    pub fn new(name: impl Into<Id>, slices: &[BitRange]) -> Self {
        Self {
            name: name.into(),
            slices: slices.iter().copied().collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.slices.iter().map(BitRange::width).sum()
    }
}

#[derive(Clone, Debug)]
pub struct Instruction {
    pub name: Id,
    pub fields: Vec<Field>,
    pub behavior: Graph,
}

impl Instruction {
    pub fn new(name: impl Into<Id>, fields: Vec<Field>) -> Self {
        let name = name.into();
        Self {
            name,
            fields,
            behavior: Graph::new(name),
        }
    }

    pub fn field(&self, name: Id) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl GetName for Instruction {
    fn name(&self) -> Id {
        self.name
    }
}

#[derive(Clone, Debug)]
pub struct Isa {
    pub name: Id,
    /// Width of the instruction word.
    pub word_width: u32,
    pub resources: IndexedMap<ResourceId, Resource>,
    pub instructions: IndexedMap<InstrId, Instruction>,
    /// The program counter.
    pub pc: Option<ResourceId>,
}

impl Isa {
    pub fn new(name: impl Into<Id>, word_width: u32) -> Self {
        Self {
            name: name.into(),
            word_width,
            resources: IndexedMap::new(),
            instructions: IndexedMap::new(),
            pc: None,
        }
    }

    pub fn add_resource(&mut self, resource: Resource) -> ResourceId {
        self.resources.push(resource)
    }

    pub fn add_instruction(&mut self, instr: Instruction) -> InstrId {
        self.instructions.push(instr)
    }

    pub fn find_resource(&self, name: Id) -> Option<ResourceId> {
        self.resources.position(|r| r.name == name)
    }

    pub fn find_instruction(&self, name: Id) -> Option<InstrId> {
        self.instructions.position(|i| i.name == name)
    }

    pub fn all_instructions(&self) -> InstrSet {
        self.instructions.keys().collect()
    }

    pub fn resources_of_kind(
        &self,
        kind: ResourceKind,
    ) -> impl Iterator<Item = ResourceId> + '_ {
        self.resources
            .iter()
            .filter(move |(id, r)| r.kind == kind && Some(*id) != self.pc)
            .map(|(id, _)| id)
    }

    pub fn is_pc(&self, resource: ResourceId) -> bool {
        self.pc == Some(resource)
    }

    /// Names of the instructions in `set`, in set order.
    pub fn instruction_names(&self, set: &InstrSet) -> Vec<Id> {
        set.iter()
            .filter(|i| i.index() < self.instructions.len())
            .map(|i| self.instructions[*i].name)
            .collect()
    }
}
