//! Intermediate representation of the pipeline synthesis core.
//!
//! Everything is a behavior [Graph] of [NodeKind]s: instruction behaviors of
//! the [Isa], stage behaviors of the [MicroArchitecture], the instruction
//! progress graph ([Ipg]) shared by all instructions, and the synthesized
//! [Control] unit. The [Mapping] assigns IPG nodes to pipeline stages.

// Modules defining internal structures.
mod builder;
mod context;
mod graph;
mod idx;
mod ipg;
mod isa;
mod mapping;
mod mia;
mod node;
mod printer;
mod types;

/// Reference interpreter.
pub mod eval;

// Re-export types at the module level.
pub use builder::Builder;
pub use context::{Artifact, Context};
pub use graph::{Graph, Node};
pub use idx::{IndexRef, IndexedMap, SecondaryMap};
pub use ipg::{Ipg, NodeInfo};
pub use isa::{
    Constraint, Field, HazardAnalysis, InstrId, InstrSet, Instruction, Isa,
    ReadAnalysis, Resource, ResourceId, ResourceKind, WriteAnalysis,
};
pub use mapping::{CtxId, Mapping, NodeContext};
pub use mia::{
    Control, Logic, LogicId, MicroArchitecture, OutputId, RegId, Register,
    Signal, SignalId, Stage, StageId, StageOutput,
};
pub use mia_utils::{GetName, Id};
pub use node::{
    Arm, BitRange, BuiltIn, CastOp, Inputs, MiaBuiltIn, NodeId, NodeKind,
    slice_word,
};
pub use printer::Printer;
pub use types::{Type, Value};
