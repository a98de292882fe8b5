//! Node kinds of behavior graphs.
//!
//! Every graph of the synthesis IR (instruction behaviors, the instruction
//! progress graph, stage behaviors and the control unit) is built from the
//! closed set of [NodeKind]s defined here.
use crate::isa::{InstrId, InstrSet, ResourceId};
use crate::mia::{LogicId, OutputId, RegId, SignalId};
use crate::types::{Type, Value};
use mia_utils::{Id, math};
use smallvec::{SmallVec, smallvec};
use std::collections::BTreeSet;

/// Index of a node inside a [crate::Graph].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);
crate::impl_index!(NodeId, "%");

/// Input list of a node. Most nodes have at most four inputs.
pub type Inputs = SmallVec<[NodeId; 4]>;

/// Pure operations on bit vectors.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum BuiltIn {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Not,
    Neg,
    Shl,
    Lshr,
    Ashr,
    Eq,
    Neq,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
    Concat,
}

impl BuiltIn {
    const ALL: [BuiltIn; 26] = [
        BuiltIn::Add,
        BuiltIn::Sub,
        BuiltIn::Mul,
        BuiltIn::UDiv,
        BuiltIn::SDiv,
        BuiltIn::URem,
        BuiltIn::SRem,
        BuiltIn::And,
        BuiltIn::Or,
        BuiltIn::Xor,
        BuiltIn::Not,
        BuiltIn::Neg,
        BuiltIn::Shl,
        BuiltIn::Lshr,
        BuiltIn::Ashr,
        BuiltIn::Eq,
        BuiltIn::Neq,
        BuiltIn::Ult,
        BuiltIn::Ule,
        BuiltIn::Ugt,
        BuiltIn::Uge,
        BuiltIn::Slt,
        BuiltIn::Sle,
        BuiltIn::Sgt,
        BuiltIn::Sge,
        BuiltIn::Concat,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BuiltIn::Add => "add",
            BuiltIn::Sub => "sub",
            BuiltIn::Mul => "mul",
            BuiltIn::UDiv => "udiv",
            BuiltIn::SDiv => "sdiv",
            BuiltIn::URem => "urem",
            BuiltIn::SRem => "srem",
            BuiltIn::And => "and",
            BuiltIn::Or => "or",
            BuiltIn::Xor => "xor",
            BuiltIn::Not => "not",
            BuiltIn::Neg => "neg",
            BuiltIn::Shl => "shl",
            BuiltIn::Lshr => "lshr",
            BuiltIn::Ashr => "ashr",
            BuiltIn::Eq => "eq",
            BuiltIn::Neq => "neq",
            BuiltIn::Ult => "ult",
            BuiltIn::Ule => "ule",
            BuiltIn::Ugt => "ugt",
            BuiltIn::Uge => "uge",
            BuiltIn::Slt => "slt",
            BuiltIn::Sle => "sle",
            BuiltIn::Sgt => "sgt",
            BuiltIn::Sge => "sge",
            BuiltIn::Concat => "concat",
        }
    }

    pub fn from_name(name: &str) -> Option<BuiltIn> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn arity(&self) -> usize {
        match self {
            BuiltIn::Not | BuiltIn::Neg => 1,
            _ => 2,
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BuiltIn::Eq
                | BuiltIn::Neq
                | BuiltIn::Ult
                | BuiltIn::Ule
                | BuiltIn::Ugt
                | BuiltIn::Uge
                | BuiltIn::Slt
                | BuiltIn::Sle
                | BuiltIn::Sgt
                | BuiltIn::Sge
        )
    }

    /// Type of the result given the argument types.
    pub fn result_type(&self, args: &[Type]) -> Type {
        if self.is_comparison() {
            return Type::Bool;
        }
        match (self, args) {
            (BuiltIn::Concat, [a, b]) => Type::Bits(a.width() + b.width()),
            (_, [first, ..]) => *first,
            (_, []) => Type::Bool,
        }
    }

    /// Evaluate the operation on constant arguments.
    pub fn eval(&self, args: &[Value], ty: Type) -> Value {
        let width = ty.width();
        let a = args.first().copied().unwrap_or(Value::bool(false));
        let b = args.get(1).copied().unwrap_or(Value::bool(false));
        let aw = a.width();
        let bits = match self {
            BuiltIn::Add => a.bits().wrapping_add(b.bits()),
            BuiltIn::Sub => a.bits().wrapping_sub(b.bits()),
            BuiltIn::Mul => a.bits().wrapping_mul(b.bits()),
            BuiltIn::UDiv => a.bits().checked_div(b.bits()).unwrap_or(u64::MAX),
            BuiltIn::URem => a.bits().checked_rem(b.bits()).unwrap_or(a.bits()),
            BuiltIn::SDiv => {
                match a.signed().checked_div(b.signed()) {
                    Some(q) => q as u64,
                    // division by zero yields all ones, overflow the dividend
                    None if b.is_zero() => u64::MAX,
                    None => a.bits(),
                }
            }
            BuiltIn::SRem => match a.signed().checked_rem(b.signed()) {
                Some(r) => r as u64,
                None if b.is_zero() => a.bits(),
                None => 0,
            },
            BuiltIn::And => a.bits() & b.bits(),
            BuiltIn::Or => a.bits() | b.bits(),
            BuiltIn::Xor => a.bits() ^ b.bits(),
            BuiltIn::Not => !a.bits(),
            BuiltIn::Neg => a.bits().wrapping_neg(),
            BuiltIn::Shl => {
                if b.bits() >= aw as u64 {
                    0
                } else {
                    a.bits() << b.bits()
                }
            }
            BuiltIn::Lshr => {
                if b.bits() >= aw as u64 {
                    0
                } else {
                    a.bits() >> b.bits()
                }
            }
            BuiltIn::Ashr => {
                // shifting by the width or more fills with the sign bit
                let amount = b.bits().min(aw.saturating_sub(1) as u64) as u32;
                (a.signed() >> amount) as u64
            }
            BuiltIn::Eq => (a.bits() == b.bits()) as u64,
            BuiltIn::Neq => (a.bits() != b.bits()) as u64,
            BuiltIn::Ult => (a.bits() < b.bits()) as u64,
            BuiltIn::Ule => (a.bits() <= b.bits()) as u64,
            BuiltIn::Ugt => (a.bits() > b.bits()) as u64,
            BuiltIn::Uge => (a.bits() >= b.bits()) as u64,
            BuiltIn::Slt => (a.signed() < b.signed()) as u64,
            BuiltIn::Sle => (a.signed() <= b.signed()) as u64,
            BuiltIn::Sgt => (a.signed() > b.signed()) as u64,
            BuiltIn::Sge => (a.signed() >= b.signed()) as u64,
            BuiltIn::Concat => {
                if b.width() >= 64 {
                    b.bits()
                } else {
                    (a.bits() << b.width()) | b.bits()
                }
            }
        };
        Value::new(bits & math::mask(width), width)
    }
}

/// Width changing conversions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum CastOp {
    Trunc,
    ZeroExt,
    SignExt,
}

impl CastOp {
    pub fn name(&self) -> &'static str {
        match self {
            CastOp::Trunc => "trunc",
            CastOp::ZeroExt => "zext",
            CastOp::SignExt => "sext",
        }
    }

    pub fn eval(&self, arg: Value, ty: Type) -> Value {
        match self {
            CastOp::Trunc | CastOp::ZeroExt => Value::new(arg.bits(), ty.width()),
            CastOp::SignExt => Value::new(arg.signed() as u64, ty.width()),
        }
    }
}

/// Operations of a microarchitecture stage on instruction progress tokens.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum MiaBuiltIn {
    FetchNext,
    Decode,
    Address,
    Read,
    ReadOrForward,
    Compute,
    Verify,
    Write,
    Results,
}

impl MiaBuiltIn {
    const ALL: [MiaBuiltIn; 9] = [
        MiaBuiltIn::FetchNext,
        MiaBuiltIn::Decode,
        MiaBuiltIn::Address,
        MiaBuiltIn::Read,
        MiaBuiltIn::ReadOrForward,
        MiaBuiltIn::Compute,
        MiaBuiltIn::Verify,
        MiaBuiltIn::Write,
        MiaBuiltIn::Results,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MiaBuiltIn::FetchNext => "fetch_next",
            MiaBuiltIn::Decode => "decode",
            MiaBuiltIn::Address => "address",
            MiaBuiltIn::Read => "read",
            MiaBuiltIn::ReadOrForward => "read_or_forward",
            MiaBuiltIn::Compute => "compute",
            MiaBuiltIn::Verify => "verify",
            MiaBuiltIn::Write => "write",
            MiaBuiltIn::Results => "results",
        }
    }

    pub fn from_name(name: &str) -> Option<MiaBuiltIn> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    /// Result type of the call.
    pub fn result_type(&self) -> Type {
        match self {
            MiaBuiltIn::FetchNext => Type::FetchResult,
            _ => Type::Instruction,
        }
    }

    /// Builtins that select IPG nodes of a specific resource.
    pub fn needs_resource(&self) -> bool {
        matches!(
            self,
            MiaBuiltIn::Address
                | MiaBuiltIn::Read
                | MiaBuiltIn::ReadOrForward
                | MiaBuiltIn::Write
                | MiaBuiltIn::Results
        )
    }
}

/// Inclusive range of bits of the instruction word.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct BitRange {
    pub hi: u32,
    pub lo: u32,
}

impl BitRange {
    pub fn new(hi: u32, lo: u32) -> Self {
        Self { hi, lo }
    }

    pub fn width(&self) -> u32 {
        self.hi - self.lo + 1
    }
}

impl std::fmt::Display for BitRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.hi == self.lo {
            write!(f, "{}", self.hi)
        } else {
            write!(f, "{}..{}", self.hi, self.lo)
        }
    }
}

/// Extract (and concatenate, most significant first) the bit ranges of an
/// instruction word.
pub fn slice_word(word: u64, slices: &[BitRange]) -> u64 {
    slices.iter().fold(0, |acc, r| {
        let part = (word >> r.lo) & math::mask(r.width());
        (acc << r.width()) | part
    })
}

/// One case of a select-by-instruction node.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Arm {
    pub instrs: InstrSet,
    pub value: NodeId,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum NodeKind {
    /// Constant value.
    Const(Value),
    /// Format field of the instruction. Only in instruction behaviors.
    Field(Id),
    /// Slice of the instruction word, shared by all fields covering it.
    WordSlice {
        slices: SmallVec<[BitRange; 2]>,
        fields: BTreeSet<Id>,
    },
    BuiltIn {
        op: BuiltIn,
        args: SmallVec<[NodeId; 2]>,
    },
    Select {
        cond: NodeId,
        then: NodeId,
        els: NodeId,
    },
    Cast {
        op: CastOp,
        arg: NodeId,
    },
    /// Read of a resource. A read with a condition is a conditional read.
    Read {
        resource: ResourceId,
        address: Option<NodeId>,
        condition: Option<NodeId>,
    },
    /// True iff the instruction in flight is one of the set.
    IsInstruction(InstrSet),
    /// Select a value depending on the instruction in flight. Before
    /// lowering the selection is implicit.
    SelectByInstruction {
        arms: Vec<Arm>,
        selection: Option<NodeId>,
    },
    /// One-hot vector of the given boolean values.
    OneHot(SmallVec<[NodeId; 4]>),
    /// Operation of a microarchitecture stage.
    MiaCall {
        op: MiaBuiltIn,
        args: SmallVec<[NodeId; 1]>,
        resources: SmallVec<[ResourceId; 1]>,
        logic: Option<LogicId>,
    },
    ReadStageOutput(OutputId),
    ReadSignal(SignalId),
    ReadReg(RegId),
    Write {
        resource: ResourceId,
        address: Option<NodeId>,
        value: NodeId,
        condition: Option<NodeId>,
    },
    WriteStageOutput {
        output: OutputId,
        value: NodeId,
        condition: Option<NodeId>,
    },
    WriteSignal {
        signal: SignalId,
        value: NodeId,
    },
    WriteReg {
        reg: RegId,
        value: NodeId,
        condition: Option<NodeId>,
    },
}

impl NodeKind {
    /// Inputs of the node in slot order.
    pub fn inputs(&self) -> Inputs {
        match self {
            NodeKind::Const(_)
            | NodeKind::Field(_)
            | NodeKind::WordSlice { .. }
            | NodeKind::IsInstruction(_)
            | NodeKind::ReadStageOutput(_)
            | NodeKind::ReadSignal(_)
            | NodeKind::ReadReg(_) => smallvec![],
            NodeKind::BuiltIn { args, .. } => args.iter().copied().collect(),
            NodeKind::Select { cond, then, els } => smallvec![*cond, *then, *els],
            NodeKind::Cast { arg, .. } => smallvec![*arg],
            NodeKind::Read {
                address, condition, ..
            } => address.iter().chain(condition.iter()).copied().collect(),
            NodeKind::SelectByInstruction { arms, selection } => arms
                .iter()
                .map(|a| a.value)
                .chain(selection.iter().copied())
                .collect(),
            NodeKind::OneHot(values) => values.iter().copied().collect(),
            NodeKind::MiaCall { args, .. } => args.iter().copied().collect(),
            NodeKind::Write {
                address,
                value,
                condition,
                ..
            } => address
                .iter()
                .chain(std::iter::once(value))
                .chain(condition.iter())
                .copied()
                .collect(),
            NodeKind::WriteStageOutput {
                value, condition, ..
            }
            | NodeKind::WriteReg {
                value, condition, ..
            } => std::iter::once(*value).chain(condition.iter().copied()).collect(),
            NodeKind::WriteSignal { value, .. } => smallvec![*value],
        }
    }

    /// Rewrite every input slot with `f`.
    pub fn map_inputs<F>(&mut self, mut f: F)
    where
        F: FnMut(NodeId) -> NodeId,
    {
        fn opt<F: FnMut(NodeId) -> NodeId>(n: &mut Option<NodeId>, f: &mut F) {
            if let Some(n) = n {
                *n = f(*n);
            }
        }
        match self {
            NodeKind::Const(_)
            | NodeKind::Field(_)
            | NodeKind::WordSlice { .. }
            | NodeKind::IsInstruction(_)
            | NodeKind::ReadStageOutput(_)
            | NodeKind::ReadSignal(_)
            | NodeKind::ReadReg(_) => (),
            NodeKind::BuiltIn { args, .. } => {
                args.iter_mut().for_each(|a| *a = f(*a))
            }
            NodeKind::Select { cond, then, els } => {
                *cond = f(*cond);
                *then = f(*then);
                *els = f(*els);
            }
            NodeKind::Cast { arg, .. } => *arg = f(*arg),
            NodeKind::Read {
                address, condition, ..
            } => {
                opt(address, &mut f);
                opt(condition, &mut f);
            }
            NodeKind::SelectByInstruction { arms, selection } => {
                for arm in arms.iter_mut() {
                    arm.value = f(arm.value);
                }
                opt(selection, &mut f);
            }
            NodeKind::OneHot(values) => {
                values.iter_mut().for_each(|v| *v = f(*v))
            }
            NodeKind::MiaCall { args, .. } => {
                args.iter_mut().for_each(|a| *a = f(*a))
            }
            NodeKind::Write {
                address,
                value,
                condition,
                ..
            } => {
                opt(address, &mut f);
                *value = f(*value);
                opt(condition, &mut f);
            }
            NodeKind::WriteStageOutput {
                value, condition, ..
            }
            | NodeKind::WriteReg {
                value, condition, ..
            } => {
                *value = f(*value);
                opt(condition, &mut f);
            }
            NodeKind::WriteSignal { value, .. } => *value = f(*value),
        }
    }

    /// Nodes with an effect on architectural or pipeline state.
    pub fn is_side_effect(&self) -> bool {
        matches!(
            self,
            NodeKind::Write { .. }
                | NodeKind::WriteStageOutput { .. }
                | NodeKind::WriteSignal { .. }
                | NodeKind::WriteReg { .. }
        )
    }

    /// Pure expressions that are deduplicated when added to a graph.
    pub fn is_unique(&self) -> bool {
        matches!(
            self,
            NodeKind::Const(_)
                | NodeKind::Field(_)
                | NodeKind::WordSlice { .. }
                | NodeKind::BuiltIn { .. }
                | NodeKind::Select { .. }
                | NodeKind::Cast { .. }
                | NodeKind::IsInstruction(_)
                | NodeKind::OneHot(_)
                | NodeKind::ReadSignal(_)
                | NodeKind::ReadReg(_)
        )
    }

    /// Pure data-path expressions that may be relocated between stages.
    pub fn is_movable(&self) -> bool {
        matches!(
            self,
            NodeKind::BuiltIn { .. }
                | NodeKind::Select { .. }
                | NodeKind::Cast { .. }
                | NodeKind::SelectByInstruction { .. }
        )
    }

    pub fn is_const(&self) -> bool {
        matches!(self, NodeKind::Const(_))
    }

    pub fn as_const(&self) -> Option<Value> {
        match self {
            NodeKind::Const(v) => Some(*v),
            _ => None,
        }
    }

    /// Resource accessed by a read or write.
    pub fn resource(&self) -> Option<ResourceId> {
        match self {
            NodeKind::Read { resource, .. } | NodeKind::Write { resource, .. } => {
                Some(*resource)
            }
            _ => None,
        }
    }

    pub fn is_resource_access(&self) -> bool {
        self.resource().is_some()
    }

    /// Activation condition of side effects and conditional reads.
    pub fn condition(&self) -> Option<NodeId> {
        match self {
            NodeKind::Read { condition, .. }
            | NodeKind::Write { condition, .. }
            | NodeKind::WriteStageOutput { condition, .. }
            | NodeKind::WriteReg { condition, .. } => *condition,
            _ => None,
        }
    }

    /// Whether the node kind carries an activation condition slot.
    pub fn has_condition_slot(&self) -> bool {
        matches!(
            self,
            NodeKind::Read { .. }
                | NodeKind::Write { .. }
                | NodeKind::WriteStageOutput { .. }
                | NodeKind::WriteReg { .. }
        )
    }

    pub fn address(&self) -> Option<NodeId> {
        match self {
            NodeKind::Read { address, .. } | NodeKind::Write { address, .. } => {
                *address
            }
            _ => None,
        }
    }

    /// Compare the non-input data of two nodes. Word slices compare by
    /// their bit slices only.
    pub fn data_eq(&self, other: &NodeKind) -> bool {
        match (self, other) {
            (NodeKind::Const(a), NodeKind::Const(b)) => a == b,
            (NodeKind::Field(a), NodeKind::Field(b)) => a == b,
            (
                NodeKind::WordSlice { slices: a, .. },
                NodeKind::WordSlice { slices: b, .. },
            ) => a == b,
            (
                NodeKind::BuiltIn { op: a, args: x },
                NodeKind::BuiltIn { op: b, args: y },
            ) => a == b && x.len() == y.len(),
            (NodeKind::Select { .. }, NodeKind::Select { .. }) => true,
            (NodeKind::Cast { op: a, .. }, NodeKind::Cast { op: b, .. }) => {
                a == b
            }
            (
                NodeKind::Read {
                    resource: a,
                    address: x,
                    condition: c,
                },
                NodeKind::Read {
                    resource: b,
                    address: y,
                    condition: d,
                },
            ) => a == b && x.is_some() == y.is_some() && c.is_some() == d.is_some(),
            (NodeKind::IsInstruction(a), NodeKind::IsInstruction(b)) => a == b,
            (
                NodeKind::SelectByInstruction {
                    arms: a,
                    selection: x,
                },
                NodeKind::SelectByInstruction {
                    arms: b,
                    selection: y,
                },
            ) => {
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(a, b)| a.instrs == b.instrs)
                    && x.is_some() == y.is_some()
            }
            (NodeKind::OneHot(a), NodeKind::OneHot(b)) => a.len() == b.len(),
            (
                NodeKind::MiaCall {
                    op: a,
                    resources: x,
                    logic: l,
                    ..
                },
                NodeKind::MiaCall {
                    op: b,
                    resources: y,
                    logic: m,
                    ..
                },
            ) => a == b && x == y && l == m,
            (NodeKind::ReadStageOutput(a), NodeKind::ReadStageOutput(b)) => {
                a == b
            }
            (NodeKind::ReadSignal(a), NodeKind::ReadSignal(b)) => a == b,
            (NodeKind::ReadReg(a), NodeKind::ReadReg(b)) => a == b,
            (
                NodeKind::Write {
                    resource: a,
                    address: x,
                    condition: c,
                    ..
                },
                NodeKind::Write {
                    resource: b,
                    address: y,
                    condition: d,
                    ..
                },
            ) => a == b && x.is_some() == y.is_some() && c.is_some() == d.is_some(),
            (
                NodeKind::WriteStageOutput {
                    output: a,
                    condition: c,
                    ..
                },
                NodeKind::WriteStageOutput {
                    output: b,
                    condition: d,
                    ..
                },
            ) => a == b && c.is_some() == d.is_some(),
            (
                NodeKind::WriteSignal { signal: a, .. },
                NodeKind::WriteSignal { signal: b, .. },
            ) => a == b,
            (
                NodeKind::WriteReg {
                    reg: a,
                    condition: c,
                    ..
                },
                NodeKind::WriteReg {
                    reg: b,
                    condition: d,
                    ..
                },
            ) => a == b && c.is_some() == d.is_some(),
            _ => false,
        }
    }

    /// Short mnemonic used by the printer.
    pub fn mnemonic(&self) -> String {
        match self {
            NodeKind::Const(v) => format!("const {v}"),
            NodeKind::Field(f) => format!("field {f}"),
            NodeKind::WordSlice { slices, .. } => {
                let s: Vec<_> = slices.iter().map(|s| s.to_string()).collect();
                format!("word[{}]", s.join(","))
            }
            NodeKind::BuiltIn { op, .. } => op.name().to_string(),
            NodeKind::Select { .. } => "select".to_string(),
            NodeKind::Cast { op, .. } => op.name().to_string(),
            NodeKind::Read { resource, .. } => format!("read {resource}"),
            NodeKind::IsInstruction(set) => format!("is_instr {}", fmt_set(set)),
            NodeKind::SelectByInstruction { arms, .. } => {
                let s: Vec<_> = arms.iter().map(|a| fmt_set(&a.instrs)).collect();
                format!("select_by_instr [{}]", s.join(" "))
            }
            NodeKind::OneHot(_) => "one_hot".to_string(),
            NodeKind::MiaCall { op, resources, .. } => {
                let r: Vec<_> = resources.iter().map(|r| r.to_string()).collect();
                if r.is_empty() {
                    op.name().to_string()
                } else {
                    format!("{} {}", op.name(), r.join(","))
                }
            }
            NodeKind::ReadStageOutput(o) => format!("read_output {o}"),
            NodeKind::ReadSignal(s) => format!("read_signal {s}"),
            NodeKind::ReadReg(r) => format!("read_reg {r}"),
            NodeKind::Write { resource, .. } => format!("write {resource}"),
            NodeKind::WriteStageOutput { output, .. } => {
                format!("write_output {output}")
            }
            NodeKind::WriteSignal { signal, .. } => format!("write_signal {signal}"),
            NodeKind::WriteReg { reg, .. } => format!("write_reg {reg}"),
        }
    }
}

fn fmt_set(set: &InstrSet) -> String {
    let s: Vec<_> = set.iter().map(InstrId::to_string).collect();
    format!("{{{}}}", s.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(bits: u64, w: u32) -> Value {
        Value::new(bits, w)
    }

    #[test]
    fn arithmetic_wraps() {
        let ty = Type::Bits(8);
        assert_eq!(BuiltIn::Add.eval(&[v(250, 8), v(10, 8)], ty).bits(), 4);
        assert_eq!(BuiltIn::Sub.eval(&[v(1, 8), v(2, 8)], ty).bits(), 0xff);
        assert_eq!(BuiltIn::Neg.eval(&[v(1, 8)], ty).bits(), 0xff);
    }

    #[test]
    fn division_by_zero() {
        let ty = Type::Bits(8);
        assert_eq!(BuiltIn::UDiv.eval(&[v(7, 8), v(0, 8)], ty).bits(), 0xff);
        assert_eq!(BuiltIn::URem.eval(&[v(7, 8), v(0, 8)], ty).bits(), 7);
        assert_eq!(BuiltIn::SDiv.eval(&[v(0xfe, 8), v(1, 8)], ty).bits(), 0xfe);
    }

    #[test]
    fn comparisons_are_bool() {
        let r = BuiltIn::Slt.eval(&[v(0xff, 8), v(1, 8)], Type::Bool);
        assert!(r.is_true());
        assert_eq!(BuiltIn::Ult.result_type(&[Type::Bits(8), Type::Bits(8)]), Type::Bool);
    }

    #[test]
    fn concat_and_slices() {
        let r = BuiltIn::Concat.eval(&[v(0b10, 2), v(0b01, 2)], Type::Bits(4));
        assert_eq!(r.bits(), 0b1001);
        let word = 0b1011_0110;
        assert_eq!(slice_word(word, &[BitRange::new(7, 4)]), 0b1011);
        assert_eq!(
            slice_word(word, &[BitRange::new(1, 0), BitRange::new(7, 6)]),
            0b1010
        );
    }

    #[test]
    fn casts() {
        let x = v(0x80, 8);
        assert_eq!(CastOp::SignExt.eval(x, Type::Bits(16)).bits(), 0xff80);
        assert_eq!(CastOp::ZeroExt.eval(x, Type::Bits(16)).bits(), 0x80);
        assert_eq!(CastOp::Trunc.eval(x, Type::Bits(4)).bits(), 0);
    }

    #[test]
    fn input_slots_round_trip() {
        let mut kind = NodeKind::Write {
            resource: ResourceId::from(0),
            address: Some(NodeId::from(1)),
            value: NodeId::from(2),
            condition: Some(NodeId::from(3)),
        };
        assert_eq!(
            kind.inputs().as_slice(),
            &[NodeId::from(1), NodeId::from(2), NodeId::from(3)]
        );
        kind.map_inputs(|n| NodeId::from(n.0 + 10));
        assert_eq!(kind.condition(), Some(NodeId::from(13)));
        assert_eq!(kind.address(), Some(NodeId::from(11)));
    }
}
