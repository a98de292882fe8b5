//! IR Builder. Provides convenience methods to construct behavior graphs.
use crate::graph::Graph;
use crate::isa::ResourceId;
use crate::mia::{LogicId, OutputId, RegId, SignalId};
use crate::node::{BuiltIn, CastOp, MiaBuiltIn, NodeId, NodeKind};
use crate::types::{Type, Value};
use mia_utils::SourceLoc;
use smallvec::SmallVec;

/// Builds nodes into a graph. Pure expressions are deduplicated, side
/// effects always create a new node.
pub struct Builder<'a> {
    pub graph: &'a mut Graph,
    loc: Option<SourceLoc>,
}

impl<'a> Builder<'a> {
    pub fn new(graph: &'a mut Graph) -> Self {
        Self { graph, loc: None }
    }

    /// Attach `loc` to the nodes added from now on.
    pub fn at(&mut self, loc: Option<SourceLoc>) -> &mut Self {
        self.loc = loc;
        self
    }

    fn add(&mut self, kind: NodeKind, ty: Type) -> NodeId {
        if kind.is_unique() {
            self.graph.add_unique(kind, ty)
        } else {
            self.graph.add_at(kind, ty, self.loc)
        }
    }

    pub fn constant(&mut self, bits: u64, ty: Type) -> NodeId {
        self.graph.constant(Value::new(bits, ty.width()), ty)
    }

    pub fn bool(&mut self, b: bool) -> NodeId {
        self.graph.bool_const(b)
    }

    pub fn field(&mut self, name: &str, width: u32) -> NodeId {
        self.add(NodeKind::Field(name.into()), Type::Bits(width))
    }

    /// Apply `op`. The result type follows from the argument types.
    pub fn builtin(&mut self, op: BuiltIn, args: &[NodeId]) -> NodeId {
        let tys: Vec<_> = args.iter().map(|a| self.graph.ty(*a)).collect();
        let ty = op.result_type(&tys);
        self.builtin_typed(op, args, ty)
    }

    pub fn builtin_typed(&mut self, op: BuiltIn, args: &[NodeId], ty: Type) -> NodeId {
        self.add(
            NodeKind::BuiltIn {
                op,
                args: args.iter().copied().collect(),
            },
            ty,
        )
    }

    pub fn select(&mut self, cond: NodeId, then: NodeId, els: NodeId) -> NodeId {
        let ty = self.graph.ty(then);
        self.add(NodeKind::Select { cond, then, els }, ty)
    }

    pub fn cast(&mut self, op: CastOp, arg: NodeId, ty: Type) -> NodeId {
        self.add(NodeKind::Cast { op, arg }, ty)
    }

    pub fn read(
        &mut self,
        resource: ResourceId,
        address: Option<NodeId>,
        ty: Type,
    ) -> NodeId {
        self.add(
            NodeKind::Read {
                resource,
                address,
                condition: None,
            },
            ty,
        )
    }

    pub fn write(
        &mut self,
        resource: ResourceId,
        address: Option<NodeId>,
        value: NodeId,
        condition: Option<NodeId>,
    ) -> NodeId {
        self.add(
            NodeKind::Write {
                resource,
                address,
                value,
                condition,
            },
            Type::Void,
        )
    }

    pub fn mia_call(
        &mut self,
        op: MiaBuiltIn,
        args: &[NodeId],
        resources: &[ResourceId],
        logic: Option<LogicId>,
    ) -> NodeId {
        self.add(
            NodeKind::MiaCall {
                op,
                args: args.iter().copied().collect(),
                resources: resources.iter().copied().collect::<SmallVec<_>>(),
                logic,
            },
            op.result_type(),
        )
    }

    pub fn read_output(&mut self, output: OutputId, ty: Type) -> NodeId {
        self.add(NodeKind::ReadStageOutput(output), ty)
    }

    pub fn write_output(
        &mut self,
        output: OutputId,
        value: NodeId,
        condition: Option<NodeId>,
    ) -> NodeId {
        self.add(
            NodeKind::WriteStageOutput {
                output,
                value,
                condition,
            },
            Type::Void,
        )
    }

    pub fn read_signal(&mut self, signal: SignalId, ty: Type) -> NodeId {
        self.add(NodeKind::ReadSignal(signal), ty)
    }

    pub fn write_signal(&mut self, signal: SignalId, value: NodeId) -> NodeId {
        self.add(NodeKind::WriteSignal { signal, value }, Type::Void)
    }

    pub fn read_reg(&mut self, reg: RegId, ty: Type) -> NodeId {
        self.add(NodeKind::ReadReg(reg), ty)
    }

    pub fn write_reg(
        &mut self,
        reg: RegId,
        value: NodeId,
        condition: Option<NodeId>,
    ) -> NodeId {
        self.add(
            NodeKind::WriteReg {
                reg,
                value,
                condition,
            },
            Type::Void,
        )
    }

    pub fn and(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.builtin(BuiltIn::And, &[a, b])
    }

    pub fn or(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.builtin(BuiltIn::Or, &[a, b])
    }

    pub fn not(&mut self, a: NodeId) -> NodeId {
        self.builtin(BuiltIn::Not, &[a])
    }

    /// AND of `a` and an optional condition.
    pub fn and_opt(&mut self, a: NodeId, cond: Option<NodeId>) -> NodeId {
        match cond {
            Some(c) => self.and(a, c),
            None => a,
        }
    }

    /// OR of all `values`, `false` if there are none.
    pub fn or_all<I>(&mut self, values: I) -> NodeId
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mut values = values.into_iter();
        match values.next() {
            None => self.bool(false),
            Some(first) => values.fold(first, |acc, v| self.or(acc, v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_infers_types() {
        let mut g = Graph::new("t");
        let mut b = Builder::new(&mut g);
        let x = b.field("imm", 12);
        let y = b.cast(CastOp::SignExt, x, Type::SInt(32));
        let one = b.constant(1, Type::SInt(32));
        let sum = b.builtin(BuiltIn::Add, &[y, one]);
        let lt = b.builtin(BuiltIn::Slt, &[sum, one]);
        assert_eq!(g.ty(sum), Type::SInt(32));
        assert_eq!(g.ty(lt), Type::Bool);
    }

    #[test]
    fn or_all_folds() {
        let mut g = Graph::new("t");
        let mut b = Builder::new(&mut g);
        let f = b.or_all([]);
        assert_eq!(b.graph.as_const(f), Some(Value::bool(false)));
        let t = b.bool(true);
        assert_eq!(b.or_all([t]), t);
    }
}
