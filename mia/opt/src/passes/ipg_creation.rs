use crate::analysis::simplify;
use crate::traversal::{Named, Pass};
use mia_ir::{
    self as ir, Artifact, BuiltIn, InstrId, InstrSet, Instruction, Ipg, Isa,
    NodeId, NodeKind, Type, Value,
};
use mia_utils::{Error, MiaResult};
use smallvec::smallvec;
use std::collections::{BTreeMap, BTreeSet};

/// Builds the instruction progress graph (IPG) from the instruction
/// behaviors of the ISA.
///
/// The side effects of every instruction are copied together with their
/// inputs. Pure expressions shared between instructions are deduplicated and
/// every node records the instructions activating it. Afterwards reads are
/// made conditional on the side effects consuming them and the constant
/// address constraints of the resources (`X(0) = 0`) are applied.
#[derive(Default)]
pub struct IpgCreation;

impl Named for IpgCreation {
    fn name() -> &'static str {
        "ipg-creation"
    }

    fn description() -> &'static str {
        "build the instruction progress graph shared by all instructions"
    }
}

impl Pass for IpgCreation {
    fn requires() -> &'static [Artifact] {
        &[Artifact::Isa]
    }

    fn produces() -> &'static [Artifact] {
        &[Artifact::Ipg]
    }

    fn run(&mut self, ctx: &mut ir::Context) -> MiaResult<()> {
        let isa = ctx.isa()?;
        let mut ipg = Ipg::new(isa.name, isa.all_instructions());
        for (id, instr) in isa.instructions.iter() {
            copy_instruction(&mut ipg, id, instr)?;
        }
        condition_reads(&mut ipg)?;
        apply_constraints(&mut ipg, isa)?;
        let rewrites = simplify(&mut ipg, None)?;
        log::debug!(
            target: Self::name(),
            "{} nodes for {} instructions, {rewrites} simplifications",
            ipg.graph.live_count(),
            isa.instructions.len()
        );
        ctx.ipg = Some(ipg);
        Ok(())
    }
}

fn copy_instruction(ipg: &mut Ipg, id: InstrId, instr: &Instruction) -> MiaResult<()> {
    let g = &instr.behavior;
    let set: InstrSet = [id].into();
    let truth = ipg.add(NodeKind::Const(Value::bool(true)), Type::Bool, &set);
    let needed = g.closure(g.side_effects());
    let mut copies: BTreeMap<NodeId, NodeId> = BTreeMap::new();
    for n in g.topo_order() {
        if !needed.contains(&n) {
            continue;
        }
        let mut kind = g.kind(n).clone();
        if let NodeKind::Field(f) = &kind {
            let field = instr.field(*f).ok_or_else(|| {
                Error::missing_structure(format!(
                    "`{}` has no field `{f}`",
                    instr.name
                ))
                .with_pos(g.loc(n))
            })?;
            kind = NodeKind::WordSlice {
                slices: field.slices.clone(),
                fields: BTreeSet::from([*f]),
            };
        }
        if let Some(missing) = kind.inputs().into_iter().find(|i| !copies.contains_key(i)) {
            return Err(Error::internal(format!(
                "{missing} of `{}` copied after its user {n}",
                instr.name
            )));
        }
        kind.map_inputs(|x| copies[&x]);
        match &mut kind {
            NodeKind::Read { condition, .. } => *condition = Some(truth),
            NodeKind::Write { condition, .. } if condition.is_none() => {
                *condition = Some(truth)
            }
            _ => (),
        }
        let copy = ipg.add_at(kind, g.ty(n), &set, g.loc(n));
        copies.insert(n, copy);
    }
    Ok(())
}

/// OR of `values` in the IPG.
fn or_all(ipg: &mut Ipg, values: &BTreeSet<NodeId>, instrs: &InstrSet) -> Option<NodeId> {
    values.iter().copied().reduce(|acc, v| {
        ipg.add(
            NodeKind::BuiltIn {
                op: BuiltIn::Or,
                args: smallvec![acc, v],
            },
            Type::Bool,
            instrs,
        )
    })
}

/// A read is only needed when one of the side effects consuming it happens.
fn condition_reads(ipg: &mut Ipg) -> MiaResult<()> {
    let truth = ipg.graph.bool_const(true);
    for r in ipg.graph.nodes_where(|k| matches!(k, NodeKind::Read { .. })) {
        let mut conds = BTreeSet::new();
        let mut always = false;
        for u in ipg.graph.transitive_users(r) {
            let kind = ipg.graph.kind(u);
            if !kind.is_side_effect() {
                continue;
            }
            match kind.condition() {
                Some(c) if !ipg.graph.is_true(c) => {
                    conds.insert(c);
                }
                _ => always = true,
            }
        }
        let instrs = ipg.instrs(r).clone();
        let mut cond = if always {
            truth
        } else {
            or_all(ipg, &conds, &instrs).unwrap_or(truth)
        };
        if ipg.graph.closure([cond]).contains(&r) {
            cond = truth;
        }
        ipg.graph.set_condition(r, cond)?;
    }
    Ok(())
}

/// Accesses of a constrained address are replaced by the constant value.
fn apply_constraints(ipg: &mut Ipg, isa: &Isa) -> MiaResult<()> {
    for (rid, res) in isa.resources.iter() {
        for constraint in &res.constraints {
            let accesses = ipg.graph.nodes_where(|k| k.resource() == Some(rid));
            for a in accesses {
                let Some(addr) = ipg.graph.kind(a).address() else {
                    continue;
                };
                let instrs = ipg.instrs(a).clone();
                let aty = ipg.graph.ty(addr);
                let c = ipg.add(
                    NodeKind::Const(Value::new(constraint.address, aty.width())),
                    aty,
                    &instrs,
                );
                let ne = ipg.add(
                    NodeKind::BuiltIn {
                        op: BuiltIn::Neq,
                        args: smallvec![addr, c],
                    },
                    Type::Bool,
                    &instrs,
                );
                let cond = match ipg.graph.kind(a).condition() {
                    Some(old) if !ipg.graph.is_true(old) => ipg.add(
                        NodeKind::BuiltIn {
                            op: BuiltIn::And,
                            args: smallvec![old, ne],
                        },
                        Type::Bool,
                        &instrs,
                    ),
                    _ => ne,
                };
                ipg.graph.set_condition(a, cond)?;
                if matches!(ipg.graph.kind(a), NodeKind::Read { .. }) {
                    let ty = ipg.graph.ty(a);
                    let users = ipg.graph.users(a);
                    let v = ipg.add(
                        NodeKind::Const(Value::new(constraint.value, ty.width())),
                        ty,
                        &instrs,
                    );
                    let sel = ipg.add(
                        NodeKind::Select {
                            cond: ne,
                            then: a,
                            els: v,
                        },
                        ty,
                        &instrs,
                    );
                    for u in users {
                        if u != sel {
                            ipg.graph.replace_input(u, a, sel);
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mia_ir::{BitRange, Builder, Field, Graph, Resource, ResourceKind};
    use mia_utils::ErrorKind;

    /// `MV`: `X[rd] = X[rs]`, `X[0]` hardwired to zero. With `rogue` the
    /// behavior uses a field the format does not declare.
    fn isa(rogue: bool) -> Isa {
        let mut isa = Isa::new("mv", 16);
        let x = isa.add_resource(
            Resource::new("X", ResourceKind::RegisterFile, Some(4), 16)
                .with_constraint(0, 0),
        );
        let fields = vec![
            Field::new("rd", &[BitRange::new(3, 0)]),
            Field::new("rs", &[BitRange::new(7, 4)]),
        ];
        let mut instr = Instruction::new("MV", fields);
        let mut g = Graph::new("MV");
        let mut b = Builder::new(&mut g);
        let rs = b.field(if rogue { "rt" } else { "rs" }, 4);
        let v = b.read(x, Some(rs), Type::Bits(16));
        let rd = b.field("rd", 4);
        b.write(x, Some(rd), v, None);
        instr.behavior = g;
        isa.add_instruction(instr);
        isa
    }

    fn create(isa: Isa) -> MiaResult<Ipg> {
        let mut ctx = ir::Context::new(isa, None);
        IpgCreation::do_pass_default(&mut ctx)?;
        ctx.ipg.ok_or_else(|| Error::internal("no ipg"))
    }

    fn neq_zero(g: &ir::Graph, n: NodeId) -> bool {
        match g.kind(n) {
            NodeKind::BuiltIn {
                op: BuiltIn::Neq,
                args,
            } => {
                matches!(g.kind(args[0]), NodeKind::WordSlice { .. })
                    && g.as_const(args[1]).is_some_and(|v| v.bits() == 0)
            }
            _ => false,
        }
    }

    #[test]
    fn zero_register_is_guarded() {
        let ipg = create(isa(false)).unwrap();
        let g = &ipg.graph;
        let reads = g.nodes_where(|k| matches!(k, NodeKind::Read { .. }));
        let writes = g.nodes_where(|k| matches!(k, NodeKind::Write { .. }));
        assert_eq!((reads.len(), writes.len()), (1, 1));
        let (r, w) = (reads[0], writes[0]);

        let read_cond = g.kind(r).condition().unwrap();
        assert!(neq_zero(g, read_cond));
        let NodeKind::Write {
            value, condition, ..
        } = g.kind(w)
        else {
            unreachable!()
        };
        assert!(neq_zero(g, condition.unwrap()));
        assert!(matches!(
            g.kind(*value),
            NodeKind::Select { cond, then, .. } if *cond == read_cond && *then == r
        ));
        assert!(ipg.is_always_active(w));
        g.validate().unwrap();
    }

    #[test]
    fn fields_become_word_slices() {
        let ipg = create(isa(false)).unwrap();
        let g = &ipg.graph;
        assert!(g.nodes_where(|k| matches!(k, NodeKind::Field(_))).is_empty());
        let slices = g.nodes_where(|k| matches!(k, NodeKind::WordSlice { .. }));
        assert_eq!(slices.len(), 2);
    }

    #[test]
    fn undeclared_fields_are_missing_structure() {
        let err = create(isa(true)).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MissingStructure(_)));
    }
}
