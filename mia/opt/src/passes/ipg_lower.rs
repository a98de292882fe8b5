use crate::analysis::{Placement, simplify};
use crate::traversal::{Named, Pass};
use mia_ir::{
    self as ir, Artifact, BuiltIn, CtxId, InstrSet, Ipg, Mapping, NodeId,
    NodeKind, Type,
};
use mia_utils::{Error, MiaResult};
use smallvec::{SmallVec, smallvec};

/// Makes the instruction dependence of the IPG explicit.
///
/// Writes and conditional reads active for only some instructions get an
/// `is_instruction` test in their condition, and every select by
/// instruction gets a one-hot selection computed in the decode stage.
#[derive(Default)]
pub struct IpgLower;

impl Named for IpgLower {
    fn name() -> &'static str {
        "ipg-lower"
    }

    fn description() -> &'static str {
        "lower instruction dependent conditions and selections to decode logic"
    }
}

impl Pass for IpgLower {
    fn requires() -> &'static [Artifact] {
        &[Artifact::Mapping]
    }

    fn produces() -> &'static [Artifact] {
        &[Artifact::Lowered]
    }

    fn run(&mut self, ctx: &mut ir::Context) -> MiaResult<()> {
        let (Some(mia), Some(ipg), Some(mapping)) =
            (ctx.mia.as_ref(), ctx.ipg.as_mut(), ctx.mapping.as_mut())
        else {
            return Err(Error::internal("lowering needs a mapped IPG"));
        };
        let decode = mapping.ensure_decode()?;
        let conditions = lower_conditions(ipg, mapping, decode)?;
        let selects = lower_selects(ipg, mapping, decode);
        let rewrites = simplify(ipg, Some(Placement::new(mapping, mia)))?;
        mapping.clean(ipg);
        log::debug!(
            target: Self::name(),
            "{conditions} conditions and {selects} selections lowered, {rewrites} simplifications"
        );
        Ok(())
    }
}

/// Add `kind` and give it to `ctx` unless some context already owns it.
fn place(
    ipg: &mut Ipg,
    mapping: &mut Mapping,
    ctx: CtxId,
    kind: NodeKind,
    ty: Type,
    instrs: &InstrSet,
) -> NodeId {
    let n = ipg.add(kind, ty, instrs);
    if !mapping.is_owned(n) && !ipg.graph.is_const(n) {
        mapping.assign(ctx, n, false);
    }
    n
}

fn lower_conditions(
    ipg: &mut Ipg,
    mapping: &mut Mapping,
    decode: CtxId,
) -> MiaResult<usize> {
    let all = ipg.instructions().clone();
    let accesses = ipg.graph.nodes_where(|k| {
        matches!(k, NodeKind::Write { .. } | NodeKind::Read { condition: Some(_), .. })
    });
    let mut lowered = 0;
    for n in accesses {
        let instrs = ipg.instrs(n).clone();
        if instrs == all || !instrs.is_subset(&all) {
            continue;
        }
        let Some(cond) = ipg.graph.kind(n).condition() else {
            continue;
        };
        let is = place(
            ipg,
            mapping,
            decode,
            NodeKind::IsInstruction(instrs.clone()),
            Type::Bool,
            &instrs,
        );
        let target = match mapping.owner(cond) {
            Some(c) if !ipg.graph.is_const(cond) => c,
            _ => decode,
        };
        let guarded = place(
            ipg,
            mapping,
            target,
            NodeKind::BuiltIn {
                op: BuiltIn::And,
                args: smallvec![cond, is],
            },
            Type::Bool,
            &instrs,
        );
        ipg.graph.set_condition(n, guarded)?;
        lowered += 1;
    }
    Ok(lowered)
}

fn lower_selects(ipg: &mut Ipg, mapping: &mut Mapping, decode: CtxId) -> usize {
    let selects = ipg.graph.nodes_where(|k| {
        matches!(k, NodeKind::SelectByInstruction { selection: None, .. })
    });
    for &n in &selects {
        let NodeKind::SelectByInstruction { arms, .. } = ipg.graph.kind(n).clone()
        else {
            continue;
        };
        let instrs = ipg.instrs(n).clone();
        let bits: SmallVec<[NodeId; 4]> = arms
            .iter()
            .map(|a| {
                let kind = NodeKind::IsInstruction(a.instrs.clone());
                place(ipg, mapping, decode, kind, Type::Bool, &a.instrs)
            })
            .collect();
        let ty = Type::Bits(arms.len() as u32);
        let onehot =
            place(ipg, mapping, decode, NodeKind::OneHot(bits), ty, &instrs);
        ipg.graph.modify(n, |kind| {
            if let NodeKind::SelectByInstruction { selection, .. } = kind {
                *selection = Some(onehot);
            }
        });
    }
    selects.len()
}
