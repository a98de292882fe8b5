use crate::traversal::{ConstructPass, Named, ParseVal, Pass, PassOpt};
use itertools::Itertools;
use mia_ir::{
    self as ir, Artifact, InstrSet, Ipg, Isa, NodeId, NodeKind, Type, Value,
};
use mia_utils::{Error, MiaResult};
use std::collections::BTreeSet;

/// Attaches name hints to the nodes of the instruction progress graph.
///
/// Resource accesses name their operands, constants are named by value and
/// every other node derives its hints from its inputs. Selections pass
/// their hints on to the selected values. Signal names of the generated
/// hardware are picked from these hints.
pub struct IpgNaming {
    max_len: usize,
}

impl Named for IpgNaming {
    fn name() -> &'static str {
        "ipg-naming"
    }

    fn description() -> &'static str {
        "derive signal name hints for the instruction progress graph"
    }

    fn opts() -> Vec<PassOpt> {
        vec![PassOpt::new(
            "max-hint-len",
            "longest name hint that is kept",
            ParseVal::Num(32),
            PassOpt::parse_num,
        )]
    }
}

impl ConstructPass for IpgNaming {
    fn from(ctx: &ir::Context) -> MiaResult<Self> {
        let opts = Self::get_opts(ctx);
        let max_len = opts["max-hint-len"]
            .pos_num()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(32);
        Ok(IpgNaming { max_len })
    }
}

impl Pass for IpgNaming {
    fn requires() -> &'static [Artifact] {
        &[Artifact::Ipg]
    }

    fn produces() -> &'static [Artifact] {
        &[Artifact::Named]
    }

    fn run(&mut self, ctx: &mut ir::Context) -> MiaResult<()> {
        let (Some(isa), Some(ipg)) = (ctx.isa.as_ref(), ctx.ipg.as_mut()) else {
            return Err(Error::internal("naming needs an IPG"));
        };
        ipg.clear_hints();
        let mut namer = Namer {
            isa,
            ipg,
            max_len: self.max_len,
        };
        namer.accesses();
        namer.constants();
        namer.forward();
        namer.backward();
        let named = namer
            .ipg
            .graph
            .nodes()
            .filter(|n| !namer.ipg.hints(*n).is_empty())
            .count();
        log::debug!(target: Self::name(), "{named} nodes named");
        Ok(())
    }
}

struct Namer<'a> {
    isa: &'a Isa,
    ipg: &'a mut Ipg,
    max_len: usize,
}

impl Namer<'_> {
    fn hint(&mut self, n: NodeId, hint: String) {
        if hint.len() <= self.max_len && !self.ipg.graph.is_const(n) {
            self.ipg.add_hint(n, hint);
        }
    }

    fn shortest(&self, n: NodeId) -> Option<String> {
        self.ipg.shortest_hint(n, self.max_len).map(str::to_string)
    }

    fn accesses(&mut self) {
        for (r, res) in self.isa.resources.iter() {
            let g = &self.ipg.graph;
            let reads = g.nodes_where(|k| {
                matches!(k, NodeKind::Read { resource, .. } if *resource == r)
            });
            let writes = g.nodes_where(|k| {
                matches!(k, NodeKind::Write { resource, .. } if *resource == r)
            });
            for (i, n) in reads.into_iter().enumerate() {
                let prefix = format!("read{}{i}", res.name);
                let kind = self.ipg.graph.kind(n).clone();
                self.hint(n, format!("{prefix}_result"));
                if let Some(c) = kind.condition() {
                    self.hint(c, format!("{prefix}_enable"));
                }
                if let Some(a) = kind.address() {
                    self.hint(a, format!("{prefix}_addr"));
                }
            }
            for (i, n) in writes.into_iter().enumerate() {
                let prefix = format!("write{}{i}", res.name);
                let NodeKind::Write {
                    address,
                    value,
                    condition,
                    ..
                } = self.ipg.graph.kind(n).clone()
                else {
                    continue;
                };
                self.hint(value, format!("{prefix}_value"));
                if let Some(c) = condition {
                    self.hint(c, format!("{prefix}_enable"));
                }
                if let Some(a) = address {
                    self.hint(a, format!("{prefix}_addr"));
                }
            }
        }
    }

    fn constants(&mut self) {
        for n in self.ipg.graph.nodes().collect::<Vec<_>>() {
            if let Some(v) = self.ipg.graph.as_const(n) {
                let name = const_name(v, self.ipg.graph.ty(n));
                if name.len() <= self.max_len {
                    self.ipg.add_hint(n, name);
                }
            }
        }
    }

    /// Hints derived from the inputs, in topological order.
    fn forward(&mut self) {
        for n in self.ipg.graph.topo_order() {
            let hints: Vec<String> = match self.ipg.graph.kind(n).clone() {
                NodeKind::WordSlice { fields, .. } => {
                    fields.iter().map(|f| f.to_string()).collect()
                }
                NodeKind::IsInstruction(set) => {
                    let all = self.ipg.instructions();
                    vec![format!("is_{}", set_name(self.isa, all, &set))]
                }
                NodeKind::OneHot(values) => values
                    .iter()
                    .map(|v| self.shortest(*v))
                    .collect::<Option<Vec<_>>>()
                    .map(|names| vec![format!("bin_{}", names.join("_"))])
                    .unwrap_or_default(),
                NodeKind::Cast { op, arg } => {
                    let width = self.ipg.graph.width(n);
                    self.ipg
                        .hints(arg)
                        .iter()
                        .map(|h| format!("{h}_{}{width}", op.name()))
                        .collect()
                }
                NodeKind::BuiltIn { op, args } => {
                    let names: Option<Vec<_>> =
                        args.iter().map(|a| self.shortest(*a)).collect();
                    match names {
                        Some(names) if names.len() == 2 => {
                            vec![format!("{}_{}_{}", names[0], op.name(), names[1])]
                        }
                        Some(names) => {
                            vec![format!("{}_{}", op.name(), names.join("_"))]
                        }
                        None => vec![],
                    }
                }
                NodeKind::SelectByInstruction { arms, .. } => {
                    let mut shared: Option<BTreeSet<String>> = None;
                    for arm in &arms {
                        let hints = self.ipg.hints(arm.value);
                        shared = Some(match shared {
                            None => hints.clone(),
                            Some(s) => s.intersection(hints).cloned().collect(),
                        });
                    }
                    shared.into_iter().flatten().collect()
                }
                _ => vec![],
            };
            for h in hints {
                self.hint(n, h);
            }
        }
    }

    /// Selections name their cases, users before inputs.
    fn backward(&mut self) {
        for n in self.ipg.graph.topo_order().into_iter().rev() {
            let hints: Vec<String> = self.ipg.hints(n).iter().cloned().collect();
            if hints.is_empty() {
                continue;
            }
            let (cases, selector) = match self.ipg.graph.kind(n) {
                NodeKind::Select { cond, then, els } => {
                    (vec![*then, *els], Some(*cond))
                }
                NodeKind::SelectByInstruction { arms, selection } => {
                    (arms.iter().map(|a| a.value).collect(), *selection)
                }
                _ => continue,
            };
            for h in hints {
                for c in &cases {
                    self.hint(*c, h.clone());
                }
                if let Some(s) = selector {
                    self.hint(s, format!("sel_{h}"));
                }
            }
        }
    }
}

/// Name of a constant: decimal for integers, contracted hex otherwise.
fn const_name(v: Value, ty: Type) -> String {
    match ty {
        Type::SInt(_) if v.signed() < 0 => {
            format!("neg{}", v.signed().unsigned_abs())
        }
        Type::SInt(_) | Type::UInt(_) => v.bits().to_string(),
        _ => v.hex().chars().dedup().collect(),
    }
}

/// Readable name of a set of instructions.
fn set_name(isa: &Isa, all: &InstrSet, set: &InstrSet) -> String {
    if set.is_empty() {
        return "none".to_string();
    }
    if set == all {
        return "all".to_string();
    }
    if set.len() * 2 > all.len() {
        let complement: InstrSet = all.difference(set).copied().collect();
        return format!("not_{}", set_name(isa, all, &complement));
    }
    let names: Vec<String> = isa
        .instruction_names(set)
        .iter()
        .map(|n| n.as_str().to_lowercase())
        .collect();
    let Some(first) = names.first() else {
        return "none".to_string();
    };
    let prefix = names.iter().skip(1).fold(first.as_str(), |acc, n| {
        let len = acc
            .bytes()
            .zip(n.bytes())
            .take_while(|(a, b)| a == b)
            .count();
        &acc[..len]
    });
    if prefix.is_empty() {
        names.join("_")
    } else {
        prefix.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mia_ir::{Instruction, InstrId};

    fn isa(names: &[&str]) -> Isa {
        let mut isa = Isa::new("t", 32);
        for n in names {
            isa.add_instruction(Instruction::new(*n, vec![]));
        }
        isa
    }

    fn set(ids: &[u32]) -> InstrSet {
        ids.iter().map(|i| InstrId::from(*i)).collect()
    }

    #[test]
    fn instruction_sets_are_named_readably() {
        let isa = isa(&["ADD", "ADDI", "LW", "SW", "BEQ"]);
        let all = isa.all_instructions();
        assert_eq!(set_name(&isa, &all, &set(&[])), "none");
        assert_eq!(set_name(&isa, &all, &all), "all");
        assert_eq!(set_name(&isa, &all, &set(&[0, 1])), "add");
        assert_eq!(set_name(&isa, &all, &set(&[2, 3])), "lw_sw");
        assert_eq!(set_name(&isa, &all, &set(&[0, 1, 2])), "not_sw_beq");
    }

    #[test]
    fn constants_are_named_by_value() {
        assert_eq!(const_name(Value::new(12, 32), Type::UInt(32)), "12");
        assert_eq!(const_name(Value::new(-4i64 as u64, 12), Type::SInt(12)), "neg4");
        assert_eq!(const_name(Value::new(0xff00, 16), Type::Bits(16)), "f0");
        assert_eq!(const_name(Value::bool(true), Type::Bool), "1");
    }
}
