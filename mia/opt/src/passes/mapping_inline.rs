use crate::traversal::{Named, Pass};
use mia_ir::{
    self as ir, Artifact, Builder, Graph, IndexRef, Ipg, Mapping,
    MicroArchitecture, NodeId, NodeKind, OutputId, StageId,
};
use mia_utils::{Error, Id, MiaResult, NameGenerator};
use std::collections::{BTreeMap, BTreeSet};

/// Copies the mapped IPG into the stage behaviors.
///
/// Values crossing stage boundaries travel through stage outputs, relayed
/// through every stage between producer and consumer.
#[derive(Default)]
pub struct MappingInline;

impl Named for MappingInline {
    fn name() -> &'static str {
        "mapping-inline"
    }

    fn description() -> &'static str {
        "inline the mapped instruction progress graph into the stage behaviors"
    }
}

impl Pass for MappingInline {
    fn requires() -> &'static [Artifact] {
        &[Artifact::Mapping, Artifact::Lowered]
    }

    fn produces() -> &'static [Artifact] {
        &[Artifact::Inlined]
    }

    fn run(&mut self, ctx: &mut ir::Context) -> MiaResult<()> {
        let (Some(mia), Some(ipg), Some(mapping)) =
            (ctx.mia.as_mut(), ctx.ipg.as_ref(), ctx.mapping.as_ref())
        else {
            return Err(Error::internal("inlining needs a mapped IPG"));
        };
        let names: BTreeSet<Id> = mia.outputs.values().map(|o| o.name).collect();
        let mut inliner = Inliner {
            mia,
            ipg,
            mapping,
            copies: BTreeMap::new(),
            outputs: BTreeMap::new(),
            names: NameGenerator::with_prev_defined_names(names),
        };
        for s in inliner.mia.ordered() {
            inliner.stage(s)?;
        }
        log::debug!(
            target: Self::name(),
            "{} nodes inlined, {} stage outputs created",
            inliner.copies.len(),
            inliner.outputs.len()
        );
        Ok(())
    }
}

struct Inliner<'a> {
    mia: &'a mut MicroArchitecture,
    ipg: &'a Ipg,
    mapping: &'a Mapping,
    /// Stage-local node standing for an IPG node.
    copies: BTreeMap<(StageId, NodeId), NodeId>,
    /// Output of a stage carrying an IPG value.
    outputs: BTreeMap<(StageId, NodeId), OutputId>,
    names: NameGenerator,
}

impl Inliner<'_> {
    fn graph(&mut self, s: StageId) -> &mut Graph {
        &mut self.mia.stages[s].behavior
    }

    fn stage(&mut self, s: StageId) -> MiaResult<()> {
        let ipg = self.ipg;
        let owned = self.mapping.stage_nodes(s);
        for n in ipg.graph.topo_order() {
            if !owned.contains(&n) {
                continue;
            }
            let mut kind = ipg.graph.kind(n).clone();
            let mut local = BTreeMap::new();
            for i in ipg.graph.inputs(n) {
                if !local.contains_key(&i) {
                    let v = self.value_in(s, i)?;
                    local.insert(i, v);
                }
            }
            kind.map_inputs(|x| local[&x]);
            if kind.is_side_effect() && kind.condition().is_none() {
                return Err(Error::internal(format!(
                    "side effect {n} ({}) has no condition",
                    kind.mnemonic()
                )));
            }
            let guarded = matches!(
                kind,
                NodeKind::Write { .. } | NodeKind::Read { condition: Some(_), .. }
            );
            let (ty, loc) = (ipg.graph.ty(n), ipg.graph.loc(n));
            let copy = self.graph(s).add_at(kind, ty, loc);
            self.copies.insert((s, n), copy);
            if guarded {
                self.patch_condition(s, n, copy)?;
            }
        }
        Ok(())
    }

    /// Restrict an access to the instructions whose progress reaches the
    /// stage outputs its context feeds.
    fn patch_condition(
        &mut self,
        s: StageId,
        n: NodeId,
        copy: NodeId,
    ) -> MiaResult<()> {
        let mapping = self.mapping;
        let Some(c) = mapping.owner(n) else {
            return Ok(());
        };
        let effects = &mapping.context(c).side_effects;
        if effects.is_empty() {
            return Ok(());
        }
        let graph = &mut self.mia.stages[s].behavior;
        let mut conds = vec![];
        for e in effects {
            match graph.kind(*e).condition() {
                Some(x) if !graph.is_true(x) => conds.push(x),
                _ => return Ok(()),
            }
        }
        let Some(old) = graph.kind(copy).condition() else {
            return Ok(());
        };
        let mut b = Builder::new(graph);
        let any = b.or_all(conds);
        let cond = b.and(old, any);
        graph.set_condition(copy, cond)
    }

    fn prev(&self, s: StageId) -> MiaResult<StageId> {
        self.mia.stages[s].prev.ok_or_else(|| {
            Error::internal(format!(
                "stage `{}` uses a value of an earlier stage but has no \
                 predecessor",
                self.mia.stages[s].name
            ))
        })
    }

    /// The node standing for the IPG node `n` in stage `s`.
    fn value_in(&mut self, s: StageId, n: NodeId) -> MiaResult<NodeId> {
        let g = &self.ipg.graph;
        let ty = g.ty(n);
        if let Some(v) = g.as_const(n) {
            return Ok(self.graph(s).constant(v, ty));
        }
        if let Some(local) = self.copies.get(&(s, n)) {
            return Ok(*local);
        }
        let Some(owner) = self.mapping.stage_of(n) else {
            return Err(Error::internal(format!("{n} is used but not mapped")));
        };
        if owner == s || self.mia.rank(owner) > self.mia.rank(s) {
            return Err(Error::internal(format!(
                "{n} is used in `{}` before it is computed",
                self.mia.stages[s].name
            )));
        }
        let prev = self.prev(s)?;
        self.output_at(prev, n)?;
        self.local(s, n)
    }

    /// Read the value of `n` in `s` from the output of the previous stage.
    fn local(&mut self, s: StageId, n: NodeId) -> MiaResult<NodeId> {
        if let Some(local) = self.copies.get(&(s, n)) {
            return Ok(*local);
        }
        let prev = self.prev(s)?;
        let Some(o) = self.outputs.get(&(prev, n)).copied() else {
            return Err(Error::internal(format!(
                "{n} is not forwarded by `{}`",
                self.mia.stages[prev].name
            )));
        };
        let ty = self.ipg.graph.ty(n);
        let read = Builder::new(self.graph(s)).read_output(o, ty);
        self.copies.insert((s, n), read);
        Ok(read)
    }

    /// Output of stage `s` carrying `n`, created along with the relays from
    /// the producing stage.
    fn output_at(&mut self, s: StageId, n: NodeId) -> MiaResult<OutputId> {
        let owner = self.mapping.stage_of(n);
        let mut chain = vec![];
        let mut cur = s;
        while !self.outputs.contains_key(&(cur, n)) {
            chain.push(cur);
            if owner == Some(cur) {
                break;
            }
            cur = self.prev(cur)?;
        }
        for st in chain.into_iter().rev() {
            let value = self.local(st, n)?;
            let hint = self
                .ipg
                .shortest_hint(n, usize::MAX)
                .map(str::to_string)
                .unwrap_or_else(|| format!("n{}", n.index()));
            let name = self.names.gen_name(self.mia.stages[st].name.append(hint));
            let ty = self.ipg.graph.ty(n);
            let o = self.mia.add_output(st, name, ty);
            Builder::new(self.graph(st)).write_output(o, value, None);
            log::trace!("{n} leaves `{}` as `{name}`", self.mia.stages[st].name);
            self.outputs.insert((st, n), o);
        }
        self.outputs.get(&(s, n)).copied().ok_or_else(|| {
            Error::internal(format!("no output carries {n}"))
        })
    }
}
