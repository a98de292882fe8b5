//! Resolve names of a parsed description and build the IR.
use crate::ast::{
    Description, ExprDef, InstructionDef, IsaDef, LogicKindDef, MiaDef,
    ResourceKindDef, StmtDef, TypeDef,
};
use mia_ir::{
    self as ir, BitRange, Builder, BuiltIn, CastOp, Field, Graph, Instruction,
    Isa, Logic, MiaBuiltIn, MicroArchitecture, NodeId, Resource, ResourceKind,
    Stage, Type,
};
use mia_utils::{Error, Id, MiaResult, SourceLoc};
use std::collections::BTreeMap;

fn ty(def: TypeDef) -> Type {
    match def {
        TypeDef::Bool => Type::Bool,
        TypeDef::Bits(w) => Type::Bits(w),
        TypeDef::Uint(w) => Type::UInt(w),
        TypeDef::Sint(w) => Type::SInt(w),
    }
}

/// Build the instruction set and, if declared, the microarchitecture.
pub fn build(desc: Description) -> MiaResult<(Isa, Option<MicroArchitecture>)> {
    let isa = build_isa(desc.isa)?;
    let mia = desc.mia.map(|m| build_mia(&isa, m)).transpose()?;
    Ok((isa, mia))
}

fn build_isa(def: IsaDef) -> MiaResult<Isa> {
    let mut isa = Isa::new(def.name.as_str(), def.word_width);
    for r in def.resources {
        let name = Id::from(r.name.as_str());
        if isa.find_resource(name).is_some() {
            return Err(Error::invalid_file(format!(
                "resource `{name}` is declared twice"
            )));
        }
        let kind = match r.kind {
            ResourceKindDef::Register => ResourceKind::Register,
            ResourceKindDef::RegisterFile => ResourceKind::RegisterFile,
            ResourceKindDef::Memory => ResourceKind::Memory,
        };
        if kind != ResourceKind::Register && r.addr_width.is_none() {
            return Err(Error::invalid_file(format!(
                "resource `{name}` needs an address width"
            )));
        }
        let mut res = Resource::new(name, kind, r.addr_width, r.width);
        for c in r.constraints {
            res = res.with_constraint(c.address, c.value);
        }
        isa.add_resource(res);
    }
    isa.pc = def
        .pc
        .map(|pc| {
            isa.find_resource(pc.as_str().into()).ok_or_else(|| {
                Error::invalid_file(format!("unknown program counter `{pc}`"))
            })
        })
        .transpose()?;
    for instr in def.instructions {
        let instr = build_instruction(&isa, instr)?;
        if isa.find_instruction(instr.name).is_some() {
            return Err(Error::invalid_file(format!(
                "instruction `{}` is declared twice",
                instr.name
            )));
        }
        isa.add_instruction(instr);
    }
    log::debug!(
        "loaded `{}` with {} resources and {} instructions",
        isa.name,
        isa.resources.len(),
        isa.instructions.len()
    );
    Ok(isa)
}

fn build_instruction(isa: &Isa, def: InstructionDef) -> MiaResult<Instruction> {
    let unit = Id::from(def.name.as_str());
    let mut fields = vec![];
    for f in def.fields {
        for (hi, lo) in &f.slices {
            if hi < lo || *hi >= isa.word_width {
                return Err(Error::invalid_file(format!(
                    "field `{}` has invalid bit range {hi}..{lo}",
                    f.name
                ))
                .with_pos(Some(SourceLoc::new(unit, None))));
            }
        }
        let slices: Vec<_> =
            f.slices.iter().map(|(hi, lo)| BitRange::new(*hi, *lo)).collect();
        fields.push(Field::new(f.name.as_str(), &slices));
    }
    let mut instr = Instruction::new(unit, fields);
    let mut graph = Graph::new(unit);
    let mut lower = Lower {
        isa,
        fields: Some(instr.fields.as_slice()),
        mia: None,
        builder: Builder::new(&mut graph),
        vars: BTreeMap::new(),
        loc: SourceLoc::new(unit, None),
    };
    for (idx, stmt) in def.behavior.iter().enumerate() {
        lower.stmt(idx, stmt)?;
    }
    instr.behavior = graph;
    Ok(instr)
}

/// Type of a stage output without an explicit type: the token produced by
/// the stage operation it carries.
fn output_type(value: &ExprDef, lets: &BTreeMap<&str, &ExprDef>) -> Type {
    match value {
        ExprDef::Mia { op, .. } if op == MiaBuiltIn::FetchNext.name() => {
            Type::FetchResult
        }
        ExprDef::Var(v) => match lets.get(v.as_str()) {
            Some(e) => output_type(e, lets),
            None => Type::Instruction,
        },
        _ => Type::Instruction,
    }
}

fn build_mia(isa: &Isa, def: MiaDef) -> MiaResult<MicroArchitecture> {
    let mut mia = MicroArchitecture::new(def.name.as_str());
    for l in &def.logic {
        let name = Id::from(l.name.as_str());
        mia.logic.push(match l.kind {
            LogicKindDef::Forwarding => Logic::Forwarding { name },
            LogicKindDef::BranchPrediction => Logic::BranchPrediction { name },
        });
    }
    // Declare every stage and output first, stages may read outputs of
    // stages declared after them.
    let mut stages = vec![];
    for s in &def.stages {
        let name = Id::from(s.name.as_str());
        if mia.find_stage(name).is_some() {
            return Err(Error::invalid_file(format!(
                "stage `{name}` is declared twice"
            )));
        }
        let id = mia.add_stage(Stage::new(name));
        let mut lets = BTreeMap::new();
        for stmt in &s.behavior {
            match stmt {
                StmtDef::Let { name, expr } => {
                    lets.insert(name.as_str(), expr);
                }
                StmtDef::Output { name: out, value, ty: t } => {
                    let t = t.map(ty).unwrap_or_else(|| output_type(value, &lets));
                    mia.add_output(id, name.append(out), t);
                }
                StmtDef::Write { .. } => (),
            }
        }
        stages.push(id);
    }
    for (id, s) in stages.into_iter().zip(def.stages) {
        let name = mia.stages[id].name;
        let mut graph = Graph::new(name);
        let mut lower = Lower {
            isa,
            fields: None,
            mia: Some(&mia),
            builder: Builder::new(&mut graph),
            vars: BTreeMap::new(),
            loc: SourceLoc::new(name, None),
        };
        for (idx, stmt) in s.behavior.iter().enumerate() {
            lower.stmt(idx, stmt)?;
        }
        mia.stages[id].behavior = graph;
    }
    Ok(mia)
}

struct Lower<'a> {
    isa: &'a Isa,
    /// Format of the instruction being built.
    fields: Option<&'a [Field]>,
    /// Microarchitecture of the stage being built.
    mia: Option<&'a MicroArchitecture>,
    builder: Builder<'a>,
    vars: BTreeMap<String, NodeId>,
    loc: SourceLoc,
}

impl Lower<'_> {
    fn error<S: ToString>(&self, msg: S) -> Error {
        Error::invalid_file(msg).with_pos(Some(self.loc))
    }

    fn resource(&self, name: &str) -> MiaResult<ir::ResourceId> {
        self.isa
            .find_resource(name.into())
            .ok_or_else(|| self.error(format!("unknown resource `{name}`")))
    }

    fn address(
        &mut self,
        resource: ir::ResourceId,
        address: Option<&ExprDef>,
    ) -> MiaResult<Option<NodeId>> {
        let isa = self.isa;
        let res = &isa.resources[resource];
        match (res.is_indexed(), address) {
            (true, Some(a)) => Ok(Some(self.expr(a)?)),
            (false, None) => Ok(None),
            (true, None) => Err(self.error(format!(
                "access to `{}` needs an address",
                res.name
            ))),
            (false, Some(_)) => Err(self.error(format!(
                "`{}` is not addressable",
                res.name
            ))),
        }
    }

    fn stmt(&mut self, idx: usize, stmt: &StmtDef) -> MiaResult<()> {
        self.loc = SourceLoc::new(self.loc.unit, Some(idx));
        self.builder.at(Some(self.loc));
        match stmt {
            StmtDef::Let { name, expr } => {
                let n = self.expr(expr)?;
                self.vars.insert(name.clone(), n);
            }
            StmtDef::Write {
                resource,
                address,
                value,
                condition,
            } => {
                let r = self.resource(resource)?;
                let address = self.address(r, address.as_ref())?;
                let value = self.expr(value)?;
                let condition = condition.as_ref().map(|c| self.expr(c)).transpose()?;
                self.builder.write(r, address, value, condition);
            }
            StmtDef::Output { name, value, .. } => {
                let Some(mia) = self.mia else {
                    return Err(self.error("outputs are only allowed in stages"));
                };
                let full = self.loc.unit.append(name);
                let out = mia
                    .find_output(full)
                    .ok_or_else(|| self.error(format!("unknown output `{full}`")))?;
                let value = self.expr(value)?;
                self.builder.write_output(out, value, None);
            }
        }
        Ok(())
    }

    fn expr(&mut self, expr: &ExprDef) -> MiaResult<NodeId> {
        let node = match expr {
            ExprDef::Const { value, ty: t } => self.builder.constant(*value, ty(*t)),
            ExprDef::Bool(b) => self.builder.bool(*b),
            ExprDef::Field(name) => {
                let Some(fields) = self.fields else {
                    return Err(self.error("fields are only allowed in instructions"));
                };
                let field = fields
                    .iter()
                    .find(|f| f.name == name.as_str())
                    .ok_or_else(|| self.error(format!("unknown field `{name}`")))?;
                self.builder.field(name, field.width())
            }
            ExprDef::Var(name) => *self
                .vars
                .get(name)
                .ok_or_else(|| self.error(format!("unknown variable `{name}`")))?,
            ExprDef::Call { op, args } => {
                let op_name = op;
                let op = BuiltIn::from_name(op)
                    .ok_or_else(|| self.error(format!("unknown operation `{op}`")))?;
                if args.len() != op.arity() {
                    return Err(self.error(format!(
                        "`{op_name}` takes {} arguments, {} given",
                        op.arity(),
                        args.len()
                    )));
                }
                let args = args
                    .iter()
                    .map(|a| self.expr(a))
                    .collect::<MiaResult<Vec<_>>>()?;
                self.builder.builtin(op, &args)
            }
            ExprDef::Select { cond, then, els } => {
                let cond = self.expr(cond)?;
                let then = self.expr(then)?;
                let els = self.expr(els)?;
                self.builder.select(cond, then, els)
            }
            ExprDef::Cast { op, arg, ty: t } => {
                let op = match op.as_str() {
                    "trunc" => CastOp::Trunc,
                    "zext" => CastOp::ZeroExt,
                    "sext" => CastOp::SignExt,
                    _ => return Err(self.error(format!("unknown cast `{op}`"))),
                };
                let arg = self.expr(arg)?;
                self.builder.cast(op, arg, ty(*t))
            }
            ExprDef::Read { resource, address } => {
                let r = self.resource(resource)?;
                let address = self.address(r, address.as_deref())?;
                let width = self.isa.resources[r].width;
                self.builder.read(r, address, Type::Bits(width))
            }
            ExprDef::Input(name) => {
                let Some(mia) = self.mia else {
                    return Err(self.error("inputs are only allowed in stages"));
                };
                let out = mia
                    .find_output(name.as_str().into())
                    .ok_or_else(|| self.error(format!("unknown output `{name}`")))?;
                self.builder.read_output(out, mia.outputs[out].ty)
            }
            ExprDef::Mia {
                op,
                args,
                resource,
                logic,
            } => {
                let Some(mia) = self.mia else {
                    return Err(self.error(format!(
                        "`{op}` is only allowed in stages"
                    )));
                };
                let op = MiaBuiltIn::from_name(op)
                    .ok_or_else(|| self.error(format!("unknown stage operation `{op}`")))?;
                let resources = match resource {
                    Some(r) => vec![self.resource(r)?],
                    None if op.needs_resource() => {
                        return Err(self.error(format!(
                            "`{}` needs a resource",
                            op.name()
                        )));
                    }
                    None => vec![],
                };
                let logic = logic
                    .as_ref()
                    .map(|l| {
                        mia.find_logic(l.as_str().into())
                            .ok_or_else(|| self.error(format!("unknown logic `{l}`")))
                    })
                    .transpose()?;
                let args = args
                    .iter()
                    .map(|a| self.expr(a))
                    .collect::<MiaResult<Vec<_>>>()?;
                self.builder.mia_call(op, &args, &resources, logic)
            }
        };
        Ok(node)
    }
}
