//! A small RISC-V like instruction set shared by the integration tests.
#![allow(dead_code)]
use mia_ir::{
    self as ir, BitRange, Builder, BuiltIn, CastOp, Field, Graph, Instruction,
    Isa, NodeKind, Resource, ResourceId, ResourceKind, Type,
};
use mia_opt::pass_manager::{PassManager, PassResult};

pub struct Rv {
    pub isa: Isa,
    pub x: ResourceId,
    pub mem: ResourceId,
    pub pc: ResourceId,
}

fn field(name: &str, slices: &[(u32, u32)]) -> Field {
    let slices: Vec<_> = slices.iter().map(|(hi, lo)| BitRange::new(*hi, *lo)).collect();
    Field::new(name, &slices)
}

/// Widths of the fields of the instruction being built.
pub struct Fields(Vec<(String, u32)>);

impl Fields {
    pub fn get(&self, b: &mut Builder, name: &str) -> ir::NodeId {
        let width = self
            .0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, w)| *w)
            .unwrap_or_else(|| panic!("no field {name}"));
        b.field(name, width)
    }
}

fn instruction<F>(isa: &mut Isa, keep: &[&str], name: &str, fields: Vec<Field>, body: F)
where
    F: FnOnce(&mut Builder, &Fields),
{
    if !keep.is_empty() && !keep.contains(&name) {
        return;
    }
    let mut instr = Instruction::new(name, fields);
    let widths = Fields(
        instr
            .fields
            .iter()
            .map(|f| (f.name.to_string(), f.width()))
            .collect(),
    );
    let mut graph = Graph::new(name);
    body(&mut Builder::new(&mut graph), &widths);
    instr.behavior = graph;
    isa.add_instruction(instr);
}

/// `ADD`, `ADDI`, `LW`, `SW` and `BEQ` over 32 registers with a hardwired
/// zero register, a word addressed memory and a program counter.
pub fn rv() -> Rv {
    rv_with(&[])
}

/// The fixture instruction set restricted to the instructions in `keep`,
/// or all of them when `keep` is empty.
pub fn rv_with(keep: &[&str]) -> Rv {
    let mut isa = Isa::new("rv", 32);
    let x = isa.add_resource(
        Resource::new("X", ResourceKind::RegisterFile, Some(5), 32).with_constraint(0, 0),
    );
    let mem = isa.add_resource(Resource::new("MEM", ResourceKind::Memory, Some(32), 32));
    let pc = isa.add_resource(Resource::new("PC", ResourceKind::Register, None, 32));
    isa.pc = Some(pc);

    let rd = || field("rd", &[(11, 7)]);
    let rs1 = || field("rs1", &[(19, 15)]);
    let rs2 = || field("rs2", &[(24, 20)]);
    let imm = || field("imm", &[(31, 20)]);
    let simm = || field("simm", &[(31, 25), (11, 7)]);
    let word = Type::Bits(32);

    instruction(&mut isa, keep, "ADD", vec![rd(), rs1(), rs2()], |b, f| {
        let a = f.get(b, "rs1");
        let a = b.read(x, Some(a), word);
        let c = f.get(b, "rs2");
        let c = b.read(x, Some(c), word);
        let sum = b.builtin(BuiltIn::Add, &[a, c]);
        let d = f.get(b, "rd");
        b.write(x, Some(d), sum, None);
    });
    instruction(&mut isa, keep, "ADDI", vec![rd(), rs1(), imm()], |b, f| {
        let a = f.get(b, "rs1");
        let a = b.read(x, Some(a), word);
        let i = f.get(b, "imm");
        let i = b.cast(CastOp::SignExt, i, word);
        let sum = b.builtin(BuiltIn::Add, &[a, i]);
        let d = f.get(b, "rd");
        b.write(x, Some(d), sum, None);
    });
    instruction(&mut isa, keep, "LW", vec![rd(), rs1(), imm()], |b, f| {
        let a = f.get(b, "rs1");
        let a = b.read(x, Some(a), word);
        let i = f.get(b, "imm");
        let i = b.cast(CastOp::SignExt, i, word);
        let addr = b.builtin(BuiltIn::Add, &[a, i]);
        let v = b.read(mem, Some(addr), word);
        let d = f.get(b, "rd");
        b.write(x, Some(d), v, None);
    });
    instruction(&mut isa, keep, "SW", vec![rs1(), rs2(), simm()], |b, f| {
        let a = f.get(b, "rs1");
        let a = b.read(x, Some(a), word);
        let i = f.get(b, "simm");
        let i = b.cast(CastOp::SignExt, i, word);
        let addr = b.builtin(BuiltIn::Add, &[a, i]);
        let v = f.get(b, "rs2");
        let v = b.read(x, Some(v), word);
        b.write(mem, Some(addr), v, None);
    });
    instruction(&mut isa, keep, "BEQ", vec![rs1(), rs2(), simm()], |b, f| {
        let a = f.get(b, "rs1");
        let a = b.read(x, Some(a), word);
        let c = f.get(b, "rs2");
        let c = b.read(x, Some(c), word);
        let taken = b.builtin(BuiltIn::Eq, &[a, c]);
        let here = b.read(pc, None, word);
        let i = f.get(b, "simm");
        let i = b.cast(CastOp::SignExt, i, word);
        let target = b.builtin(BuiltIn::Add, &[here, i]);
        b.write(pc, None, target, Some(taken));
    });
    Rv { isa, x, mem, pc }
}

/// A context holding the fixture ISA and no microarchitecture.
pub fn context() -> ir::Context {
    ir::Context::new(rv().isa, None)
}

/// Run `passes` (pass names or aliases) on `ctx`.
pub fn run(ctx: &mut ir::Context, passes: &[&str]) -> PassResult<()> {
    let pm = PassManager::default_passes()?;
    let incl: Vec<String> = passes.iter().map(|p| p.to_string()).collect();
    pm.execute_plan(ctx, &incl, &[], &[], false)
}

/// The fixture after running `passes`.
pub fn after(passes: &[&str]) -> ir::Context {
    let mut ctx = context();
    run(&mut ctx, passes).unwrap();
    ctx
}

/// Resource accesses of `resource` in `graph`.
pub fn accesses(graph: &Graph, resource: ResourceId, reads: bool) -> Vec<ir::NodeId> {
    graph.nodes_where(|k| match k {
        NodeKind::Read { resource: r, .. } => reads && *r == resource,
        NodeKind::Write { resource: r, .. } => !reads && *r == resource,
        _ => false,
    })
}
