use crate::traversal::{Named, Pass};
use mia_ir::{
    self as ir, Artifact, Builder, Logic, MiaBuiltIn, MicroArchitecture,
    ResourceKind, Stage, Type,
};
use mia_utils::{Error, MiaResult};

/// Installs the classic five-stage pipeline when the description does not
/// declare a microarchitecture:
///
/// ```text
/// FETCH       fetch_next
/// DECODE      decode, address(@X), read_or_forward(@X)
/// EXECUTE     read(@PC), compute, verify, write(@PC), results(@X)
/// MEMORY      write(@MEM), read(@MEM)
/// WRITE_BACK  write(@X)
/// ```
///
/// `X` is the first register file, `MEM` the first memory (if any) and `PC`
/// the program counter of the ISA.
#[derive(Default)]
pub struct DummyMia;

impl Named for DummyMia {
    fn name() -> &'static str {
        "dummy-mia"
    }

    fn description() -> &'static str {
        "install a five-stage microarchitecture if none is declared"
    }
}

impl Pass for DummyMia {
    fn requires() -> &'static [Artifact] {
        &[Artifact::Isa]
    }

    fn produces() -> &'static [Artifact] {
        &[Artifact::Mia]
    }

    fn run(&mut self, ctx: &mut ir::Context) -> MiaResult<()> {
        if ctx.mia.is_some() {
            log::debug!(target: Self::name(), "microarchitecture already declared");
            return Ok(());
        }
        let mia = five_stage(ctx.isa()?)?;
        log::info!(target: Self::name(), "using the default five-stage pipeline");
        ctx.mia = Some(mia);
        Ok(())
    }
}

fn five_stage(isa: &ir::Isa) -> MiaResult<MicroArchitecture> {
    let x = isa
        .resources_of_kind(ResourceKind::RegisterFile)
        .next()
        .ok_or_else(|| {
            Error::missing_structure(format!(
                "`{}` has no register file for the default pipeline",
                isa.name
            ))
        })?;
    let pc = isa.pc.ok_or_else(|| {
        Error::missing_structure(format!(
            "`{}` has no program counter for the default pipeline",
            isa.name
        ))
    })?;
    let mem = isa.resources_of_kind(ResourceKind::Memory).next();

    let mut mia = MicroArchitecture::new(format!("{}_pipeline", isa.name));
    let bypass = mia.logic.push(Logic::Forwarding {
        name: "bypass".into(),
    });
    let predict = mia.logic.push(Logic::BranchPrediction {
        name: "predict".into(),
    });
    let names = ["FETCH", "DECODE", "EXECUTE", "MEMORY", "WRITE_BACK"];
    let stages: Vec<_> = names
        .iter()
        .map(|n| mia.add_stage(Stage::new(*n)))
        .collect();
    let fetched = mia.add_output(stages[0], "FETCH_fr", Type::FetchResult);
    let decoded = mia.add_output(stages[1], "DECODE_ir", Type::Instruction);
    let executed = mia.add_output(stages[2], "EXECUTE_ir", Type::Instruction);
    let accessed = mia.add_output(stages[3], "MEMORY_ir", Type::Instruction);

    {
        let mut b = Builder::new(&mut mia.stages[stages[0]].behavior);
        let fr = b.mia_call(MiaBuiltIn::FetchNext, &[], &[], None);
        b.write_output(fetched, fr, None);
    }
    {
        let mut b = Builder::new(&mut mia.stages[stages[1]].behavior);
        let fr = b.read_output(fetched, Type::FetchResult);
        let ir = b.mia_call(MiaBuiltIn::Decode, &[fr], &[], None);
        let ir = b.mia_call(MiaBuiltIn::Address, &[ir], &[x], None);
        let ir = b.mia_call(MiaBuiltIn::ReadOrForward, &[ir], &[x], Some(bypass));
        b.write_output(decoded, ir, None);
    }
    {
        let mut b = Builder::new(&mut mia.stages[stages[2]].behavior);
        let ir = b.read_output(decoded, Type::Instruction);
        let ir = b.mia_call(MiaBuiltIn::Read, &[ir], &[pc], None);
        let ir = b.mia_call(MiaBuiltIn::Compute, &[ir], &[], None);
        let ir = b.mia_call(MiaBuiltIn::Verify, &[ir], &[], Some(predict));
        let ir = b.mia_call(MiaBuiltIn::Write, &[ir], &[pc], None);
        let ir = b.mia_call(MiaBuiltIn::Results, &[ir], &[x], None);
        b.write_output(executed, ir, None);
    }
    {
        let mut b = Builder::new(&mut mia.stages[stages[3]].behavior);
        let mut ir = b.read_output(executed, Type::Instruction);
        if let Some(mem) = mem {
            ir = b.mia_call(MiaBuiltIn::Write, &[ir], &[mem], None);
            ir = b.mia_call(MiaBuiltIn::Read, &[ir], &[mem], None);
        }
        b.write_output(accessed, ir, None);
    }
    {
        let mut b = Builder::new(&mut mia.stages[stages[4]].behavior);
        let ir = b.read_output(accessed, Type::Instruction);
        b.mia_call(MiaBuiltIn::Write, &[ir], &[x], None);
    }
    Ok(mia)
}
