//! Descriptions the passes reject, and passes run out of order.
mod fixture;

use fixture::{after, context, rv, run};
use mia_ir::{
    self as ir, Builder, Isa, Mapping, MiaBuiltIn, MicroArchitecture, NodeId,
    OutputId, Resource, ResourceId, ResourceKind, Stage, Type,
};
use mia_utils::{Error, ErrorKind};

fn error_of(ctx: &mut ir::Context, passes: &[&str]) -> Error {
    let errors = run(ctx, passes).unwrap_err().into_errors();
    assert_eq!(errors.len(), 1);
    errors.into_iter().next().unwrap()
}

/// Three stages F, D and E. `decode` fills D from the fetched word and may
/// write the instruction output `D_ir`. E does everything but writing the
/// register file back.
fn short_pipeline<F>(isa: &Isa, decode: F) -> MicroArchitecture
where
    F: FnOnce(&mut Builder, NodeId, OutputId, ResourceId),
{
    let x = isa.find_resource("X".into()).unwrap();
    let mem = isa.find_resource("MEM".into()).unwrap();
    let pc = isa.pc.unwrap();
    let mut mia = MicroArchitecture::new("short");
    let f = mia.add_stage(Stage::new("F"));
    let d = mia.add_stage(Stage::new("D"));
    let e = mia.add_stage(Stage::new("E"));
    let fr = mia.add_output(f, "F_fr", Type::FetchResult);
    let ir = mia.add_output(d, "D_ir", Type::Instruction);
    {
        let mut b = Builder::new(&mut mia.stages[f].behavior);
        let next = b.mia_call(MiaBuiltIn::FetchNext, &[], &[], None);
        b.write_output(fr, next, None);
    }
    {
        let mut b = Builder::new(&mut mia.stages[d].behavior);
        let word = b.read_output(fr, Type::FetchResult);
        decode(&mut b, word, ir, x);
    }
    {
        let mut b = Builder::new(&mut mia.stages[e].behavior);
        let i = b.read_output(ir, Type::Instruction);
        let i = b.mia_call(MiaBuiltIn::Read, &[i], &[pc], None);
        let i = b.mia_call(MiaBuiltIn::Compute, &[i], &[], None);
        let i = b.mia_call(MiaBuiltIn::Write, &[i], &[pc], None);
        let i = b.mia_call(MiaBuiltIn::Write, &[i], &[mem], None);
        b.mia_call(MiaBuiltIn::Read, &[i], &[mem], None);
    }
    mia
}

/// Fetch, decode and read the register file, then do everything but
/// writing it back.
fn no_write_back(isa: &Isa) -> MicroArchitecture {
    short_pipeline(isa, |b, word, ir, x| {
        let i = b.mia_call(MiaBuiltIn::Decode, &[word], &[], None);
        let i = b.mia_call(MiaBuiltIn::ReadOrForward, &[i], &[x], None);
        b.write_output(ir, i, None);
    })
}

fn unmapped(err: &Error) -> (&str, &str) {
    let ErrorKind::Unmapped { stage, msg } = err.kind() else {
        panic!("unexpected error: {err}");
    };
    (stage.as_str(), msg.as_str())
}

#[test]
fn passes_out_of_order() {
    let mut ctx = context();
    let err = error_of(&mut ctx, &["mapping-creation"]);
    assert!(matches!(
        err.kind(),
        ErrorKind::PassAssumption { pass, .. } if pass == "mapping-creation"
    ));

    let mut ctx = after(&["front", "mapping-creation"]);
    let err = error_of(&mut ctx, &["mapping-inline"]);
    assert!(matches!(err.kind(), ErrorKind::PassAssumption { .. }));
}

#[test]
fn control_logic_is_synthesized_once() {
    let mut ctx = after(&["all"]);
    let err = error_of(&mut ctx, &["control-logic"]);
    assert!(matches!(err.kind(), ErrorKind::PassAssumption { .. }));
}

#[test]
fn missing_microarchitecture() {
    let mut ctx = context();
    let err = error_of(&mut ctx, &["stage-ordering"]);
    assert!(matches!(err.kind(), ErrorKind::MissingStructure(_)));
}

#[test]
fn default_pipeline_needs_a_register_file() {
    let mut isa = Isa::new("acc", 16);
    let pc = isa.add_resource(Resource::new("PC", ResourceKind::Register, None, 16));
    isa.pc = Some(pc);
    let mut ctx = ir::Context::new(isa, None);
    let err = error_of(&mut ctx, &["dummy-mia"]);
    assert!(matches!(err.kind(), ErrorKind::MissingStructure(_)));
}

#[test]
fn lowering_needs_decode() {
    let mut ctx = after(&["front", "mapping-creation"]);
    ctx.mapping = Some(Mapping::new());
    let err = error_of(&mut ctx, &["ipg-lower"]);
    assert!(matches!(err.kind(), ErrorKind::MissingStructure(_)));
}

#[test]
fn unmapped_writes_are_reported() {
    let isa = rv().isa;
    let mia = no_write_back(&isa);
    let mut ctx = ir::Context::new(isa, Some(mia));
    let err = error_of(&mut ctx, &["front", "mapping-creation"]);
    let (stage, msg) = unmapped(&err);
    assert_eq!(stage, "E");
    assert!(msg.contains("write X"), "{msg}");
    assert!(msg.contains("ADD"), "{msg}");
}

#[test]
fn instruction_outputs_must_be_written() {
    let isa = rv().isa;
    let mia = short_pipeline(&isa, |b, word, _, x| {
        let i = b.mia_call(MiaBuiltIn::Decode, &[word], &[], None);
        b.mia_call(MiaBuiltIn::ReadOrForward, &[i], &[x], None);
    });
    let mut ctx = ir::Context::new(isa, Some(mia));
    let err = error_of(&mut ctx, &["front", "mapping-creation"]);
    let (stage, msg) = unmapped(&err);
    assert_eq!(stage, "E");
    assert!(msg.contains("`D_ir`"), "{msg}");
    assert!(ctx.mapping.is_none());
}

#[test]
fn operations_need_traceable_progress() {
    let isa = rv().isa;
    let mia = short_pipeline(&isa, |b, word, ir, x| {
        let i = b.mia_call(MiaBuiltIn::Decode, &[word], &[], None);
        let yes = b.bool(true);
        let muxed = b.select(yes, i, i);
        let i = b.mia_call(MiaBuiltIn::ReadOrForward, &[muxed], &[x], None);
        b.write_output(ir, i, None);
    });
    let mut ctx = ir::Context::new(isa, Some(mia));
    let err = error_of(&mut ctx, &["front", "mapping-creation"]);
    let (stage, msg) = unmapped(&err);
    assert_eq!(stage, "D");
    assert!(msg.contains("waits for instruction progress"), "{msg}");
}

#[test]
fn disconnected_stages() {
    let mut mia = MicroArchitecture::new("split");
    mia.add_stage(Stage::new("A"));
    mia.add_stage(Stage::new("B"));
    let mut ctx = ir::Context::new(rv().isa, Some(mia));
    let err = error_of(&mut ctx, &["stage-ordering"]);
    assert!(matches!(err.kind(), ErrorKind::Topology(_)));
}

#[test]
fn unknown_passes() {
    let mut ctx = context();
    let err = error_of(&mut ctx, &["no-such-pass"]);
    assert!(matches!(err.kind(), ErrorKind::Misc(_)));
}
