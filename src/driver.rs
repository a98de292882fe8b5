//! Driver for the pipeline synthesis passes.
use crate::cmdline::Opts;
use mia_ir as ir;
use mia_opt::pass_manager::{PassManager, PassResult};
use mia_utils::Error;
use std::fs::File;
use std::io::{self, Write};

/// Run the synthesis from the command line.
pub fn run_synthesis() -> PassResult<()> {
    let opts: Opts = argh::from_env();

    env_logger::Builder::new()
        .format_timestamp(None)
        .filter_level(opts.log_level)
        .target(env_logger::Target::Stderr)
        .init();

    let pm = PassManager::default_passes()?;

    // List the available passes and stop
    if opts.list_passes {
        println!("{}", pm.complete_help());
        return Ok(());
    }

    let Some(file) = &opts.file else {
        return Err(Error::misc("no input description given").into());
    };
    let (isa, mia) = mia_frontend::load_file(file)?;
    let mut ctx = ir::Context::new(isa, mia);
    ctx.extra_opts = opts.extra_opts.clone();

    let passes = opts.passes();
    let plan = pm.plan(&passes, &opts.disable_pass, &opts.insertions)?;
    log::info!("plan: {}", plan.join(", "));
    pm.execute_plan(
        &mut ctx,
        &passes,
        &opts.disable_pass,
        &opts.insertions,
        opts.dump_ir,
    )?;

    let mut out: Box<dyn Write> = match &opts.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout()),
    };
    write_result(&ctx, &mut out)?;
    Ok(())
}

/// Print the stage behaviors, the control unit and the hazard tables.
fn write_result<F: Write>(ctx: &ir::Context, out: &mut F) -> io::Result<()> {
    let printer = ir::Printer::new(ctx.isa.as_ref(), ctx.mia.as_ref());
    if let Some(mia) = &ctx.mia {
        printer.write_stages(mia, out)?;
        printer.write_logic(mia, out)?;
    }
    if let Some(isa) = &ctx.isa {
        printer.write_hazards(isa, out)?;
    }
    out.flush()
}
