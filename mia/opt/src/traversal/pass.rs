//! Interface implemented by every synthesis pass.
use super::{ConstructPass, Named};
use mia_ir::{self as ir, Artifact};
use mia_utils::{Error, MiaResult};

/// A synthesis pass transforms the [ir::Context].
///
/// Passes declare the [Artifact]s they need and the ones they leave behind.
/// [Pass::do_pass_default] checks the former before running the pass and
/// records the latter afterwards, so that running passes out of order is
/// reported instead of silently producing garbage.
pub trait Pass {
    /// Artifacts that must exist before the pass runs.
    fn requires() -> &'static [Artifact]
    where
        Self: Sized;

    /// Artifacts that exist after the pass ran.
    fn produces() -> &'static [Artifact]
    where
        Self: Sized,
    {
        &[]
    }

    /// Transform the context.
    fn run(&mut self, ctx: &mut ir::Context) -> MiaResult<()>;

    /// Check the required artifacts, construct the pass and run it.
    fn do_pass_default(ctx: &mut ir::Context) -> MiaResult<()>
    where
        Self: ConstructPass + Named + Sized,
    {
        for artifact in Self::requires() {
            if !ctx.has(*artifact) {
                return Err(missing::<Self>(*artifact));
            }
        }
        let mut pass = Self::from(ctx)?;
        pass.run(ctx)?;
        for artifact in Self::produces() {
            ctx.mark(*artifact);
        }
        Ok(())
    }
}

/// Inputs of the description are missing structure, anything else means
/// the pass was scheduled too early.
fn missing<P: Named>(artifact: Artifact) -> Error {
    match artifact {
        Artifact::Isa | Artifact::Mia => Error::missing_structure(format!(
            "`{}` needs a {}",
            P::name(),
            artifact.name()
        )),
        _ => Error::pass_assumption(
            P::name(),
            format!("the {} has not been computed", artifact.name()),
        ),
    }
}
