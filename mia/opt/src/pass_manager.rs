//! Registry of synthesis passes and the plans built from them.
use crate::traversal::{ConstructPass, Named, Pass};
use itertools::Itertools;
use mia_ir as ir;
use mia_utils::{Error, MultiError};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

pub type PassResult<T> = std::result::Result<T, MultiError>;

/// Runs one registered pass on the context.
pub type PassClosure = Box<dyn Fn(&mut ir::Context) -> PassResult<()>>;

/// Passes slower than this are reported at `warn` level.
const SLOW_PASS: Duration = Duration::from_secs(5);

struct Registered {
    run: PassClosure,
    help: String,
}

/// All known passes and aliases. Both are kept sorted by name so help
/// output is stable.
#[derive(Default)]
pub struct PassManager {
    passes: BTreeMap<String, Registered>,
    /// Aliases are stored fully expanded into pass names.
    aliases: BTreeMap<String, Vec<String>>,
}

/// Ordered pass names plus the set excluded from running.
struct Plan {
    order: Vec<String>,
    skip: BTreeSet<String>,
}

impl PassManager {
    /// Register `P` under its [Named::name].
    ///
    /// ## Example
    /// ```rust,ignore
    /// let mut pm = PassManager::default();
    /// pm.register_pass::<StageOrdering>()?;
    /// ```
    pub fn register_pass<P>(&mut self) -> PassResult<()>
    where
        P: Pass + ConstructPass + Named,
    {
        let name = P::name();
        if self.passes.contains_key(name) {
            return Err(Error::misc(format!("pass `{name}` is registered twice")).into());
        }
        let options = P::opts()
            .iter()
            .map(|o| {
                format!(
                    "\n  * {}: {} (default: {})",
                    o.name(),
                    o.description(),
                    o.default()
                )
            })
            .join("");
        let help = format!("- {name}: {}{options}", P::description());
        let run: PassClosure = Box::new(|ctx| P::do_pass_default(ctx).map_err(Into::into));
        self.passes.insert(name.to_string(), Registered { run, help });
        Ok(())
    }

    /// Name a sequence of passes. Entries may themselves be aliases, which
    /// are expanded on the spot, and run in the order listed.
    pub fn add_alias(&mut self, name: String, members: Vec<String>) -> PassResult<()> {
        if self.aliases.contains_key(&name) || self.passes.contains_key(&name) {
            return Err(Error::misc(format!("alias `{name}` clashes with a known name")).into());
        }
        let mut expanded = Vec::with_capacity(members.len());
        for m in members {
            match self.aliases.get(&m) {
                Some(passes) => expanded.extend(passes.iter().cloned()),
                None if self.passes.contains_key(&m) => expanded.push(m),
                None => {
                    return Err(Error::misc(format!(
                        "alias `{name}` refers to unknown pass `{m}`"
                    ))
                    .into());
                }
            }
        }
        self.aliases.insert(name, expanded);
        Ok(())
    }

    /// Help text for one pass or alias.
    pub fn specific_help(&self, name: &str) -> Option<String> {
        if let Some(pass) = self.passes.get(name) {
            return Some(pass.help.clone());
        }
        self.aliases.get(name).map(|passes| {
            format!(
                "`{name}` runs:\n{}",
                passes.iter().map(|p| format!("- {p}")).join("\n")
            )
        })
    }

    /// Help text listing every pass with its options, then every alias.
    pub fn complete_help(&self) -> String {
        let passes = self.passes.values().map(|p| p.help.as_str()).join("\n");
        let aliases = self
            .aliases
            .iter()
            .map(|(a, ps)| format!("- {a}: {}", ps.join(", ")))
            .join("\n");
        format!("Passes:\n{passes}\n\nAliases:\n{aliases}\n")
    }

    fn expand(&self, name: &str) -> PassResult<Vec<String>> {
        if let Some(passes) = self.aliases.get(name) {
            return Ok(passes.clone());
        }
        if self.passes.contains_key(name) {
            return Ok(vec![name.to_string()]);
        }
        Err(Error::misc(format!(
            "unknown pass `{name}`, see --list-passes for the registered ones"
        ))
        .into())
    }

    fn build_plan(&self, incl: &[String], excl: &[String], insn: &[String]) -> PassResult<Plan> {
        let mut order = Vec::new();
        for name in incl {
            order.extend(self.expand(name)?);
        }
        let mut skip = BTreeSet::new();
        for name in excl {
            skip.extend(self.expand(name)?);
        }

        // `before:after` moves `after` right behind `before` when it would
        // otherwise run first.
        for spec in insn {
            let Some((before, after)) = spec.split_once(':') else {
                log::warn!("ignoring insertion `{spec}` without a ':'");
                continue;
            };
            self.expand(before)?;
            self.expand(after)?;
            let pos = |p: &str| order.iter().position(|o| o == p);
            match (pos(before), pos(after)) {
                (Some(b), Some(a)) if !skip.contains(before) && !skip.contains(after) => {
                    if a < b {
                        let moved = order.remove(a);
                        order.insert(b, moved);
                    }
                }
                _ => log::warn!("`{spec}` names a pass that does not run, ignoring it"),
            }
        }
        Ok(Plan { order, skip })
    }

    /// The passes that would run for `incl`, `excl` and `insn`, in order.
    pub fn plan(&self, incl: &[String], excl: &[String], insn: &[String]) -> PassResult<Vec<String>> {
        let Plan { order, skip } = self.build_plan(incl, excl, insn)?;
        Ok(order.into_iter().filter(|p| !skip.contains(p)).collect())
    }

    /// Run the planned passes on `ctx`. With `dump_ir`, the context is
    /// printed to stdout after every pass.
    pub fn execute_plan(
        &self,
        ctx: &mut ir::Context,
        incl: &[String],
        excl: &[String],
        insn: &[String],
        dump_ir: bool,
    ) -> PassResult<()> {
        let Plan { order, skip } = self.build_plan(incl, excl, insn)?;
        for name in order {
            if skip.contains(&name) {
                log::info!("{name}: skipped");
                continue;
            }
            let Some(pass) = self.passes.get(&name) else {
                return Err(Error::internal(format!("planned pass `{name}` is not registered")).into());
            };
            let start = Instant::now();
            (pass.run)(ctx)?;
            let elapsed = start.elapsed();
            if dump_ir {
                println!("// after {name}");
                ir::Printer::write_context(ctx, &mut std::io::stdout())?;
            }
            if elapsed > SLOW_PASS {
                log::warn!("{name}: {}ms", elapsed.as_millis());
            } else {
                log::info!("{name}: {}ms", elapsed.as_millis());
            }
        }
        Ok(())
    }
}

/// Register an alias built from pass types or other alias names.
///
/// ## Example
/// ```rust,ignore
/// let mut pm = PassManager::default();
/// register_alias!(pm, "front", [DummyMia, StageOrdering, IpgCreation]);
/// ```
#[macro_export]
macro_rules! register_alias {
    (@name $pass:ident) => {
        $pass::name().to_string()
    };

    (@name $pass:literal) => {
        $pass.to_string()
    };

    ($manager:expr, $alias:literal, [ $($pass:tt),* $(,)? ]) => {
        $manager.add_alias($alias.to_string(), vec![
            $(register_alias!(@name $pass)),*
        ])?;
    };
}
