//! Command line parsing for the pipeline synthesis driver.
use argh::FromArgs;
use std::path::PathBuf;

#[derive(FromArgs)]
#[argh(help_triggers("-h", "--help"))]
/// Synthesize a pipelined processor from an instruction set and a
/// microarchitecture description.
pub struct Opts {
    /// input description (JSON)
    #[argh(positional)]
    pub file: Option<PathBuf>,

    /// output file, default is stdout
    #[argh(option, short = 'o')]
    pub output: Option<PathBuf>,

    /// run this pass or alias. Defaults to `all`
    #[argh(option, short = 'p', long = "pass")]
    pub pass: Vec<String>,

    /// disable pass or alias
    #[argh(option, short = 'd', long = "disable-pass")]
    pub disable_pass: Vec<String>,

    /// extra options passed to passes, in the form `pass:opt=val`
    #[argh(option, short = 'x', long = "extra-opt")]
    pub extra_opts: Vec<String>,

    /// run `after` right after `before`, in the form `before:after`
    #[argh(option, short = 'i', long = "insert")]
    pub insertions: Vec<String>,

    /// print the IR after every pass
    #[argh(switch, long = "dump-ir")]
    pub dump_ir: bool,

    /// list all the passes and aliases
    #[argh(switch, long = "list-passes")]
    pub list_passes: bool,

    /// logging level
    #[argh(option, short = 'l', long = "log-level", default = "log::LevelFilter::Warn")]
    pub log_level: log::LevelFilter,
}

impl Opts {
    /// Passes to run. `all` when none are given.
    pub fn passes(&self) -> Vec<String> {
        if self.pass.is_empty() {
            vec!["all".to_string()]
        } else {
            self.pass.clone()
        }
    }
}
