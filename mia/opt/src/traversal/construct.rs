use super::Pass;
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use mia_ir as ir;
use mia_utils::MiaResult;

#[derive(Clone, Debug, PartialEq, Eq)]
/// The value returned from parsing an option.
pub enum ParseVal {
    /// A boolean option.
    Bool(bool),
    /// A number option.
    Num(i64),
}

impl ParseVal {
    /// The boolean value. Non-boolean values count as `false`.
    pub fn bool(&self) -> bool {
        matches!(self, ParseVal::Bool(true))
    }

    pub fn num(&self) -> Option<i64> {
        match self {
            ParseVal::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn pos_num(&self) -> Option<u64> {
        self.num().and_then(|n| u64::try_from(n).ok())
    }
}

impl std::fmt::Display for ParseVal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseVal::Bool(b) => write!(f, "{b}"),
            ParseVal::Num(n) => write!(f, "{n}"),
        }
    }
}

/// Option that can be passed to a pass.
pub struct PassOpt {
    name: &'static str,
    description: &'static str,
    default: ParseVal,
    parse: fn(&str) -> Option<ParseVal>,
}

impl PassOpt {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        default: ParseVal,
        parse: fn(&str) -> Option<ParseVal>,
    ) -> Self {
        Self {
            name,
            description,
            default,
            parse,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn description(&self) -> &'static str {
        self.description
    }

    pub const fn default(&self) -> &ParseVal {
        &self.default
    }

    fn parse(&self, s: &str) -> Option<ParseVal> {
        (self.parse)(s)
    }

    pub fn parse_bool(s: &str) -> Option<ParseVal> {
        match s {
            "true" => Some(ParseVal::Bool(true)),
            "false" => Some(ParseVal::Bool(false)),
            _ => None,
        }
    }

    /// Parse a number from a string.
    pub fn parse_num(s: &str) -> Option<ParseVal> {
        s.parse::<i64>().ok().map(ParseVal::Num)
    }
}

/// Static description of a pass: the name it is registered under, a line
/// of help and its options.
pub trait Named {
    fn name() -> &'static str;
    fn description() -> &'static str;
    /// Options accepted through `-x`.
    fn opts() -> Vec<PassOpt> {
        vec![]
    }
}

/// Construction of a pass from the [ir::Context]. Passes implementing
/// [Default] get it for free.
pub trait ConstructPass {
    /// Values of every option of this pass. Options are taken from
    /// `-x pass:opt=val` entries, a bare `-x pass:opt` sets a flag, and
    /// anything not given keeps its default.
    fn get_opts(ctx: &ir::Context) -> LinkedHashMap<&'static str, ParseVal>
    where
        Self: Named,
    {
        let pass = Self::name();
        let opts = Self::opts();
        let mut values: LinkedHashMap<&'static str, ParseVal> = opts
            .iter()
            .map(|o| (o.name(), o.default().clone()))
            .collect();
        let given = ctx
            .extra_opts
            .iter()
            .filter_map(|o| o.strip_prefix(pass)?.strip_prefix(':'));
        for setting in given {
            let (name, raw) = setting
                .split_once('=')
                .map_or((setting, None), |(n, v)| (n, Some(v)));
            let Some(opt) = opts.iter().find(|o| o.name() == name) else {
                log::warn!("`{pass}` has no option `{name}`, ignoring it");
                continue;
            };
            match raw.map_or(Some(ParseVal::Bool(true)), |v| opt.parse(v)) {
                Some(val) => {
                    values.insert(opt.name(), val);
                }
                None => log::warn!(
                    "`{pass}:{name}` cannot be set to `{}`, keeping {}",
                    raw.unwrap_or_default(),
                    opt.default()
                ),
            }
        }
        log::debug!(
            target: pass,
            "options: {}",
            values.iter().map(|(o, v)| format!("{o}={v}")).join(", ")
        );
        values
    }

    /// Build the pass, usually from its options.
    fn from(ctx: &ir::Context) -> MiaResult<Self>
    where
        Self: Sized;
}

impl<T: Default + Sized + Pass> ConstructPass for T {
    fn from(_ctx: &ir::Context) -> MiaResult<Self> {
        Ok(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mia_ir::Artifact;

    struct WithOpts;

    impl Named for WithOpts {
        fn name() -> &'static str {
            "with-opts"
        }

        fn description() -> &'static str {
            "test pass"
        }

        fn opts() -> Vec<PassOpt> {
            vec![
                PassOpt::new("flag", "a flag", ParseVal::Bool(false), PassOpt::parse_bool),
                PassOpt::new("rounds", "a number", ParseVal::Num(8), PassOpt::parse_num),
            ]
        }
    }

    impl ConstructPass for WithOpts {
        fn from(_ctx: &ir::Context) -> MiaResult<Self> {
            Ok(WithOpts)
        }
    }

    impl Pass for WithOpts {
        fn requires() -> &'static [Artifact] {
            &[]
        }

        fn run(&mut self, _ctx: &mut ir::Context) -> MiaResult<()> {
            Ok(())
        }
    }

    #[test]
    fn options_are_parsed_with_defaults() {
        let mut ctx = ir::Context::default();
        ctx.extra_opts = vec![
            "with-opts:flag".to_string(),
            "with-opts:unknown=1".to_string(),
            "other:rounds=3".to_string(),
        ];
        let opts = WithOpts::get_opts(&ctx);
        assert!(opts["flag"].bool());
        assert_eq!(opts["rounds"].pos_num(), Some(8));
        assert_eq!(opts.len(), 2);
    }

    #[test]
    fn invalid_values_fall_back_to_default() {
        let mut ctx = ir::Context::default();
        ctx.extra_opts = vec!["with-opts:rounds=many".to_string()];
        let opts = WithOpts::get_opts(&ctx);
        assert_eq!(opts["rounds"], ParseVal::Num(8));
    }
}
