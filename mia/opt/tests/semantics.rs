//! The passes rewriting the IPG must not change what any instruction does.
mod fixture;

use fixture::after;
use mia_ir::eval::{Effect, Env, Target, eval_graph, eval_ipg};
use mia_ir::{self as ir, IndexRef, OutputId, ResourceId, SignalId};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Architectural state derived from a seed.
struct State(u64);

impl Env for State {
    fn read(&mut self, resource: ResourceId, address: Option<u64>) -> u64 {
        let r = (resource.index() as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        let a = address.unwrap_or(0).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        (self.0 ^ r ^ a).rotate_left(17)
    }
}

/// One instruction flowing through the synthesized stages with every stage
/// enabled. Latch values are handed from stage to stage.
struct Flow {
    state: State,
    enables: BTreeSet<SignalId>,
    latches: BTreeMap<OutputId, u64>,
}

impl Env for Flow {
    fn read(&mut self, resource: ResourceId, address: Option<u64>) -> u64 {
        self.state.read(resource, address)
    }

    fn stage_output(&mut self, output: OutputId) -> u64 {
        self.latches.get(&output).copied().unwrap_or(0)
    }

    fn signal(&mut self, signal: SignalId) -> u64 {
        u64::from(self.enables.contains(&signal))
    }
}

fn flow(enables: &[SignalId], seed: u64) -> Flow {
    Flow {
        state: State(seed),
        enables: enables.iter().copied().collect(),
        latches: BTreeMap::new(),
    }
}

fn resource_writes(effects: Vec<Effect>) -> Vec<Effect> {
    effects
        .into_iter()
        .filter(|e| matches!(e.target, Target::Resource(_)))
        .collect()
}

#[test]
fn inlined_stages_only_act_for_their_instructions() {
    let reference = after(&["front"]);
    let ipg = reference.ipg.as_ref().unwrap();
    let ctx = after(&["all"]);
    let mia = ctx.mia.as_ref().unwrap();
    let enables = &mia.control().unwrap().enables;
    let isa = ctx.isa.as_ref().unwrap();

    for (word, seed) in [(0x0031_0093, 7), (0xfe5f_0fe3, 11), (0x0040_a023, 0x5eed)] {
        for i in ipg.instructions().iter().copied() {
            let want = resource_writes(eval_ipg(ipg, i, word, &mut flow(enables, seed)).unwrap());

            let mut env = flow(enables, seed);
            let mut got = vec![];
            for s in mia.ordered() {
                let g = &mia.stages[s].behavior;
                for e in eval_graph(g, Some(i), word, |_| true, &mut env).unwrap() {
                    match e.target {
                        Target::Output(o) => {
                            env.latches.insert(o, e.value);
                        }
                        Target::Resource(_) => got.push(e),
                        _ => (),
                    }
                }
            }
            got.sort();
            let name = isa.instructions[i].name;
            assert_eq!(want, got, "writes of {name} on {word:#x}");
        }
    }
}

fn effects(ctx: &ir::Context, word: u64, seed: u64) -> Vec<Vec<Effect>> {
    let ipg = ctx.ipg.as_ref().unwrap();
    ipg.instructions()
        .iter()
        .map(|i| eval_ipg(ipg, *i, word, &mut State(seed)).unwrap())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn merge_and_optimization_preserve_effects(word in any::<u32>(), seed in any::<u64>()) {
        let created = after(&["front"]);
        let word = word as u64;
        let reference = effects(&created, word, seed);
        let plans: [&[&str]; 3] = [
            &["front", "mapping-creation", "ipg-merge"],
            &["front", "mapping-creation", "ipg-merge", "mapping-optimize"],
            &["front", "map"],
        ];
        for passes in plans {
            let ctx = after(passes);
            prop_assert_eq!(&reference, &effects(&ctx, word, seed), "after {:?}", passes);
        }
    }

    #[test]
    fn zero_register_is_never_written(rest in any::<u32>(), seed in any::<u64>()) {
        // rd = 0 for every format that has one
        let word = (rest & !(0x1f << 7)) as u64;
        let ctx = after(&["front", "map"]);
        let x = ctx.isa.as_ref().unwrap().find_resource("X".into()).unwrap();
        for effects in effects(&ctx, word, seed) {
            for e in effects {
                prop_assert!(e.target != Target::Resource(x));
            }
        }
    }
}
