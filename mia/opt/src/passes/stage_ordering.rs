use crate::traversal::{Named, Pass};
use itertools::Itertools;
use mia_ir::{self as ir, Artifact, MicroArchitecture, StageId};
use mia_utils::{Error, MiaResult};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet};

/// Orders the stages of the microarchitecture.
///
/// Stage `A` precedes stage `B` when `B` reads an output declared by `A`.
/// The stages must form a single linear chain: one entry stage, no stage
/// with two successors, every stage reachable from the entry and no cycles.
/// Sets [MicroArchitecture::order] and the `prev`/`next` links of every
/// stage.
#[derive(Default)]
pub struct StageOrdering;

impl Named for StageOrdering {
    fn name() -> &'static str {
        "stage-ordering"
    }

    fn description() -> &'static str {
        "order the pipeline stages into a linear chain"
    }
}

impl Pass for StageOrdering {
    fn requires() -> &'static [Artifact] {
        &[Artifact::Mia]
    }

    fn produces() -> &'static [Artifact] {
        &[Artifact::StageOrder]
    }

    fn run(&mut self, ctx: &mut ir::Context) -> MiaResult<()> {
        let Some(mia) = ctx.mia.as_mut() else {
            return Err(Error::missing_structure("no microarchitecture given"));
        };
        let order = chain(mia)?;
        log::debug!(
            target: Self::name(),
            "stage order: {}",
            order.iter().map(|s| mia.stages[*s].name).join(" -> ")
        );
        for (i, s) in order.iter().enumerate() {
            let stage = &mut mia.stages[*s];
            stage.prev = i.checked_sub(1).map(|p| order[p]);
            stage.next = order.get(i + 1).copied();
        }
        mia.order = order;
        Ok(())
    }
}

/// Compute the linear order of the stages.
fn chain(mia: &MicroArchitecture) -> MiaResult<Vec<StageId>> {
    if mia.stages.is_empty() {
        return Err(Error::missing_structure(format!(
            "`{}` declares no stages",
            mia.name
        )));
    }
    let mut graph: DiGraph<StageId, ()> = DiGraph::new();
    let index: BTreeMap<StageId, NodeIndex> = mia
        .stages
        .keys()
        .map(|s| (s, graph.add_node(s)))
        .collect();
    let mut edges = BTreeSet::new();
    for (b, stage) in mia.stages.iter() {
        for o in stage.inputs() {
            let a = mia.outputs[o].stage;
            if a == b {
                return Err(Error::topology(format!(
                    "stage `{}` reads its own output `{}`",
                    stage.name, mia.outputs[o].name
                )));
            }
            if edges.insert((a, b)) {
                graph.add_edge(index[&a], index[&b], ());
            }
        }
    }
    let name = |n: NodeIndex| mia.stages[graph[n]].name;

    let entries: Vec<_> = graph
        .node_indices()
        .filter(|n| graph.neighbors_directed(*n, Direction::Incoming).next().is_none())
        .collect();
    let entry = match entries.as_slice() {
        [] => {
            return Err(Error::topology(
                "no entry stage: every stage reads an output of another stage",
            ));
        }
        [entry] => *entry,
        many => {
            return Err(Error::topology(format!(
                "several entry stages: {}",
                many.iter().map(|n| name(*n)).join(", ")
            )));
        }
    };
    for n in graph.node_indices() {
        let succs: Vec<_> = graph
            .neighbors_directed(n, Direction::Outgoing)
            .map(name)
            .sorted()
            .collect();
        if succs.len() > 1 {
            return Err(Error::topology(format!(
                "stage `{}` branches to {}",
                name(n),
                succs.iter().join(", ")
            )));
        }
    }

    let mut order = vec![];
    let mut visited = BTreeSet::new();
    let mut cur = Some(entry);
    while let Some(n) = cur {
        if !visited.insert(n) {
            return Err(Error::topology(format!(
                "stages form a cycle through `{}`",
                name(n)
            )));
        }
        order.push(graph[n]);
        cur = graph.neighbors_directed(n, Direction::Outgoing).next();
    }
    if order.len() != mia.stages.len() {
        let unreachable = graph
            .node_indices()
            .filter(|n| !visited.contains(n))
            .map(name)
            .join(", ");
        let msg = if petgraph::algo::is_cyclic_directed(&graph) {
            format!("stages {unreachable} form a cycle unreachable from the entry")
        } else {
            format!("stages {unreachable} are unreachable from the entry")
        };
        return Err(Error::topology(msg));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mia_ir::{Builder, MiaBuiltIn, Stage, Type};
    use mia_utils::ErrorKind;
    use proptest::prelude::*;

    /// A MiA whose stage `i` reads the output of stage `edges[i]`.
    fn mia(count: usize, edges: &[(usize, usize)]) -> MicroArchitecture {
        let mut mia = MicroArchitecture::new("m");
        let stages: Vec<_> = (0..count)
            .map(|i| mia.add_stage(Stage::new(format!("S{i}"))))
            .collect();
        let outputs: Vec<_> = stages
            .iter()
            .map(|s| {
                let name = mia.stages[*s].name.append("ir");
                mia.add_output(*s, name, Type::Instruction)
            })
            .collect();
        for (from, to) in edges {
            let mut b = Builder::new(&mut mia.stages[stages[*to]].behavior);
            let ir = b.read_output(outputs[*from], Type::Instruction);
            b.mia_call(MiaBuiltIn::Compute, &[ir], &[], None);
        }
        mia
    }

    fn topology_error(mia: &MicroArchitecture) -> String {
        match chain(mia).unwrap_err().kind() {
            ErrorKind::Topology(msg) => msg.clone(),
            other => panic!("expected a topology error, got {other}"),
        }
    }

    #[test]
    fn rejects_malformed_chains() {
        assert!(topology_error(&mia(2, &[(0, 1), (1, 0)])).contains("no entry"));
        assert!(topology_error(&mia(3, &[(0, 2)])).contains("several entry"));
        assert!(topology_error(&mia(3, &[(0, 1), (0, 2)])).contains("branches"));
        assert!(
            topology_error(&mia(4, &[(0, 1), (2, 3), (3, 2)])).contains("cycle unreachable")
        );
        assert!(topology_error(&mia(3, &[(0, 1), (1, 2), (2, 1)])).contains("cycle through"));
    }

    #[test]
    fn sets_links() {
        let mut ctx = ir::Context::default();
        ctx.mia = Some(mia(3, &[(2, 0), (0, 1)]));
        StageOrdering.run(&mut ctx).unwrap();
        let mia = ctx.mia.unwrap();
        let order: Vec<_> = mia.order.iter().map(|s| mia.stages[*s].name.to_string()).collect();
        assert_eq!(order, ["S2", "S0", "S1"]);
        assert_eq!(mia.stages[mia.order[1]].prev, Some(mia.order[0]));
        assert_eq!(mia.stages[mia.order[1]].next, Some(mia.order[2]));
        assert_eq!(mia.stages[mia.order[0]].prev, None);
    }

    proptest! {
        #[test]
        fn any_declared_chain_is_recovered(perm in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle()) {
            // perm[k] is the declaration index of the k-th stage of the chain
            let edges: Vec<_> = perm.windows(2).map(|w| (w[0], w[1])).collect();
            let mia = mia(perm.len(), &edges);
            let order = chain(&mia).unwrap();
            let got: Vec<_> = order.iter().map(|s| s.to_string()).collect();
            let want: Vec<_> = perm.iter().map(|i| format!("stage{i}")).collect();
            prop_assert_eq!(got, want);
        }
    }
}
