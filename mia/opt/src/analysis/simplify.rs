//! Canonicalization and local simplification of the instruction progress
//! graph.
//!
//! Rewrites never create new non-constant nodes, so a mapping stays total
//! after simplification once [mia_ir::Mapping::clean] dropped the deleted
//! nodes and released the constants.
use mia_ir::{
    BuiltIn, Ipg, Mapping, MicroArchitecture, NodeId, NodeKind, Value,
};
use mia_utils::MiaResult;
use std::collections::BTreeSet;

/// Where IPG nodes are placed. Used to decide which copy of a duplicate
/// survives and whether merging the two widens any pipeline latch.
#[derive(Clone, Copy)]
pub struct Placement<'a> {
    pub mapping: &'a Mapping,
    pub mia: &'a MicroArchitecture,
}

impl<'a> Placement<'a> {
    pub fn new(mapping: &'a Mapping, mia: &'a MicroArchitecture) -> Self {
        Self { mapping, mia }
    }

    pub fn rank(&self, n: NodeId) -> Option<usize> {
        self.mapping.stage_of(n).map(|s| self.mia.rank(s))
    }

    /// Last stage using `n`, ignoring `except`.
    fn last_use(&self, ipg: &Ipg, n: NodeId, except: Option<NodeId>) -> Option<usize> {
        ipg.graph
            .users(n)
            .into_iter()
            .filter(|u| Some(*u) != except)
            .filter_map(|u| self.rank(u))
            .max()
    }

    /// Change of the total latch width if `drop` is replaced by `keep`.
    fn merge_delta(&self, ipg: &Ipg, keep: NodeId, drop: NodeId) -> i64 {
        let (Some(rk), Some(rd)) = (self.rank(keep), self.rank(drop)) else {
            return 0;
        };
        let span = |r: usize, last: usize, w: u32| (last.saturating_sub(r) as i64) * w as i64;
        let w = ipg.graph.width(keep);
        let lk = self.last_use(ipg, keep, None).unwrap_or(rk).max(rk);
        let ld = self.last_use(ipg, drop, None).unwrap_or(rd).max(rd);
        let mut before = span(rk, lk, w) + span(rd, ld, w);
        let mut after = span(rk, lk.max(ld), w);
        let inputs: BTreeSet<_> = ipg.graph.inputs(drop).into_iter().collect();
        for x in inputs {
            let Some(rx) = self.rank(x) else { continue };
            let wx = ipg.graph.width(x);
            let with = self.last_use(ipg, x, None).unwrap_or(rx).max(rx);
            let without = self.last_use(ipg, x, Some(drop)).unwrap_or(rx).max(rx);
            before += span(rx, with, wx);
            after += span(rx, without, wx);
        }
        after - before
    }
}

enum Rewrite {
    Node(NodeId),
    Const(Value),
}

fn is_commutative(op: BuiltIn) -> bool {
    matches!(
        op,
        BuiltIn::Add
            | BuiltIn::Mul
            | BuiltIn::And
            | BuiltIn::Or
            | BuiltIn::Xor
            | BuiltIn::Eq
            | BuiltIn::Neq
    )
}

/// Order the arguments of commutative operations: non-constants by index,
/// then constants.
fn canonicalize(ipg: &mut Ipg, n: NodeId) -> bool {
    let g = &ipg.graph;
    let NodeKind::BuiltIn { op, args } = g.kind(n) else {
        return false;
    };
    if !is_commutative(*op) || args.len() != 2 {
        return false;
    }
    let (a, b) = (args[0], args[1]);
    let key = |x: NodeId| (g.is_const(x), x);
    if key(a) <= key(b) {
        return false;
    }
    ipg.graph.modify(n, |kind| {
        if let NodeKind::BuiltIn { args, .. } = kind {
            args.swap(0, 1);
        }
    });
    true
}

fn rewrite(ipg: &Ipg, n: NodeId) -> Option<Rewrite> {
    let g = &ipg.graph;
    let ty = g.ty(n);
    let keep = |x: NodeId| (g.ty(x) == ty).then_some(Rewrite::Node(x));
    match g.kind(n) {
        NodeKind::BuiltIn { op, args } => {
            let consts: Option<Vec<Value>> =
                args.iter().map(|a| g.as_const(*a)).collect();
            if let Some(values) = consts {
                return Some(Rewrite::Const(op.eval(&values, ty)));
            }
            identity(ipg, *op, args, ty.width()).and_then(|r| match r {
                Rewrite::Node(x) => keep(x),
                c => Some(c),
            })
        }
        NodeKind::Cast { op, arg } => {
            g.as_const(*arg).map(|v| Rewrite::Const(op.eval(v, ty)))
        }
        NodeKind::Select { cond, then, els } => {
            if then == els {
                return keep(*then);
            }
            let c = g.as_const(*cond)?;
            keep(if c.is_true() { *then } else { *els })
        }
        NodeKind::SelectByInstruction { arms, selection } => {
            let first = arms.first()?.value;
            if arms.iter().all(|a| a.value == first) {
                return keep(first);
            }
            let sel = g.as_const((*selection)?)?;
            let arm = arms
                .iter()
                .enumerate()
                .find(|(k, _)| *k < 64 && sel.bits() >> k & 1 == 1)?;
            keep(arm.1.value)
        }
        NodeKind::OneHot(values) => {
            let mut bits = 0u64;
            for (k, v) in values.iter().enumerate() {
                if g.as_const(*v)?.is_true() && k < 64 {
                    bits |= 1 << k;
                }
            }
            Some(Rewrite::Const(Value::new(bits, ty.width())))
        }
        NodeKind::IsInstruction(set) => {
            if set.is_superset(ipg.instructions()) {
                Some(Rewrite::Const(Value::bool(true)))
            } else if set.is_empty() {
                Some(Rewrite::Const(Value::bool(false)))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Algebraic identities with one constant operand and double negation.
fn identity(ipg: &Ipg, op: BuiltIn, args: &[NodeId], width: u32) -> Option<Rewrite> {
    let g = &ipg.graph;
    let zero = Rewrite::Const(Value::new(0, width));
    if let [x] = args {
        let NodeKind::BuiltIn { op: inner, args } = g.kind(*x) else {
            return None;
        };
        return match (op, inner, args.as_slice()) {
            (BuiltIn::Not, BuiltIn::Not, [y]) | (BuiltIn::Neg, BuiltIn::Neg, [y]) => {
                Some(Rewrite::Node(*y))
            }
            _ => None,
        };
    }
    let [a, b] = args else {
        return None;
    };
    let (ca, cb) = (g.as_const(*a), g.as_const(*b));
    let is = |c: Option<Value>, f: fn(&Value) -> bool| c.as_ref().is_some_and(f);
    let one = |v: &Value| v.bits() == 1;
    match op {
        BuiltIn::Add | BuiltIn::Or | BuiltIn::Xor if is(cb, Value::is_zero) => {
            Some(Rewrite::Node(*a))
        }
        BuiltIn::Add | BuiltIn::Or | BuiltIn::Xor if is(ca, Value::is_zero) => {
            Some(Rewrite::Node(*b))
        }
        BuiltIn::Or if is(ca, Value::is_ones) || is(cb, Value::is_ones) => {
            Some(Rewrite::Const(Value::new(u64::MAX, width)))
        }
        BuiltIn::Sub | BuiltIn::Shl | BuiltIn::Lshr | BuiltIn::Ashr
            if is(cb, Value::is_zero) =>
        {
            Some(Rewrite::Node(*a))
        }
        BuiltIn::Mul | BuiltIn::And
            if is(ca, Value::is_zero) || is(cb, Value::is_zero) =>
        {
            Some(zero)
        }
        BuiltIn::Mul if is(cb, one) => Some(Rewrite::Node(*a)),
        BuiltIn::Mul if is(ca, one) => Some(Rewrite::Node(*b)),
        BuiltIn::And if is(cb, Value::is_ones) => Some(Rewrite::Node(*a)),
        BuiltIn::And if is(ca, Value::is_ones) => Some(Rewrite::Node(*b)),
        BuiltIn::UDiv | BuiltIn::SDiv if is(cb, one) => Some(Rewrite::Node(*a)),
        BuiltIn::URem | BuiltIn::SRem if is(cb, one) => Some(zero),
        _ => None,
    }
}

/// Replace `old` by `new` and delete the inputs of `old` left unused.
fn replace(ipg: &mut Ipg, old: NodeId, new: NodeId) -> MiaResult<()> {
    let inputs = ipg.graph.inputs(old);
    ipg.replace_and_delete(old, new)?;
    for input in inputs {
        ipg.delete_unused(input)?;
    }
    Ok(())
}

/// Merge structurally equal pure nodes. With a placement the copy computed
/// in the earliest stage survives, and copies whose merge would widen the
/// pipeline latches are kept apart.
pub fn dedup(ipg: &mut Ipg, placement: Option<Placement>) -> MiaResult<usize> {
    let mut merged = 0;
    for n in ipg.graph.topo_order() {
        if !ipg.graph.is_live(n) {
            continue;
        }
        let Some(m) = ipg.graph.find_duplicate(n) else {
            continue;
        };
        let (keep, drop) = match placement {
            Some(p) => {
                let key = |x: NodeId| (p.rank(x).unwrap_or(usize::MAX), x);
                let (keep, drop) = if key(m) <= key(n) { (m, n) } else { (n, m) };
                if p.merge_delta(ipg, keep, drop) > 0 {
                    log::trace!("keeping duplicates {keep} and {drop} apart");
                    continue;
                }
                (keep, drop)
            }
            None => (n.min(m), n.max(m)),
        };
        log::trace!("merging duplicate {drop} into {keep}");
        replace(ipg, drop, keep)?;
        merged += 1;
    }
    Ok(merged)
}

/// Canonicalize, fold constants and apply the rewrite rules until nothing
/// changes. Returns the number of rewrites.
pub fn simplify(ipg: &mut Ipg, placement: Option<Placement>) -> MiaResult<usize> {
    let mut total = 0;
    loop {
        let mut changed = 0;
        for n in ipg.graph.topo_order() {
            if !ipg.graph.is_live(n) {
                continue;
            }
            if canonicalize(ipg, n) {
                changed += 1;
            }
            let target = match rewrite(ipg, n) {
                None => continue,
                Some(Rewrite::Node(x)) => x,
                Some(Rewrite::Const(v)) => {
                    let ty = ipg.graph.ty(n);
                    let instrs = ipg.instrs(n).clone();
                    ipg.add(NodeKind::Const(v), ty, &instrs)
                }
            };
            if target != n {
                log::trace!("rewriting {n} to {target}");
                replace(ipg, n, target)?;
                changed += 1;
            }
        }
        changed += dedup(ipg, placement)?;
        if changed == 0 {
            return Ok(total);
        }
        total += changed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mia_ir::{BitRange, InstrId, InstrSet, ResourceId, Type};
    use smallvec::smallvec;

    fn ipg() -> (Ipg, InstrSet) {
        let all: InstrSet = [InstrId::from(0), InstrId::from(1)].into();
        (Ipg::new("t", all.clone()), all)
    }

    fn slice(ipg: &mut Ipg, all: &InstrSet) -> NodeId {
        ipg.add(
            NodeKind::WordSlice {
                slices: smallvec![BitRange::new(7, 0)],
                fields: Default::default(),
            },
            Type::Bits(8),
            all,
        )
    }

    fn bin(ipg: &mut Ipg, op: BuiltIn, a: NodeId, b: NodeId, all: &InstrSet) -> NodeId {
        let ty = op.result_type(&[ipg.graph.ty(a), ipg.graph.ty(b)]);
        ipg.add(NodeKind::BuiltIn { op, args: smallvec![a, b] }, ty, all)
    }

    #[test]
    fn folds_constants_and_identities() {
        let (mut ipg, all) = ipg();
        let x = slice(&mut ipg, &all);
        let zero = ipg.add(NodeKind::Const(Value::new(0, 8)), Type::Bits(8), &all);
        let two = ipg.add(NodeKind::Const(Value::new(2, 8)), Type::Bits(8), &all);
        let three = ipg.add(NodeKind::Const(Value::new(3, 8)), Type::Bits(8), &all);
        let five = bin(&mut ipg, BuiltIn::Add, two, three, &all);
        let sum = bin(&mut ipg, BuiltIn::Add, zero, x, &all);
        let prod = bin(&mut ipg, BuiltIn::Mul, sum, five, &all);
        let w = ipg.add(
            NodeKind::Write {
                resource: ResourceId::from(0),
                address: None,
                value: prod,
                condition: None,
            },
            Type::Void,
            &all,
        );
        simplify(&mut ipg, None).unwrap();
        let NodeKind::Write { value, .. } = ipg.graph.kind(w) else {
            panic!("write vanished")
        };
        let NodeKind::BuiltIn { op, args } = ipg.graph.kind(*value) else {
            panic!("expected a multiplication")
        };
        assert_eq!(*op, BuiltIn::Mul);
        assert_eq!(args[0], x);
        assert_eq!(ipg.graph.as_const(args[1]), Some(Value::new(5, 8)));
        assert!(!ipg.graph.is_live(sum));
        ipg.graph.validate().unwrap();
    }

    #[test]
    fn canonical_order_exposes_duplicates() {
        let (mut ipg, all) = ipg();
        let x = slice(&mut ipg, &all);
        let y = ipg.add(
            NodeKind::Read {
                resource: ResourceId::from(0),
                address: Some(x),
                condition: None,
            },
            Type::Bits(8),
            &all,
        );
        let a = bin(&mut ipg, BuiltIn::Xor, x, y, &all);
        let b = bin(&mut ipg, BuiltIn::Xor, y, x, &all);
        assert_ne!(a, b);
        let both = bin(&mut ipg, BuiltIn::Or, a, b, &all);
        ipg.add(
            NodeKind::Write {
                resource: ResourceId::from(0),
                address: None,
                value: both,
                condition: None,
            },
            Type::Void,
            &all,
        );
        simplify(&mut ipg, None).unwrap();
        assert!(ipg.graph.is_live(a) != ipg.graph.is_live(b));
        assert!(!ipg.graph.is_live(both) || ipg.graph.find_duplicate(both).is_none());
    }

    #[test]
    fn double_negation_and_selects() {
        let (mut ipg, all) = ipg();
        let x = slice(&mut ipg, &all);
        let not = |ipg: &mut Ipg, v| {
            ipg.add(NodeKind::BuiltIn { op: BuiltIn::Not, args: smallvec![v] }, Type::Bits(8), &all)
        };
        let n1 = not(&mut ipg, x);
        let n2 = not(&mut ipg, n1);
        let t = ipg.graph.bool_const(true);
        let sel = ipg.add(NodeKind::Select { cond: t, then: n2, els: n1 }, Type::Bits(8), &all);
        let w = ipg.add(
            NodeKind::Write {
                resource: ResourceId::from(0),
                address: None,
                value: sel,
                condition: None,
            },
            Type::Void,
            &all,
        );
        simplify(&mut ipg, None).unwrap();
        assert_eq!(ipg.graph.inputs(w).as_slice(), &[x]);
        assert_eq!(ipg.graph.live_count(), 2);
    }
}
