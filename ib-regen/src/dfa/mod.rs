//! The deterministic automaton over the byte alphabet.
//!
//! States are interned position sets. A row is only computed when first
//! touched, so eager construction is nothing more than the online builder
//! driven to fixpoint; [`DFA::online_construct`] exposes the same step for
//! streaming use. Once every reachable row exists the builder is dropped and
//! the automaton is immutable (except for the whole-automaton rewrites
//! [`DFA::complement`] and [`DFA::minimize`]).

use std::collections::BTreeSet;

use itertools::Itertools;
use log::{debug, trace};
use rustc_hash::FxHashMap;

use crate::{
    expr::position::{LeafTest, PositionTable, StateSet},
    nfa::NFA,
    options::CompileLevel,
};

pub mod gnfa;

pub type StateId = u32;

/// No transition: the canonical id of the empty position set.
pub const REJECT: StateId = StateId::MAX;
/// Not yet built by the online constructor.
pub const UNDEF: StateId = StateId::MAX - 1;

/// When a position set is accepting, in terms of the number of distinct
/// end-of-pattern positions it contains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcceptCond {
    /// All `neop` branch markers must be live: 1 for ordinary patterns,
    /// N for an intersection of N branches.
    All(usize),
    /// Exactly one of the branch markers is live (xor of two branches).
    ExactlyOne,
}

impl AcceptCond {
    fn accepts(&self, eops: usize) -> bool {
        match *self {
            AcceptCond::All(neop) => eops == neop,
            AcceptCond::ExactlyOne => eops == 1,
        }
    }
}

/// A two-compare transition summary: `key.0 <= b <= key.1` goes to `next1`,
/// everything else to `next2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlterTrans {
    pub key: (u8, u8),
    pub next1: StateId,
    pub next2: StateId,
}

#[derive(Clone, Debug)]
pub struct State {
    pub accept: bool,
    /// Dense-range fallback: the state most bytes lead to, extracted from
    /// `Dot` positions during construction and refined by the peephole pass.
    pub default_next: StateId,
    pub dst_states: BTreeSet<StateId>,
    pub src_states: BTreeSet<StateId>,
    pub alter: Option<AlterTrans>,
    /// Depth of the uniform-row chain hanging off this state.
    pub inline_level: usize,
}

impl State {
    fn new(accept: bool) -> Self {
        State {
            accept,
            default_next: REJECT,
            dst_states: BTreeSet::new(),
            src_states: BTreeSet::new(),
            alter: None,
            inline_level: 0,
        }
    }
}

struct Builder {
    table: PositionTable,
    cond: AcceptCond,
    state_map: FxHashMap<Box<[u32]>, StateId>,
    /// Position set of each interned state.
    sets: Vec<Box<[u32]>>,
}

pub struct DFA {
    transitions: Vec<Box<[StateId; 256]>>,
    states: Vec<State>,
    materialized: Vec<bool>,
    complete: bool,
    minimum: bool,
    olevel: CompileLevel,
    builder: Option<Builder>,
}

impl DFA {
    /// Subset-construct the full automaton for a position table.
    pub fn construct(table: &PositionTable, first: &StateSet, cond: AcceptCond) -> DFA {
        let mut dfa = DFA::construct_online(table.clone(), first, cond);
        let mut s = 0;
        while s < dfa.states.len() {
            dfa.materialize_row(s as StateId);
            s += 1;
        }
        dfa.builder = None;
        dfa.complete = true;
        debug!(
            "dfa constructed: {} states over {} positions",
            dfa.states.len(),
            table.len()
        );
        dfa
    }

    /// Start a lazily materialized automaton: only the start state exists
    /// until [`DFA::online_construct`] touches more of it.
    pub fn construct_online(table: PositionTable, first: &StateSet, cond: AcceptCond) -> DFA {
        let mut dfa = DFA {
            transitions: Vec::new(),
            states: Vec::new(),
            materialized: Vec::new(),
            complete: false,
            minimum: false,
            olevel: CompileLevel::Onone,
            builder: Some(Builder {
                table,
                cond,
                state_map: FxHashMap::default(),
                sets: Vec::new(),
            }),
        };
        let start: Box<[u32]> = first.iter().copied().collect();
        dfa.intern(start);
        dfa
    }

    /// Finalize `transition[state][byte]` if it has not been built yet and
    /// return it. The result is exactly what eager construction would have
    /// produced. Not thread-safe; must not run while the automaton has
    /// concurrent readers.
    pub fn online_construct(&mut self, state: StateId, byte: u8) -> StateId {
        self.materialize_row(state);
        if self.builder.is_some() && self.materialized.iter().all(|&m| m) {
            self.builder = None;
            self.complete = true;
        }
        self.transitions[state as usize][byte as usize]
    }

    fn intern(&mut self, set: Box<[u32]>) -> StateId {
        let builder = self.builder.as_mut().expect("construction already finalized");
        if let Some(&id) = builder.state_map.get(&set) {
            return id;
        }
        let id = self.states.len() as StateId;
        let eops = set.iter().filter(|&&p| builder.table.is_eop(p)).count();
        let accept = builder.cond.accepts(eops);
        builder.state_map.insert(set.clone(), id);
        builder.sets.push(set);
        self.states.push(State::new(accept));
        self.transitions.push(Box::new([UNDEF; 256]));
        self.materialized.push(false);
        trace!("dfa state {id} (accept: {accept})");
        id
    }

    fn materialize_row(&mut self, s: StateId) {
        if self.materialized[s as usize] {
            return;
        }
        let (buckets, default_set) = {
            let builder = self.builder.as_ref().expect("construction already finalized");
            let set = &builder.sets[s as usize];
            let mut buckets: Vec<BTreeSet<u32>> = vec![BTreeSet::new(); 256];
            let mut default_set: BTreeSet<u32> = BTreeSet::new();
            for &p in set.iter() {
                let pos = &builder.table.positions[p as usize];
                match &pos.test {
                    LeafTest::Byte(b) => buckets[*b as usize].extend(&pos.follow),
                    LeafTest::Class(class) => {
                        for b in class.bytes() {
                            buckets[b as usize].extend(&pos.follow);
                        }
                    }
                    LeafTest::AnyByte => {
                        for bucket in &mut buckets {
                            bucket.extend(&pos.follow);
                        }
                        // every byte behaves identically for this position
                        default_set.extend(&pos.follow);
                    }
                    LeafTest::Delimiter => {
                        buckets[builder.table.delimiter as usize].extend(&pos.follow)
                    }
                    LeafTest::Eop | LeafTest::Never => {}
                }
            }
            (buckets, default_set)
        };

        let mut row = [REJECT; 256];
        for (b, bucket) in buckets.into_iter().enumerate() {
            if !bucket.is_empty() {
                row[b] = self.intern(bucket.iter().copied().collect());
            }
        }
        let default_next = if default_set.is_empty() {
            REJECT
        } else {
            self.intern(default_set.iter().copied().collect())
        };

        self.transitions[s as usize] = Box::new(row);
        self.states[s as usize].default_next = default_next;
        self.materialized[s as usize] = true;
        let dst: BTreeSet<StateId> = row.iter().copied().filter(|&t| t != REJECT).collect();
        for &t in &dst {
            self.states[t as usize].src_states.insert(s);
        }
        self.states[s as usize].dst_states = dst;
    }

    /// Subset-construct from a plain NFA.
    pub fn from_nfa(nfa: &NFA) -> DFA {
        let mut dfa = DFA {
            transitions: Vec::new(),
            states: Vec::new(),
            materialized: Vec::new(),
            complete: false,
            minimum: false,
            olevel: CompileLevel::Onone,
            builder: None,
        };
        let mut map: FxHashMap<Box<[u32]>, StateId> = FxHashMap::default();
        let mut sets: Vec<Box<[u32]>> = Vec::new();

        let start: Box<[u32]> = nfa.start_states().iter().copied().collect();
        let accept = start.iter().any(|&q| nfa.accept(q));
        map.insert(start.clone(), 0);
        sets.push(start);
        dfa.states.push(State::new(accept));
        dfa.transitions.push(Box::new([REJECT; 256]));
        dfa.materialized.push(true);

        let mut s = 0;
        while s < sets.len() {
            let mut row = [REJECT; 256];
            for b in 0..=255u8 {
                let mut next = BTreeSet::new();
                for &q in sets[s].iter() {
                    next.extend(nfa.next(q, b));
                }
                if next.is_empty() {
                    continue;
                }
                let key: Box<[u32]> = next.iter().copied().collect();
                let id = *map.entry(key.clone()).or_insert_with(|| {
                    let id = sets.len() as StateId;
                    sets.push(key);
                    id
                });
                if id as usize == dfa.states.len() {
                    let accept = sets[id as usize].iter().any(|&q| nfa.accept(q));
                    dfa.states.push(State::new(accept));
                    dfa.transitions.push(Box::new([REJECT; 256]));
                    dfa.materialized.push(true);
                }
                row[b as usize] = id;
            }
            *dfa.transitions[s] = row;
            s += 1;
        }
        dfa.rebuild_edges();
        dfa.complete = true;
        debug!("dfa from nfa: {} states", dfa.states.len());
        dfa
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn start_state(&self) -> StateId {
        0
    }

    pub fn complete(&self) -> bool {
        self.complete
    }

    pub fn olevel(&self) -> CompileLevel {
        self.olevel
    }

    pub fn accept(&self, s: StateId) -> bool {
        self.states[s as usize].accept
    }

    pub fn state(&self, s: StateId) -> &State {
        &self.states[s as usize]
    }

    pub(crate) fn row(&self, s: StateId) -> &[StateId; 256] {
        &self.transitions[s as usize]
    }

    /// One interpreter step.
    #[inline]
    pub fn next(&self, s: StateId, b: u8) -> StateId {
        if let Some(alter) = &self.states[s as usize].alter {
            if alter.key.0 <= b && b <= alter.key.1 {
                alter.next1
            } else {
                alter.next2
            }
        } else {
            self.transitions[s as usize][b as usize]
        }
    }

    /// Run the tight loop over `[begin, end)`: reject on the first missing
    /// transition, otherwise accept iff the final state accepts.
    pub fn full_match(&self, input: &[u8]) -> bool {
        let mut state = self.start_state();
        for &b in input {
            state = self.next(state, b);
            if state == REJECT {
                return false;
            }
        }
        self.accept(state)
    }

    /// Complement the accepted language: flip every accept bit and send all
    /// rejecting edges to a universal accepting sink (a stuck complement
    /// match accepts for the rest of the input).
    pub fn complement(&mut self) {
        assert!(self.complete, "complement requires a complete automaton");
        let sink = self.states.len() as StateId;
        for state in &mut self.states {
            state.accept = !state.accept;
        }
        let mut sink_state = State::new(true);
        sink_state.default_next = sink;
        self.states.push(sink_state);
        self.transitions.push(Box::new([sink; 256]));
        self.materialized.push(true);
        for row in &mut self.transitions {
            for t in row.iter_mut() {
                if *t == REJECT {
                    *t = sink;
                }
            }
        }
        self.minimum = false;
        self.rebuild_edges();
    }

    /// Merge indistinguishable states (partition refinement over
    /// {accepting, non-accepting}, with the reject sink participating as a
    /// real state and removed afterwards). Idempotent; state 0 stays the
    /// start state.
    pub fn minimize(&mut self) {
        assert!(self.complete, "minimize requires a complete automaton");
        let n = self.states.len();
        let rej = n; // virtual index of the reject sink

        let mut class: Vec<u32> = (0..=n)
            .map(|s| if s < n && self.states[s].accept { 1 } else { 0 })
            .collect();
        let mut num_classes = if class.contains(&1) && class.contains(&0) {
            2
        } else {
            1
        };

        // Refinement only ever splits classes, so a round that does not grow
        // the class count has reached the fixpoint.
        loop {
            let mut next_class = vec![0u32; n + 1];
            let mut seen: FxHashMap<(u32, Vec<u32>), u32> = FxHashMap::default();
            let class_of = |t: StateId, class: &[u32]| {
                if t == REJECT {
                    class[rej]
                } else {
                    class[t as usize]
                }
            };
            for s in 0..n {
                let sig: Vec<u32> = self.transitions[s]
                    .iter()
                    .map(|&t| class_of(t, &class))
                    .collect();
                let count = seen.len() as u32;
                next_class[s] = *seen.entry((class[s], sig)).or_insert(count);
            }
            let rej_sig = vec![class[rej]; 256];
            let count = seen.len() as u32;
            next_class[rej] = *seen.entry((class[rej], rej_sig)).or_insert(count);

            let refined = seen.len();
            class = next_class;
            if refined == num_classes {
                break;
            }
            num_classes = refined;
        }

        let rej_class = class[rej];
        let old_len = self.states.len();

        if class[0] == rej_class {
            // the whole language is empty
            self.states = vec![State::new(false)];
            self.transitions = vec![Box::new([REJECT; 256])];
            self.materialized = vec![true];
            self.minimum = true;
            debug!("dfa minimized: {} -> 1 states (empty language)", old_len);
            return;
        }

        let mut new_id: FxHashMap<u32, StateId> = FxHashMap::default();
        let mut reps: Vec<usize> = Vec::new();
        for s in 0..n {
            if class[s] != rej_class && !new_id.contains_key(&class[s]) {
                new_id.insert(class[s], reps.len() as StateId);
                reps.push(s);
            }
        }

        let remap = |t: StateId| {
            if t == REJECT || class[t as usize] == rej_class {
                REJECT
            } else {
                new_id[&class[t as usize]]
            }
        };

        let mut states = Vec::with_capacity(reps.len());
        let mut transitions = Vec::with_capacity(reps.len());
        for &rep in &reps {
            let mut state = State::new(self.states[rep].accept);
            state.default_next = match self.states[rep].default_next {
                REJECT => REJECT,
                d => remap(d),
            };
            states.push(state);
            let mut row = [REJECT; 256];
            for (b, &t) in self.transitions[rep].iter().enumerate() {
                row[b] = remap(t);
            }
            transitions.push(Box::new(row));
        }
        self.states = states;
        self.transitions = transitions;
        self.materialized = vec![true; self.states.len()];
        self.rebuild_edges();
        self.minimum = true;
        debug!("dfa minimized: {} -> {} states", old_len, self.states.len());
    }

    pub fn minimum(&self) -> bool {
        self.minimum
    }

    /// Apply the peephole stages up to `olevel`. Levels only ever increase.
    pub fn compile(&mut self, olevel: CompileLevel) {
        if olevel <= self.olevel {
            return;
        }
        if olevel >= CompileLevel::O3 && !self.minimum {
            self.minimize();
        }
        if olevel >= CompileLevel::O1 {
            self.eliminate_branch();
        }
        if olevel >= CompileLevel::O2 {
            self.reduce();
        }
        self.olevel = olevel;
    }

    /// Record the fallthrough target of every state whose 256 transitions
    /// agree, and the depth of the resulting fallthrough chains.
    fn eliminate_branch(&mut self) {
        let uniform: Vec<Option<StateId>> = self
            .transitions
            .iter()
            .map(|row| {
                let first = row[0];
                row.iter().all(|&t| t == first).then_some(first)
            })
            .collect();
        for (s, &u) in uniform.iter().enumerate() {
            if let Some(target) = u {
                self.states[s].default_next = target;
            }
            // chain depth through uniform successors, bounded like a JIT
            // inliner would bound it
            let mut level = 0;
            let mut cur = u;
            while let Some(t) = cur {
                if t == REJECT || level >= 8 {
                    break;
                }
                level += 1;
                cur = uniform[t as usize];
            }
            self.states[s].inline_level = level;
        }
    }

    /// Derive [`AlterTrans`] for rows built from at most two contiguous
    /// byte ranges, so stepping needs two compares instead of a table load.
    fn reduce(&mut self) {
        for (s, row) in self.transitions.iter().enumerate() {
            let chunks = row.iter().enumerate().chunk_by(|&(_, &t)| t);
            let mut runs: Vec<(StateId, u8, u8)> = Vec::new();
            for (t, mut group) in &chunks {
                let lo = group.next().unwrap().0 as u8;
                let hi = group.last().map_or(lo, |(b, _)| b as u8);
                runs.push((t, lo, hi));
            }
            self.states[s].alter = match runs.as_slice() {
                [(v1, lo, hi), (v2, ..)] => Some(AlterTrans {
                    key: (*lo, *hi),
                    next1: *v1,
                    next2: *v2,
                }),
                [(v0, ..), (v1, lo, hi), (v2, ..)] if v0 == v2 => Some(AlterTrans {
                    key: (*lo, *hi),
                    next1: *v1,
                    next2: *v0,
                }),
                _ => None,
            };
        }
    }

    fn rebuild_edges(&mut self) {
        for state in &mut self.states {
            state.dst_states.clear();
            state.src_states.clear();
        }
        for s in 0..self.states.len() {
            let dst: BTreeSet<StateId> = self.transitions[s]
                .iter()
                .copied()
                .filter(|&t| t != REJECT)
                .collect();
            for &t in &dst {
                self.states[t as usize].src_states.insert(s as StateId);
            }
            self.states[s].dst_states = dst;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{
        position::analyze,
        ExprKind, ExprPool,
    };

    /// Build `pattern · EOP` from a tiny hand-rolled combinator and return
    /// the constructed automaton.
    pub(crate) fn dfa_of(build: impl FnOnce(&mut ExprPool) -> crate::expr::ExprId) -> DFA {
        let mut pool = ExprPool::new();
        let root = build(&mut pool);
        let eop = pool.alloc(ExprKind::Eop);
        let root = pool.alloc(ExprKind::Concat(root, eop));
        let (table, info) = analyze(&pool, root, b'\n');
        DFA::construct(&table, &info.first, AcceptCond::All(1))
    }

    pub(crate) fn lit_seq(pool: &mut ExprPool, s: &[u8]) -> crate::expr::ExprId {
        let mut it = s.iter();
        let mut e = pool.alloc(ExprKind::Literal(*it.next().unwrap()));
        for &b in it {
            let l = pool.alloc(ExprKind::Literal(b));
            e = pool.alloc(ExprKind::Concat(e, l));
        }
        e
    }

    fn star_union_c(pool: &mut ExprPool) -> crate::expr::ExprId {
        // (a|b)*c
        let a = pool.alloc(ExprKind::Literal(b'a'));
        let b = pool.alloc(ExprKind::Literal(b'b'));
        let u = pool.alloc(ExprKind::Union(a, b));
        let star = pool.alloc(ExprKind::Star {
            e: u,
            non_greedy: false,
        });
        let c = pool.alloc(ExprKind::Literal(b'c'));
        pool.alloc(ExprKind::Concat(star, c))
    }

    #[test]
    fn subset_construction() {
        let dfa = dfa_of(star_union_c);
        assert!(dfa.complete());
        assert!(dfa.full_match(b"c"));
        assert!(dfa.full_match(b"ababc"));
        assert!(!dfa.full_match(b""));
        assert!(!dfa.full_match(b"ca"));
        assert!(!dfa.full_match(b"abd"));
    }

    #[test]
    fn rows_are_total() {
        let dfa = dfa_of(star_union_c);
        for s in 0..dfa.len() {
            let row = dfa.row(s as StateId);
            assert_eq!(row.len(), 256);
            for &t in row.iter() {
                assert!(t == REJECT || (t as usize) < dfa.len());
                assert_ne!(t, UNDEF);
            }
        }
    }

    #[test]
    fn default_next_from_dot() {
        // .*a: every state has a dense fallback through the dot
        let dfa = dfa_of(|pool| {
            let dot = pool.alloc(ExprKind::Dot);
            let star = pool.alloc(ExprKind::Star {
                e: dot,
                non_greedy: false,
            });
            let a = pool.alloc(ExprKind::Literal(b'a'));
            pool.alloc(ExprKind::Concat(star, a))
        });
        assert!(dfa.full_match(b"xxxa"));
        assert!(!dfa.full_match(b"ax"));
        for s in 0..dfa.len() {
            assert_ne!(dfa.state(s as StateId).default_next, REJECT);
        }
    }

    #[test]
    fn online_matches_eager() {
        let mut pool = ExprPool::new();
        let root = star_union_c(&mut pool);
        let eop = pool.alloc(ExprKind::Eop);
        let root = pool.alloc(ExprKind::Concat(root, eop));
        let (table, info) = analyze(&pool, root, b'\n');

        let eager = DFA::construct(&table, &info.first, AcceptCond::All(1));
        let mut online = DFA::construct_online(table.clone(), &info.first, AcceptCond::All(1));

        // drive the online automaton along an input, checking agreement
        let mut se = eager.start_state();
        let mut so = online.start_state();
        for &b in b"ababc" {
            let te = eager.next(se, b);
            let to = online.online_construct(so, b);
            assert_eq!(te == REJECT, to == REJECT);
            if te == REJECT {
                break;
            }
            assert_eq!(eager.accept(te), online.accept(to));
            se = te;
            so = to;
        }

        // forcing every state yields the same automaton size
        let mut s = 0;
        while s < online.len() {
            for b in 0..=255u8 {
                online.online_construct(s as StateId, b);
            }
            s += 1;
        }
        assert!(online.complete());
        assert_eq!(online.len(), eager.len());
    }

    #[test]
    fn complement_flips_language() {
        let mut dfa = dfa_of(|pool| lit_seq(pool, b"abc"));
        dfa.complement();
        assert!(!dfa.full_match(b"abc"));
        assert!(dfa.full_match(b"abd"));
        assert!(dfa.full_match(b""));
        assert!(dfa.full_match(b"abcd")); // stuck -> accepting forever
    }

    #[test]
    fn minimize_merges_and_is_idempotent() {
        // a|b without the parser's class combining: two distinct literal
        // positions lead to equivalent states
        let mut dfa = dfa_of(|pool| {
            let a = pool.alloc(ExprKind::Literal(b'a'));
            let b = pool.alloc(ExprKind::Literal(b'b'));
            pool.alloc(ExprKind::Union(a, b))
        });
        let before = dfa.len();
        dfa.minimize();
        assert!(dfa.minimum());
        assert!(dfa.len() <= before);
        assert!(dfa.full_match(b"a"));
        assert!(dfa.full_match(b"b"));
        assert!(!dfa.full_match(b"ab"));

        let after = dfa.len();
        dfa.minimize();
        assert_eq!(dfa.len(), after);
        assert!(dfa.full_match(b"a") && !dfa.full_match(b"c"));
    }

    #[test]
    fn minimize_empty_language() {
        let mut dfa = dfa_of(|pool| {
            let a = pool.alloc(ExprKind::Literal(b'a'));
            let none = pool.alloc(ExprKind::None);
            pool.alloc(ExprKind::Concat(a, none))
        });
        assert!(!dfa.full_match(b"a"));
        dfa.minimize();
        assert_eq!(dfa.len(), 1);
        assert!(!dfa.full_match(b"") && !dfa.full_match(b"a"));
    }

    #[test]
    fn peephole() {
        let mut dfa = dfa_of(|pool| lit_seq(pool, b"ab"));
        dfa.compile(CompileLevel::O2);
        assert_eq!(dfa.olevel(), CompileLevel::O2);
        // the row of the start state is 'a'-or-reject: a single in-range pair
        let alter = dfa.state(0).alter.expect("two-valued row");
        assert_eq!(alter.key, (b'a', b'a'));
        assert_eq!(alter.next2, REJECT);
        // stepping through alter-trans still matches
        assert!(dfa.full_match(b"ab"));
        assert!(!dfa.full_match(b"aa"));
    }

    #[test]
    fn eliminate_branch_records_fallthrough() {
        // .. (two dots): rows are uniform, chains are recorded
        let mut dfa = dfa_of(|pool| {
            let d1 = pool.alloc(ExprKind::Dot);
            let d2 = pool.alloc(ExprKind::Dot);
            pool.alloc(ExprKind::Concat(d1, d2))
        });
        dfa.compile(CompileLevel::O1);
        let s0 = dfa.state(0);
        assert_ne!(s0.default_next, REJECT);
        assert!(s0.inline_level >= 1);
    }

    #[test]
    fn edges_are_symmetric() {
        let dfa = dfa_of(star_union_c);
        for s in 0..dfa.len() as StateId {
            for &t in &dfa.state(s).dst_states {
                assert!(dfa.state(t).src_states.contains(&s));
            }
        }
    }
}
